use std::path::PathBuf;

/// Everything that can go wrong in this crate, by kind.
///
/// Errors are never recovered internally; they surface unchanged to the
/// caller of the top-level operations. The one exception is the removal of a
/// stale `tmp_` table at the start of a write, which is silent by design.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed FASTA/FASTQ framing, e.g. sequence data before any header.
    #[error("line {line}: invalid FASTA/FASTQ framing: {msg}")]
    Parse { line: u64, msg: String },

    /// A BAM file could not be opened or read. Supplying a SAM file is the
    /// most common way to hit this.
    #[error("could not open BAM file {}: {msg}", .path.display())]
    BamOpen { path: PathBuf, msg: String },

    /// Schema violation, missing group or table, or a corrupt container.
    #[error("store {}: {msg}", .path.display())]
    Store { path: PathBuf, msg: String },

    /// The upgrade sequence cannot progress from the recorded version.
    #[error("cannot upgrade {} past format version {version}: {msg}", .path.display())]
    Upgrade {
        path: PathBuf,
        version: i32,
        msg: String,
    },

    /// The target database exists and `force` was not set.
    #[error("database {} already exists, refusing to overwrite", .path.display())]
    OverwriteRefused { path: PathBuf },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
