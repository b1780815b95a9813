use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::thread;

use flate2::read::MultiGzDecoder;
use log::{debug, info};

use crate::error::Result;
use crate::fastx::FastxReader;
use crate::kmer::KmerEngine;
use crate::pca;

/// Knobs for contig profiling. `threads` is the number of additional worker
/// threads for signature computation; 0 keeps everything on the caller's
/// thread.
#[derive(Debug, Clone, Default)]
pub struct ProfileOptions {
    pub threads: usize,
}

/// Row-aligned profile of one assembly: row `i` of every field describes the
/// contig `names[i]`, and names are sorted ascending.
#[derive(Debug, Clone)]
pub struct ContigProfile {
    pub names: Vec<String>,
    pub lengths: Vec<u32>,
    pub sigs: Vec<Vec<f64>>,
    pub pca: Vec<(f64, f64)>,
}

impl ContigProfile {
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Opens a contig file as a buffered byte stream, decompressing transparently
/// when the file name ends in .gz.
pub fn open_contig_stream(path: &Path) -> Result<Box<dyn BufRead>> {
    let file = File::open(path)?;
    if path.extension().is_some_and(|e| e == "gz") {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Parses contigs from `input`, computes their k-mer signatures and the 2-D
/// projection, and returns everything row-aligned.
///
/// Duplicate record names overwrite; the last record under a name wins.
/// Sequences are upper-cased before signing; ambiguous bases survive parsing
/// and are skipped by the signature engine.
pub fn profile<R: BufRead>(
    input: R,
    engine: &KmerEngine,
    opts: &ProfileOptions,
) -> Result<ContigProfile> {
    info!("parsing contigs");
    let mut seqs: BTreeMap<String, Vec<u8>> = BTreeMap::new();
    let mut reader = FastxReader::new(input);
    while let Some(rec) = reader.next_record()? {
        seqs.insert(rec.name, rec.seq);
    }
    debug!("parsed {} distinct contigs", seqs.len());

    // BTreeMap iteration gives the ascending cid order the row-alignment
    // invariant is built on.
    let mut profiled: BTreeMap<String, (u32, Vec<f64>)> = BTreeMap::new();
    if opts.threads == 0 {
        for (name, mut seq) in seqs {
            seq.make_ascii_uppercase();
            let sig = engine.signature(&seq);
            profiled.insert(name, (seq.len() as u32, sig));
        }
    } else {
        // dnazip-style pool: feed records to workers over one channel,
        // collect signatures over another.
        let (work_tx, work_rx) = crossbeam_channel::unbounded::<(String, Vec<u8>)>();
        let (done_tx, done_rx) = crossbeam_channel::unbounded::<(String, u32, Vec<f64>)>();
        thread::scope(|scope| {
            for _ in 0..opts.threads {
                let rx = work_rx.clone();
                let tx = done_tx.clone();
                scope.spawn(move || {
                    for (name, mut seq) in rx {
                        seq.make_ascii_uppercase();
                        let sig = engine.signature(&seq);
                        let _ = tx.send((name, seq.len() as u32, sig));
                    }
                });
            }
            drop(work_rx);
            drop(done_tx);
            for item in seqs {
                // Workers only exit when the channel closes, so a send can
                // only fail if one of them panicked.
                work_tx.send(item).expect("signature worker gone");
            }
            drop(work_tx);
            for (name, len, sig) in done_rx {
                profiled.insert(name, (len, sig));
            }
        });
    }

    let mut names = Vec::with_capacity(profiled.len());
    let mut lengths = Vec::with_capacity(profiled.len());
    let mut sigs = Vec::with_capacity(profiled.len());
    for (name, (len, sig)) in profiled {
        names.push(name);
        lengths.push(len);
        sigs.push(sig);
    }

    let pca = pca::project_2d(&sigs);
    info!("profiled {} contigs ({} k-mer columns)", names.len(), engine.num_mers());
    Ok(ContigProfile {
        names,
        lengths,
        sigs,
        pca,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> KmerEngine {
        KmerEngine::new(2)
    }

    #[test]
    fn rows_are_sorted_by_name() {
        let input = b">c2\nAAAA\n>c1\nACGTACGT\n";
        let p = profile(&input[..], &engine(), &ProfileOptions::default()).unwrap();
        assert_eq!(p.names, ["c1", "c2"]);
        assert_eq!(p.lengths, [8, 4]);
        assert_eq!(p.sigs.len(), 2);
        assert_eq!(p.pca.len(), 2);
    }

    #[test]
    fn duplicate_names_overwrite() {
        let input = b">c1\nTTTT\n>c1\nAAAA\n";
        let kse = engine();
        let p = profile(&input[..], &kse, &ProfileOptions::default()).unwrap();
        assert_eq!(p.len(), 1);
        assert_eq!(p.lengths, [4]);
        // The surviving record is the second one; its signature is pure AA.
        let aa = kse.canonical_cols().iter().position(|c| c == "AA").unwrap();
        assert!((p.sigs[0][aa] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn lowercase_sequences_are_signed_uppercased() {
        let input = b">c1\nacgtacgt\n";
        let p = profile(&input[..], &engine(), &ProfileOptions::default()).unwrap();
        let sum: f64 = p.sigs[0].iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn worker_pool_matches_synchronous_path() {
        let input: Vec<u8> = (0..20)
            .flat_map(|i| format!(">c{i:02}\nACGTACGTNNACGT\n").into_bytes())
            .collect();
        let kse = engine();
        let serial = profile(&input[..], &kse, &ProfileOptions { threads: 0 }).unwrap();
        let pooled = profile(&input[..], &kse, &ProfileOptions { threads: 3 }).unwrap();
        assert_eq!(serial.names, pooled.names);
        assert_eq!(serial.lengths, pooled.lengths);
        assert_eq!(serial.sigs, pooled.sigs);
    }

    #[test]
    fn empty_input_profiles_to_nothing() {
        let p = profile(&b""[..], &engine(), &ProfileOptions::default()).unwrap();
        assert!(p.is_empty());
        assert!(p.pca.is_empty());
    }
}
