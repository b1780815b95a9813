use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use log::{debug, info};
use rust_htslib::bam::{self, Read as BamRead};
use smallvec::SmallVec;

use crate::error::{Error, Result};
use crate::ContigRowId;

/// Distinct links need at least this many supporting read pairs to be kept.
pub const MIN_LINK_SUPPORT: usize = 5;

/// Which edge of a contig a read points off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContigEnd {
    Start,
    End,
}

/// Relative orientation of a link: the pair of contig ends the two mates
/// point off (SS, SE, ES, EE).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkType {
    StartStart,
    StartEnd,
    EndStart,
    EndEnd,
}

impl LinkType {
    pub fn from_ends(first: ContigEnd, second: ContigEnd) -> LinkType {
        match (first, second) {
            (ContigEnd::Start, ContigEnd::Start) => LinkType::StartStart,
            (ContigEnd::Start, ContigEnd::End) => LinkType::StartEnd,
            (ContigEnd::End, ContigEnd::Start) => LinkType::EndStart,
            (ContigEnd::End, ContigEnd::End) => LinkType::EndEnd,
        }
    }

    pub fn code(self) -> i32 {
        match self {
            LinkType::StartStart => 0,
            LinkType::StartEnd => 1,
            LinkType::EndStart => 2,
            LinkType::EndEnd => 3,
        }
    }

    pub fn from_code(code: i32) -> Option<LinkType> {
        match code {
            0 => Some(LinkType::StartStart),
            1 => Some(LinkType::StartEnd),
            2 => Some(LinkType::EndStart),
            3 => Some(LinkType::EndEnd),
            _ => None,
        }
    }
}

/// One paired-end bridge between two distinct contigs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContigLink {
    pub contig1: ContigRowId,
    pub contig2: ContigRowId,
    pub num_reads: u32,
    pub link_type: LinkType,
    pub gap: i32,
}

/// The accepted contig universe: sorted unique names with their lengths,
/// resolvable to row indices. References outside this set are ignored.
pub struct ContigSet {
    index: HashMap<String, ContigRowId>,
    lengths: Vec<u32>,
}

impl ContigSet {
    /// `names` must already be the sorted, deduplicated row order.
    pub fn new(names: &[String], lengths: &[u32]) -> ContigSet {
        let index = names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.clone(), ContigRowId(i as u32)))
            .collect();
        ContigSet {
            index,
            lengths: lengths.to_vec(),
        }
    }

    pub fn row(&self, name: &str) -> Option<ContigRowId> {
        self.index.get(name).copied()
    }

    pub fn length(&self, row: ContigRowId) -> u32 {
        self.lengths[row.as_usize()]
    }

    pub fn len(&self) -> usize {
        self.lengths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lengths.is_empty()
    }
}

/// Coverage matrix and pooled links extracted from a set of BAM files.
/// `coverage` is row-aligned with the contig set; one column per BAM in
/// input order.
#[derive(Debug)]
pub struct BamProfile {
    pub stoit_names: Vec<String>,
    pub coverage: Vec<Vec<f64>>,
    pub links: Vec<ContigLink>,
}

/// File basename minus its extension, used as the coverage column name.
pub fn stem_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

// The edge a mapped read points at and the distance from the read to that
// edge. A forward read points off the end of its contig, a reverse read back
// off the start; the distance is what the insert still has to span inside
// this contig.
fn read_edge(contig_len: i64, pos: i64, read_len: i64, reverse: bool) -> (ContigEnd, i64) {
    if reverse {
        (ContigEnd::Start, pos + read_len)
    } else {
        (ContigEnd::End, contig_len - pos)
    }
}

// BAMs are BGZF, which opens with the gzip magic. Anything else (usually a
// SAM supplied by mistake) is rejected before htslib gets to guess.
fn check_bgzf(path: &Path) -> Result<()> {
    let bam_open = |msg: String| Error::BamOpen {
        path: path.to_path_buf(),
        msg,
    };
    let mut file = File::open(path).map_err(|e| bam_open(e.to_string()))?;
    let mut magic = [0u8; 2];
    file.read_exact(&mut magic)
        .map_err(|_| bam_open("file too short to be a BAM".into()))?;
    if magic != [0x1f, 0x8b] {
        return Err(bam_open(
            "not BGZF compressed -- did you supply a SAM file?".into(),
        ));
    }
    Ok(())
}

/// Scans each BAM once, accumulating per-contig mapped-read counts
/// (normalised by contig length) and paired-end link evidence.
///
/// Links are pooled across all BAMs, grouped by (contig1, contig2,
/// orientation), and emitted only with at least `MIN_LINK_SUPPORT` pairs.
/// The gap estimate is the BAM's mean inward same-contig template length
/// minus both mate-to-edge distances, averaged over the supporting pairs.
pub fn aggregate(paths: &[PathBuf], set: &ContigSet) -> Result<BamProfile> {
    let n_cons = set.len();
    let mut coverage = vec![vec![0.0; paths.len()]; n_cons];
    let mut stoit_names = Vec::with_capacity(paths.len());
    let mut insert_means = Vec::with_capacity(paths.len());
    let mut evidence: HashMap<(ContigRowId, ContigRowId, LinkType), SmallVec<[(usize, i64); 4]>> =
        HashMap::new();

    for (bam_idx, path) in paths.iter().enumerate() {
        let stoit = stem_name(path);
        info!("parsing {} ({} of {})", stoit, bam_idx + 1, paths.len());
        stoit_names.push(stoit);

        check_bgzf(path)?;
        let bam_open = |msg: String| Error::BamOpen {
            path: path.to_path_buf(),
            msg,
        };
        let mut reader = bam::Reader::from_path(path).map_err(|e| bam_open(e.to_string()))?;

        // Resolve every reference to a contig row up front; None marks
        // references we were never given a contig for.
        let header = reader.header();
        let n_targets = header.target_count();
        let mut tid_rows: Vec<Option<ContigRowId>> = Vec::with_capacity(n_targets as usize);
        for tid in 0..n_targets {
            let row = std::str::from_utf8(header.tid2name(tid))
                .ok()
                .and_then(|name| set.row(name));
            tid_rows.push(row);
        }

        let mut counts = vec![0u64; n_cons];
        let mut insert_sum = 0i64;
        let mut insert_n = 0u64;
        for result in reader.records() {
            let record = result.map_err(|e| bam_open(e.to_string()))?;
            if record.is_unmapped() || record.tid() < 0 {
                continue;
            }
            let Some(row) = tid_rows.get(record.tid() as usize).copied().flatten() else {
                continue;
            };
            counts[row.as_usize()] += 1;

            if !record.is_paired() || record.is_mate_unmapped() || record.mtid() < 0 {
                continue;
            }
            if record.mtid() == record.tid() {
                // Same-contig pairs feed the insert size estimate; counting
                // only positive template lengths visits each pair once.
                let tlen = record.insert_size();
                if tlen > 0 {
                    insert_sum += tlen;
                    insert_n += 1;
                }
                continue;
            }
            // Cross-contig pair: record it once, from the mate with the
            // lower target id.
            if record.tid() > record.mtid() {
                continue;
            }
            let Some(mate_row) = tid_rows.get(record.mtid() as usize).copied().flatten() else {
                continue;
            };
            let read_len = record.seq_len() as i64;
            let (end1, d1) = read_edge(
                set.length(row) as i64,
                record.pos(),
                read_len,
                record.is_reverse(),
            );
            let (end2, d2) = read_edge(
                set.length(mate_row) as i64,
                record.mpos(),
                read_len,
                record.is_mate_reverse(),
            );
            evidence
                .entry((row, mate_row, LinkType::from_ends(end1, end2)))
                .or_default()
                .push((bam_idx, d1 + d2));
        }

        for (row, &count) in counts.iter().enumerate() {
            let len = set.length(ContigRowId(row as u32));
            if len > 0 {
                coverage[row][bam_idx] = count as f64 / f64::from(len);
            }
        }
        insert_means.push(if insert_n > 0 {
            insert_sum as f64 / insert_n as f64
        } else {
            0.0
        });
        debug!(
            "{}: mean insert {:.1} over {} same-contig pairs",
            stoit_names[bam_idx], insert_means[bam_idx], insert_n
        );
    }

    // Deterministic link order: by rows, then orientation.
    let mut keyed: Vec<_> = evidence.into_iter().collect();
    keyed.sort_by_key(|&((c1, c2, lt), _)| (c1.as_u32(), c2.as_u32(), lt.code()));
    let mut links = Vec::new();
    for ((contig1, contig2, link_type), pairs) in keyed {
        if pairs.len() < MIN_LINK_SUPPORT {
            continue;
        }
        let gap_sum: f64 = pairs
            .iter()
            .map(|&(bam_idx, dist)| insert_means[bam_idx] - dist as f64)
            .sum();
        links.push(ContigLink {
            contig1,
            contig2,
            num_reads: pairs.len() as u32,
            link_type,
            gap: (gap_sum / pairs.len() as f64).round() as i32,
        });
    }
    info!(
        "aggregated {} BAM files: {} links kept",
        paths.len(),
        links.len()
    );
    Ok(BamProfile {
        stoit_names,
        coverage,
        links,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stem_strips_one_extension() {
        assert_eq!(stem_name(Path::new("/data/a.bam")), "a");
        assert_eq!(stem_name(Path::new("sample_3.bam")), "sample_3");
        assert_eq!(stem_name(Path::new("plain")), "plain");
    }

    #[test]
    fn link_type_codes_roundtrip() {
        for lt in [
            LinkType::StartStart,
            LinkType::StartEnd,
            LinkType::EndStart,
            LinkType::EndEnd,
        ] {
            assert_eq!(LinkType::from_code(lt.code()), Some(lt));
        }
        assert_eq!(LinkType::from_code(4), None);
    }

    #[test]
    fn edge_distances() {
        // Forward read at 380 on a 400 bp contig: 20 bp left to the end.
        assert_eq!(read_edge(400, 380, 100, false), (ContigEnd::End, 20));
        // Reverse read at 10 with 100 bp: the insert spans back 110 bp.
        assert_eq!(read_edge(400, 10, 100, true), (ContigEnd::Start, 110));
    }

    #[test]
    fn contig_set_lookup() {
        let names = vec!["c1".to_string(), "c2".to_string()];
        let set = ContigSet::new(&names, &[100, 200]);
        assert_eq!(set.row("c2"), Some(ContigRowId(1)));
        assert_eq!(set.row("nope"), None);
        assert_eq!(set.length(ContigRowId(0)), 100);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn sam_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let sam = dir.path().join("reads.sam");
        std::fs::write(&sam, "@HD\tVN:1.6\n").unwrap();
        let set = ContigSet::new(&[], &[]);
        let err = aggregate(&[sam], &set).unwrap_err();
        assert!(matches!(err, Error::BamOpen { .. }));
    }
}
