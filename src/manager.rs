use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::bam::{self, ContigLink, ContigSet, LinkType};
use crate::contigs::{self, ProfileOptions};
use crate::error::{Error, Result};
use crate::kmer::KmerEngine;
use crate::pca;
use crate::predicate::{ContigRecord, Predicate};
use crate::store::{
    Column, ColumnStore, Row, Schema, Value, LINKS_GROUP, META_GROUP, PROFILE_GROUP,
};
use crate::ContigRowId;

/// Database format version written by this code. Files reporting an older
/// version (or none at all, which reads as 0) are upgraded step by step.
pub const CURRENT_FORMAT_VERSION: i32 = 1;

const KMS_TABLE: &str = "kms";
const KPCA_TABLE: &str = "kpca";
const COVERAGE_TABLE: &str = "coverage";
const LINKS_TABLE: &str = "links";
const CONTIGS_TABLE: &str = "contigs";
const BIN_TABLE: &str = "bin";
const META_TABLE: &str = "meta";

const CID_WIDTH: u32 = 512;
const STOIT_NAMES_WIDTH: u32 = 512;
const MER_NAMES_WIDTH: u32 = 4096;

/// The single metadata row, kept as one in-memory struct. Field setters
/// mutate a copy and round-trip the whole row through an atomic replace.
#[derive(Debug, Clone, PartialEq)]
pub struct MetaState {
    pub stoit_col_names: String,
    pub num_stoits: i32,
    pub mer_col_names: String,
    pub mer_size: i32,
    pub num_mers: i32,
    pub num_cons: i32,
    pub num_bins: i32,
    pub clustered: bool,
    pub complete: bool,
    pub format_version: i32,
}

/// How bulk readers pick their rows: by predicate or by explicit indices.
/// Both return arrays aligned to the selection order.
#[derive(Debug, Clone)]
pub enum Selection {
    Matching(Predicate),
    Rows(Vec<ContigRowId>),
}

impl Selection {
    pub fn all() -> Selection {
        Selection::Matching(Predicate::All)
    }
}

fn contigs_schema() -> Schema {
    Schema::new(vec![
        Column::str("cid", CID_WIDTH),
        Column::int("bid"),
        Column::int("length"),
    ])
}

fn bin_schema() -> Schema {
    Schema::new(vec![Column::int("bid"), Column::int("numMembers")])
}

fn kpca_schema() -> Schema {
    Schema::new(vec![Column::float("pc1"), Column::float("pc2")])
}

fn links_schema() -> Schema {
    Schema::new(vec![
        Column::int("contig1"),
        Column::int("contig2"),
        Column::int("numReads"),
        Column::int("linkType"),
        Column::int("gap"),
    ])
}

fn meta_schema() -> Schema {
    Schema::new(vec![
        Column::str("stoitColNames", STOIT_NAMES_WIDTH),
        Column::int("numStoits"),
        Column::str("merColNames", MER_NAMES_WIDTH),
        Column::int("merSize"),
        Column::int("numMers"),
        Column::int("numCons"),
        Column::int("numBins"),
        Column::boolean("clustered"),
        Column::boolean("complete"),
        Column::int("formatVersion"),
    ])
}

// kms and coverage share this shape: one f64 column per discovered name.
fn float_schema(names: &[String]) -> Schema {
    Schema::new(names.iter().map(|n| Column::float(n)).collect())
}

fn meta_row(meta: &MetaState) -> Row {
    vec![
        Value::Str(meta.stoit_col_names.clone()),
        Value::Int(meta.num_stoits),
        Value::Str(meta.mer_col_names.clone()),
        Value::Int(meta.mer_size),
        Value::Int(meta.num_mers),
        Value::Int(meta.num_cons),
        Value::Int(meta.num_bins),
        Value::Bool(meta.clustered),
        Value::Bool(meta.complete),
        Value::Int(meta.format_version),
    ]
}

fn store_err(store: &ColumnStore, msg: impl Into<String>) -> Error {
    Error::Store {
        path: store.path().to_path_buf(),
        msg: msg.into(),
    }
}

/// Reads the single meta row back into a `MetaState`. A database without a
/// meta table was never sealed and is treated as incomplete; a meta row
/// without a formatVersion column predates versioning and reads as 0.
fn read_meta(store: &mut ColumnStore) -> Result<MetaState> {
    if !store.has_table(META_GROUP, META_TABLE) {
        return Err(store_err(
            store,
            "meta table missing -- incomplete or foreign database",
        ));
    }
    let schema = store.schema(META_GROUP, META_TABLE)?.clone();
    let rows = store.read_table(META_GROUP, META_TABLE)?;
    let row = rows
        .first()
        .ok_or_else(|| store_err(store, "meta table is empty"))?;

    let cell = |name: &str| schema.col_index(name).and_then(|i| row.get(i));
    let want_str = |name: &str| {
        cell(name)
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| store_err(store, format!("meta column {name} missing or mistyped")))
    };
    let want_int = |name: &str| {
        cell(name)
            .and_then(Value::as_int)
            .ok_or_else(|| store_err(store, format!("meta column {name} missing or mistyped")))
    };
    let want_bool = |name: &str| {
        cell(name)
            .and_then(Value::as_bool)
            .ok_or_else(|| store_err(store, format!("meta column {name} missing or mistyped")))
    };

    Ok(MetaState {
        stoit_col_names: want_str("stoitColNames")?,
        num_stoits: want_int("numStoits")?,
        mer_col_names: want_str("merColNames")?,
        mer_size: want_int("merSize")?,
        num_mers: want_int("numMers")?,
        num_cons: want_int("numCons")?,
        num_bins: want_int("numBins")?,
        clustered: want_bool("clustered")?,
        complete: want_bool("complete")?,
        format_version: cell("formatVersion").and_then(Value::as_int).unwrap_or(0),
    })
}

fn write_meta(store: &mut ColumnStore, meta: &MetaState) -> Result<()> {
    store.replace_table(META_GROUP, META_TABLE, meta_schema(), &[meta_row(meta)])
}

fn decode_contig(store: &ColumnStore, row: &Row) -> Result<ContigRecord> {
    let bad = || store_err(store, "malformed contigs row");
    Ok(ContigRecord {
        cid: row
            .first()
            .and_then(Value::as_str)
            .ok_or_else(bad)?
            .to_owned(),
        bid: row.get(1).and_then(Value::as_int).ok_or_else(bad)?,
        length: row.get(2).and_then(Value::as_int).ok_or_else(bad)?,
    })
}

fn float_cells(store: &ColumnStore, row: &Row) -> Result<Vec<f64>> {
    row.iter()
        .map(|v| {
            v.as_float()
                .ok_or_else(|| store_err(store, "expected a float cell"))
        })
        .collect()
}

/// Top level handle for creating, upgrading, reading and updating one
/// contig database. Holds only the path; every operation opens the store in
/// scoped form and releases it on return.
pub struct DataManager {
    path: PathBuf,
}

impl DataManager {
    pub fn new(path: impl Into<PathBuf>) -> DataManager {
        DataManager { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parses the contig file and the BAM set and writes a fresh database.
    ///
    /// Refuses to overwrite an existing file unless `force` is set. Tables
    /// are written in dependency order with meta sealed last, so a reader
    /// can treat the presence of meta as the creation commit marker. On
    /// failure the partial file is left behind for inspection.
    pub fn create(
        &self,
        bam_paths: &[PathBuf],
        contigs_path: &Path,
        kmer_size: usize,
        force: bool,
    ) -> Result<()> {
        self.create_with_options(bam_paths, contigs_path, kmer_size, force, &ProfileOptions::default())
    }

    pub fn create_with_options(
        &self,
        bam_paths: &[PathBuf],
        contigs_path: &Path,
        kmer_size: usize,
        force: bool,
        opts: &ProfileOptions,
    ) -> Result<()> {
        if self.path.exists() && !force {
            return Err(Error::OverwriteRefused {
                path: self.path.clone(),
            });
        }
        info!("creating database {}", self.path.display());
        let engine = KmerEngine::new(kmer_size);
        let mut store = ColumnStore::create(&self.path)?;
        store.create_group(PROFILE_GROUP)?;
        store.create_group(META_GROUP)?;
        store.create_group(LINKS_GROUP)?;

        let input = contigs::open_contig_stream(contigs_path)?;
        let profile = contigs::profile(input, &engine, opts)?;

        let kms_rows: Vec<Row> = profile
            .sigs
            .iter()
            .map(|sig| sig.iter().map(|&v| Value::Float(v)).collect())
            .collect();
        store.create_table(
            PROFILE_GROUP,
            KMS_TABLE,
            float_schema(engine.canonical_cols()),
            &kms_rows,
        )?;

        let kpca_rows: Vec<Row> = profile
            .pca
            .iter()
            .map(|&(pc1, pc2)| vec![Value::Float(pc1), Value::Float(pc2)])
            .collect();
        store.create_table(PROFILE_GROUP, KPCA_TABLE, kpca_schema(), &kpca_rows)?;

        let contig_rows: Vec<Row> = profile
            .names
            .iter()
            .zip(&profile.lengths)
            .map(|(name, &len)| {
                vec![
                    Value::Str(name.clone()),
                    Value::Int(0),
                    Value::Int(len as i32),
                ]
            })
            .collect();
        store.create_table(META_GROUP, CONTIGS_TABLE, contigs_schema(), &contig_rows)?;
        store.create_table(META_GROUP, BIN_TABLE, bin_schema(), &[])?;

        let set = ContigSet::new(&profile.names, &profile.lengths);
        let bam_profile = bam::aggregate(bam_paths, &set)?;

        let cov_rows: Vec<Row> = bam_profile
            .coverage
            .iter()
            .map(|row| row.iter().map(|&v| Value::Float(v)).collect())
            .collect();
        store.create_table(
            PROFILE_GROUP,
            COVERAGE_TABLE,
            float_schema(&bam_profile.stoit_names),
            &cov_rows,
        )?;

        let link_rows: Vec<Row> = bam_profile.links.iter().map(link_row).collect();
        store.create_table(LINKS_GROUP, LINKS_TABLE, links_schema(), &link_rows)?;

        let meta = MetaState {
            stoit_col_names: bam_profile.stoit_names.join(","),
            num_stoits: bam_profile.stoit_names.len() as i32,
            mer_col_names: engine.joined_cols(),
            mer_size: engine.k() as i32,
            num_mers: engine.num_mers() as i32,
            num_cons: profile.len() as i32,
            num_bins: 0,
            clustered: false,
            complete: false,
            format_version: CURRENT_FORMAT_VERSION,
        };
        store.create_table(META_GROUP, META_TABLE, meta_schema(), &[meta_row(&meta)])?;

        info!(
            "database written: {} contigs, {} BAM files, {} links",
            profile.len(),
            bam_profile.stoit_names.len(),
            bam_profile.links.len()
        );
        Ok(())
    }

    /// Brings an older database up to the current format version, applying
    /// registered upgrade steps in strict ascending order. A no-op on
    /// current databases.
    pub fn check_and_upgrade(&self) -> Result<()> {
        let version = {
            let mut store = ColumnStore::open(&self.path)?;
            read_meta(&mut store)?.format_version
        };
        if version >= CURRENT_FORMAT_VERSION {
            return Ok(());
        }
        let mut store = ColumnStore::open_rw(&self.path)?;
        store.remove_stale_tmp()?;
        let mut meta = read_meta(&mut store)?;
        while meta.format_version < CURRENT_FORMAT_VERSION {
            match meta.format_version {
                0 => upgrade_v0_to_v1(&mut store, &mut meta)?,
                v => {
                    return Err(Error::Upgrade {
                        path: self.path.clone(),
                        version: v,
                        msg: "no upgrade step registered".into(),
                    })
                }
            }
        }
        Ok(())
    }

    // Readers upgrade on open, then work against a read-only handle.
    fn open_current(&self) -> Result<ColumnStore> {
        self.check_and_upgrade()?;
        ColumnStore::open(&self.path)
    }

    // Writers additionally clear scratch tables a crashed writer left.
    fn open_rw_current(&self) -> Result<ColumnStore> {
        self.check_and_upgrade()?;
        let mut store = ColumnStore::open_rw(&self.path)?;
        store.remove_stale_tmp()?;
        Ok(store)
    }

    fn select_rows(store: &mut ColumnStore, predicate: &Predicate) -> Result<Vec<ContigRowId>> {
        debug!("selecting contigs where {predicate}");
        let rows = store.read_table(META_GROUP, CONTIGS_TABLE)?;
        let mut out = Vec::new();
        for (i, row) in rows.iter().enumerate() {
            if predicate.matches(&decode_contig(store, row)?) {
                out.push(ContigRowId(i as u32));
            }
        }
        Ok(out)
    }

    fn resolve(store: &mut ColumnStore, selection: &Selection) -> Result<Vec<u32>> {
        match selection {
            Selection::Matching(p) => {
                Ok(Self::select_rows(store, p)?.iter().map(|r| r.as_u32()).collect())
            }
            Selection::Rows(rows) => Ok(rows.iter().map(|r| r.as_u32()).collect()),
        }
    }

    /// Row indices of all contigs matching `predicate`, ascending.
    pub fn select_indices(&self, predicate: &Predicate) -> Result<Vec<ContigRowId>> {
        let mut store = self.open_current()?;
        Self::select_rows(&mut store, predicate)
    }

    pub fn coverage(&self, selection: &Selection) -> Result<Vec<Vec<f64>>> {
        let mut store = self.open_current()?;
        let rows = Self::resolve(&mut store, selection)?;
        let data = store.read_rows(PROFILE_GROUP, COVERAGE_TABLE, &rows)?;
        data.iter().map(|row| float_cells(&store, row)).collect()
    }

    pub fn kmer_sigs(&self, selection: &Selection) -> Result<Vec<Vec<f64>>> {
        let mut store = self.open_current()?;
        let rows = Self::resolve(&mut store, selection)?;
        let data = store.read_rows(PROFILE_GROUP, KMS_TABLE, &rows)?;
        data.iter().map(|row| float_cells(&store, row)).collect()
    }

    pub fn kmer_pcas(&self, selection: &Selection) -> Result<Vec<(f64, f64)>> {
        let mut store = self.open_current()?;
        let rows = Self::resolve(&mut store, selection)?;
        let data = store.read_rows(PROFILE_GROUP, KPCA_TABLE, &rows)?;
        data.iter()
            .map(|row| {
                let cells = float_cells(&store, row)?;
                match cells.as_slice() {
                    [pc1, pc2] => Ok((*pc1, *pc2)),
                    _ => Err(store_err(&store, "malformed kpca row")),
                }
            })
            .collect()
    }

    pub fn contig_names(&self, selection: &Selection) -> Result<Vec<String>> {
        Ok(self
            .contig_records(selection)?
            .into_iter()
            .map(|r| r.cid)
            .collect())
    }

    pub fn contig_lengths(&self, selection: &Selection) -> Result<Vec<u32>> {
        Ok(self
            .contig_records(selection)?
            .into_iter()
            .map(|r| r.length as u32)
            .collect())
    }

    pub fn bins(&self, selection: &Selection) -> Result<Vec<i32>> {
        Ok(self
            .contig_records(selection)?
            .into_iter()
            .map(|r| r.bid)
            .collect())
    }

    fn contig_records(&self, selection: &Selection) -> Result<Vec<ContigRecord>> {
        let mut store = self.open_current()?;
        let rows = Self::resolve(&mut store, selection)?;
        let data = store.read_rows(META_GROUP, CONTIGS_TABLE, &rows)?;
        data.iter().map(|row| decode_contig(&store, row)).collect()
    }

    /// The full link table.
    pub fn links(&self) -> Result<Vec<ContigLink>> {
        let mut store = self.open_current()?;
        let rows = store.read_table(LINKS_GROUP, LINKS_TABLE)?;
        rows.iter()
            .map(|row| {
                let bad = || store_err(&store, "malformed links row");
                let int = |i: usize| row.get(i).and_then(Value::as_int).ok_or_else(bad);
                Ok(ContigLink {
                    contig1: ContigRowId(int(0)? as u32),
                    contig2: ContigRowId(int(1)? as u32),
                    num_reads: int(2)? as u32,
                    link_type: LinkType::from_code(int(3)?).ok_or_else(bad)?,
                    gap: int(4)?,
                })
            })
            .collect()
    }

    /// The whole metadata row.
    pub fn meta(&self) -> Result<MetaState> {
        let mut store = self.open_current()?;
        read_meta(&mut store)
    }

    pub fn stoit_col_names(&self) -> Result<String> {
        Ok(self.meta()?.stoit_col_names)
    }

    pub fn num_stoits(&self) -> Result<i32> {
        Ok(self.meta()?.num_stoits)
    }

    pub fn mer_col_names(&self) -> Result<String> {
        Ok(self.meta()?.mer_col_names)
    }

    pub fn mer_size(&self) -> Result<i32> {
        Ok(self.meta()?.mer_size)
    }

    pub fn num_mers(&self) -> Result<i32> {
        Ok(self.meta()?.num_mers)
    }

    pub fn num_cons(&self) -> Result<i32> {
        Ok(self.meta()?.num_cons)
    }

    pub fn num_bins(&self) -> Result<i32> {
        Ok(self.meta()?.num_bins)
    }

    pub fn is_clustered(&self) -> Result<bool> {
        Ok(self.meta()?.clustered)
    }

    pub fn is_complete(&self) -> Result<bool> {
        Ok(self.meta()?.complete)
    }

    fn update_meta(&self, apply: impl FnOnce(&mut MetaState)) -> Result<()> {
        let mut store = self.open_rw_current()?;
        let mut meta = read_meta(&mut store)?;
        apply(&mut meta);
        write_meta(&mut store, &meta)
    }

    pub fn set_num_bins(&self, num_bins: i32) -> Result<()> {
        self.update_meta(|m| m.num_bins = num_bins)
    }

    pub fn set_clustered(&self, state: bool) -> Result<()> {
        self.update_meta(|m| m.clustered = state)
    }

    pub fn set_complete(&self, state: bool) -> Result<()> {
        self.update_meta(|m| m.complete = state)
    }

    /// Points the given contig rows at new bins. The whole contigs table is
    /// rebuilt and swapped in atomically; untouched rows are preserved
    /// byte for byte.
    pub fn set_bin_assignments(&self, updates: &BTreeMap<ContigRowId, i32>) -> Result<()> {
        let mut store = self.open_rw_current()?;
        let mut rows = store.read_table(META_GROUP, CONTIGS_TABLE)?;
        for (&row_id, &bid) in updates {
            let idx = row_id.as_usize();
            if idx >= rows.len() {
                return Err(store_err(
                    &store,
                    format!("bin update for row {idx} outside the contig table"),
                ));
            }
            rows[idx][1] = Value::Int(bid);
        }
        store.replace_table(META_GROUP, CONTIGS_TABLE, contigs_schema(), &rows)
    }

    /// Drops every bin assignment, empties the bin table and zeroes
    /// `numBins`, leaving the contig rows otherwise untouched.
    pub fn nuke_bins(&self) -> Result<()> {
        info!("clearing all bin information in {}", self.path.display());
        let mut store = self.open_rw_current()?;
        let mut rows = store.read_table(META_GROUP, CONTIGS_TABLE)?;
        for row in rows.iter_mut() {
            row[1] = Value::Int(0);
        }
        store.replace_table(META_GROUP, CONTIGS_TABLE, contigs_schema(), &rows)?;
        store.replace_table(META_GROUP, BIN_TABLE, bin_schema(), &[])?;
        let mut meta = read_meta(&mut store)?;
        meta.num_bins = 0;
        write_meta(&mut store, &meta)
    }

    /// Replaces the bin table with `(bid, numMembers)` rows and keeps
    /// `numBins` in step.
    pub fn set_bin_stats(&self, stats: &[(i32, u32)]) -> Result<()> {
        let mut store = self.open_rw_current()?;
        let rows: Vec<Row> = stats
            .iter()
            .map(|&(bid, members)| vec![Value::Int(bid), Value::Int(members as i32)])
            .collect();
        store.replace_table(META_GROUP, BIN_TABLE, bin_schema(), &rows)?;
        let mut meta = read_meta(&mut store)?;
        meta.num_bins = stats.len() as i32;
        write_meta(&mut store, &meta)
    }

    pub fn bin_stats(&self) -> Result<BTreeMap<i32, u32>> {
        let mut store = self.open_current()?;
        let rows = store.read_table(META_GROUP, BIN_TABLE)?;
        rows.iter()
            .map(|row| {
                let bad = || store_err(&store, "malformed bin row");
                let bid = row.first().and_then(Value::as_int).ok_or_else(bad)?;
                let members = row.get(1).and_then(Value::as_int).ok_or_else(bad)?;
                Ok((bid, members as u32))
            })
            .collect()
    }

    /// Merges `deltas` into the bin table: a member count of 0 removes the
    /// bin, unknown bids are inserted, known ones updated.
    pub fn update_bin_stats(&self, deltas: &BTreeMap<i32, u32>) -> Result<()> {
        let mut current = self.bin_stats()?;
        for (&bid, &members) in deltas {
            if members == 0 {
                current.remove(&bid);
            } else {
                current.insert(bid, members);
            }
        }
        let stats: Vec<(i32, u32)> = current.into_iter().collect();
        self.set_bin_stats(&stats)
    }

    /// Writes every table to `out` in the flat comma-separated layout the
    /// screen dump always used.
    pub fn dump(&self, out: &mut dyn Write) -> Result<()> {
        let mut store = self.open_current()?;
        let meta = read_meta(&mut store)?;

        writeln!(out, "-- coverage ({}) --", meta.stoit_col_names)?;
        for row in store.read_table(PROFILE_GROUP, COVERAGE_TABLE)? {
            let cells = float_cells(&store, &row)?;
            writeln!(out, "{}", join_floats(&cells))?;
        }

        writeln!(out, "-- kmer signatures --")?;
        for row in store.read_table(PROFILE_GROUP, KMS_TABLE)? {
            let cells = float_cells(&store, &row)?;
            writeln!(out, "{}", join_floats(&cells))?;
        }

        writeln!(out, "-- contigs --")?;
        for row in store.read_table(META_GROUP, CONTIGS_TABLE)? {
            let rec = decode_contig(&store, &row)?;
            writeln!(out, "{},{},{}", rec.cid, rec.length, rec.bid)?;
        }

        writeln!(out, "-- meta --")?;
        writeln!(out, "stoitColNames,{}", meta.stoit_col_names)?;
        writeln!(out, "numStoits,{}", meta.num_stoits)?;
        writeln!(out, "merSize,{}", meta.mer_size)?;
        writeln!(out, "numMers,{}", meta.num_mers)?;
        writeln!(out, "numCons,{}", meta.num_cons)?;
        writeln!(out, "numBins,{}", meta.num_bins)?;
        writeln!(out, "clustered,{}", meta.clustered)?;
        writeln!(out, "complete,{}", meta.complete)?;
        writeln!(out, "formatVersion,{}", meta.format_version)?;
        Ok(())
    }
}

fn link_row(link: &ContigLink) -> Row {
    vec![
        Value::Int(link.contig1.as_u32() as i32),
        Value::Int(link.contig2.as_u32() as i32),
        Value::Int(link.num_reads as i32),
        Value::Int(link.link_type.code()),
        Value::Int(link.gap),
    ]
}

fn join_floats(cells: &[f64]) -> String {
    cells
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

// Version 0 databases predate the stored 2-D projection: compute kpca from
// the signatures already on disk, then stamp the new version. Meta is
// rewritten last so a crash mid-upgrade leaves a version-0 file that simply
// upgrades again.
fn upgrade_v0_to_v1(store: &mut ColumnStore, meta: &mut MetaState) -> Result<()> {
    info!(
        "upgrading {} from format version 0 to 1",
        store.path().display()
    );
    if !store.has_table(PROFILE_GROUP, KMS_TABLE) {
        return Err(Error::Upgrade {
            path: store.path().to_path_buf(),
            version: 0,
            msg: "kms table missing, cannot compute the 2-D projection".into(),
        });
    }
    let sig_rows = store.read_table(PROFILE_GROUP, KMS_TABLE)?;
    let sigs: Vec<Vec<f64>> = sig_rows
        .iter()
        .map(|row| float_cells(store, row))
        .collect::<Result<_>>()?;
    let projected = pca::project_2d(&sigs);
    let rows: Vec<Row> = projected
        .iter()
        .map(|&(pc1, pc2)| vec![Value::Float(pc1), Value::Float(pc2)])
        .collect();
    if store.has_table(PROFILE_GROUP, KPCA_TABLE) {
        store.replace_table(PROFILE_GROUP, KPCA_TABLE, kpca_schema(), &rows)?;
    } else {
        store.create_table(PROFILE_GROUP, KPCA_TABLE, kpca_schema(), &rows)?;
    }
    meta.format_version = 1;
    write_meta(store, meta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn meta_row_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db.gm");
        let meta = MetaState {
            stoit_col_names: "a,b".into(),
            num_stoits: 2,
            mer_col_names: "AA,AC".into(),
            mer_size: 2,
            num_mers: 2,
            num_cons: 5,
            num_bins: 1,
            clustered: true,
            complete: false,
            format_version: 1,
        };
        {
            let mut store = ColumnStore::create(&path).unwrap();
            store.create_group(META_GROUP).unwrap();
            store
                .create_table(META_GROUP, META_TABLE, meta_schema(), &[meta_row(&meta)])
                .unwrap();
        }
        let mut store = ColumnStore::open(&path).unwrap();
        assert_eq!(read_meta(&mut store).unwrap(), meta);
    }

    #[test]
    fn meta_without_version_column_reads_as_zero() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db.gm");
        // The pre-versioning schema stops at the workflow flags.
        let old_schema = Schema::new(vec![
            Column::str("stoitColNames", 512),
            Column::int("numStoits"),
            Column::str("merColNames", 4096),
            Column::int("merSize"),
            Column::int("numMers"),
            Column::int("numCons"),
            Column::int("numBins"),
            Column::boolean("clustered"),
            Column::boolean("complete"),
        ]);
        let row = vec![
            Value::Str(String::new()),
            Value::Int(0),
            Value::Str("AA".into()),
            Value::Int(2),
            Value::Int(1),
            Value::Int(0),
            Value::Int(0),
            Value::Bool(false),
            Value::Bool(false),
        ];
        {
            let mut store = ColumnStore::create(&path).unwrap();
            store.create_group(META_GROUP).unwrap();
            store
                .create_table(META_GROUP, META_TABLE, old_schema, &[row])
                .unwrap();
        }
        let mut store = ColumnStore::open(&path).unwrap();
        assert_eq!(read_meta(&mut store).unwrap().format_version, 0);
    }

    #[test]
    fn missing_meta_reads_as_incomplete() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db.gm");
        {
            let mut store = ColumnStore::create(&path).unwrap();
            store.create_group(META_GROUP).unwrap();
        }
        let mut store = ColumnStore::open(&path).unwrap();
        assert!(matches!(read_meta(&mut store), Err(Error::Store { .. })));
    }
}
