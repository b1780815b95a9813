use std::fs::{File, OpenOptions};
use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use crc::{Crc, CRC_32_ISO_HDLC};

use crate::error::{Error, Result};

pub const PROFILE_GROUP: &str = "profile";
pub const META_GROUP: &str = "meta";
pub const LINKS_GROUP: &str = "links";

/// Prefix of the scratch tables used by atomic replacement.
pub const TMP_PREFIX: &str = "tmp_";

const MAGIC: [u8; 4] = *b"GMDB";
const CONTAINER_FORMAT: u32 = 1;
const SUPERBLOCK_LEN: u64 = 40;
// Upper bound for any single length field in the directory, to fail cleanly
// on corruption the checksum somehow missed.
const MAX_DIR_FIELD: u32 = 1 << 24;

const DIR_CRC: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Semantic column types. Strings are fixed-width and NUL-padded on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Int,
    Float,
    Bool,
    Str(u32),
}

impl ColumnType {
    fn width(self) -> usize {
        match self {
            ColumnType::Int => 4,
            ColumnType::Float => 8,
            ColumnType::Bool => 1,
            ColumnType::Str(w) => w as usize,
        }
    }

    fn tag(self) -> u8 {
        match self {
            ColumnType::Int => 0,
            ColumnType::Float => 1,
            ColumnType::Bool => 2,
            ColumnType::Str(_) => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub ty: ColumnType,
}

impl Column {
    pub fn int(name: &str) -> Column {
        Column {
            name: name.into(),
            ty: ColumnType::Int,
        }
    }

    pub fn float(name: &str) -> Column {
        Column {
            name: name.into(),
            ty: ColumnType::Float,
        }
    }

    pub fn boolean(name: &str) -> Column {
        Column {
            name: name.into(),
            ty: ColumnType::Bool,
        }
    }

    pub fn str(name: &str, width: u32) -> Column {
        Column {
            name: name.into(),
            ty: ColumnType::Str(width),
        }
    }
}

/// Ordered column declarations of one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    pub columns: Vec<Column>,
}

impl Schema {
    pub fn new(columns: Vec<Column>) -> Schema {
        Schema { columns }
    }

    pub fn row_width(&self) -> usize {
        self.columns.iter().map(|c| c.ty.width()).sum()
    }

    pub fn col_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }
}

/// One cell. Tables are dynamically typed at this level because coverage and
/// k-mer column sets are only discovered at creation time; the schema check
/// happens when rows are encoded.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i32),
    Float(f64),
    Bool(bool),
    Str(String),
}

impl Value {
    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(v) => Some(v),
            _ => None,
        }
    }
}

pub type Row = Vec<Value>;

#[derive(Debug, Clone)]
struct TableEntry {
    name: String,
    schema: Schema,
    rows: u64,
    offset: u64,
    len: u64,
}

#[derive(Debug, Clone)]
struct GroupEntry {
    name: String,
    tables: Vec<TableEntry>,
}

#[derive(Debug, Clone, Default)]
struct Directory {
    groups: Vec<GroupEntry>,
}

/// Single-file hierarchical container of typed, fixed-width tables.
///
/// The file is a 40-byte superblock followed by appended blobs (table data
/// and directory images). The superblock points at the live directory; every
/// mutation appends its data and a fresh directory, then commits by
/// rewriting the superblock in place. A reader therefore sees either the
/// pre- or the post-commit state of the file, never a torn table, which is
/// what makes the `tmp_` write-then-rename replacement discipline safe.
/// Superseded blobs stay behind as dead bytes; there is no compaction.
pub struct ColumnStore {
    path: PathBuf,
    file: File,
    dir: Directory,
    writable: bool,
}

impl ColumnStore {
    /// Creates an empty container, truncating anything already at `path`.
    pub fn create(path: &Path) -> Result<ColumnStore> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        let mut store = ColumnStore {
            path: path.to_path_buf(),
            file,
            dir: Directory::default(),
            writable: true,
        };
        store.commit()?;
        Ok(store)
    }

    pub fn open(path: &Path) -> Result<ColumnStore> {
        Self::open_with(path, false)
    }

    pub fn open_rw(path: &Path) -> Result<ColumnStore> {
        Self::open_with(path, true)
    }

    fn open_with(path: &Path, writable: bool) -> Result<ColumnStore> {
        let err = |msg: &str| Error::Store {
            path: path.to_path_buf(),
            msg: msg.into(),
        };
        let mut file = OpenOptions::new()
            .read(true)
            .write(writable)
            .open(path)
            .map_err(|e| err(&format!("cannot open container: {e}")))?;

        if file.metadata()?.len() < SUPERBLOCK_LEN {
            return Err(err("truncated superblock, not a contig database"));
        }
        let mut sb = [0u8; SUPERBLOCK_LEN as usize];
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut sb)?;
        let mut cur = Cursor::new(&sb[..]);
        let mut magic = [0u8; 4];
        cur.read_exact(&mut magic)?;
        if magic != MAGIC {
            return Err(err("bad magic, not a contig database"));
        }
        let format = cur.read_u32::<LittleEndian>()?;
        if format != CONTAINER_FORMAT {
            return Err(Error::Store {
                path: path.to_path_buf(),
                msg: format!("unsupported container format {format}"),
            });
        }
        let dir_offset = cur.read_u64::<LittleEndian>()?;
        let dir_len = cur.read_u64::<LittleEndian>()?;
        let dir_crc = cur.read_u32::<LittleEndian>()?;

        let file_len = file.metadata()?.len();
        if dir_offset < SUPERBLOCK_LEN || dir_offset.saturating_add(dir_len) > file_len {
            return Err(err("directory pointer out of bounds"));
        }
        let mut blob = vec![0u8; dir_len as usize];
        file.seek(SeekFrom::Start(dir_offset))?;
        file.read_exact(&mut blob)?;
        if DIR_CRC.checksum(&blob) != dir_crc {
            return Err(err("directory checksum mismatch"));
        }
        let dir = decode_directory(&blob, path)?;
        Ok(ColumnStore {
            path: path.to_path_buf(),
            file,
            dir,
            writable,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn err(&self, msg: impl Into<String>) -> Error {
        Error::Store {
            path: self.path.clone(),
            msg: msg.into(),
        }
    }

    fn require_writable(&self) -> Result<()> {
        if self.writable {
            Ok(())
        } else {
            Err(self.err("store was opened read-only"))
        }
    }

    fn group(&self, group: &str) -> Result<&GroupEntry> {
        self.dir
            .groups
            .iter()
            .find(|g| g.name == group)
            .ok_or_else(|| self.err(format!("no such group /{group}")))
    }

    fn entry(&self, group: &str, table: &str) -> Result<&TableEntry> {
        self.group(group)?
            .tables
            .iter()
            .find(|t| t.name == table)
            .ok_or_else(|| self.err(format!("no such table /{group}/{table}")))
    }

    pub fn create_group(&mut self, name: &str) -> Result<()> {
        self.require_writable()?;
        if self.dir.groups.iter().any(|g| g.name == name) {
            return Err(self.err(format!("group /{name} already exists")));
        }
        self.dir.groups.push(GroupEntry {
            name: name.into(),
            tables: Vec::new(),
        });
        self.commit()
    }

    pub fn has_group(&self, name: &str) -> bool {
        self.dir.groups.iter().any(|g| g.name == name)
    }

    pub fn has_table(&self, group: &str, table: &str) -> bool {
        self.group(group)
            .map(|g| g.tables.iter().any(|t| t.name == table))
            .unwrap_or(false)
    }

    pub fn table_names(&self, group: &str) -> Result<Vec<String>> {
        Ok(self.group(group)?.tables.iter().map(|t| t.name.clone()).collect())
    }

    pub fn row_count(&self, group: &str, table: &str) -> Result<u64> {
        Ok(self.entry(group, table)?.rows)
    }

    pub fn schema(&self, group: &str, table: &str) -> Result<&Schema> {
        Ok(&self.entry(group, table)?.schema)
    }

    /// Creates a table from its full row set. Tables in this container are
    /// written whole; there is no appending after creation.
    pub fn create_table(
        &mut self,
        group: &str,
        table: &str,
        schema: Schema,
        rows: &[Row],
    ) -> Result<()> {
        self.require_writable()?;
        if self.has_table(group, table) {
            return Err(self.err(format!("table /{group}/{table} already exists")));
        }
        self.group(group)?; // group must exist before we append anything

        let mut data = Vec::with_capacity(schema.row_width() * rows.len());
        for row in rows {
            self.encode_row(&schema, row, &mut data)?;
        }
        let (offset, len) = self.append_blob(&data)?;
        let group_entry = self
            .dir
            .groups
            .iter_mut()
            .find(|g| g.name == group)
            .expect("group checked above");
        group_entry.tables.push(TableEntry {
            name: table.into(),
            schema,
            rows: rows.len() as u64,
            offset,
            len,
        });
        self.commit()
    }

    pub fn read_table(&mut self, group: &str, table: &str) -> Result<Vec<Row>> {
        let entry = self.entry(group, table)?;
        let schema = entry.schema.clone();
        let (rows, offset) = (entry.rows, entry.offset);
        let width = schema.row_width();

        if width == 0 {
            return Ok(vec![Vec::new(); rows as usize]);
        }
        let mut data = vec![0u8; width * rows as usize];
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(&mut data)?;
        data.chunks_exact(width)
            .map(|chunk| self.decode_row(&schema, chunk))
            .collect()
    }

    /// Reads single rows by index, in the order given.
    pub fn read_rows(&mut self, group: &str, table: &str, indices: &[u32]) -> Result<Vec<Row>> {
        let entry = self.entry(group, table)?;
        let schema = entry.schema.clone();
        let (rows, offset) = (entry.rows, entry.offset);
        let width = schema.row_width();

        let mut out = Vec::with_capacity(indices.len());
        let mut buf = vec![0u8; width];
        for &idx in indices {
            if u64::from(idx) >= rows {
                return Err(self.err(format!(
                    "row {idx} out of range for /{group}/{table} ({rows} rows)"
                )));
            }
            self.file
                .seek(SeekFrom::Start(offset + u64::from(idx) * width as u64))?;
            self.file.read_exact(&mut buf)?;
            out.push(self.decode_row(&schema, &buf)?);
        }
        Ok(out)
    }

    pub fn remove_table(&mut self, group: &str, table: &str) -> Result<bool> {
        self.require_writable()?;
        let group_entry = self
            .dir
            .groups
            .iter_mut()
            .find(|g| g.name == group)
            .ok_or_else(|| Error::Store {
                path: self.path.clone(),
                msg: format!("no such group /{group}"),
            })?;
        let before = group_entry.tables.len();
        group_entry.tables.retain(|t| t.name != table);
        if group_entry.tables.len() == before {
            return Ok(false);
        }
        self.commit()?;
        Ok(true)
    }

    /// Renames `from` over `to` within a group, dropping any existing `to`.
    /// The swap is a single directory commit, so readers observe the old or
    /// the new table and nothing in between.
    pub fn rename_table(&mut self, group: &str, from: &str, to: &str) -> Result<()> {
        self.require_writable()?;
        self.entry(group, from)?;
        let group_entry = self
            .dir
            .groups
            .iter_mut()
            .find(|g| g.name == group)
            .expect("entry lookup checked the group");
        group_entry.tables.retain(|t| t.name != to);
        for t in group_entry.tables.iter_mut() {
            if t.name == from {
                t.name = to.into();
            }
        }
        self.commit()
    }

    /// Atomic replacement: drop a stale scratch table if a previous attempt
    /// crashed, write the replacement under the scratch name, then rename it
    /// over the target.
    pub fn replace_table(
        &mut self,
        group: &str,
        table: &str,
        schema: Schema,
        rows: &[Row],
    ) -> Result<()> {
        let tmp = format!("{TMP_PREFIX}{table}");
        if self.has_table(group, &tmp) {
            self.remove_table(group, &tmp)?;
        }
        self.create_table(group, &tmp, schema, rows)?;
        self.rename_table(group, &tmp, table)
    }

    /// Drops every `tmp_` table left behind by a crashed writer. Called at
    /// the start of write operations.
    pub fn remove_stale_tmp(&mut self) -> Result<usize> {
        self.require_writable()?;
        let mut removed = 0;
        for group in self.dir.groups.iter_mut() {
            let before = group.tables.len();
            group.tables.retain(|t| !t.name.starts_with(TMP_PREFIX));
            removed += before - group.tables.len();
        }
        if removed > 0 {
            self.commit()?;
        }
        Ok(removed)
    }

    fn append_blob(&mut self, data: &[u8]) -> Result<(u64, u64)> {
        let end = self.file.seek(SeekFrom::End(0))?;
        let offset = end.max(SUPERBLOCK_LEN);
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(data)?;
        Ok((offset, data.len() as u64))
    }

    // Appends the directory image, makes it durable, then swings the
    // superblock pointer. The pointer write is the commit point.
    fn commit(&mut self) -> Result<()> {
        let blob = encode_directory(&self.dir);
        let (offset, len) = self.append_blob(&blob)?;
        self.file.sync_data()?;

        let mut sb = Vec::with_capacity(SUPERBLOCK_LEN as usize);
        sb.extend_from_slice(&MAGIC);
        sb.write_u32::<LittleEndian>(CONTAINER_FORMAT)?;
        sb.write_u64::<LittleEndian>(offset)?;
        sb.write_u64::<LittleEndian>(len)?;
        sb.write_u32::<LittleEndian>(DIR_CRC.checksum(&blob))?;
        sb.resize(SUPERBLOCK_LEN as usize, 0);
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&sb)?;
        self.file.sync_data()?;
        Ok(())
    }

    fn encode_row(&self, schema: &Schema, row: &Row, out: &mut Vec<u8>) -> Result<()> {
        if row.len() != schema.columns.len() {
            return Err(self.err(format!(
                "row has {} cells, schema has {} columns",
                row.len(),
                schema.columns.len()
            )));
        }
        for (col, value) in schema.columns.iter().zip(row) {
            match (col.ty, value) {
                (ColumnType::Int, Value::Int(v)) => out.write_i32::<LittleEndian>(*v)?,
                (ColumnType::Float, Value::Float(v)) => out.write_f64::<LittleEndian>(*v)?,
                (ColumnType::Bool, Value::Bool(v)) => out.push(u8::from(*v)),
                (ColumnType::Str(w), Value::Str(s)) => {
                    let bytes = s.as_bytes();
                    if bytes.len() > w as usize {
                        return Err(self.err(format!(
                            "value of {} bytes too long for column {} (width {w})",
                            bytes.len(),
                            col.name
                        )));
                    }
                    out.extend_from_slice(bytes);
                    out.extend(std::iter::repeat(0u8).take(w as usize - bytes.len()));
                }
                (ty, value) => {
                    return Err(self.err(format!(
                        "type mismatch for column {}: expected {ty:?}, got {value:?}",
                        col.name
                    )))
                }
            }
        }
        Ok(())
    }

    fn decode_row(&self, schema: &Schema, mut bytes: &[u8]) -> Result<Row> {
        let mut row = Vec::with_capacity(schema.columns.len());
        for col in &schema.columns {
            match col.ty {
                ColumnType::Int => row.push(Value::Int(bytes.read_i32::<LittleEndian>()?)),
                ColumnType::Float => row.push(Value::Float(bytes.read_f64::<LittleEndian>()?)),
                ColumnType::Bool => {
                    let mut b = [0u8; 1];
                    bytes.read_exact(&mut b)?;
                    row.push(Value::Bool(b[0] != 0));
                }
                ColumnType::Str(w) => {
                    let (cell, rest) = bytes.split_at(w as usize);
                    bytes = rest;
                    let end = cell.iter().position(|&b| b == 0).unwrap_or(cell.len());
                    let s = std::str::from_utf8(&cell[..end])
                        .map_err(|_| self.err(format!("column {} is not UTF-8", col.name)))?;
                    row.push(Value::Str(s.to_owned()));
                }
            }
        }
        Ok(row)
    }
}

fn write_str(out: &mut Vec<u8>, s: &str) {
    out.write_u32::<LittleEndian>(s.len() as u32).unwrap();
    out.extend_from_slice(s.as_bytes());
}

fn encode_directory(dir: &Directory) -> Vec<u8> {
    let mut out = Vec::new();
    out.write_u32::<LittleEndian>(dir.groups.len() as u32).unwrap();
    for group in &dir.groups {
        write_str(&mut out, &group.name);
        out.write_u32::<LittleEndian>(group.tables.len() as u32).unwrap();
        for table in &group.tables {
            write_str(&mut out, &table.name);
            out.write_u32::<LittleEndian>(table.schema.columns.len() as u32)
                .unwrap();
            for col in &table.schema.columns {
                write_str(&mut out, &col.name);
                out.push(col.ty.tag());
                if let ColumnType::Str(w) = col.ty {
                    out.write_u32::<LittleEndian>(w).unwrap();
                }
            }
            out.write_u64::<LittleEndian>(table.rows).unwrap();
            out.write_u64::<LittleEndian>(table.offset).unwrap();
            out.write_u64::<LittleEndian>(table.len).unwrap();
        }
    }
    out
}

fn decode_directory(blob: &[u8], path: &Path) -> Result<Directory> {
    let corrupt = |msg: &str| Error::Store {
        path: path.to_path_buf(),
        msg: format!("corrupt directory: {msg}"),
    };
    let mut cur = Cursor::new(blob);

    let read_str = |cur: &mut Cursor<&[u8]>| -> Result<String> {
        let len = cur.read_u32::<LittleEndian>().map_err(|_| corrupt("short read"))?;
        if len > MAX_DIR_FIELD {
            return Err(corrupt("oversized string"));
        }
        let mut bytes = vec![0u8; len as usize];
        cur.read_exact(&mut bytes).map_err(|_| corrupt("short read"))?;
        String::from_utf8(bytes).map_err(|_| corrupt("non-UTF-8 name"))
    };

    let n_groups = cur
        .read_u32::<LittleEndian>()
        .map_err(|_| corrupt("short read"))?;
    if n_groups > MAX_DIR_FIELD {
        return Err(corrupt("oversized group count"));
    }
    let mut groups = Vec::with_capacity(n_groups as usize);
    for _ in 0..n_groups {
        let group_name = read_str(&mut cur)?;
        let n_tables = cur
            .read_u32::<LittleEndian>()
            .map_err(|_| corrupt("short read"))?;
        if n_tables > MAX_DIR_FIELD {
            return Err(corrupt("oversized table count"));
        }
        let mut tables = Vec::with_capacity(n_tables as usize);
        for _ in 0..n_tables {
            let table_name = read_str(&mut cur)?;
            let n_cols = cur
                .read_u32::<LittleEndian>()
                .map_err(|_| corrupt("short read"))?;
            if n_cols > MAX_DIR_FIELD {
                return Err(corrupt("oversized column count"));
            }
            let mut columns = Vec::with_capacity(n_cols as usize);
            for _ in 0..n_cols {
                let col_name = read_str(&mut cur)?;
                let tag = cur.read_u8().map_err(|_| corrupt("short read"))?;
                let ty = match tag {
                    0 => ColumnType::Int,
                    1 => ColumnType::Float,
                    2 => ColumnType::Bool,
                    3 => {
                        let w = cur
                            .read_u32::<LittleEndian>()
                            .map_err(|_| corrupt("short read"))?;
                        if w > MAX_DIR_FIELD {
                            return Err(corrupt("oversized string column"));
                        }
                        ColumnType::Str(w)
                    }
                    _ => return Err(corrupt("unknown column type tag")),
                };
                columns.push(Column {
                    name: col_name,
                    ty,
                });
            }
            let rows = cur
                .read_u64::<LittleEndian>()
                .map_err(|_| corrupt("short read"))?;
            let offset = cur
                .read_u64::<LittleEndian>()
                .map_err(|_| corrupt("short read"))?;
            let len = cur
                .read_u64::<LittleEndian>()
                .map_err(|_| corrupt("short read"))?;
            tables.push(TableEntry {
                name: table_name,
                schema: Schema::new(columns),
                rows,
                offset,
                len,
            });
        }
        groups.push(GroupEntry {
            name: group_name,
            tables,
        });
    }
    Ok(Directory { groups })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_schema() -> Schema {
        Schema::new(vec![
            Column::str("cid", 16),
            Column::int("bid"),
            Column::float("score"),
            Column::boolean("flag"),
        ])
    }

    fn sample_rows() -> Vec<Row> {
        vec![
            vec![
                Value::Str("c1".into()),
                Value::Int(0),
                Value::Float(0.5),
                Value::Bool(false),
            ],
            vec![
                Value::Str("c2".into()),
                Value::Int(3),
                Value::Float(1.25),
                Value::Bool(true),
            ],
        ]
    }

    #[test]
    fn create_write_reopen_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.gm");
        {
            let mut store = ColumnStore::create(&path).unwrap();
            store.create_group("meta").unwrap();
            store
                .create_table("meta", "contigs", sample_schema(), &sample_rows())
                .unwrap();
        }
        let mut store = ColumnStore::open(&path).unwrap();
        assert!(store.has_group("meta"));
        assert_eq!(store.row_count("meta", "contigs").unwrap(), 2);
        let rows = store.read_table("meta", "contigs").unwrap();
        assert_eq!(rows, sample_rows());
        let picked = store.read_rows("meta", "contigs", &[1]).unwrap();
        assert_eq!(picked[0][0].as_str(), Some("c2"));
    }

    #[test]
    fn read_only_store_rejects_writes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.gm");
        {
            let mut store = ColumnStore::create(&path).unwrap();
            store.create_group("meta").unwrap();
        }
        let mut store = ColumnStore::open(&path).unwrap();
        let err = store
            .create_table("meta", "t", sample_schema(), &[])
            .unwrap_err();
        assert!(matches!(err, Error::Store { .. }));
    }

    #[test]
    fn type_mismatch_and_width_overflow_are_errors() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.gm");
        let mut store = ColumnStore::create(&path).unwrap();
        store.create_group("meta").unwrap();

        let bad_type = vec![vec![
            Value::Int(1),
            Value::Int(0),
            Value::Float(0.0),
            Value::Bool(false),
        ]];
        assert!(store
            .create_table("meta", "a", sample_schema(), &bad_type)
            .is_err());

        let too_long = vec![vec![
            Value::Str("x".repeat(17)),
            Value::Int(0),
            Value::Float(0.0),
            Value::Bool(false),
        ]];
        assert!(store
            .create_table("meta", "b", sample_schema(), &too_long)
            .is_err());
    }

    #[test]
    fn replace_table_swaps_contents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.gm");
        let mut store = ColumnStore::create(&path).unwrap();
        store.create_group("meta").unwrap();
        store
            .create_table("meta", "contigs", sample_schema(), &sample_rows())
            .unwrap();

        let mut rows = sample_rows();
        rows[0][1] = Value::Int(9);
        store
            .replace_table("meta", "contigs", sample_schema(), &rows)
            .unwrap();
        assert!(!store.has_table("meta", "tmp_contigs"));

        let mut reopened = ColumnStore::open(&path).unwrap();
        let read = reopened.read_table("meta", "contigs").unwrap();
        assert_eq!(read[0][1].as_int(), Some(9));
        assert_eq!(read.len(), 2);
    }

    #[test]
    fn crash_before_rename_preserves_live_table() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.gm");
        {
            let mut store = ColumnStore::create(&path).unwrap();
            store.create_group("meta").unwrap();
            store
                .create_table("meta", "bin", sample_schema(), &sample_rows())
                .unwrap();
            // First two steps of a replacement, then "crash" before rename.
            let mut rows = sample_rows();
            rows[1][1] = Value::Int(42);
            store
                .create_table("meta", "tmp_bin", sample_schema(), &rows)
                .unwrap();
        }
        let mut store = ColumnStore::open_rw(&path).unwrap();
        let live = store.read_table("meta", "bin").unwrap();
        assert_eq!(live, sample_rows());
        assert!(store.has_table("meta", "tmp_bin"));

        // The next writer clears the stale scratch table and proceeds.
        assert_eq!(store.remove_stale_tmp().unwrap(), 1);
        store
            .replace_table("meta", "bin", sample_schema(), &sample_rows()[..1].to_vec())
            .unwrap();
        assert_eq!(store.row_count("meta", "bin").unwrap(), 1);
    }

    #[test]
    fn garbage_file_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("junk.gm");
        std::fs::write(&path, b"this is not a database, honest").unwrap();
        assert!(matches!(
            ColumnStore::open(&path),
            Err(Error::Store { .. })
        ));
    }

    #[test]
    fn empty_table_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.gm");
        let mut store = ColumnStore::create(&path).unwrap();
        store.create_group("links").unwrap();
        store
            .create_table("links", "links", Schema::new(vec![Column::int("a")]), &[])
            .unwrap();
        assert_eq!(store.row_count("links", "links").unwrap(), 0);
        assert!(store.read_table("links", "links").unwrap().is_empty());
        let err = store.read_rows("links", "links", &[0]).unwrap_err();
        assert!(matches!(err, Error::Store { .. }));
    }
}
