use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::os::raw::c_int;
#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use memmap2::Mmap;

use crate::constants::{EnvFlags, CORRUPTED, EIO, ENOENT};
use crate::meta::{MetaHeader, HEADER_SIZE};
use crate::table::{Snapshot, Table};

/// Data file backing an environment.
#[derive(Debug, Clone)]
pub(crate) struct Store {
    /// Path of the data file
    path: PathBuf,
    /// Sync the file after every commit
    durable: bool,
    /// Mode bits for files this store creates
    mode: u32,
}

/// Status code for an I/O failure.
pub(crate) fn io_code(err: &io::Error) -> c_int {
    err.raw_os_error().unwrap_or(EIO)
}

impl Store {
    /// Opens (or creates) the data file and loads the snapshot stored in it,
    /// together with the page size it was written with.
    pub(crate) fn open(
        path: &Path,
        flags: EnvFlags,
        mode: u32,
    ) -> Result<(Store, Snapshot, Option<u32>), c_int> {
        let readonly = flags.contains(EnvFlags::RDONLY);
        let mut options = OpenOptions::new();
        options.read(true);
        if !readonly {
            options.write(true).create(true);
            #[cfg(unix)]
            options.mode(mode);
        }

        let file = options.open(path).map_err(|e| io_code(&e))?;
        let len = file.metadata().map_err(|e| io_code(&e))?.len();

        let store = Store {
            path: path.to_path_buf(),
            durable: !flags.intersects(EnvFlags::NOMETASYNC | EnvFlags::MAPASYNC),
            mode,
        };

        if len == 0 {
            if readonly {
                return Err(ENOENT);
            }
            return Ok((store, Snapshot::empty(), None));
        }

        // Map the file readonly; it is only rewritten through rename.
        let map = unsafe { Mmap::map(&file) }.map_err(|e| io_code(&e))?;
        let (snapshot, page_size) = decode(&map)?;
        Ok((store, snapshot, Some(page_size)))
    }

    /// Replaces the data file with `snapshot`.
    pub(crate) fn save(&self, snapshot: &Snapshot, page_size: u32) -> Result<(), c_int> {
        let data = encode(snapshot, page_size);

        let mut tmp = OsString::from(self.path.as_os_str());
        tmp.push("-tmp");
        let tmp = PathBuf::from(tmp);

        self.write_file(&tmp, &data).map_err(|e| io_code(&e))?;
        fs::rename(&tmp, &self.path).map_err(|e| io_code(&e))
    }

    fn write_file(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(self.mode);

        let mut file: File = options.open(path)?;
        file.write_all(data)?;
        if self.durable {
            file.sync_all()?;
        }
        Ok(())
    }
}

fn encode(snapshot: &Snapshot, page_size: u32) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_SIZE + snapshot.bytes());
    MetaHeader::new(page_size, snapshot.tables.len() as u32, snapshot.txn_id).encode_into(&mut buf);

    for (name, table) in &snapshot.tables {
        put_bytes(&mut buf, name.as_bytes());
        buf.extend_from_slice(&table.flags().bits().to_le_bytes());
        let rows: Vec<_> = table.rows().collect();
        buf.extend_from_slice(&(rows.len() as u64).to_le_bytes());
        for (key, vals) in rows {
            put_bytes(&mut buf, key);
            buf.extend_from_slice(&(vals.len() as u32).to_le_bytes());
            for val in vals {
                put_bytes(&mut buf, val);
            }
        }
    }
    buf
}

fn put_bytes(buf: &mut Vec<u8>, data: &[u8]) {
    buf.extend_from_slice(&(data.len() as u32).to_le_bytes());
    buf.extend_from_slice(data);
}

fn decode(data: &[u8]) -> Result<(Snapshot, u32), c_int> {
    let header = MetaHeader::decode(data)?;
    let mut cursor = Cursor { data, pos: HEADER_SIZE };
    let mut snapshot = Snapshot { txn_id: header.txn_id, tables: Default::default() };

    for _ in 0..header.tables {
        let name = String::from_utf8(cursor.bytes()?.to_vec()).map_err(|_| CORRUPTED)?;
        let flags = crate::constants::DbFlags::from_bits_truncate(cursor.u32()?);
        let mut table = Table::new(flags);
        for _ in 0..cursor.u64()? {
            let key = cursor.bytes()?.to_vec();
            let count = cursor.u32()?;
            let mut vals = Vec::with_capacity(count.min(1024) as usize);
            for _ in 0..count {
                vals.push(Arc::from(cursor.bytes()?));
            }
            table.load_row(key, vals);
        }
        snapshot.tables.insert(name, Arc::new(table));
    }

    if cursor.pos != data.len() {
        return Err(CORRUPTED);
    }
    snapshot
        .tables
        .entry(crate::table::MAIN_TABLE.to_string())
        .or_insert_with(|| Arc::new(Table::default()));
    Ok((snapshot, header.page_size))
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], c_int> {
        let end = self.pos.checked_add(n).ok_or(CORRUPTED)?;
        let out = self.data.get(self.pos..end).ok_or(CORRUPTED)?;
        self.pos = end;
        Ok(out)
    }

    fn u32(&mut self) -> Result<u32, c_int> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> Result<u64, c_int> {
        let mut b = [0u8; 8];
        b.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(b))
    }

    fn bytes(&mut self) -> Result<&'a [u8], c_int> {
        let len = self.u32()? as usize;
        self.take(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{DbFlags, WriteFlags, INVALID, VERSION_MISMATCH};
    use crate::table::MAIN_TABLE;

    fn sample() -> Snapshot {
        let mut snap = Snapshot::empty();
        snap.txn_id = 9;
        let main = Arc::make_mut(snap.tables.get_mut(MAIN_TABLE).unwrap());
        main.put(b"a", b"1", WriteFlags::empty()).unwrap();
        main.put(b"b", b"", WriteFlags::empty()).unwrap();

        let mut dups = Table::new(DbFlags::DUPSORT);
        dups.put(b"k", b"x", WriteFlags::empty()).unwrap();
        dups.put(b"k", b"y", WriteFlags::empty()).unwrap();
        snap.tables.insert("dups".into(), Arc::new(dups));
        snap
    }

    #[test]
    fn saved_file_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.db");

        let (store, empty, page_size) = Store::open(&path, EnvFlags::empty(), 0o600).unwrap();
        assert_eq!(empty.txn_id, 0);
        assert_eq!(page_size, None);

        store.save(&sample(), 4096).unwrap();
        let (_, loaded, page_size) = Store::open(&path, EnvFlags::RDONLY, 0o600).unwrap();
        assert_eq!(page_size, Some(4096));
        assert_eq!(loaded.txn_id, 9);

        let main = &loaded.tables[MAIN_TABLE];
        assert_eq!(main.get(b"a").map(|v| v.to_vec()), Some(b"1".to_vec()));
        assert_eq!(main.get(b"b").map(|v| v.len()), Some(0));
        let dups = &loaded.tables["dups"];
        assert!(dups.is_dupsort());
        assert_eq!(dups.bytes(), sample().tables["dups"].bytes());
    }

    #[test]
    fn readonly_open_of_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = Store::open(&dir.path().join("missing"), EnvFlags::RDONLY, 0o600).unwrap_err();
        assert_eq!(err, ENOENT);
    }

    #[test]
    fn damaged_files_are_rejected() {
        let data = encode(&sample(), 4096);
        assert!(decode(&data).is_ok());
        assert_eq!(decode(&data[..data.len() - 1]).unwrap_err(), CORRUPTED);

        let mut trailing = data.clone();
        trailing.push(0);
        assert_eq!(decode(&trailing).unwrap_err(), CORRUPTED);

        assert_eq!(decode(b"not a data file at all!!").unwrap_err(), INVALID);

        let mut version = data;
        version[4] ^= 0x80;
        assert_eq!(decode(&version).unwrap_err(), VERSION_MISMATCH);
    }
}
