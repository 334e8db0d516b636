use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::os::raw::c_int;
use std::sync::Arc;

use crate::constants::{DbFlags, WriteFlags, BAD_VALSIZE, ENTRY_OVERHEAD, KEYEXIST, NOTFOUND};

/// Name the main table is stored under.
pub(crate) const MAIN_TABLE: &str = "";

/// Contents of one table.
#[derive(Debug, Clone)]
pub(crate) struct Table {
    /// Layout flags
    flags: DbFlags,
    /// Values per key; exactly one unless `DUPSORT`, sorted otherwise
    rows: BTreeMap<Vec<u8>, Vec<Arc<[u8]>>>,
    /// Estimated bytes used
    bytes: usize,
}

impl Default for Table {
    fn default() -> Self {
        Table::new(DbFlags::empty())
    }
}

impl Table {
    pub(crate) fn new(flags: DbFlags) -> Self {
        Self {
            flags: flags & DbFlags::PERSISTENT,
            rows: BTreeMap::new(),
            bytes: 0,
        }
    }

    pub(crate) fn flags(&self) -> DbFlags {
        self.flags
    }

    pub(crate) fn set_flags(&mut self, flags: DbFlags) {
        self.flags = flags & DbFlags::PERSISTENT;
    }

    pub(crate) fn bytes(&self) -> usize {
        self.bytes
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub(crate) fn is_dupsort(&self) -> bool {
        self.flags.contains(DbFlags::DUPSORT)
    }

    /// Number of key/value pairs
    #[cfg(test)]
    pub(crate) fn entries(&self) -> usize {
        self.rows.values().map(Vec::len).sum()
    }

    /// First value stored for `key`.
    pub(crate) fn get(&self, key: &[u8]) -> Option<&Arc<[u8]>> {
        self.rows.get(key).and_then(|vals| vals.first())
    }

    pub(crate) fn put(&mut self, key: &[u8], val: &[u8], flags: WriteFlags) -> Result<(), c_int> {
        let dupsort = self.is_dupsort();
        if !self.rows.contains_key(key) {
            if flags.contains(WriteFlags::APPEND) {
                if let Some(last) = self.last_key() {
                    if self.cmp_keys(key, last) != Ordering::Greater {
                        return Err(KEYEXIST);
                    }
                }
            }
            self.rows.insert(key.to_vec(), vec![Arc::from(val)]);
            self.bytes += key.len() + val.len() + ENTRY_OVERHEAD;
            return Ok(());
        }

        if flags.intersects(WriteFlags::NOOVERWRITE | WriteFlags::APPEND) {
            return Err(KEYEXIST);
        }

        let reverse_dup = self.flags.contains(DbFlags::REVERSEDUP);
        let dupfixed = self.flags.contains(DbFlags::DUPFIXED);
        let vals = match self.rows.get_mut(key) {
            Some(vals) => vals,
            None => return Err(NOTFOUND),
        };

        if !dupsort {
            let old = std::mem::replace(&mut vals[0], Arc::from(val));
            self.bytes = self.bytes - old.len() + val.len();
            return Ok(());
        }

        if dupfixed && vals.first().map_or(false, |first| first.len() != val.len()) {
            return Err(BAD_VALSIZE);
        }
        match vals.binary_search_by(|probe| cmp_bytes(probe, val, reverse_dup)) {
            Ok(_) if flags.contains(WriteFlags::NODUPDATA) => Err(KEYEXIST),
            Ok(_) => Ok(()),
            Err(pos) => {
                if flags.contains(WriteFlags::APPENDDUP) && pos != vals.len() {
                    return Err(KEYEXIST);
                }
                vals.insert(pos, Arc::from(val));
                self.bytes += val.len() + ENTRY_OVERHEAD;
                Ok(())
            }
        }
    }

    /// Deletes `key`, or only the pair `key`/`val` in a `DUPSORT` table.
    pub(crate) fn del(&mut self, key: &[u8], val: Option<&[u8]>) -> Result<(), c_int> {
        let reverse_dup = self.flags.contains(DbFlags::REVERSEDUP);
        let val = val.filter(|_| self.is_dupsort());
        let vals = self.rows.get_mut(key).ok_or(NOTFOUND)?;

        if let Some(val) = val {
            let pos = vals
                .binary_search_by(|probe| cmp_bytes(probe, val, reverse_dup))
                .map_err(|_| NOTFOUND)?;
            let removed = vals.remove(pos);
            self.bytes -= removed.len() + ENTRY_OVERHEAD;
            if !vals.is_empty() {
                return Ok(());
            }
            self.rows.remove(key);
            self.bytes -= key.len();
            return Ok(());
        }

        if let Some(vals) = self.rows.remove(key) {
            let freed: usize = vals.iter().map(|v| v.len() + ENTRY_OVERHEAD).sum();
            self.bytes -= freed + key.len();
        }
        Ok(())
    }

    pub(crate) fn clear(&mut self) {
        self.rows.clear();
        self.bytes = 0;
    }

    pub(crate) fn rows(&self) -> impl Iterator<Item = (&[u8], &[Arc<[u8]>])> {
        self.rows.iter().map(|(k, v)| (k.as_slice(), v.as_slice()))
    }

    /// Restores a row read back from the data file.
    pub(crate) fn load_row(&mut self, key: Vec<u8>, vals: Vec<Arc<[u8]>>) {
        let used: usize = vals.iter().map(|v| v.len() + ENTRY_OVERHEAD).sum();
        self.bytes += key.len() + used;
        self.rows.insert(key, vals);
    }

    fn cmp_keys(&self, a: &[u8], b: &[u8]) -> Ordering {
        cmp_bytes(a, b, self.flags.contains(DbFlags::REVERSEKEY))
    }

    fn last_key(&self) -> Option<&[u8]> {
        if self.flags.contains(DbFlags::REVERSEKEY) {
            self.rows
                .keys()
                .max_by(|a, b| cmp_bytes(a, b, true))
                .map(Vec::as_slice)
        } else {
            self.rows.keys().next_back().map(Vec::as_slice)
        }
    }
}

fn cmp_bytes(a: &[u8], b: &[u8], reverse: bool) -> Ordering {
    if reverse {
        a.iter().rev().cmp(b.iter().rev())
    } else {
        a.cmp(b)
    }
}

/// A committed (or in-progress) view of every table.
#[derive(Debug, Clone)]
pub(crate) struct Snapshot {
    /// txnid that produced this snapshot
    pub(crate) txn_id: u64,
    /// Tables by name; the main table is [`MAIN_TABLE`]
    pub(crate) tables: BTreeMap<String, Arc<Table>>,
}

impl Snapshot {
    pub(crate) fn empty() -> Self {
        let mut tables = BTreeMap::new();
        tables.insert(MAIN_TABLE.to_string(), Arc::new(Table::default()));
        Self { txn_id: 0, tables }
    }

    pub(crate) fn bytes(&self) -> usize {
        self.tables.values().map(|t| t.bytes()).sum()
    }

    /// Number of named tables
    pub(crate) fn named(&self) -> usize {
        self.tables.keys().filter(|name| name.as_str() != MAIN_TABLE).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get(table: &Table, key: &[u8]) -> Option<Vec<u8>> {
        table.get(key).map(|v| v.to_vec())
    }

    #[test]
    fn put_replaces_unless_nooverwrite() {
        let mut table = Table::new(DbFlags::empty());
        table.put(b"k", b"v1", WriteFlags::empty()).unwrap();
        table.put(b"k", b"v2", WriteFlags::empty()).unwrap();
        assert_eq!(get(&table, b"k"), Some(b"v2".to_vec()));

        assert_eq!(table.put(b"k", b"v3", WriteFlags::NOOVERWRITE), Err(KEYEXIST));
        assert_eq!(get(&table, b"k"), Some(b"v2".to_vec()));
        assert_eq!(table.entries(), 1);
    }

    #[test]
    fn append_requires_increasing_keys() {
        let mut table = Table::new(DbFlags::empty());
        table.put(b"b", b"1", WriteFlags::APPEND).unwrap();
        table.put(b"c", b"2", WriteFlags::APPEND).unwrap();
        assert_eq!(table.put(b"a", b"3", WriteFlags::APPEND), Err(KEYEXIST));

        let mut reversed = Table::new(DbFlags::REVERSEKEY);
        reversed.put(b"ba", b"1", WriteFlags::APPEND).unwrap();
        reversed.put(b"ab", b"2", WriteFlags::APPEND).unwrap();
        assert_eq!(reversed.put(b"ca", b"3", WriteFlags::APPEND), Err(KEYEXIST));
    }

    #[test]
    fn dupsort_keeps_sorted_duplicates() {
        let mut table = Table::new(DbFlags::DUPSORT);
        table.put(b"k", b"b", WriteFlags::empty()).unwrap();
        table.put(b"k", b"a", WriteFlags::empty()).unwrap();
        table.put(b"k", b"a", WriteFlags::empty()).unwrap();
        assert_eq!(table.entries(), 2);
        assert_eq!(get(&table, b"k"), Some(b"a".to_vec()));

        assert_eq!(table.put(b"k", b"b", WriteFlags::NODUPDATA), Err(KEYEXIST));
        assert_eq!(table.put(b"k", b"0", WriteFlags::APPENDDUP), Err(KEYEXIST));
        table.put(b"k", b"c", WriteFlags::APPENDDUP).unwrap();

        table.del(b"k", Some(b"a")).unwrap();
        assert_eq!(get(&table, b"k"), Some(b"b".to_vec()));
        assert_eq!(table.del(b"k", Some(b"zz")), Err(NOTFOUND));

        table.del(b"k", None).unwrap();
        assert!(table.is_empty());
        assert_eq!(table.bytes(), 0);
    }

    #[test]
    fn dupfixed_rejects_other_sizes() {
        let mut table = Table::new(DbFlags::DUPSORT | DbFlags::DUPFIXED);
        table.put(b"k", b"aa", WriteFlags::empty()).unwrap();
        assert_eq!(table.put(b"k", b"b", WriteFlags::empty()), Err(BAD_VALSIZE));
    }

    #[test]
    fn del_ignores_value_without_dupsort() {
        let mut table = Table::new(DbFlags::empty());
        table.put(b"k", b"v", WriteFlags::empty()).unwrap();
        table.del(b"k", Some(b"other")).unwrap();
        assert!(table.is_empty());
        assert_eq!(table.del(b"k", None), Err(NOTFOUND));
        assert_eq!(table.bytes(), 0);
    }

    #[test]
    fn snapshot_counts_named_tables() {
        let mut snap = Snapshot::empty();
        assert_eq!(snap.named(), 0);
        snap.tables.insert("a".into(), Arc::new(Table::default()));
        assert_eq!(snap.named(), 1);
    }
}
