use std::os::raw::c_int;

use crate::constants::{CORRUPTED, FORMAT_VERSION, INVALID, MAGIC, READERS_FULL, VERSION_MISMATCH};

/// Reader status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReaderStatus {
    /// Holding a snapshot
    Active,
    /// Slot kept across a reset, no snapshot held
    Reset,
}

/// Reader info
#[derive(Debug, Clone, Copy)]
pub(crate) struct ReaderInfo {
    /// Transaction ID being read
    pub(crate) txn_id: u64,
    /// Reader status
    pub(crate) status: ReaderStatus,
}

/// Bounded table of reader slots, one per live readonly transaction.
#[derive(Debug, Clone, Default)]
pub(crate) struct ReaderTable {
    /// Number of slots in use
    num_readers: u32,
    /// Array of reader slots
    readers: Vec<Option<ReaderInfo>>,
}

impl ReaderTable {
    pub(crate) fn new(max_readers: u32) -> Self {
        Self {
            num_readers: 0,
            readers: vec![None; max_readers as usize],
        }
    }

    /// Claims a free slot for a reader of `txn_id`.
    pub(crate) fn acquire(&mut self, txn_id: u64) -> Result<usize, c_int> {
        let slot = self
            .readers
            .iter()
            .position(Option::is_none)
            .ok_or(READERS_FULL)?;
        self.readers[slot] = Some(ReaderInfo { txn_id, status: ReaderStatus::Active });
        self.num_readers += 1;
        Ok(slot)
    }

    pub(crate) fn reset(&mut self, slot: usize) {
        if let Some(Some(info)) = self.readers.get_mut(slot) {
            info.status = ReaderStatus::Reset;
        }
    }

    pub(crate) fn renew(&mut self, slot: usize, txn_id: u64) -> Result<(), c_int> {
        match self.readers.get_mut(slot) {
            Some(Some(info)) => {
                *info = ReaderInfo { txn_id, status: ReaderStatus::Active };
                Ok(())
            }
            _ => Err(crate::constants::BAD_RSLOT),
        }
    }

    pub(crate) fn release(&mut self, slot: usize) {
        if let Some(entry) = self.readers.get_mut(slot) {
            if entry.take().is_some() {
                self.num_readers -= 1;
            }
        }
    }

    pub(crate) fn num_readers(&self) -> u32 {
        self.num_readers
    }

    /// Oldest snapshot still held by an active reader.
    pub(crate) fn oldest(&self) -> Option<u64> {
        self.readers
            .iter()
            .flatten()
            .filter(|info| info.status == ReaderStatus::Active)
            .map(|info| info.txn_id)
            .min()
    }

    pub(crate) fn clear(&mut self) {
        self.readers.iter_mut().for_each(|slot| *slot = None);
        self.num_readers = 0;
    }
}

/// Size of the encoded data file header
pub(crate) const HEADER_SIZE: usize = 24;

/// Header at the start of the data file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct MetaHeader {
    /// Magic number identifying the data file
    pub(crate) magic: u32,
    /// Format version
    pub(crate) version: u32,
    /// Page size the environment was created with
    pub(crate) page_size: u32,
    /// Number of tables that follow
    pub(crate) tables: u32,
    /// txnid that wrote this file
    pub(crate) txn_id: u64,
}

impl MetaHeader {
    pub(crate) fn new(page_size: u32, tables: u32, txn_id: u64) -> Self {
        Self {
            magic: MAGIC,
            version: FORMAT_VERSION,
            page_size,
            tables,
            txn_id,
        }
    }

    pub(crate) fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.magic.to_le_bytes());
        buf.extend_from_slice(&self.version.to_le_bytes());
        buf.extend_from_slice(&self.page_size.to_le_bytes());
        buf.extend_from_slice(&self.tables.to_le_bytes());
        buf.extend_from_slice(&self.txn_id.to_le_bytes());
    }

    pub(crate) fn decode(data: &[u8]) -> Result<Self, c_int> {
        let word = |at: usize| -> Option<u32> {
            data.get(at..at + 4)
                .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        };

        // Validate magic number
        let magic = word(0).ok_or(INVALID)?;
        if magic != MAGIC {
            return Err(INVALID);
        }

        // Validate version
        let version = word(4).ok_or(CORRUPTED)?;
        if version != FORMAT_VERSION {
            return Err(VERSION_MISMATCH);
        }

        if data.len() < HEADER_SIZE {
            return Err(CORRUPTED);
        }
        let mut txn_id = [0u8; 8];
        txn_id.copy_from_slice(&data[16..24]);

        Ok(Self {
            magic,
            version,
            page_size: word(8).ok_or(CORRUPTED)?,
            tables: word(12).ok_or(CORRUPTED)?,
            txn_id: u64::from_le_bytes(txn_id),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reader_slots_are_bounded() {
        let mut table = ReaderTable::new(2);
        let a = table.acquire(1).unwrap();
        let b = table.acquire(1).unwrap();
        assert_eq!(table.acquire(1), Err(READERS_FULL));
        assert_eq!(table.num_readers(), 2);

        table.release(a);
        assert_eq!(table.num_readers(), 1);
        assert!(table.acquire(2).is_ok());
        table.release(b);
    }

    #[test]
    fn reset_slot_is_kept_but_not_counted_as_oldest() {
        let mut table = ReaderTable::new(4);
        let a = table.acquire(3).unwrap();
        let b = table.acquire(5).unwrap();
        assert_eq!(table.oldest(), Some(3));

        table.reset(a);
        assert_eq!(table.oldest(), Some(5));
        assert_eq!(table.num_readers(), 2);

        table.renew(a, 7).unwrap();
        assert_eq!(table.oldest(), Some(5));
        table.release(b);
        assert_eq!(table.oldest(), Some(7));
    }

    #[test]
    fn header_validation() {
        let mut buf = Vec::new();
        MetaHeader::new(4096, 3, 42).encode_into(&mut buf);
        assert_eq!(buf.len(), HEADER_SIZE);
        assert_eq!(MetaHeader::decode(&buf), Ok(MetaHeader::new(4096, 3, 42)));

        assert_eq!(MetaHeader::decode(&buf[..HEADER_SIZE - 1]), Err(CORRUPTED));

        let mut bad_magic = buf.clone();
        bad_magic[0] ^= 0xff;
        assert_eq!(MetaHeader::decode(&bad_magic), Err(INVALID));

        let mut bad_version = buf.clone();
        bad_version[4] = bad_version[4].wrapping_add(1);
        assert_eq!(MetaHeader::decode(&bad_version), Err(VERSION_MISMATCH));
    }
}
