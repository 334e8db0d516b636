use std::cell::Cell;
use std::ops::Deref;
use std::ptr;
use std::slice;

/// Engine-native value descriptor: a pointer and a length, like `MDBX_val`.
///
/// A null base is distinct from an empty value.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Val {
    base: *const u8,
    len: usize,
}

// Descriptors are plain addresses; the memory they point at is owned elsewhere.
unsafe impl Send for Val {}

impl Val {
    pub(crate) const NULL: Val = Val { base: ptr::null(), len: 0 };

    pub(crate) fn new(data: &[u8]) -> Val {
        Val { base: data.as_ptr(), len: data.len() }
    }

    pub(crate) fn is_null(&self) -> bool {
        self.base.is_null()
    }

    /// # Safety
    ///
    /// A non-null descriptor must point at `len` bytes that stay alive and
    /// unmodified for `'a`.
    pub(crate) unsafe fn as_slice<'a>(&self) -> Option<&'a [u8]> {
        if self.is_null() {
            None
        } else {
            Some(slice::from_raw_parts(self.base, self.len))
        }
    }
}

impl Default for Val {
    fn default() -> Self {
        Val::NULL
    }
}

/// Key and value descriptor slots a transaction stages engine calls through.
#[derive(Debug, Default)]
pub(crate) struct ValPair {
    pub(crate) key: Cell<Val>,
    pub(crate) val: Cell<Val>,
}

impl ValPair {
    pub(crate) fn clear(&self) {
        self.key.set(Val::NULL);
        self.val.set(Val::NULL);
    }
}

/// Bytes returned by [`Txn::get`](crate::Txn::get).
///
/// `View` points straight into engine memory and cannot outlive the
/// transaction borrow it came from; `Copy` is an owned duplicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value<'txn> {
    View(&'txn [u8]),
    Copy(Vec<u8>),
}

impl<'txn> Value<'txn> {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Value::View(data) => data,
            Value::Copy(data) => data,
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }

    pub fn is_view(&self) -> bool {
        matches!(self, Value::View(_))
    }

    pub fn into_vec(self) -> Vec<u8> {
        match self {
            Value::View(data) => data.to_vec(),
            Value::Copy(data) => data,
        }
    }
}

impl Deref for Value<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl AsRef<[u8]> for Value<'_> {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl PartialEq<[u8]> for Value<'_> {
    fn eq(&self, other: &[u8]) -> bool {
        self.as_bytes() == other
    }
}

impl<const N: usize> PartialEq<[u8; N]> for Value<'_> {
    fn eq(&self, other: &[u8; N]) -> bool {
        self.as_bytes() == other.as_slice()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_is_not_empty() {
        let empty: &[u8] = &[];
        assert!(Val::NULL.is_null());
        assert!(!Val::new(empty).is_null());
        assert_eq!(unsafe { Val::new(empty).as_slice() }, Some(empty));
        assert_eq!(unsafe { Val::NULL.as_slice() }, None);
    }

    #[test]
    fn value_compares_by_bytes() {
        let data = b"abc".to_vec();
        let view = Value::View(&data);
        let copy = Value::Copy(b"abc".to_vec());
        assert_eq!(view, *b"abc");
        assert_eq!(copy.as_bytes(), view.as_bytes());
        assert!(view.is_view());
        assert!(!copy.is_view());
        assert_eq!(view.into_vec(), data);
    }
}
