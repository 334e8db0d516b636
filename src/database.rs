use std::fmt;

/// Handle naming a table inside an environment.
///
/// A handle opened in a transaction is usable by later transactions of the
/// same environment once the opening transaction has committed. Closing a
/// handle with [`Env::close_dbi`](crate::Env::close_dbi) is not synchronized:
/// the caller must make sure no other transaction is using it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Dbi(pub(crate) u32);

impl Dbi {
    /// Raw handle number
    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Dbi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dbi#{}", self.0)
    }
}
