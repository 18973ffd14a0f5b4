pub const VERSION_FIELD: &str = "version";
pub const DATA_FIELD: &str = "data";
pub const LEASING_FIELD: &str = "leasing";

/// Entry TTL after a successful write (15 minutes).
pub const DEFAULT_WRITE_TTL_SECS: u64 = 900;
/// Entry TTL after a lease is granted.
pub const DEFAULT_LEASE_TTL_SECS: u64 = 30;

/// Outcome of a lease-aware read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// The entry holds data.
    Hit(Vec<u8>),
    /// The entry was empty and the caller now holds the lease. It is expected
    /// to compute the value and `set` it before the lease TTL runs out.
    LeaseGranted,
}

impl Lookup {
    pub fn into_data(self) -> Option<Vec<u8>> {
        match self {
            Lookup::Hit(data) => Some(data),
            Lookup::LeaseGranted => None,
        }
    }
}

/// A script reply, decoupled from any particular client library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Nil,
    Okay,
    Status(String),
    Bulk(Vec<u8>),
    Int(i64),
    /// Anything else (arrays, maps, ...), kept only for diagnostics.
    Other(String),
}

impl Reply {
    pub fn is_ok_status(&self) -> bool {
        match self {
            Reply::Okay => true,
            Reply::Status(s) => s == "OK",
            Reply::Bulk(b) => b.as_slice() == b"OK",
            _ => false,
        }
    }
}
