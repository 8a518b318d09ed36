use std::fmt;

/// A microsecond-resolution timestamp, the value domain used for the
/// `SparseIndex`'s timestamp paths and for `Info::last_modified`. Kept as a thin
/// newtype over `i64` (microseconds since the Unix epoch) rather than pulling in a
/// calendar crate here; conversions to/from a wall-clock representation belong to
/// whichever crate needs them (the S3 client parses `Last-Modified` headers itself).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(i64);

impl Timestamp {
    pub const fn from_micros(micros: i64) -> Self {
        Self(micros)
    }

    pub const fn as_micros(self) -> i64 {
        self.0
    }

    pub fn to_unix_epoch_seconds(self) -> i64 {
        self.0.div_euclid(1_000_000)
    }

    pub fn to_unix_micros(self) -> i64 {
        self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}us", self.0)
    }
}
