//! A drop-in `Utc` standing in for `chrono::Utc` under test, pinning
//! the clock so stored timestamps are predictable.

/// The fixed instant reported by the shim, in unix seconds.
pub const FIXED_TIMESTAMP: i64 = 1234567890;

pub struct Utc;

pub struct DateTime(i64);

impl Utc {
    pub fn now() -> DateTime {
        DateTime(FIXED_TIMESTAMP)
    }
}

impl DateTime {
    pub fn timestamp(&self) -> i64 {
        self.0
    }

    pub fn timestamp_millis(&self) -> i64 {
        self.0 * 1000
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_is_pinned() {
        assert_eq!(Utc::now().timestamp(), 1234567890);
        assert_eq!(Utc::now().timestamp_millis(), 1234567890000);
    }
}
