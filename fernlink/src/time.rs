//! Millisecond time types.
//!
//! All time values are read from the injected [`Clock`](crate::traits::Clock)
//! and passed around explicitly, which keeps the core deterministic under
//! simulation. The newtypes prevent mixing points in time with spans.

use core::ops::{Add, AddAssign, Sub};

/// A point in time, in milliseconds since an arbitrary epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(u64);

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp(0);

    #[inline]
    pub const fn from_millis(ms: u64) -> Self {
        Timestamp(ms)
    }

    #[inline]
    pub const fn from_secs(secs: u64) -> Self {
        Timestamp(secs.saturating_mul(1000))
    }

    #[inline]
    pub const fn as_millis(self) -> u64 {
        self.0
    }

    /// Span since `earlier`, zero if `earlier` is in the future.
    #[inline]
    pub const fn saturating_sub(self, earlier: Timestamp) -> Duration {
        Duration(self.0.saturating_sub(earlier.0))
    }
}

impl Add<Duration> for Timestamp {
    type Output = Timestamp;

    #[inline]
    fn add(self, rhs: Duration) -> Timestamp {
        Timestamp(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign<Duration> for Timestamp {
    #[inline]
    fn add_assign(&mut self, rhs: Duration) {
        self.0 = self.0.saturating_add(rhs.0);
    }
}

impl Sub for Timestamp {
    type Output = Duration;

    #[inline]
    fn sub(self, rhs: Timestamp) -> Duration {
        Duration(self.0 - rhs.0)
    }
}

/// A span of time in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Duration(u64);

impl Duration {
    pub const ZERO: Duration = Duration(0);

    #[inline]
    pub const fn from_millis(ms: u64) -> Self {
        Duration(ms)
    }

    #[inline]
    pub const fn from_secs(secs: u64) -> Self {
        Duration(secs.saturating_mul(1000))
    }

    #[inline]
    pub const fn as_millis(self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn as_secs(self) -> u64 {
        self.0 / 1000
    }
}

impl Add for Duration {
    type Output = Duration;

    #[inline]
    fn add(self, rhs: Duration) -> Duration {
        Duration(self.0.saturating_add(rhs.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn construction_and_units() {
        assert_eq!(Timestamp::from_secs(5).as_millis(), 5000);
        assert_eq!(Duration::from_millis(2500).as_secs(), 2);
        assert_eq!(Duration::from_secs(10).as_millis(), 10_000);
    }

    #[test]
    fn arithmetic() {
        let t = Timestamp::from_secs(10) + Duration::from_secs(5);
        assert_eq!(t.as_millis(), 15_000);
        assert_eq!(
            (Timestamp::from_secs(20) - Timestamp::from_secs(10)).as_secs(),
            10
        );
    }

    #[test]
    fn saturating_sub_clamps_to_zero() {
        let early = Timestamp::from_secs(5);
        let late = Timestamp::from_secs(10);
        assert_eq!(early.saturating_sub(late), Duration::ZERO);
        assert_eq!(late.saturating_sub(early), Duration::from_secs(5));
    }

    #[test]
    fn ordering() {
        assert!(Timestamp::from_secs(5) < Timestamp::from_secs(10));
        assert!(Duration::from_millis(1) < Duration::from_secs(1));
    }
}
