//! Rational media timestamps.
//!
//! A [`MediaTime`] is a pair `(value, scale)` representing `value / scale`
//! seconds. Arithmetic rescales to a common denominator instead of losing
//! precision through a float round-trip, and comparisons cross-multiply
//! rather than normalizing first.

use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Sub};

/// `value / scale` seconds. `scale == 0` is reserved for [`MediaTime::INVALID`].
#[derive(Clone, Copy)]
pub struct MediaTime {
    value: i64,
    scale: u32,
}

impl MediaTime {
    /// Sentinel for "no timestamp" / "not applicable". Never compares equal
    /// to anything but itself, and ordering against it is undefined (see
    /// [`MediaTime::partial_cmp`]).
    pub const INVALID: MediaTime = MediaTime { value: 0, scale: 0 };

    /// The origin of a media timeline, `0/1`.
    pub const BEGIN: MediaTime = MediaTime { value: 0, scale: 1 };

    /// A timestamp greater than any finite media time.
    pub const END: MediaTime = MediaTime {
        value: i64::MAX,
        scale: 1,
    };

    /// Builds `value / scale`. `scale` must be non-zero; use
    /// [`MediaTime::INVALID`] for an invalid timestamp instead of `scale = 0`.
    pub fn new(value: i64, scale: u32) -> Self {
        assert!(scale != 0, "MediaTime scale must be non-zero");
        Self { value, scale }
    }

    /// `true` unless this is [`MediaTime::INVALID`].
    pub fn is_valid(&self) -> bool {
        self.scale != 0
    }

    /// Raw numerator.
    pub fn value(&self) -> i64 {
        self.value
    }

    /// Raw denominator (0 for `INVALID`).
    pub fn scale(&self) -> u32 {
        self.scale
    }

    /// Converts to whole microseconds, truncating.
    ///
    /// # Panics
    /// If `self` is [`MediaTime::INVALID`].
    pub fn as_micros(&self) -> i64 {
        debug_assert!(self.is_valid(), "as_micros() on an invalid MediaTime");
        (self.value as i128 * 1_000_000 / self.scale as i128) as i64
    }

    /// Converts to floating point seconds.
    ///
    /// # Panics
    /// If `self` is [`MediaTime::INVALID`].
    pub fn as_seconds_f64(&self) -> f64 {
        debug_assert!(self.is_valid(), "as_seconds_f64() on an invalid MediaTime");
        self.value as f64 / self.scale as f64
    }

    /// Builds a `MediaTime` from a whole-microsecond count.
    pub fn from_micros(us: i64) -> Self {
        Self::new(us, 1_000_000)
    }

    fn cross(&self, other: &Self) -> (i128, i128) {
        (
            self.value as i128 * other.scale as i128,
            other.value as i128 * self.scale as i128,
        )
    }
}

impl fmt::Debug for MediaTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_valid() {
            write!(f, "MediaTime(Invalid)")
        } else {
            write!(f, "MediaTime({}/{})", self.value, self.scale)
        }
    }
}

impl PartialEq for MediaTime {
    fn eq(&self, other: &Self) -> bool {
        match (self.is_valid(), other.is_valid()) {
            (false, false) => true,
            (false, true) | (true, false) => false,
            (true, true) => {
                let (a, b) = self.cross(other);
                a == b
            }
        }
    }
}

impl Eq for MediaTime {}

impl PartialOrd for MediaTime {
    /// Returns `None` if either side is [`MediaTime::INVALID`] — ordering an
    /// invalid timestamp against anything, including another invalid one, is
    /// not meaningful.
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if !self.is_valid() || !other.is_valid() {
            return None;
        }
        let (a, b) = self.cross(other);
        Some(a.cmp(&b))
    }
}

impl Add for MediaTime {
    type Output = MediaTime;

    fn add(self, rhs: MediaTime) -> MediaTime {
        debug_assert!(self.is_valid() && rhs.is_valid());
        let g = gcd(self.scale as u64, rhs.scale as u64);
        let common = (self.scale as u64 / g) * rhs.scale as u64;
        let a = self.value as i128 * (common / self.scale as u64) as i128;
        let b = rhs.value as i128 * (common / rhs.scale as u64) as i128;
        MediaTime::new((a + b) as i64, common as u32)
    }
}

impl Sub for MediaTime {
    type Output = MediaTime;

    fn sub(self, rhs: MediaTime) -> MediaTime {
        debug_assert!(self.is_valid() && rhs.is_valid());
        let g = gcd(self.scale as u64, rhs.scale as u64);
        let common = (self.scale as u64 / g) * rhs.scale as u64;
        let a = self.value as i128 * (common / self.scale as u64) as i128;
        let b = rhs.value as i128 * (common / rhs.scale as u64) as i128;
        MediaTime::new((a - b) as i64, common as u32)
    }
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let t = b;
        b = a % b;
        a = t;
    }
    if a == 0 {
        1
    } else {
        a
    }
}
