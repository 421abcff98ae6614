// Copyright 2021 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use {
    serde::{Deserialize, Serialize},
    std::{
        convert::TryFrom,
        fmt,
        ops::{Add, Sub},
        time::{Duration, SystemTime, UNIX_EPOCH},
    },
};

const NANOS_PER_SEC: i64 = 1_000_000_000;

/// A point in time, in nanoseconds since the UNIX epoch, on whichever clock produced it.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    pub const fn from_nanos(nanos: i64) -> Self {
        Timestamp(nanos)
    }

    pub const fn from_micros(micros: i64) -> Self {
        Timestamp(micros.saturating_mul(1_000))
    }

    pub const fn from_millis(millis: i64) -> Self {
        Timestamp(millis.saturating_mul(1_000_000))
    }

    pub const fn from_secs(secs: i64) -> Self {
        Timestamp(secs.saturating_mul(NANOS_PER_SEC))
    }

    /// Converts a file modification time or similar. Times before the epoch are negative.
    pub fn from_system_time(time: SystemTime) -> Self {
        match time.duration_since(UNIX_EPOCH) {
            Ok(since) => Timestamp(duration_nanos(since)),
            Err(e) => Timestamp(-duration_nanos(e.duration())),
        }
    }

    pub const fn into_nanos(self) -> i64 {
        self.0
    }

    /// Moves this timestamp onto another clock.
    pub fn offset_by(self, offset: ClockOffset) -> Self {
        Timestamp(self.0.saturating_add(offset.0))
    }

    /// Absolute distance between two timestamps.
    pub fn distance(self, other: Timestamp) -> Duration {
        Duration::from_nanos(self.0.abs_diff(other.0))
    }
}

fn duration_nanos(duration: Duration) -> i64 {
    i64::try_from(duration.as_nanos()).unwrap_or(i64::MAX)
}

impl Add<Duration> for Timestamp {
    type Output = Timestamp;

    fn add(self, rhs: Duration) -> Timestamp {
        Timestamp(self.0.saturating_add(duration_nanos(rhs)))
    }
}

impl Sub<Duration> for Timestamp {
    type Output = Timestamp;

    fn sub(self, rhs: Duration) -> Timestamp {
        Timestamp(self.0.saturating_sub(duration_nanos(rhs)))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let per_sec = NANOS_PER_SEC as u64;
        write!(f, "{}{}.{:09}", sign, abs / per_sec, abs % per_sec)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self)
    }
}

/// Signed nanoseconds to add to a device clock reading to obtain the monitor clock reading
/// of the same instant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClockOffset(i64);

impl ClockOffset {
    /// Both clocks are assumed to be synchronized.
    pub const ZERO: ClockOffset = ClockOffset(0);

    pub const fn from_nanos(nanos: i64) -> Self {
        ClockOffset(nanos)
    }

    pub const fn from_millis(millis: i64) -> Self {
        ClockOffset(millis.saturating_mul(1_000_000))
    }

    pub const fn into_nanos(self) -> i64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_conversions() {
        assert_eq!(Timestamp::from_nanos(1_500_000_000), Timestamp::from_millis(1_500));
        assert_eq!(Timestamp::from_micros(2_000_000), Timestamp::from_secs(2));
    }

    #[test]
    fn from_system_time() {
        let time = UNIX_EPOCH + Duration::from_millis(1234);
        assert_eq!(Timestamp::from_millis(1234), Timestamp::from_system_time(time));
        let before = UNIX_EPOCH - Duration::from_secs(1);
        assert_eq!(Timestamp::from_secs(-1), Timestamp::from_system_time(before));
    }

    #[test]
    fn offset_and_distance() {
        let t = Timestamp::from_secs(10);
        let shifted = t.offset_by(ClockOffset::from_millis(-250));
        assert_eq!(Timestamp::from_millis(9_750), shifted);
        assert_eq!(Duration::from_millis(250), t.distance(shifted));
        assert_eq!(Duration::from_millis(250), shifted.distance(t));
        assert_eq!(t, t.offset_by(ClockOffset::ZERO));
    }

    #[test]
    fn display() {
        assert_eq!("1.000000005", Timestamp::from_nanos(1_000_000_005).to_string());
        assert_eq!("-0.500000000", Timestamp::from_millis(-500).to_string());
    }

    #[test]
    fn arithmetic_saturates() {
        let max = Timestamp::from_nanos(i64::MAX);
        assert_eq!(max, max + Duration::from_secs(1));
        assert_eq!(Timestamp::from_secs(1), Timestamp::from_secs(2) - Duration::from_secs(1));
    }
}
