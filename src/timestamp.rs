use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// unix timestamp in seconds
///
/// signed so that dates before 1970 survive a roundtrip; no freshness
/// window is enforced anywhere in this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn now() -> Self {
        Self(Utc::now().timestamp())
    }

    pub fn to_datetime(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.0, 0).unwrap_or_default()
    }

    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt.timestamp())
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Timestamp {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<Timestamp> for i64 {
    fn from(timestamp: Timestamp) -> Self {
        timestamp.0
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Timestamp::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serializes_as_plain_integer() {
        assert_eq!(serde_json::to_string(&Timestamp(1710000000)).unwrap(), "1710000000");
        assert_eq!(serde_json::to_string(&Timestamp(-1)).unwrap(), "-1");
        let ts: Timestamp = serde_json::from_str("1234567890").unwrap();
        assert_eq!(ts, Timestamp(1234567890));
    }

    #[test]
    fn test_datetime_conversion() {
        let ts = Timestamp(1700000000);
        assert_eq!(Timestamp::from_datetime(ts.to_datetime()), ts);
    }
}
