use chrono::Utc;

use chrono::DateTime;
use serde::Deserialize;
use serde::Serialize;

use std::sync::Arc;

/// One sample of user activity as written to disk. Records are never changed after they were
/// appended, they only disappear when retention removes them.
#[derive(PartialEq, Eq, PartialOrd, Ord, Debug, Serialize, Deserialize, Clone)]
pub struct ActivityRecord {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    /// Sanitized and keyword-redacted title.
    pub title: Arc<str>,
    #[serde(default)]
    pub apm: u32,
    /// The user was away. The title is then a sentinel and carries no user data.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub afk: bool,
}

impl ActivityRecord {
    pub fn new(timestamp: DateTime<Utc>, title: impl Into<Arc<str>>, apm: u32) -> Self {
        Self {
            timestamp,
            title: title.into(),
            apm,
            afk: false,
        }
    }

    /// Away marker with APM 0.
    pub fn afk(timestamp: DateTime<Utc>, title: impl Into<Arc<str>>) -> Self {
        Self {
            timestamp,
            title: title.into(),
            apm: 0,
            afk: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn serialized_shape() -> anyhow::Result<()> {
        let record = ActivityRecord::new(Utc.timestamp_millis_opt(1_530_662_400_123).unwrap(), "main.rs - nvim", 42);
        let json = serde_json::to_string(&record)?;
        assert_eq!(
            json,
            r#"{"timestamp":1530662400123,"title":"main.rs - nvim","apm":42}"#
        );
        assert_eq!(serde_json::from_str::<ActivityRecord>(&json)?, record);
        Ok(())
    }

    #[test]
    fn afk_flag_is_stored_only_when_set() -> anyhow::Result<()> {
        let at = Utc.timestamp_millis_opt(1_530_662_400_000).unwrap();
        let record = ActivityRecord::afk(at, "USER_AFK");
        let json = serde_json::to_string(&record)?;
        assert_eq!(
            json,
            r#"{"timestamp":1530662400000,"title":"USER_AFK","apm":0,"afk":true}"#
        );
        assert_eq!(serde_json::from_str::<ActivityRecord>(&json)?, record);
        Ok(())
    }
}
