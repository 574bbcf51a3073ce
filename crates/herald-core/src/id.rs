//! Job identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Identifier assigned to a job at submission.
///
/// Backed by a UUID v7: unique across concurrent submitters and ordered by
/// creation time, so sorting ids roughly sorts jobs by age.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    /// Generates a fresh id stamped with the current time.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Creation time embedded in the id, if it is a v7 id.
    #[must_use]
    pub fn issued_at(&self) -> Option<SystemTime> {
        let (secs, nanos) = self.0.get_timestamp()?.to_unix();
        UNIX_EPOCH.checked_add(Duration::new(secs, nanos))
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl From<Uuid> for JobId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_ids_are_unique() {
        let ids: HashSet<JobId> = (0..1000).map(|_| JobId::new()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn test_parse_display() {
        let id = JobId::new();
        let parsed: JobId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        assert!("not-a-uuid".parse::<JobId>().is_err());
    }

    #[test]
    fn test_issued_at_is_recent() {
        let before = SystemTime::now() - Duration::from_secs(1);
        let issued = JobId::new().issued_at().unwrap();
        assert!(issued >= before);

        assert!(JobId::from(Uuid::new_v4()).issued_at().is_none());
    }

    #[test]
    fn test_later_ids_sort_after() {
        let first = JobId::new();
        std::thread::sleep(Duration::from_millis(2));
        let second = JobId::new();
        assert!(first < second);
    }
}
