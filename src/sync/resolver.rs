//! Last-writer-wins decision for records arriving from the remote store.

use chrono::{DateTime, Utc};

use crate::models::Reading;
use crate::remote::RemoteRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Replace the local record with the remote one.
    Overwrite,
    KeepLocal,
}

/// True iff there is no local record or the remote one is strictly newer.
///
/// Equal timestamps keep the local record.
pub fn should_overwrite(
    remote_updated_at: DateTime<Utc>,
    local_updated_at: Option<DateTime<Utc>>,
) -> bool {
    match local_updated_at {
        None => true,
        Some(local) => remote_updated_at > local,
    }
}

pub fn resolve<M>(remote: &RemoteRecord<M>, local: Option<&Reading<M>>) -> Resolution {
    if should_overwrite(remote.updated_at, local.map(|r| r.updated_at)) {
        Resolution::Overwrite
    } else {
        Resolution::KeepLocal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Glucose, MealContext};

    fn ms(millis: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(millis).unwrap()
    }

    fn local(updated_at: i64) -> Reading<Glucose> {
        let mut reading = Reading::new(Glucose::new(5.0, MealContext::Fasting), ms(0));
        reading.id = "g1".to_string();
        reading.updated_at = ms(updated_at);
        reading
    }

    fn remote(updated_at: i64) -> RemoteRecord<Glucose> {
        let mut record = local(updated_at).to_remote();
        record.measurement.value_mmol = 7.0;
        record
    }

    #[test]
    fn test_absent_local_is_overwritten() {
        assert!(should_overwrite(ms(0), None));
        assert_eq!(resolve(&remote(100), None), Resolution::Overwrite);
    }

    #[test]
    fn test_newer_remote_wins() {
        assert_eq!(
            resolve(&remote(600), Some(&local(500))),
            Resolution::Overwrite
        );
    }

    #[test]
    fn test_older_remote_keeps_local() {
        assert_eq!(
            resolve(&remote(300), Some(&local(500))),
            Resolution::KeepLocal
        );
    }

    #[test]
    fn test_tie_keeps_local() {
        for t in [0, 1, 500, 1_736_928_000_000] {
            assert!(!should_overwrite(ms(t), Some(ms(t))));
            assert_eq!(resolve(&remote(t), Some(&local(t))), Resolution::KeepLocal);
        }
    }

    #[test]
    fn test_decision_ignores_content_and_flags() {
        let mut deleted_dirty = local(500);
        deleted_dirty.is_deleted = true;
        deleted_dirty.dirty = true;
        assert_eq!(
            resolve(&remote(500), Some(&deleted_dirty)),
            Resolution::KeepLocal
        );
        assert_eq!(
            resolve(&remote(501), Some(&deleted_dirty)),
            Resolution::Overwrite
        );
    }
}
