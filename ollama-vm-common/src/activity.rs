//! Activity-marker timestamps.
//!
//! Both marker keys hold ISO-8601 UTC strings with millisecond precision
//! (`2024-05-01T12:30:00.123Z`). The guest watchdog parses them with
//! `date -d`, so the format is part of the contract with the boot script.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::{Metadata, LAST_ACTIVITY_TIMESTAMP_KEY, STARTUP_TIMESTAMP_KEY};

pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// The marker the watchdog would read: last activity, else startup.
pub fn current_marker(metadata: &Metadata) -> Option<DateTime<Utc>> {
    metadata
        .get(LAST_ACTIVITY_TIMESTAMP_KEY)
        .filter(|v| !v.trim().is_empty())
        .or_else(|| metadata.get(STARTUP_TIMESTAMP_KEY))
        .and_then(parse_timestamp)
}

/// Value to write for a fresh activity stamp. Never moves the marker
/// backwards, even if another writer's clock ran ahead of ours.
pub fn next_marker(metadata: &Metadata, now: DateTime<Utc>) -> DateTime<Utc> {
    match current_marker(metadata) {
        Some(existing) if existing > now => existing,
        _ => now,
    }
}

/// Copy of `metadata` with `last-activity-timestamp` refreshed. All other
/// items are kept: the provider replaces the whole list on write.
pub fn touch(metadata: &Metadata, now: DateTime<Utc>) -> (Metadata, DateTime<Utc>) {
    let stamp = next_marker(metadata, now);
    let mut updated = metadata.clone();
    updated.upsert(LAST_ACTIVITY_TIMESTAMP_KEY, format_timestamp(stamp));
    (updated, stamp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MetadataItem, STARTUP_SCRIPT_KEY};
    use chrono::Duration;

    fn md(items: &[(&str, &str)]) -> Metadata {
        Metadata {
            fingerprint: Some("fp-1".to_string()),
            items: items.iter().map(|(k, v)| MetadataItem::new(*k, *v)).collect(),
        }
    }

    #[test]
    fn format_is_iso_millis_utc() {
        let ts = parse_timestamp("2024-05-01T12:30:00.123Z").unwrap();
        assert_eq!(format_timestamp(ts), "2024-05-01T12:30:00.123Z");
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn marker_falls_back_to_startup() {
        let m = md(&[(STARTUP_TIMESTAMP_KEY, "2024-05-01T00:00:00.000Z")]);
        assert_eq!(
            current_marker(&m),
            parse_timestamp("2024-05-01T00:00:00.000Z")
        );
        let blank = md(&[
            (STARTUP_TIMESTAMP_KEY, "2024-05-01T00:00:00.000Z"),
            (LAST_ACTIVITY_TIMESTAMP_KEY, ""),
        ]);
        assert!(current_marker(&blank).is_some());
        assert!(current_marker(&md(&[])).is_none());
    }

    #[test]
    fn touch_never_moves_backwards() {
        let now = Utc::now();
        let ahead = now + Duration::seconds(30);
        let m = md(&[(LAST_ACTIVITY_TIMESTAMP_KEY, &format_timestamp(ahead))]);
        let (_, stamp) = touch(&m, now);
        assert_eq!(format_timestamp(stamp), format_timestamp(ahead));

        let behind = md(&[(LAST_ACTIVITY_TIMESTAMP_KEY, "2020-01-01T00:00:00.000Z")]);
        let (_, stamp) = touch(&behind, now);
        assert_eq!(stamp, now);
    }

    #[test]
    fn touch_preserves_other_items_and_fingerprint() {
        let m = md(&[
            (STARTUP_SCRIPT_KEY, "#!/bin/bash"),
            (STARTUP_TIMESTAMP_KEY, "2024-05-01T00:00:00.000Z"),
            (LAST_ACTIVITY_TIMESTAMP_KEY, "2024-05-01T00:00:00.000Z"),
        ]);
        let now = Utc::now();
        let (updated, _) = touch(&m, now);
        assert_eq!(updated.fingerprint.as_deref(), Some("fp-1"));
        assert_eq!(updated.items.len(), 3);
        assert_eq!(updated.get(STARTUP_SCRIPT_KEY), Some("#!/bin/bash"));
        assert_eq!(
            updated.get(LAST_ACTIVITY_TIMESTAMP_KEY),
            Some(format_timestamp(now).as_str())
        );
    }
}
