//! Smoke Screen Unit tests for shipment archive components
//!
//! These test are unit tests that span the codebase, testing behavior in
//! isolation from the invalidate/restore scenarios. These are intended as
//! smoke-screen and generally test the happy-path.
//!

use chrono::{Datelike, Timelike, Utc};
use shipment_archive::{
    Actor, ArchiveError, Role,
    archive::{ArchiveView, ClientArchivedShipment, client_redaction},
    config::{ArchivalConfig, load_config},
    error::status_label,
    transform::ROOT,
    types::{Pagination, TimeStamp},
    utils::{new_ordered_id, new_uuid_to_bech32},
};
use std::io::Write;

// UTILS MODULE TESTS
#[cfg(test)]
mod utils_tests {
    use super::*;

    /// Test that new_uuid_to_bech32 generates valid bech32-encoded strings
    /// with the correct human-readable prefix
    #[test]
    fn generates_valid_bech32_with_hrp() {
        let encoded = new_uuid_to_bech32("shp").unwrap();
        assert!(encoded.starts_with("shp1"));
        assert!(encoded.len() > 10);
    }

    #[test]
    fn handles_empty_hrp() {
        assert!(new_uuid_to_bech32("").is_err());
    }

    #[test]
    fn ordered_ids_sort_by_creation() {
        let ids: Vec<String> = (0..50).map(|_| new_ordered_id()).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
    }
}

// TYPES MODULE TESTS
#[cfg(test)]
mod types_tests {
    use super::*;

    #[test]
    fn timestamp_new_creates_current_time() {
        let ts = TimeStamp::new();
        let diff = (Utc::now() - ts.to_datetime_utc()).num_seconds().abs();
        assert!(diff < 1);
    }

    #[test]
    fn timestamp_new_with_creates_specific_time() {
        let dt = TimeStamp::new_with(2024, 6, 15, 10, 30, 0).unwrap().to_datetime_utc();

        assert_eq!(dt.year(), 2024);
        assert_eq!(dt.month(), 6);
        assert_eq!(dt.day(), 15);
        assert_eq!(dt.hour(), 10);
        assert_eq!(dt.minute(), 30);
    }

    #[test]
    fn timestamp_serializes_as_rfc3339() {
        let ts = TimeStamp::new_with(2024, 6, 15, 10, 30, 0).unwrap();
        let json = serde_json::to_value(ts).unwrap();
        assert_eq!(json, serde_json::json!("2024-06-15T10:30:00Z"));
    }

    /// Client-role actors are audited under their username
    #[test]
    fn actor_display_names() {
        let client = Actor::authenticated("mill-op", [Role::Client]);
        assert!(client.has_role(Role::Client));
        assert_eq!(client.display_name(), "mill-op");

        let admin = Actor::authenticated("root", [Role::Admin]);
        assert!(!admin.has_role(Role::Client));
        assert_eq!(admin.display_name(), "root");

        assert_eq!(Actor::Anonymous.display_name(), "UNKNOWN");
        assert_eq!(Actor::authenticated("", [Role::Client]).display_name(), "UNKNOWN");
    }

    #[test]
    fn pagination_headers() {
        let pagination = Pagination {
            count: 25,
            limit: 10,
            offset: 10,
        };

        let headers = pagination.headers();

        assert_eq!(headers[0], ("X-Pagination-Count", "25".to_string()));
        assert_eq!(headers[2], ("X-Pagination-Offset", "10".to_string()));
        assert_eq!(headers[3], ("X-Pagination-TotalPages", "3".to_string()));
    }
}

// ERROR MODULE TESTS
#[cfg(test)]
mod error_tests {
    use super::*;

    #[test]
    fn status_labels_follow_error_kind() {
        let not_found: anyhow::Error = ArchiveError::NotFound("x".into()).into();
        let conflict: anyhow::Error = ArchiveError::Conflict("x".into()).into();
        let strict: anyhow::Error = ArchiveError::StrictTransform("x".into()).into();
        let other = anyhow::anyhow!("disk on fire");

        assert_eq!(status_label(&not_found), "404");
        assert_eq!(status_label(&conflict), "409");
        assert_eq!(status_label(&strict), "400");
        assert_eq!(status_label(&other), "400");
    }
}

// ARCHIVE MODULE TESTS
#[cfg(test)]
mod archive_tests {
    use super::*;

    #[test]
    fn client_redaction_targets_statuses_and_attachments() {
        let config = client_redaction();
        assert_eq!(config.fields_at(ROOT).unwrap(), &["statuses".to_string()]);
        assert_eq!(
            config.fields_at("shipmentAttachments").unwrap(),
            &["id".to_string(), "updatedAt".to_string()]
        );
        assert!(!config.is_strict());
    }

    #[test]
    fn client_view_serializes_three_fields() {
        let view = ArchiveView::Client(ClientArchivedShipment {
            reason: "duplicate".into(),
            created_at: TimeStamp::new_with(2024, 1, 1, 0, 0, 0).unwrap(),
            snapshot: serde_json::json!({"codeGen": "X1"}),
        });

        let json = serde_json::to_value(&view).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "reason": "duplicate",
                "createdAt": "2024-01-01T00:00:00Z",
                "snapshot": {"codeGen": "X1"}
            })
        );
    }
}

// CONFIG MODULE TESTS
#[cfg(test)]
mod config_tests {
    use super::*;

    #[test]
    fn loads_config_from_file() -> anyhow::Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let path = temp_dir.path().join("archive.toml");
        let mut file = std::fs::File::create(&path)?;
        writeln!(file, "db_path = \"{}\"", temp_dir.path().join("db").display())?;
        writeln!(file, "default_page_size = 25")?;

        let config = load_config(&path)?;

        assert_eq!(config.default_page_size, 25);
        assert_eq!(config.max_page_size, ArchivalConfig::default().max_page_size);
        let db = config.open_db()?;
        assert!(db.is_empty());
        Ok(())
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(load_config(std::path::Path::new("/nonexistent/archive.toml")).is_err());
    }
}
