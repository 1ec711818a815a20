//! Date and user-config storage
//!
//! The synchronizer only needs a narrow view of its key-value store: a
//! single watermark record and one record per user. Both sit behind traits
//! so the backing storage can be swapped without touching the pipeline.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::types::{StoreError, UserConfig};

pub mod user_config;

pub use user_config::UserConfigRepository;

/// Older records were written with a 2-digit year and no seconds
const LEGACY_DATE_FORMAT: &str = "%d %b %y %H:%M %z";

/// Storage of the last processed date (the watermark)
#[async_trait]
pub trait DateStore: Send + Sync {
    async fn last_processed_date(&self) -> Result<DateTime<Utc>, StoreError>;

    async fn save_processed_date(&self, date: DateTime<Utc>) -> Result<(), StoreError>;
}

/// Storage of per-user configuration, keyed by email
#[async_trait]
pub trait UserConfigStore: Send + Sync {
    /// Configuration of the user with the given email
    ///
    /// Returns [`StoreError::NotFound`] when the email has no record.
    async fn user_config(&self, email: &str) -> Result<UserConfig, StoreError>;

    /// Every stored configuration
    async fn all_user_configs(&self) -> Result<Vec<UserConfig>, StoreError>;
}

/// Render a watermark the way it is persisted (RFC 2822 with zone)
pub fn format_processed_date(date: DateTime<Utc>) -> String {
    date.to_rfc2822()
}

/// Read a persisted watermark
///
/// Accepts RFC 2822 and the legacy `02 Jan 06 15:04 -0700` layout.
pub fn parse_processed_date(value: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc2822(value)
        .or_else(|_| DateTime::parse_from_str(value, LEGACY_DATE_FORMAT))
        .map(|date| date.with_timezone(&Utc))
        .map_err(|_| StoreError::InvalidDate {
            value: value.to_string(),
        })
}
