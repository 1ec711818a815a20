//! JSON file stores for the watermark and the user configurations

use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::debug;

use crate::repository::{
    format_processed_date, parse_processed_date, DateStore, UserConfigStore,
};
use crate::types::{StoreError, UserConfig};

const DATE_RECORD_ID: u32 = 1;

/// The single watermark record
#[derive(Debug, Serialize, Deserialize)]
struct DateRecord {
    #[serde(rename = "Id")]
    id: u32,

    #[serde(rename = "LastProcessedDate")]
    last_processed_date: String,
}

/// Watermark kept as `{"Id":1,"LastProcessedDate":"<RFC 2822>"}`
#[derive(Debug, Clone)]
pub struct JsonDateStore {
    path: PathBuf,
}

impl JsonDateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl DateStore for JsonDateStore {
    async fn last_processed_date(&self) -> Result<DateTime<Utc>, StoreError> {
        let content = match fs::read(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::NotFound {
                    key: DATE_RECORD_ID.to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };

        let record: DateRecord = serde_json::from_slice(&content)?;
        parse_processed_date(&record.last_processed_date)
    }

    async fn save_processed_date(&self, date: DateTime<Utc>) -> Result<(), StoreError> {
        let record = DateRecord {
            id: DATE_RECORD_ID,
            last_processed_date: format_processed_date(date),
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&self.path, serde_json::to_vec_pretty(&record)?).await?;
        debug!(path = %self.path.display(), %date, "saved last processed date");
        Ok(())
    }
}

/// User configurations kept as one JSON array
#[derive(Debug, Clone)]
pub struct JsonUserConfigStore {
    path: PathBuf,
}

impl JsonUserConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl UserConfigStore for JsonUserConfigStore {
    async fn user_config(&self, email: &str) -> Result<UserConfig, StoreError> {
        self.all_user_configs()
            .await?
            .into_iter()
            .find(|config| config.email == email)
            .ok_or_else(|| StoreError::NotFound {
                key: email.to_string(),
            })
    }

    async fn all_user_configs(&self) -> Result<Vec<UserConfig>, StoreError> {
        let content = fs::read(&self.path).await?;
        Ok(serde_json::from_slice(&content)?)
    }
}
