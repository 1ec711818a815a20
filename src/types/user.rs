//! Per-user configuration, keyed by the recipient email

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Bank-local account number to accounting account number overrides
pub type AccountMapping = HashMap<String, String>;

/// Accounting service credentials for a user
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AccountingConfig {
    #[serde(rename = "Token")]
    pub token: String,
}

/// Configuration of one user of the synchronizer
///
/// A message belongs to the first of its `To:` recipients that has a
/// `UserConfig`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UserConfig {
    #[serde(rename = "Email")]
    pub email: String,

    /// Number the run summary is sent to
    #[serde(rename = "SMSDeliveryNumber")]
    pub sms_delivery_number: String,

    #[serde(rename = "Toshl")]
    pub accounting: AccountingConfig,

    /// Bank name to account overrides, applied on top of the name prefixes
    #[serde(rename = "AccountMappings", default)]
    pub mappings: HashMap<String, AccountMapping>,
}

impl UserConfig {
    pub fn token(&self) -> &str {
        &self.accounting.token
    }
}
