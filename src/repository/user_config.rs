//! Cached user-config lookups
//!
//! # Design
//!
//! The first lookup of a run preloads every stored configuration into a
//! `DashMap`, so the registration workers hit memory instead of the store.
//! Emails that were not preloaded fall through to the store and are cached
//! once found.
//!
//! # Thread Safety
//!
//! The preload runs exactly once, behind a `tokio::sync::OnceCell`, even
//! when several workers race for it. The cache itself is sharded by
//! `DashMap`.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::UserConfigStore;
use crate::types::{AccountingError, StoreError, UserConfig};

/// Read-through cache over a [`UserConfigStore`]
pub struct UserConfigRepository {
    store: Arc<dyn UserConfigStore>,
    cache: DashMap<String, UserConfig>,
    preloaded: OnceCell<()>,
}

impl UserConfigRepository {
    pub fn new(store: Arc<dyn UserConfigStore>) -> Self {
        Self {
            store,
            cache: DashMap::new(),
            preloaded: OnceCell::new(),
        }
    }

    async fn preload(&self) {
        self.preloaded
            .get_or_init(|| async {
                match self.store.all_user_configs().await {
                    Ok(configs) => {
                        debug!(users = configs.len(), "preloaded user configs");
                        for config in configs {
                            self.cache.insert(config.email.clone(), config);
                        }
                    }
                    // Lookups still fall through to the store
                    Err(e) => warn!(error = %e, "could not preload user configs"),
                }
            })
            .await;
    }

    /// Configuration of the user with the given email
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for unknown emails, or the store's
    /// own error when it fails.
    pub async fn user_config(&self, email: &str) -> Result<UserConfig, StoreError> {
        self.preload().await;

        if let Some(config) = self.cache.get(email) {
            return Ok(config.clone());
        }

        let config = self.store.user_config(email).await?;
        self.cache.insert(email.to_string(), config.clone());

        Ok(config)
    }

    /// Configuration of the first candidate email that has one
    ///
    /// Candidates are tried in order and the first hit wins. Store failures
    /// on one candidate do not stop the search; when nothing is found the
    /// last such failure is reported instead of a plain miss.
    ///
    /// # Errors
    ///
    /// - [`AccountingError::Cancelled`] when `done` fires during the search
    /// - [`AccountingError::Store`] when no candidate resolved and the store failed
    /// - [`AccountingError::UserConfigNotFound`] otherwise
    pub async fn user_config_from_candidates(
        &self,
        done: &CancellationToken,
        candidates: &[String],
    ) -> Result<UserConfig, AccountingError> {
        let mut failure = None;

        for candidate in candidates {
            if done.is_cancelled() {
                return Err(AccountingError::Cancelled);
            }

            match self.user_config(candidate).await {
                Ok(config) => return Ok(config),
                Err(StoreError::NotFound { .. }) => {}
                Err(e) => {
                    warn!(email = %candidate, error = %e, "user config lookup failed");
                    failure = Some(e);
                }
            }
        }

        match failure {
            Some(e) => Err(AccountingError::Store(e)),
            None => Err(AccountingError::UserConfigNotFound {
                candidates: candidates.to_vec(),
            }),
        }
    }
}
