//! Last-processed-date bookkeeping

use chrono::{DateTime, NaiveDate, NaiveTime, TimeDelta, Utc};
use tracing::{info, warn};

use crate::accounting::Outcome;
use crate::repository::DateStore;

/// How far back a run searches when the stored date cannot be read
pub const FALLBACK_DAYS: i64 = 30;

/// How far back the next run starts when nothing failed
pub const SETTLE_HOURS: i64 = 24;

/// Lower bound of the mail search for this run
///
/// An operator override wins over the stored date; a storage failure falls
/// back to [`FALLBACK_DAYS`] before `now`.
pub async fn load(
    store: &dyn DateStore,
    override_date: Option<NaiveDate>,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    if let Some(date) = override_date {
        let since = date.and_time(NaiveTime::MIN).and_utc();
        info!(%since, "using last processed date override");
        return since;
    }

    match store.last_processed_date().await {
        Ok(since) => {
            info!(%since, "loaded last processed date");
            since
        }
        Err(e) => {
            let since = now - TimeDelta::days(FALLBACK_DAYS);
            warn!(error = %e, %since, "could not load last processed date, using fallback");
            since
        }
    }
}

/// Watermark for the next run
///
/// The earliest origin date among the transactions that failed to register,
/// so they are searched again; [`SETTLE_HOURS`] before `now` when none
/// failed.
pub fn next(outcomes: &[Outcome], now: DateTime<Utc>) -> DateTime<Utc> {
    outcomes
        .iter()
        .filter(|outcome| outcome.result.is_err())
        .map(|outcome| outcome.transaction.origin.date)
        .min()
        .unwrap_or_else(|| now - TimeDelta::hours(SETTLE_HOURS))
}
