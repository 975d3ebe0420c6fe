//! Roster reconciliation against the ingestion service

use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, info, warn};

use camwatch_client::StreamApi;

use crate::roster::{MergeReport, RosterHandle};

/// Pulls the live stream list and merges it into the roster
pub struct RosterReconciler {
    api: Arc<dyn StreamApi>,
    roster: RosterHandle,
    default_fps: u32,
}

impl RosterReconciler {
    pub fn new(api: Arc<dyn StreamApi>, roster: RosterHandle, default_fps: u32) -> Self {
        Self {
            api,
            roster,
            default_fps: default_fps.max(1),
        }
    }

    /// Fetch the roster once and merge it
    ///
    /// A failed fetch leaves every record as it was, so a network blip does
    /// not flap the whole roster to inactive.
    pub async fn reconcile_once(&self) -> Result<MergeReport> {
        let entries = match self.api.list_streams().await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("roster fetch failed, keeping current state: {}", e);
                self.roster.record_reconcile(false);
                return Err(e.into());
            }
        };

        let report = self.roster.merge(&entries, self.default_fps);
        self.roster.record_reconcile(true);

        if report.has_transitions() {
            info!(
                "roster merged: {} activated, {} deactivated, {} errored, {} reconfigured, {} restarted",
                report.activated.len(),
                report.deactivated.len(),
                report.errored.len(),
                report.reconfigured.len(),
                report.restarted.len()
            );
        } else {
            debug!("roster unchanged ({} live)", entries.len());
        }

        Ok(report)
    }
}
