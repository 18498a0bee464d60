//! Run context threaded through every component of a run.

use std::path::{Path, PathBuf};
use tessera_core::{BuildTarget, HarnessConfig, KeyDescriptor, PollPolicy};
use tokio::sync::watch;

use crate::monitor::TransactionMonitor;

pub struct RunContext<C> {
    /// Root of the source tree (`build.json` lives here).
    pub source_root: PathBuf,
    pub target: BuildTarget,
    pub network: String,
    pub root_key: KeyDescriptor,
    pub policy: PollPolicy,
    pub error_markers: Vec<String>,
    pub client: C,
    /// Set to `true` to cancel any wait in progress.
    pub shutdown: watch::Receiver<bool>,
}

impl<C> RunContext<C> {
    pub fn from_config(
        config: &HarnessConfig,
        source_root: impl Into<PathBuf>,
        target: BuildTarget,
        client: C,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            source_root: source_root.into(),
            target,
            network: config.ledger.network.clone(),
            root_key: config.root_key.clone(),
            policy: config.poll_policy(),
            error_markers: config.markers.transaction_error.clone(),
            client,
            shutdown,
        }
    }

    pub fn stage_dir(&self, stage: &str) -> PathBuf {
        BuildTarget::stage_dir(&self.source_root, stage)
    }

    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    pub fn monitor(&self) -> TransactionMonitor {
        TransactionMonitor::new(self.policy, self.error_markers.clone(), self.shutdown.clone())
    }
}
