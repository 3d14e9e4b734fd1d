use {
    sealpost_protocol::{FileStatus, Manifest},
    tracing::{info, warn},
};

/// Outcome of a session, counted per file status.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Summary {
    pub transferred: usize,
    pub duplicate: usize,
    /// Names of files that were sent but not stored by the receiver.
    pub failed: Vec<String>,
    /// Files the session ended before reaching.
    pub pending: usize,
}

impl Summary {
    #[must_use]
    #[inline]
    pub fn from_manifest(manifest: &Manifest) -> Self {
        let mut summary = Self::default();
        for entry in manifest.entries() {
            match entry.status {
                FileStatus::Transferred => summary.transferred = summary.transferred.saturating_add(1),
                FileStatus::Duplicate => summary.duplicate = summary.duplicate.saturating_add(1),
                FileStatus::Failed => summary.failed.push(entry.name.clone()),
                FileStatus::Pending => summary.pending = summary.pending.saturating_add(1),
            }
        }
        summary
    }

    #[must_use]
    #[inline]
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.pending == 0
    }

    #[inline]
    pub fn report(&self) {
        info!(
            transferred = self.transferred,
            duplicate = self.duplicate,
            failed = self.failed.len(),
            "transfer summary"
        );
        for name in &self.failed {
            warn!(%name, "file was not stored by the receiver");
        }
        if self.pending > 0 {
            warn!(count = self.pending, "files were not sent");
        }
    }
}
