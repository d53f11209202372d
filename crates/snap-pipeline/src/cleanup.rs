//! Removal of per-run resources.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use snap_firestore::UploadTokenStore;
use snap_models::UploadToken;

use crate::error::{PipelineError, PipelineResult};
use crate::metrics;
use crate::workspace::RunWorkspace;

/// What a cleanup call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupOutcome {
    /// Resources were released by this call
    Performed,
    /// An earlier call already ran
    AlreadyDone,
}

/// Hands out one [`RunCleanup`] per run.
#[derive(Clone)]
pub struct CleanupManager {
    tokens: Arc<dyn UploadTokenStore>,
}

impl CleanupManager {
    pub fn new(tokens: Arc<dyn UploadTokenStore>) -> Self {
        Self { tokens }
    }

    pub fn for_run(&self, workspace: RunWorkspace, token: UploadToken) -> RunCleanup {
        RunCleanup {
            tokens: Arc::clone(&self.tokens),
            workspace,
            token,
            workspace_claimed: AtomicBool::new(false),
            token_claimed: AtomicBool::new(false),
            done: AtomicBool::new(false),
        }
    }
}

/// Releases the workspace and the consumed upload token of one run.
pub struct RunCleanup {
    tokens: Arc<dyn UploadTokenStore>,
    workspace: RunWorkspace,
    token: UploadToken,
    workspace_claimed: AtomicBool,
    token_claimed: AtomicBool,
    done: AtomicBool,
}

impl RunCleanup {
    /// Take exclusive ownership of the workspace and arm its removal.
    ///
    /// If another run already holds it, nothing is armed and the holder's
    /// directory and token stay untouched.
    pub async fn claim_workspace(&self) -> PipelineResult<()> {
        match self.workspace.claim().await {
            Ok(()) => {
                self.workspace_claimed.store(true, Ordering::SeqCst);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                warn!(
                    token = %self.token,
                    dir = %self.workspace.dir().display(),
                    "Workspace already held by another run"
                );
                Err(PipelineError::InUse(format!("upload token {}", self.token)))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Mark the token as consumed by this run so cleanup deletes its record.
    ///
    /// Unclaimed tokens are left alone: they may be unknown or belong to
    /// someone else.
    pub fn claim_token(&self) {
        self.token_claimed.store(true, Ordering::SeqCst);
    }

    /// Remove the claimed workspace and delete the claimed token record.
    ///
    /// Only the first call does anything. Both steps are attempted even if the
    /// first fails; the error lists every failed step.
    pub async fn execute(&self) -> PipelineResult<CleanupOutcome> {
        if self.done.swap(true, Ordering::SeqCst) {
            debug!(token = %self.token, "Cleanup already ran");
            return Ok(CleanupOutcome::AlreadyDone);
        }

        let mut failures = Vec::new();

        if self.workspace_claimed.load(Ordering::SeqCst) {
            match self.workspace.remove().await {
                Ok(true) => debug!(dir = %self.workspace.dir().display(), "Removed workspace"),
                Ok(false) => debug!(dir = %self.workspace.dir().display(), "Workspace already absent"),
                Err(e) => {
                    warn!(dir = %self.workspace.dir().display(), error = %e, "Failed to remove workspace");
                    metrics::record_cleanup_failure("workspace");
                    failures.push(format!("workspace {}: {}", self.workspace.dir().display(), e));
                }
            }
        }

        if self.token_claimed.load(Ordering::SeqCst) {
            if let Err(e) = self.tokens.delete_session(&self.token).await {
                warn!(token = %self.token, error = %e, "Failed to delete upload token");
                metrics::record_cleanup_failure("upload_token");
                failures.push(format!("upload token {}: {}", self.token, e));
            }
        }

        if failures.is_empty() {
            info!(token = %self.token, "Cleanup complete");
            Ok(CleanupOutcome::Performed)
        } else {
            Err(PipelineError::CleanupError {
                message: failures.join("; "),
                published: None,
            })
        }
    }

    pub fn workspace(&self) -> &RunWorkspace {
        &self.workspace
    }
}
