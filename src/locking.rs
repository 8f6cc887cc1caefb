//! Lock acquisition and batch-scoped lock ownership
//!
//! A `LockingCoordinator` owns every lock taken during one orchestration
//! call. It has exactly two exits: [`LockingCoordinator::hand_over`] when
//! the locks travel into a commit (the backend releases them), and
//! [`LockingCoordinator::release_all`] when the call fails before the
//! commit. Both consume the coordinator, so a token can never be released
//! twice. A coordinator dropped with locks still held releases them.

use crate::error::{Error, Result};
use crate::item::{ItemPath, Repository, Revision};
use crate::repository::CommitBackend;
use log::{debug, warn};

/// Lock comment used for transform and import overwrites.
pub const TRANSFORM_LOCK_COMMENT: &str = "Locked for transform";

/// Opaque lock handle bound to one path and the base revision it was
/// acquired at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockToken {
    repository: Repository,
    path: ItemPath,
    token: String,
    base: Revision,
}

impl LockToken {
    pub fn new(repository: Repository, path: ItemPath, token: &str, base: Revision) -> Self {
        Self {
            repository,
            path,
            token: token.to_string(),
            base,
        }
    }

    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    pub fn path(&self) -> &ItemPath {
        &self.path
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn base(&self) -> Revision {
        self.base
    }
}

/// Acquires overwrite locks and tracks them for rollback.
pub struct LockingCoordinator<'a> {
    backend: &'a dyn CommitBackend,
    comment: String,
    held: Vec<LockToken>,
}

impl<'a> LockingCoordinator<'a> {
    pub fn new(backend: &'a dyn CommitBackend, comment: &str) -> Self {
        Self {
            backend,
            comment: comment.to_string(),
            held: Vec::new(),
        }
    }

    /// Lock `path` before overwriting it.
    ///
    /// A backend that reports success without a single token for `path` is
    /// a contract violation and yields `Error::InvalidState`. Any tokens it
    /// did return are still tracked so rollback releases them.
    pub fn acquire_for_overwrite(
        &mut self,
        repository: &Repository,
        path: &ItemPath,
        base: Revision,
    ) -> Result<LockToken> {
        let tokens = self.backend.lock(repository, &self.comment, base, path)?;

        let single = match tokens.as_slice() {
            [token] if token.path() == path && !token.token().is_empty() => Some(token.clone()),
            _ => None,
        };

        match single {
            Some(token) => {
                debug!("Locked '{}' at base revision {}", path, base);
                self.held.push(token.clone());
                Ok(token)
            }
            None => {
                self.held.extend(tokens);
                Err(Error::InvalidState {
                    message: format!(
                        "Unable to retrieve the lock token after locking {}",
                        path
                    ),
                })
            }
        }
    }

    /// Locks taken so far.
    pub fn held(&self) -> &[LockToken] {
        &self.held
    }

    pub fn len(&self) -> usize {
        self.held.len()
    }

    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }

    /// Ownership of the held locks moves to the commit.
    pub fn hand_over(mut self) -> Vec<LockToken> {
        std::mem::take(&mut self.held)
    }

    /// Best-effort release of every held lock.
    ///
    /// Each token is released with its own backend call. A failing release
    /// is logged and the remaining tokens are still released. Never fails.
    pub fn release_all(mut self) {
        let held = std::mem::take(&mut self.held);
        release_tokens(self.backend, held);
    }
}

impl Drop for LockingCoordinator<'_> {
    fn drop(&mut self) {
        if !self.held.is_empty() {
            warn!(
                "{} lock(s) still held when the batch ended, releasing",
                self.held.len()
            );
            let held = std::mem::take(&mut self.held);
            release_tokens(self.backend, held);
        }
    }
}

fn release_tokens(backend: &dyn CommitBackend, tokens: Vec<LockToken>) {
    if tokens.is_empty() {
        return;
    }
    debug!("Releasing {} lock(s)", tokens.len());
    for token in tokens {
        if let Err(e) = backend.unlock(std::slice::from_ref(&token)) {
            warn!("Failed to release lock on '{}': {}", token.path(), e);
        }
    }
}
