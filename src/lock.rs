//! Distributed mutual exclusion over the remote store.
//!
//! A lock is a key holding a random token, created with an atomic
//! set-if-absent and a TTL so a crashed holder cannot deadlock the resource.
//! Release deletes the key only while it still holds the token, so an expired
//! lock re-acquired by someone else is never deleted by the old holder.
//!
//! Acquisition is not reentrant. A per-task set of held resource names makes
//! nested acquisition of the same resource fail fast instead of blocking
//! until the outer hold expires.

use std::cell::RefCell;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use redstash_store::RemoteStore;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::CacheError;

/// Delay between acquisition attempts while waiting.
const RETRY_INTERVAL: Duration = Duration::from_millis(100);

tokio::task_local! {
    static HELD_RESOURCES: RefCell<HashSet<String>>;
}

/// Whether the current task already holds a lock on `resource`.
pub(crate) fn already_held(resource: &str) -> bool {
    HELD_RESOURCES
        .try_with(|held| held.borrow().contains(resource))
        .unwrap_or(false)
}

/// Runs `fut` with `resource` recorded in the current task's held set,
/// establishing the set when this is the task's outermost lock.
pub(crate) async fn track<F>(resource: String, fut: F) -> F::Output
where
    F: Future,
{
    struct HeldToken(String);

    impl Drop for HeldToken {
        fn drop(&mut self) {
            let _ = HELD_RESOURCES.try_with(|held| held.borrow_mut().remove(&self.0));
        }
    }

    async fn run<F: Future>(resource: String, fut: F) -> F::Output {
        HELD_RESOURCES.with(|held| held.borrow_mut().insert(resource.clone()));
        let _token = HeldToken(resource);
        fut.await
    }

    if HELD_RESOURCES.try_with(|_| ()).is_ok() {
        run(resource, fut).await
    } else {
        HELD_RESOURCES
            .scope(RefCell::new(HashSet::new()), run(resource, fut))
            .await
    }
}

/// A held lock. Releasing is explicit; dropping an unreleased guard spawns the
/// release so cancellation or an early return never leaves the lock dangling
/// past its TTL.
pub(crate) struct LockGuard {
    store: Arc<dyn RemoteStore>,
    key: String,
    token: String,
    released: bool,
}

impl LockGuard {
    pub(crate) async fn release(mut self) {
        self.released = true;
        match self.store.del_if_equal(&self.key, &self.token).await {
            Ok(true) => debug!(lock.key = %self.key, "Lock released"),
            // Someone else holds it now; our hold expired. Nothing to delete.
            Ok(false) => debug!(lock.key = %self.key, "Lock already expired at release"),
            Err(e) => {
                warn!(lock.key = %self.key, error = %e, "Lock release failed; key will expire on its own");
            }
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let store = Arc::clone(&self.store);
        let key = std::mem::take(&mut self.key);
        let token = std::mem::take(&mut self.token);
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Err(e) = store.del_if_equal(&key, &token).await {
                    warn!(lock.key = %key, error = %e, "Lock release on drop failed; key will expire on its own");
                }
            });
        }
    }
}

/// Tries to take the lock at `lock_key`.
///
/// Returns `Ok(None)` immediately when `wait` is false and the lock is held
/// elsewhere. When `wait` is true, retries until acquired or until `expires`
/// has elapsed, then reports [`CacheError::LockTimeout`]; the bound matches
/// the lock TTL so a crashed holder frees the resource within the wait.
pub(crate) async fn acquire(
    store: &Arc<dyn RemoteStore>,
    resource: &str,
    lock_key: &str,
    expires: Duration,
    wait: bool,
) -> Result<Option<LockGuard>, CacheError> {
    let expires = expires.max(Duration::from_secs(1));
    let deadline = Instant::now() + expires;
    let token = Uuid::new_v4().to_string();

    loop {
        if store.set_nx(lock_key, &token, expires).await? {
            debug!(lock.key = %lock_key, "Lock acquired");
            return Ok(Some(LockGuard {
                store: Arc::clone(store),
                key: lock_key.to_string(),
                token: token.clone(),
                released: false,
            }));
        }
        if !wait {
            debug!(lock.key = %lock_key, "Lock busy, not waiting");
            return Ok(None);
        }
        if Instant::now() + RETRY_INTERVAL > deadline {
            return Err(CacheError::LockTimeout {
                resource: resource.to_string(),
            });
        }
        tokio::time::sleep(RETRY_INTERVAL).await;
    }
}
