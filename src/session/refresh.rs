//! Single-flight token renewal.
//!
//! At most one renewal request is in flight for the whole process. The
//! in-flight renewal is an explicit slot: `None` or a shared future that
//! every concurrent caller awaits, so all waiters observe the identical
//! token set or the identical error. The slot is set before the network
//! call and cleared when the renewal settles, and a settled failure is
//! never auto-retried.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::api::{AuthApi, TokenSet};
use crate::error::AuthError;
use crate::session::manager::SessionCell;

type SharedRefresh = Shared<BoxFuture<'static, Result<TokenSet, AuthError>>>;

/// An in-flight renewal: the shared outcome all waiters attach to.
struct Pending {
    id: u64,
    fut: SharedRefresh,
}

pub(crate) struct RefreshCoordinator {
    api: Arc<dyn AuthApi>,
    cell: Arc<SessionCell>,
    pending: Arc<Mutex<Option<Pending>>>,
    next_id: AtomicU64,
}

impl RefreshCoordinator {
    pub(crate) fn new(api: Arc<dyn AuthApi>, cell: Arc<SessionCell>) -> Self {
        Self { api, cell, pending: Arc::new(Mutex::new(None)), next_id: AtomicU64::new(0) }
    }

    /// Obtain a fresh token set, coalescing concurrent callers onto a single
    /// renewal request.
    ///
    /// Every failure path forces the logout transition; a success settled
    /// after the session generation moved on (login/logout superseded it) is
    /// returned to waiters but never applied.
    pub(crate) async fn ensure_fresh_token(&self) -> Result<TokenSet, AuthError> {
        let fut = {
            let mut slot = self.pending.lock().await;
            if let Some(pending) = slot.as_ref() {
                debug!("joining in-flight token renewal");
                pending.fut.clone()
            } else {
                let generation = self.cell.generation();
                let refresh_token = match self.cell.refresh_token() {
                    Some(token) => token,
                    None => {
                        drop(slot);
                        warn!("token renewal requested with no refresh token");
                        self.cell.force_logout_if_current(generation);
                        return Err(AuthError::NoRefreshToken);
                    }
                };
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                let fut = self.start_renewal(id, refresh_token, generation);
                *slot = Some(Pending { id, fut: fut.clone() });
                fut
            }
        };
        fut.await
    }

    /// Build the shared renewal future. Whichever waiter drives it performs
    /// the settle steps exactly once: clear the slot, then apply the outcome
    /// to the state machine.
    fn start_renewal(&self, id: u64, refresh_token: String, generation: u64) -> SharedRefresh {
        let api = Arc::clone(&self.api);
        let cell = Arc::clone(&self.cell);
        let pending = Arc::clone(&self.pending);

        async move {
            let outcome = api.refresh(&refresh_token).await;

            // Clear the slot first so a caller arriving after settlement
            // starts a new flight instead of joining this one.
            {
                let mut slot = pending.lock().await;
                if slot.as_ref().is_some_and(|p| p.id == id) {
                    *slot = None;
                }
            }

            match &outcome {
                Ok(tokens) => {
                    if !cell.apply_refreshed_tokens(generation, tokens) {
                        debug!("discarding stale renewal result (session superseded)");
                    }
                }
                Err(e) => {
                    warn!(error = %e, "token renewal failed, forcing logout");
                    cell.force_logout_if_current(generation);
                }
            }
            outcome
        }
        .boxed()
        .shared()
    }
}
