//! Order status polling
//!
//! One poll session per operation id: fetch, classify, dispatch on change,
//! stop at the first terminal state, the deadline, or cancellation.
//! Sessions are de-duplicated through a registry owned by the poller
//! instance, so two observers of the same order never produce duplicate
//! terminal callbacks.

mod source;

pub use source::{source_fn, FnSource, StatusSource};

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::PollConfig;
use crate::status::{OperationId, OperationState};

/// Callbacks for one polling session
///
/// Exactly one of `on_success` / `on_failed` / `on_expired` fires per
/// session, after which nothing else does.
pub trait PollObserver: Send {
    /// The observed state changed (fires for the first observation too)
    fn on_status_change(&mut self, state: OperationState);
    /// Terminal: the operation succeeded
    fn on_success(&mut self, id: &OperationId);
    /// Terminal: the operation definitively failed
    fn on_failed(&mut self, reason: String);
    /// Terminal: expired server-side, or the polling deadline passed
    fn on_expired(&mut self);
    /// A status lookup failed; polling continues
    fn on_error(&mut self, message: String);
}

/// Cancellation handle for one poll session
///
/// Clones refer to the same session. Stopping is idempotent and safe after
/// the session already ended on its own.
#[derive(Clone)]
pub struct PollHandle {
    id: OperationId,
    epoch: u64,
    token: CancellationToken,
}

impl PollHandle {
    /// Stop the session: the pending sleep is interrupted and an in-flight
    /// lookup result is discarded on arrival
    pub fn stop(&self) {
        self.token.cancel();
    }

    /// False once the session stopped for any reason
    pub fn is_live(&self) -> bool {
        !self.token.is_cancelled()
    }

    pub fn operation_id(&self) -> &OperationId {
        &self.id
    }
}

/// Spawns and de-duplicates poll sessions
///
/// Cheap to clone; clones share the session registry.
#[derive(Clone, Default)]
pub struct StatusPoller {
    inner: Arc<PollerInner>,
}

#[derive(Default)]
struct PollerInner {
    sessions: Mutex<HashMap<OperationId, PollHandle>>,
    epochs: AtomicU64,
}

impl StatusPoller {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start polling `id`, or return the live session's handle if one exists
    ///
    /// The second `start` for an id whose session is still live spawns
    /// nothing; the single session produces the only set of callbacks.
    pub fn start<S, O>(
        &self,
        id: OperationId,
        source: S,
        observer: O,
        config: PollConfig,
    ) -> PollHandle
    where
        S: StatusSource + 'static,
        O: PollObserver + 'static,
    {
        let mut sessions = self.inner.sessions.lock();
        if let Some(existing) = sessions.get(&id) {
            if existing.is_live() {
                debug!("Poll session for {} already live, reusing it", id);
                return existing.clone();
            }
        }

        let handle = PollHandle {
            id: id.clone(),
            epoch: self.inner.epochs.fetch_add(1, Ordering::Relaxed),
            token: CancellationToken::new(),
        };
        sessions.insert(id, handle.clone());
        drop(sessions);

        info!(
            "Starting poll session for {} (interval {}ms, deadline {}ms)",
            handle.id, config.interval_ms, config.max_duration_ms
        );
        tokio::spawn(run_session(
            Arc::clone(&self.inner),
            handle.clone(),
            source,
            observer,
            config,
        ));
        handle
    }

    /// Whether a live session exists for `id`
    pub fn is_polling(&self, id: &OperationId) -> bool {
        self.inner
            .sessions
            .lock()
            .get(id)
            .is_some_and(PollHandle::is_live)
    }

    /// Stop every live session (host shutdown)
    pub fn stop_all(&self) {
        for handle in self.inner.sessions.lock().values() {
            handle.stop();
        }
    }
}

/// The poll loop: fetch, classify, dispatch, sleep
async fn run_session<S, O>(
    poller: Arc<PollerInner>,
    handle: PollHandle,
    source: S,
    mut observer: O,
    config: PollConfig,
) where
    S: StatusSource,
    O: PollObserver,
{
    let deadline = Instant::now() + config.max_duration();
    let mut current: Option<OperationState> = None;
    let mut consecutive_failures = 0u32;
    let notify_after = config.error_notify_after.max(1);

    loop {
        // The deadline races the lookup itself; a stalled server cannot
        // hold the session past `max_duration`
        let report = tokio::select! {
            biased;
            _ = handle.token.cancelled() => break,
            _ = tokio::time::sleep_until(deadline) => {
                info!("Poll session for {} hit its deadline", handle.id);
                observer.on_expired();
                break;
            }
            report = source.fetch(&handle.id) => report,
        };
        // A stop that raced the lookup: the late result is discarded
        if handle.token.is_cancelled() {
            break;
        }

        match report {
            Ok(report) => {
                consecutive_failures = 0;
                let state = report.state;
                match current {
                    Some(previous) if state.rank() < previous.rank() => {
                        // Out-of-order response; never walk backwards
                        debug!(
                            "Ignoring stale status {} for {} (already {})",
                            state, handle.id, previous
                        );
                    }
                    Some(previous) if state == previous => {}
                    _ => {
                        debug!("Order {} moved to {}", handle.id, state);
                        current = Some(state);
                        observer.on_status_change(state);
                    }
                }

                if state.is_terminal() {
                    dispatch_terminal(state, report.detail, &handle.id, &mut observer);
                    break;
                }
            }
            Err(e) => {
                consecutive_failures += 1;
                warn!(
                    "Status lookup for {} failed ({} consecutive): {}",
                    handle.id, consecutive_failures, e
                );
                if consecutive_failures >= notify_after {
                    observer.on_error(e.to_string());
                }
            }
        }

        let wake = std::cmp::min(Instant::now() + config.interval(), deadline);
        tokio::select! {
            biased;
            _ = handle.token.cancelled() => break,
            _ = tokio::time::sleep_until(wake) => {}
        }
    }

    finish_session(&poller, &handle);
}

fn dispatch_terminal<O: PollObserver>(
    state: OperationState,
    detail: Option<String>,
    id: &OperationId,
    observer: &mut O,
) {
    match state {
        OperationState::Succeeded => observer.on_success(id),
        OperationState::Failed => {
            observer.on_failed(detail.unwrap_or_else(|| "payment failed".to_string()))
        }
        OperationState::Expired => observer.on_expired(),
        // Non-terminal states never reach here
        _ => {}
    }
}

/// Mark the session dead and drop its registry entry, unless a newer
/// session for the same id already replaced it
fn finish_session(poller: &PollerInner, handle: &PollHandle) {
    handle.token.cancel();
    let mut sessions = poller.sessions.lock();
    if sessions
        .get(&handle.id)
        .is_some_and(|current| current.epoch == handle.epoch)
    {
        sessions.remove(&handle.id);
    }
}
