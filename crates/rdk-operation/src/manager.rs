//! [`OperationManager`] – newest-wins operation tracker for one resource.
//!
//! Each call to [`OperationManager::new_operation`] opens a new *generation*.
//! Generations are totally ordered per manager; opening generation `N + 1`
//! cancels the token of generation `N` before `new_operation` returns, even
//! if generation `N` has not yet looked at its token.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rdk_types::{RdkError, ResourceName};
use tokio_util::sync::CancellationToken;
use tracing::debug;

// ────────────────────────────────────────────────────────────────────────────
// Internal state
// ────────────────────────────────────────────────────────────────────────────

struct CurrentOp {
    generation: u64,
    token: CancellationToken,
}

#[derive(Default)]
struct OpState {
    last_generation: u64,
    current: Option<CurrentOp>,
}

// ────────────────────────────────────────────────────────────────────────────
// OperationManager
// ────────────────────────────────────────────────────────────────────────────

/// Tracks the single in-flight operation of one resource.
///
/// Cloning the manager is cheap; clones share the same generation counter.
///
/// # Example
///
/// ```
/// use rdk_operation::{CancellationToken, OperationManager};
/// use rdk_types::{Api, ResourceName};
///
/// let mgr = OperationManager::new(ResourceName::new(Api::component("motor"), "m1"));
/// let ctx = CancellationToken::new();
///
/// let first = mgr.new_operation(&ctx);
/// let second = mgr.new_operation(&ctx);
/// assert!(first.token().is_cancelled());
/// assert!(mgr.op_running());
///
/// second.done();
/// assert!(!mgr.op_running());
/// ```
#[derive(Clone)]
pub struct OperationManager {
    owner: ResourceName,
    state: Arc<Mutex<OpState>>,
}

impl OperationManager {
    pub fn new(owner: ResourceName) -> Self {
        Self {
            owner,
            state: Arc::new(Mutex::new(OpState::default())),
        }
    }

    pub fn owner(&self) -> &ResourceName {
        &self.owner
    }

    /// Open a new generation derived from `ctx`.
    ///
    /// The returned [`Operation`] carries a token that is cancelled when
    /// `ctx` is cancelled, when a newer generation is opened, or when the
    /// operation itself is finished.
    pub fn new_operation(&self, ctx: &CancellationToken) -> Operation {
        let token = ctx.child_token();
        let mut state = self.state.lock();
        state.last_generation += 1;
        let generation = state.last_generation;

        let previous = state.current.replace(CurrentOp {
            generation,
            token: token.clone(),
        });
        if let Some(previous) = previous {
            debug!(
                resource = %self.owner,
                superseded = previous.generation,
                generation,
                "superseding running operation"
            );
            previous.token.cancel();
        }

        Operation {
            owner: self.owner.clone(),
            generation,
            token,
            state: Arc::clone(&self.state),
        }
    }

    /// `true` iff the most recent generation has neither finished nor been
    /// cancelled.
    pub fn op_running(&self) -> bool {
        self.state
            .lock()
            .current
            .as_ref()
            .is_some_and(|op| !op.token.is_cancelled())
    }

    /// Cancel the in-flight operation, if any, without starting a new one.
    pub fn cancel_running(&self) {
        if let Some(op) = self.state.lock().current.take() {
            debug!(resource = %self.owner, generation = op.generation, "cancelling running operation");
            op.token.cancel();
        }
    }

    /// Open a new generation and wait for `duration`.
    ///
    /// Returns `true` when the full duration elapsed undisturbed (the caller
    /// should finalize its action) and `false` when the operation was
    /// cancelled or superseded first (the caller should abandon it).
    pub async fn new_timed_wait_op(&self, ctx: &CancellationToken, duration: Duration) -> bool {
        let op = self.new_operation(ctx);
        let completed = tokio::select! {
            biased;
            _ = op.token().cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        };
        op.done();
        completed
    }

    /// Open a new generation and poll `check` every `interval` until it
    /// reports success.
    ///
    /// # Errors
    ///
    /// Returns [`RdkError::Canceled`] when the operation is cancelled or
    /// superseded before `check` succeeds, and propagates any error from
    /// `check` unchanged.
    pub async fn wait_for_success<F, Fut>(
        &self,
        ctx: &CancellationToken,
        interval: Duration,
        mut check: F,
    ) -> Result<(), RdkError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<bool, RdkError>>,
    {
        let op = self.new_operation(ctx);
        loop {
            if op.is_cancelled() {
                return Err(RdkError::Canceled);
            }
            if check().await? {
                return Ok(());
            }
            tokio::select! {
                biased;
                _ = op.token().cancelled() => return Err(RdkError::Canceled),
                _ = tokio::time::sleep(interval) => {}
            }
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Operation
// ────────────────────────────────────────────────────────────────────────────

/// One generation of work on a resource.
///
/// Dropping the operation (or calling [`Operation::done`]) marks the
/// generation finished.  Finishing an old generation never disturbs a newer
/// one that superseded it.
pub struct Operation {
    owner: ResourceName,
    generation: u64,
    token: CancellationToken,
    state: Arc<Mutex<OpState>>,
}

impl Operation {
    pub fn owner(&self) -> &ResourceName {
        &self.owner
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Token scoped to this generation.  Long-running code selects on it.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Mark this generation finished.
    pub fn done(self) {}
}

impl Drop for Operation {
    fn drop(&mut self) {
        self.token.cancel();
        let mut state = self.state.lock();
        if state
            .current
            .as_ref()
            .is_some_and(|op| op.generation == self.generation)
        {
            state.current = None;
        }
    }
}
