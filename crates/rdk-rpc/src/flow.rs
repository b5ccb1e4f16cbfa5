//! Per-call flow control.
//!
//! Each direction of a call may have at most [`CALL_WINDOW`] messages that
//! the receiving side has not yet consumed.  The sender spends one credit per
//! message and the receiver hands credits back with [`Frame::Credit`] as its
//! consumer reads, so a call whose consumer stalls only stalls itself.
//!
//! [`Frame::Credit`]: crate::wire::Frame::Credit

use std::sync::Arc;

use rdk_types::RdkError;
use tokio::sync::Semaphore;

/// Messages one side of a call may send before the peer grants more.
pub const CALL_WINDOW: usize = 32;

/// Frames queued between a connection task and its call tasks.
pub(crate) const CONNECTION_QUEUE: usize = 64;

/// Send credit for one direction of one call.
#[derive(Clone)]
pub(crate) struct Credit(Arc<Semaphore>);

impl Credit {
    pub(crate) fn new() -> Self {
        Self(Arc::new(Semaphore::new(CALL_WINDOW)))
    }

    /// Spend one credit, waiting for the peer to grant one if none is left.
    ///
    /// # Errors
    ///
    /// [`RdkError::Transport`] once the call has been closed.
    pub(crate) async fn spend(&self) -> Result<(), RdkError> {
        let permit = self
            .0
            .acquire()
            .await
            .map_err(|_| RdkError::Transport("call closed".to_string()))?;
        permit.forget();
        Ok(())
    }

    /// Credits handed back by the peer.  Never raises the balance above the
    /// window, whatever the peer claims.
    pub(crate) fn grant(&self, n: u32) {
        let room = CALL_WINDOW.saturating_sub(self.0.available_permits());
        self.0.add_permits((n as usize).min(room));
    }

    /// Wake every waiter with an error; the call is over.
    pub(crate) fn close(&self) {
        self.0.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn spending_past_the_window_waits_for_a_grant() {
        let credit = Credit::new();
        for _ in 0..CALL_WINDOW {
            credit.spend().await.unwrap();
        }
        let blocked = tokio::time::timeout(Duration::from_millis(20), credit.spend()).await;
        assert!(blocked.is_err());

        credit.grant(1);
        credit.spend().await.unwrap();
    }

    #[tokio::test]
    async fn grants_are_capped_at_the_window() {
        let credit = Credit::new();
        credit.grant(u32::MAX);
        for _ in 0..CALL_WINDOW {
            credit.spend().await.unwrap();
        }
        let blocked = tokio::time::timeout(Duration::from_millis(20), credit.spend()).await;
        assert!(blocked.is_err());
    }

    #[tokio::test]
    async fn closing_fails_waiters() {
        let credit = Credit::new();
        for _ in 0..CALL_WINDOW {
            credit.spend().await.unwrap();
        }
        let waiter = {
            let credit = credit.clone();
            tokio::spawn(async move { credit.spend().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        credit.close();
        assert!(matches!(waiter.await.unwrap(), Err(RdkError::Transport(_))));
    }
}
