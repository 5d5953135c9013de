//! One controller for both conversation shapes.
//!
//! A [`Session`] owns the client and a [`TurnPolicy`]; the policy decides what
//! a turn does to the published state, the session decides when turns may run
//! and makes sure nothing is written once it has been torn down.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::chat_client::{GenerativeClient, HistoryTurn};
use crate::error::{GenerationResult, Rejected};

/// The part of a controller that differs between chat and single-turn mode.
pub trait TurnPolicy: Send + Sync + 'static {
    /// Read-only value handed to views
    type Snapshot: Clone + Send + Sync + 'static;

    /// Runs synchronously inside submit, before the client is called.
    /// Returns the history to send along with the prompt.
    fn begin(&mut self, prompt: &str) -> Result<Vec<HistoryTurn>, Rejected>;

    /// Apply the client's outcome
    fn complete(&mut self, outcome: GenerationResult);

    fn snapshot(&self) -> Self::Snapshot;
}

struct Slot<P> {
    policy: P,
    in_flight: bool,
    closed: bool,
}

pub struct Session<P: TurnPolicy> {
    client: Arc<dyn GenerativeClient>,
    state: Arc<watch::Sender<Slot<P>>>,
    cancel: CancellationToken,
    turns: AtomicU64,
}

impl<P: TurnPolicy> Session<P> {
    pub fn new(client: Arc<dyn GenerativeClient>, policy: P) -> Self {
        let (state, _) = watch::channel(Slot {
            policy,
            in_flight: false,
            closed: false,
        });
        Self {
            client,
            state: Arc::new(state),
            cancel: CancellationToken::new(),
            turns: AtomicU64::new(0),
        }
    }

    /// Start a turn. Must be called from within a tokio runtime.
    pub(crate) fn start(&self, prompt: &str) -> Result<TurnHandle, Rejected> {
        let mut begun = Err(Rejected::Closed);
        self.state.send_if_modified(|slot| {
            if slot.closed {
                return false;
            }
            if slot.in_flight {
                begun = Err(Rejected::Busy);
                return false;
            }
            begun = slot.policy.begin(prompt);
            if begun.is_ok() {
                slot.in_flight = true;
            }
            begun.is_ok()
        });
        let history = begun.map_err(|reason| {
            tracing::debug!(%reason, "turn rejected");
            reason
        })?;

        let turn = self.turns.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::info!(
            turn,
            client = self.client.client_name(),
            model = self.client.model(),
            history = history.len(),
            "turn started"
        );

        let client = Arc::clone(&self.client);
        let state = Arc::clone(&self.state);
        let cancel = self.cancel.clone();
        let prompt = prompt.to_string();

        let handle = tokio::spawn(async move {
            let outcome = tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!(turn, "turn cancelled");
                    return;
                }
                outcome = client.generate(&prompt, &history) => outcome,
            };

            match &outcome {
                Ok(Some(text)) => tracing::info!(turn, chars = text.len(), "turn finished"),
                Ok(None) => tracing::warn!(turn, "model returned no text"),
                Err(err) => tracing::warn!(turn, error = %err, "generation failed"),
            }

            let applied = state.send_if_modified(|slot| {
                if slot.closed {
                    return false;
                }
                slot.policy.complete(outcome);
                slot.in_flight = false;
                true
            });
            if !applied {
                tracing::debug!(turn, "session closed before completion, outcome dropped");
            }
        });

        Ok(TurnHandle { handle })
    }

    pub fn snapshot(&self) -> P::Snapshot {
        self.state.borrow().policy.snapshot()
    }

    pub fn subscribe(&self) -> SessionView<P> {
        SessionView {
            rx: self.state.subscribe(),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.state.borrow().in_flight
    }

    pub fn is_closed(&self) -> bool {
        self.state.borrow().closed
    }

    pub fn client_name(&self) -> &str {
        self.client.client_name()
    }

    /// Cancel any in-flight call. Nothing is published after this returns.
    pub fn close(&self) {
        self.cancel.cancel();
        let closed_now = self.state.send_if_modified(|slot| {
            let was_open = !slot.closed;
            slot.closed = true;
            was_open
        });
        if closed_now {
            tracing::debug!("session closed");
        }
    }
}

impl<P: TurnPolicy> Drop for Session<P> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Read side of a session, for a view layer.
pub struct SessionView<P: TurnPolicy> {
    rx: watch::Receiver<Slot<P>>,
}

impl<P: TurnPolicy> SessionView<P> {
    pub fn snapshot(&self) -> P::Snapshot {
        self.rx.borrow().policy.snapshot()
    }

    pub fn is_busy(&self) -> bool {
        self.rx.borrow().in_flight
    }

    pub fn is_closed(&self) -> bool {
        self.rx.borrow().closed
    }

    /// Wait for the next published change. False once the session is gone.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }
}

impl<P: TurnPolicy> Clone for SessionView<P> {
    fn clone(&self) -> Self {
        Self {
            rx: self.rx.clone(),
        }
    }
}

/// Completion handle for one turn
#[must_use = "dropping the handle does not cancel the turn; await it or let it run"]
pub struct TurnHandle {
    handle: JoinHandle<()>,
}

impl TurnHandle {
    /// Wait until the outcome has been applied (or discarded)
    pub async fn finished(self) {
        if let Err(err) = self.handle.await {
            if err.is_panic() {
                tracing::error!(error = %err, "turn task panicked");
            }
        }
    }
}
