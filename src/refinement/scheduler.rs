use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use image::RgbaImage;
use tokio_util::sync::CancellationToken;

use crate::foundation::error::PreviewResult;
use crate::refinement::key::RefinementKey;

/// Refinement state exposed to the rendering layer.
#[derive(Clone, Debug, PartialEq)]
pub enum RefinementStatus {
    /// Nothing requested yet.
    Idle,
    /// Waiting for the selection to settle.
    Debouncing {
        /// Key that will be requested.
        key: RefinementKey,
    },
    /// Request sent to the synthesis collaborator.
    InFlight {
        /// Key being synthesized.
        key: RefinementKey,
    },
    /// The preview for `key` is adopted.
    Ready {
        /// Adopted key.
        key: RefinementKey,
    },
    /// The request for `key` failed; the previous preview stays visible.
    Failed {
        /// Failed key.
        key: RefinementKey,
        /// Transient notice text.
        message: String,
    },
}

/// Messages from a scheduled refinement task.
#[derive(Debug)]
pub enum RefinementEvent {
    /// The debounce window elapsed and the request was issued.
    Fired {
        /// Request number.
        request: u64,
        /// Requested key.
        key: RefinementKey,
    },
    /// The collaborator answered.
    Completed {
        /// Request number.
        request: u64,
        /// Requested key.
        key: RefinementKey,
        /// Synthesized image or the failure.
        result: PreviewResult<Arc<RgbaImage>>,
    },
}

#[derive(Debug)]
struct Ticket {
    request: u64,
    key: RefinementKey,
    token: CancellationToken,
}

/// Debounces refinement requests and cancels superseded ones.
///
/// At most one request is live: scheduling a new key cancels the previous ticket whether it is
/// still debouncing or already in flight. Tasks run on the current `LocalSet`.
#[derive(Debug)]
pub struct RefinementScheduler {
    debounce: Duration,
    next_request: u64,
    current: Option<Ticket>,
}

impl RefinementScheduler {
    /// Scheduler with the given quiescence window.
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            next_request: 0,
            current: None,
        }
    }

    /// (Re)start the debounce for `key`. `request` is only invoked once the window elapses.
    ///
    /// Must be called from within a `tokio::task::LocalSet`.
    pub fn schedule<F, Fut>(
        &mut self,
        key: RefinementKey,
        request: F,
        emit: impl Fn(RefinementEvent) + 'static,
    ) -> u64
    where
        F: FnOnce() -> Fut + 'static,
        Fut: Future<Output = PreviewResult<RgbaImage>> + 'static,
    {
        self.cancel();
        self.next_request += 1;
        let id = self.next_request;
        let token = CancellationToken::new();
        self.current = Some(Ticket {
            request: id,
            key,
            token: token.clone(),
        });

        let debounce = self.debounce;
        tokio::task::spawn_local(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(debounce) => {}
            }
            tracing::debug!(request = id, %key, "refinement request issued");
            emit(RefinementEvent::Fired { request: id, key });

            let result = tokio::select! {
                biased;
                _ = token.cancelled() => {
                    tracing::debug!(request = id, %key, "refinement request cancelled in flight");
                    return;
                }
                r = request() => r,
            };
            if token.is_cancelled() {
                return;
            }
            emit(RefinementEvent::Completed {
                request: id,
                key,
                result: result.map(Arc::new),
            });
        });
        id
    }

    /// Cancel the live ticket, if any. Idempotent.
    pub fn cancel(&mut self) {
        if let Some(t) = self.current.take() {
            t.token.cancel();
            tracing::debug!(request = t.request, key = %t.key, "refinement ticket cancelled");
        }
    }

    /// `true` if `request` is the live, uncancelled ticket.
    pub fn is_current(&self, request: u64) -> bool {
        self.current
            .as_ref()
            .is_some_and(|t| t.request == request && !t.token.is_cancelled())
    }

    /// Retire `request` after its completion was applied.
    pub fn finish(&mut self, request: u64) {
        if self.current.as_ref().is_some_and(|t| t.request == request) {
            self.current = None;
        }
    }

    /// Key of the live ticket.
    pub fn pending_key(&self) -> Option<RefinementKey> {
        self.current.as_ref().map(|t| t.key)
    }
}

impl Drop for RefinementScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
#[path = "../../tests/unit/refinement/scheduler.rs"]
mod tests;
