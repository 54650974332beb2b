use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Cancelable delay timer for coalescing rapid repeated triggers. Each
/// `schedule` discards the pending timer and re-arms it, so only the value
/// that survives a quiet period ever runs. Cancellation stops timers that
/// have not fired yet; an action already past its quiet period runs to
/// completion.
pub(crate) struct Debounce {
    gate: Option<CancellationToken>,
}

impl Debounce {
    pub(crate) fn new() -> Self {
        Self { gate: None }
    }

    pub(crate) fn schedule<F>(&mut self, delay: Duration, action: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        let gate = CancellationToken::new();
        self.gate = Some(gate.clone());
        tokio::spawn(async move {
            tokio::select! {
                () = gate.cancelled() => {}
                () = tokio::time::sleep(delay) => action.await,
            }
        });
    }

    pub(crate) fn cancel(&mut self) {
        if let Some(gate) = self.gate.take() {
            gate.cancel();
        }
    }
}

impl Drop for Debounce {
    fn drop(&mut self) {
        self.cancel();
    }
}
