use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use std::time::Duration;

/// Two interrupts closer together than this escalate to a hard stop.
pub const DOUBLE_INTERRUPT_WINDOW: Duration = Duration::from_secs(1);

/// A shutdown request, decoupled from its OS signal source so tests can
/// inject synthetic requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownRequest {
    /// Attempt graceful teardown, keep the process running (SIGINT).
    SoftInterrupt,
    /// Cancel the run immediately (SIGTERM).
    Terminate,
}

/// Signal monitor for graceful shutdown.
///
/// Consumes [`ShutdownRequest`]s and translates them into shutdown intents:
/// a soft interrupt emits `true` on the handoff channel (close the session,
/// keep running); a second interrupt within [`DOUBLE_INTERRUPT_WINDOW`] or a
/// terminate request cancels the run instead. The monitor stops on the first
/// hard transition, on external cancellation, or when the request stream
/// ends; the handoff channel closes exactly once, when the monitor returns.
pub struct SignalMonitor {
    window: Duration,
    last_interrupt: Option<Instant>,
}

impl SignalMonitor {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_interrupt: None,
        }
    }

    /// Drive the monitor until a terminal transition.
    ///
    /// Sending an intent blocks while the controller is busy: a soft
    /// interrupt becomes visible only once the controller re-enters its
    /// wait.
    pub async fn run(
        mut self,
        mut requests: mpsc::Receiver<ShutdownRequest>,
        cancel: CancellationToken,
        intents: mpsc::Sender<bool>,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                request = requests.recv() => match request {
                    None => return,
                    Some(ShutdownRequest::Terminate) => {
                        cancel.cancel();
                        return;
                    }
                    Some(ShutdownRequest::SoftInterrupt) => {
                        let now = Instant::now();
                        if let Some(last) = self.last_interrupt {
                            if now.duration_since(last) < self.window {
                                info!("caught interrupt twice, exiting");
                                cancel.cancel();
                                return;
                            }
                        }
                        if intents.send(true).await.is_err() {
                            return;
                        }
                        self.last_interrupt = Some(now);
                    }
                },
            }
        }
    }
}

/// Wire SIGINT/SIGTERM into a [`ShutdownRequest`] stream.
///
/// If the handlers cannot be registered the returned channel stays silent:
/// that is an environment precondition, not a runtime error.
pub fn os_requests() -> mpsc::Receiver<ShutdownRequest> {
    let (tx, rx) = mpsc::channel(4);
    match (
        signal(SignalKind::interrupt()),
        signal(SignalKind::terminate()),
    ) {
        (Ok(mut interrupt), Ok(mut terminate)) => {
            tokio::spawn(async move {
                loop {
                    let request = tokio::select! {
                        sig = interrupt.recv() => match sig {
                            Some(()) => {
                                info!(signal = "SIGINT", "caught signal");
                                ShutdownRequest::SoftInterrupt
                            }
                            None => return,
                        },
                        sig = terminate.recv() => match sig {
                            Some(()) => {
                                info!(signal = "SIGTERM", "caught signal");
                                ShutdownRequest::Terminate
                            }
                            None => return,
                        },
                    };
                    if tx.send(request).await.is_err() {
                        return;
                    }
                }
            });
        }
        (interrupt, terminate) => {
            if let Some(e) = interrupt.err().or_else(|| terminate.err()) {
                warn!(error = %e, "failed to register signal handlers, shutdown signals will be ignored");
            }
        }
    }
    rx
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spawn_monitor() -> (
        mpsc::Sender<ShutdownRequest>,
        CancellationToken,
        mpsc::Receiver<bool>,
    ) {
        let (req_tx, req_rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let (intent_tx, intent_rx) = mpsc::channel(1);
        tokio::spawn(SignalMonitor::new(DOUBLE_INTERRUPT_WINDOW).run(
            req_rx,
            cancel.clone(),
            intent_tx,
        ));
        (req_tx, cancel, intent_rx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminate_cancels_and_stops() {
        let (req_tx, cancel, mut intent_rx) = spawn_monitor();

        req_tx.send(ShutdownRequest::Terminate).await.unwrap();

        // Channel closes on monitor exit, and the run context is cancelled.
        assert_eq!(intent_rx.recv().await, None);
        assert!(cancel.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_interrupt_emits_soft_intent() {
        let (req_tx, cancel, mut intent_rx) = spawn_monitor();

        req_tx.send(ShutdownRequest::SoftInterrupt).await.unwrap();

        assert_eq!(intent_rx.recv().await, Some(true));
        assert!(!cancel.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_double_interrupt_within_window_escalates() {
        let (req_tx, cancel, mut intent_rx) = spawn_monitor();

        req_tx.send(ShutdownRequest::SoftInterrupt).await.unwrap();
        assert_eq!(intent_rx.recv().await, Some(true));

        tokio::time::advance(Duration::from_millis(500)).await;
        req_tx.send(ShutdownRequest::SoftInterrupt).await.unwrap();

        // No second soft intent: the monitor escalates and exits.
        assert_eq!(intent_rx.recv().await, None);
        assert!(cancel.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_spaced_interrupts_stay_soft() {
        let (req_tx, cancel, mut intent_rx) = spawn_monitor();

        req_tx.send(ShutdownRequest::SoftInterrupt).await.unwrap();
        assert_eq!(intent_rx.recv().await, Some(true));

        tokio::time::advance(Duration::from_millis(1100)).await;
        req_tx.send(ShutdownRequest::SoftInterrupt).await.unwrap();

        assert_eq!(intent_rx.recv().await, Some(true));
        assert!(!cancel.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_external_cancel_stops_monitor() {
        let (_req_tx, cancel, mut intent_rx) = spawn_monitor();

        cancel.cancel();

        assert_eq!(intent_rx.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_is_idempotent() {
        let (req_tx, cancel, mut intent_rx) = spawn_monitor();

        req_tx.send(ShutdownRequest::Terminate).await.unwrap();
        assert_eq!(intent_rx.recv().await, None);

        // A second cancel must be a no-op.
        cancel.cancel();
        assert!(cancel.is_cancelled());
    }
}
