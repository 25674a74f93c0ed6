use crate::client::{CloseError, ConnectError, Connection, Connector};
use crate::config::RunConfig;
use crate::signals::{self, SignalMonitor, DOUBLE_INTERRUPT_WINDOW};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Fatal errors surfaced by a run. Mapped to exit code 1 at the boundary.
#[derive(Debug)]
pub enum RunError {
    Connect(ConnectError),
    Close(CloseError),
}

impl std::fmt::Display for RunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunError::Connect(e) => write!(f, "{e}"),
            RunError::Close(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for RunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RunError::Connect(e) => Some(e),
            RunError::Close(e) => Some(e),
        }
    }
}

/// Drive one full run: spawn the signal monitor, open the session, idle
/// until the duration elapses or shutdown is requested, tear down.
///
/// The cancellation token is cancelled on every exit path (drop guard), so
/// the monitor and any collaborator-internal tasks wind down with the run.
pub async fn run<C: Connector>(connector: &C, config: &RunConfig) -> Result<(), RunError> {
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let requests = signals::os_requests();
    let (intent_tx, intent_rx) = mpsc::channel(1);
    tokio::spawn(SignalMonitor::new(DOUBLE_INTERRUPT_WINDOW).run(
        requests,
        cancel.clone(),
        intent_tx,
    ));

    drive(connector, config, cancel, intent_rx).await
}

/// The controller loop, with the cancellation token and handoff channel
/// injected so tests can drive it without OS signals.
async fn drive<C: Connector>(
    connector: &C,
    config: &RunConfig,
    cancel: CancellationToken,
    mut intents: mpsc::Receiver<bool>,
) -> Result<(), RunError> {
    let conn = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Ok(()),
        result = connector.open(&cancel, config) => match result {
            Ok(conn) => conn,
            // Cancellation racing the open is a graceful exit, not a failure.
            Err(_) if cancel.is_cancelled() => return Ok(()),
            Err(e) => return Err(RunError::Connect(e)),
        },
    };
    let mut conn = Some(conn);

    let idle = tokio::time::sleep(config.duration);
    tokio::pin!(idle);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("run cancelled");
                return Ok(());
            }
            _ = &mut idle => {
                info!(duration = ?config.duration, "idle duration elapsed");
                return Ok(());
            }
            intent = intents.recv() => match intent {
                Some(true) => {
                    if let Some(conn) = conn.take() {
                        info!("closing session on interrupt");
                        conn.close().await.map_err(RunError::Close)?;
                    } else {
                        debug!("session already closed, ignoring interrupt");
                    }
                }
                // Channel closed (monitor exited) or hard marker: stop.
                Some(false) | None => return Ok(()),
            },
        }
    }
}
