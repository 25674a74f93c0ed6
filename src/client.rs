use crate::config::RunConfig;
use async_trait::async_trait;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;

/// Opens an authenticated, persistent session against the server.
///
/// The lifecycle controller invokes `open` at most once per run and owns the
/// returned connection for the rest of the run.
#[async_trait]
pub trait Connector: Send + Sync {
    type Conn: Connection;

    /// Authenticate and establish the session. Must honor cooperative
    /// cancellation: an in-flight open aborts promptly when `cancel` fires,
    /// returning [`ConnectError::Cancelled`].
    async fn open(
        &self,
        cancel: &CancellationToken,
        config: &RunConfig,
    ) -> Result<Self::Conn, ConnectError>;
}

/// A single established session.
///
/// `close` consumes the connection, so a double close is unrepresentable.
/// A clean close is not an error; teardown forced by run cancellation happens
/// inside the implementation and needs no call here.
#[async_trait]
pub trait Connection: Send {
    /// Gracefully tear the session down.
    async fn close(self) -> Result<(), CloseError>;
}

/// Failure to open or authenticate the session. Fatal: aborts the run.
#[derive(Debug)]
pub enum ConnectError {
    /// The server base URL could not be parsed or has an unusable scheme.
    InvalidUrl { url: String, reason: String },
    /// The authentication request itself failed (transport or decode).
    Http { source: reqwest::Error },
    /// The server rejected the authentication request.
    Auth { status: u16, message: String },
    /// Opening the realtime socket failed.
    Socket { source: tungstenite::Error },
    /// The run was cancelled while the open was in flight.
    Cancelled,
}

impl std::fmt::Display for ConnectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectError::InvalidUrl { url, reason } => {
                write!(f, "invalid server url {url}: {reason}")
            }
            ConnectError::Http { source } => {
                write!(f, "authentication request failed: {source}")
            }
            ConnectError::Auth { status, message } => {
                write!(f, "authentication rejected (status {status}): {message}")
            }
            ConnectError::Socket { source } => {
                write!(f, "failed to open realtime socket: {source}")
            }
            ConnectError::Cancelled => write!(f, "connection attempt cancelled"),
        }
    }
}

impl std::error::Error for ConnectError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConnectError::Http { source } => Some(source),
            ConnectError::Socket { source } => Some(source),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ConnectError {
    fn from(e: reqwest::Error) -> Self {
        ConnectError::Http { source: e }
    }
}

impl From<tungstenite::Error> for ConnectError {
    fn from(e: tungstenite::Error) -> Self {
        ConnectError::Socket { source: e }
    }
}

/// Failure during connection teardown. Fatal when the close was requested
/// explicitly; teardown of an already-gone socket is benign.
#[derive(Debug)]
pub enum CloseError {
    Socket { source: tungstenite::Error },
}

impl std::fmt::Display for CloseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloseError::Socket { source } => {
                write!(f, "failed to close realtime socket: {source}")
            }
        }
    }
}

impl std::error::Error for CloseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CloseError::Socket { source } => Some(source),
        }
    }
}

impl From<tungstenite::Error> for CloseError {
    fn from(e: tungstenite::Error) -> Self {
        CloseError::Socket { source: e }
    }
}
