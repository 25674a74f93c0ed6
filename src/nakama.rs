//! Production connection collaborator: device authentication over HTTP,
//! realtime session over websocket. No reconnection; the demo idles.

use crate::client::{CloseError, ConnectError, Connection, Connector};
use crate::config::RunConfig;
use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens sessions against a Nakama server.
pub struct NakamaConnector {
    http: reqwest::Client,
}

impl NakamaConnector {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }

    /// Device authentication: trades the device id for a session token.
    /// Invoked at most once per run.
    async fn authenticate(&self, config: &RunConfig) -> Result<String, ConnectError> {
        info!("authenticating");
        let endpoint = format!(
            "{}/v2/account/authenticate/device",
            config.url.trim_end_matches('/')
        );
        let response = self
            .http
            .post(&endpoint)
            .basic_auth(&config.server_key, Some(""))
            .query(&[("create", "true"), ("username", config.username.as_str())])
            .json(&serde_json::json!({ "id": config.user_id }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(ConnectError::Auth { status, message });
        }

        let session: SessionToken = response.json().await?;
        Ok(session.token)
    }
}

#[derive(Debug, Deserialize)]
struct SessionToken {
    token: String,
}

#[async_trait]
impl Connector for NakamaConnector {
    type Conn = NakamaConnection;

    async fn open(
        &self,
        cancel: &CancellationToken,
        config: &RunConfig,
    ) -> Result<NakamaConnection, ConnectError> {
        let token = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ConnectError::Cancelled),
            result = self.authenticate(config) => result?,
        };

        let endpoint = realtime_url(&config.url, &token)?;
        let (socket, _response) = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ConnectError::Cancelled),
            result = connect_async(endpoint.as_str()) => result?,
        };
        info!("connected!");

        let (close_tx, close_rx) = oneshot::channel();
        let task = tokio::spawn(drive_socket(socket, cancel.clone(), close_rx));
        Ok(NakamaConnection { close_tx, task })
    }
}

/// One open realtime session. The socket itself lives in a background task;
/// this handle can only ask it to close.
pub struct NakamaConnection {
    close_tx: oneshot::Sender<()>,
    task: JoinHandle<Result<(), CloseError>>,
}

#[async_trait]
impl Connection for NakamaConnection {
    async fn close(self) -> Result<(), CloseError> {
        // Send may fail if the socket task already ended (remote hangup or
        // run cancellation); the task result settles it either way.
        let _ = self.close_tx.send(());
        match self.task.await {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "socket task ended abnormally");
                Ok(())
            }
        }
    }
}

/// Build the realtime endpoint from the server base URL: http(s) becomes
/// ws(s), path `/ws`, session token and format in the query.
fn realtime_url(base: &str, token: &str) -> Result<Url, ConnectError> {
    let invalid = |reason: String| ConnectError::InvalidUrl {
        url: base.to_string(),
        reason,
    };

    let mut url = Url::parse(base).map_err(|e| invalid(e.to_string()))?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(invalid(format!("unsupported scheme {other:?}"))),
    };
    url.set_scheme(scheme)
        .map_err(|()| invalid(format!("cannot use scheme {scheme:?}")))?;
    url.set_path("/ws");
    url.set_query(None);
    url.query_pairs_mut()
        .append_pair("token", token)
        .append_pair("format", "json")
        .append_pair("status", "true");
    Ok(url)
}

/// Own the socket for the session's lifetime: drain incoming frames (the
/// demo never acts on them), tear down on run cancellation, and perform the
/// close handshake when the handle asks for it.
async fn drive_socket(
    mut socket: WsStream,
    cancel: CancellationToken,
    mut close_rx: oneshot::Receiver<()>,
) -> Result<(), CloseError> {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                if let Err(e) = socket.close(None).await {
                    debug!(error = %e, "socket close on cancellation");
                }
                debug!("socket closed on run cancellation");
                return Ok(());
            }
            requested = &mut close_rx => {
                // Err means the handle was dropped without an explicit
                // close; tear down anyway, but don't surface the outcome.
                match close_socket(&mut socket).await {
                    Ok(()) => info!("session closed"),
                    Err(e) if requested.is_ok() => return Err(e),
                    Err(e) => debug!(error = %e, "socket close after handle dropped"),
                }
                return Ok(());
            }
            message = socket.next() => match message {
                Some(Ok(Message::Close(frame))) => {
                    info!(?frame, "disconnect");
                    return Ok(());
                }
                Some(Ok(message)) => {
                    debug!(len = message.len(), "ignoring realtime message");
                }
                Some(Err(e)) => {
                    warn!(error = %e, "disconnect");
                    return Ok(());
                }
                None => {
                    info!("disconnect");
                    return Ok(());
                }
            },
        }
    }
}

async fn close_socket(socket: &mut WsStream) -> Result<(), CloseError> {
    match socket.close(None).await {
        Ok(())
        | Err(tungstenite::Error::ConnectionClosed)
        | Err(tungstenite::Error::AlreadyClosed) => {}
        Err(e) => return Err(CloseError::Socket { source: e }),
    }
    // Drain until the peer acks the close frame.
    while let Some(message) = socket.next().await {
        match message {
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => {}
        }
    }
    Ok(())
}
