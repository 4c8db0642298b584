//! Unix domain socket server for IPC
//!
//! Provides request-response communication and push notifications for
//! state events to subscribed clients.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, oneshot, RwLock};
use tracing::{debug, error, info, warn};

use crate::events::StateEvent;
use crate::state::ControlRequest;

use super::protocol::{DaemonStatus, Notification, Request, Response, MAX_MESSAGE_LEN};

/// IPC Server handling client connections
pub struct Server {
    socket_path: PathBuf,
    listener: Option<UnixListener>,
    state: Arc<RwLock<ServerState>>,
    shutdown_tx: broadcast::Sender<()>,
    /// Channel for manual toggle requests to the controller
    control_tx: mpsc::Sender<ControlRequest>,
    /// Source of state events for subscribed clients
    event_tx: Option<broadcast::Sender<StateEvent>>,
}

/// Shared server state
struct ServerState {
    status: DaemonStatus,
    start_time: std::time::Instant,
}

/// Everything a client handler needs
#[derive(Clone)]
struct ClientContext {
    state: Arc<RwLock<ServerState>>,
    control_tx: mpsc::Sender<ControlRequest>,
    event_tx: Option<broadcast::Sender<StateEvent>>,
}

impl Server {
    /// Create a new IPC server
    pub fn new(socket_path: &Path, control_tx: mpsc::Sender<ControlRequest>) -> Result<Self> {
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).context("failed to create socket directory")?;
        }

        // Remove stale socket if it exists
        if socket_path.exists() {
            std::fs::remove_file(socket_path).context("failed to remove stale socket")?;
        }

        let listener = UnixListener::bind(socket_path).context("failed to bind Unix socket")?;

        // Owner-only (0600)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))
                .context("failed to restrict socket permissions")?;
        }

        let (shutdown_tx, _) = broadcast::channel(1);

        let state = Arc::new(RwLock::new(ServerState {
            status: DaemonStatus::default(),
            start_time: std::time::Instant::now(),
        }));

        info!(?socket_path, "IPC server listening");

        Ok(Self {
            socket_path: socket_path.to_owned(),
            listener: Some(listener),
            state,
            shutdown_tx,
            control_tx,
            event_tx: None,
        })
    }

    /// Create a new IPC server that can push state events to subscribers
    pub fn with_events(
        socket_path: &Path,
        control_tx: mpsc::Sender<ControlRequest>,
        event_tx: broadcast::Sender<StateEvent>,
    ) -> Result<Self> {
        let mut server = Self::new(socket_path, control_tx)?;
        server.event_tx = Some(event_tx);
        Ok(server)
    }

    /// Fold a state event into the reported status
    pub async fn record_event(&self, event: &StateEvent) {
        let mut server_state = self.state.write().await;
        let old_state = server_state.status.state;
        server_state.status.apply(event);

        if old_state != server_state.status.state {
            info!(
                from = %old_state,
                to = %server_state.status.state,
                "IPC server: state updated"
            );
        }
    }

    pub async fn set_hotkey_registered(&self, registered: bool) {
        self.state.write().await.status.hotkey_registered = registered;
    }

    /// Run the server, accepting connections
    pub async fn run(&self) -> Result<()> {
        let listener = self.listener.as_ref().context("server not initialized")?;

        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    debug!("client connected");
                    let ctx = ClientContext {
                        state: Arc::clone(&self.state),
                        control_tx: self.control_tx.clone(),
                        event_tx: self.event_tx.clone(),
                    };
                    let mut shutdown_rx = self.shutdown_tx.subscribe();

                    tokio::spawn(async move {
                        tokio::select! {
                            result = Self::handle_client(stream, ctx) => {
                                if let Err(e) = result {
                                    warn!(?e, "client handler error");
                                }
                            }
                            _ = shutdown_rx.recv() => {
                                debug!("client handler shutting down");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(?e, "accept error");
                }
            }
        }
    }

    /// Handle a single client connection
    ///
    /// Frames are read on a separate task so that waiting for a request
    /// never races with pushing a notification.
    async fn handle_client(stream: UnixStream, ctx: ClientContext) -> Result<()> {
        let (reader, mut writer) = stream.into_split();
        let (request_tx, mut request_rx) = mpsc::channel(8);
        let reader_task = tokio::spawn(Self::read_requests(reader, request_tx));

        let mut subscription: Option<broadcast::Receiver<StateEvent>> = None;

        loop {
            tokio::select! {
                request = request_rx.recv() => {
                    let Some(request) = request else { break };
                    let response = match request {
                        Ok(request) => {
                            debug!(?request, "received request");
                            if request == Request::Subscribe {
                                subscription = ctx.event_tx.as_ref().map(|tx| tx.subscribe());
                            }
                            Self::process_request(request, &ctx).await
                        }
                        Err(message) => Response::error("bad_request", message),
                    };
                    Self::send_message(&mut writer, &response).await?;
                }
                event = next_event(&mut subscription) => match event {
                    Some(event) => {
                        Self::send_message(&mut writer, &Notification::Event { event }).await?;
                    }
                    None => subscription = None,
                },
            }
        }

        reader_task.await.context("request reader panicked")?
    }

    /// Read length-prefixed requests until EOF
    async fn read_requests(
        mut reader: OwnedReadHalf,
        request_tx: mpsc::Sender<Result<Request, String>>,
    ) -> Result<()> {
        let mut len_buf = [0u8; 4];

        loop {
            match reader.read_exact(&mut len_buf).await {
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    debug!("client disconnected");
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            }

            let len = u32::from_le_bytes(len_buf) as usize;
            if len > MAX_MESSAGE_LEN {
                warn!(len, "message too large, disconnecting");
                return Ok(());
            }

            let mut msg_buf = vec![0u8; len];
            reader.read_exact(&mut msg_buf).await?;

            let request = serde_json::from_slice::<Request>(&msg_buf)
                .map_err(|e| format!("failed to parse request: {e}"));
            if request_tx.send(request).await.is_err() {
                return Ok(());
            }
        }
    }

    /// Send a length-prefixed JSON message
    async fn send_message<T: serde::Serialize>(writer: &mut OwnedWriteHalf, msg: &T) -> Result<()> {
        let msg_bytes = serde_json::to_vec(msg)?;
        let msg_len = (msg_bytes.len() as u32).to_le_bytes();

        writer.write_all(&msg_len).await?;
        writer.write_all(&msg_bytes).await?;

        Ok(())
    }

    /// Process a request and return a response
    async fn process_request(request: Request, ctx: &ClientContext) -> Response {
        match request {
            Request::Ping => Response::Pong,

            Request::GetStatus => {
                let mut state = ctx.state.write().await;
                state.status.uptime_secs = state.start_time.elapsed().as_secs();
                Response::Status(state.status.clone())
            }

            Request::Toggle => {
                let (reply_tx, reply_rx) = oneshot::channel();
                if ctx
                    .control_tx
                    .send(ControlRequest::Toggle { reply: reply_tx })
                    .await
                    .is_err()
                {
                    return Response::error("unavailable", "controller is not running");
                }
                match reply_rx.await {
                    Ok(outcome) => outcome.into(),
                    Err(_) => Response::error("unavailable", "toggle was dropped"),
                }
            }

            Request::Subscribe => match ctx.event_tx {
                Some(_) => Response::Subscribed,
                None => Response::error("unsupported", "event notifications are not enabled"),
            },
        }
    }

    /// Gracefully shutdown the server
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());

        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(?e, "failed to remove socket file");
            }
        }

        info!("IPC server shutdown complete");
    }
}

/// Next event for a subscribed client; pends forever when not subscribed
async fn next_event(subscription: &mut Option<broadcast::Receiver<StateEvent>>) -> Option<StateEvent> {
    let Some(rx) = subscription.as_mut() else {
        return std::future::pending().await;
    };

    loop {
        match rx.recv().await {
            Ok(event) => return Some(event),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(skipped = n, "subscriber lagged");
            }
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}
