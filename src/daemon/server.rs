use super::protocol::{DndCommand, NotificationRequest, Reply, Request, MAX_REQUEST_LEN};
use super::supervisor::{stop_pair, StopHandle, StopSignal, Supervisor};
use crate::clienv;
use crate::error::{Error, Result};
use crate::notifications::NotificationService;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};

use tracing::{debug, error, info, trace, warn};

/// Pause between tearing down the supervisor and leaving the accept loop
const STOP_GRACE: Duration = Duration::from_millis(200);

pub struct DaemonConfig {
    pub socket_path: PathBuf,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            socket_path: clienv::socket_path(),
        }
    }
}

/// What `START` (and the daemon's own first run) does.
#[async_trait]
pub trait Startup: Send + Sync {
    async fn start(&self, supervisor: &Arc<Supervisor>) -> anyhow::Result<()>;
}

pub struct DaemonServer {
    config: DaemonConfig,
    supervisor: Arc<Supervisor>,
    notifications: Option<Arc<NotificationService>>,
    startup: Arc<dyn Startup>,
    started: AtomicBool,
    shutdown: StopHandle,
    shutdown_signal: StopSignal,
}

impl DaemonServer {
    pub fn new(config: DaemonConfig, supervisor: Arc<Supervisor>, startup: Arc<dyn Startup>) -> Self {
        let (shutdown, shutdown_signal) = stop_pair();
        Self {
            config,
            supervisor,
            notifications: None,
            startup,
            started: AtomicBool::new(false),
            shutdown,
            shutdown_signal,
        }
    }

    /// Routes `NOTIFICATION …` commands to `service`.
    pub fn with_notifications(mut self, service: Arc<NotificationService>) -> Self {
        self.notifications = Some(service);
        self
    }

    pub async fn run(self) -> Result<()> {
        let socket_path = self.config.socket_path.clone();
        let listener = bind(&socket_path)?;
        info!("Control socket listening on: {}", socket_path.display());

        let server = Arc::new(self);

        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm = signal(SignalKind::terminate())?;
            let mut sigint = signal(SignalKind::interrupt())?;
            let handle = Arc::clone(&server);

            tokio::spawn(async move {
                tokio::select! {
                    _ = sigterm.recv() => info!("Received SIGTERM"),
                    _ = sigint.recv() => info!("Received SIGINT"),
                }
                handle.begin_shutdown();
            });
        }

        // First run counts as the initial START.
        server.started.store(true, Ordering::SeqCst);
        tokio::spawn(Arc::clone(&server).run_startup());

        info!("wigo daemon ready");

        let shutdown = server.shutdown_signal.clone();
        loop {
            tokio::select! {
                conn = listener.accept() => {
                    match conn {
                        Ok((stream, _)) => {
                            let server = Arc::clone(&server);
                            tokio::spawn(async move {
                                if let Err(e) = server.handle_connection(stream).await {
                                    warn!("Connection handler error: {}", e);
                                }
                            });
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown.stopped() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        server.supervisor.stop_all().await;

        if socket_path.exists() {
            std::fs::remove_file(&socket_path)?;
        }

        info!("wigo daemon stopped");
        Ok(())
    }

    async fn handle_connection(self: Arc<Self>, mut stream: UnixStream) -> Result<()> {
        trace!("New connection accepted");

        let mut buf = [0u8; MAX_REQUEST_LEN];
        let n = stream.read(&mut buf).await?;
        let line = String::from_utf8_lossy(&buf[..n]);
        let line = line.trim();

        let request = line.parse::<Request>();
        let reply = match &request {
            Ok(request) => self.handle_request(request).await,
            Err(e) => {
                debug!("Rejecting control command: {}", e);
                Reply::err("unknown command")
            }
        };

        stream.write_all(reply.to_string().as_bytes()).await?;
        stream.shutdown().await?;
        drop(stream);

        if matches!(request, Ok(Request::Stop)) {
            self.begin_shutdown();
        }
        trace!("Reply sent");
        Ok(())
    }

    async fn handle_request(self: &Arc<Self>, request: &Request) -> Reply {
        match request {
            Request::Status => {
                let status = self.supervisor.status().await;
                debug!(
                    processes = status.processes,
                    watchers = status.watchers,
                    "Handling: STATUS"
                );
                Reply::ok("running")
            }

            Request::Start => {
                if self.started.swap(true, Ordering::SeqCst) {
                    debug!("Handling: START (already started)");
                    return Reply::ok("Already started");
                }
                info!("Received START, initializing watchers and widgets");
                tokio::spawn(Arc::clone(self).run_startup());
                Reply::ok("Starting")
            }

            Request::Stop => {
                info!("Received STOP, shutting down");
                Reply::ok("Shutting down.")
            }

            Request::Notification(request) => match &self.notifications {
                Some(service) => {
                    handle_notification(service, request)
                        .await
                        .unwrap_or_else(|e| {
                            warn!("Notification command failed: {}", e);
                            Reply::err(e.slug())
                        })
                }
                None => Reply::err("notifications disabled"),
            },
        }
    }

    async fn run_startup(self: Arc<Self>) {
        if let Err(e) = self.startup.start(&self.supervisor).await {
            error!("Startup sequence failed: {:#}", e);
        }
    }

    /// Tears down supervised work, then ends the accept loop after a short
    /// grace period. Safe to call more than once.
    fn begin_shutdown(self: &Arc<Self>) {
        let server = Arc::clone(self);
        tokio::spawn(async move {
            server.supervisor.stop_all().await;
            tokio::time::sleep(STOP_GRACE).await;
            server.shutdown.close();
        });
    }
}

async fn handle_notification(
    service: &Arc<NotificationService>,
    request: &NotificationRequest,
) -> Result<Reply> {
    let reply = match request {
        NotificationRequest::Close(id) => {
            service.close_by_id(*id).await;
            Reply::ok(format!("Closed {id}"))
        }
        NotificationRequest::Dismiss(id) => {
            if service.close_view_only(*id).await {
                Reply::ok(format!("Dismissed {id}"))
            } else {
                Reply::ok(format!("Not active {id}"))
            }
        }
        NotificationRequest::Action { id, key } => {
            service.invoke_action(*id, key).await?;
            Reply::ok(format!("Invoked {key} on {id}"))
        }
        NotificationRequest::Dnd(command) => {
            let on = match command {
                DndCommand::On => {
                    service.set_dnd(true)?;
                    true
                }
                DndCommand::Off => {
                    service.set_dnd(false)?;
                    false
                }
                DndCommand::Toggle => service.toggle_dnd()?,
                DndCommand::State => service.dnd(),
            };
            Reply::ok(if on { "on" } else { "off" })
        }
        NotificationRequest::Clear => {
            service.clear_history().await?;
            Reply::ok("History cleared")
        }
        NotificationRequest::Count => Reply::ok(service.history_count().to_string()),
        NotificationRequest::History => {
            Reply::ok(serde_json::to_string(&service.history().load())?)
        }
    };
    Ok(reply)
}

/// Binds the control socket, replacing a stale socket file.
fn bind(socket_path: &std::path::Path) -> Result<UnixListener> {
    let bind_error = |source| Error::SocketBind {
        path: socket_path.to_path_buf(),
        source,
    };

    if socket_path.exists() {
        std::fs::remove_file(socket_path).map_err(bind_error)?;
    }
    if let Some(parent) = socket_path.parent() {
        std::fs::create_dir_all(parent).map_err(bind_error)?;
    }

    let listener = UnixListener::bind(socket_path).map_err(bind_error)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(socket_path, perms).map_err(bind_error)?;
    }

    Ok(listener)
}
