use crate::config::SupervisorConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Owner side of a stop signal.
#[derive(Debug)]
pub struct StopHandle {
    tx: watch::Sender<bool>,
}

/// Observer side of a stop signal. Cheap to clone.
#[derive(Debug, Clone)]
pub struct StopSignal {
    rx: watch::Receiver<bool>,
}

pub fn stop_pair() -> (StopHandle, StopSignal) {
    let (tx, rx) = watch::channel(false);
    (StopHandle { tx }, StopSignal { rx })
}

impl StopHandle {
    /// Closes the signal. Returns `true` only for the call that closed it.
    pub fn close(&self) -> bool {
        !self.tx.send_replace(true)
    }
}

impl StopSignal {
    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the signal is closed or its owner is gone.
    pub async fn stopped(&self) {
        let mut rx = self.rx.clone();
        let _ = rx.wait_for(|stopped| *stopped).await;
    }
}

/// Timing of the restart loop and the kill escalation.
#[derive(Debug, Clone, Copy)]
pub struct ShutdownPolicy {
    /// Pause before a returned or panicked watcher is run again
    pub restart_delay: Duration,
    /// Pause between SIGTERM and SIGKILL to a process group
    pub kill_grace: Duration,
}

impl Default for ShutdownPolicy {
    fn default() -> Self {
        Self::from(&SupervisorConfig::default())
    }
}

impl From<&SupervisorConfig> for ShutdownPolicy {
    fn from(config: &SupervisorConfig) -> Self {
        Self {
            restart_delay: config.restart_delay(),
            kill_grace: config.kill_grace(),
        }
    }
}

/// A recurring unit of work run under the supervisor.
///
/// `run` should return promptly once `ctx.stop` is closed. Returning (with
/// or without an error) or panicking while the signal is still open gets the
/// watcher restarted after [`ShutdownPolicy::restart_delay`].
#[async_trait]
pub trait Watcher: Send + Sync + 'static {
    fn name(&self) -> &str;

    async fn run(&self, ctx: WatcherContext) -> anyhow::Result<()>;
}

#[derive(Clone)]
pub struct WatcherContext {
    pub stop: StopSignal,
    pub supervisor: Arc<Supervisor>,
}

/// What a caller gets back from [`Supervisor::launch`]. The process itself
/// stays owned by the supervisor.
#[derive(Debug)]
pub struct ProcessHandle {
    pub name: String,
    pub pid: Option<u32>,
    pub stdout: Option<ChildStdout>,
    /// Closed when the supervisor starts tearing the process down
    pub cancelled: StopSignal,
}

struct TrackedProcess {
    name: String,
    child: Child,
    cancel: StopHandle,
}

#[derive(Default)]
struct Tracked {
    processes: Vec<TrackedProcess>,
    stops: Vec<StopHandle>,
    shutting_down: bool,
}

impl Tracked {
    fn prune_exited(&mut self) {
        self.processes.retain_mut(|p| match p.child.try_wait() {
            Ok(Some(status)) => {
                debug!(name = %p.name, ?status, "Pruning exited process");
                false
            }
            _ => true,
        });
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorStatus {
    pub processes: usize,
    pub watchers: usize,
    pub shutting_down: bool,
}

/// Owns every tracked process and watcher loop of the daemon.
pub struct Supervisor {
    policy: ShutdownPolicy,
    tracked: Mutex<Tracked>,
}

impl Supervisor {
    pub fn new(policy: ShutdownPolicy) -> Self {
        Self {
            policy,
            tracked: Mutex::new(Tracked::default()),
        }
    }

    pub fn policy(&self) -> ShutdownPolicy {
        self.policy
    }

    /// Spawns `command` in its own process group and tracks it.
    pub async fn launch(&self, name: &str, mut command: Command) -> Result<ProcessHandle> {
        let (cancel, cancelled) = stop_pair();
        let mut tracked = self.tracked.lock().await;

        if tracked.shutting_down {
            cancel.close();
            return Err(Error::ShuttingDown);
        }

        #[cfg(unix)]
        command.process_group(0);
        command.kill_on_drop(true);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(source) => {
                cancel.close();
                error!("Failed to start '{}': {}", name, source);
                return Err(Error::SpawnFailed {
                    command: name.to_string(),
                    source,
                });
            }
        };

        let pid = child.id();
        let stdout = child.stdout.take();
        info!("Started '{}' with PID {:?}", name, pid);

        tracked.prune_exited();
        tracked.processes.push(TrackedProcess {
            name: name.to_string(),
            child,
            cancel,
        });

        Ok(ProcessHandle {
            name: name.to_string(),
            pid,
            stdout,
            cancelled,
        })
    }

    /// Runs `watcher` in its own task until its stop signal closes.
    pub async fn register_watcher(self: &Arc<Self>, watcher: Arc<dyn Watcher>) -> JoinHandle<()> {
        let (stop, signal) = stop_pair();
        {
            let mut tracked = self.tracked.lock().await;
            if tracked.shutting_down {
                warn!(watcher = watcher.name(), "Registered during shutdown, not starting");
                stop.close();
            } else {
                tracked.stops.push(stop);
            }
        }

        let ctx = WatcherContext {
            stop: signal,
            supervisor: Arc::clone(self),
        };
        tokio::spawn(supervise(watcher, ctx, self.policy.restart_delay))
    }

    pub async fn status(&self) -> SupervisorStatus {
        let mut tracked = self.tracked.lock().await;
        tracked.prune_exited();
        SupervisorStatus {
            processes: tracked.processes.len(),
            watchers: tracked.stops.len(),
            shutting_down: tracked.shutting_down,
        }
    }

    /// Stops all watchers, then terminates every tracked process group.
    /// Safe to call more than once.
    pub async fn stop_all(&self) {
        let (processes, stops) = {
            let mut tracked = self.tracked.lock().await;
            tracked.shutting_down = true;
            (
                std::mem::take(&mut tracked.processes),
                std::mem::take(&mut tracked.stops),
            )
        };

        let closed = stops.iter().filter(|stop| stop.close()).count();
        info!(
            watchers = closed,
            processes = processes.len(),
            "Stopping supervised work"
        );

        for process in processes {
            terminate(process, self.policy.kill_grace).await;
        }
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new(ShutdownPolicy::default())
    }
}

async fn supervise(watcher: Arc<dyn Watcher>, ctx: WatcherContext, restart_delay: Duration) {
    let name = watcher.name().to_string();

    while !ctx.stop.is_stopped() {
        let run = {
            let watcher = Arc::clone(&watcher);
            let ctx = ctx.clone();
            tokio::spawn(async move { watcher.run(ctx).await })
        };

        match run.await {
            Ok(Ok(())) => debug!(watcher = %name, "Watcher returned"),
            Ok(Err(e)) => warn!(watcher = %name, "Watcher failed: {:#}", e),
            Err(e) if e.is_panic() => {
                error!(watcher = %name, "Watcher panicked: {}", panic_message(e.into_panic()));
            }
            Err(e) => warn!(watcher = %name, "Watcher task aborted: {}", e),
        }

        tokio::select! {
            biased;
            _ = ctx.stop.stopped() => break,
            _ = tokio::time::sleep(restart_delay) => {
                info!(watcher = %name, "Restarting watcher");
            }
        }
    }

    debug!(watcher = %name, "Watcher stopped");
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

async fn terminate(mut process: TrackedProcess, grace: Duration) {
    process.cancel.close();

    #[cfg(unix)]
    {
        if let Some(pid) = process.child.id() {
            signal_group(pid, grace).await;
        }
    }
    #[cfg(not(unix))]
    let _ = grace;

    let _ = process.child.start_kill();
    match process.child.wait().await {
        Ok(status) => debug!(name = %process.name, ?status, "Process terminated"),
        Err(e) => warn!(name = %process.name, "Failed to reap process: {}", e),
    }
}

/// SIGTERM to the whole group, then SIGKILL after `grace`.
#[cfg(unix)]
async fn signal_group(pid: u32, grace: Duration) {
    let pgid = unsafe { libc::getpgid(pid as libc::pid_t) };
    // Never signal our own group.
    if pgid <= 0 || pgid == unsafe { libc::getpgrp() } {
        return;
    }

    unsafe {
        libc::kill(-pgid, libc::SIGTERM);
    }
    tokio::time::sleep(grace).await;
    unsafe {
        libc::kill(-pgid, libc::SIGKILL);
    }
}
