use super::daemon_client;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use wigo::clienv;
use wigo::config::Config;
use wigo::daemon::{
    DaemonClient, DaemonConfig, DaemonServer, Request, ShutdownPolicy, Supervisor, WidgetStartup,
};
use wigo::eww::EwwClient;
use wigo::notifications::{bus, NotificationService, ServicePaths};

pub async fn cmd_start(exec: Vec<String>) -> Result<()> {
    let config = Config::load().context("failed to load config")?;
    let client = daemon_client(&config);

    if client.is_running().await {
        let reply = client.send(&Request::Start).await?;
        println!("Server response: {reply}");
        return Ok(());
    }

    run_daemon(config, exec).await
}

/// Runs the daemon in the foreground until `STOP` or a signal.
async fn run_daemon(config: Config, exec: Vec<String>) -> Result<()> {
    println!("Running wigo daemon (Ctrl+C to stop)");
    println!("  Socket: {}", clienv::socket_path().display());

    let supervisor = Arc::new(Supervisor::new(ShutdownPolicy::from(&config.supervisor)));
    let eww = Arc::new(EwwClient::new(config.eww.binary.clone()));
    let mut startup = WidgetStartup::new(clienv::config_path(), eww.clone());

    // The connection owns the bus name; keep it for the daemon's lifetime.
    let (notifications, _bus) = if config.notifications.enabled {
        let hook = if exec.is_empty() {
            config.notifications.exec.clone()
        } else {
            exec
        };
        let service = Arc::new(NotificationService::new(ServicePaths::default(), eww, hook));
        let connection = bus::serve(service.clone())
            .await
            .context("failed to start notification server")?;
        startup = startup.with_notifications(service.clone());
        (Some(service), Some(connection))
    } else {
        (None, None)
    };

    let mut server = DaemonServer::new(DaemonConfig::default(), supervisor, Arc::new(startup));
    if let Some(service) = notifications {
        server = server.with_notifications(service);
    }
    server.run().await?;
    Ok(())
}

pub async fn cmd_kill() -> Result<()> {
    let config = Config::load().context("failed to load config")?;
    let client = daemon_client(&config);

    if !client.is_running().await {
        println!("wigo daemon is not running");
        return Ok(());
    }

    let reply = client.send(&Request::Stop).await?;
    println!("Server response: {reply}");

    if wait_for_exit(&client).await {
        println!("wigo daemon stopped");
    } else {
        println!("wigo daemon may still be stopping (check with `wigo status`)");
    }
    Ok(())
}

pub async fn cmd_status() -> Result<()> {
    let config = Config::load().context("failed to load config")?;
    let client = daemon_client(&config);

    match client.send(&Request::Status).await {
        Ok(reply) => {
            println!("Status: {}", reply.message());
            println!("Socket: {}", client.socket_path().display());
        }
        Err(e) => {
            println!("Status: not running");
            tracing::debug!(timeout = ?client.timeout(), "{}", e);
            println!("Run `wigo start` to start the daemon");
        }
    }
    Ok(())
}

pub async fn cmd_reload(exec: Vec<String>) -> Result<()> {
    let config = Config::load().context("failed to load config")?;
    let client = daemon_client(&config);

    if client.is_running().await {
        let reply = client.send(&Request::Stop).await?;
        println!("Server response: {reply}");
        if !wait_for_exit(&client).await {
            anyhow::bail!("daemon did not stop in time");
        }
    }

    run_daemon(config, exec).await
}

/// Polls for the socket file to disappear, up to five seconds.
async fn wait_for_exit(client: &DaemonClient) -> bool {
    for _ in 0..50 {
        if !client.socket_exists() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    false
}
