pub mod daemon;
pub mod notification;

use wigo::config::Config;
use wigo::daemon::DaemonClient;

/// Client for the running daemon, honoring `[socket] dial_timeout_ms`.
pub fn daemon_client(config: &Config) -> DaemonClient {
    DaemonClient::new().dial_timeout(config.socket.dial_timeout())
}
