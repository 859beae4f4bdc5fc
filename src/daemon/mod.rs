//! wigo daemon - supervisor for the desktop shell's background work
//!
//! The daemon runs as a single process and owns:
//! - long-running external processes (eww, subscribe commands)
//! - watcher loops with restart-on-crash
//! - the control socket (`START`, `STOP`, `STATUS`, `NOTIFICATION …`)
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                 wigo daemon                   │
//! ├──────────────────────────────────────────────┤
//! │ Supervisor  │ Control socket │ Notifications │
//! │ (children,  │ (plaintext)    │ (session bus) │
//! │  watchers)  │                │               │
//! ├──────────────────────────────────────────────┤
//! │ eww │ subscriptions │ polls │ config │ esc   │
//! └──────────────────────────────────────────────┘
//! ```

pub mod client;
pub mod protocol;
pub mod server;
pub mod startup;
pub mod supervisor;

pub use client::DaemonClient;
pub use protocol::{DndCommand, NotificationRequest, Reply, Request};
pub use server::{DaemonConfig, DaemonServer, Startup};
pub use startup::WidgetStartup;
pub use supervisor::{ShutdownPolicy, Supervisor, Watcher, WatcherContext};
