use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "wigo")]
#[command(version)]
#[command(about = "Desktop shell daemon: widgets, watchers and notifications", long_about = None)]
pub(crate) struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Start the daemon, or ask a running one to start its widgets
    Start {
        /// Command run for every notification (overrides notifications.exec)
        #[arg(long, num_args = 1..)]
        exec: Vec<String>,
    },

    /// Stop the daemon and everything it supervises
    Kill,

    /// Check whether the daemon is running
    Status,

    /// Stop the running daemon and start a fresh one
    Reload {
        #[arg(long, num_args = 1..)]
        exec: Vec<String>,
    },

    /// Send or manage notifications
    Notification {
        #[command(subcommand)]
        command: NotificationCommands,
    },
}

#[derive(Subcommand)]
pub(crate) enum NotificationCommands {
    /// Send a notification over the session bus
    Notify {
        summary: String,

        #[arg(default_value = "")]
        body: String,

        #[arg(short, long, default_value = "wigo")]
        app_name: String,

        #[arg(short, long, default_value = "")]
        icon: String,

        #[arg(short, long, value_enum, default_value_t = UrgencyArg::Normal)]
        urgency: UrgencyArg,

        /// Milliseconds; -1 uses the urgency default, 0 never expires
        #[arg(short = 't', long, default_value_t = -1, allow_negative_numbers = true)]
        expire_timeout: i32,

        /// ID of a notification to replace
        #[arg(short, long, default_value_t = 0)]
        replaces_id: u32,

        /// Action as KEY=LABEL, repeatable
        #[arg(short = 'A', long = "action")]
        actions: Vec<String>,
    },

    /// Close a notification and remove it from history
    Close { id: u32 },

    /// Close a notification from view, keeping it in history
    Dismiss { id: u32 },

    /// Invoke an action on a notification
    Action {
        id: u32,
        #[arg(default_value = "default")]
        key: String,
    },

    /// Do-not-disturb control
    Dnd {
        #[arg(value_enum, default_value_t = DndArg::State)]
        state: DndArg,
    },

    /// Delete the notification history
    ClearHistory,

    /// Print the number of notifications in history
    Count,

    /// Print the notification history as JSON
    History,
}

#[derive(Clone, Copy, ValueEnum)]
pub(crate) enum UrgencyArg {
    Low,
    Normal,
    Critical,
}

impl UrgencyArg {
    pub fn level(self) -> i64 {
        match self {
            Self::Low => 0,
            Self::Normal => 1,
            Self::Critical => 2,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub(crate) enum DndArg {
    On,
    Off,
    Toggle,
    State,
}
