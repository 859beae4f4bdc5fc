pub mod clienv;
pub mod config;
pub mod daemon;
pub mod error;
pub mod eww;
pub mod logging;
pub mod notifications;
pub mod watchers;

pub use error::{Error, Result};
