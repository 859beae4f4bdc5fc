//! Plaintext control protocol.
//!
//! A client writes one command (at most [`MAX_REQUEST_LEN`] bytes) and reads
//! a single reply prefixed with `OK:` or `ERR:`.

use crate::error::Error;
use std::fmt;
use std::str::FromStr;

pub const MAX_REQUEST_LEN: usize = 1024;

const OK_PREFIX: &str = "OK:";
const ERR_PREFIX: &str = "ERR:";

/// Control request from client to daemon
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Run the startup sequence unless already started
    Start,
    /// Tear everything down and exit
    Stop,
    /// Liveness check
    Status,
    Notification(NotificationRequest),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationRequest {
    /// Close and drop from history
    Close(u32),
    /// Close from view only
    Dismiss(u32),
    Action { id: u32, key: String },
    Dnd(DndCommand),
    Clear,
    Count,
    History,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DndCommand {
    On,
    Off,
    Toggle,
    State,
}

impl FromStr for DndCommand {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "on" => Ok(Self::On),
            "off" => Ok(Self::Off),
            "toggle" => Ok(Self::Toggle),
            "state" => Ok(Self::State),
            other => Err(Error::UnknownCommand(format!("DND {other}"))),
        }
    }
}

impl fmt::Display for DndCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::On => "on",
            Self::Off => "off",
            Self::Toggle => "toggle",
            Self::State => "state",
        })
    }
}

impl FromStr for Request {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let line = s.trim();
        let unknown = || Error::UnknownCommand(line.to_string());

        match line {
            "START" => return Ok(Self::Start),
            "STOP" => return Ok(Self::Stop),
            "STATUS" => return Ok(Self::Status),
            _ => {}
        }

        let mut words = line.split_whitespace();
        if words.next() != Some("NOTIFICATION") {
            return Err(unknown());
        }
        let parse_id = |word: Option<&str>| -> Result<u32, Error> {
            word.and_then(|w| w.parse().ok()).ok_or_else(unknown)
        };

        let request = match words.next() {
            Some("CLOSE") => NotificationRequest::Close(parse_id(words.next())?),
            Some("DISMISS") => NotificationRequest::Dismiss(parse_id(words.next())?),
            Some("ACTION") => {
                let id = parse_id(words.next())?;
                let key = words.next().ok_or_else(unknown)?.to_string();
                NotificationRequest::Action { id, key }
            }
            Some("DND") => NotificationRequest::Dnd(words.next().ok_or_else(unknown)?.parse()?),
            Some("CLEAR") => NotificationRequest::Clear,
            Some("COUNT") => NotificationRequest::Count,
            Some("HISTORY") => NotificationRequest::History,
            _ => return Err(unknown()),
        };

        if words.next().is_some() {
            return Err(unknown());
        }
        Ok(Self::Notification(request))
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => f.write_str("START"),
            Self::Stop => f.write_str("STOP"),
            Self::Status => f.write_str("STATUS"),
            Self::Notification(n) => match n {
                NotificationRequest::Close(id) => write!(f, "NOTIFICATION CLOSE {id}"),
                NotificationRequest::Dismiss(id) => write!(f, "NOTIFICATION DISMISS {id}"),
                NotificationRequest::Action { id, key } => {
                    write!(f, "NOTIFICATION ACTION {id} {key}")
                }
                NotificationRequest::Dnd(cmd) => write!(f, "NOTIFICATION DND {cmd}"),
                NotificationRequest::Clear => f.write_str("NOTIFICATION CLEAR"),
                NotificationRequest::Count => f.write_str("NOTIFICATION COUNT"),
                NotificationRequest::History => f.write_str("NOTIFICATION HISTORY"),
            },
        }
    }
}

/// Reply from daemon to client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Ok(String),
    Err(String),
}

impl Reply {
    pub fn ok(message: impl Into<String>) -> Self {
        Self::Ok(message.into())
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self::Err(message.into())
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Ok(m) | Self::Err(m) => m,
        }
    }

    /// Reads a raw reply. Anything without a known prefix is an error reply.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if let Some(rest) = raw.strip_prefix(OK_PREFIX) {
            Self::Ok(rest.trim().to_string())
        } else if let Some(rest) = raw.strip_prefix(ERR_PREFIX) {
            Self::Err(rest.trim().to_string())
        } else {
            Self::Err(raw.to_string())
        }
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok(m) => write!(f, "{OK_PREFIX} {m}"),
            Self::Err(m) => write!(f, "{ERR_PREFIX} {m}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_commands_parse_after_trim() {
        assert_eq!("STOP\n".parse::<Request>().unwrap(), Request::Stop);
        assert_eq!("  START ".parse::<Request>().unwrap(), Request::Start);
        assert_eq!("STATUS".parse::<Request>().unwrap(), Request::Status);
    }

    #[test]
    fn keywords_are_case_sensitive() {
        assert!("status".parse::<Request>().is_err());
    }

    #[test]
    fn notification_commands_parse() {
        assert_eq!(
            "NOTIFICATION ACTION 42 reply".parse::<Request>().unwrap(),
            Request::Notification(NotificationRequest::Action {
                id: 42,
                key: "reply".into()
            })
        );
        assert_eq!(
            "NOTIFICATION DND toggle".parse::<Request>().unwrap(),
            Request::Notification(NotificationRequest::Dnd(DndCommand::Toggle))
        );
        assert_eq!(
            "NOTIFICATION DISMISS 7".parse::<Request>().unwrap(),
            Request::Notification(NotificationRequest::Dismiss(7))
        );
    }

    #[test]
    fn malformed_notification_commands_are_unknown() {
        for line in [
            "NOTIFICATION CLOSE",
            "NOTIFICATION CLOSE abc",
            "NOTIFICATION DND maybe",
            "NOTIFICATION COUNT extra",
            "NOTIFICATION",
            "REBOOT",
        ] {
            assert!(
                matches!(line.parse::<Request>(), Err(Error::UnknownCommand(_))),
                "{line}"
            );
        }
    }

    #[test]
    fn display_matches_wire_form() {
        let request = Request::Notification(NotificationRequest::Action {
            id: 9,
            key: "default".into(),
        });
        assert_eq!(request.to_string(), "NOTIFICATION ACTION 9 default");
        assert_eq!(request.to_string().parse::<Request>().unwrap(), request);
    }

    #[test]
    fn reply_prefixes() {
        assert_eq!(Reply::ok("running").to_string(), "OK: running");
        assert_eq!(Reply::err("unknown command").to_string(), "ERR: unknown command");
        assert_eq!(Reply::parse("OK: Already started"), Reply::ok("Already started"));
        assert!(!Reply::parse("garbage").is_ok());
    }
}
