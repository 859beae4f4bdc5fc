use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const LOW_TIMEOUT_MS: i32 = 5_000;
pub const NORMAL_TIMEOUT_MS: i32 = 10_000;
/// An expire timeout of 0 means the notification never auto-closes.
pub const NEVER_EXPIRE: i32 = 0;

pub type Hints = BTreeMap<String, HintValue>;

/// A protocol hint value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum HintValue {
    Bool(bool),
    Int(i64),
    Double(f64),
    Str(String),
    Bytes(Vec<u8>),
    Image(ImageData),
    List(Vec<HintValue>),
    Map(BTreeMap<String, HintValue>),
}

impl HintValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }
}

/// Raw pixel buffer as carried by the `image-data` hint (`(iiibiiay)`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageData {
    pub width: i32,
    pub height: i32,
    pub rowstride: i32,
    pub has_alpha: bool,
    pub bits_per_sample: i32,
    pub channels: i32,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Urgency {
    Low,
    Normal,
    Critical,
}

impl Urgency {
    /// Reads the `urgency` hint; missing or out-of-range values are normal.
    pub fn from_hints(hints: &Hints) -> Self {
        match hints.get("urgency").and_then(HintValue::as_int) {
            Some(0) => Self::Low,
            Some(2) => Self::Critical,
            _ => Self::Normal,
        }
    }

    /// Effective timeout for a requested one. Negative requests take the
    /// urgency default; critical notifications never expire.
    pub fn resolve_timeout(self, requested: i32) -> i32 {
        match self {
            Self::Critical => NEVER_EXPIRE,
            Self::Low if requested < 0 => LOW_TIMEOUT_MS,
            Self::Normal if requested < 0 => NORMAL_TIMEOUT_MS,
            _ => requested,
        }
    }
}

/// Reason codes of the `NotificationClosed` signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum CloseReason {
    Expired = 1,
    Dismissed = 2,
    ClosedByCall = 3,
}

impl CloseReason {
    pub fn code(self) -> u32 {
        self as u32
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: u32,
    pub app_name: String,
    pub replaces_id: u32,
    pub app_icon: String,
    pub summary: String,
    pub body: String,
    pub actions: Vec<String>,
    pub hints: Hints,
    pub expire_timeout: i32,
    pub timestamp: i64,
}

/// Arguments of a `Notify` call, before ID and icon resolution.
#[derive(Debug, Clone, Default)]
pub struct NotifyRequest {
    pub app_name: String,
    pub replaces_id: u32,
    pub app_icon: String,
    pub summary: String,
    pub body: String,
    pub actions: Vec<String>,
    pub hints: Hints,
    pub expire_timeout: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hints_with_urgency(level: i64) -> Hints {
        let mut hints = Hints::new();
        hints.insert("urgency".into(), HintValue::Int(level));
        hints
    }

    #[test]
    fn urgency_defaults_to_normal() {
        assert_eq!(Urgency::from_hints(&Hints::new()), Urgency::Normal);
        assert_eq!(Urgency::from_hints(&hints_with_urgency(7)), Urgency::Normal);
    }

    #[test]
    fn urgency_levels_map_from_hint() {
        assert_eq!(Urgency::from_hints(&hints_with_urgency(0)), Urgency::Low);
        assert_eq!(Urgency::from_hints(&hints_with_urgency(1)), Urgency::Normal);
        assert_eq!(Urgency::from_hints(&hints_with_urgency(2)), Urgency::Critical);
    }

    #[test]
    fn unspecified_timeout_uses_urgency_default() {
        assert_eq!(Urgency::Low.resolve_timeout(-1), LOW_TIMEOUT_MS);
        assert_eq!(Urgency::Normal.resolve_timeout(-1), NORMAL_TIMEOUT_MS);
        assert_eq!(Urgency::Critical.resolve_timeout(-1), NEVER_EXPIRE);
    }

    #[test]
    fn explicit_timeout_is_honored_unless_critical() {
        assert_eq!(Urgency::Low.resolve_timeout(1_500), 1_500);
        assert_eq!(Urgency::Normal.resolve_timeout(0), 0);
        assert_eq!(Urgency::Critical.resolve_timeout(3_000), NEVER_EXPIRE);
    }

    #[test]
    fn hint_values_serialize_tagged() {
        let json = serde_json::to_string(&HintValue::Int(2)).unwrap();
        assert_eq!(json, r#"{"type":"int","value":2}"#);
    }
}
