//! In-process notification server: the bus surface, the active table with
//! expiry timers, history and Do-Not-Disturb.

pub mod bus;
pub mod dnd;
pub mod history;
pub mod image;
pub mod model;
pub mod service;

pub use model::{CloseReason, HintValue, Hints, ImageData, Notification, NotifyRequest, Urgency};
pub use service::{NotificationService, ServicePaths, SignalSink};
