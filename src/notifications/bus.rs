//! `org.freedesktop.Notifications` on the session bus.

use super::model::{CloseReason, HintValue, Hints, ImageData, NotifyRequest};
use super::service::{NotificationService, SignalSink};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info};
use zbus::fdo::{RequestNameFlags, RequestNameReply};
use zbus::object_server::SignalEmitter;
use zbus::zvariant::{OwnedValue, Structure, Value};
use zbus::{interface, Connection};

pub const BUS_NAME: &str = "org.freedesktop.Notifications";
pub const OBJECT_PATH: &str = "/org/freedesktop/Notifications";
pub const INTERFACE: &str = "org.freedesktop.Notifications";

pub const SERVER_NAME: &str = "wigo";
pub const SERVER_VENDOR: &str = "hoppxi";
pub const SPEC_VERSION: &str = "1.2";
pub const CAPABILITIES: [&str; 5] = ["body", "body-markup", "actions", "icon-static", "persistence"];

pub struct NotificationServer {
    service: Arc<NotificationService>,
}

impl NotificationServer {
    pub fn new(service: Arc<NotificationService>) -> Self {
        Self { service }
    }
}

#[interface(name = "org.freedesktop.Notifications")]
impl NotificationServer {
    #[allow(clippy::too_many_arguments)]
    async fn notify(
        &self,
        app_name: String,
        replaces_id: u32,
        app_icon: String,
        summary: String,
        body: String,
        actions: Vec<String>,
        hints: HashMap<String, OwnedValue>,
        expire_timeout: i32,
    ) -> u32 {
        let request = NotifyRequest {
            app_name,
            replaces_id,
            app_icon,
            summary,
            body,
            actions,
            hints: hints_from_dbus(&hints),
            expire_timeout,
        };
        self.service.notify(request).await
    }

    async fn close_notification(&self, id: u32) {
        self.service.close_by_call(id).await;
    }

    fn get_capabilities(&self) -> Vec<String> {
        CAPABILITIES.iter().map(|c| c.to_string()).collect()
    }

    fn get_server_information(&self) -> (String, String, String, String) {
        (
            SERVER_NAME.to_string(),
            SERVER_VENDOR.to_string(),
            env!("CARGO_PKG_VERSION").to_string(),
            SPEC_VERSION.to_string(),
        )
    }

    #[zbus(signal)]
    async fn action_invoked(
        emitter: &SignalEmitter<'_>,
        id: u32,
        action_key: &str,
    ) -> zbus::Result<()>;

    #[zbus(signal)]
    async fn notification_closed(
        emitter: &SignalEmitter<'_>,
        id: u32,
        reason: u32,
    ) -> zbus::Result<()>;
}

/// Emits signals at [`OBJECT_PATH`] on the connection that owns the name.
pub struct BusSignals {
    connection: Connection,
}

impl BusSignals {
    pub fn new(connection: Connection) -> Self {
        Self { connection }
    }
}

#[async_trait]
impl SignalSink for BusSignals {
    async fn action_invoked(&self, id: u32, action_key: &str) -> Result<()> {
        let emitter = SignalEmitter::new(&self.connection, OBJECT_PATH)?;
        NotificationServer::action_invoked(&emitter, id, action_key).await?;
        Ok(())
    }

    async fn notification_closed(&self, id: u32, reason: CloseReason) -> Result<()> {
        let emitter = SignalEmitter::new(&self.connection, OBJECT_PATH)?;
        NotificationServer::notification_closed(&emitter, id, reason.code()).await?;
        debug!(id, ?reason, "NotificationClosed emitted");
        Ok(())
    }
}

/// Exports the server and claims [`BUS_NAME`].
///
/// Fails with [`Error::NameTaken`] when another daemon owns the name. The
/// returned connection must be kept alive for as long as the server runs.
pub async fn serve(service: Arc<NotificationService>) -> Result<Connection> {
    let connection = Connection::session().await?;
    connection
        .object_server()
        .at(OBJECT_PATH, NotificationServer::new(service.clone()))
        .await?;

    match connection
        .request_name_with_flags(BUS_NAME, RequestNameFlags::DoNotQueue.into())
        .await
    {
        Ok(RequestNameReply::PrimaryOwner) | Ok(RequestNameReply::AlreadyOwner) => {}
        Ok(reply) => {
            debug!(?reply, "Name request refused");
            return Err(Error::NameTaken(BUS_NAME.to_string()));
        }
        Err(e) => {
            debug!("Name request failed: {}", e);
            return Err(Error::NameTaken(BUS_NAME.to_string()));
        }
    }

    service.attach_signals(Arc::new(BusSignals::new(connection.clone())));
    info!(name = BUS_NAME, "Notification server listening");
    Ok(connection)
}

/// Calls `Notify` on whichever server owns [`BUS_NAME`].
pub async fn send_notification(request: &NotifyRequest) -> Result<u32> {
    let connection = Connection::session().await?;
    let hints = outgoing_hints(&request.hints);
    let reply = connection
        .call_method(
            Some(BUS_NAME),
            OBJECT_PATH,
            Some(INTERFACE),
            "Notify",
            &(
                request.app_name.as_str(),
                request.replaces_id,
                request.app_icon.as_str(),
                request.summary.as_str(),
                request.body.as_str(),
                &request.actions,
                hints,
                request.expire_timeout,
            ),
        )
        .await?;
    Ok(reply.body().deserialize::<u32>()?)
}

/// Scalar hints for an outgoing call. `urgency` is sent as a byte.
fn outgoing_hints(hints: &Hints) -> HashMap<&str, Value<'_>> {
    hints
        .iter()
        .filter_map(|(key, hint)| {
            let value = match hint {
                HintValue::Int(level) if key == "urgency" => Value::U8(*level as u8),
                HintValue::Int(i) => Value::I32(*i as i32),
                HintValue::Bool(b) => Value::Bool(*b),
                HintValue::Double(d) => Value::F64(*d),
                HintValue::Str(s) => Value::from(s.as_str()),
                _ => return None,
            };
            Some((key.as_str(), value))
        })
        .collect()
}

pub fn hints_from_dbus(hints: &HashMap<String, OwnedValue>) -> Hints {
    hints
        .iter()
        .filter_map(|(key, value)| hint_from_value(value).map(|hint| (key.clone(), hint)))
        .collect()
}

/// Converts a variant into a [`HintValue`]. File descriptors, signatures and
/// object paths have no representation and yield `None`.
pub fn hint_from_value(value: &Value<'_>) -> Option<HintValue> {
    let hint = match value {
        Value::U8(v) => HintValue::Int(i64::from(*v)),
        Value::I16(v) => HintValue::Int(i64::from(*v)),
        Value::U16(v) => HintValue::Int(i64::from(*v)),
        Value::I32(v) => HintValue::Int(i64::from(*v)),
        Value::U32(v) => HintValue::Int(i64::from(*v)),
        Value::I64(v) => HintValue::Int(*v),
        Value::U64(v) => HintValue::Int(*v as i64),
        Value::Bool(v) => HintValue::Bool(*v),
        Value::F64(v) => HintValue::Double(*v),
        Value::Str(s) => HintValue::Str(s.to_string()),
        Value::Value(inner) => return hint_from_value(inner),
        Value::Array(array) => {
            let bytes: Option<Vec<u8>> = array
                .iter()
                .map(|v| match v {
                    Value::U8(b) => Some(*b),
                    _ => None,
                })
                .collect();
            match bytes {
                Some(bytes) => HintValue::Bytes(bytes),
                None => HintValue::List(array.iter().filter_map(hint_from_value).collect()),
            }
        }
        Value::Dict(dict) => {
            let map: BTreeMap<String, HintValue> = dict
                .iter()
                .filter_map(|(k, v)| {
                    let key = match k {
                        Value::Str(s) => s.to_string(),
                        other => other.to_string(),
                    };
                    hint_from_value(v).map(|hint| (key, hint))
                })
                .collect();
            HintValue::Map(map)
        }
        Value::Structure(structure) => return image_from_structure(structure),
        _ => return None,
    };
    Some(hint)
}

/// `(iiibiiay)`: width, height, rowstride, has_alpha, bits, channels, data.
fn image_from_structure(structure: &Structure<'_>) -> Option<HintValue> {
    match structure.fields() {
        [Value::I32(width), Value::I32(height), Value::I32(rowstride), Value::Bool(has_alpha), Value::I32(bits_per_sample), Value::I32(channels), Value::Array(data)] =>
        {
            let data = data
                .iter()
                .map(|v| match v {
                    Value::U8(b) => Some(*b),
                    _ => None,
                })
                .collect::<Option<Vec<u8>>>()?;
            Some(HintValue::Image(ImageData {
                width: *width,
                height: *height,
                rowstride: *rowstride,
                has_alpha: *has_alpha,
                bits_per_sample: *bits_per_sample,
                channels: *channels,
                data,
            }))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urgency_byte_becomes_int() {
        assert_eq!(hint_from_value(&Value::U8(2)), Some(HintValue::Int(2)));
    }

    #[test]
    fn strings_and_bools_convert() {
        assert_eq!(
            hint_from_value(&Value::from("email.arrived")),
            Some(HintValue::Str("email.arrived".into()))
        );
        assert_eq!(hint_from_value(&Value::Bool(true)), Some(HintValue::Bool(true)));
    }

    #[test]
    fn nested_variant_is_unwrapped() {
        let nested = Value::Value(Box::new(Value::I32(-4)));
        assert_eq!(hint_from_value(&nested), Some(HintValue::Int(-4)));
    }

    #[test]
    fn outgoing_urgency_is_a_byte() {
        let mut hints = Hints::new();
        hints.insert("urgency".into(), HintValue::Int(2));
        hints.insert("transient".into(), HintValue::Bool(true));
        hints.insert("image-data".into(), HintValue::Bytes(vec![1, 2]));

        let out = outgoing_hints(&hints);
        assert_eq!(out.len(), 2);
        assert_eq!(out["urgency"], Value::U8(2));
        assert_eq!(out["transient"], Value::Bool(true));
    }

    #[test]
    fn capabilities_advertise_persistence() {
        assert!(CAPABILITIES.contains(&"persistence"));
        assert!(CAPABILITIES.contains(&"actions"));
    }
}
