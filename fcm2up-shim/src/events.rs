//! Inbound events and their routing
//!
//! Events come from two sources: the UnifiedPush distributor integration
//! (messages, address changes, registration results) and the vendor SDK
//! integration (new vendor tokens). [`EventRouter`] maps each kind to one
//! [`EventHandlers`] method and keeps no state of its own.

use serde::Deserialize;

/// Kinds of inbound events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Message,
    NewDeliveryAddress,
    RegistrationFailed,
    Unregistered,
    NewToken,
}

impl EventKind {
    /// Parse an event kind name
    ///
    /// Accepts snake_case names and the UnifiedPush receiver callback names.
    /// Unknown names return `None`.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "message" | "onMessage" => Some(EventKind::Message),
            "new_delivery_address" | "new_endpoint" | "onNewEndpoint" => {
                Some(EventKind::NewDeliveryAddress)
            }
            "registration_failed" | "onRegistrationFailed" => Some(EventKind::RegistrationFailed),
            "unregistered" | "onUnregistered" => Some(EventKind::Unregistered),
            "new_token" | "onNewToken" => Some(EventKind::NewToken),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Message => "message",
            EventKind::NewDeliveryAddress => "new_delivery_address",
            EventKind::RegistrationFailed => "registration_failed",
            EventKind::Unregistered => "unregistered",
            EventKind::NewToken => "new_token",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event delivered to the shim
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// Push message; bytes are preferred over text
    Message {
        bytes: Option<Vec<u8>>,
        text: Option<String>,
    },
    NewDeliveryAddress {
        address: String,
    },
    RegistrationFailed {
        reason: Option<String>,
    },
    Unregistered,
    /// Token issued by the vendor SDK
    NewToken {
        vendor_token: String,
    },
}

impl InboundEvent {
    pub fn message_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        InboundEvent::Message {
            bytes: Some(bytes.into()),
            text: None,
        }
    }

    pub fn message_text(text: impl Into<String>) -> Self {
        InboundEvent::Message {
            bytes: None,
            text: Some(text.into()),
        }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            InboundEvent::Message { .. } => EventKind::Message,
            InboundEvent::NewDeliveryAddress { .. } => EventKind::NewDeliveryAddress,
            InboundEvent::RegistrationFailed { .. } => EventKind::RegistrationFailed,
            InboundEvent::Unregistered => EventKind::Unregistered,
            InboundEvent::NewToken { .. } => EventKind::NewToken,
        }
    }

    /// Convert an untyped event as forwarded by glue code
    ///
    /// Returns `None` for unknown kinds and for events missing a required
    /// field.
    pub fn from_raw(raw: RawEvent) -> Option<Self> {
        let Some(kind) = EventKind::parse(&raw.kind) else {
            tracing::debug!("Ignoring unknown event kind '{}'", raw.kind);
            return None;
        };

        let event = match kind {
            EventKind::Message => InboundEvent::Message {
                bytes: raw.bytes,
                text: raw.text,
            },
            EventKind::NewDeliveryAddress => InboundEvent::NewDeliveryAddress {
                address: required(kind, raw.address)?,
            },
            EventKind::RegistrationFailed => InboundEvent::RegistrationFailed {
                reason: raw.reason,
            },
            EventKind::Unregistered => InboundEvent::Unregistered,
            EventKind::NewToken => InboundEvent::NewToken {
                vendor_token: required(kind, raw.token)?,
            },
        };
        Some(event)
    }
}

fn required(kind: EventKind, value: Option<String>) -> Option<String> {
    let value = value.filter(|v| !v.is_empty());
    if value.is_none() {
        tracing::warn!("Ignoring {} event without its required field", kind);
    }
    value
}

/// Untyped event as glue code forwards it, e.g. from a JSON bridge
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RawEvent {
    pub kind: String,
    #[serde(default)]
    pub bytes: Option<Vec<u8>>,
    #[serde(default, alias = "message")]
    pub text: Option<String>,
    #[serde(default, alias = "endpoint")]
    pub address: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
}

/// Receivers for routed events
pub trait EventHandlers {
    fn on_message(&self, payload: &[u8]);

    fn on_new_delivery_address(&self, address: &str);

    fn on_registration_failed(&self, reason: Option<&str>);

    fn on_unregistered(&self);

    fn on_new_token(&self, vendor_token: &str);
}

/// Stateless dispatch table from event kind to handler
#[derive(Debug, Clone, Copy, Default)]
pub struct EventRouter;

impl EventRouter {
    pub fn route(event: &InboundEvent, handlers: &dyn EventHandlers) {
        tracing::debug!("Routing {} event", event.kind());

        match event {
            InboundEvent::Message { bytes, text } => {
                let payload = bytes
                    .as_deref()
                    .or_else(|| text.as_deref().map(str::as_bytes));
                match payload {
                    Some(payload) => handlers.on_message(payload),
                    None => tracing::warn!("Ignoring message event without payload"),
                }
            }
            InboundEvent::NewDeliveryAddress { address } => {
                handlers.on_new_delivery_address(address)
            }
            InboundEvent::RegistrationFailed { reason } => {
                handlers.on_registration_failed(reason.as_deref())
            }
            InboundEvent::Unregistered => handlers.on_unregistered(),
            InboundEvent::NewToken { vendor_token } => handlers.on_new_token(vendor_token),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use rstest::rstest;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl EventHandlers for Recorder {
        fn on_message(&self, payload: &[u8]) {
            self.0
                .lock()
                .push(format!("message:{}", String::from_utf8_lossy(payload)));
        }

        fn on_new_delivery_address(&self, address: &str) {
            self.0.lock().push(format!("address:{}", address));
        }

        fn on_registration_failed(&self, reason: Option<&str>) {
            self.0
                .lock()
                .push(format!("failed:{}", reason.unwrap_or("-")));
        }

        fn on_unregistered(&self) {
            self.0.lock().push("unregistered".to_string());
        }

        fn on_new_token(&self, vendor_token: &str) {
            self.0.lock().push(format!("token:{}", vendor_token));
        }
    }

    fn route(event: InboundEvent) -> Vec<String> {
        let recorder = Recorder::default();
        EventRouter::route(&event, &recorder);
        recorder.0.into_inner()
    }

    #[test]
    fn test_message_prefers_bytes() {
        let event = InboundEvent::Message {
            bytes: Some(b"raw".to_vec()),
            text: Some("text".to_string()),
        };
        assert_eq!(route(event), vec!["message:raw"]);
        assert_eq!(route(InboundEvent::message_text("text")), vec!["message:text"]);
    }

    #[test]
    fn test_message_without_payload_is_ignored() {
        let event = InboundEvent::Message {
            bytes: None,
            text: None,
        };
        assert!(route(event).is_empty());
    }

    #[test]
    fn test_each_kind_reaches_its_handler() {
        assert_eq!(
            route(InboundEvent::NewDeliveryAddress {
                address: "https://d.example/abc".into()
            }),
            vec!["address:https://d.example/abc"]
        );
        assert_eq!(
            route(InboundEvent::RegistrationFailed { reason: None }),
            vec!["failed:-"]
        );
        assert_eq!(route(InboundEvent::Unregistered), vec!["unregistered"]);
        assert_eq!(
            route(InboundEvent::NewToken {
                vendor_token: "V1".into()
            }),
            vec!["token:V1"]
        );
    }

    #[rstest]
    #[case("message", Some(EventKind::Message))]
    #[case("onNewEndpoint", Some(EventKind::NewDeliveryAddress))]
    #[case("new_endpoint", Some(EventKind::NewDeliveryAddress))]
    #[case("onRegistrationFailed", Some(EventKind::RegistrationFailed))]
    #[case("unregistered", Some(EventKind::Unregistered))]
    #[case("onNewToken", Some(EventKind::NewToken))]
    #[case("onTempUnavailable", None)]
    #[case("", None)]
    fn test_parse_kind(#[case] name: &str, #[case] expected: Option<EventKind>) {
        assert_eq!(EventKind::parse(name), expected);
    }

    #[test]
    fn test_from_raw_json() {
        let raw: RawEvent =
            serde_json::from_str(r#"{"kind":"onNewEndpoint","endpoint":"https://d.example/abc"}"#)
                .unwrap();
        assert_eq!(
            InboundEvent::from_raw(raw),
            Some(InboundEvent::NewDeliveryAddress {
                address: "https://d.example/abc".to_string()
            })
        );

        let raw: RawEvent = serde_json::from_str(r#"{"kind":"message","bytes":[104,105]}"#).unwrap();
        assert_eq!(InboundEvent::from_raw(raw), Some(InboundEvent::message_bytes(b"hi".to_vec())));
    }

    #[test]
    fn test_from_raw_rejects_unknown_and_incomplete() {
        let unknown = RawEvent {
            kind: "onTempUnavailable".to_string(),
            ..Default::default()
        };
        assert_eq!(InboundEvent::from_raw(unknown), None);

        let incomplete = RawEvent {
            kind: "new_token".to_string(),
            token: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(InboundEvent::from_raw(incomplete), None);
    }
}
