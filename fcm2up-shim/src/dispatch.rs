//! Delivery of inbound messages to the app
//!
//! Each message tries three paths in order and stops at the first that
//! succeeds: the app's registered message handler, the app's message
//! service component, then a locally generated notification.

use std::sync::Arc;

use serde_json::{Map, Value};
use state_store::StateStore;

use crate::host::{
    guarded, ComponentLauncher, HandlerContext, HandlerRegistry, HandlerSignature,
    LocalNotification, Notifier,
};
use crate::state::{HandlerTarget, MessageServiceClass};

const TITLE_KEYS: &[&str] = &["title", "notification_title", "subject", "gcm.notification.title"];

const BODY_KEYS: &[&str] = &[
    "body",
    "message",
    "text",
    "content",
    "alert",
    "gcm.notification.body",
];

const NESTED_KEYS: &[&str] = &["notification", "data"];

/// Which path took a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Handler(HandlerSignature),
    MessageService,
    Notification(LocalNotification),
    Dropped,
}

/// Delivery targets as configured at dispatch time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchTargets {
    pub handler: Option<HandlerTarget>,
    pub message_service_class: Option<String>,
}

impl DispatchTargets {
    pub fn read(store: &StateStore) -> Self {
        Self {
            handler: store.get::<HandlerTarget>(),
            message_service_class: store
                .get::<MessageServiceClass>()
                .map(|c| c.0)
                .filter(|c| !c.is_empty()),
        }
    }
}

pub struct MessageRouter {
    registry: HandlerRegistry,
    launcher: Option<Arc<dyn ComponentLauncher>>,
    notifier: Arc<dyn Notifier>,
    context: HandlerContext,
    fallback_title: String,
}

impl MessageRouter {
    pub fn new(
        registry: HandlerRegistry,
        launcher: Option<Arc<dyn ComponentLauncher>>,
        notifier: Arc<dyn Notifier>,
        context: HandlerContext,
        fallback_title: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            launcher,
            notifier,
            context,
            fallback_title: fallback_title.into(),
        }
    }

    /// Deliver `payload`, never failing
    pub fn dispatch(&self, targets: &DispatchTargets, payload: &[u8]) -> DispatchOutcome {
        if let Some(signature) = self.try_handler(targets, payload) {
            return DispatchOutcome::Handler(signature);
        }

        if self.try_message_service(targets, payload) {
            return DispatchOutcome::MessageService;
        }

        let Some(notification) = extract_notification(payload, &self.fallback_title) else {
            tracing::warn!("Dropping message of {} bytes: no displayable body", payload.len());
            return DispatchOutcome::Dropped;
        };

        match guarded("notifier", || self.notifier.notify(&notification)) {
            Ok(()) => DispatchOutcome::Notification(notification),
            Err(e) => {
                tracing::error!("Failed to post fallback notification: {}", e);
                DispatchOutcome::Dropped
            }
        }
    }

    fn try_handler(&self, targets: &DispatchTargets, payload: &[u8]) -> Option<HandlerSignature> {
        let target = targets.handler.as_ref()?;
        let Some((signature, handler)) = self.registry.resolve(target) else {
            tracing::warn!("No adapter registered for message handler {}", target);
            return None;
        };

        let context = signature.takes_context().then_some(&self.context);
        match guarded("message handler", || {
            handler.handle(context, signature.argument(payload))
        }) {
            Ok(()) => {
                tracing::debug!("Delivered message to {} as {:?}", target, signature);
                Some(signature)
            }
            Err(e) => {
                tracing::warn!("Message handler {} failed: {}", target, e);
                None
            }
        }
    }

    fn try_message_service(&self, targets: &DispatchTargets, payload: &[u8]) -> bool {
        let Some(class) = targets.message_service_class.as_deref() else {
            return false;
        };
        let Some(launcher) = &self.launcher else {
            tracing::warn!("Message service {} configured but no launcher registered", class);
            return false;
        };

        match guarded("message service", || launcher.start_message_service(class, payload)) {
            Ok(()) => {
                tracing::debug!("Started message service {}", class);
                true
            }
            Err(e) => {
                tracing::warn!("Failed to start message service {}: {}", class, e);
                false
            }
        }
    }
}

impl std::fmt::Debug for MessageRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageRouter")
            .field("registry", &self.registry)
            .field("has_launcher", &self.launcher.is_some())
            .field("fallback_title", &self.fallback_title)
            .finish()
    }
}

/// Build a notification from a loosely structured payload
///
/// JSON objects are searched for known title and body fields at the top
/// level, then inside `notification` and `data` (objects or JSON strings).
/// Any other UTF-8 text becomes the body. Returns `None` when there is no
/// body to show, including for binary payloads.
pub fn extract_notification(payload: &[u8], fallback_title: &str) -> Option<LocalNotification> {
    let text = match std::str::from_utf8(payload) {
        Ok(text) => text.trim(),
        Err(_) => {
            tracing::debug!(
                "Message payload of {} bytes is not UTF-8 text; no notification body",
                payload.len()
            );
            return None;
        }
    };
    if text.is_empty() {
        return None;
    }

    let (title, body) = match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(object)) => title_and_body(&object),
        Ok(Value::String(body)) => (None, Some(body)),
        Ok(Value::Null) => (None, None),
        _ => (None, Some(text.to_string())),
    };

    let body = body.map(|b| b.trim().to_string()).filter(|b| !b.is_empty())?;
    Some(LocalNotification {
        title: title.unwrap_or_else(|| fallback_title.to_string()),
        body,
    })
}

fn title_and_body(object: &Map<String, Value>) -> (Option<String>, Option<String>) {
    let mut levels = vec![object.clone()];
    for key in NESTED_KEYS {
        match object.get(*key) {
            Some(Value::Object(nested)) => levels.push(nested.clone()),
            Some(Value::String(encoded)) => {
                if let Ok(Value::Object(nested)) = serde_json::from_str(encoded) {
                    levels.push(nested);
                }
            }
            _ => {}
        }
    }

    let title = levels.iter().find_map(|level| first_string(level, TITLE_KEYS));
    let body = levels.iter().find_map(|level| first_string(level, BODY_KEYS));
    (title, body)
}

fn first_string(object: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| object.get(*key))
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{HandlerArgument, HostError, HostResult, MessageHandler};
    use parking_lot::Mutex;
    use rstest::rstest;

    #[derive(Default)]
    struct Recorder {
        handled: Mutex<Vec<String>>,
        fail: bool,
    }

    impl MessageHandler for Recorder {
        fn handle(&self, context: Option<&HandlerContext>, argument: HandlerArgument<'_>) -> HostResult {
            if self.fail {
                return Err(HostError::failed("handler threw"));
            }
            let app = context.map(|c| c.app_id.clone()).unwrap_or_default();
            let shown = match argument {
                HandlerArgument::Bytes(bytes) => String::from_utf8_lossy(bytes).into_owned(),
                HandlerArgument::Text(text) => text.into_owned(),
            };
            self.handled.lock().push(format!("{}|{}", app, shown));
            Ok(())
        }
    }

    impl ComponentLauncher for Recorder {
        fn start_message_service(&self, class: &str, _payload: &[u8]) -> HostResult {
            if self.fail {
                return Err(HostError::failed("service not exported"));
            }
            self.handled.lock().push(format!("service|{}", class));
            Ok(())
        }
    }

    impl Notifier for Recorder {
        fn notify(&self, notification: &LocalNotification) -> HostResult {
            self.handled
                .lock()
                .push(format!("notify|{}|{}", notification.title, notification.body));
            Ok(())
        }
    }

    fn target() -> HandlerTarget {
        HandlerTarget::new("com.example.Push", "onMessage")
    }

    fn router(registry: HandlerRegistry, launcher: Option<Arc<Recorder>>) -> (MessageRouter, Arc<Recorder>) {
        let notifier = Arc::new(Recorder::default());
        let router = MessageRouter::new(
            registry,
            launcher.map(|l| l as Arc<dyn ComponentLauncher>),
            notifier.clone(),
            HandlerContext {
                app_id: "com.example.app".to_string(),
            },
            "New message",
        );
        (router, notifier)
    }

    #[test]
    fn test_handler_receives_context_and_bytes() {
        let handler = Arc::new(Recorder::default());
        let registry =
            HandlerRegistry::new().with(&target(), HandlerSignature::ContextBytes, handler.clone());
        let (router, notifier) = router(registry, None);

        let targets = DispatchTargets {
            handler: Some(target()),
            message_service_class: None,
        };
        let outcome = router.dispatch(&targets, br#"{"title":"A","body":"B"}"#);

        assert_eq!(outcome, DispatchOutcome::Handler(HandlerSignature::ContextBytes));
        assert_eq!(
            *handler.handled.lock(),
            vec![r#"com.example.app|{"title":"A","body":"B"}"#.to_string()]
        );
        assert!(notifier.handled.lock().is_empty());
    }

    #[test]
    fn test_bytes_only_handler_gets_no_context() {
        let handler = Arc::new(Recorder::default());
        let registry = HandlerRegistry::new().with(&target(), HandlerSignature::Bytes, handler.clone());
        let (router, _) = router(registry, None);

        let targets = DispatchTargets {
            handler: Some(target()),
            message_service_class: None,
        };
        assert_eq!(
            router.dispatch(&targets, b"hi"),
            DispatchOutcome::Handler(HandlerSignature::Bytes)
        );
        assert_eq!(*handler.handled.lock(), vec!["|hi".to_string()]);
    }

    #[test]
    fn test_failing_handler_falls_through_to_service() {
        let handler = Arc::new(Recorder {
            fail: true,
            ..Default::default()
        });
        let launcher = Arc::new(Recorder::default());
        let registry = HandlerRegistry::new().with(&target(), HandlerSignature::ContextString, handler);
        let (router, _) = router(registry, Some(launcher.clone()));

        let targets = DispatchTargets {
            handler: Some(target()),
            message_service_class: Some("com.example.PushService".to_string()),
        };
        assert_eq!(router.dispatch(&targets, b"{}"), DispatchOutcome::MessageService);
        assert_eq!(
            *launcher.handled.lock(),
            vec!["service|com.example.PushService".to_string()]
        );
    }

    #[test]
    fn test_failing_service_falls_through_to_notification() {
        let launcher = Arc::new(Recorder {
            fail: true,
            ..Default::default()
        });
        let (router, notifier) = router(HandlerRegistry::new(), Some(launcher));

        let targets = DispatchTargets {
            handler: Some(target()),
            message_service_class: Some("com.example.PushService".to_string()),
        };
        let outcome = router.dispatch(&targets, br#"{"title":"A","body":"B"}"#);

        assert_eq!(
            outcome,
            DispatchOutcome::Notification(LocalNotification {
                title: "A".to_string(),
                body: "B".to_string(),
            })
        );
        assert_eq!(*notifier.handled.lock(), vec!["notify|A|B".to_string()]);
    }

    #[test]
    fn test_message_without_body_is_dropped() {
        let (router, notifier) = router(HandlerRegistry::new(), None);
        let outcome = router.dispatch(&DispatchTargets::default(), br#"{"title":"only"}"#);
        assert_eq!(outcome, DispatchOutcome::Dropped);
        assert!(notifier.handled.lock().is_empty());
    }

    #[rstest]
    #[case(r#"{"title":"A","body":"B"}"#, Some(("A", "B")))]
    #[case(r#"{"subject":"S","message":"M"}"#, Some(("S", "M")))]
    #[case(r#"{"gcm.notification.title":"T","gcm.notification.body":"G"}"#, Some(("T", "G")))]
    #[case(r#"{"notification":{"title":"N","body":"nested"}}"#, Some(("N", "nested")))]
    #[case(r#"{"data":"{\"text\":\"encoded\"}"}"#, Some(("New message", "encoded")))]
    #[case(r#"{"title":"top","data":{"alert":"from data"}}"#, Some(("top", "from data")))]
    #[case(r#"{"body":"  "}"#, None)]
    #[case(r#""just a string""#, Some(("New message", "just a string")))]
    #[case("plain text payload", Some(("New message", "plain text payload")))]
    #[case("", None)]
    #[case("null", None)]
    fn test_extract_notification(#[case] payload: &str, #[case] expected: Option<(&str, &str)>) {
        let notification = extract_notification(payload.as_bytes(), "New message");
        assert_eq!(
            notification.as_ref().map(|n| (n.title.as_str(), n.body.as_str())),
            expected
        );
    }

    #[rstest]
    #[case(&[0x8f, 0xff, 0x01, 0xfe, 0x9a])]
    #[case(&[0xc3, 0x28])]
    #[case(b"{\"body\":\"\xff\"}")]
    fn test_binary_payload_has_no_notification(#[case] payload: &[u8]) {
        assert_eq!(extract_notification(payload, "New message"), None);
    }

    #[test]
    fn test_binary_message_is_dropped() {
        let (router, notifier) = router(HandlerRegistry::new(), None);
        let outcome = router.dispatch(&DispatchTargets::default(), &[0x8f, 0xff, 0x01, 0xfe]);
        assert_eq!(outcome, DispatchOutcome::Dropped);
        assert!(notifier.handled.lock().is_empty());
    }

    #[test]
    fn test_targets_read_from_store() {
        let store = crate::state::open(state_store::MemoryBackend::new()).unwrap();
        assert_eq!(DispatchTargets::read(&store), DispatchTargets::default());

        store.set(target()).unwrap();
        store
            .set(MessageServiceClass("com.example.PushService".into()))
            .unwrap();
        let targets = DispatchTargets::read(&store);
        assert_eq!(targets.handler, Some(target()));
        assert_eq!(
            targets.message_service_class.as_deref(),
            Some("com.example.PushService")
        );
    }
}
