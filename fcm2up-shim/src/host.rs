//! Capabilities the host app provides to the shim
//!
//! Generated glue code implements these traits at packaging time. The shim
//! never probes the app for methods; everything it can call is registered
//! here up front.

use std::any::Any;
use std::borrow::Cow;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use thiserror::Error;

use crate::state::HandlerTarget;

/// Failure reported by, or on behalf of, a host callback
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    /// The callback ran and reported a failure
    #[error("{0}")]
    Failed(String),

    /// The callback panicked
    #[error("Host callback panicked in {context}: {message}")]
    Panicked { context: String, message: String },

    /// Nothing is registered for the requested capability
    #[error("No host callback registered for {0}")]
    NotRegistered(String),
}

impl HostError {
    pub fn failed(message: impl Into<String>) -> Self {
        HostError::Failed(message.into())
    }
}

/// Result type for host callbacks
pub type HostResult<T = ()> = std::result::Result<T, HostError>;

/// Payload of a distributor register/unregister request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributorRequest {
    /// Subscription token identifying this installation
    pub token: String,
    /// Package identifier of the app
    pub application: String,
}

/// The on-device UnifiedPush distributor
///
/// Requests are fire-and-forget. Results come back later as inbound events.
pub trait Distributor: Send + Sync {
    fn register(&self, distributor_id: &str, request: &DistributorRequest) -> HostResult;

    fn unregister(&self, distributor_id: &str, request: &DistributorRequest) -> HostResult;
}

/// The app's own "new token" callback
pub trait TokenHandler: Send + Sync {
    fn on_new_token(&self, token: &str) -> HostResult;
}

/// Context handed to handlers that take one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerContext {
    pub app_id: String,
}

/// Argument shapes an app message handler can accept
///
/// Resolution walks [`HandlerSignature::RESOLUTION_ORDER`] and the first
/// registered shape wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerSignature {
    /// `(context, bytes)`
    ContextBytes,
    /// `(context, string)`
    ContextString,
    /// `(bytes)`
    Bytes,
}

impl HandlerSignature {
    pub const RESOLUTION_ORDER: [HandlerSignature; 3] = [
        HandlerSignature::ContextBytes,
        HandlerSignature::ContextString,
        HandlerSignature::Bytes,
    ];

    pub fn takes_context(self) -> bool {
        !matches!(self, HandlerSignature::Bytes)
    }

    /// Shape `payload` the way this signature expects it
    pub fn argument(self, payload: &[u8]) -> HandlerArgument<'_> {
        match self {
            HandlerSignature::ContextBytes | HandlerSignature::Bytes => {
                HandlerArgument::Bytes(payload)
            }
            HandlerSignature::ContextString => {
                HandlerArgument::Text(String::from_utf8_lossy(payload))
            }
        }
    }
}

/// Message payload as passed to a [`MessageHandler`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerArgument<'a> {
    Bytes(&'a [u8]),
    Text(Cow<'a, str>),
}

/// Adapter around an app-defined message callable
pub trait MessageHandler: Send + Sync {
    fn handle(&self, context: Option<&HandlerContext>, argument: HandlerArgument<'_>)
        -> HostResult;
}

/// Starts an app component with the raw message
pub trait ComponentLauncher: Send + Sync {
    fn start_message_service(&self, class: &str, payload: &[u8]) -> HostResult;
}

/// Notification shown when no app handler takes a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalNotification {
    pub title: String,
    pub body: String,
}

/// Posts local notifications
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: &LocalNotification) -> HostResult;
}

/// Notifier that only logs
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingNotifier;

impl Notifier for LoggingNotifier {
    fn notify(&self, notification: &LocalNotification) -> HostResult {
        tracing::info!(
            "Local notification: {} ({} chars)",
            notification.title,
            notification.body.chars().count()
        );
        Ok(())
    }
}

type HandlerKey = (String, String, HandlerSignature);

/// Message handler adapters keyed by target and signature
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<HandlerKey, Arc<dyn MessageHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter, replacing any previous one with the same key
    pub fn register(
        &mut self,
        target: &HandlerTarget,
        signature: HandlerSignature,
        handler: Arc<dyn MessageHandler>,
    ) -> Option<Arc<dyn MessageHandler>> {
        self.handlers.insert(
            (target.class.clone(), target.method.clone(), signature),
            handler,
        )
    }

    /// Builder form of [`register`](Self::register)
    pub fn with(
        mut self,
        target: &HandlerTarget,
        signature: HandlerSignature,
        handler: Arc<dyn MessageHandler>,
    ) -> Self {
        self.register(target, signature, handler);
        self
    }

    /// Find the adapter for `target`, walking signatures in resolution order
    pub fn resolve(
        &self,
        target: &HandlerTarget,
    ) -> Option<(HandlerSignature, Arc<dyn MessageHandler>)> {
        HandlerSignature::RESOLUTION_ORDER
            .iter()
            .find_map(|signature| {
                self.handlers
                    .get(&(target.class.clone(), target.method.clone(), *signature))
                    .map(|handler| (*signature, Arc::clone(handler)))
            })
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Run a host callback, turning a panic into [`HostError::Panicked`]
pub(crate) fn guarded<T>(context: &str, callback: impl FnOnce() -> HostResult<T>) -> HostResult<T> {
    match panic::catch_unwind(AssertUnwindSafe(callback)) {
        Ok(result) => result,
        Err(payload) => Err(HostError::Panicked {
            context: context.to_string(),
            message: panic_message(payload.as_ref()),
        }),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
