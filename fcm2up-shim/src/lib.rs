//! FCM to UnifiedPush token substitution engine
//!
//! Lets an app built for a vendor push service receive its messages through
//! a self-hosted relay and a UnifiedPush distributor instead. The engine:
//!
//! - registers the installation with the on-device distributor
//! - tells the relay where to forward messages and receives a substitute token
//! - hands the substitute token to the app's own "new token" callback once,
//!   without mistaking the echo for a new vendor token
//! - delivers inbound messages to the app's handler, its message service or a
//!   fallback notification
//!
//! State survives restarts in a versioned record (see [`state`]).
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use fcm2up_shim::{Fcm2UpShim, InboundEvent, ShimConfig};
//! use state_store::MemoryBackend;
//!
//! let store = fcm2up_shim::state::open(MemoryBackend::new())?;
//! let shim = Fcm2UpShim::builder(store)
//!     .distributor(Arc::new(MyDistributor))
//!     .token_handler(Arc::new(MyTokenCallback))
//!     .build(ShimConfig::new("com.example.app").with_relay_url("https://relay.example"))?;
//!
//! shim.subscribe();
//! shim.handle_event(InboundEvent::NewDeliveryAddress {
//!     address: "https://ntfy.example/upAbc".to_string(),
//! });
//! ```
//!
//! # Architecture
//!
//! ```text
//! host event ──▶ Fcm2UpShim ──▶ EventRouter
//!                    │              ├── SubscriptionController ──▶ Distributor
//!                    │              ├── TokenController
//!                    │              └── on_message
//!                    │
//!                    └── bounded queue ──▶ worker thread (tokio current_thread)
//!                                            ├── relay /register, /unregister
//!                                            ├── MessageRouter ──▶ handler | service | notifier
//!                                            └── TokenController::reinject ──▶ TokenHandler
//! ```

// Modules
pub mod bridge;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod host;
pub mod logging;
pub mod shim;
pub mod state;
pub mod subscription;
pub mod token;
mod worker;

// Re-exports - Public API
pub use config::{ShimConfig, WorkerConfig};
pub use dispatch::{extract_notification, DispatchOutcome};
pub use error::{Result, ShimError};
pub use events::{EventKind, InboundEvent, RawEvent};
pub use host::{
    ComponentLauncher, Distributor, DistributorRequest, HandlerArgument, HandlerContext,
    HandlerRegistry, HandlerSignature, HostError, HostResult, LocalNotification, LoggingNotifier,
    MessageHandler, Notifier, TokenHandler,
};
pub use shim::{Fcm2UpShim, Fcm2UpShimBuilder};
pub use state::{AppMetadata, HandlerTarget, RegistrationSnapshot, VendorCredentials};
pub use token::{Observation, ReinjectOutcome, TokenController, TokenState};

/// Prelude for glue code
pub mod prelude {
    pub use crate::config::ShimConfig;
    pub use crate::events::InboundEvent;
    pub use crate::host::{
        ComponentLauncher, Distributor, DistributorRequest, HandlerArgument, HandlerContext,
        HandlerRegistry, HandlerSignature, HostError, HostResult, LocalNotification,
        MessageHandler, Notifier, TokenHandler,
    };
    pub use crate::shim::Fcm2UpShim;
    pub use crate::state::HandlerTarget;
}
