//! Recording host fakes shared by the integration tests

#![allow(dead_code)]

use std::sync::Arc;

use fcm2up_shim::prelude::*;
use fcm2up_shim::WorkerConfig;
use parking_lot::Mutex;
use state_store::{MemoryBackend, StateStore};

pub const APP_ID: &str = "com.example.app";
pub const ADDRESS: &str = "https://d.example/abc";

#[derive(Default)]
pub struct RecordingDistributor {
    pub registered: Mutex<Vec<(String, DistributorRequest)>>,
    pub unregistered: Mutex<Vec<(String, DistributorRequest)>>,
}

impl Distributor for RecordingDistributor {
    fn register(&self, distributor_id: &str, request: &DistributorRequest) -> HostResult {
        self.registered
            .lock()
            .push((distributor_id.to_string(), request.clone()));
        Ok(())
    }

    fn unregister(&self, distributor_id: &str, request: &DistributorRequest) -> HostResult {
        self.unregistered
            .lock()
            .push((distributor_id.to_string(), request.clone()));
        Ok(())
    }
}

/// Token callback that records tokens and can echo them back into the shim
#[derive(Default)]
pub struct RecordingTokenHandler {
    pub tokens: Mutex<Vec<String>>,
    pub fail: bool,
}

impl TokenHandler for RecordingTokenHandler {
    fn on_new_token(&self, token: &str) -> HostResult {
        self.tokens.lock().push(token.to_string());
        if self.fail {
            return Err(HostError::failed("onNewToken threw"));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub shown: Mutex<Vec<LocalNotification>>,
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: &LocalNotification) -> HostResult {
        self.shown.lock().push(notification.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingMessageHandler {
    pub payloads: Mutex<Vec<Vec<u8>>>,
}

impl MessageHandler for RecordingMessageHandler {
    fn handle(&self, _context: Option<&HandlerContext>, argument: HandlerArgument<'_>) -> HostResult {
        let bytes = match argument {
            HandlerArgument::Bytes(bytes) => bytes.to_vec(),
            HandlerArgument::Text(text) => text.as_bytes().to_vec(),
        };
        self.payloads.lock().push(bytes);
        Ok(())
    }
}

/// A shim wired to recording fakes
pub struct Harness {
    pub shim: Fcm2UpShim,
    pub backend: MemoryBackend,
    pub store: StateStore,
    pub distributor: Arc<RecordingDistributor>,
    pub notifier: Arc<RecordingNotifier>,
}

impl Harness {
    pub fn config() -> ShimConfig {
        ShimConfig::new(APP_ID).with_worker(WorkerConfig::new().with_timeouts(
            std::time::Duration::from_secs(2),
            std::time::Duration::from_secs(2),
        ))
    }

    pub fn new(config: ShimConfig, token_handler: Option<Arc<dyn TokenHandler>>) -> Self {
        Self::with_backend(MemoryBackend::new(), config, token_handler)
    }

    pub fn with_backend(
        backend: MemoryBackend,
        config: ShimConfig,
        token_handler: Option<Arc<dyn TokenHandler>>,
    ) -> Self {
        let store = fcm2up_shim::state::open(backend.clone()).unwrap();
        let distributor = Arc::new(RecordingDistributor::default());
        let notifier = Arc::new(RecordingNotifier::default());

        let mut builder = Fcm2UpShim::builder(store.clone())
            .distributor(distributor.clone())
            .notifier(notifier.clone());
        if let Some(handler) = token_handler {
            builder = builder.token_handler(handler);
        }

        Self {
            shim: builder.build(config).unwrap(),
            backend,
            store,
            distributor,
            notifier,
        }
    }

    pub fn new_address(&self, address: &str) {
        self.shim.handle_event(InboundEvent::NewDeliveryAddress {
            address: address.to_string(),
        });
    }
}
