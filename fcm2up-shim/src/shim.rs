//! Sync-first shim facade
//!
//! [`Fcm2UpShim`] is what generated glue code talks to. Every entry point is
//! a plain blocking call that returns quickly; network requests, message
//! delivery and token re-injection run on a background worker thread.
//! Entry points never fail: errors are logged and swallowed so nothing here
//! can take the host app down.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use state_store::StateStore;

use crate::bridge::{self, BridgeClient};
use crate::config::ShimConfig;
use crate::dispatch::MessageRouter;
use crate::error::{Result, ShimError};
use crate::events::{EventHandlers, EventRouter, InboundEvent, RawEvent};
use crate::host::{
    ComponentLauncher, Distributor, HandlerContext, HandlerRegistry, LoggingNotifier, Notifier,
    TokenHandler,
};
use crate::logging::redact;
use crate::state::{
    AppMetadata, DeliveryAddress, DistributorId, HandlerTarget, MessageServiceClass,
    RegistrationSnapshot, RelayUrl, VendorCredentials,
};
use crate::subscription::SubscriptionController;
use crate::token::{Observation, TokenController, TokenState};
use crate::worker::{spawn_worker, Command, TokenHandlerSlot, WorkerContext, WorkerHandle};

/// Token substitution and relay synchronization engine for one app
///
/// # Example
///
/// ```rust,ignore
/// use fcm2up_shim::{Fcm2UpShim, InboundEvent, ShimConfig};
/// use state_store::FileBackend;
///
/// let store = fcm2up_shim::state::open(FileBackend::new(data_dir.join("fcm2up.json")))?;
/// let config = ShimConfig::from_json(CONFIG_ASSET)?;
///
/// let shim = Fcm2UpShim::builder(store)
///     .distributor(distributor)
///     .token_handler(token_handler)
///     .build(config)?;
///
/// shim.subscribe();
///
/// // From the distributor receiver
/// shim.handle_event(InboundEvent::NewDeliveryAddress { address });
///
/// // From the vendor SDK's token callback
/// shim.on_new_token(&vendor_token);
/// ```
pub struct Fcm2UpShim {
    app_id: String,
    store: StateStore,
    subscriptions: SubscriptionController,
    tokens: Arc<TokenController>,
    token_handler: TokenHandlerSlot,
    worker: WorkerHandle,
    flush_timeout: Duration,
}

impl Fcm2UpShim {
    /// Start building a shim on top of an opened registration record
    pub fn builder(store: StateStore) -> Fcm2UpShimBuilder {
        Fcm2UpShimBuilder::new(store)
    }

    /// Persist configuration into the registration record
    ///
    /// Does not register with the relay by itself; the next delivery
    /// address or vendor token does. A pending relay token is re-injected
    /// if a token handler is registered.
    pub fn configure(&self, config: ShimConfig) {
        let config = config.normalized();
        if let Err(e) = config.validate() {
            tracing::error!("Ignoring invalid configuration: {}", e);
            return;
        }
        if config.app_id != self.app_id {
            tracing::warn!(
                "app_id is fixed at build time; keeping {} (got {})",
                self.app_id,
                config.app_id
            );
        }

        if let Err(e) = persist_config(&self.store, &config) {
            tracing::error!("Failed to persist configuration: {}", e);
            return;
        }
        tracing::info!("Configuration updated");

        self.schedule_reinject();
    }

    /// Register this installation with the distributor
    pub fn subscribe(&self) {
        if let Err(e) = self.subscriptions.subscribe() {
            tracing::error!("Subscribe failed: {}", e);
        }
    }

    /// Unregister from the distributor and drop all delivery state
    ///
    /// Also asks the relay to stop delivering when one is configured.
    pub fn unsubscribe(&self) {
        let relay_url = self.store.get::<RelayUrl>().map(|u| u.0);

        match self.subscriptions.unsubscribe() {
            Ok(true) => {}
            Ok(false) => return,
            Err(e) => {
                tracing::error!("Unsubscribe failed: {}", e);
                return;
            }
        }

        if let Err(e) = self.tokens.discard_pending() {
            tracing::error!("Failed to clear relay token: {}", e);
        }

        if let Some(relay_url) = relay_url {
            self.submit(Command::UnregisterFromRelay {
                relay_url,
                app_id: self.app_id.clone(),
            });
        }
    }

    /// Entry point for every inbound event
    pub fn handle_event(&self, event: InboundEvent) {
        EventRouter::route(&event, self);
    }

    /// Entry point for events forwarded as JSON
    pub fn handle_event_json(&self, json: &str) {
        match serde_json::from_str::<RawEvent>(json) {
            Ok(raw) => {
                if let Some(event) = InboundEvent::from_raw(raw) {
                    self.handle_event(event);
                }
            }
            Err(e) => tracing::warn!("Ignoring malformed event: {}", e),
        }
    }

    /// Entry point for the vendor SDK's token callback
    pub fn on_new_token(&self, vendor_token: &str) {
        match self.tokens.observe_vendor_token(vendor_token) {
            Ok(Observation::Recorded { .. }) => {
                if self.store.contains::<DeliveryAddress>() {
                    self.register_with_relay();
                }
            }
            Ok(Observation::Ignored | Observation::Empty) => {}
            Err(e) => tracing::error!("Failed to record vendor token: {}", e),
        }
    }

    /// Token the app should present to its backend
    pub fn effective_token(&self) -> Option<String> {
        self.tokens.effective_token()
    }

    /// Claim the relay token if it has not been delivered yet
    ///
    /// Returns it at most once per relay token.
    pub fn deliver_pending_relay_token(&self) -> Option<String> {
        match self.tokens.deliver_pending() {
            Ok(token) => token,
            Err(e) => {
                tracing::error!("Failed to mark relay token delivered: {}", e);
                None
            }
        }
    }

    pub fn token_state(&self) -> TokenState {
        self.tokens.state()
    }

    /// Copy of the registration record
    pub fn snapshot(&self) -> RegistrationSnapshot {
        RegistrationSnapshot::read(&self.store)
    }

    /// Replace the app's token callback and retry a pending re-injection
    pub fn set_token_handler(&self, handler: Arc<dyn TokenHandler>) {
        *self.token_handler.write() = Some(handler);
        self.schedule_reinject();
    }

    /// Wait until work queued so far has finished
    ///
    /// Bounded by the configured flush timeout. Returns false on timeout or
    /// if the worker is gone.
    pub fn flush(&self) -> bool {
        match self.worker.flush(self.flush_timeout) {
            Ok(done) => {
                if !done {
                    tracing::warn!("Flush timed out after {:?}", self.flush_timeout);
                }
                done
            }
            Err(e) => {
                tracing::warn!("Flush failed: {}", e);
                false
            }
        }
    }

    /// Stop the worker after queued work has run
    pub fn shutdown(&self) {
        self.worker.shutdown();
    }

    /// The token state machine, for glue that re-injects tokens itself
    pub fn tokens(&self) -> &TokenController {
        &self.tokens
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    fn register_with_relay(&self) {
        if let Some(job) = bridge::prepare_registration(&self.store, &self.app_id) {
            tracing::debug!("Queueing relay registration for {}", job.request.endpoint);
            self.submit(Command::RegisterWithRelay(job));
        }
    }

    fn schedule_reinject(&self) {
        if self.token_handler.read().is_none() {
            return;
        }
        if self.tokens.state() == TokenState::RelayTokenPending {
            self.submit(Command::Reinject);
        }
    }

    fn submit(&self, command: Command) {
        if let Err(e) = self.worker.submit(command) {
            tracing::error!("Could not queue work: {}", e);
        }
    }
}

impl EventHandlers for Fcm2UpShim {
    fn on_message(&self, payload: &[u8]) {
        self.submit(Command::Dispatch(payload.to_vec()));
    }

    fn on_new_delivery_address(&self, address: &str) {
        if address.is_empty() {
            tracing::warn!("Ignoring empty delivery address");
            return;
        }
        if let Err(e) = self.subscriptions.record_delivery_address(address) {
            tracing::error!("Failed to store delivery address: {}", e);
            return;
        }
        self.register_with_relay();
    }

    fn on_registration_failed(&self, reason: Option<&str>) {
        tracing::warn!(
            "Distributor registration failed: {}",
            reason.unwrap_or("no reason given")
        );
    }

    fn on_unregistered(&self) {
        tracing::info!("Distributor unregistered {}", self.app_id);
        if let Err(e) = self.subscriptions.forget_delivery_address() {
            tracing::error!("Failed to clear delivery address: {}", e);
        }
        if let Err(e) = self.tokens.discard_pending() {
            tracing::error!("Failed to clear relay token: {}", e);
        }
    }

    fn on_new_token(&self, vendor_token: &str) {
        tracing::debug!("Vendor token event {}", redact(vendor_token));
        Fcm2UpShim::on_new_token(self, vendor_token);
    }
}

impl Drop for Fcm2UpShim {
    fn drop(&mut self) {
        tracing::debug!("Fcm2UpShim dropping, state {:?}", self.tokens.state());
        self.worker.request_shutdown();
    }
}

impl std::fmt::Debug for Fcm2UpShim {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fcm2UpShim")
            .field("app_id", &self.app_id)
            .field("token_state", &self.tokens.state())
            .finish()
    }
}

/// Builder for [`Fcm2UpShim`]
pub struct Fcm2UpShimBuilder {
    store: StateStore,
    distributor: Option<Arc<dyn Distributor>>,
    token_handler: Option<Arc<dyn TokenHandler>>,
    handlers: HandlerRegistry,
    launcher: Option<Arc<dyn ComponentLauncher>>,
    notifier: Option<Arc<dyn Notifier>>,
}

impl Fcm2UpShimBuilder {
    pub fn new(store: StateStore) -> Self {
        Self {
            store,
            distributor: None,
            token_handler: None,
            handlers: HandlerRegistry::new(),
            launcher: None,
            notifier: None,
        }
    }

    /// Distributor integration (required)
    pub fn distributor(mut self, distributor: Arc<dyn Distributor>) -> Self {
        self.distributor = Some(distributor);
        self
    }

    /// The app's "new token" callback, used for re-injection
    pub fn token_handler(mut self, handler: Arc<dyn TokenHandler>) -> Self {
        self.token_handler = Some(handler);
        self
    }

    /// Message handler adapters generated for the app
    pub fn message_handlers(mut self, handlers: HandlerRegistry) -> Self {
        self.handlers = handlers;
        self
    }

    pub fn component_launcher(mut self, launcher: Arc<dyn ComponentLauncher>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    /// Notifier for fallback notifications; defaults to logging only
    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Persist `config` and start the worker
    ///
    /// A relay token still pending from a previous run is re-injected.
    pub fn build(self, config: ShimConfig) -> Result<Fcm2UpShim> {
        let config = config.normalized();
        config.validate()?;

        let distributor = self
            .distributor
            .ok_or(ShimError::MissingConfiguration("distributor"))?;

        persist_config(&self.store, &config)?;

        let tokens = Arc::new(TokenController::new(self.store.clone()));
        let token_handler: TokenHandlerSlot = Arc::new(RwLock::new(self.token_handler));
        let router = MessageRouter::new(
            self.handlers,
            self.launcher,
            self.notifier
                .unwrap_or_else(|| Arc::new(LoggingNotifier) as Arc<dyn Notifier>),
            HandlerContext {
                app_id: config.app_id.clone(),
            },
            config.fallback_title.clone(),
        );

        let worker = spawn_worker(
            WorkerContext {
                store: self.store.clone(),
                tokens: Arc::clone(&tokens),
                token_handler: Arc::clone(&token_handler),
                router,
                bridge: BridgeClient::new(&config.worker)?,
            },
            config.worker.queue_capacity,
        )?;

        let shim = Fcm2UpShim {
            subscriptions: SubscriptionController::new(
                self.store.clone(),
                distributor,
                config.app_id.clone(),
            ),
            app_id: config.app_id,
            store: self.store,
            tokens,
            token_handler,
            worker,
            flush_timeout: config.worker.flush_timeout,
        };

        tracing::info!(
            "Shim ready for {} in state {:?}",
            shim.app_id,
            shim.tokens.state()
        );
        shim.schedule_reinject();

        Ok(shim)
    }
}

fn persist_config(store: &StateStore, config: &ShimConfig) -> Result<()> {
    match &config.relay_url {
        Some(url) => store.set(RelayUrl(relay_client::validate_base_url(url)?))?,
        None => store.remove::<RelayUrl>()?,
    };
    store.set(DistributorId(config.distributor_id.clone()))?;

    if config.credentials.is_empty() {
        store.remove::<VendorCredentials>()?;
    } else {
        store.set(config.credentials.clone())?;
    }

    if config.metadata.is_empty() {
        store.remove::<AppMetadata>()?;
    } else {
        store.set(config.metadata.clone())?;
    }

    match &config.handler {
        Some(target) => store.set(target.clone())?,
        None => store.remove::<HandlerTarget>()?,
    };
    match &config.message_service_class {
        Some(class) => store.set(MessageServiceClass(class.clone()))?,
        None => store.remove::<MessageServiceClass>()?,
    };

    Ok(())
}
