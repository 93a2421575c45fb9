//! Registration with the on-device distributor
//!
//! The distributor never answers synchronously. A successful `subscribe()`
//! shows up later as a new delivery address event, and that event is the
//! only thing that ever records an address.

use std::sync::Arc;

use state_store::StateStore;
use uuid::Uuid;

use crate::error::Result;
use crate::host::{guarded, Distributor, DistributorRequest};
use crate::logging::redact;
use crate::state::{self, DeliveryAddress, SubscriptionToken};

pub struct SubscriptionController {
    store: StateStore,
    distributor: Arc<dyn Distributor>,
    app_id: String,
}

impl SubscriptionController {
    pub fn new(store: StateStore, distributor: Arc<dyn Distributor>, app_id: impl Into<String>) -> Self {
        Self {
            store,
            distributor,
            app_id: app_id.into(),
        }
    }

    /// Ask the distributor to register this installation
    ///
    /// Generates the subscription token on first use and reuses it
    /// afterwards. Returns the token sent.
    pub fn subscribe(&self) -> Result<String> {
        let token = match self.store.get::<SubscriptionToken>() {
            Some(SubscriptionToken(token)) if !token.is_empty() => token,
            _ => {
                let token = Uuid::new_v4().to_string();
                self.store.set(SubscriptionToken(token.clone()))?;
                tracing::info!("Generated subscription token {}", redact(&token));
                token
            }
        };

        let distributor_id = state::distributor_id(&self.store);
        let request = self.request(&token);
        tracing::debug!("Registering {} with distributor {}", self.app_id, distributor_id);
        guarded("distributor register", || {
            self.distributor.register(&distributor_id, &request)
        })?;

        Ok(token)
    }

    /// Ask the distributor to drop this installation and forget it locally
    ///
    /// No-op without a subscription token. Local state is cleared even when
    /// the distributor request fails. Returns whether anything was
    /// unregistered.
    pub fn unsubscribe(&self) -> Result<bool> {
        let Some(SubscriptionToken(token)) = self.store.get::<SubscriptionToken>() else {
            tracing::debug!("Not subscribed; nothing to unregister");
            return Ok(false);
        };

        let distributor_id = state::distributor_id(&self.store);
        let request = self.request(&token);
        if let Err(e) = guarded("distributor unregister", || {
            self.distributor.unregister(&distributor_id, &request)
        }) {
            tracing::warn!("Distributor unregister failed, clearing local state anyway: {}", e);
        }

        self.store.remove::<SubscriptionToken>()?;
        self.store.remove::<DeliveryAddress>()?;
        tracing::info!("Unsubscribed {}", self.app_id);
        Ok(true)
    }

    /// Record the address the distributor assigned; returns whether it changed
    pub fn record_delivery_address(&self, address: &str) -> Result<bool> {
        let changed = self.store.set(DeliveryAddress(address.to_string()))?;
        if changed {
            tracing::info!("New delivery address {}", address);
        }
        Ok(changed)
    }

    /// Forget the delivery address after the distributor dropped us
    ///
    /// The subscription token is kept so a later `subscribe()` reuses it.
    pub fn forget_delivery_address(&self) -> Result<bool> {
        self.store.remove::<DeliveryAddress>().map_err(Into::into)
    }

    fn request(&self, token: &str) -> DistributorRequest {
        DistributorRequest {
            token: token.to_string(),
            application: self.app_id.clone(),
        }
    }
}

impl std::fmt::Debug for SubscriptionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionController")
            .field("app_id", &self.app_id)
            .finish()
    }
}
