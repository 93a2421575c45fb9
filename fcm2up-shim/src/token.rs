//! Token substitution state machine
//!
//! Decides which token the app should present to its backend and moves a
//! relay-issued token into the app's own token callback exactly once.
//!
//! ```text
//! NoToken ──vendor token──▶ VendorTokenObserved
//!    │                             │
//!    └────────relay token──────────┴──▶ RelayTokenPending ──delivered──▶ RelayTokenActive
//!                                          ▲                                  │
//!                                          └──────────new relay token─────────┘
//! ```
//!
//! While a relay token is being handed to the app, a re-entrancy depth is
//! raised. The app typically answers a new token by calling back into
//! [`TokenController::observe_vendor_token`]; while any delivery is in
//! progress that call is ignored instead of being recorded as a fresh vendor
//! token.

use parking_lot::Mutex;
use state_store::{Batch, StateStore};

use crate::error::Result;
use crate::host::{guarded, HostError, TokenHandler};
use crate::logging::redact;
use crate::state::{DeliveryAddress, RelayToken, TokenDelivered, VendorToken};

/// Where the installation is in the substitution lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenState {
    /// No token has been seen
    NoToken,
    /// Only a vendor token is known
    VendorTokenObserved,
    /// The relay assigned a token that has not reached the app yet
    RelayTokenPending,
    /// The relay token has been delivered to the app
    RelayTokenActive,
}

/// Result of [`TokenController::observe_vendor_token`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// The call came from our own re-injection and was ignored
    Ignored,
    /// The token was empty and was ignored
    Empty,
    /// The token was stored
    Recorded { changed: bool },
}

/// Result of [`TokenController::reinject`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReinjectOutcome {
    /// No token handler is registered; the relay token stays pending
    NoHandler,
    /// There is no undelivered relay token
    NothingPending,
    /// The handler accepted the token
    Delivered(String),
    /// The handler failed; the relay token is pending again
    Failed(HostError),
}

#[derive(Debug, Default)]
struct DeliveryGuard {
    // Deliveries in progress; several may overlap
    reinjecting: usize,
}

impl DeliveryGuard {
    fn is_reinjecting(&self) -> bool {
        self.reinjecting > 0
    }
}

/// Owns the token fields of the registration record
///
/// Mutating sequences run under one lock, which also guards the
/// re-entrancy depth. The lock is never held while host code runs.
#[derive(Debug)]
pub struct TokenController {
    store: StateStore,
    guard: Mutex<DeliveryGuard>,
}

impl TokenController {
    pub fn new(store: StateStore) -> Self {
        Self {
            store,
            guard: Mutex::new(DeliveryGuard::default()),
        }
    }

    /// Record a token reported by the vendor SDK
    ///
    /// Ignored while a re-injection is in progress.
    pub fn observe_vendor_token(&self, token: &str) -> Result<Observation> {
        let guard = self.guard.lock();
        if guard.is_reinjecting() {
            tracing::debug!("Ignoring token {} reported during re-injection", redact(token));
            return Ok(Observation::Ignored);
        }

        if token.is_empty() {
            tracing::warn!("Ignoring empty vendor token");
            return Ok(Observation::Empty);
        }

        let changed = self.store.set(VendorToken(token.to_string()))?;
        if changed {
            tracing::info!("Observed vendor token {}", redact(token));
        }
        Ok(Observation::Recorded { changed })
    }

    /// Token the app should present to its backend
    ///
    /// A non-empty relay token always wins over the vendor token.
    pub fn effective_token(&self) -> Option<String> {
        self.relay_token()
            .or_else(|| self.store.get::<VendorToken>().map(|t| t.0).filter(|t| !t.is_empty()))
    }

    /// Store a token assigned by the relay
    ///
    /// The token is discarded when no delivery address is recorded any more,
    /// which happens when the installation was unregistered while the relay
    /// request was in flight. Returns whether the token was stored.
    ///
    /// The token and its cleared delivered flag are committed together, so a
    /// failed write never leaves a fresh token marked as delivered.
    pub fn apply_relay_token(&self, token: &str) -> Result<bool> {
        let _guard = self.guard.lock();

        if !self.store.contains::<DeliveryAddress>() {
            tracing::info!(
                "Discarding relay token {}: installation is no longer registered",
                redact(token)
            );
            return Ok(false);
        }

        let mut batch = Batch::new();
        batch
            .set(RelayToken(token.to_string()))?
            .set(TokenDelivered(false))?;
        self.store.commit(batch)?;
        tracing::info!("Relay assigned token {}", redact(token));
        Ok(true)
    }

    /// Claim the undelivered relay token, at most once
    ///
    /// The delivered flag is persisted before the token is returned, so a
    /// second call observes it and returns `None`.
    pub fn deliver_pending(&self) -> Result<Option<String>> {
        let _guard = self.guard.lock();
        self.claim_pending()
    }

    /// Hand the pending relay token to the app's token callback
    ///
    /// The delivered flag is set first, then the re-entrancy depth is raised,
    /// then the handler runs. The depth is lowered again however the handler
    /// returns. If the handler fails the token becomes pending again,
    /// unless the relay assigned another one meanwhile.
    pub fn reinject(&self, handler: Option<&dyn TokenHandler>) -> Result<ReinjectOutcome> {
        let Some(handler) = handler else {
            if self.state() == TokenState::RelayTokenPending {
                tracing::info!("No token handler registered; relay token stays pending");
            }
            return Ok(ReinjectOutcome::NoHandler);
        };

        let token = {
            let mut guard = self.guard.lock();
            match self.claim_pending()? {
                Some(token) => {
                    guard.reinjecting += 1;
                    token
                }
                None => return Ok(ReinjectOutcome::NothingPending),
            }
        };

        let result = {
            let _reentry = ReentryGuard { controller: self };
            guarded("token handler", || handler.on_new_token(&token))
        };

        match result {
            Ok(()) => {
                tracing::info!("Re-injected relay token {}", redact(&token));
                Ok(ReinjectOutcome::Delivered(token))
            }
            Err(e) => {
                tracing::error!("Token handler failed for {}: {}", redact(&token), e);
                self.restore_pending(&token)?;
                Ok(ReinjectOutcome::Failed(e))
            }
        }
    }

    /// Mark the installation as re-injecting until the guard drops
    ///
    /// For glue that claims a token with [`deliver_pending`](Self::deliver_pending)
    /// and calls the app itself. Guards nest: vendor tokens are ignored until
    /// the last outstanding guard drops, including one held by a concurrent
    /// [`reinject`](Self::reinject).
    pub fn begin_reinjection(&self) -> ReentryGuard<'_> {
        self.guard.lock().reinjecting += 1;
        ReentryGuard { controller: self }
    }

    /// Forget the relay token and its delivery state
    pub fn discard_pending(&self) -> Result<()> {
        let _guard = self.guard.lock();
        let removed = self.store.contains::<RelayToken>();
        let mut batch = Batch::new();
        batch.remove::<RelayToken>().remove::<TokenDelivered>();
        self.store.commit(batch)?;
        if removed {
            tracing::info!("Discarded relay token");
        }
        Ok(())
    }

    pub fn state(&self) -> TokenState {
        if self.relay_token().is_some() {
            if self.is_delivered() {
                TokenState::RelayTokenActive
            } else {
                TokenState::RelayTokenPending
            }
        } else if self.store.get::<VendorToken>().is_some_and(|t| !t.0.is_empty()) {
            TokenState::VendorTokenObserved
        } else {
            TokenState::NoToken
        }
    }

    /// Whether a relay token is being handed to the app right now
    pub fn is_delivering(&self) -> bool {
        self.guard.lock().is_reinjecting()
    }

    fn relay_token(&self) -> Option<String> {
        self.store
            .get::<RelayToken>()
            .map(|t| t.0)
            .filter(|t| !t.is_empty())
    }

    fn is_delivered(&self) -> bool {
        self.store.get::<TokenDelivered>().is_some_and(|d| d.0)
    }

    // Caller holds the guard lock
    fn claim_pending(&self) -> Result<Option<String>> {
        let Some(token) = self.relay_token() else {
            return Ok(None);
        };
        if self.is_delivered() {
            return Ok(None);
        }
        self.store.set(TokenDelivered(true))?;
        Ok(Some(token))
    }

    fn restore_pending(&self, token: &str) -> Result<()> {
        let _guard = self.guard.lock();
        if self.relay_token().as_deref() == Some(token) {
            self.store.set(TokenDelivered(false))?;
        }
        Ok(())
    }
}

/// Keeps the re-entrancy depth raised while alive
#[must_use = "the re-entrancy depth is lowered when the guard drops"]
pub struct ReentryGuard<'a> {
    controller: &'a TokenController,
}

impl Drop for ReentryGuard<'_> {
    fn drop(&mut self) {
        let mut guard = self.controller.guard.lock();
        guard.reinjecting = guard.reinjecting.saturating_sub(1);
    }
}
