//! Background worker thread
//!
//! Spawns a thread with its own tokio runtime that runs relay requests,
//! message dispatch and token re-injection off the event thread. Jobs are
//! processed one at a time in submission order, so relay results are never
//! applied out of order.

use std::sync::{mpsc as std_mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use state_store::StateStore;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::bridge::{BridgeClient, RelayJob};
use crate::dispatch::{DispatchTargets, MessageRouter};
use crate::error::{Result, ShimError};
use crate::host::TokenHandler;
use crate::token::{ReinjectOutcome, TokenController};

/// Slot holding the app's token callback, replaceable at runtime
pub(crate) type TokenHandlerSlot = Arc<RwLock<Option<Arc<dyn TokenHandler>>>>;

/// Jobs sent from the facade to the background worker
pub(crate) enum Command {
    /// Register the delivery address with the relay
    RegisterWithRelay(RelayJob),
    /// Tell the relay to stop delivering
    UnregisterFromRelay { relay_url: String, app_id: String },
    /// Deliver a message payload to the app
    Dispatch(Vec<u8>),
    /// Re-inject a pending relay token
    Reinject,
    /// Acknowledge once every earlier job is done
    Flush(std_mpsc::Sender<()>),
    /// Shutdown the worker
    Shutdown,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::RegisterWithRelay(job) => f
                .debug_tuple("RegisterWithRelay")
                .field(&job.relay_url)
                .finish(),
            Command::UnregisterFromRelay { relay_url, app_id } => f
                .debug_struct("UnregisterFromRelay")
                .field("relay_url", relay_url)
                .field("app_id", app_id)
                .finish(),
            Command::Dispatch(payload) => f.debug_tuple("Dispatch").field(&payload.len()).finish(),
            Command::Reinject => f.write_str("Reinject"),
            Command::Flush(_) => f.write_str("Flush"),
            Command::Shutdown => f.write_str("Shutdown"),
        }
    }
}

/// Everything a worker needs to run jobs
pub(crate) struct WorkerContext {
    pub store: StateStore,
    pub tokens: Arc<TokenController>,
    pub token_handler: TokenHandlerSlot,
    pub router: MessageRouter,
    pub bridge: BridgeClient,
}

/// Sending side of the worker plus its thread
pub(crate) struct WorkerHandle {
    command_tx: Mutex<Option<mpsc::Sender<Command>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl WorkerHandle {
    /// Queue a job without blocking
    pub fn submit(&self, command: Command) -> Result<()> {
        let command_tx = self.command_tx.lock();
        let Some(command_tx) = command_tx.as_ref() else {
            return Err(ShimError::WorkerDisconnected);
        };
        command_tx.try_send(command).map_err(|e| match e {
            TrySendError::Full(command) => {
                tracing::warn!("Worker queue full, dropping {:?}", command);
                ShimError::QueueFull
            }
            TrySendError::Closed(_) => ShimError::WorkerDisconnected,
        })
    }

    /// Wait until every job queued so far has run
    ///
    /// Returns false if the worker did not catch up within `timeout`.
    pub fn flush(&self, timeout: Duration) -> Result<bool> {
        let (ack_tx, ack_rx) = std_mpsc::channel();
        self.submit(Command::Flush(ack_tx))?;
        Ok(ack_rx.recv_timeout(timeout).is_ok())
    }

    /// Stop the worker and wait for its thread
    ///
    /// Jobs queued before the call still run. Safe to call more than once
    /// and from the worker thread itself, which is not joined.
    pub fn shutdown(&self) {
        // Closing the channel stops the worker even when the queue is full
        if let Some(command_tx) = self.command_tx.lock().take() {
            let _ = command_tx.try_send(Command::Shutdown);
        }

        let Some(handle) = self.thread.lock().take() else {
            return;
        };
        if handle.thread().id() == thread::current().id() {
            return;
        }
        if handle.join().is_err() {
            tracing::error!("Worker thread panicked");
        }
    }

    /// Ask the worker to stop without waiting
    pub fn request_shutdown(&self) {
        if let Some(command_tx) = self.command_tx.lock().take() {
            let _ = command_tx.try_send(Command::Shutdown);
        }
    }
}

/// Spawns the background worker thread
pub(crate) fn spawn_worker(context: WorkerContext, queue_capacity: usize) -> Result<WorkerHandle> {
    let (command_tx, command_rx) = mpsc::channel(queue_capacity);

    let thread = thread::Builder::new()
        .name("fcm2up-worker".to_string())
        .spawn(move || {
            let rt = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    tracing::error!("Failed to create tokio runtime for shim worker: {}", e);
                    return;
                }
            };

            rt.block_on(run_worker(context, command_rx));
        })
        .map_err(ShimError::WorkerSpawn)?;

    Ok(WorkerHandle {
        command_tx: Mutex::new(Some(command_tx)),
        thread: Mutex::new(Some(thread)),
    })
}

async fn run_worker(context: WorkerContext, mut command_rx: mpsc::Receiver<Command>) {
    tracing::info!("Shim worker started");

    while let Some(command) = command_rx.recv().await {
        tracing::debug!("Worker: {:?}", command);
        match command {
            Command::RegisterWithRelay(job) => register_with_relay(&context, &job).await,
            Command::UnregisterFromRelay { relay_url, app_id } => {
                match context.bridge.unregister(&relay_url, &app_id).await {
                    Ok(()) => tracing::info!("Relay stopped delivery for {}", app_id),
                    Err(e) => tracing::warn!("Relay unregister failed: {}", e),
                }
            }
            Command::Dispatch(payload) => {
                let targets = DispatchTargets::read(&context.store);
                let outcome = context.router.dispatch(&targets, &payload);
                tracing::debug!("Message dispatched: {:?}", outcome);
            }
            Command::Reinject => reinject(&context),
            Command::Flush(ack) => {
                let _ = ack.send(());
            }
            Command::Shutdown => {
                tracing::info!("Worker received shutdown command");
                break;
            }
        }
    }

    tracing::info!("Shim worker shut down");
}

async fn register_with_relay(context: &WorkerContext, job: &RelayJob) {
    let token = match context.bridge.register(job).await {
        Ok(Some(token)) => token,
        Ok(None) => {
            tracing::info!("Relay accepted {} without assigning a token", job.request.endpoint);
            return;
        }
        Err(e) if e.is_transient() => {
            tracing::warn!("Relay registration failed, waiting for next trigger: {}", e);
            return;
        }
        Err(e) => {
            tracing::error!("Relay registration rejected: {}", e);
            return;
        }
    };

    match context.tokens.apply_relay_token(&token) {
        Ok(true) => reinject(context),
        Ok(false) => {}
        Err(e) => tracing::error!("Failed to store relay token: {}", e),
    }
}

fn reinject(context: &WorkerContext) {
    let handler = context.token_handler.read().clone();
    match context.tokens.reinject(handler.as_deref()) {
        Ok(ReinjectOutcome::Failed(e)) => {
            tracing::warn!("Relay token re-injection failed, will retry: {}", e)
        }
        Ok(outcome) => tracing::debug!("Re-injection: {:?}", outcome),
        Err(e) => tracing::error!("Re-injection could not update state: {}", e),
    }
}
