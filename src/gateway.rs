//! Chat-completion gateway
//!
//! Every request goes through one [`TaskQueue`], so at most one completion is
//! in flight per gateway. Requests against the expensive model tier are
//! followed by a cooldown on the same queue, which holds back whatever was
//! queued after them without delaying the request's own caller.

use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use tokio::time::sleep;
use tracing::{error, info};

use crate::ai::client::{ChatTransport, OpenAiClient, RequestOptions};
use crate::ai::factory::ClientFactory;
use crate::core::config::GatewayConfig;
use crate::core::models::{ChatRequest, ChatResponse};
use crate::errors::{FailureKind, GatewayError, TransportError};
use crate::worker::queue::{TaskHandle, TaskQueue};

pub struct ChatGateway<C> {
    queue: TaskQueue,
    clients: Arc<ClientFactory<C>>,
    cooldown: Duration,
}

impl<C> ChatGateway<C>
where
    C: ChatTransport + 'static,
{
    #[must_use]
    pub fn new(clients: ClientFactory<C>, queue: TaskQueue, cooldown: Duration) -> Self {
        Self {
            queue,
            clients: Arc::new(clients),
            cooldown,
        }
    }

    #[must_use]
    pub fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    #[must_use]
    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Queue a chat completion and return a handle to its response.
    ///
    /// Scheduling happens here, synchronously: the request and, for the
    /// expensive tier, its trailing cooldown are on the queue before this
    /// returns, whether or not the handle is ever awaited.
    ///
    /// # Errors
    ///
    /// Fails immediately with [`GatewayError::Queue`] if the queue rejects the
    /// task. Failures of the call itself are delivered through the handle.
    pub fn submit(
        &self,
        request: ChatRequest,
        options: RequestOptions,
    ) -> Result<TaskHandle<ChatResponse, GatewayError>, GatewayError> {
        let expensive = request.uses_expensive_model();
        let clients = Arc::clone(&self.clients);

        let work = move || async move {
            let client = clients.get()?;
            client
                .send_chat_completion(&request, &options)
                .await
                .map_err(|e| {
                    log_failure(&request.model, &e);
                    GatewayError::Transport(e)
                })
        };

        let handle = if expensive {
            let cooldown = self.cooldown;
            self.queue.enqueue_with_trailer(work, async move {
                info!("Cooling down for {:?} after expensive model call", cooldown);
                sleep(cooldown).await;
            })?
        } else {
            self.queue.enqueue(work)?
        };

        Ok(handle)
    }

    /// Queue a chat completion and wait for its response.
    ///
    /// # Errors
    ///
    /// Returns the transport failure unchanged as [`GatewayError::Transport`],
    /// [`GatewayError::MissingCredentials`] if the client cannot be built, or
    /// [`GatewayError::Queue`] if the request could not be queued.
    pub async fn create_chat_completion(
        &self,
        request: ChatRequest,
        options: RequestOptions,
    ) -> Result<ChatResponse, GatewayError> {
        self.submit(request, options)?.await
    }
}

impl ChatGateway<OpenAiClient> {
    /// Gateway backed by [`OpenAiClient`], built lazily from the environment.
    #[must_use]
    pub fn from_config(config: GatewayConfig) -> Self {
        let queue = match config.queue_capacity {
            Some(capacity) => TaskQueue::with_capacity(capacity),
            None => TaskQueue::new(),
        };
        let cooldown = config.expensive_cooldown;
        Self::new(ClientFactory::from_env(config), queue, cooldown)
    }
}

/// Log a transport failure under its classification and return it.
pub fn log_failure(model: &str, failure: &TransportError) -> FailureKind {
    let kind = FailureKind::classify(failure);
    match kind {
        FailureKind::ContextWindowExceeded => {
            error!(model, kind = %kind, "ERROR: context window is full.");
        }
        FailureKind::RateLimited => {
            error!(model, kind = %kind, "ERROR: rate limited.");
        }
        FailureKind::UnknownFailure => {
            error!(model, kind = %kind, "ERROR: {}", failure);
        }
    }
    kind
}

static DEFAULT_GATEWAY: Lazy<Result<ChatGateway<OpenAiClient>, String>> =
    Lazy::new(|| GatewayConfig::from_env().map(ChatGateway::<OpenAiClient>::from_config));

/// The process-wide gateway, configured from the environment on first use.
///
/// # Errors
///
/// [`GatewayError::Config`] if the environment holds an invalid setting.
pub fn default_gateway() -> Result<&'static ChatGateway<OpenAiClient>, GatewayError> {
    DEFAULT_GATEWAY
        .as_ref()
        .map_err(|e| GatewayError::Config(e.clone()))
}

/// Send a chat completion through the process-wide gateway.
///
/// # Errors
///
/// See [`ChatGateway::create_chat_completion`] and [`default_gateway`].
pub async fn create_chat_completion(
    request: ChatRequest,
    options: RequestOptions,
) -> Result<ChatResponse, GatewayError> {
    default_gateway()?.submit(request, options)?.await
}
