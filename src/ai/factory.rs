//! Lazily constructed, process-shared API client.

use std::env;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use tracing::{error, info};

use super::client::OpenAiClient;
use crate::core::config::{API_KEY_VAR, GatewayConfig};
use crate::errors::GatewayError;

type CredentialSource = Box<dyn Fn() -> Option<String> + Send + Sync>;
type Builder<C> = Box<dyn Fn(String) -> Result<C, GatewayError> + Send + Sync>;

/// Builds the client on first use and hands out the same handle afterwards.
///
/// Credentials are read inside the first `get`, not at construction, so the
/// factory can exist before the secret is loaded. A failed build caches
/// nothing; the next `get` tries again.
pub struct ClientFactory<C> {
    cell: OnceCell<Arc<C>>,
    credential_name: String,
    credentials: CredentialSource,
    build: Builder<C>,
}

impl<C> ClientFactory<C> {
    pub fn new<S, B>(credential_name: impl Into<String>, credentials: S, build: B) -> Self
    where
        S: Fn() -> Option<String> + Send + Sync + 'static,
        B: Fn(String) -> Result<C, GatewayError> + Send + Sync + 'static,
    {
        Self {
            cell: OnceCell::new(),
            credential_name: credential_name.into(),
            credentials: Box::new(credentials),
            build: Box::new(build),
        }
    }

    /// Wrap an already built client.
    pub fn ready(client: C) -> Self {
        Self {
            cell: OnceCell::with_value(Arc::new(client)),
            credential_name: String::new(),
            credentials: Box::new(|| None),
            build: Box::new(|_| Err(GatewayError::Client("client already built".to_string()))),
        }
    }

    /// The shared client, building it if this is the first successful call.
    ///
    /// Concurrent first callers block until one of them finishes the build.
    ///
    /// # Errors
    ///
    /// [`GatewayError::MissingCredentials`] when the secret is absent or
    /// empty, or whatever the builder returns.
    pub fn get(&self) -> Result<Arc<C>, GatewayError> {
        self.cell
            .get_or_try_init(|| {
                let api_key = (self.credentials)()
                    .filter(|key| !key.trim().is_empty())
                    .ok_or_else(|| {
                        error!("{} is not configured!", self.credential_name);
                        GatewayError::MissingCredentials(self.credential_name.clone())
                    })?;

                let client = (self.build)(api_key)?;
                info!("API client initialized");
                Ok(Arc::new(client))
            })
            .map(Arc::clone)
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.cell.get().is_some()
    }
}

impl ClientFactory<OpenAiClient> {
    /// Factory reading `OPENAI_API_KEY` from the environment on first use.
    #[must_use]
    pub fn from_env(config: GatewayConfig) -> Self {
        Self::new(
            API_KEY_VAR,
            || env::var(API_KEY_VAR).ok(),
            move |api_key| OpenAiClient::new(api_key, &config),
        )
    }
}
