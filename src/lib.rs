/// chatgate - a serializing, self-throttling gateway to an OpenAI-compatible
/// chat-completion endpoint.
///
/// Callers never have more than one completion in flight: every request is
/// queued on a single-concurrency FIFO queue. Calls against the expensive
/// model tier are followed by a cooldown on that queue so that the requests
/// queued behind them wait before hitting the provider again.
///
/// # Architecture
///
/// - `worker::queue` - the single-concurrency FIFO task queue
/// - `ai` - the transport trait, the `reqwest` OpenAI client and its lazy factory
/// - `gateway` - the public entry point wiring the two together
/// - `core` - configuration and payload types
///
/// # Example
///
/// ```no_run
/// use chatgate::ai::RequestOptions;
/// use chatgate::core::models::{ChatRequest, GPT_4, user_message};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     chatgate::setup_logging();
///
///     let request = ChatRequest::new(GPT_4, vec![user_message("Say hello")]);
///     let reply = chatgate::create_chat_completion(request, RequestOptions::default()).await?;
///     println!("{}", reply.first_content().unwrap_or_default());
///
///     Ok(())
/// }
/// ```
// Module declarations
pub mod ai;
pub mod core;
pub mod errors;
pub mod gateway;
pub mod worker;

pub use crate::core::models::{CONTEXT_WINDOW_SIZES, Model, context_window_size, estimate_tokens};
pub use errors::{FailureKind, GatewayError, QueueError, TransportError};
pub use gateway::{ChatGateway, create_chat_completion, default_gateway};

/// Configure structured logging with JSON format.
///
/// The level comes from `RUST_LOG`, defaulting to `info`. Calling this more
/// than once is harmless; only the first call installs a subscriber.
///
/// # Example
///
/// ```
/// chatgate::setup_logging();
/// ```
pub fn setup_logging() {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::prelude::*;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer().json().with_target(true);

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}
