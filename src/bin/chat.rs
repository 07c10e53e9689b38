// Command-line entry point: sends each prompt through the process-wide gateway.
//
// Usage: chatgate <model> <prompt> [<prompt>...]

use anyhow::{Context, Result, bail};
use chatgate::ai::RequestOptions;
use chatgate::core::models::{ChatRequest, user_message};
use chatgate::{context_window_size, default_gateway};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    chatgate::setup_logging();

    let mut args = std::env::args().skip(1);
    let Some(model) = args.next() else {
        bail!("usage: chatgate <model> <prompt> [<prompt>...]");
    };
    let prompts: Vec<String> = args.collect();
    if prompts.is_empty() {
        bail!("at least one prompt is required");
    }

    match context_window_size(&model) {
        Some(size) => info!("Using {} (context window {} tokens)", model, size),
        None => warn!("Unknown model {}, no context window on record", model),
    }

    let gateway = default_gateway().context("Failed to configure gateway")?;

    // Submit everything up front; the gateway runs them one at a time.
    let handles = prompts
        .iter()
        .map(|prompt| {
            let request = ChatRequest::new(model.clone(), vec![user_message(prompt)]);
            gateway.submit(request, RequestOptions::default())
        })
        .collect::<Result<Vec<_>, _>>()
        .context("Failed to queue prompts")?;

    for (prompt, handle) in prompts.iter().zip(handles) {
        let reply = handle
            .await
            .with_context(|| format!("Chat completion failed for prompt {prompt:?}"))?;
        println!("{}", reply.first_content().unwrap_or_default());
    }

    Ok(())
}
