use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chatgate::ai::{ChatTransport, ClientFactory, RequestOptions};
use chatgate::core::models::{ChatRequest, ChatResponse, GPT_3_5_TURBO, user_message};
use chatgate::worker::TaskQueue;
use chatgate::{ChatGateway, GatewayError, TransportError};

/// Rejects every request with the status given in the `max_tokens` field.
struct RejectingTransport;

#[async_trait]
impl ChatTransport for RejectingTransport {
    async fn send_chat_completion(
        &self,
        request: &ChatRequest,
        _options: &RequestOptions,
    ) -> Result<ChatResponse, TransportError> {
        let status = request.extra["max_tokens"].as_u64().unwrap() as u16;
        Err(TransportError::with_status(status, format!("provider said {status}")))
    }
}

#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_each_failure_class_is_logged_and_delivered() {
    let logs = LogBuffer::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let gateway = ChatGateway::new(
        ClientFactory::ready(RejectingTransport),
        TaskQueue::new(),
        Duration::from_secs(10),
    );

    for status in [400u16, 429, 500] {
        let request = ChatRequest::new(GPT_3_5_TURBO, vec![user_message("hi")])
            .with_field("max_tokens", serde_json::json!(status));
        let err = gateway
            .create_chat_completion(request, RequestOptions::default())
            .await
            .unwrap_err();

        match err {
            GatewayError::Transport(e) => {
                assert_eq!(e.status, Some(status));
                assert_eq!(e.message, format!("provider said {status}"));
            }
            other => panic!("expected transport error, got {other:?}"),
        }
    }

    let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
    assert!(output.contains("ERROR: context window is full."));
    assert!(output.contains("context_window_exceeded"));
    assert!(output.contains("ERROR: rate limited."));
    assert!(output.contains("rate_limited"));
    assert!(output.contains("provider said 500"));
    assert!(output.contains("unknown_failure"));
}
