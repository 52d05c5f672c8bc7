//! Exercises the HTTP client against a loopback server.

use openai_adapter::{
    ChatMessage, ChatRequest, FunctionSpec, OpenAiClient, OpenAiConfig, OpenAiError,
};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

struct Reply {
    status: u16,
    headers: Vec<(&'static str, String)>,
    body: String,
}

impl Reply {
    fn json(status: u16, body: &Value) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.to_string(),
        }
    }
}

struct Captured {
    authorization: Option<String>,
    body: Value,
}

/// Serves one canned reply per connection and forwards each request.
async fn serve(replies: Vec<Reply>) -> (String, mpsc::UnboundedReceiver<Captured>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        for reply in replies {
            let (stream, _) = listener.accept().await.unwrap();
            let mut reader = BufReader::new(stream);

            let mut content_length = 0usize;
            let mut authorization = None;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).await.unwrap();
                let line = line.trim_end();
                if line.is_empty() {
                    break;
                }
                if let Some((name, value)) = line.split_once(':') {
                    let name = name.trim().to_ascii_lowercase();
                    if name == "content-length" {
                        content_length = value.trim().parse().unwrap();
                    } else if name == "authorization" {
                        authorization = Some(value.trim().to_string());
                    }
                }
            }

            let mut body = vec![0u8; content_length];
            reader.read_exact(&mut body).await.unwrap();
            let _ = tx.send(Captured {
                authorization,
                body: serde_json::from_slice(&body).unwrap_or(Value::Null),
            });

            let mut head = format!(
                "HTTP/1.1 {} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n",
                reply.status,
                reply.body.len()
            );
            for (name, value) in &reply.headers {
                head.push_str(&format!("{name}: {value}\r\n"));
            }
            head.push_str("\r\n");

            let mut stream = reader.into_inner();
            stream.write_all(head.as_bytes()).await.unwrap();
            stream.write_all(reply.body.as_bytes()).await.unwrap();
            stream.shutdown().await.ok();
        }
    });

    (format!("http://{addr}/v1"), rx)
}

fn client(base_url: String) -> OpenAiClient {
    OpenAiClient::new(
        "sk-test",
        OpenAiConfig {
            base_url,
            timeout: Duration::from_secs(5),
            supports_tools: true,
        },
    )
    .unwrap()
}

fn request() -> ChatRequest {
    ChatRequest::new("gpt-4o-mini")
        .message(ChatMessage::system("Extract the data."))
        .message(ChatMessage::user("Ada Lovelace, 36"))
        .temperature(0.0)
        .output_limit(2048)
        .force_function(FunctionSpec {
            name: "extract_information".into(),
            description: "Extract information according to the schema.".into(),
            parameters: json!({"type": "object", "properties": {"name": {"type": "string"}}}),
        })
}

#[tokio::test]
async fn test_function_call_round_trip() {
    let (base_url, mut seen) = serve(vec![Reply::json(
        200,
        &json!({
            "model": "gpt-4o-mini-2024-07-18",
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "extract_information", "arguments": "{\"name\":\"Ada\"}"}
                    }]
                },
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 30, "completion_tokens": 6, "total_tokens": 36}
        }),
    )])
    .await;

    let completion = client(base_url).chat_completion(&request()).await.unwrap();
    assert_eq!(
        completion.function_arguments("extract_information"),
        Some("{\"name\":\"Ada\"}")
    );

    let captured = seen.recv().await.unwrap();
    assert_eq!(captured.authorization.as_deref(), Some("Bearer sk-test"));
    assert_eq!(captured.body["tool_choice"]["function"]["name"], "extract_information");
    assert_eq!(captured.body["messages"][1]["content"], "Ada Lovelace, 36");
    assert_eq!(captured.body["temperature"], 0.0);
}

#[tokio::test]
async fn test_rate_limit_carries_retry_after() {
    let (base_url, _seen) = serve(vec![Reply {
        status: 429,
        headers: vec![("Retry-After", "3".to_string())],
        body: json!({"error": {"message": "Rate limit reached"}}).to_string(),
    }])
    .await;

    let err = client(base_url).chat_completion(&request()).await.unwrap_err();
    match err {
        OpenAiError::RateLimited {
            message,
            retry_after,
        } => {
            assert_eq!(message, "Rate limit reached");
            assert_eq!(retry_after, Some(Duration::from_secs(3)));
        }
        other => panic!("expected RateLimited, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unauthorized_and_api_errors() {
    let (base_url, _seen) = serve(vec![
        Reply::json(401, &json!({"error": {"message": "Incorrect API key provided"}})),
        Reply::json(400, &json!({"error": {"message": "Invalid schema for function"}})),
    ])
    .await;
    let client = client(base_url);

    let err = client.chat_completion(&request()).await.unwrap_err();
    assert!(matches!(err, OpenAiError::Unauthorized { status: 401, .. }));
    assert!(!err.to_string().contains("sk-test"));

    let err = client.chat_completion(&request()).await.unwrap_err();
    match err {
        OpenAiError::Api { status, message } => {
            assert_eq!(status, 400);
            assert_eq!(message, "Invalid schema for function");
        }
        other => panic!("expected Api, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unparseable_body() {
    let (base_url, _seen) = serve(vec![Reply {
        status: 200,
        headers: Vec::new(),
        body: "not json".to_string(),
    }])
    .await;

    let err = client(base_url).chat_completion(&request()).await.unwrap_err();
    assert!(matches!(err, OpenAiError::Parse(_)));
}

#[tokio::test]
async fn test_unreachable_server_is_network_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = client(format!("http://{addr}/v1"))
        .chat_completion(&request())
        .await
        .unwrap_err();
    assert!(matches!(err, OpenAiError::Network(_) | OpenAiError::Timeout(_)));
}
