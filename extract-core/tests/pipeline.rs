use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use extract_core::prelude::*;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
enum Reply {
    Answer(&'static str),
    Fail(ClientError),
    Slow(Duration, &'static str),
    CancelThenAnswer(CancellationToken, &'static str),
}

/// In-memory backend replaying a script; the last reply repeats once the script runs out.
struct ScriptedClient {
    script: Mutex<VecDeque<Reply>>,
    last: Mutex<Option<Reply>>,
    requests: Mutex<Vec<ExtractionRequest>>,
    constrained: bool,
}

impl ScriptedClient {
    fn new(replies: Vec<Reply>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(replies.into()),
            last: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
            constrained: true,
        })
    }

    fn without_constrained_calls(replies: Vec<Reply>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(replies.into()),
            last: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
            constrained: false,
        })
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn requests(&self) -> Vec<ExtractionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExtractionClient for ScriptedClient {
    fn supports_constrained_calls(&self) -> bool {
        self.constrained
    }

    async fn send(&self, request: &ExtractionRequest) -> Result<ExtractionResponse, ClientError> {
        self.requests.lock().unwrap().push(request.clone());
        let reply = {
            let next = self.script.lock().unwrap().pop_front();
            let mut last = self.last.lock().unwrap();
            if let Some(reply) = next {
                *last = Some(reply.clone());
                reply
            } else {
                last.clone().expect("script is empty")
            }
        };

        let mechanism = if request.tool.is_some() {
            ResponseMechanism::ConstrainedCall
        } else {
            ResponseMechanism::FreeForm
        };

        match reply {
            Reply::Answer(raw) => Ok(ExtractionResponse::new(raw, mechanism)),
            Reply::Fail(error) => Err(error),
            Reply::Slow(delay, raw) => {
                tokio::time::sleep(delay).await;
                Ok(ExtractionResponse::new(raw, mechanism))
            }
            Reply::CancelThenAnswer(token, raw) => {
                token.cancel();
                Ok(ExtractionResponse::new(raw, mechanism))
            }
        }
    }
}

fn fast_config() -> ExtractionConfig {
    ExtractionConfig::default().with_backoff(Duration::ZERO, Duration::ZERO)
}

fn name_schema() -> Schema {
    Schema::from_value(json!({
        "type": "object",
        "properties": {"name": {"type": "string"}},
        "required": ["name"]
    }))
    .unwrap()
}

fn integer_schema() -> Schema {
    Schema::from_value(json!({
        "type": "object",
        "properties": {"a": {"type": "integer"}}
    }))
    .unwrap()
}

#[tokio::test]
async fn test_prose_wrapped_answer_is_accepted_in_embedded_mode() {
    let client = ScriptedClient::without_constrained_calls(vec![Reply::Answer(
        "Sure! Here is the JSON: {\"a\":1}\n Hope that helps!",
    )]);
    let pipeline = ExtractionPipeline::with_config(client.clone(), fast_config());

    let extraction = pipeline.extract(&integer_schema(), "a is one").await.unwrap();

    assert_eq!(extraction.value, json!({"a": 1}));
    assert_eq!(extraction.mode, ExtractionMode::EmbeddedSchema);
    assert_eq!(extraction.mechanism, ResponseMechanism::FreeForm);
    assert!(client.requests()[0].tool.is_none());
}

#[tokio::test]
async fn test_type_mismatch_is_not_accepted() {
    let client = ScriptedClient::new(vec![Reply::Answer("{\"a\": \"one\"}")]);
    let pipeline =
        ExtractionPipeline::with_config(client.clone(), fast_config().with_max_attempts(1));

    let err = pipeline.extract(&integer_schema(), "a is one").await.unwrap_err();

    let ExtractionError::RetryBudgetExhausted { last_failure, .. } = err else {
        panic!("expected exhaustion, got {err:?}");
    };
    assert!(matches!(last_failure, ValidationFailure::SchemaMismatch { .. }));
    assert_eq!(last_failure.primary_path(), Some("a"));
}

#[tokio::test]
async fn test_empty_text_with_no_required_fields_succeeds() {
    let client = ScriptedClient::new(vec![Reply::Answer("{}")]);
    let pipeline = ExtractionPipeline::with_config(client.clone(), fast_config());

    let extraction = pipeline.extract(&integer_schema(), "").await.unwrap();

    assert_eq!(extraction.value, json!({}));
    assert_eq!(client.requests()[0].source_text(), "");
}

#[tokio::test]
async fn test_persistent_mismatch_exhausts_budget_with_path() {
    let client = ScriptedClient::new(vec![Reply::Answer("{\"name\": 42}")]);
    let pipeline = ExtractionPipeline::with_config(client.clone(), fast_config());

    let err = pipeline.extract(&name_schema(), "Name: forty-two").await.unwrap_err();

    assert_eq!(client.calls(), 3);
    let ExtractionError::RetryBudgetExhausted {
        attempts,
        max_attempts,
        last_failure,
        history,
        metrics,
    } = &err
    else {
        panic!("expected exhaustion, got {err:?}");
    };
    assert_eq!((*attempts, *max_attempts), (3, 3));
    assert_eq!(history.len(), 3);
    assert_eq!(metrics.total_attempts, 3);
    assert_eq!(last_failure.raw(), "{\"name\": 42}");

    let ValidationFailure::SchemaMismatch { violations, .. } = last_failure else {
        panic!("expected mismatch");
    };
    assert_eq!(
        violations[0],
        Violation::Mismatch {
            path: "name".into(),
            expected: "string".into(),
            found: "integer".into(),
        }
    );

    let report = err.diagnostic();
    assert!(report.contains("corrective retry 3/3"));
    assert!(report.contains("failing path: name"));
    assert!(report.contains("last response: {\"name\": 42}"));
}

#[tokio::test]
async fn test_each_corrective_prompt_describes_the_previous_failure() {
    let client = ScriptedClient::new(vec![
        Reply::Answer("no json here"),
        Reply::Answer("{\"name\": 42}"),
        Reply::Answer("{\"name\": \"Ada\"}"),
    ]);
    let pipeline =
        ExtractionPipeline::with_config(client.clone(), fast_config().with_max_attempts(5));

    let extraction = pipeline.extract(&name_schema(), "My name is Ada").await.unwrap();

    assert_eq!(extraction.value, json!({"name": "Ada"}));
    assert_eq!(extraction.metrics.total_attempts, 3);

    let requests = client.requests();
    assert_eq!(requests.len(), 3);
    assert!(!requests[0].system_instruction().contains("Attempt"));
    assert!(requests[1].system_instruction().contains("Attempt 1/5"));
    assert!(requests[1].system_instruction().contains("no json here"));
    assert!(requests[2].system_instruction().contains("Attempt 2/5"));
    assert!(requests[2]
        .system_instruction()
        .contains("at 'name': expected string, got integer"));
    for request in &requests {
        assert_eq!(request.source_text(), "My name is Ada");
    }
}

#[tokio::test]
async fn test_transport_failures_use_their_own_budget() {
    let client = ScriptedClient::new(vec![
        Reply::Fail(ClientError::Transport("connection reset".into())),
        Reply::Fail(ClientError::RateLimited {
            message: "slow down".into(),
            retry_after: Some(Duration::ZERO),
        }),
        Reply::Answer("{\"name\": \"Ada\"}"),
    ]);
    let pipeline =
        ExtractionPipeline::with_config(client.clone(), fast_config().with_max_attempts(1));

    let extraction = pipeline.extract(&name_schema(), "Ada").await.unwrap();

    assert_eq!(client.calls(), 3);
    assert_eq!(extraction.metrics.total_attempts, 1);
    assert_eq!(extraction.metrics.transport_retries, 2);
}

#[tokio::test]
async fn test_transport_budget_exhaustion_is_fatal() {
    let client = ScriptedClient::new(vec![Reply::Fail(ClientError::Transport(
        "unreachable".into(),
    ))]);
    let pipeline = ExtractionPipeline::with_config(
        client.clone(),
        fast_config().with_max_transport_retries(2),
    );

    let err = pipeline.extract(&name_schema(), "Ada").await.unwrap_err();

    assert_eq!(client.calls(), 3);
    assert!(matches!(
        err,
        ExtractionError::Transport { attempt: 1, calls: 3, .. }
    ));
}

#[tokio::test]
async fn test_provider_errors_are_not_retried() {
    let client = ScriptedClient::new(vec![Reply::Fail(ClientError::Provider {
        status: 400,
        message: "invalid schema for function".into(),
    })]);
    let pipeline = ExtractionPipeline::with_config(client.clone(), fast_config());

    let err = pipeline.extract(&name_schema(), "Ada").await.unwrap_err();

    assert_eq!(client.calls(), 1);
    assert!(matches!(err, ExtractionError::Provider { status: 400, .. }));
}

#[tokio::test]
async fn test_timeout_is_a_transport_error() {
    let client = ScriptedClient::new(vec![Reply::Slow(
        Duration::from_secs(5),
        "{\"name\": \"Ada\"}",
    )]);
    let config = fast_config()
        .with_request_timeout(Duration::from_millis(20))
        .with_max_transport_retries(0);
    let pipeline = ExtractionPipeline::with_config(client.clone(), config);

    let err = pipeline.extract(&name_schema(), "Ada").await.unwrap_err();

    let ExtractionError::Transport { message, .. } = err else {
        panic!("expected transport error, got {err:?}");
    };
    assert!(message.contains("timed out"));
}

#[tokio::test]
async fn test_cancelled_run_makes_no_call() {
    let client = ScriptedClient::new(vec![Reply::Answer("{\"name\": \"Ada\"}")]);
    let pipeline = ExtractionPipeline::with_config(client.clone(), fast_config());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = pipeline
        .extract_with_cancel(&name_schema(), "Ada", &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, ExtractionError::Cancelled { .. }));
    assert_eq!(client.calls(), 0);
}

#[tokio::test]
async fn test_cancellation_during_flight_discards_answer() {
    let cancel = CancellationToken::new();
    let client = ScriptedClient::new(vec![Reply::CancelThenAnswer(
        cancel.clone(),
        "{\"name\": \"Ada\"}",
    )]);
    let pipeline = ExtractionPipeline::with_config(client.clone(), fast_config());

    let err = pipeline
        .extract_with_cancel(&name_schema(), "Ada", &cancel)
        .await
        .unwrap_err();

    assert_eq!(client.calls(), 1);
    let ExtractionError::Cancelled { stage } = err else {
        panic!("expected cancellation, got {err:?}");
    };
    assert!(stage.contains("in flight"));
}

#[tokio::test]
async fn test_forced_constrained_mode_falls_back_without_support() {
    let client =
        ScriptedClient::without_constrained_calls(vec![Reply::Answer("{\"name\": \"Ada\"}")]);
    let pipeline = ExtractionPipeline::with_config(
        client.clone(),
        fast_config().with_mode(ExtractionMode::ConstrainedCall),
    );

    let extraction = pipeline.extract(&name_schema(), "Ada").await.unwrap();

    assert_eq!(extraction.mode, ExtractionMode::EmbeddedSchema);
    assert!(client.requests()[0].system_instruction().contains("\"name\""));
}

#[tokio::test]
async fn test_constrained_mode_sends_tool_declaration() {
    let client = ScriptedClient::new(vec![Reply::Answer("{\"name\": \"Ada\"}")]);
    let pipeline = ExtractionPipeline::with_config(client.clone(), fast_config())
        .prompts(PromptBuilder::new().with_model("test-model").with_max_output_tokens(256));

    let extraction = pipeline.extract(&name_schema(), "Ada").await.unwrap();

    assert_eq!(extraction.mechanism, ResponseMechanism::ConstrainedCall);
    let request = &client.requests()[0];
    assert_eq!(request.model, "test-model");
    assert_eq!(request.max_output_tokens, 256);
    assert_eq!(request.tool.as_ref().unwrap().name, "extract_information");
}

#[derive(Debug, Deserialize, JsonSchema, PartialEq)]
struct Contact {
    name: String,
    email: Option<String>,
}

#[tokio::test]
async fn test_extract_typed() {
    let client = ScriptedClient::new(vec![Reply::Answer(
        "{\"name\": \"Ada\", \"email\": \"ada@example.com\"}",
    )]);
    let pipeline = ExtractionPipeline::with_config(client.clone(), fast_config());

    let (contact, metrics) = pipeline
        .extract_typed::<Contact>("Ada, ada@example.com")
        .await
        .unwrap();

    assert_eq!(
        contact,
        Contact {
            name: "Ada".into(),
            email: Some("ada@example.com".into()),
        }
    );
    assert_eq!(metrics.total_attempts, 1);
}

#[tokio::test]
async fn test_independent_runs_share_one_pipeline() {
    let client = ScriptedClient::new(vec![Reply::Answer("{\"name\": \"Ada\"}")]);
    let pipeline = ExtractionPipeline::with_config(client.clone(), fast_config());
    let schema = name_schema();

    let (a, b) = tokio::join!(
        pipeline.extract(&schema, "first"),
        pipeline.extract(&schema, "second")
    );

    let (a, b) = (a.unwrap(), b.unwrap());
    assert_ne!(a.run_id, b.run_id);
    assert_eq!(client.calls(), 2);
}

#[tokio::test]
async fn test_successful_values_satisfy_the_schema() {
    let client = ScriptedClient::new(vec![Reply::Answer("```json\n{\"name\": \"Ada\"}\n```")]);
    let pipeline = ExtractionPipeline::with_config(client, fast_config());
    let schema = name_schema();

    let extraction = pipeline.extract(&schema, "Ada").await.unwrap();

    let reparsed: serde_json::Value =
        serde_json::from_str(&serde_json::to_string(&extraction.value).unwrap()).unwrap();
    assert_eq!(reparsed, extraction.value);
    assert!(schema.is_valid(&reparsed));
}
