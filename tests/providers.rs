mod common;

use common::*;
use serde_json::json;
use shuper::core::types::SessionMode;
use shuper::dispatch::{SendRequest, TurnState};
use shuper::providers::{STOPPED_BY_USER, StreamAccumulator};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn sse(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body, "text/event-stream")
}

fn send(model: &str, mode: SessionMode) -> SendRequest {
    SendRequest {
        text: "How do I reverse a Vec?".into(),
        model: model.into(),
        mode,
        ..SendRequest::default()
    }
}

#[tokio::test]
async fn gemini_stream_uses_query_key_and_sse() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(gemini_path("gemini-3-flash-preview")))
        .and(query_param("key", "gemini-key"))
        .and(query_param("alt", "sse"))
        .and(body_partial_json(json!({
            "generationConfig": { "thinkingConfig": { "thinkingBudget": 0 } }
        })))
        .respond_with(sse(gemini_sse(&[("Use ", false), ("`v.reverse()`", false)])))
        .expect(1)
        .mount(&server)
        .await;

    let mut updates = Vec::new();
    let outcome = dispatcher(&server)
        .send(
            send("gemini-3-flash-preview", SessionMode::Explore),
            &mut |acc: &StreamAccumulator| updates.push(acc.text.clone()),
        )
        .await;

    assert_eq!(outcome.state, TurnState::Completed);
    assert_eq!(outcome.text, "Use `v.reverse()`");
    assert_eq!(outcome.model, "gemini-3-flash-preview");
    assert_eq!(updates, vec!["Use ", "Use `v.reverse()`"]);
}

#[tokio::test]
async fn execute_mode_upgrades_model_and_collects_thoughts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(gemini_path("gemini-3-pro-preview")))
        .and(body_partial_json(json!({
            "generationConfig": { "thinkingConfig": { "thinkingBudget": 32768 } }
        })))
        .respond_with(sse(gemini_sse(&[
            ("Weighing options.", true),
            ("Call reverse().", false),
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = dispatcher(&server)
        .send(
            send("gemini-flash-latest", SessionMode::Execute),
            &mut |_: &StreamAccumulator| {},
        )
        .await;

    assert_eq!(outcome.model, "gemini-3-pro-preview");
    assert_eq!(outcome.text, "Call reverse().");
    assert_eq!(outcome.reasoning.as_deref(), Some("Weighing options."));

    let requests = requests_to(&server, &gemini_path("gemini-3-pro-preview")).await;
    let body = body_json(&requests[0]);
    let system = body["systemInstruction"]["parts"][0]["text"].as_str().unwrap();
    assert!(system.contains("CURRENT MODE: EXECUTE"));
}

#[tokio::test]
async fn aggregators_are_routed_by_model_list() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/routeway/chat/completions"))
        .and(header("authorization", "Bearer routeway-key"))
        .respond_with(sse(openai_sse(&["from routeway"])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/openrouter/chat/completions"))
        .and(header("authorization", "Bearer primary"))
        .and(header("x-title", "Shuper Workspace"))
        .and(body_partial_json(json!({
            "model": "qwen/qwen3-coder:free",
            "stream": true,
            "reasoning_effort": "high"
        })))
        .respond_with(sse(openai_sse(&["from ", "openrouter"])))
        .expect(1)
        .mount(&server)
        .await;

    let d = dispatcher(&server);
    let routeway = d
        .send(send("kimi-k2-0905:free", SessionMode::Explore), &mut |_: &StreamAccumulator| {})
        .await;
    let openrouter = d
        .send(send("qwen/qwen3-coder:free", SessionMode::Execute), &mut |_: &StreamAccumulator| {})
        .await;

    assert_eq!(routeway.text, "from routeway");
    assert_eq!(openrouter.text, "from openrouter");

    let routeway_body = body_json(&requests_to(&server, "/routeway/chat/completions").await[0]);
    assert!(routeway_body.get("reasoning_effort").is_none());
    assert_eq!(routeway_body["messages"][0]["role"], "system");
}

#[tokio::test]
async fn quota_on_primary_key_retries_once_with_alternate() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/openrouter/chat/completions"))
        .and(header("authorization", "Bearer primary"))
        .respond_with(
            ResponseTemplate::new(429).set_body_json(json!({ "error": { "message": "Rate limit exceeded" } })),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/openrouter/chat/completions"))
        .and(header("authorization", "Bearer alt"))
        .respond_with(sse(openai_sse(&["served by alt"])))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = dispatcher(&server)
        .send(send("qwen/qwen3-coder:free", SessionMode::Explore), &mut |_: &StreamAccumulator| {})
        .await;

    assert_eq!(outcome.state, TurnState::Completed);
    assert_eq!(outcome.text, "served by alt");
}

#[tokio::test]
async fn quota_on_both_keys_is_reported_after_two_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/openrouter/chat/completions"))
        .respond_with(
            ResponseTemplate::new(429).set_body_json(json!({ "error": { "message": "Rate limit exceeded" } })),
        )
        .expect(2)
        .mount(&server)
        .await;

    let outcome = dispatcher(&server)
        .send(send("qwen/qwen3-coder:free", SessionMode::Explore), &mut |_: &StreamAccumulator| {})
        .await;

    assert!(outcome.is_error());
    assert_eq!(outcome.text, "Error: API Error: 429 - Rate limit exceeded");
}

#[tokio::test]
async fn rejected_request_surfaces_provider_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/routeway/chat/completions"))
        .respond_with(ResponseTemplate::new(400).set_body_string("upstream exploded"))
        .mount(&server)
        .await;

    let outcome = dispatcher(&server)
        .send(send("kimi-k2-0905:free", SessionMode::Explore), &mut |_: &StreamAccumulator| {})
        .await;

    assert_eq!(outcome.state, TurnState::Errored);
    assert_eq!(outcome.text, "Error: API Error: 400 - upstream exploded");
}

#[tokio::test]
async fn cancelling_mid_stream_stops_updates() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/openrouter/chat/completions"))
        .respond_with(sse(openai_sse(&["one ", "two ", "three"])))
        .mount(&server)
        .await;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let mut seen = 0;
    let request = SendRequest {
        cancel,
        ..send("qwen/qwen3-coder:free", SessionMode::Explore)
    };
    let outcome = dispatcher(&server)
        .send(request, &mut |_: &StreamAccumulator| {
            seen += 1;
            trigger.cancel();
        })
        .await;

    assert_eq!(seen, 1);
    assert_eq!(outcome.state, TurnState::Cancelled);
    assert_eq!(outcome.text, STOPPED_BY_USER);
}

#[tokio::test]
async fn cancelling_before_headers_returns_promptly() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(gemini_path("gemini-3-flash-preview")))
        .respond_with(sse(gemini_sse(&[("late", false)])).set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let request = SendRequest {
        cancel,
        ..send("gemini-3-flash-preview", SessionMode::Explore)
    };
    let outcome = tokio::time::timeout(
        Duration::from_secs(2),
        dispatcher(&server).send(request, &mut |_: &StreamAccumulator| {}),
    )
    .await
    .expect("send should stop once cancelled");

    assert_eq!(outcome.state, TurnState::Cancelled);
    assert_eq!(outcome.text, STOPPED_BY_USER);
}
