mod common;

use common::*;
use serde_json::json;
use shuper::config::ApiKeys;
use shuper::core::types::SessionMode;
use shuper::dispatch::{Dispatcher, SendRequest, TurnState};
use shuper::providers::{STOPPED_BY_USER, StreamAccumulator};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SYNTHESIS_MODEL: &str = "gemini-3-pro-preview";

fn council_dispatcher(server: &MockServer) -> Dispatcher {
    let mut config = config_for(server);
    config.models.council = vec![
        "qwen/qwen3-coder:free".into(),
        "stepfun/step-3.5-flash:free".into(),
        "kimi-k2-0905:free".into(),
    ];
    config.models.synthesis = SYNTHESIS_MODEL.into();
    Dispatcher::with_keys(config, keys())
}

async fn mount_members(server: &MockServer) {
    for (model, answer) in [
        ("qwen/qwen3-coder:free", "Use iter().rev()."),
        ("stepfun/step-3.5-flash:free", "Call v.reverse() in place."),
    ] {
        Mock::given(method("POST"))
            .and(path("/openrouter/chat/completions"))
            .and(body_partial_json(json!({ "model": model })))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(openai_sse(&[answer]), "text/event-stream"),
            )
            .expect(1)
            .mount(server)
            .await;
    }
    Mock::given(method("POST"))
        .and(path("/routeway/chat/completions"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({ "error": { "message": "model overloaded" } })),
        )
        .expect(1)
        .mount(server)
        .await;
}

fn council_request() -> SendRequest {
    SendRequest {
        text: "Best way to reverse a Vec?".into(),
        model: "gemini-3-flash-preview".into(),
        mode: SessionMode::Council,
        ..SendRequest::default()
    }
}

#[tokio::test]
async fn failed_member_is_folded_into_synthesis() {
    let server = MockServer::start().await;
    mount_members(&server).await;
    Mock::given(method("POST"))
        .and(path(gemini_path(SYNTHESIS_MODEL)))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(gemini_sse(&[("Both work; reverse() is in place.", false)]), "text/event-stream"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let mut streamed = String::new();
    let outcome = council_dispatcher(&server)
        .send(council_request(), &mut |acc: &StreamAccumulator| {
            streamed = acc.text.clone()
        })
        .await;

    assert_eq!(outcome.state, TurnState::Completed);
    assert_eq!(outcome.model, "council");
    assert_eq!(streamed, "Both work; reverse() is in place.");
    assert!(outcome.text.starts_with("Both work; reverse() is in place.\n\n---\n\n### Council Records"));
    assert!(outcome.text.contains("<strong>qwen3-coder</strong>"));
    assert!(outcome.text.contains("Error: API Error: 400 - model overloaded"));

    let synthesis = requests_to(&server, &gemini_path(SYNTHESIS_MODEL)).await;
    let body = body_json(&synthesis[0]);
    let contents = body["contents"].as_array().unwrap();
    let prompt = contents.last().unwrap()["parts"][0]["text"].as_str().unwrap();
    assert_eq!(prompt.matches("Response from [").count(), 3);
    assert!(prompt.contains("Response from [kimi-k2-0905:free]:\nError: API Error: 400 - model overloaded"));
    assert!(prompt.contains("\"Best way to reverse a Vec?\""));
}

#[tokio::test]
async fn synthesis_failure_still_returns_records() {
    let server = MockServer::start().await;
    mount_members(&server).await;

    let keys = ApiKeys {
        gemini: None,
        ..keys()
    };
    let mut config = config_for(&server);
    config.models.council = vec![
        "qwen/qwen3-coder:free".into(),
        "stepfun/step-3.5-flash:free".into(),
        "kimi-k2-0905:free".into(),
    ];
    config.models.synthesis = SYNTHESIS_MODEL.into();

    let outcome = Dispatcher::with_keys(config, keys)
        .send(council_request(), &mut |_: &StreamAccumulator| {})
        .await;

    assert_eq!(outcome.state, TurnState::Errored);
    assert!(outcome.text.starts_with("Error: Gemini API key missing."));
    assert!(outcome.text.contains("Call v.reverse() in place."));
}

#[tokio::test]
async fn cancelling_during_fan_out_skips_synthesis() {
    let server = MockServer::start().await;
    for route in ["/openrouter/chat/completions", "/routeway/chat/completions"] {
        Mock::given(method("POST"))
            .and(path(route))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(openai_sse(&["too late"]), "text/event-stream")
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;
    }
    Mock::given(method("POST"))
        .and(path(gemini_path(SYNTHESIS_MODEL)))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(gemini_sse(&[("unused", false)]), "text/event-stream"),
        )
        .expect(0)
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
        ..council_request()
    };
    let outcome = tokio::time::timeout(
        Duration::from_secs(2),
        council_dispatcher(&server).send(request, &mut |_: &StreamAccumulator| {}),
    )
    .await
    .expect("council should stop once cancelled");

    assert_eq!(outcome.state, TurnState::Cancelled);
    assert_eq!(outcome.text, STOPPED_BY_USER);
    assert_eq!(outcome.model, "council");
    assert!(requests_to(&server, &gemini_path(SYNTHESIS_MODEL)).await.is_empty());
}
