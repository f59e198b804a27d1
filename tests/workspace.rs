mod common;

use common::*;
use serde_json::json;
use shuper::core::types::{ChatTurn, Role, SessionStatus};
use shuper::dispatch::TurnState;
use shuper::providers::{STOPPED_BY_USER, StreamAccumulator};
use shuper::store::{FileStore, MemoryStore, SessionStore};
use shuper::workspace::{TurnOptions, Workspace};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn workspace(server: &MockServer) -> Workspace {
    Workspace::new(
        Arc::new(dispatcher(server)),
        SessionStore::new(Arc::new(MemoryStore::new())),
    )
}

fn options() -> TurnOptions {
    TurnOptions {
        model: "gemini-3-flash-preview".into(),
        ..TurnOptions::default()
    }
}

async fn mount_gemini(server: &MockServer, parts: &[(&str, bool)]) {
    Mock::given(method("POST"))
        .and(path(gemini_path("gemini-3-flash-preview")))
        .respond_with(ResponseTemplate::new(200).set_body_raw(gemini_sse(parts), "text/event-stream"))
        .mount(server)
        .await;
}

#[tokio::test]
async fn directives_update_session_and_are_stripped() {
    let server = MockServer::start().await;
    mount_gemini(
        &server,
        &[("Shipped the fix. [[STATUS: done]] [[TITLE: Parser Fix]] [[LABEL: research]]", false)],
    )
    .await;

    let ws = workspace(&server);
    let mut session = ws.open_session(Some("s1"));
    let report = ws
        .send_turn(&mut session, "Please fix the parser", options(), &mut |_: &StreamAccumulator| {})
        .await;

    assert_eq!(report.outcome.state, TurnState::Completed);
    assert_eq!(report.text, "Shipped the fix.");
    assert_eq!(report.effects.len(), 3);
    assert_eq!(session.status, SessionStatus::Done);
    assert_eq!(session.title, "Parser Fix");
    assert_eq!(session.label_ids, vec!["2"]);

    assert_eq!(session.turns.len(), 2);
    assert_eq!(session.turns[0].role, Role::User);
    assert_eq!(session.turns[1].text, "Shipped the fix.");
    assert_eq!(session.turns[1].model.as_deref(), Some("gemini-3-flash-preview"));

    let stored = ws.store().load("s1").unwrap();
    assert_eq!(stored.title, "Parser Fix");
    assert_eq!(stored.turns.len(), 2);
    assert!(!ws.is_sending("s1"));
}

#[tokio::test]
async fn first_message_names_the_session() {
    let server = MockServer::start().await;
    mount_gemini(&server, &[("Sure.", false)]).await;

    let ws = workspace(&server);
    let mut session = ws.open_session(None);
    ws.send_turn(
        &mut session,
        "Summarise the quarterly planning notes for the team",
        options(),
        &mut |_: &StreamAccumulator| {},
    )
    .await;
    assert_eq!(session.title, "Summarise the quarterly planni...");
}

#[tokio::test]
async fn reasoning_without_answer_gets_a_notice() {
    let server = MockServer::start().await;
    mount_gemini(&server, &[("Thinking it over.", true), ("[[STATUS: todo]]", false)]).await;

    let ws = workspace(&server);
    let mut session = ws.open_session(Some("s2"));
    let report = ws
        .send_turn(&mut session, "hmm", options(), &mut |_: &StreamAccumulator| {})
        .await;

    assert_eq!(report.text, "(The model returned reasoning but no answer text.)");
    assert_eq!(session.turns[1].reasoning.as_deref(), Some("Thinking it over."));
}

#[tokio::test]
async fn cancel_stops_the_active_send() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(gemini_path("gemini-3-flash-preview")))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(gemini_sse(&[("too late", false)]), "text/event-stream")
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let ws = workspace(&server);
    let mut session = ws.open_session(Some("s3"));
    let mut ignore = |_: &StreamAccumulator| {};
    let send = ws.send_turn(&mut session, "long task", options(), &mut ignore);
    let stop = async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(ws.is_sending("s3"));
        assert!(ws.cancel("s3"));
    };
    let (report, _) = tokio::join!(send, stop);

    assert_eq!(report.outcome.state, TurnState::Cancelled);
    assert_eq!(report.text, STOPPED_BY_USER);
    assert!(!ws.is_sending("s3"));
    assert!(!ws.cancel("s3"));
}

#[tokio::test]
async fn retitle_and_label_suggestion_use_the_title_model() {
    let server = MockServer::start().await;
    mount_gemini(&server, &[("\"Vec Reversal Tips\"", false)]).await;

    let ws = workspace(&server);
    let mut session = ws.open_session(Some("s4"));
    session.turns = vec![ChatTurn::user("How do I reverse a Vec?"), ChatTurn::model("Call reverse().")];

    assert_eq!(ws.retitle(&mut session).await, "Vec Reversal Tips");
    assert_eq!(session.title, "Vec Reversal Tips");

    server.reset().await;
    mount_gemini(&server, &[("[\"1\", \"42\"]", false)]).await;
    assert_eq!(ws.auto_label(&mut session).await, vec!["1"]);
    assert_eq!(session.label_ids, vec!["1"]);
    assert!(ws.auto_label(&mut session).await.is_empty());
}

#[tokio::test]
async fn cancel_stops_a_pending_retitle() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(gemini_path("gemini-3-flash-preview")))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(gemini_sse(&[("Too Late Title", false)]), "text/event-stream")
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let ws = workspace(&server);
    let mut session = ws.open_session(Some("s5"));
    session.title = "Draft".into();
    session.turns = vec![ChatTurn::user("How do I reverse a Vec?")];

    let retitle = tokio::time::timeout(Duration::from_secs(2), ws.retitle(&mut session));
    let stop = async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(ws.is_sending("s5"));
        assert!(ws.cancel("s5"));
    };
    let (title, _) = tokio::join!(retitle, stop);

    assert_eq!(title.expect("retitle should stop once cancelled"), "Draft");
    assert_eq!(session.title, "Draft");
    assert!(!ws.is_sending("s5"));
}

#[tokio::test]
async fn file_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("sessions.json");

    let store = FileStore::with_delay(&file, Duration::from_millis(20)).unwrap();
    let sessions = SessionStore::new(Arc::new(store));
    let mut session = shuper::Session::new("kept");
    session.title = "Roadmap".into();
    sessions.save(&session).unwrap();
    sessions.flush().await.unwrap();

    let raw: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&file).unwrap()).unwrap();
    assert_eq!(raw["shuper_sessions"]["kept"]["title"], json!("Roadmap"));

    let reopened = SessionStore::new(Arc::new(FileStore::open(&file).unwrap()));
    assert_eq!(reopened.load("kept").unwrap().title, "Roadmap");
}
