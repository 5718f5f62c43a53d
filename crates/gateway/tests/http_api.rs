mod common;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tower::ServiceExt;

use sv_gateway::api;
use sv_gateway::state::AppState;

use common::{harness, SURVEY_CODE};

fn app(state: AppState) -> Router {
    api::router(state.clone()).with_state(state)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn json_body(resp: axum::response::Response) -> Value {
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_reports_ok() {
    let h = harness(20);
    let resp = app(h.state.clone()).oneshot(get("/v1/health")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;
    assert_eq!(body["status"], "ok");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn join_then_chat() {
    let h = harness(20);
    h.model.push_text("Welcome! How do you commute?");

    let resp = app(h.state.clone())
        .oneshot(post_json("/v1/survey/join", json!({ "survey_code": "commute" })))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let joined = json_body(resp).await;
    assert_eq!(joined["survey_title"], "Commuting habits");
    assert_eq!(joined["opening_message"], "Welcome! How do you commute?");
    let token = joined["session_token"].as_str().unwrap().to_string();
    assert_eq!(token.len(), 64);

    h.model.push_text("Got it, thanks.");
    let resp = app(h.state.clone())
        .oneshot(post_json(
            "/v1/survey/chat",
            json!({ "session_token": token, "message": "By bike" }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let turn = json_body(resp).await;
    assert_eq!(turn["response"], "Got it, thanks.");
    assert_eq!(turn["is_complete"], false);
    assert_eq!(turn["events"], json!([]));

    let resp = app(h.state.clone())
        .oneshot(get(&format!("/v1/survey/transcript?session_token={token}")))
        .await
        .unwrap();
    let transcript = json_body(resp).await;
    assert_eq!(transcript["records"].as_array().unwrap().len(), 3);
    assert_eq!(transcript["status"], "active");
}

#[tokio::test]
async fn join_failure_falls_back_to_fixed_greeting() {
    let h = harness(20);
    h.model.push(common::Scripted::Fail("down".into()));

    let resp = app(h.state.clone())
        .oneshot(post_json("/v1/survey/join", json!({ "survey_code": SURVEY_CODE })))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let joined = json_body(resp).await;
    assert_eq!(
        joined["opening_message"],
        h.state.config.conversation.fallback_greeting.as_str()
    );
}

#[tokio::test]
async fn unknown_code_is_404() {
    let h = harness(20);
    let resp = app(h.state.clone())
        .oneshot(post_json("/v1/survey/join", json!({ "survey_code": "NOPE" })))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(resp).await["code"], "not_found");
}

#[tokio::test]
async fn failure_after_commit_is_a_storage_error() {
    let h = harness(20);
    let token = h.join().await;
    let conv_id = h.conversation_id(&token);

    // The conversation store writes through a sibling temp file; a directory
    // in its place makes the post-append counter update fail.
    let tmp = h.state.config.storage.state_path.join("conversations.json.tmp");
    std::fs::create_dir_all(&tmp).unwrap();

    h.model.push_text("Noted.");
    let resp = app(h.state.clone())
        .oneshot(post_json(
            "/v1/survey/chat",
            json!({ "session_token": token, "message": "By bus" }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json_body(resp).await["code"], "storage");

    // The exchange itself was recorded.
    assert_eq!(h.state.transcripts.read(&conv_id).unwrap().len(), 3);
}

#[tokio::test]
async fn stream_endpoint_speaks_sse() {
    let h = harness(20);
    let token = h.join().await;
    h.model.push_text("Streaming reply");

    let resp = app(h.state.clone())
        .oneshot(post_json(
            "/v1/survey/chat/stream",
            json!({ "conversationToken": token, "messageText": "hi" }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let content_type = resp.headers()[header::CONTENT_TYPE].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/event-stream"));

    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("event: text_chunk"));
    assert!(text.contains("event: turn_complete"));
    assert!(text.contains(r#""type":"turn_complete""#));
}

#[tokio::test]
async fn stream_rejection_is_a_plain_409() {
    let h = harness(20);
    let token = h.join().await;
    let survey_id = h.survey_id();
    sv_gateway::runtime::admin::close_survey(&h.state, &survey_id).unwrap();

    let resp = app(h.state.clone())
        .oneshot(post_json(
            "/v1/survey/chat/stream",
            json!({ "session_token": token, "message": "hi" }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    assert_eq!(json_body(resp).await["code"], "state_conflict");
}

#[tokio::test]
async fn admin_routes_require_the_token_when_configured() {
    let mut h = harness(20);
    h.state.admin_token_hash = Some(Sha256::digest(b"s3cret").to_vec());

    let resp = app(h.state.clone()).oneshot(get("/v1/surveys")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let req = Request::builder()
        .uri("/v1/surveys")
        .header(header::AUTHORIZATION, "Bearer s3cret")
        .body(Body::empty())
        .unwrap();
    let resp = app(h.state.clone()).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;
    assert_eq!(body["count"], 1);
    assert_eq!(body["surveys"][0]["code"], SURVEY_CODE);

    // Participant routes stay open.
    let resp = app(h.state.clone()).oneshot(get("/v1/health")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn results_close_and_reopen() {
    let h = harness(20);
    let token = h.join().await;
    let survey_id = h.survey_id();

    let resp = app(h.state.clone())
        .oneshot(get(&format!("/v1/surveys/{survey_id}/results")))
        .await
        .unwrap();
    let results = json_body(resp).await;
    assert_eq!(results["stats"]["total_participants"], 1);
    assert_eq!(results["stats"]["active_participants"], 1);
    assert_eq!(results["participants"][0]["message_count"], 1);

    let resp = app(h.state.clone())
        .oneshot(post_json(&format!("/v1/surveys/{survey_id}/close"), json!({})))
        .await
        .unwrap();
    let closed = json_body(resp).await;
    assert_eq!(closed["abandoned"], 1);
    assert_eq!(closed["survey"]["status"], "closed");
    assert!(closed["survey"]["closed_at"].is_string());

    let resp = app(h.state.clone())
        .oneshot(post_json("/v1/survey/join", json!({ "survey_code": SURVEY_CODE })))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    let resp = app(h.state.clone())
        .oneshot(post_json(&format!("/v1/surveys/{survey_id}/reopen"), json!({})))
        .await
        .unwrap();
    let reopened = json_body(resp).await;
    assert_eq!(reopened["status"], "active");
    assert!(reopened["closed_at"].is_null());

    // The abandoned conversation stays ended.
    let conv = h.state.conversations.get_by_token(&token).unwrap();
    assert!(!conv.is_active());
}

#[tokio::test]
async fn analysis_chat_records_history_only_on_success() {
    let h = harness(20);
    h.join().await;
    let survey_id = h.survey_id();

    h.model.push(common::Scripted::Fail("down".into()));
    let resp = app(h.state.clone())
        .oneshot(post_json(
            &format!("/v1/surveys/{survey_id}/analyze"),
            json!({ "message": "What stands out?" }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);

    h.model.push_text("Most people commute by train.");
    let resp = app(h.state.clone())
        .oneshot(post_json(
            &format!("/v1/surveys/{survey_id}/analyze"),
            json!({ "message": "What stands out?" }),
        ))
        .await
        .unwrap();
    assert_eq!(json_body(resp).await["response"], "Most people commute by train.");

    let req = h.model.last_request().unwrap();
    assert!(req.directive.starts_with("You are a survey data analyst."));
    assert!(req.directive.contains("--- ALL CONVERSATIONS ---"));

    let resp = app(h.state.clone())
        .oneshot(get(&format!("/v1/surveys/{survey_id}/analysis-history")))
        .await
        .unwrap();
    let history = json_body(resp).await;
    let messages = history["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["role"], "user");
    assert_eq!(messages[1]["content"], "Most people commute by train.");
}

#[tokio::test]
async fn insights_endpoint_uses_camel_case() {
    let h = harness(20);
    let survey_id = h.survey_id();
    let resp = app(h.state.clone())
        .oneshot(get(&format!("/v1/surveys/{survey_id}/insights?force=true")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;
    assert_eq!(body["wasCached"], false);
    assert!(body["generatedAt"].is_string());
    assert_eq!(body["snapshot"]["themes"], json!([]));
}
