mod common;

use std::time::Duration;

use serde_json::json;

use sv_domain::event::ChatEvent;
use sv_domain::survey::ConversationStatus;
use sv_domain::tool::{ContentBlock, Message, Role};
use sv_gateway::runtime::turn::TurnSummary;
use sv_gateway::runtime::{admin, start_turn, TurnError, TurnInput};

use sv_domain::capability::MediaKind;

use common::{harness, harness_with, slow_media, staggered_media, Scripted};

fn input(token: &str, message: &str) -> TurnInput {
    TurnInput {
        session_token: token.to_string(),
        message: message.to_string(),
    }
}

async fn run(h: &common::Harness, token: &str, message: &str) -> Vec<ChatEvent> {
    let mut rx = start_turn(h.state.clone(), input(token, message)).unwrap();
    let mut events = Vec::new();
    while let Some(e) = rx.recv().await {
        events.push(e);
    }
    events
}

fn text_of(events: &[ChatEvent]) -> (usize, String) {
    let chunks: Vec<&str> = events
        .iter()
        .filter_map(|e| match e {
            ChatEvent::TextChunk { text } => Some(text.as_str()),
            _ => None,
        })
        .collect();
    (chunks.len(), chunks.concat())
}

#[tokio::test]
async fn text_reply_is_chunked_in_order() {
    let h = harness(20);
    let token = h.join().await;

    let reply = "I take the 7:40 train, then walk."; // 33 chars
    h.model.push_text(reply);
    let events = run(&h, &token, "Mostly by train.").await;

    let (count, text) = text_of(&events);
    assert_eq!(count, 4); // ceil(33 / 10)
    assert_eq!(text, reply);
    assert_eq!(events.last(), Some(&ChatEvent::TurnComplete { is_complete: false }));
}

#[tokio::test]
async fn multibyte_text_is_never_split_inside_a_char() {
    let h = harness(20);
    let token = h.join().await;

    let reply = "Ça coûte cher, le métro à Zürich 🚇";
    h.model.push_text(reply);
    let events = run(&h, &token, "It's expensive").await;

    let (count, text) = text_of(&events);
    assert_eq!(count, reply.chars().count().div_ceil(10));
    assert_eq!(text, reply);
}

#[tokio::test]
async fn tool_only_reply_commits_placeholder_and_replay() {
    let h = harness(20);
    let token = h.join().await;
    let conv_id = h.conversation_id(&token);

    h.model.push(Scripted::Blocks(vec![ContentBlock::tool_call(
        "call_1",
        "show_image",
        json!({ "query": "crowded train platform" }),
    )]));
    let events = run(&h, &token, "Trains are packed").await;

    assert_eq!(events.len(), 2);
    match &events[0] {
        ChatEvent::Media { url, caption, .. } => {
            assert!(url.starts_with("https://img.test/photo"));
            assert_eq!(caption.as_deref(), Some("crowded train platform photo"));
        }
        other => panic!("expected media, got {other:?}"),
    }
    assert_eq!(events[1], ChatEvent::TurnComplete { is_complete: false });

    let lines = h.state.transcripts.read(&conv_id).unwrap();
    // greeting, user, assistant placeholder, replay
    assert_eq!(lines.len(), 4);
    assert_eq!(
        lines[2].as_message(),
        Some(Message::assistant(h.state.config.conversation.placeholder.clone()))
    );
    assert!(lines[3].is_replay());
    assert_eq!(lines[3].turn, 1);
}

#[tokio::test]
async fn model_history_never_contains_replay_records() {
    let h = harness(20);
    let token = h.join().await;

    h.model.push(Scripted::Blocks(vec![
        ContentBlock::text("Which of these?"),
        ContentBlock::tool_call(
            "call_1",
            "show_buttons",
            json!({ "question": "Main mode?", "options": ["Train", "Bus", "Bike"] }),
        ),
    ]));
    run(&h, &token, "Let me think").await;

    h.model.push_text("Thanks.");
    run(&h, &token, "Train").await;

    let req = h.model.last_request().unwrap();
    let roles: Vec<Role> = req.messages.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![Role::User, Role::Assistant, Role::User, Role::Assistant, Role::User]
    );
    assert_eq!(req.messages[0].content, h.state.config.conversation.opening_cue);
    assert_eq!(req.messages[3].content, "Which of these?");
    assert!(req
        .messages
        .iter()
        .all(|m| !m.content.contains("option_set") && !m.content.contains("Main mode?")));
}

#[tokio::test]
async fn conversation_completes_on_the_last_allowed_message() {
    let h = harness(3);
    let token = h.join().await;

    for (i, msg) in ["one", "two", "three"].iter().enumerate() {
        let events = run(&h, &token, msg).await;
        let expected = i == 2;
        assert_eq!(
            events.last(),
            Some(&ChatEvent::TurnComplete { is_complete: expected }),
            "turn {}",
            i + 1
        );
    }

    let conv = h.state.conversations.get_by_token(&token).unwrap();
    assert_eq!(conv.status, ConversationStatus::Completed);
    assert_eq!(conv.turn_count, 3);
    assert!(conv.duration_seconds.is_some());

    let err = start_turn(h.state.clone(), input(&token, "four")).unwrap_err();
    assert!(matches!(err, TurnError::StateConflict(_)));
}

#[tokio::test]
async fn final_turn_withholds_tools_and_adds_closing_directive() {
    let h = harness(2);
    let token = h.join().await;

    run(&h, &token, "first").await;
    let first = h.model.last_request().unwrap();
    assert_eq!(first.tools.len(), 3);
    assert!(!first.directive.contains(&h.state.config.conversation.final_turn_directive));

    run(&h, &token, "second").await;
    let last = h.model.last_request().unwrap();
    assert!(last.tools.is_empty());
    assert!(last.directive.ends_with(h.state.config.conversation.final_turn_directive.trim()));
}

#[tokio::test]
async fn seven_button_options_are_truncated_to_six() {
    let h = harness(20);
    let token = h.join().await;

    let options: Vec<String> = (1..=7).map(|i| format!("Option {i}")).collect();
    h.model.push(Scripted::Blocks(vec![
        ContentBlock::text("Pick one."),
        ContentBlock::tool_call(
            "call_1",
            "show_buttons",
            json!({ "question": "Rate it", "options": options }),
        ),
    ]));
    let events = run(&h, &token, "ok").await;

    let option_set = events
        .iter()
        .find_map(|e| match e {
            ChatEvent::OptionSet { options, .. } => Some(options.clone()),
            _ => None,
        })
        .expect("option set delivered");
    assert_eq!(option_set.len(), 6);
    assert_eq!(option_set[5].label, "Option 6");
    assert_eq!(text_of(&events).1, "Pick one.");
    assert_eq!(events.last(), Some(&ChatEvent::TurnComplete { is_complete: false }));
}

#[tokio::test]
async fn unknown_tool_is_dropped_and_turn_completes() {
    let h = harness(20);
    let token = h.join().await;

    h.model.push(Scripted::Blocks(vec![
        ContentBlock::text("Noted."),
        ContentBlock::tool_call("call_1", "launch_rocket", json!({})),
    ]));
    let events = run(&h, &token, "hello").await;

    assert_eq!(
        events,
        vec![
            ChatEvent::TextChunk { text: "Noted.".into() },
            ChatEvent::TurnComplete { is_complete: false },
        ]
    );
}

#[tokio::test]
async fn media_timeout_drops_the_event_but_delivers_text() {
    let h = harness_with(20, slow_media(), |_| {});
    let token = h.join().await;

    h.model.push(Scripted::Blocks(vec![
        ContentBlock::text("Here's a platform at rush hour."),
        ContentBlock::tool_call("call_1", "show_image", json!({ "query": "rush hour" })),
    ]));
    let events = run(&h, &token, "show me").await;

    assert!(!events.iter().any(|e| matches!(e, ChatEvent::Media { .. })));
    assert_eq!(text_of(&events).1, "Here's a platform at rush hour.");
    assert_eq!(events.last(), Some(&ChatEvent::TurnComplete { is_complete: false }));
}

#[tokio::test]
async fn slow_earlier_lookup_still_lands_in_block_order() {
    let h = harness_with(20, staggered_media(), |_| {});
    let token = h.join().await;

    h.model.push(Scripted::Blocks(vec![
        ContentBlock::text("First a platform."),
        ContentBlock::tool_call("call_1", "show_image", json!({ "query": "platform" })),
        ContentBlock::text("Then a ride."),
        ContentBlock::tool_call("call_2", "show_video", json!({ "query": "ride" })),
    ]));
    let events = run(&h, &token, "Show me").await;

    let kinds: Vec<&str> = events
        .iter()
        .map(|e| match e {
            ChatEvent::Media { kind: MediaKind::Image, .. } => "image",
            ChatEvent::Media { kind: MediaKind::Video, .. } => "video",
            other => other.event_type(),
        })
        .collect();
    assert_eq!(
        kinds,
        vec![
            "text_chunk", "text_chunk", // "First a platform." is 17 chars
            "image",
            "text_chunk", "text_chunk", // "Then a ride." is 12 chars
            "video",
            "turn_complete",
        ]
    );
    let (_, text) = text_of(&events);
    assert_eq!(text, "First a platform.Then a ride.");
}

#[tokio::test]
async fn adapter_failure_emits_one_error_and_leaves_transcript_untouched() {
    let h = harness(20);
    let token = h.join().await;
    let conv_id = h.conversation_id(&token);

    h.model.push(Scripted::Fail("upstream 500".into()));
    let events = run(&h, &token, "hello").await;

    assert_eq!(events.len(), 1);
    assert!(matches!(
        &events[0],
        ChatEvent::TurnError { message, code } if message.contains("upstream 500") && code == "adapter_failure"
    ));
    assert_eq!(h.state.transcripts.read(&conv_id).unwrap().len(), 1);
    assert_eq!(h.state.conversations.get(&conv_id).unwrap().turn_count, 0);
}

#[tokio::test]
async fn adapter_timeout_is_an_adapter_failure() {
    let h = harness(20);
    let token = h.join().await;

    h.model.push(Scripted::Hang);
    let summary = TurnSummary::collect(start_turn(h.state.clone(), input(&token, "hi")).unwrap()).await;

    assert!(summary.error.is_some());
    assert!(summary.response.is_empty());
}

#[tokio::test]
async fn concurrent_submission_is_rejected_as_busy() {
    let h = harness(20);
    let token = h.join().await;

    h.model.set_delay(Duration::from_millis(200));
    let rx = start_turn(h.state.clone(), input(&token, "first")).unwrap();

    let err = start_turn(h.state.clone(), input(&token, "second")).unwrap_err();
    assert!(matches!(err, TurnError::Busy));

    let summary = TurnSummary::collect(rx).await;
    assert!(summary.error.is_none());

    // Lock released after commit.
    h.model.set_delay(Duration::from_millis(0));
    let events = run(&h, &token, "third").await;
    assert!(events.last().is_some_and(|e| e.is_terminal()));
}

#[tokio::test]
async fn closed_survey_rejects_turns_without_side_effects() {
    let h = harness(20);
    let token = h.join().await;
    let conv_id = h.conversation_id(&token);
    let calls_before = h.model.calls();

    let outcome = admin::close_survey(&h.state, &h.survey_id()).unwrap();
    assert_eq!(outcome.abandoned, 1);

    let err = start_turn(h.state.clone(), input(&token, "still there?")).unwrap_err();
    assert!(matches!(err, TurnError::StateConflict(_)));
    assert_eq!(h.model.calls(), calls_before);
    assert_eq!(h.state.transcripts.read(&conv_id).unwrap().len(), 1);
    assert_eq!(
        h.state.conversations.get(&conv_id).unwrap().status,
        ConversationStatus::Abandoned
    );
}

#[tokio::test]
async fn empty_message_is_invalid_input() {
    let h = harness(20);
    let token = h.join().await;
    let err = start_turn(h.state.clone(), input(&token, "   ")).unwrap_err();
    assert!(matches!(err, TurnError::InvalidInput(_)));
}

#[tokio::test]
async fn unknown_token_is_not_found() {
    let h = harness(20);
    let err = start_turn(h.state.clone(), input("nope", "hi")).unwrap_err();
    assert!(matches!(err, TurnError::NotFound(_)));
}
