//! Tools the conversation model may call, and how each call becomes events.
//!
//! A tool call is parsed into a [`ToolInvocation`] at the boundary. Unknown
//! names and malformed arguments never reach dispatch; they are dropped
//! with a warning and a `ToolDropped` trace. Resolution itself cannot fail:
//! a media lookup that finds nothing simply produces no event.

use serde::Deserialize;
use serde_json::Value;

use sv_domain::capability::MediaKind;
use sv_domain::event::{ChatEvent, ChoiceOption, MAX_OPTIONS, MIN_OPTIONS};
use sv_domain::tool::ToolDefinition;
use sv_domain::trace::TraceEvent;
use sv_media::MediaLookup;

pub const SHOW_IMAGE: &str = "show_image";
pub const SHOW_VIDEO: &str = "show_video";
pub const SHOW_BUTTONS: &str = "show_buttons";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tool definitions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Declarations sent with every non-final conversation turn.
pub fn tool_definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: SHOW_IMAGE.into(),
            description: "Show a relevant image to help the participant understand or engage \
                          with the topic. Use when visual context would enrich the conversation."
                .into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "Search query for finding a relevant image" },
                    "caption": { "type": "string", "description": "Optional caption to display with the image" }
                },
                "required": ["query"]
            }),
        },
        ToolDefinition {
            name: SHOW_BUTTONS.into(),
            description: "Present clickable option buttons instead of asking the participant to \
                          type. Use for questions with discrete answer choices (2-6 options)."
                .into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "question": { "type": "string", "description": "The question being asked" },
                    "options": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "label": { "type": "string" },
                                "value": { "type": "string" }
                            },
                            "required": ["label", "value"]
                        },
                        "description": "2-6 options to present as buttons"
                    },
                    "allow_multiple": {
                        "type": "boolean",
                        "description": "If true, participant can select multiple options"
                    }
                },
                "required": ["question", "options"]
            }),
        },
        ToolDefinition {
            name: SHOW_VIDEO.into(),
            description: "Show a relevant short video clip. Use sparingly, only when video would \
                          significantly aid understanding."
                .into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "Search query for finding a relevant video" },
                    "caption": { "type": "string", "description": "Optional caption" }
                },
                "required": ["query"]
            }),
        },
    ]
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Parsing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A validated tool call.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolInvocation {
    ShowMedia {
        kind: MediaKind,
        query: String,
        caption: Option<String>,
    },
    ShowButtons {
        question: String,
        options: Vec<ChoiceOption>,
        allow_multiple: bool,
    },
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ToolParseError {
    #[error("unknown tool")]
    UnknownTool,
    #[error("malformed arguments: {0}")]
    Malformed(String),
    #[error("{0} option(s), at least {MIN_OPTIONS} required")]
    TooFewOptions(usize),
}

#[derive(Deserialize)]
struct MediaArgs {
    query: String,
    #[serde(default)]
    caption: Option<String>,
}

#[derive(Deserialize)]
struct ButtonArgs {
    question: String,
    options: Vec<OptionArg>,
    #[serde(default)]
    allow_multiple: bool,
}

/// Models sometimes send bare strings instead of `{label, value}` pairs.
#[derive(Deserialize)]
#[serde(untagged)]
enum OptionArg {
    Pair {
        label: String,
        #[serde(default)]
        value: Option<String>,
    },
    Plain(String),
}

impl OptionArg {
    fn normalize(self) -> Option<ChoiceOption> {
        let (label, value) = match self {
            OptionArg::Pair { label, value } => {
                let value = value.filter(|v| !v.trim().is_empty()).unwrap_or_else(|| label.clone());
                (label, value)
            }
            OptionArg::Plain(s) => (s.clone(), s),
        };
        if label.trim().is_empty() {
            return None;
        }
        Some(ChoiceOption { label, value })
    }
}

impl ToolInvocation {
    pub fn parse(name: &str, arguments: &Value) -> Result<Self, ToolParseError> {
        match name {
            SHOW_IMAGE | SHOW_VIDEO => {
                let args: MediaArgs = serde_json::from_value(arguments.clone())
                    .map_err(|e| ToolParseError::Malformed(e.to_string()))?;
                let query = args.query.trim();
                if query.is_empty() {
                    return Err(ToolParseError::Malformed("empty query".into()));
                }
                let kind = if name == SHOW_IMAGE {
                    MediaKind::Image
                } else {
                    MediaKind::Video
                };
                Ok(ToolInvocation::ShowMedia {
                    kind,
                    query: query.to_owned(),
                    caption: args.caption.filter(|c| !c.trim().is_empty()),
                })
            }
            SHOW_BUTTONS => {
                let args: ButtonArgs = serde_json::from_value(arguments.clone())
                    .map_err(|e| ToolParseError::Malformed(e.to_string()))?;
                let mut options: Vec<ChoiceOption> =
                    args.options.into_iter().filter_map(OptionArg::normalize).collect();
                if options.len() < MIN_OPTIONS {
                    return Err(ToolParseError::TooFewOptions(options.len()));
                }
                if options.len() > MAX_OPTIONS {
                    tracing::warn!(
                        offered = options.len(),
                        kept = MAX_OPTIONS,
                        "show_buttons over the option limit, truncating"
                    );
                    options.truncate(MAX_OPTIONS);
                }
                Ok(ToolInvocation::ShowButtons {
                    question: args.question,
                    options,
                    allow_multiple: args.allow_multiple,
                })
            }
            _ => Err(ToolParseError::UnknownTool),
        }
    }

    /// Parse, logging and tracing anything that gets dropped.
    pub fn parse_or_drop(conversation_id: &str, name: &str, arguments: &Value) -> Option<Self> {
        match Self::parse(name, arguments) {
            Ok(inv) => Some(inv),
            Err(e) => {
                tracing::warn!(
                    conversation_id = %conversation_id,
                    tool = %name,
                    error = %e,
                    "dropping tool call"
                );
                TraceEvent::ToolDropped {
                    conversation_id: conversation_id.to_owned(),
                    tool: name.to_owned(),
                    reason: e.to_string(),
                }
                .emit();
                None
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Resolution
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Turn a validated invocation into its event, if any.
pub async fn resolve(media: &MediaLookup, invocation: ToolInvocation) -> Option<ChatEvent> {
    match invocation {
        ToolInvocation::ShowMedia {
            kind,
            query,
            caption,
        } => {
            let found = media.fetch(kind, &query).await?;
            Some(ChatEvent::Media {
                kind,
                url: found.url,
                caption: caption.or(found.description),
                attribution: found.attribution,
            })
        }
        ToolInvocation::ShowButtons {
            question,
            options,
            allow_multiple,
        } => Some(ChatEvent::OptionSet {
            question,
            options,
            allow_multiple,
        }),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn options(n: usize) -> Value {
        Value::Array(
            (1..=n)
                .map(|i| json!({ "label": format!("Option {i}"), "value": format!("o{i}") }))
                .collect(),
        )
    }

    #[test]
    fn definitions_cover_all_tools() {
        let names: Vec<String> = tool_definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec![SHOW_IMAGE, SHOW_BUTTONS, SHOW_VIDEO]);
    }

    #[test]
    fn media_calls_parse_by_name() {
        let inv = ToolInvocation::parse(SHOW_VIDEO, &json!({ "query": " ocean waves " })).unwrap();
        assert_eq!(
            inv,
            ToolInvocation::ShowMedia {
                kind: MediaKind::Video,
                query: "ocean waves".into(),
                caption: None,
            }
        );
    }

    #[test]
    fn media_without_query_is_malformed() {
        let err = ToolInvocation::parse(SHOW_IMAGE, &json!({ "caption": "x" })).unwrap_err();
        assert!(matches!(err, ToolParseError::Malformed(_)));
        let err = ToolInvocation::parse(SHOW_IMAGE, &json!({ "query": "  " })).unwrap_err();
        assert!(matches!(err, ToolParseError::Malformed(_)));
    }

    #[test]
    fn unparsed_argument_string_is_malformed() {
        let err = ToolInvocation::parse(SHOW_IMAGE, &Value::String("{query:".into())).unwrap_err();
        assert!(matches!(err, ToolParseError::Malformed(_)));
    }

    #[test]
    fn unknown_tool_is_rejected() {
        assert_eq!(
            ToolInvocation::parse("launch_rocket", &json!({})).unwrap_err(),
            ToolParseError::UnknownTool
        );
    }

    #[test]
    fn seven_options_truncate_to_six() {
        let inv = ToolInvocation::parse(
            SHOW_BUTTONS,
            &json!({ "question": "How often?", "options": options(7) }),
        )
        .unwrap();
        match inv {
            ToolInvocation::ShowButtons { options, allow_multiple, .. } => {
                assert_eq!(options.len(), MAX_OPTIONS);
                assert_eq!(options[5].value, "o6");
                assert!(!allow_multiple);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn one_option_is_dropped() {
        let err = ToolInvocation::parse(
            SHOW_BUTTONS,
            &json!({ "question": "Sure?", "options": options(1) }),
        )
        .unwrap_err();
        assert_eq!(err, ToolParseError::TooFewOptions(1));
    }

    #[test]
    fn plain_string_options_are_normalized() {
        let inv = ToolInvocation::parse(
            SHOW_BUTTONS,
            &json!({ "question": "Pick", "options": ["Yes", {"label": "No"}, ""], "allow_multiple": true }),
        )
        .unwrap();
        assert_eq!(
            inv,
            ToolInvocation::ShowButtons {
                question: "Pick".into(),
                options: vec![
                    ChoiceOption { label: "Yes".into(), value: "Yes".into() },
                    ChoiceOption { label: "No".into(), value: "No".into() },
                ],
                allow_multiple: true,
            }
        );
    }

    #[tokio::test]
    async fn buttons_resolve_without_io() {
        let media = MediaLookup::disabled(std::time::Duration::from_millis(10));
        let inv = ToolInvocation::ShowButtons {
            question: "Q".into(),
            options: vec![
                ChoiceOption { label: "A".into(), value: "a".into() },
                ChoiceOption { label: "B".into(), value: "b".into() },
            ],
            allow_multiple: false,
        };
        let ev = resolve(&media, inv).await.unwrap();
        assert_eq!(ev.event_type(), "option_set");
    }

    #[tokio::test]
    async fn unconfigured_media_resolves_to_nothing() {
        let media = MediaLookup::disabled(std::time::Duration::from_millis(10));
        let inv = ToolInvocation::ShowMedia {
            kind: MediaKind::Image,
            query: "forest".into(),
            caption: Some("Trees".into()),
        };
        assert!(resolve(&media, inv).await.is_none());
    }
}
