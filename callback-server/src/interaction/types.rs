//! Slack interaction payload types.
//!
//! Only the fields the server itself looks at are typed; everything else in
//! the payload is kept as opaque JSON so handlers see the full event.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::web::RequestTrace;

/// Kind of interaction, from the payload's `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionType {
    BlockActions,
    BlockSuggestion,
    InteractiveMessage,
    DialogSubmission,
    DialogCancellation,
    DialogSuggestion,
    MessageAction,
    Shortcut,
    ViewSubmission,
    ViewClosed,
    /// Any type this server does not know about yet
    #[serde(other)]
    Unknown,
}

impl InteractionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BlockActions => "block_actions",
            Self::BlockSuggestion => "block_suggestion",
            Self::InteractiveMessage => "interactive_message",
            Self::DialogSubmission => "dialog_submission",
            Self::DialogCancellation => "dialog_cancellation",
            Self::DialogSuggestion => "dialog_suggestion",
            Self::MessageAction => "message_action",
            Self::Shortcut => "shortcut",
            Self::ViewSubmission => "view_submission",
            Self::ViewClosed => "view_closed",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for InteractionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub id: String,
    #[serde(default)]
    pub domain: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub username: String,
    /// Legacy payloads carry only `name`; current ones send both
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub team_id: String,
}

/// One element of the `actions` array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(default)]
    pub action_id: String,
    #[serde(default)]
    pub block_id: String,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub action_ts: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Decoded interaction callback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallbackEvent {
    #[serde(rename = "type")]
    pub kind: InteractionType,

    /// Deprecated verification token; kept because legacy apps still read it
    #[serde(default)]
    pub token: String,

    #[serde(default)]
    pub trigger_id: String,

    #[serde(default)]
    pub callback_id: String,

    #[serde(default)]
    pub response_url: String,

    #[serde(default)]
    pub action_ts: String,

    #[serde(default)]
    pub message_ts: String,

    #[serde(default)]
    pub api_app_id: String,

    #[serde(default)]
    pub team: Option<Team>,

    #[serde(default)]
    pub channel: Option<Channel>,

    #[serde(default)]
    pub user: Option<User>,

    #[serde(default)]
    pub actions: Vec<Action>,

    /// Modal view for `view_submission` / `view_closed` / block actions in modals
    #[serde(default)]
    pub view: Option<Value>,

    /// Message the interaction originated from
    #[serde(default)]
    pub message: Option<Value>,

    /// Remaining platform-defined fields
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Unit of work handed to the interaction handler.
#[derive(Debug, Clone)]
pub struct Callback {
    pub trace: RequestTrace,
    pub event: CallbackEvent,
}

impl Callback {
    pub fn new(trace: RequestTrace, event: CallbackEvent) -> Self {
        Self { trace, event }
    }
}
