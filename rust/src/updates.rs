use grange_api::ApiError;

use crate::state::{AppState, ConversationId, MessageId};
use crate::AppAction;

#[derive(Clone, Debug)]
pub enum AppUpdate {
    FullState(AppState),
    /// The backend rejected our bearer token. The embedding session layer
    /// owns what happens next (re-auth, logout); chat state stays as-is.
    SessionExpired {
        rev: u64,
    },
}

impl AppUpdate {
    pub fn rev(&self) -> u64 {
        match self {
            AppUpdate::FullState(s) => s.rev,
            AppUpdate::SessionExpired { rev } => *rev,
        }
    }
}

#[derive(Debug)]
pub enum CoreMsg {
    Action(AppAction),
    Internal(Box<InternalEvent>),
}

/// Results of async work re-entering the core actor. List and thread fetches
/// carry the request token they were issued under so stale responses can be
/// dropped; the unread badge is a last-write-wins scalar and carries none.
#[derive(Debug)]
pub enum InternalEvent {
    ConversationsFetched {
        token: u64,
        result: Result<serde_json::Value, ApiError>,
    },
    ThreadFetched {
        token: u64,
        conversation_id: ConversationId,
        result: Result<serde_json::Value, ApiError>,
    },
    SendFinished {
        conversation_id: ConversationId,
        placeholder_id: MessageId,
        result: Result<(), ApiError>,
    },
    UnreadTotalFetched {
        result: Result<serde_json::Value, ApiError>,
    },
}
