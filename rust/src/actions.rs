use crate::state::{ContextType, ConversationId, MessageId};

#[derive(Debug, Clone)]
pub enum AppAction {
    // Session
    ReloadSession,

    // Conversation list
    RefreshConversations,
    SetConversationQuery {
        unread_only: bool,
        context_type: Option<ContextType>,
    },
    SetConversationFilter {
        query: String,
    },
    SelectConversation {
        conversation_id: Option<ConversationId>,
    },

    // Thread
    RefreshThread {
        conversation_id: ConversationId,
    },
    SendMessage {
        conversation_id: Option<ConversationId>,
        text: String,
    },
    RetrySend {
        conversation_id: ConversationId,
        message_id: MessageId,
    },
    SetTyping {
        conversation_id: ConversationId,
        is_typing: bool,
    },

    // Badges
    RefreshUnreadTotal,
}

impl AppAction {
    /// Log-safe action tag (never includes message text or tokens).
    pub fn tag(&self) -> &'static str {
        match self {
            // Session
            AppAction::ReloadSession => "ReloadSession",

            // Conversation list
            AppAction::RefreshConversations => "RefreshConversations",
            AppAction::SetConversationQuery { .. } => "SetConversationQuery",
            AppAction::SetConversationFilter { .. } => "SetConversationFilter",
            AppAction::SelectConversation { .. } => "SelectConversation",

            // Thread
            AppAction::RefreshThread { .. } => "RefreshThread",
            AppAction::SendMessage { .. } => "SendMessage",
            AppAction::RetrySend { .. } => "RetrySend",
            AppAction::SetTyping { .. } => "SetTyping",

            // Badges
            AppAction::RefreshUnreadTotal => "RefreshUnreadTotal",
        }
    }
}
