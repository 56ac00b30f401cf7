use chrono::{DateTime, Utc};

pub type ConversationId = u64;
pub type MessageId = i64;
pub type ActorId = i64;

/// Display name for the synthesized support counterpart (buyer-side support
/// chats have no server-resolved participant).
pub const ADMIN_SUPPORT_NAME: &str = "Admin Support";

#[derive(Clone, Debug)]
pub struct AppState {
    pub rev: u64,
    pub current_actor: Actor,
    pub busy: BusyState,
    pub conversations: Vec<ConversationSummary>,
    pub conversation_filter: String,
    pub conversation_query: ConversationQuery,
    pub active_conversation: Option<ConversationId>,
    pub thread: Option<ThreadView>,
    pub total_unread: u64,
}

impl AppState {
    pub fn empty() -> Self {
        Self {
            rev: 0,
            current_actor: Actor::anonymous(),
            busy: BusyState::idle(),
            conversations: vec![],
            conversation_filter: String::new(),
            conversation_query: ConversationQuery::default(),
            active_conversation: None,
            thread: None,
            total_unread: 0,
        }
    }

    /// Conversation list with the current filter applied. Pure view over the
    /// loaded collection; never touches the network.
    pub fn visible_conversations(&self) -> Vec<ConversationSummary> {
        filter_conversations(&self.conversations, &self.conversation_filter)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn conversation(&self, id: ConversationId) -> Option<&ConversationSummary> {
        self.conversations.iter().find(|c| c.id == id)
    }
}

/// A participant identity: the current user, a conversation counterpart, or a
/// message sender.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Actor {
    pub id: ActorId,
    pub kind: ActorKind,
    pub display_name: String,
}

impl Actor {
    /// Sentinel identity used until the session store yields a real one.
    /// Id `0` compares unequal to every server id, so nothing renders as
    /// "mine".
    pub fn anonymous() -> Self {
        Self {
            id: 0,
            kind: ActorKind::Unknown,
            display_name: String::new(),
        }
    }

    /// The fixed counterpart shown in buyer-side support chats.
    pub fn admin_support() -> Self {
        Self {
            id: 0,
            kind: ActorKind::Admin,
            display_name: ADMIN_SUPPORT_NAME.to_string(),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.kind == ActorKind::Admin
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActorKind {
    Buyer,
    Seller,
    Admin,
    Unknown,
}

impl ActorKind {
    /// Case-insensitive role label as the backend spells it (`"Admin"`,
    /// `"seller"`, `"vendor"`, ...). Unrecognized labels are `Unknown`.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "admin" => Self::Admin,
            "seller" | "vendor" => Self::Seller,
            "buyer" | "customer" | "user" => Self::Buyer,
            _ => Self::Unknown,
        }
    }
}

/// What a conversation is anchored to. `Support` covers buyer-admin chats
/// with no commerce anchor and is the default for anything unrecognized.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ContextType {
    Product,
    Order,
    #[default]
    Support,
}

impl ContextType {
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "product" => Self::Product,
            "order" => Self::Order,
            _ => Self::Support,
        }
    }

    pub fn as_query(&self) -> &'static str {
        match self {
            Self::Product => "product",
            Self::Order => "order",
            Self::Support => "support",
        }
    }
}

/// Server-side filter applied to conversation collection fetches.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct ConversationQuery {
    pub unread_only: bool,
    pub context_type: Option<ContextType>,
}

#[derive(Clone, Debug)]
pub struct ConversationSummary {
    pub id: ConversationId,
    pub context: ContextType,
    pub context_ref: Option<String>,
    pub other_party: Actor,
    pub last_message: Option<MessagePreview>,
    pub unread_count: u32,
}

impl ConversationSummary {
    /// Human label for the conversation's anchor, e.g. `"Product 42"` or
    /// `"Support"`. Filtering matches against this alongside the party name.
    pub fn context_label(&self) -> String {
        let base = match self.context {
            ContextType::Product => "Product",
            ContextType::Order => "Order",
            ContextType::Support => "Support",
        };
        match &self.context_ref {
            Some(r) if !r.is_empty() => format!("{base} {r}"),
            _ => base.to_string(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct MessagePreview {
    pub text: String,
    pub sent_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct ThreadView {
    pub conversation_id: ConversationId,
    pub messages: Vec<ChatMessage>,
}

#[derive(Clone, Debug)]
pub struct ChatMessage {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: ActorId,
    pub sender_kind: ActorKind,
    pub text: String,
    pub sent_at: DateTime<Utc>,
    pub is_read: bool,
    pub is_mine: bool,
    pub delivery: MessageDeliveryState,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MessageDeliveryState {
    Pending,
    Sent,
    Failed { reason: String },
}

/// "In flight" flags for operations the UI should reflect with a spinner.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BusyState {
    pub loading_conversations: bool,
    pub loading_messages: bool,
}

impl BusyState {
    pub fn idle() -> Self {
        Self {
            loading_conversations: false,
            loading_messages: false,
        }
    }
}

/// Case-insensitive substring match against each conversation's resolved
/// display name and context label. Empty queries match everything.
pub fn filter_conversations<'a>(
    conversations: &'a [ConversationSummary],
    query: &str,
) -> Vec<&'a ConversationSummary> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return conversations.iter().collect();
    }
    conversations
        .iter()
        .filter(|c| {
            c.other_party.display_name.to_lowercase().contains(&needle)
                || c.context_label().to_lowercase().contains(&needle)
        })
        .collect()
}
