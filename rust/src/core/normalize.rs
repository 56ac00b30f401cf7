// Wire-shape canonicalization. The backend serves the same list data in
// several wrappings and spells participant/preview fields differently per
// role, so every read here is shape-probing and total: missing optional
// fields degrade, and only a record without an id is dropped.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;

use crate::state::{
    Actor, ActorKind, ChatMessage, ContextType, ConversationId, ConversationSummary,
    MessageDeliveryState, MessagePreview,
};

/// The three wrappings the backend serves list data in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ListPayload {
    /// Top-level array.
    Bare(Vec<Value>),
    /// `{"data": [...]}`
    Wrapped(Vec<Value>),
    /// `{"data": {"data": [...]}}` (paginator inside an envelope)
    DoubleWrapped(Vec<Value>),
}

impl ListPayload {
    /// Tags which wrapping `raw` uses; `None` for anything unrecognizable.
    pub(crate) fn classify(raw: Value) -> Option<Self> {
        match raw {
            Value::Array(records) => Some(Self::Bare(records)),
            Value::Object(mut map) => match map.remove("data") {
                Some(Value::Array(records)) => Some(Self::Wrapped(records)),
                Some(Value::Object(mut inner)) => match inner.remove("data") {
                    Some(Value::Array(records)) => Some(Self::DoubleWrapped(records)),
                    _ => None,
                },
                _ => None,
            },
            _ => None,
        }
    }

    pub(crate) fn into_records(self) -> Vec<Value> {
        match self {
            Self::Bare(records) | Self::Wrapped(records) | Self::DoubleWrapped(records) => records,
        }
    }
}

fn records_from(raw: Value) -> Vec<Value> {
    ListPayload::classify(raw)
        .map(ListPayload::into_records)
        .unwrap_or_default()
}

pub(crate) fn conversations_from_payload(raw: Value) -> Vec<ConversationSummary> {
    records_from(raw)
        .iter()
        .filter_map(conversation_from_value)
        .collect()
}

pub(crate) fn messages_from_payload(
    raw: Value,
    conversation_id: ConversationId,
) -> Vec<ChatMessage> {
    records_from(raw)
        .iter()
        .filter_map(|record| message_from_value(record, conversation_id))
        .collect()
}

pub(crate) fn conversation_from_value(record: &Value) -> Option<ConversationSummary> {
    // The id is the only required field. Its absence drops this record,
    // never the batch.
    let id = record.get("id").and_then(coerce_u64)?;

    let context = record
        .get("context_type")
        .and_then(Value::as_str)
        .map(ContextType::from_label)
        .unwrap_or_default();

    let context_ref = ["context_ref", "product_id", "order_id"]
        .iter()
        .find_map(|key| record.get(*key).and_then(coerce_display_string));

    // Participant key varies by role view; first present wins.
    let (participant, from_seller_key) = match record.get("other_party").filter(|v| v.is_object())
    {
        Some(parts) => (Some(parts), false),
        None => match record.get("seller").filter(|v| v.is_object()) {
            Some(parts) => (Some(parts), true),
            None => (record.get("user").filter(|v| v.is_object()), false),
        },
    };

    let other_party = match participant {
        Some(parts) => participant_actor(parts, from_seller_key),
        // Buyer-side support chats carry no participant; the counterpart is
        // the platform itself.
        None if context == ContextType::Support => Actor::admin_support(),
        None => Actor {
            id: 0,
            kind: ActorKind::Unknown,
            display_name: "User".to_string(),
        },
    };

    let last_message = record.get("last_message").and_then(preview_from_value);

    let unread_count = record
        .get("unread_count")
        .and_then(coerce_i64)
        .unwrap_or(0)
        .clamp(0, u32::MAX as i64) as u32;

    Some(ConversationSummary {
        id,
        context,
        context_ref,
        other_party,
        last_message,
        unread_count,
    })
}

pub(crate) fn message_from_value(
    record: &Value,
    fallback_conversation: ConversationId,
) -> Option<ChatMessage> {
    let id = record.get("id").and_then(coerce_i64)?;

    let conversation_id = record
        .get("conversation_id")
        .and_then(coerce_u64)
        .unwrap_or(fallback_conversation);

    let sender_id = record.get("sender_id").and_then(coerce_i64).unwrap_or(0);
    let sender_kind = message_sender_kind(record);
    let text = message_text(record).unwrap_or_default();

    // Ordering must stay total, so a record with a broken timestamp keeps
    // its place at the epoch instead of being dropped.
    let sent_at = record
        .get("created_at")
        .and_then(parse_timestamp)
        .unwrap_or(DateTime::UNIX_EPOCH);

    let is_read = record.get("is_read").map(coerce_bool).unwrap_or(false);

    Some(ChatMessage {
        id,
        conversation_id,
        sender_id,
        sender_kind,
        text,
        sent_at,
        is_read,
        is_mine: false,
        delivery: MessageDeliveryState::Sent,
    })
}

/// Sender role on messages, case-insensitive, total onto the three kinds a
/// thread can render. Anything unrecognized is a buyer.
fn message_sender_kind(record: &Value) -> ActorKind {
    let label = record
        .get("sender_type")
        .and_then(Value::as_str)
        .unwrap_or("");
    match ActorKind::from_label(label) {
        ActorKind::Admin => ActorKind::Admin,
        ActorKind::Seller => ActorKind::Seller,
        _ => ActorKind::Buyer,
    }
}

fn participant_actor(parts: &Value, from_seller_key: bool) -> Actor {
    let id = parts.get("id").and_then(coerce_i64).unwrap_or(0);

    let labeled = ["role", "user_type"]
        .iter()
        .find_map(|key| parts.get(*key).and_then(Value::as_str))
        .map(ActorKind::from_label)
        .filter(|kind| *kind != ActorKind::Unknown);
    let kind = labeled.unwrap_or({
        if from_seller_key || nonempty_str(parts.get("store_name")).is_some() {
            ActorKind::Seller
        } else {
            ActorKind::Unknown
        }
    });

    let display_name =
        display_name_from_parts(parts).unwrap_or_else(|| "User".to_string());

    Actor {
        id,
        kind,
        display_name,
    }
}

/// `last_message` arrives as an array (take the first entry) or as a single
/// object. A preview without a parseable timestamp is dropped; the
/// conversation itself is kept.
fn preview_from_value(value: &Value) -> Option<MessagePreview> {
    let record = match value {
        Value::Array(items) => items.first()?,
        Value::Object(_) => value,
        _ => return None,
    };
    let text = message_text(record)?;
    let sent_at = record.get("created_at").and_then(parse_timestamp)?;
    Some(MessagePreview { text, sent_at })
}

fn message_text(record: &Value) -> Option<String> {
    record
        .get("message")
        .or_else(|| record.get("text"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Display name chain: `store_name` > `first_name last_name` > `email`.
/// `None` when no part is usable; callers pick the fallback.
pub(crate) fn display_name_from_parts(parts: &Value) -> Option<String> {
    if let Some(store) = nonempty_str(parts.get("store_name")) {
        return Some(store);
    }
    let first = nonempty_str(parts.get("first_name"));
    let last = nonempty_str(parts.get("last_name"));
    match (first, last) {
        (Some(first), Some(last)) => return Some(format!("{first} {last}")),
        (Some(only), None) | (None, Some(only)) => return Some(only),
        (None, None) => {}
    }
    nonempty_str(parts.get("email"))
}

/// Unread-total scalar: a bare number, `{count}`, `{unread_count}`,
/// `{total}`, or any of those under a `data` envelope.
pub(crate) fn unread_total_from_value(raw: &Value) -> u64 {
    fn probe(value: &Value) -> Option<u64> {
        if let Some(n) = coerce_u64(value) {
            return Some(n);
        }
        ["count", "unread_count", "total"]
            .iter()
            .find_map(|key| value.get(*key).and_then(coerce_u64))
    }
    probe(raw)
        .or_else(|| raw.get("data").and_then(probe))
        .unwrap_or(0)
}

pub(crate) fn coerce_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub(crate) fn coerce_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn coerce_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_i64().unwrap_or(0) != 0,
        Value::String(s) => matches!(s.trim(), "1" | "true" | "TRUE" | "True"),
        _ => false,
    }
}

fn coerce_display_string(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        _ => None,
    }
}

fn nonempty_str(value: Option<&Value>) -> Option<String> {
    let s = value?.as_str()?.trim();
    (!s.is_empty()).then(|| s.to_string())
}

/// RFC 3339 first, then the backend's `YYYY-MM-DD HH:MM:SS`, then epoch
/// seconds as a bare number.
pub(crate) fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            if let Ok(parsed) = DateTime::parse_from_rfc3339(s) {
                return Some(parsed.with_timezone(&Utc));
            }
            NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|naive| Utc.from_utc_datetime(&naive))
        }
        Value::Number(n) => n
            .as_i64()
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single()),
        _ => None,
    }
}
