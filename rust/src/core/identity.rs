// Identity resolution: who is the current actor, and which messages are
// theirs. Session data arrives loosely shaped from the auth layer's store,
// so everything here is total and degrades to the anonymous sentinel.

use std::path::Path;
use std::sync::{Arc, RwLock};

use serde_json::Value;

use super::normalize::{coerce_i64, display_name_from_parts};
use crate::state::{Actor, ActorId, ActorKind};

/// Access to the persisted session the out-of-scope auth layer maintains.
/// Injected so the core never reads ambient global state; swap in a fake to
/// test identity-dependent behavior.
pub trait SessionProvider: Send + Sync + 'static {
    /// Identity of whoever is signed in right now. `Actor::anonymous()`
    /// when the store has no usable session.
    fn current_actor(&self) -> Actor;

    /// Bearer token for API calls, when one is stored.
    fn bearer_token(&self) -> Option<String>;
}

pub type SharedSessionProvider = Arc<RwLock<Option<Arc<dyn SessionProvider>>>>;

const ID_PATHS: [&[&str]; 4] = [
    &["data", "id"],
    &["id"],
    &["data", "user", "id"],
    &["user", "id"],
];

const ROLE_PATHS: [&[&str]; 6] = [
    &["data", "role"],
    &["role"],
    &["data", "user", "role"],
    &["user", "role"],
    &["data", "user_type"],
    &["user_type"],
];

const TOKEN_PATHS: [&[&str]; 4] = [
    &["data", "token"],
    &["token"],
    &["data", "access_token"],
    &["access_token"],
];

/// Numeric current-actor id out of loosely-shaped session data.
///
/// Precedence: `data.id`, top-level `id`, `data.user.id`, `user.id`; the
/// first resolvable candidate wins. Candidates may be JSON numbers or numeric
/// strings. Total: when nothing resolves the sentinel `0` is returned, which
/// simply renders every message as "not mine" until a real identity shows up.
pub fn resolve_actor_id(raw: &Value) -> ActorId {
    for path in ID_PATHS {
        if let Some(id) = lookup(raw, path).and_then(coerce_i64) {
            return id;
        }
    }
    0
}

/// Full actor projection from raw session data: id per [`resolve_actor_id`],
/// kind from the first recognizable role label, display name from the usual
/// name-part chain probed at each id root.
pub fn actor_from_session(raw: &Value) -> Actor {
    let id = resolve_actor_id(raw);

    let mut kind = ActorKind::Unknown;
    for path in ROLE_PATHS {
        if let Some(label) = lookup(raw, path).and_then(Value::as_str) {
            let parsed = ActorKind::from_label(label);
            if parsed != ActorKind::Unknown {
                kind = parsed;
                break;
            }
        }
    }

    let display_name = [
        lookup(raw, &["data", "user"]),
        lookup(raw, &["user"]),
        lookup(raw, &["data"]),
        Some(raw),
    ]
    .into_iter()
    .flatten()
    .find_map(display_name_from_parts)
    .unwrap_or_default();

    Actor {
        id,
        kind,
        display_name,
    }
}

/// The sender id a message renders with. Admin-sent messages are remapped to
/// the current actor whenever the current actor is also an admin, so an
/// admin's own messages always read as "own" even when the backend recorded a
/// different id for them. UX rule, not a security boundary.
pub fn effective_sender_id(
    raw_sender_id: ActorId,
    sender_kind: ActorKind,
    current: &Actor,
) -> ActorId {
    if sender_kind == ActorKind::Admin && current.is_admin() {
        current.id
    } else {
        raw_sender_id
    }
}

fn lookup<'a>(root: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut cursor = root;
    for key in path {
        cursor = cursor.get(key)?;
    }
    Some(cursor)
}

fn token_from_session(raw: &Value) -> Option<String> {
    for path in TOKEN_PATHS {
        if let Some(token) = lookup(raw, path).and_then(Value::as_str) {
            let trimmed = token.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }
    None
}

/// Default provider: reads `<data_dir>/grange_session.json` on every call.
/// The auth layer rewrites that file on login/logout, so no caching here.
pub struct StoredSession {
    data_dir: String,
}

pub(crate) const SESSION_FILE: &str = "grange_session.json";

impl StoredSession {
    pub fn new(data_dir: impl Into<String>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    fn read_raw(&self) -> Option<Value> {
        let path = Path::new(&self.data_dir).join(SESSION_FILE);
        let bytes = std::fs::read(path).ok()?;
        serde_json::from_slice(&bytes).ok()
    }
}

impl SessionProvider for StoredSession {
    fn current_actor(&self) -> Actor {
        match self.read_raw() {
            Some(raw) => actor_from_session(&raw),
            None => Actor::anonymous(),
        }
    }

    fn bearer_token(&self) -> Option<String> {
        token_from_session(&self.read_raw()?)
    }
}
