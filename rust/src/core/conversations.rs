//! Conversation list lifecycle: fetch, wholesale replace, selection, and the
//! unread badge total. Search/filter stays a pure view in `state.rs`.

use serde_json::Value;

use grange_api::ApiError;

use crate::state::{ConversationId, ThreadView};
use crate::updates::{CoreMsg, InternalEvent};

use super::{normalize, AppCore};

impl AppCore {
    /// Kicks off a `GET /conversations` for the current query. The previous
    /// list stays visible until the response lands.
    pub(super) fn refresh_conversations(&mut self) {
        self.sync_current_actor();
        if !self.network_enabled() {
            tracing::debug!("conversation refresh skipped (network disabled)");
            return;
        }

        self.conversations_token = self.conversations_token.wrapping_add(1);
        let token = self.conversations_token;
        self.set_busy(|b| b.loading_conversations = true);

        let api = self.api.clone();
        let bearer = self.bearer_token();
        let scope = self.chat_scope();
        let query = self.state.conversation_query;
        let core_sender = self.core_sender.clone();
        self.runtime.spawn(async move {
            let result = api
                .fetch_conversations(
                    bearer.as_deref(),
                    scope,
                    query.unread_only,
                    query.context_type.map(|c| c.as_query()),
                )
                .await;
            let _ = core_sender.send(CoreMsg::Internal(Box::new(
                InternalEvent::ConversationsFetched { token, result },
            )));
        });
    }

    pub(super) fn apply_conversations_fetch(
        &mut self,
        token: u64,
        result: Result<Value, ApiError>,
    ) {
        // Ignore stale results (a newer refresh owns the list and the flag).
        if token != self.conversations_token {
            tracing::debug!(token, "stale conversation fetch dropped");
            return;
        }
        match result {
            Ok(raw) => {
                let conversations = normalize::conversations_from_payload(raw);
                tracing::info!(count = conversations.len(), "conversations loaded");
                self.state.conversations = conversations;
                self.set_busy(|b| b.loading_conversations = false);
                self.emit_conversations();
            }
            Err(err) => {
                // Whatever list we already had stays on screen.
                tracing::warn!(%err, "conversation fetch failed");
                self.set_busy(|b| b.loading_conversations = false);
                self.note_unauthorized(&err);
            }
        }
    }

    /// `Some(id)` opens a conversation and loads its thread; `None` clears
    /// the selection and the visible thread.
    pub(super) fn select_conversation(&mut self, conversation_id: Option<ConversationId>) {
        // Any in-flight thread fetch belongs to the previous selection now.
        self.thread_token = self.thread_token.wrapping_add(1);
        self.state.active_conversation = conversation_id;
        self.state.thread = conversation_id.map(|id| ThreadView {
            conversation_id: id,
            messages: vec![],
        });
        match conversation_id {
            Some(id) => {
                self.emit_thread();
                self.refresh_thread(id);
            }
            None => {
                self.set_busy(|b| b.loading_messages = false);
                self.emit_thread();
            }
        }
    }

    pub(super) fn refresh_unread_total(&mut self) {
        if !self.network_enabled() {
            return;
        }
        let api = self.api.clone();
        let bearer = self.bearer_token();
        let core_sender = self.core_sender.clone();
        self.runtime.spawn(async move {
            let result = api.fetch_unread_count(bearer.as_deref()).await;
            let _ = core_sender.send(CoreMsg::Internal(Box::new(
                InternalEvent::UnreadTotalFetched { result },
            )));
        });
    }

    pub(super) fn apply_unread_total(&mut self, result: Result<Value, ApiError>) {
        match result {
            Ok(raw) => {
                let total = normalize::unread_total_from_value(&raw);
                if self.state.total_unread != total {
                    self.state.total_unread = total;
                    self.emit_unread_total();
                }
            }
            Err(err) => {
                // Badge is best-effort; keep the last known value.
                tracing::debug!(%err, "unread total fetch failed");
                self.note_unauthorized(&err);
            }
        }
    }
}
