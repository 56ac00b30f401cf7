//! Message thread lifecycle for the open conversation: fetch, normalize,
//! identity-tag, order, wholesale replace.

use serde_json::Value;

use grange_api::ApiError;

use crate::state::{ConversationId, ThreadView};
use crate::updates::{CoreMsg, InternalEvent};

use super::{identity, normalize, AppCore};

impl AppCore {
    /// Kicks off a `GET /conversations/{id}/messages` for the open
    /// conversation. Refreshes for anything else are dropped; the thread view
    /// only ever shows the selection.
    pub(super) fn refresh_thread(&mut self, conversation_id: ConversationId) {
        if self.state.active_conversation != Some(conversation_id) {
            tracing::debug!(conversation_id, "thread refresh skipped (not the open conversation)");
            return;
        }
        self.sync_current_actor();
        if !self.network_enabled() {
            tracing::debug!("thread refresh skipped (network disabled)");
            return;
        }

        self.thread_token = self.thread_token.wrapping_add(1);
        let token = self.thread_token;
        self.set_busy(|b| b.loading_messages = true);

        let api = self.api.clone();
        let bearer = self.bearer_token();
        let scope = self.chat_scope();
        let core_sender = self.core_sender.clone();
        self.runtime.spawn(async move {
            let result = api
                .fetch_messages(bearer.as_deref(), scope, conversation_id)
                .await;
            let _ = core_sender.send(CoreMsg::Internal(Box::new(InternalEvent::ThreadFetched {
                token,
                conversation_id,
                result,
            })));
        });
    }

    pub(super) fn apply_thread_fetch(
        &mut self,
        token: u64,
        conversation_id: ConversationId,
        result: Result<Value, ApiError>,
    ) {
        // Ignore stale results (selection changed or a newer reload started
        // while this one was in flight).
        if token != self.thread_token {
            tracing::debug!(conversation_id, token, "stale thread fetch dropped");
            return;
        }
        match result {
            Ok(raw) => {
                let current = self.state.current_actor.clone();
                let mut messages = normalize::messages_from_payload(raw, conversation_id);
                for message in &mut messages {
                    let effective = identity::effective_sender_id(
                        message.sender_id,
                        message.sender_kind,
                        &current,
                    );
                    message.sender_id = effective;
                    // Anonymous (id 0) owns nothing; sender 0 is a server
                    // record with no usable sender, not "me".
                    message.is_mine = current.id != 0 && effective == current.id;
                }
                self.append_outbox_tail(conversation_id, &mut messages);
                // Server order is not contractual; render order is.
                messages.sort_by_key(|m| m.sent_at);
                tracing::info!(conversation_id, count = messages.len(), "thread loaded");
                self.state.thread = Some(ThreadView {
                    conversation_id,
                    messages,
                });
                self.set_busy(|b| b.loading_messages = false);
                self.emit_thread();
            }
            Err(err) => {
                // Whatever the thread already showed stays visible.
                tracing::warn!(conversation_id, %err, "thread fetch failed");
                self.set_busy(|b| b.loading_messages = false);
                self.note_unauthorized(&err);
            }
        }
    }
}
