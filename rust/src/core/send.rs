//! Optimistic sends: append a local placeholder immediately, POST once, then
//! reconcile with server truth via a thread re-fetch. Failed sends stay
//! visible as `Failed` until the user retries. Also home to the transmit-only
//! typing signal.

use chrono::Utc;

use grange_api::ApiError;

use crate::state::{ChatMessage, ConversationId, MessageDeliveryState, MessageId};
use crate::updates::{CoreMsg, InternalEvent};

use super::AppCore;

impl AppCore {
    pub(super) fn send_message(&mut self, conversation_id: Option<ConversationId>, text: String) {
        // Compose with nothing open is a no-op by contract, as is whitespace.
        let Some(conversation_id) = conversation_id else {
            tracing::debug!("send dropped (no conversation)");
            return;
        };
        let text = text.trim().to_string();
        if text.is_empty() {
            tracing::debug!(conversation_id, "send dropped (empty message)");
            return;
        }

        self.sync_current_actor();
        let current = self.state.current_actor.clone();
        let placeholder_id = self.next_placeholder_id();
        let message = ChatMessage {
            id: placeholder_id,
            conversation_id,
            sender_id: current.id,
            sender_kind: current.kind,
            text: text.clone(),
            sent_at: Utc::now(),
            is_read: false,
            is_mine: true,
            delivery: MessageDeliveryState::Pending,
        };

        // Optimistic append: visible now, replaced by the server copy on the
        // next thread fetch.
        self.outbox
            .entry(conversation_id)
            .or_default()
            .push(message.clone());
        if let Some(thread) = self
            .state
            .thread
            .as_mut()
            .filter(|t| t.conversation_id == conversation_id)
        {
            thread.messages.push(message);
            self.emit_thread();
        }

        self.dispatch_send(conversation_id, placeholder_id, text);
    }

    // Send-time nanos, bumped when the clock hasn't advanced, so rapid sends
    // get strictly increasing placeholder ids.
    fn next_placeholder_id(&mut self) -> MessageId {
        let nanos = Utc::now().timestamp_nanos_opt().unwrap_or(0);
        if nanos <= self.last_placeholder_id {
            self.last_placeholder_id += 1;
        } else {
            self.last_placeholder_id = nanos;
        }
        self.last_placeholder_id
    }

    fn dispatch_send(
        &mut self,
        conversation_id: ConversationId,
        placeholder_id: MessageId,
        text: String,
    ) {
        if !self.network_enabled() {
            // Deterministic offline mode: the send is accepted locally.
            let _ = self.core_sender.send(CoreMsg::Internal(Box::new(
                InternalEvent::SendFinished {
                    conversation_id,
                    placeholder_id,
                    result: Ok(()),
                },
            )));
            return;
        }

        let api = self.api.clone();
        let bearer = self.bearer_token();
        let scope = self.chat_scope();
        let core_sender = self.core_sender.clone();
        self.runtime.spawn(async move {
            let result = api
                .send_message(bearer.as_deref(), scope, conversation_id, &text)
                .await;
            let _ = core_sender.send(CoreMsg::Internal(Box::new(InternalEvent::SendFinished {
                conversation_id,
                placeholder_id,
                result,
            })));
        });
    }

    pub(super) fn finish_send(
        &mut self,
        conversation_id: ConversationId,
        placeholder_id: MessageId,
        result: Result<(), ApiError>,
    ) {
        match result {
            Ok(()) => {
                tracing::info!(conversation_id, placeholder_id, "send confirmed");
                if self.set_visible_delivery(
                    conversation_id,
                    placeholder_id,
                    MessageDeliveryState::Sent,
                ) {
                    self.emit_thread();
                }
                self.drop_outbox_message(conversation_id, placeholder_id);
                // Server truth replaces the placeholder (thread) and brings
                // the preview/unread counters up to date (list).
                if self.state.active_conversation == Some(conversation_id) {
                    self.refresh_thread(conversation_id);
                }
                self.refresh_conversations();
            }
            Err(err) => {
                let reason = err.to_string();
                tracing::warn!(conversation_id, placeholder_id, %err, "send failed");
                self.note_unauthorized(&err);
                self.mark_outbox_failed(conversation_id, placeholder_id, reason.clone());
                if self.set_visible_delivery(
                    conversation_id,
                    placeholder_id,
                    MessageDeliveryState::Failed { reason },
                ) {
                    self.emit_thread();
                }
            }
        }
    }

    /// Re-issues a failed local send, once per invocation. Anything not
    /// sitting in the outbox as `Failed` is ignored.
    pub(super) fn retry_send(&mut self, conversation_id: ConversationId, message_id: MessageId) {
        let text = {
            let Some(message) = self
                .outbox
                .get_mut(&conversation_id)
                .and_then(|messages| messages.iter_mut().find(|m| m.id == message_id))
            else {
                tracing::debug!(conversation_id, message_id, "retry ignored (not a local send)");
                return;
            };
            if !matches!(message.delivery, MessageDeliveryState::Failed { .. }) {
                // In flight or already confirmed.
                return;
            }
            message.delivery = MessageDeliveryState::Pending;
            message.text.clone()
        };
        if self.set_visible_delivery(conversation_id, message_id, MessageDeliveryState::Pending) {
            self.emit_thread();
        }
        self.dispatch_send(conversation_id, message_id, text);
    }

    /// Transmit-only typing signal. No state, no busy flag; failures are
    /// swallowed after a debug log.
    pub(super) fn send_typing(&mut self, conversation_id: ConversationId, is_typing: bool) {
        if !self.network_enabled() {
            return;
        }
        let api = self.api.clone();
        let bearer = self.bearer_token();
        self.runtime.spawn(async move {
            if let Err(err) = api
                .notify_typing(bearer.as_deref(), conversation_id, is_typing)
                .await
            {
                tracing::debug!(conversation_id, %err, "typing signal dropped");
            }
        });
    }

    /// Re-appends unconfirmed local sends after a wholesale thread replace;
    /// the caller re-sorts. Confirmed sends were already dropped from the
    /// outbox, so the server copy is never doubled.
    pub(super) fn append_outbox_tail(
        &self,
        conversation_id: ConversationId,
        messages: &mut Vec<ChatMessage>,
    ) {
        let Some(pending) = self.outbox.get(&conversation_id) else {
            return;
        };
        for message in pending {
            if messages.iter().all(|m| m.id != message.id) {
                messages.push(message.clone());
            }
        }
    }

    fn set_visible_delivery(
        &mut self,
        conversation_id: ConversationId,
        message_id: MessageId,
        delivery: MessageDeliveryState,
    ) -> bool {
        let Some(thread) = self
            .state
            .thread
            .as_mut()
            .filter(|t| t.conversation_id == conversation_id)
        else {
            return false;
        };
        let Some(message) = thread.messages.iter_mut().find(|m| m.id == message_id) else {
            return false;
        };
        if message.delivery == delivery {
            return false;
        }
        message.delivery = delivery;
        true
    }

    fn drop_outbox_message(&mut self, conversation_id: ConversationId, message_id: MessageId) {
        if let Some(messages) = self.outbox.get_mut(&conversation_id) {
            messages.retain(|m| m.id != message_id);
            if messages.is_empty() {
                self.outbox.remove(&conversation_id);
            }
        }
    }

    fn mark_outbox_failed(
        &mut self,
        conversation_id: ConversationId,
        message_id: MessageId,
        reason: String,
    ) {
        if let Some(message) = self
            .outbox
            .get_mut(&conversation_id)
            .and_then(|messages| messages.iter_mut().find(|m| m.id == message_id))
        {
            message.delivery = MessageDeliveryState::Failed { reason };
        }
    }
}
