mod config;
mod conversations;
mod identity;
mod normalize;
mod send;
mod thread;

pub use identity::{SessionProvider, SharedSessionProvider, StoredSession};

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use flume::Sender;

use grange_api::{ApiClient, ApiClientConfig, ApiError, ChatScope};

use crate::actions::AppAction;
use crate::state::{Actor, AppState, BusyState, ChatMessage, ConversationId, ConversationQuery};
use crate::updates::{AppUpdate, CoreMsg, InternalEvent};

pub struct AppCore {
    pub state: AppState,
    rev: u64,
    last_placeholder_id: i64,

    update_sender: Sender<AppUpdate>,
    core_sender: Sender<CoreMsg>,
    shared_state: Arc<RwLock<AppState>>,

    config: config::AppConfig,
    runtime: tokio::runtime::Runtime,

    session: SharedSessionProvider,
    api: ApiClient,

    // Monotonic request tokens. A fetch result tagged with an old token is
    // stale and must not overwrite state (slow response racing a newer one).
    conversations_token: u64,
    thread_token: u64,

    // Locally fabricated sends awaiting server confirmation (or marked
    // Failed and awaiting a retry). Confirmed entries are removed; the
    // server copy arrives with the next thread fetch.
    outbox: HashMap<ConversationId, Vec<ChatMessage>>,
}

impl AppCore {
    pub fn new(
        update_sender: Sender<AppUpdate>,
        core_sender: Sender<CoreMsg>,
        data_dir: String,
        shared_state: Arc<RwLock<AppState>>,
        session: SharedSessionProvider,
    ) -> Self {
        let config = config::load_app_config(&data_dir);
        let state = AppState::empty();

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_time()
            .enable_io()
            .build()
            .expect("tokio runtime");

        let api = ApiClient::new(ApiClientConfig {
            base_url: config.api_base_url(),
            timeout_ms: config.request_timeout_ms(),
            request_attempts: config.request_attempts(),
        })
        .unwrap_or_else(|err| {
            tracing::warn!(%err, "configured api_base_url unusable, using default");
            ApiClient::new(ApiClientConfig::new(config::DEFAULT_API_BASE_URL))
                .expect("default base url is valid")
        });

        let mut this = Self {
            state,
            rev: 0,
            last_placeholder_id: 0,
            update_sender,
            core_sender,
            shared_state,
            config,
            runtime,
            session,
            api,
            conversations_token: 0,
            thread_token: 0,
            outbox: HashMap::new(),
        };

        this.sync_current_actor();

        // Ensure ChatApp.state() has an immediately-available snapshot.
        let snapshot = this.state.clone();
        this.commit_state_snapshot(&snapshot);
        this
    }

    fn next_rev(&mut self) -> u64 {
        self.rev += 1;
        self.state.rev = self.rev;
        self.rev
    }

    fn commit_state_snapshot(&self, snapshot: &AppState) {
        match self.shared_state.write() {
            Ok(mut g) => *g = snapshot.clone(),
            Err(poison) => *poison.into_inner() = snapshot.clone(),
        }
    }

    fn emit_state(&mut self) {
        self.next_rev();
        let snapshot = self.state.clone();
        self.commit_state_snapshot(&snapshot);
        let _ = self.update_sender.send(AppUpdate::FullState(snapshot));
    }

    fn emit_session(&mut self) {
        self.emit_state();
    }

    fn emit_conversations(&mut self) {
        self.emit_state();
    }

    fn emit_thread(&mut self) {
        self.emit_state();
    }

    fn emit_busy(&mut self) {
        self.emit_state();
    }

    fn emit_unread_total(&mut self) {
        self.emit_state();
    }

    fn set_busy(&mut self, f: impl FnOnce(&mut BusyState)) {
        let mut next = self.state.busy.clone();
        f(&mut next);
        if next != self.state.busy {
            self.state.busy = next;
            self.emit_busy();
        }
    }

    /// Identity as the installed session store sees it right now. Falls back
    /// to [`Actor::anonymous`] when no store is installed or it has no user.
    fn session_actor(&self) -> Actor {
        let guard = match self.session.read() {
            Ok(g) => g,
            Err(poison) => poison.into_inner(),
        };
        guard
            .as_ref()
            .map(|provider| provider.current_actor())
            .unwrap_or_else(Actor::anonymous)
    }

    fn bearer_token(&self) -> Option<String> {
        let guard = match self.session.read() {
            Ok(g) => g,
            Err(poison) => poison.into_inner(),
        };
        guard.as_ref().and_then(|provider| provider.bearer_token())
    }

    /// Re-reads the session store and updates `state.current_actor`.
    /// Returns whether the actor changed. Does not emit.
    fn sync_current_actor(&mut self) -> bool {
        let actor = self.session_actor();
        if actor == self.state.current_actor {
            return false;
        }
        tracing::info!(actor_id = actor.id, kind = ?actor.kind, "session actor changed");
        self.state.current_actor = actor;
        true
    }

    /// Drops everything loaded for the previous identity. A new sign-in must
    /// never see the old account's conversations, and responses still in
    /// flight for the old identity must not repopulate them.
    fn reset_chat_state(&mut self) {
        self.state.conversations.clear();
        self.state.conversation_filter.clear();
        self.state.active_conversation = None;
        self.state.thread = None;
        self.state.total_unread = 0;
        self.state.busy = BusyState::idle();
        self.outbox.clear();
        self.conversations_token = self.conversations_token.wrapping_add(1);
        self.thread_token = self.thread_token.wrapping_add(1);
    }

    /// Admins read and write through the back-office endpoints; everyone
    /// else through the user-facing ones.
    fn chat_scope(&self) -> ChatScope {
        if self.state.current_actor.is_admin() {
            ChatScope::Admin
        } else {
            ChatScope::User
        }
    }

    /// Routes a 401 to the embedding session layer and reports whether it
    /// was one. Chat state stays untouched and the request is not retried
    /// here; re-auth is the session layer's problem.
    fn note_unauthorized(&mut self, err: &ApiError) -> bool {
        if !err.is_unauthorized() {
            return false;
        }
        tracing::warn!("bearer token rejected, signalling session layer");
        let rev = self.next_rev();
        let snapshot = self.state.clone();
        self.commit_state_snapshot(&snapshot);
        let _ = self.update_sender.send(AppUpdate::SessionExpired { rev });
        true
    }

    pub fn handle_message(&mut self, msg: CoreMsg) {
        match msg {
            CoreMsg::Action(ref action) => {
                // Never log `?action` directly: it can contain drafted message text.
                tracing::info!(action = action.tag(), "dispatch");
                self.handle_action(action.clone());
            }
            CoreMsg::Internal(internal) => self.handle_internal(*internal),
        }
    }

    fn handle_action(&mut self, action: AppAction) {
        match action {
            // Session
            AppAction::ReloadSession => {
                if self.sync_current_actor() {
                    self.reset_chat_state();
                }
                self.emit_session();
            }

            // Conversation list
            AppAction::RefreshConversations => self.refresh_conversations(),
            AppAction::SetConversationQuery {
                unread_only,
                context_type,
            } => {
                let query = ConversationQuery {
                    unread_only,
                    context_type,
                };
                if self.state.conversation_query != query {
                    self.state.conversation_query = query;
                    self.emit_conversations();
                }
                // The query filters server-side; re-fetch either way.
                self.refresh_conversations();
            }
            AppAction::SetConversationFilter { query } => {
                // Pure view concern over the already-loaded list.
                if self.state.conversation_filter != query {
                    self.state.conversation_filter = query;
                    self.emit_conversations();
                }
            }
            AppAction::SelectConversation { conversation_id } => {
                self.select_conversation(conversation_id)
            }

            // Thread
            AppAction::RefreshThread { conversation_id } => self.refresh_thread(conversation_id),
            AppAction::SendMessage {
                conversation_id,
                text,
            } => self.send_message(conversation_id, text),
            AppAction::RetrySend {
                conversation_id,
                message_id,
            } => self.retry_send(conversation_id, message_id),
            AppAction::SetTyping {
                conversation_id,
                is_typing,
            } => self.send_typing(conversation_id, is_typing),

            // Badges
            AppAction::RefreshUnreadTotal => self.refresh_unread_total(),
        }
    }

    fn handle_internal(&mut self, internal: InternalEvent) {
        match internal {
            InternalEvent::ConversationsFetched { token, result } => {
                self.apply_conversations_fetch(token, result)
            }
            InternalEvent::ThreadFetched {
                token,
                conversation_id,
                result,
            } => self.apply_thread_fetch(token, conversation_id, result),
            InternalEvent::SendFinished {
                conversation_id,
                placeholder_id,
                result,
            } => self.finish_send(conversation_id, placeholder_id, result),
            InternalEvent::UnreadTotalFetched { result } => self.apply_unread_total(result),
        }
    }
}
