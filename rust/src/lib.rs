mod actions;
mod core;
mod logging;
mod state;
mod updates;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::thread;

use flume::{Receiver, Sender};

pub use actions::AppAction;
pub use core::{SessionProvider, StoredSession};
pub use state::*;
pub use updates::*;

use crate::core::SharedSessionProvider;

/// Platform-side callback for state updates. `reconcile` is called from a
/// dedicated listener thread, in emit order.
pub trait AppReconciler: Send + Sync + 'static {
    fn reconcile(&self, update: AppUpdate);
}

/// Headless chat front end. All state lives behind a single actor thread;
/// the embedding UI talks to it through [`dispatch`](Self::dispatch) and
/// renders from [`state`](Self::state) or pushed [`AppUpdate`]s.
pub struct ChatApp {
    core_tx: Sender<CoreMsg>,
    update_rx: Receiver<AppUpdate>,
    listening: AtomicBool,
    shared_state: Arc<RwLock<AppState>>,
    session_provider: SharedSessionProvider,
}

impl ChatApp {
    /// `data_dir` holds `grange_config.json` and the persisted session
    /// (`grange_session.json`), both optional.
    pub fn new(data_dir: String) -> Arc<Self> {
        logging::init_logging();
        tracing::info!(data_dir = %data_dir, "ChatApp::new() starting");

        let (update_tx, update_rx) = flume::unbounded();
        let (core_tx, core_rx) = flume::unbounded::<CoreMsg>();
        let shared_state = Arc::new(RwLock::new(AppState::empty()));
        let session_provider: SharedSessionProvider = Arc::new(RwLock::new(Some(Arc::new(
            StoredSession::new(data_dir.clone()),
        ))));

        // Actor loop thread (single threaded "app actor").
        let core_tx_for_core = core_tx.clone();
        let shared_for_core = shared_state.clone();
        let session_for_core = session_provider.clone();
        thread::spawn(move || {
            let mut core = crate::core::AppCore::new(
                update_tx,
                core_tx_for_core,
                data_dir,
                shared_for_core,
                session_for_core,
            );
            while let Ok(msg) = core_rx.recv() {
                core.handle_message(msg);
            }
        });

        Arc::new(Self {
            core_tx,
            update_rx,
            listening: AtomicBool::new(false),
            shared_state,
            session_provider,
        })
    }

    pub fn state(&self) -> AppState {
        match self.shared_state.read() {
            Ok(g) => g.clone(),
            Err(poison) => poison.into_inner().clone(),
        }
    }

    pub fn dispatch(&self, action: AppAction) {
        // Contract: never block the caller.
        let _ = self.core_tx.send(CoreMsg::Action(action));
    }

    pub fn listen_for_updates(&self, reconciler: Box<dyn AppReconciler>) {
        if self
            .listening
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            // Avoid multiple listeners that would split messages.
            return;
        }

        let rx = self.update_rx.clone();
        thread::spawn(move || {
            while let Ok(update) = rx.recv() {
                reconciler.reconcile(update);
            }
        });
    }

    /// Swaps the session store the core reads identity and bearer tokens
    /// from. The default reads `grange_session.json` under `data_dir`.
    pub fn set_session_provider(&self, provider: Arc<dyn SessionProvider>) {
        match self.session_provider.write() {
            Ok(mut slot) => *slot = Some(provider),
            Err(poison) => *poison.into_inner() = Some(provider),
        }
        // Make the swap visible without waiting for the next fetch.
        self.dispatch(AppAction::ReloadSession);
    }
}
