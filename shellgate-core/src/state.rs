use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use shellgate_common::SessionId;
use tokio::sync::{broadcast, Mutex};
use tracing::*;

/// Supervisor bookkeeping: which relays are live, and the shutdown signal
/// they all subscribe to. No session data crosses between relays.
pub struct State {
    sessions: HashMap<SessionId, SessionState>,
    shutdown_sender: broadcast::Sender<()>,
}

pub struct SessionState {
    pub remote_address: Option<SocketAddr>,
}

impl State {
    pub fn new() -> Arc<Mutex<Self>> {
        Arc::new(Mutex::new(Self {
            sessions: HashMap::new(),
            shutdown_sender: broadcast::channel(2).0,
        }))
    }

    pub fn register_session(
        &mut self,
        id: SessionId,
        session: SessionState,
    ) -> broadcast::Receiver<()> {
        self.sessions.insert(id, session);
        debug!(session=%id, live = self.sessions.len(), "Session registered");
        self.shutdown_sender.subscribe()
    }

    pub fn remove_session(&mut self, id: SessionId) {
        if self.sessions.remove(&id).is_some() {
            debug!(session=%id, live = self.sessions.len(), "Session removed");
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Tells every live relay to start closing. Idempotent.
    pub fn begin_shutdown(&self) {
        let _ = self.shutdown_sender.send(());
    }
}
