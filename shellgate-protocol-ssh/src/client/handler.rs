use russh::client;
use russh::keys::ssh_key::PublicKey;
use shellgate_common::SessionId;
use tracing::*;

/// Host keys are accepted unconditionally to preserve behavioural parity
/// with the deployed service. Deployments must treat the relay host as the
/// trust boundary; a known-hosts file or pinned fingerprint would hook in
/// here.
pub struct ClientHandler {
    pub session_id: SessionId,
}

impl client::Handler for ClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        debug!(session=%self.session_id, algorithm=%server_public_key.algorithm(), "Accepting server host key");
        Ok(true)
    }
}

impl Drop for ClientHandler {
    fn drop(&mut self) {
        debug!(session=%self.session_id, "Dropped");
    }
}
