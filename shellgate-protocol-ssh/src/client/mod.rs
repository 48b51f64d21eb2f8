mod channel;
mod error;
mod handler;

use std::sync::Arc;

use bytes::Bytes;
pub use channel::{ChannelOperation, ShellEvent};
use channel::ShellChannel;
pub use error::DialError;
use handler::ClientHandler;
use russh::client::{AuthResult, Handle, KeyboardInteractiveAuthResponse};
use russh::keys::{decode_secret_key, PrivateKeyWithHashAlg};
use russh::MethodKind;
use shellgate_common::{ClientAuth, SessionId, SshPasswordAuth, SshPrivateKeyAuth, Target};
use tokio::sync::mpsc;
use tracing::*;

pub const TERM: &str = "xterm-256color";

/// The wire protocol only carries character dimensions; the SSH requests
/// want pixels too, so they are synthesized from a nominal 8x16 cell.
pub fn pixel_dimensions(cols: u32, rows: u32) -> (u32, u32) {
    (cols * 8, rows * 16)
}

/// A PTY-backed remote shell. Writes go through the ops queue; remote
/// output arrives as [`ShellEvent`]s. Exclusively owned by one relay.
pub struct ShellStream {
    ops_tx: mpsc::UnboundedSender<ChannelOperation>,
    events_rx: mpsc::Receiver<ShellEvent>,
    handle: Option<Handle<ClientHandler>>,
}

impl ShellStream {
    /// Queues opaque input for the remote shell.
    pub fn data(&self, data: Bytes) -> Result<(), DialError> {
        self.ops_tx
            .send(ChannelOperation::Data(data))
            .map_err(|_| DialError::ChannelClosed)
    }

    /// Requests a window change. Character and pixel dimensions both go on
    /// the wire; repeated identical requests are idempotent at the shell.
    pub fn window_change(&self, cols: u32, rows: u32) -> Result<(), DialError> {
        let (pix_width, pix_height) = pixel_dimensions(cols, rows);
        self.ops_tx
            .send(ChannelOperation::WindowChange {
                cols,
                rows,
                pix_width,
                pix_height,
            })
            .map_err(|_| DialError::ChannelClosed)
    }

    pub async fn next_event(&mut self) -> Option<ShellEvent> {
        self.events_rx.recv().await
    }

    /// Ends the SSH session. Safe to call repeatedly; the transport
    /// disconnect happens at most once.
    pub async fn close(&mut self) {
        let _ = self.ops_tx.send(ChannelOperation::Close);
        if let Some(handle) = self.handle.take() {
            let _ = handle
                .disconnect(russh::Disconnect::ByApplication, "", "")
                .await;
        }
    }
}

/// Establishes the outbound SSH transport, authenticates with the given
/// method ladder and opens an `xterm-256color` shell of the given size.
/// Every error is terminal; there are no retries.
pub async fn dial(
    session_id: SessionId,
    target: &Target,
    auth: &[ClientAuth],
    cols: u32,
    rows: u32,
) -> Result<ShellStream, DialError> {
    if auth.is_empty() {
        return Err(DialError::AuthFailed);
    }

    info!(session=%session_id, host=%target.host, port=target.port, username=%target.username, "Dialing");

    let config = Arc::new(russh::client::Config::default());
    let handler = ClientHandler { session_id };
    let mut handle =
        russh::client::connect(config, (target.host.clone(), target.port), handler)
            .await
            .map_err(|error| match error {
                russh::Error::IO(error) => DialError::Unreachable(error),
                error => DialError::TransportLost(error),
            })?;

    authenticate(&mut handle, &target.username, auth).await?;
    debug!(session=%session_id, username=%target.username, "Authenticated");

    let channel = match open_shell(&handle, cols, rows).await {
        Ok(channel) => channel,
        Err(error) => {
            let _ = handle
                .disconnect(russh::Disconnect::ByApplication, "", "")
                .await;
            return Err(error);
        }
    };

    info!(session=%session_id, "Shell ready");

    let (ops_tx, ops_rx) = mpsc::unbounded_channel();
    // Capacity 1: at most one client-bound message in flight per session.
    let (events_tx, events_rx) = mpsc::channel(1);
    tokio::spawn(
        {
            let actor = ShellChannel::new(channel, session_id, ops_rx, events_tx);
            async move {
                if let Err(error) = actor.run().await {
                    debug!(session=%session_id, %error, "Shell channel task ended with error");
                }
            }
        }
        .instrument(Span::current()),
    );

    Ok(ShellStream {
        ops_tx,
        events_rx,
        handle: Some(handle),
    })
}

async fn open_shell(
    handle: &Handle<ClientHandler>,
    cols: u32,
    rows: u32,
) -> Result<russh::Channel<russh::client::Msg>, DialError> {
    let channel = handle.channel_open_session().await?;
    let (pix_width, pix_height) = pixel_dimensions(cols, rows);
    channel
        .request_pty(true, TERM, cols, rows, pix_width, pix_height, &[])
        .await
        .map_err(DialError::PtyDenied)?;
    channel
        .request_shell(true)
        .await
        .map_err(DialError::PtyDenied)?;
    Ok(channel)
}

async fn authenticate(
    handle: &mut Handle<ClientHandler>,
    username: &str,
    methods: &[ClientAuth],
) -> Result<(), DialError> {
    for method in methods {
        let authenticated = match method {
            ClientAuth::PrivateKey(auth) => try_private_key(handle, username, auth).await?,
            ClientAuth::Password(auth) => try_password(handle, username, auth).await?,
        };
        if authenticated {
            return Ok(());
        }
    }
    let _ = handle
        .disconnect(russh::Disconnect::ByApplication, "", "")
        .await;
    Err(DialError::AuthFailed)
}

async fn try_private_key(
    handle: &mut Handle<ClientHandler>,
    username: &str,
    auth: &SshPrivateKeyAuth,
) -> Result<bool, DialError> {
    let passphrase = auth.passphrase.as_ref().map(|p| p.expose_secret().as_str());
    let key = match decode_secret_key(auth.pem.expose_secret(), passphrase) {
        Ok(key) => key,
        Err(error) => {
            warn!(%error, "Client private key could not be parsed");
            return Ok(false);
        }
    };
    let hash_alg = if key.algorithm().is_rsa() {
        handle.best_supported_rsa_hash().await?.flatten()
    } else {
        None
    };
    let key = PrivateKeyWithHashAlg::new(Arc::new(key), hash_alg);
    match handle.authenticate_publickey(username, key).await? {
        AuthResult::Success => Ok(true),
        AuthResult::Failure { .. } => Ok(false),
    }
}

async fn try_password(
    handle: &mut Handle<ClientHandler>,
    username: &str,
    auth: &SshPasswordAuth,
) -> Result<bool, DialError> {
    let password = auth.password.expose_secret();
    match handle
        .authenticate_password(username, password.clone())
        .await?
    {
        AuthResult::Success => return Ok(true),
        AuthResult::Failure {
            remaining_methods, ..
        } => {
            if !remaining_methods.contains(&MethodKind::KeyboardInteractive) {
                return Ok(false);
            }
        }
    }

    // Keyboard-interactive fallback: every prompt is answered with the
    // same secret.
    let mut response = handle
        .authenticate_keyboard_interactive_start(username, None)
        .await?;
    loop {
        match response {
            KeyboardInteractiveAuthResponse::Success => return Ok(true),
            KeyboardInteractiveAuthResponse::Failure { .. } => return Ok(false),
            KeyboardInteractiveAuthResponse::InfoRequest { prompts, .. } => {
                let answers = prompts.iter().map(|_| password.clone()).collect();
                response = handle
                    .authenticate_keyboard_interactive_respond(answers)
                    .await?;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_dimensions_use_an_8x16_cell() {
        assert_eq!(pixel_dimensions(120, 40), (960, 640));
        assert_eq!(pixel_dimensions(200, 50), (1600, 800));
    }

    fn detached_shell() -> (ShellStream, mpsc::UnboundedReceiver<ChannelOperation>) {
        let (ops_tx, ops_rx) = mpsc::unbounded_channel();
        let (_events_tx, events_rx) = mpsc::channel(1);
        (
            ShellStream {
                ops_tx,
                events_rx,
                handle: None,
            },
            ops_rx,
        )
    }

    #[tokio::test]
    async fn test_writes_are_queued_in_order() {
        let (shell, mut ops_rx) = detached_shell();
        shell.window_change(200, 50).unwrap();
        shell.data(Bytes::from_static(b"ls\n")).unwrap();

        match ops_rx.recv().await.unwrap() {
            ChannelOperation::WindowChange {
                cols,
                rows,
                pix_width,
                pix_height,
            } => assert_eq!((cols, rows, pix_width, pix_height), (200, 50, 1600, 800)),
            other => panic!("unexpected op: {other:?}"),
        }
        match ops_rx.recv().await.unwrap() {
            ChannelOperation::Data(data) => assert_eq!(&data[..], b"ls\n"),
            other => panic!("unexpected op: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_writes_after_channel_exit_report_closed() {
        let (shell, ops_rx) = detached_shell();
        drop(ops_rx);
        assert!(matches!(
            shell.data(Bytes::from_static(b"x")),
            Err(DialError::ChannelClosed)
        ));
        assert!(matches!(
            shell.window_change(80, 24),
            Err(DialError::ChannelClosed)
        ));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (mut shell, mut ops_rx) = detached_shell();
        shell.close().await;
        shell.close().await;
        assert!(matches!(
            ops_rx.recv().await,
            Some(ChannelOperation::Close)
        ));
    }
}
