use std::net::SocketAddr;

use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use poem::web::websocket::{CloseCode, Message, WebSocketStream};
use shellgate_common::SessionId;
use shellgate_core::{Services, SessionState};
use shellgate_protocol_ssh::{dial, DialError, ShellEvent, ShellStream};
use tokio::sync::broadcast;
use tracing::*;

use crate::wire::{
    parse_control_frame, ControlFrame, SessionRequest, CLOSE_NORMAL, CLOSE_POLICY_VIOLATION,
    CLOSE_UNEXPECTED_CONDITION, REASON_FIRST_FRAME_NOT_JSON, REASON_HOST_DENIED,
    REASON_INVALID_TOKEN, REASON_UNKNOWN_TARGET,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RelayState {
    AwaitingHandshake,
    Dialing,
    Ready,
    Closing,
    Closed,
}

/// How the session ended; decides the close frame sent to the client.
enum Closure {
    Policy(&'static str),
    PtyFailure(String),
    Normal,
    /// The client transport is already gone; nothing can be sent.
    ClientGone,
}

type ClientSink = SplitSink<WebSocketStream, Message>;
type ClientStream = SplitStream<WebSocketStream>;

/// One client connection bound to at most one outbound SSH shell. The
/// relay exclusively owns both transports; whatever happens, `run`
/// releases them exactly once before returning.
pub struct SessionRelay {
    id: SessionId,
    services: Services,
    state: RelayState,
}

impl SessionRelay {
    pub fn new(id: SessionId, services: Services) -> Self {
        Self {
            id,
            services,
            state: RelayState::AwaitingHandshake,
        }
    }

    pub async fn run(mut self, socket: WebSocketStream, remote_address: Option<SocketAddr>) {
        let mut shutdown_rx = self
            .services
            .state
            .lock()
            .await
            .register_session(self.id, SessionState { remote_address });

        let (mut sink, mut stream) = socket.split();
        let mut shell = None;

        let closure = self
            .drive(&mut sink, &mut stream, &mut shell, &mut shutdown_rx)
            .await;

        self.set_state(RelayState::Closing);
        if let Some(shell) = shell.as_mut() {
            shell.close().await;
        }
        self.send_close(&mut sink, closure).await;
        self.set_state(RelayState::Closed);

        self.services.state.lock().await.remove_session(self.id);
        info!(session=%self.id, "Session closed");
    }

    async fn drive(
        &mut self,
        sink: &mut ClientSink,
        stream: &mut ClientStream,
        shell_slot: &mut Option<ShellStream>,
        shutdown_rx: &mut broadcast::Receiver<()>,
    ) -> Closure {
        // Nothing is forwarded in either direction until the handshake is
        // accepted in full.
        let request = loop {
            tokio::select! {
                frame = stream.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<SessionRequest>(&text) {
                            Ok(request) => break request,
                            Err(error) => {
                                debug!(session=%self.id, %error, "First frame did not parse as a session request");
                                return Closure::Policy(REASON_FIRST_FRAME_NOT_JSON);
                            }
                        }
                    }
                    Some(Ok(Message::Binary(_))) => {
                        return Closure::Policy(REASON_FIRST_FRAME_NOT_JSON);
                    }
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                        return Closure::ClientGone;
                    }
                },
                _ = shutdown_rx.recv() => return Closure::Normal,
            }
        };

        let token = request.token.as_ref().map(|t| t.expose_secret().as_str());
        let principal = match self.services.token_verifier.verify(token) {
            Ok(principal) => principal,
            Err(_) => return Closure::Policy(REASON_INVALID_TOKEN),
        };

        // One consistent snapshot of the inventory per session.
        let snapshot = self.services.targets.snapshot().await;
        let target = match snapshot.lookup(&request.server_id) {
            Some(target) => target.clone(),
            None => return Closure::Policy(REASON_UNKNOWN_TARGET),
        };

        if !self.services.admission.admit(&target.host) {
            warn!(session=%self.id, host=%target.host, "Host is not on the allow-list");
            return Closure::Policy(REASON_HOST_DENIED);
        }

        info!(
            session=%self.id,
            principal=%principal.name(),
            target=%target.id,
            "Handshake accepted"
        );

        let (cols, rows) = request.pty_size();
        let ladder = request.auth.into_ladder();

        self.set_state(RelayState::Dialing);
        let dial_fut = dial(self.id, &target, &ladder, cols, rows);
        tokio::pin!(dial_fut);

        // Frames that arrive while the dial is in flight are replayed once
        // the shell is up, preserving their order.
        let mut pending: Vec<Message> = vec![];
        let shell = loop {
            tokio::select! {
                result = &mut dial_fut => match result {
                    Ok(shell) => break shell,
                    Err(DialError::PtyDenied(error)) => {
                        warn!(session=%self.id, %error, "Remote refused the PTY");
                        return Closure::PtyFailure(error.to_string());
                    }
                    Err(error) => {
                        warn!(session=%self.id, %error, "SSH dial failed");
                        return self.ssh_error(sink, &error.to_string()).await;
                    }
                },
                frame = stream.next() => match frame {
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                        // The dial future is dropped here; its eventual
                        // result is discarded.
                        debug!(session=%self.id, "Client left mid-dial, abandoning");
                        return Closure::ClientGone;
                    }
                    Some(Ok(frame)) => pending.push(frame),
                },
                _ = shutdown_rx.recv() => return Closure::Normal,
            }
        };
        let shell = shell_slot.insert(shell);

        self.set_state(RelayState::Ready);

        for frame in pending.drain(..) {
            if self.forward_client_frame(shell, frame).is_err() {
                return Closure::Normal;
            }
        }

        loop {
            tokio::select! {
                frame = stream.next() => match frame {
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                        return Closure::ClientGone;
                    }
                    Some(Ok(frame)) => {
                        if self.forward_client_frame(shell, frame).is_err() {
                            // The shell writer is gone; same as a remote close.
                            return Closure::Normal;
                        }
                    }
                },
                event = shell.next_event() => match event {
                    Some(ShellEvent::Data(data)) => {
                        if sink.send(Message::Binary(data.to_vec())).await.is_err() {
                            return Closure::ClientGone;
                        }
                    }
                    Some(ShellEvent::Eof) => {}
                    Some(ShellEvent::ExitStatus(code)) => {
                        debug!(session=%self.id, code, "Remote shell exited");
                    }
                    Some(ShellEvent::Closed) | None => return Closure::Normal,
                },
                _ = shutdown_rx.recv() => return Closure::Normal,
            }
        }
    }

    /// A text frame that parses as a resize request becomes a window
    /// change; everything else, text or binary, reaches the shell
    /// byte-identical.
    fn forward_client_frame(
        &self,
        shell: &ShellStream,
        frame: Message,
    ) -> Result<(), DialError> {
        match frame {
            Message::Text(text) => {
                if let Some(ControlFrame::Resize { rows, cols }) = parse_control_frame(&text) {
                    debug!(session=%self.id, rows, cols, "Resize");
                    shell.window_change(cols, rows)
                } else {
                    shell.data(Bytes::from(text.into_bytes()))
                }
            }
            Message::Binary(data) => shell.data(Bytes::from(data)),
            _ => Ok(()),
        }
    }

    /// One best-effort diagnostic line; a failed write is swallowed.
    async fn ssh_error(&self, sink: &mut ClientSink, message: &str) -> Closure {
        let _ = sink
            .send(Message::Text(format!("\r\n[SSH ERROR] {message}\r\n")))
            .await;
        Closure::Normal
    }

    async fn send_close(&self, sink: &mut ClientSink, closure: Closure) {
        let frame = match closure {
            Closure::Policy(reason) => Some((CLOSE_POLICY_VIOLATION, reason.to_owned())),
            Closure::PtyFailure(reason) => Some((CLOSE_UNEXPECTED_CONDITION, reason)),
            Closure::Normal => Some((CLOSE_NORMAL, String::new())),
            Closure::ClientGone => None,
        };
        if let Some((code, reason)) = frame {
            let _ = sink
                .send(Message::Close(Some((CloseCode::from(code), reason))))
                .await;
        }
        let _ = sink.close().await;
    }

    fn set_state(&mut self, state: RelayState) {
        // Terminal states are absorbing.
        if self.state == RelayState::Closed || self.state == state {
            return;
        }
        debug!(session=%self.id, from=?self.state, to=?state, "State");
        self.state = state;
    }
}
