use bytes::Bytes;
use russh::client::Msg;
use russh::{Channel, ChannelMsg};
use shellgate_common::SessionId;
use tokio::sync::mpsc::{Sender, UnboundedReceiver};
use tracing::*;

/// Operations the relay can request on the open shell channel.
#[derive(Clone, Debug)]
pub enum ChannelOperation {
    Data(Bytes),
    WindowChange {
        cols: u32,
        rows: u32,
        pix_width: u32,
        pix_height: u32,
    },
    Close,
}

/// Events surfaced to the relay. stderr (extended data, type 1) is folded
/// into `Data`: the client sees a single in-band terminal stream.
#[derive(Debug, PartialEq, Eq)]
pub enum ShellEvent {
    Data(Bytes),
    Eof,
    ExitStatus(u32),
    Closed,
}

/// Owns the russh channel for one shell: serializes writes arriving on the
/// ops queue and pumps remote output into the bounded events queue. When
/// the events queue is full this task blocks, which stops `wait()` from
/// being polled and lets SSH flow control hold the remote shell back.
pub(crate) struct ShellChannel {
    channel: Channel<Msg>,
    session_id: SessionId,
    ops_rx: UnboundedReceiver<ChannelOperation>,
    events_tx: Sender<ShellEvent>,
}

impl ShellChannel {
    pub fn new(
        channel: Channel<Msg>,
        session_id: SessionId,
        ops_rx: UnboundedReceiver<ChannelOperation>,
        events_tx: Sender<ShellEvent>,
    ) -> Self {
        ShellChannel {
            channel,
            session_id,
            ops_rx,
            events_tx,
        }
    }

    pub async fn run(mut self) -> Result<(), russh::Error> {
        loop {
            tokio::select! {
                op = self.ops_rx.recv() => {
                    match op {
                        Some(ChannelOperation::Data(data)) => {
                            self.channel.data(&data[..]).await?;
                        }
                        Some(ChannelOperation::WindowChange { cols, rows, pix_width, pix_height }) => {
                            self.channel.window_change(cols, rows, pix_width, pix_height).await?;
                        }
                        Some(ChannelOperation::Close) | None => break,
                    }
                }
                channel_event = self.channel.wait() => {
                    match channel_event {
                        Some(ChannelMsg::Data { data }) => {
                            let bytes: &[u8] = &data;
                            if self.events_tx.send(ShellEvent::Data(Bytes::from(bytes.to_vec()))).await.is_err() {
                                break;
                            }
                        }
                        Some(ChannelMsg::ExtendedData { data, ext: 1 }) => {
                            let bytes: &[u8] = &data;
                            if self.events_tx.send(ShellEvent::Data(Bytes::from(bytes.to_vec()))).await.is_err() {
                                break;
                            }
                        }
                        Some(ChannelMsg::Eof) => {
                            if self.events_tx.send(ShellEvent::Eof).await.is_err() {
                                break;
                            }
                        }
                        Some(ChannelMsg::ExitStatus { exit_status }) => {
                            if self.events_tx.send(ShellEvent::ExitStatus(exit_status)).await.is_err() {
                                break;
                            }
                        }
                        Some(ChannelMsg::Close) | None => {
                            let _ = self.events_tx.send(ShellEvent::Closed).await;
                            break;
                        }
                        Some(msg) => {
                            debug!(session=%self.session_id, ?msg, "Unhandled channel message");
                        }
                    }
                }
            }
        }
        let _ = self.channel.eof().await;
        Ok(())
    }
}

impl Drop for ShellChannel {
    fn drop(&mut self) {
        debug!(session=%self.session_id, "Shell channel closed");
    }
}
