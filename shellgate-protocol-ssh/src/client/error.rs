#[derive(Debug, thiserror::Error)]
pub enum DialError {
    #[error("authentication failed")]
    AuthFailed,
    #[error("target unreachable: {0}")]
    Unreachable(#[source] std::io::Error),
    #[error("remote refused the PTY request: {0}")]
    PtyDenied(#[source] russh::Error),
    #[error("SSH transport error: {0}")]
    TransportLost(#[from] russh::Error),
    #[error("shell channel closed")]
    ChannelClosed,
}
