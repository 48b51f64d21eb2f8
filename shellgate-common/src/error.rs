use std::error::Error;

#[derive(thiserror::Error, Debug)]
pub enum ShellgateError {
    #[error("JWT_SECRET must be set unless USE_AUTH=false")]
    MissingJwtSecret,
    #[error("invalid value for {0}: {1}")]
    InvalidEnvValue(&'static str, String),
    #[error("invalid token")]
    InvalidToken,
    #[error(transparent)]
    Other(Box<dyn Error + Send + Sync>),
}

impl ShellgateError {
    pub fn other<E: Error + Send + Sync + 'static>(err: E) -> Self {
        Self::Other(Box::new(err))
    }
}
