use std::sync::Arc;

use shellgate_common::{ShellgateConfig, ShellgateError};
use tokio::sync::Mutex;

use crate::{HostAdmission, State, TargetStore, TokenVerifier};

#[derive(Clone)]
pub struct Services {
    pub config: Arc<ShellgateConfig>,
    pub targets: TargetStore,
    pub token_verifier: Arc<TokenVerifier>,
    pub admission: Arc<HostAdmission>,
    pub state: Arc<Mutex<State>>,
}

impl Services {
    pub fn new(config: ShellgateConfig) -> Result<Self, ShellgateError> {
        let token_verifier = Arc::new(TokenVerifier::new(&config)?);
        let admission = Arc::new(HostAdmission::new(&config));
        let targets = TargetStore::new(&config);
        Ok(Self {
            config: Arc::new(config),
            targets,
            token_verifier,
            admission,
            state: State::new(),
        })
    }
}
