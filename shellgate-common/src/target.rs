use serde::{Deserialize, Serialize};

use crate::Secret;

fn _default_ssh_port() -> u16 {
    22
}

/// A pre-registered SSH endpoint. The store file is maintained by the
/// external inventory API; `(host, username, port)` uniqueness is its
/// invariant and is assumed here.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct Target {
    pub id: String,
    pub host: String,
    #[serde(default = "_default_ssh_port")]
    pub port: u16,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Client-supplied credentials for the outbound SSH hop. Arrives in the
/// session handshake and is never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientAuth {
    Password(SshPasswordAuth),
    PrivateKey(SshPrivateKeyAuth),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshPasswordAuth {
    pub password: Secret<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshPrivateKeyAuth {
    pub pem: Secret<String>,
    pub passphrase: Option<Secret<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_port_defaults_to_22() {
        let target: Target =
            serde_json::from_str(r#"{"id":"t1","host":"10.0.0.2","username":"ada"}"#).unwrap();
        assert_eq!(target.port, 22);
    }

    #[test]
    fn test_target_keeps_explicit_port() {
        let target: Target =
            serde_json::from_str(r#"{"id":"t1","host":"10.0.0.2","port":2222,"username":"ada"}"#)
                .unwrap();
        assert_eq!(target.port, 2222);
    }
}
