use std::path::{Path, PathBuf};

use crate::{Secret, ShellgateError};

const DEFAULT_PORT: u16 = 3001;
pub const TARGETS_FILE_NAME: &str = "servers.json";

/// Process configuration, read once from the environment at startup.
/// Verification and admission modes are fixed for the process lifetime.
#[derive(Debug, Clone)]
pub struct ShellgateConfig {
    pub port: u16,
    pub data_dir: PathBuf,
    pub jwt_secret: Option<Secret<String>>,
    pub enforce_auth: bool,
    pub allowed_ssh_hosts: Vec<String>,
    pub cors_origins: Vec<String>,
}

impl ShellgateConfig {
    pub fn from_env() -> Result<Self, ShellgateError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup<F>(get: F) -> Result<Self, ShellgateError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = match get("PORT") {
            Some(raw) => raw
                .parse()
                .map_err(|_| ShellgateError::InvalidEnvValue("PORT", raw))?,
            None => DEFAULT_PORT,
        };

        // Only the literal "false" disables token verification.
        let enforce_auth = get("USE_AUTH").as_deref() != Some("false");
        let jwt_secret = get("JWT_SECRET").map(Secret::new);
        if enforce_auth && jwt_secret.is_none() {
            return Err(ShellgateError::MissingJwtSecret);
        }

        Ok(Self {
            port,
            data_dir: get("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(default_data_dir),
            jwt_secret,
            enforce_auth,
            allowed_ssh_hosts: split_list(get("ALLOWED_SSH_HOSTS").as_deref()),
            cors_origins: split_list(get("CORS_ORIGIN").as_deref()),
        })
    }

    pub fn targets_path(&self) -> PathBuf {
        self.data_dir.join(TARGETS_FILE_NAME)
    }
}

fn default_data_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn split_list(raw: Option<&str>) -> Vec<String> {
    raw.map(|raw| {
        raw.split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(str::to_owned)
            .collect()
    })
    .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(vars: &[(&str, &str)]) -> Result<ShellgateConfig, ShellgateError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ShellgateConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[("JWT_SECRET", "s")]).unwrap();
        assert_eq!(config.port, 3001);
        assert!(config.enforce_auth);
        assert!(config.allowed_ssh_hosts.is_empty());
        assert!(config.cors_origins.is_empty());
    }

    #[test]
    fn test_auth_disabled_needs_no_secret() {
        let config = config_from(&[("USE_AUTH", "false")]).unwrap();
        assert!(!config.enforce_auth);
        assert!(config.jwt_secret.is_none());
    }

    #[test]
    fn test_enforced_auth_without_secret_is_an_error() {
        assert!(matches!(
            config_from(&[]),
            Err(ShellgateError::MissingJwtSecret)
        ));
    }

    #[test]
    fn test_use_auth_must_be_the_literal_false() {
        assert!(matches!(
            config_from(&[("USE_AUTH", "no")]),
            Err(ShellgateError::MissingJwtSecret)
        ));
    }

    #[test]
    fn test_invalid_port_is_an_error() {
        assert!(matches!(
            config_from(&[("JWT_SECRET", "s"), ("PORT", "70000")]),
            Err(ShellgateError::InvalidEnvValue("PORT", _))
        ));
    }

    #[test]
    fn test_host_list_is_split_and_trimmed() {
        let config = config_from(&[
            ("JWT_SECRET", "s"),
            ("ALLOWED_SSH_HOSTS", "10.0.0.2, 10.0.0.3 ,,"),
        ])
        .unwrap();
        assert_eq!(config.allowed_ssh_hosts, vec!["10.0.0.2", "10.0.0.3"]);
    }

    #[test]
    fn test_data_dir_override() {
        let config = config_from(&[("JWT_SECRET", "s"), ("DATA_DIR", "/var/lib/shellgate")]).unwrap();
        assert_eq!(config.targets_path(), PathBuf::from("/var/lib/shellgate/servers.json"));
    }
}
