use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use shellgate_common::{Principal, ShellgateConfig, ShellgateError};
use tracing::*;

#[derive(Deserialize)]
struct Claims {
    #[serde(default)]
    sub: Option<String>,
}

/// Validates the bearer token presented in the session handshake.
/// The mode is decided once at startup; `USE_AUTH=false` turns every
/// session into a synthetic "anonymous" principal.
pub struct TokenVerifier {
    mode: VerifierMode,
}

enum VerifierMode {
    Enforced {
        key: DecodingKey,
        validation: Validation,
    },
    Disabled,
}

impl TokenVerifier {
    pub fn new(config: &ShellgateConfig) -> Result<Self, ShellgateError> {
        if !config.enforce_auth {
            warn!("Token verification is disabled (USE_AUTH=false)");
            return Ok(Self {
                mode: VerifierMode::Disabled,
            });
        }
        let secret = config
            .jwt_secret
            .as_ref()
            .ok_or(ShellgateError::MissingJwtSecret)?;
        Ok(Self {
            mode: VerifierMode::Enforced {
                key: DecodingKey::from_secret(secret.expose_secret().as_bytes()),
                validation: Validation::new(Algorithm::HS256),
            },
        })
    }

    pub fn verify(&self, token: Option<&str>) -> Result<Principal, ShellgateError> {
        match &self.mode {
            VerifierMode::Disabled => Ok(Principal::new("anonymous")),
            VerifierMode::Enforced { key, validation } => {
                let token = token.ok_or(ShellgateError::InvalidToken)?;
                let data = decode::<Claims>(token, key, validation)
                    .map_err(|_| ShellgateError::InvalidToken)?;
                Ok(Principal::new(
                    data.claims.sub.unwrap_or_else(|| "user".to_owned()),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use jsonwebtoken::{encode, get_current_timestamp, EncodingKey, Header};
    use serde::Serialize;
    use shellgate_common::Secret;

    use super::*;

    #[derive(Serialize)]
    struct TestClaims {
        sub: String,
        exp: u64,
    }

    fn config(enforce: bool) -> ShellgateConfig {
        ShellgateConfig {
            port: 3001,
            data_dir: ".".into(),
            jwt_secret: Some(Secret::new("test-secret".to_owned())),
            enforce_auth: enforce,
            allowed_ssh_hosts: vec![],
            cors_origins: vec![],
        }
    }

    fn token(secret: &str, exp_offset: i64) -> String {
        let claims = TestClaims {
            sub: "ada".to_owned(),
            exp: get_current_timestamp().saturating_add_signed(exp_offset),
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn test_valid_token_yields_principal() {
        let verifier = TokenVerifier::new(&config(true)).unwrap();
        let token = token("test-secret", 3600);
        let principal = verifier.verify(Some(&token)).unwrap();
        assert_eq!(principal.name(), "ada");
    }

    #[test]
    fn test_missing_token_is_invalid() {
        let verifier = TokenVerifier::new(&config(true)).unwrap();
        assert!(matches!(
            verifier.verify(None),
            Err(ShellgateError::InvalidToken)
        ));
    }

    #[test]
    fn test_garbage_token_is_invalid() {
        let verifier = TokenVerifier::new(&config(true)).unwrap();
        assert!(verifier.verify(Some("not-a-jwt")).is_err());
    }

    #[test]
    fn test_wrong_key_is_invalid() {
        let verifier = TokenVerifier::new(&config(true)).unwrap();
        let token = token("other-secret", 3600);
        assert!(verifier.verify(Some(&token)).is_err());
    }

    #[test]
    fn test_expired_token_is_invalid() {
        let verifier = TokenVerifier::new(&config(true)).unwrap();
        let token = token("test-secret", -3600);
        assert!(verifier.verify(Some(&token)).is_err());
    }

    #[test]
    fn test_disabled_mode_accepts_missing_token() {
        let verifier = TokenVerifier::new(&config(false)).unwrap();
        let principal = verifier.verify(None).unwrap();
        assert_eq!(principal.name(), "anonymous");
    }
}
