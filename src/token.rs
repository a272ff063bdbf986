//! Manage json web tokens.
//!
//! One [`TokenManager`] signs and verifies with exactly one algorithm, chosen
//! at construction. Login tokens open a session, Verify and Reset tokens are
//! short-lived links bound to the account state they act on.

use std::str::FromStr;
use std::sync::Arc;

use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode,
};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::config::Configuration;
use crate::user::{Account, Kind, Role};

const DEFAULT_AUDIENCE: &str = "portal";
const DEFAULT_ISSUER: &str = "portal-auth";
const SECRET_LENGTH: usize = 64;
const RSA_BITS: usize = 2048;

type Result<T> = std::result::Result<T, TokenError>;

#[derive(thiserror::Error, Debug)]
pub enum TokenError {
    /// Malformed, forged, expired or misused token.
    #[error("invalid token")]
    Invalid,
    #[error("unsupported algorithm `{0}`")]
    Algorithm(String),
    #[error("no key available for {0:?}, provide `private_key_pem` and `public_key_pem`")]
    MissingKey(Algorithm),
    #[error("cannot generate key: {0}")]
    Generate(String),
    #[error(transparent)]
    Jwt(#[from] jsonwebtoken::errors::Error),
}

/// Purpose of a token.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    /// Session token.
    #[default]
    Login,
    /// Email verification link.
    Verify,
    /// Password reset link.
    Reset,
}

/// Pieces of information asserted on a JWT.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Store identifier of the account.
    pub id: String,
    pub uid: String,
    pub role: Role,
    pub username: String,
    pub email: Option<String>,
    pub name: Option<String>,
    /// Authentication method that owns the account.
    pub auth: Kind,
    pub kind: TokenKind,
    /// Identifies the time at which the JWT was issued.
    pub iat: u64,
    /// Identifies the expiration time on or after which the JWT must not be
    /// accepted for processing.
    pub exp: u64,
    /// Identifies the organization that issued the JWT.
    pub iss: String,
    /// Recipients that the JWT is intended for.
    pub aud: String,
    pub jti: String,
    /// Digest of the account state a link acts on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
}

/// Manage JWT tokens.
#[derive(Clone)]
pub struct TokenManager {
    algorithm: Algorithm,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    audience: String,
    login_ttl: u64,
    verify_ttl: u64,
    clock: Arc<dyn Clock>,
}

impl TokenManager {
    /// Create a new [`TokenManager`] from `token` section.
    ///
    /// Without key material a key is generated for the process lifetime.
    pub fn new(config: &Configuration, clock: Arc<dyn Clock>) -> Result<Self> {
        let cfg = &config.token;
        let algorithm = Algorithm::from_str(&cfg.algorithm)
            .map_err(|_| TokenError::Algorithm(cfg.algorithm.clone()))?;

        let (encoding_key, decoding_key) = match algorithm {
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => {
                let secret = match cfg.secret.as_deref() {
                    Some(secret) if !secret.is_empty() => {
                        secret.as_bytes().to_vec()
                    },
                    _ => {
                        tracing::warn!(
                            ?algorithm,
                            "no token secret configured, tokens will not survive restart"
                        );
                        let mut secret = vec![0u8; SECRET_LENGTH];
                        OsRng.fill_bytes(&mut secret);
                        secret
                    },
                };

                (
                    EncodingKey::from_secret(&secret),
                    DecodingKey::from_secret(&secret),
                )
            },
            Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512 => {
                let (private, public) = match pem_pair(config) {
                    Some(pair) => pair,
                    None => generate_rsa(algorithm)?,
                };

                (
                    EncodingKey::from_rsa_pem(private.as_bytes())?,
                    DecodingKey::from_rsa_pem(public.as_bytes())?,
                )
            },
            Algorithm::ES256 | Algorithm::ES384 => {
                let (private, public) = match pem_pair(config) {
                    Some(pair) => pair,
                    None if algorithm == Algorithm::ES256 => generate_p256()?,
                    None => return Err(TokenError::MissingKey(algorithm)),
                };

                (
                    EncodingKey::from_ec_pem(private.as_bytes())?,
                    DecodingKey::from_ec_pem(public.as_bytes())?,
                )
            },
            Algorithm::EdDSA => {
                let (private, public) = pem_pair(config)
                    .ok_or(TokenError::MissingKey(algorithm))?;

                (
                    EncodingKey::from_ed_pem(private.as_bytes())?,
                    DecodingKey::from_ed_pem(public.as_bytes())?,
                )
            },
        };

        let issuer = if config.url.is_empty() {
            DEFAULT_ISSUER.to_owned()
        } else {
            config.url.clone()
        };

        Ok(Self {
            algorithm,
            encoding_key,
            decoding_key,
            issuer,
            audience: cfg
                .audience
                .clone()
                .unwrap_or_else(|| DEFAULT_AUDIENCE.to_owned()),
            login_ttl: cfg.login_ttl,
            verify_ttl: cfg.verify_ttl,
            clock,
        })
    }

    /// Signing algorithm.
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Default lifetime of a token of this kind.
    pub fn ttl(&self, kind: TokenKind) -> u64 {
        match kind {
            TokenKind::Login => self.login_ttl,
            TokenKind::Verify | TokenKind::Reset => self.verify_ttl,
        }
    }

    /// Sign a token for `account` valid `ttl` seconds.
    pub fn issue(
        &self,
        account: &Account,
        kind: TokenKind,
        ttl: u64,
    ) -> Result<String> {
        let now = self.clock.now();
        let claims = Claims {
            id: account.id.clone(),
            uid: account.uid.clone(),
            role: account.role,
            username: account.username.clone(),
            email: account.email.clone(),
            name: account.name.clone(),
            auth: account.kind,
            kind,
            iat: now,
            exp: now.saturating_add(ttl),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            jti: uuid::Uuid::new_v4().to_string(),
            fingerprint: fingerprint(account, kind),
        };

        Ok(encode(&Header::new(self.algorithm), &claims, &self.encoding_key)?)
    }

    /// Sign a token with the default lifetime of its kind.
    pub fn create(&self, account: &Account, kind: TokenKind) -> Result<String> {
        self.issue(account, kind, self.ttl(kind))
    }

    /// Decode and check a token.
    pub fn parse(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::new(self.algorithm);
        validation.set_audience(&[&self.audience]);
        validation.set_issuer(&[&self.issuer]);
        // Expiry is compared against the injected clock below.
        validation.validate_exp = false;

        let claims = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|err| {
                tracing::debug!(error = %err, "token rejected");
                TokenError::Invalid
            })?
            .claims;

        if self.clock.now() >= claims.exp {
            return Err(TokenError::Invalid);
        }

        Ok(claims)
    }

    /// Decode a token and make sure it was issued for `kind`.
    pub fn parse_kind(&self, token: &str, kind: TokenKind) -> Result<Claims> {
        let claims = self.parse(token)?;
        if claims.kind != kind {
            return Err(TokenError::Invalid);
        }

        Ok(claims)
    }

    /// Check whether a token would be accepted.
    pub fn validate(&self, token: &str) -> bool {
        self.parse(token).is_ok()
    }
}

/// State digest a link is bound to.
///
/// A verification link covers the staged email, a reset link covers the
/// current password hash. Once consumed, the state moves and the link dies.
pub fn fingerprint(account: &Account, kind: TokenKind) -> Option<String> {
    match kind {
        TokenKind::Login => None,
        TokenKind::Verify => account
            .unverified_email
            .as_deref()
            .map(crate::crypto::fingerprint),
        TokenKind::Reset => Some(crate::crypto::fingerprint(
            account.password.as_deref().unwrap_or_default(),
        )),
    }
}

fn pem_pair(config: &Configuration) -> Option<(String, String)> {
    config
        .token
        .private_key_pem
        .clone()
        .zip(config.token.public_key_pem.clone())
        .filter(|(private, public)| !private.is_empty() && !public.is_empty())
}

fn generate_rsa(algorithm: Algorithm) -> Result<(String, String)> {
    use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};

    tracing::warn!(
        ?algorithm,
        "no RSA key configured, tokens will not survive restart"
    );

    let private = rsa::RsaPrivateKey::new(&mut OsRng, RSA_BITS)
        .map_err(|err| TokenError::Generate(err.to_string()))?;
    let public = rsa::RsaPublicKey::from(&private);

    let private_pem = private
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|err| TokenError::Generate(err.to_string()))?;
    let public_pem = public
        .to_public_key_pem(LineEnding::LF)
        .map_err(|err| TokenError::Generate(err.to_string()))?;

    Ok((private_pem.to_string(), public_pem))
}

fn generate_p256() -> Result<(String, String)> {
    use p256::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};

    tracing::warn!("no EC key configured, tokens will not survive restart");

    let secret = p256::SecretKey::random(&mut OsRng);
    let private_pem = secret
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|err| TokenError::Generate(err.to_string()))?;
    let public_pem = secret
        .public_key()
        .to_public_key_pem(LineEnding::LF)
        .map_err(|err| TokenError::Generate(err.to_string()))?;

    Ok((private_pem.to_string(), public_pem))
}

#[cfg(test)]
pub(crate) fn test_token_manager(
    clock: Arc<dyn Clock>,
    secret: &str,
) -> TokenManager {
    let mut config = Configuration::default();
    config.token.algorithm = "HS256".into();
    config.token.secret = Some(secret.into());
    TokenManager::new(&config, clock).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;

    const NOW: u64 = 1_700_000_000;

    fn account() -> Account {
        Account {
            id: "42".into(),
            uid: "c3a2e6b4-uid".into(),
            username: "u1@x.com".into(),
            password: Some("$argon2id$v=19$m=1024,t=1,p=1$c2FsdA$aGFzaA".into()),
            unverified_email: Some("u1@x.com".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_login_token_lifetime() {
        let clock = Arc::new(FixedClock::new(NOW));
        let token = test_token_manager(clock.clone(), "secret");

        let jwt = token.issue(&account(), TokenKind::Login, 60).unwrap();
        assert!(token.validate(&jwt));

        let claims = token.parse(&jwt).unwrap();
        assert_eq!(claims.uid, "c3a2e6b4-uid");
        assert_eq!(claims.iat, NOW);
        assert_eq!(claims.exp, NOW + 60);
        assert_eq!(claims.kind, TokenKind::Login);
        assert!(claims.fingerprint.is_none());

        clock.advance(59);
        assert!(token.validate(&jwt));
        clock.advance(1);
        assert!(!token.validate(&jwt));
        assert!(matches!(token.parse(&jwt), Err(TokenError::Invalid)));
    }

    #[test]
    fn test_huge_lifetime_saturates() {
        let clock = Arc::new(FixedClock::new(NOW));
        let token = test_token_manager(clock, "secret");

        let jwt = token.issue(&account(), TokenKind::Login, u64::MAX).unwrap();
        let claims = token.parse(&jwt).unwrap();
        assert_eq!(claims.exp, u64::MAX);
    }

    #[test]
    fn test_foreign_key_rejected() {
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(NOW));
        let ours = test_token_manager(clock.clone(), "secret");
        let theirs = test_token_manager(clock, "another secret");

        let jwt = theirs.create(&account(), TokenKind::Login).unwrap();
        assert!(matches!(ours.parse(&jwt), Err(TokenError::Invalid)));
        assert!(matches!(
            crate::error::ServerError::from(ours.parse(&jwt).unwrap_err()),
            crate::error::ServerError::InvalidAccessToken
        ));
    }

    #[test]
    fn test_algorithm_substitution_rejected() {
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(NOW));
        let hs256 = test_token_manager(clock.clone(), "secret");

        let mut config = Configuration::default();
        config.token.algorithm = "HS512".into();
        config.token.secret = Some("secret".into());
        let hs512 = TokenManager::new(&config, clock).unwrap();

        let jwt = hs512.create(&account(), TokenKind::Login).unwrap();
        assert!(!hs256.validate(&jwt));
        assert!(hs512.validate(&jwt));
    }

    #[test]
    fn test_kind_is_enforced() {
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(NOW));
        let token = test_token_manager(clock, "secret");

        let link = token.create(&account(), TokenKind::Verify).unwrap();
        assert!(token.parse_kind(&link, TokenKind::Verify).is_ok());
        assert!(token.parse_kind(&link, TokenKind::Login).is_err());
        assert!(token.parse_kind(&link, TokenKind::Reset).is_err());

        let claims = token.parse(&link).unwrap();
        assert_eq!(claims.exp - claims.iat, crate::config::DEFAULT_VERIFY_TTL);
        assert_eq!(
            claims.fingerprint.as_deref(),
            Some(crate::crypto::fingerprint("u1@x.com").as_str())
        );
    }

    #[test]
    fn test_garbage_rejected() {
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(NOW));
        let token = test_token_manager(clock, "secret");

        assert!(!token.validate(""));
        assert!(!token.validate("a.b.c"));
        assert!(!token.validate("not a jwt"));
    }

    #[test]
    fn test_es256_generated_key() {
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(NOW));
        let mut config = Configuration::default();
        config.token.algorithm = "ES256".into();
        let token = TokenManager::new(&config, clock).unwrap();

        let jwt = token.create(&account(), TokenKind::Login).unwrap();
        assert_eq!(token.algorithm(), Algorithm::ES256);
        assert_eq!(token.parse(&jwt).unwrap().username, "u1@x.com");
    }

    #[test]
    fn test_unknown_algorithm() {
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(NOW));
        let mut config = Configuration::default();
        config.token.algorithm = "none".into();
        assert!(matches!(
            TokenManager::new(&config, clock),
            Err(TokenError::Algorithm(_))
        ));
    }
}
