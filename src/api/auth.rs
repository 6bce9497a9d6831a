use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::Context;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

// token sign key
const SECRET_KEY: &[u8] = b"something secret here";
// token subject authorizing privileged operations
const SUPERUSER: &str = "superuser";

const ENV_ADMIN_USER: &str = "ADMIN_USER";
const ENV_ADMIN_PASSWORD: &str = "ADMIN_PASSWORD";

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    alg: String,
    typ: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    iat: u64,
    exp: u64,
}

/// Authentication, Authorization, Accounting.
///
/// A single admin credential pair comes from the environment; a successful
/// login mints an HS256 JWT with the `superuser` subject and the configured
/// lifetime. `verify` accepts exactly what `login` mints: HS256, a valid
/// signature over header.claims, unexpired, superuser subject.
pub struct Aaa {
    users: HashMap<String, String>,
    token_ttl: Duration,
}

impl Aaa {
    pub fn from_env(token_ttl: Duration) -> anyhow::Result<Self> {
        let user = std::env::var(ENV_ADMIN_USER)
            .context("could not get admin user from environment")?;
        let password = std::env::var(ENV_ADMIN_PASSWORD)
            .context("could not get admin password from environment")?;

        Ok(Self::with_credentials(&user, &password, token_ttl))
    }

    pub fn with_credentials(user: &str, password: &str, token_ttl: Duration) -> Self {
        let mut users = HashMap::new();
        users.insert(user.to_string(), password.to_string());
        Self { users, token_ttl }
    }

    pub fn login(&self, name: &str, password: &str) -> Result<String> {
        match self.users.get(name) {
            Some(expected) if expected == password => {}
            _ => return Err(Error::Unauthorized),
        }

        let now = unix_now();
        let claims = Claims {
            sub: SUPERUSER.to_string(),
            iat: now,
            exp: now + self.token_ttl.as_secs(),
        };
        self.sign(&claims)
    }

    fn sign(&self, claims: &Claims) -> Result<String> {
        let header = Header {
            alg: "HS256".to_string(),
            typ: "JWT".to_string(),
        };

        let header_b64 = URL_SAFE_NO_PAD.encode(
            serde_json::to_vec(&header).map_err(|e| Error::Internal(e.into()))?,
        );
        let claims_b64 = URL_SAFE_NO_PAD.encode(
            serde_json::to_vec(claims).map_err(|e| Error::Internal(e.into()))?,
        );

        let signing_input = format!("{}.{}", header_b64, claims_b64);
        let mut mac = HmacSha256::new_from_slice(SECRET_KEY)
            .map_err(|e| Error::internal(format!("cannot build signer: {}", e)))?;
        mac.update(signing_input.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        Ok(format!("{}.{}", signing_input, signature))
    }

    pub fn verify(&self, token: &str) -> Result<()> {
        if token.is_empty() {
            return Err(Error::Unauthorized);
        }

        let parts: Vec<&str> = token.split('.').collect();
        if parts.len() != 3 {
            return Err(Error::Unauthorized);
        }

        let header_raw = URL_SAFE_NO_PAD
            .decode(parts[0])
            .map_err(|_| Error::Unauthorized)?;
        let header: Header =
            serde_json::from_slice(&header_raw).map_err(|_| Error::Unauthorized)?;
        // We only ever mint HMAC-SHA256; anything else is forged.
        if header.alg != "HS256" {
            return Err(Error::Unauthorized);
        }

        let signing_input = format!("{}.{}", parts[0], parts[1]);
        let mut mac = HmacSha256::new_from_slice(SECRET_KEY)
            .map_err(|_| Error::Unauthorized)?;
        mac.update(signing_input.as_bytes());
        let signature = URL_SAFE_NO_PAD
            .decode(parts[2])
            .map_err(|_| Error::Unauthorized)?;
        mac.verify_slice(&signature)
            .map_err(|_| Error::Unauthorized)?;

        let claims_raw = URL_SAFE_NO_PAD
            .decode(parts[1])
            .map_err(|_| Error::Unauthorized)?;
        let claims: Claims =
            serde_json::from_slice(&claims_raw).map_err(|_| Error::Unauthorized)?;

        if claims.exp <= unix_now() {
            return Err(Error::Unauthorized);
        }
        if claims.sub != SUPERUSER {
            return Err(Error::Unauthorized);
        }

        Ok(())
    }

    /// Mint a token with an arbitrary subject, bypassing the credential check.
    #[cfg(test)]
    pub(crate) fn mint_with_subject(&self, sub: &str) -> String {
        let now = unix_now();
        let claims = Claims {
            sub: sub.to_string(),
            iat: now,
            exp: now + 3600,
        };
        self.sign(&claims).expect("signing cannot fail in tests")
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_secs()
}
