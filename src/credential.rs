use crate::consts::CREDENTIAL_TTL_SECS;

use base64::{engine::general_purpose, Engine};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("signing secret is not valid base64: {0}")]
    BadSecret(#[from] base64::DecodeError),
}

/// Compact JWS header the dispatch partner expects.  The partner's token
/// scheme carries a custom version field alongside the key identity, which is
/// why the token is assembled by hand rather than through a JWT crate.
#[derive(Serialize)]
struct Header<'a> {
    alg: &'static str,
    typ: &'static str,
    #[serde(rename = "dd-ver")]
    version: &'static str,
    kid: &'a str,
}

#[derive(Serialize)]
struct Claims<'a> {
    aud: &'static str,
    iss: &'a str,
    kid: &'a str,
    iat: i64,
    exp: i64,
    /// Unique per token so consecutive credentials never collide.
    jti: String,
}

/// Ephemeral bearer credential for the dispatch partner API.
pub struct SignedCredential {
    pub token: String,
    pub issued_at: i64,
    pub expires_at: i64,
}

/// Mints a fresh short-lived credential per outbound call.  The signing
/// secret is decoded once at construction so a malformed configuration fails
/// at process start, not per request.
pub struct CredentialBuilder {
    developer_id: String,
    key_id: String,
    secret: Vec<u8>,
}

impl CredentialBuilder {
    pub fn new(
        developer_id: String,
        key_id: String,
        base64_secret: &str,
    ) -> Result<Self, CredentialError> {
        let secret = general_purpose::STANDARD.decode(base64_secret)?;
        Ok(Self {
            developer_id,
            key_id,
            secret,
        })
    }

    pub fn build(&self) -> SignedCredential {
        let issued_at = OffsetDateTime::now_utc().unix_timestamp();
        let expires_at = issued_at + CREDENTIAL_TTL_SECS;
        let header = Header {
            alg: "HS256",
            typ: "JWT",
            version: "DD-JWT-V1",
            kid: &self.key_id,
        };
        let claims = Claims {
            aud: "doordash",
            iss: &self.developer_id,
            kid: &self.key_id,
            iat: issued_at,
            exp: expires_at,
            jti: Uuid::new_v4().to_string(),
        };

        let enc = |bytes: &[u8]| general_purpose::URL_SAFE_NO_PAD.encode(bytes);
        let signing_input = format!(
            "{}.{}",
            enc(&serde_json::to_vec(&header).unwrap()),
            enc(&serde_json::to_vec(&claims).unwrap()),
        );
        // HMAC accepts keys of any length.
        let mut mac = HmacSha256::new_from_slice(&self.secret).unwrap();
        mac.update(signing_input.as_bytes());
        let signature = mac.finalize().into_bytes();

        SignedCredential {
            token: format!("{signing_input}.{}", enc(&signature)),
            issued_at,
            expires_at,
        }
    }
}
