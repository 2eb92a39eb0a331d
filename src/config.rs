use std::env;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("missing required environment variables: {0}")]
pub struct ConfigError(pub String);

/// Identity and endpoint for the courier dispatch partner.
#[derive(Clone, Debug)]
pub struct DispatchConfig {
    pub developer_id: String,
    pub key_id: String,
    /// Base64-encoded symmetric signing secret.
    pub signing_secret: String,
    pub base_url: String,
}

/// Account and endpoint for the telephony provider.
#[derive(Clone, Debug)]
pub struct TelephonyConfig {
    pub account_sid: String,
    pub auth_token: String,
    /// Number calls are placed from.
    pub phone_number: String,
    /// Number handed to clients for test calls.
    pub test_phone_number: Option<String>,
    pub api_base_url: String,
    pub enable_phone_calls: bool,
}

#[derive(Clone, Debug)]
pub struct RelayConfig {
    /// Shared secret expected in the X-Relay-Secret header on /relay routes.
    pub relay_secret: String,
    pub port: u16,
    /// Publicly reachable base URL used when building webhook callback URLs.
    pub public_base_url: String,
    pub database_url: Option<String>,
    pub dispatch: DispatchConfig,
    pub telephony: TelephonyConfig,
}

fn optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

impl RelayConfig {
    /// Read configuration from the environment, collecting every missing
    /// required variable into one error so the process fails fast at start.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut missing = Vec::new();
        let mut require = |name: &'static str| {
            optional(name).unwrap_or_else(|| {
                missing.push(name);
                String::new()
            })
        };

        let config = RelayConfig {
            relay_secret: require("RELAY_SECRET"),
            port: optional("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            public_base_url: require("BASE_URL"),
            database_url: optional("DATABASE_URL"),
            dispatch: DispatchConfig {
                developer_id: require("DOORDASH_DEVELOPER_ID"),
                key_id: require("DOORDASH_KEY_ID"),
                signing_secret: require("DOORDASH_SIGNING_SECRET"),
                base_url: optional("DOORDASH_BASE_URL")
                    .unwrap_or_else(|| "https://openapi.doordash.com".to_string()),
            },
            telephony: TelephonyConfig {
                account_sid: require("TWILIO_ACCOUNT_SID"),
                auth_token: require("TWILIO_AUTH_TOKEN"),
                phone_number: require("TWILIO_PHONE_NUMBER"),
                test_phone_number: optional("TEST_PHONE_NUMBER"),
                api_base_url: optional("TWILIO_API_BASE_URL")
                    .unwrap_or_else(|| "https://api.twilio.com".to_string()),
                enable_phone_calls: optional("ENABLE_PHONE_CALLS").as_deref() == Some("true"),
            },
        };

        if missing.is_empty() {
            Ok(config)
        } else {
            Err(ConfigError(missing.join(", ")))
        }
    }
}
