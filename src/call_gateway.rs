use crate::call_store::{CallRecord, CallStatus, CallStore};
use crate::config::TelephonyConfig;
use crate::error::RelayError;
use crate::ivr::CallSession;
use crate::twilio_types::ProviderCall;

use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{debug, error, info};

/// Merged view of provider-reported call state and local correlation data.
/// The provider keeps no relay-specific fields, so phone number, delivery id
/// and response time come from the local record when one exists.
#[derive(Debug, Serialize)]
pub struct CallStatusView {
    pub call_sid: String,
    pub status: String,
    pub phone_number: Option<String>,
    pub delivery_id: Option<String>,
    pub duration: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
    pub end_time: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub response_time: Option<OffsetDateTime>,
}

/// Places calls with the telephony provider and tracks them in the call
/// store.  A record exists only once the provider has accepted the placement
/// and issued a sid; the relay never invents one.
pub struct CallGateway {
    http: reqwest::Client,
    config: TelephonyConfig,
    public_base_url: String,
    calls: Arc<dyn CallStore>,
}

impl CallGateway {
    pub fn new(
        http: reqwest::Client,
        config: TelephonyConfig,
        public_base_url: String,
        calls: Arc<dyn CallStore>,
    ) -> Self {
        Self {
            http,
            config,
            public_base_url,
            calls,
        }
    }

    /// Ask the provider to place a call that renders our order script, then
    /// record it locally as `initiated` under the provider-issued sid.
    pub async fn place_call(
        &self,
        phone_number: &str,
        order_details: &str,
        delivery_id: Option<String>,
    ) -> Result<CallRecord, RelayError> {
        if !self.config.enable_phone_calls {
            return Err(RelayError::CallsDisabled);
        }

        let session = CallSession::new(order_details.to_string(), delivery_id.clone());
        let webhook_url = format!("{}/twilio/twiml?{}", self.public_base_url, session.to_query());
        debug!(%webhook_url, "placing order call");

        let url = format!(
            "{}/2010-04-01/Accounts/{}/Calls.json",
            self.config.api_base_url, self.config.account_sid
        );
        let mut form = HashMap::new();
        form.insert("To", phone_number);
        form.insert("From", self.config.phone_number.as_str());
        form.insert("Url", webhook_url.as_str());
        form.insert("Method", "POST");
        let response = self
            .http
            .post(url)
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&form)
            .send()
            .await
            .map_err(|e| upstream("call placement failed", e))?;
        let call = read_provider_call(response, "place").await?;

        let record = CallRecord {
            call_sid: call.sid,
            phone_number: phone_number.to_string(),
            delivery_id,
            order_details: order_details.to_string(),
            status: CallStatus::Initiated,
            created_at: OffsetDateTime::now_utc(),
            response_time: None,
        };
        self.calls.put(record.clone()).await?;
        info!(call_sid = %record.call_sid, "placed order call");
        Ok(record)
    }

    /// Live provider status merged with the local record.  An unknown sid
    /// still answers with the provider fields and empty correlation data;
    /// status queries never fail on a missing local record.
    pub async fn get_call_status(&self, call_sid: &str) -> Result<CallStatusView, RelayError> {
        let url = format!(
            "{}/2010-04-01/Accounts/{}/Calls/{}.json",
            self.config.api_base_url, self.config.account_sid, call_sid
        );
        let response = self
            .http
            .get(url)
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .send()
            .await
            .map_err(|e| upstream("call fetch failed", e))?;
        let call = read_provider_call(response, "fetch").await?;
        let local = self.calls.get(call_sid).await?;

        let status = normalize_status(call.status.as_deref(), local.as_ref());
        Ok(CallStatusView {
            call_sid: call.sid,
            status,
            phone_number: local.as_ref().map(|r| r.phone_number.clone()),
            delivery_id: local.as_ref().and_then(|r| r.delivery_id.clone()),
            duration: call.duration,
            created_at: local.as_ref().map(|r| r.created_at),
            end_time: call.end_time,
            response_time: local.as_ref().and_then(|r| r.response_time),
        })
    }
}

/// Map the provider's status vocabulary onto the relay's.  A locally settled
/// accept or reject wins over whatever the provider reports, since the
/// provider only knows the call completed.
fn normalize_status(provider: Option<&str>, local: Option<&CallRecord>) -> String {
    if let Some(record) = local {
        if matches!(record.status, CallStatus::Accepted | CallStatus::Rejected) {
            return record.status.as_str().to_string();
        }
    }
    match provider {
        Some("queued" | "ringing" | "in-progress" | "initiated") => "initiated".to_string(),
        Some("completed") => "completed".to_string(),
        Some("busy" | "failed" | "no-answer" | "canceled") => "failed".to_string(),
        Some(other) => other.to_string(),
        None => local
            .map(|r| r.status.as_str().to_string())
            .unwrap_or_else(|| "unknown".to_string()),
    }
}

fn upstream(context: &str, e: reqwest::Error) -> RelayError {
    error!(error = %e, "telephony provider {context}");
    RelayError::Upstream(format!("{context}: {e}"))
}

async fn read_provider_call(
    response: reqwest::Response,
    op: &str,
) -> Result<ProviderCall, RelayError> {
    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<Value>(&text)
            .ok()
            .and_then(|v| {
                v.get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .unwrap_or(text);
        error!(op, %status, %message, "telephony provider returned an error");
        if message.is_empty() {
            return Err(RelayError::Upstream(format!(
                "telephony provider returned {status}"
            )));
        }
        return Err(RelayError::Upstream(message));
    }
    response.json::<ProviderCall>().await.map_err(|e| {
        error!(op, error = %e, "failed to parse telephony provider body");
        RelayError::Upstream(format!("failed to parse telephony provider body: {e}"))
    })
}
