use crate::credential::CredentialBuilder;
use crate::error::RelayError;

use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{debug, error};

/// Everything the partner needs to price a delivery.  Instructions are
/// optional and omitted from the wire payload when absent.
#[derive(Debug, Clone, Serialize)]
pub struct QuotePayload {
    pub external_delivery_id: String,
    pub pickup_address: String,
    pub pickup_business_name: String,
    pub pickup_phone_number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pickup_instructions: Option<String>,
    pub dropoff_address: String,
    pub dropoff_business_name: String,
    pub dropoff_phone_number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dropoff_instructions: Option<String>,
    /// Order value in minor currency units.
    pub order_value: i64,
}

/// Quote / accept / track against the dispatch partner.  Every operation
/// mints a fresh signed credential, and the partner body is returned verbatim
/// with a normalized `status` field mirrored from `delivery_status` so
/// callers never deal in partner-specific names.
pub struct DispatchClient {
    http: reqwest::Client,
    base_url: String,
    credentials: CredentialBuilder,
}

impl DispatchClient {
    pub fn new(http: reqwest::Client, base_url: String, credentials: CredentialBuilder) -> Self {
        Self {
            http,
            base_url,
            credentials,
        }
    }

    /// Price a delivery.  Quotes are time-sensitive, so upstream failures
    /// propagate immediately with no retry.
    pub async fn get_quote(&self, payload: &QuotePayload) -> Result<Map<String, Value>, RelayError> {
        debug!(external_delivery_id = %payload.external_delivery_id, "requesting delivery quote");
        let credential = self.credentials.build();
        let response = self
            .http
            .post(format!("{}/drive/v2/quotes", self.base_url))
            .bearer_auth(&credential.token)
            .json(payload)
            .send()
            .await
            .map_err(|e| upstream("quote request failed", e))?;
        let body = read_partner_body(response, "quote").await?;
        Ok(normalize(body, None))
    }

    /// Commit a quote into an actual delivery.  Must happen inside the
    /// quote's validity window; the optional tip is forwarded only when
    /// present.
    pub async fn accept_quote(
        &self,
        external_delivery_id: &str,
        tip: Option<i64>,
    ) -> Result<Map<String, Value>, RelayError> {
        debug!(external_delivery_id, "accepting delivery quote");
        let credential = self.credentials.build();
        let body = match tip {
            Some(tip) => json!({ "tip": tip }),
            None => json!({}),
        };
        let response = self
            .http
            .post(format!(
                "{}/drive/v2/quotes/{}/accept",
                self.base_url, external_delivery_id
            ))
            .bearer_auth(&credential.token)
            .json(&body)
            .send()
            .await
            .map_err(|e| upstream("accept request failed", e))?;
        let body = read_partner_body(response, "accept").await?;
        Ok(normalize(body, Some("created")))
    }

    /// Read-only status fetch for an existing delivery.
    pub async fn get_delivery(
        &self,
        external_delivery_id: &str,
    ) -> Result<Map<String, Value>, RelayError> {
        let credential = self.credentials.build();
        let response = self
            .http
            .get(format!(
                "{}/drive/v2/deliveries/{}",
                self.base_url, external_delivery_id
            ))
            .bearer_auth(&credential.token)
            .send()
            .await
            .map_err(|e| upstream("delivery fetch failed", e))?;
        let body = read_partner_body(response, "fetch").await?;
        Ok(normalize(body, Some("unknown")))
    }
}

fn upstream(context: &str, e: reqwest::Error) -> RelayError {
    error!(error = %e, "dispatch partner {context}");
    RelayError::Upstream(format!("{context}: {e}"))
}

/// Mirror the partner's `delivery_status` into `status`, falling back to
/// `default_status` when the partner omitted it.
fn normalize(mut body: Map<String, Value>, default_status: Option<&str>) -> Map<String, Value> {
    let status = body
        .get("delivery_status")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| default_status.map(str::to_string));
    if let Some(status) = status {
        body.insert("status".to_string(), Value::String(status));
    }
    body
}

async fn read_partner_body(
    response: reqwest::Response,
    op: &str,
) -> Result<Map<String, Value>, RelayError> {
    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        // Forward the partner's own message when the body carries one.
        let message = serde_json::from_str::<Value>(&text)
            .ok()
            .and_then(|v| {
                v.get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .unwrap_or(text);
        error!(op, %status, %message, "dispatch partner returned an error");
        if message.is_empty() {
            return Err(RelayError::Upstream(format!(
                "dispatch partner returned {status}"
            )));
        }
        return Err(RelayError::Upstream(message));
    }
    match response.json::<Value>().await {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(RelayError::Upstream(
            "dispatch partner returned a non-object body".to_string(),
        )),
        Err(e) => {
            error!(op, error = %e, "failed to parse dispatch partner body");
            Err(RelayError::Upstream(format!(
                "failed to parse dispatch partner body: {e}"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(entries: Value) -> Map<String, Value> {
        match entries {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn normalize_mirrors_delivery_status() {
        let out = normalize(
            body(json!({"external_delivery_id": "d-1", "delivery_status": "quote", "fee": 599})),
            None,
        );
        assert_eq!(out["status"], "quote");
        assert_eq!(out["delivery_status"], "quote");
        assert_eq!(out["fee"], 599);
    }

    #[test]
    fn normalize_defaults_when_partner_omits_status() {
        let out = normalize(body(json!({"external_delivery_id": "d-1"})), Some("created"));
        assert_eq!(out["status"], "created");

        let out = normalize(body(json!({"external_delivery_id": "d-1"})), Some("unknown"));
        assert_eq!(out["status"], "unknown");
    }

    #[test]
    fn normalize_without_default_leaves_status_absent() {
        let out = normalize(body(json!({"external_delivery_id": "d-1"})), None);
        assert!(!out.contains_key("status"));
    }

    #[test]
    fn quote_payload_omits_absent_instructions() {
        let payload = QuotePayload {
            external_delivery_id: "d-1".to_string(),
            pickup_address: "1 Main St".to_string(),
            pickup_business_name: "Taqueria".to_string(),
            pickup_phone_number: "+15550100".to_string(),
            pickup_instructions: None,
            dropoff_address: "2 Oak Ave".to_string(),
            dropoff_business_name: "Office".to_string(),
            dropoff_phone_number: "+15550101".to_string(),
            dropoff_instructions: Some("Ring twice".to_string()),
            order_value: 1999,
        };
        let wire = serde_json::to_value(&payload).unwrap();
        assert!(wire.get("pickup_instructions").is_none());
        assert_eq!(wire["dropoff_instructions"], "Ring twice");
        assert_eq!(wire["order_value"], 1999);
    }
}
