use crate::error::RelayError;

use async_trait::async_trait;
use serde::Serialize;
use sqlx::{Pool, Postgres};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Mutex;
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    Initiated,
    Accepted,
    Rejected,
    Completed,
    Failed,
}

impl CallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallStatus::Initiated => "initiated",
            CallStatus::Accepted => "accepted",
            CallStatus::Rejected => "rejected",
            CallStatus::Completed => "completed",
            CallStatus::Failed => "failed",
        }
    }
}

impl FromStr for CallStatus {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "initiated" => Ok(CallStatus::Initiated),
            "accepted" => Ok(CallStatus::Accepted),
            "rejected" => Ok(CallStatus::Rejected),
            "completed" => Ok(CallStatus::Completed),
            "failed" => Ok(CallStatus::Failed),
            other => Err(RelayError::Internal(format!(
                "unknown stored call status: {other}"
            ))),
        }
    }
}

/// The relay's local view of an in-flight phone call, keyed by the
/// provider-issued call sid.
#[derive(Debug, Clone, Serialize)]
pub struct CallRecord {
    pub call_sid: String,
    pub phone_number: String,
    /// Optional, non-unique correlation to a delivery; calls may exist with
    /// no associated delivery.
    pub delivery_id: Option<String>,
    /// Free text spoken on the call.
    pub order_details: String,
    pub status: CallStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub response_time: Option<OffsetDateTime>,
}

/// Keyed access to call records.  Call-site logic never touches a shared map
/// directly, so the backend can be swapped without changing handlers.
#[async_trait]
pub trait CallStore: Send + Sync {
    async fn get(&self, call_sid: &str) -> Result<Option<CallRecord>, RelayError>;
    async fn put(&self, record: CallRecord) -> Result<(), RelayError>;
    /// Transition a record out of `initiated`.  Returns false when the sid is
    /// unknown or the record already holds a terminal status; a settled call
    /// is never silently overwritten.
    async fn update_status(
        &self,
        call_sid: &str,
        status: CallStatus,
        response_time: OffsetDateTime,
    ) -> Result<bool, RelayError>;
}

/// Process-lifetime store.  Lost on restart; fine for a single instance.
#[derive(Default)]
pub struct MemoryCallStore {
    calls: Mutex<HashMap<String, CallRecord>>,
}

impl MemoryCallStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CallStore for MemoryCallStore {
    async fn get(&self, call_sid: &str) -> Result<Option<CallRecord>, RelayError> {
        let calls = self.calls.lock().unwrap();
        Ok(calls.get(call_sid).cloned())
    }

    async fn put(&self, record: CallRecord) -> Result<(), RelayError> {
        let mut calls = self.calls.lock().unwrap();
        calls.entry(record.call_sid.clone()).or_insert(record);
        Ok(())
    }

    async fn update_status(
        &self,
        call_sid: &str,
        status: CallStatus,
        response_time: OffsetDateTime,
    ) -> Result<bool, RelayError> {
        let mut calls = self.calls.lock().unwrap();
        match calls.get_mut(call_sid) {
            Some(record) if record.status == CallStatus::Initiated => {
                record.status = status;
                record.response_time = Some(response_time);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

/// Durable store backed by postgres so in-flight call state survives restarts
/// and can be shared across instances.
pub struct PgCallStore {
    pool: Pool<Postgres>,
}

impl PgCallStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct CallRow {
    call_sid: String,
    phone_number: String,
    delivery_id: Option<String>,
    order_details: String,
    status: String,
    created_at: OffsetDateTime,
    response_time: Option<OffsetDateTime>,
}

impl CallRow {
    fn into_record(self) -> Result<CallRecord, RelayError> {
        Ok(CallRecord {
            status: self.status.parse()?,
            call_sid: self.call_sid,
            phone_number: self.phone_number,
            delivery_id: self.delivery_id,
            order_details: self.order_details,
            created_at: self.created_at,
            response_time: self.response_time,
        })
    }
}

#[async_trait]
impl CallStore for PgCallStore {
    async fn get(&self, call_sid: &str) -> Result<Option<CallRecord>, RelayError> {
        let row = sqlx::query_as::<_, CallRow>(
            "SELECT call_sid, phone_number, delivery_id, order_details, status, \
             created_at, response_time \
             FROM call_records WHERE call_sid = $1",
        )
        .bind(call_sid)
        .fetch_optional(&self.pool)
        .await?;
        row.map(CallRow::into_record).transpose()
    }

    async fn put(&self, record: CallRecord) -> Result<(), RelayError> {
        sqlx::query(
            "INSERT INTO call_records \
             (call_sid, phone_number, delivery_id, order_details, status, \
              created_at, response_time) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (call_sid) DO NOTHING",
        )
        .bind(&record.call_sid)
        .bind(&record.phone_number)
        .bind(&record.delivery_id)
        .bind(&record.order_details)
        .bind(record.status.as_str())
        .bind(record.created_at)
        .bind(record.response_time)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_status(
        &self,
        call_sid: &str,
        status: CallStatus,
        response_time: OffsetDateTime,
    ) -> Result<bool, RelayError> {
        // The status guard in the WHERE clause is what makes provider
        // retries idempotent.
        let result = sqlx::query(
            "UPDATE call_records SET status = $2, response_time = $3 \
             WHERE call_sid = $1 AND status = 'initiated'",
        )
        .bind(call_sid)
        .bind(status.as_str())
        .bind(response_time)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(sid: &str) -> CallRecord {
        CallRecord {
            call_sid: sid.to_string(),
            phone_number: "+15550123".to_string(),
            delivery_id: Some("d-1".to_string()),
            order_details: "Two burritos".to_string(),
            status: CallStatus::Initiated,
            created_at: OffsetDateTime::now_utc(),
            response_time: None,
        }
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let store = MemoryCallStore::new();
        store.put(record("CA1")).await.unwrap();
        let found = store.get("CA1").await.unwrap().unwrap();
        assert_eq!(found.phone_number, "+15550123");
        assert_eq!(found.status, CallStatus::Initiated);
        assert!(store.get("CA2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn put_keeps_first_record_for_a_sid() {
        let store = MemoryCallStore::new();
        store.put(record("CA1")).await.unwrap();
        let mut replacement = record("CA1");
        replacement.phone_number = "+15550999".to_string();
        store.put(replacement).await.unwrap();
        let found = store.get("CA1").await.unwrap().unwrap();
        assert_eq!(found.phone_number, "+15550123");
    }

    #[tokio::test]
    async fn update_transitions_once_then_sticks() {
        let store = MemoryCallStore::new();
        store.put(record("CA1")).await.unwrap();

        let now = OffsetDateTime::now_utc();
        assert!(store
            .update_status("CA1", CallStatus::Accepted, now)
            .await
            .unwrap());
        let settled = store.get("CA1").await.unwrap().unwrap();
        assert_eq!(settled.status, CallStatus::Accepted);
        assert!(settled.response_time.is_some());

        // A later rejection must not overwrite the settled status.
        assert!(!store
            .update_status("CA1", CallStatus::Rejected, OffsetDateTime::now_utc())
            .await
            .unwrap());
        let still = store.get("CA1").await.unwrap().unwrap();
        assert_eq!(still.status, CallStatus::Accepted);
        assert_eq!(still.response_time, settled.response_time);
    }

    #[tokio::test]
    async fn update_of_unknown_sid_is_a_noop() {
        let store = MemoryCallStore::new();
        assert!(!store
            .update_status("CA404", CallStatus::Accepted, OffsetDateTime::now_utc())
            .await
            .unwrap());
    }

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            CallStatus::Initiated,
            CallStatus::Accepted,
            CallStatus::Rejected,
            CallStatus::Completed,
            CallStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<CallStatus>().unwrap(), status);
        }
        assert!("ringing".parse::<CallStatus>().is_err());
    }
}
