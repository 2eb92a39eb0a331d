use crate::call_store::CallStatus;
use crate::dispatch::QuotePayload;
use crate::error::RelayError;
use crate::ivr::{self, CallSession, IvrInput, IvrState, SESSION_VERSION};
use crate::twilio_types::{wrap_twiml, VoiceWebhookForm};
use crate::types::AppState;

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, HeaderMap, Method, Request, StatusCode, Uri},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub fn router(app_state: Arc<AppState>) -> Router {
    let relay = Router::new()
        .route("/delivery", post(quote_delivery))
        .route("/delivery/:external_delivery_id", get(fetch_delivery))
        .route("/delivery/:external_delivery_id/accept", post(accept_delivery))
        .route("/order-call", post(place_order_call))
        .route("/order-call/:call_sid/status", get(order_call_status))
        .route("/config", get(client_config))
        .route_layer(middleware::from_fn_with_state(
            app_state.clone(),
            require_relay_secret,
        ));

    Router::new()
        .route("/", get(api_info))
        .route("/health", get(health))
        .nest("/relay", relay)
        // Webhook routes carry no shared secret; the provider drives them.
        .route("/twilio/twiml", post(twiml_start))
        .route("/twilio/order-response", post(twiml_order_response))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state)
}

/// Shared-secret gate for every /relay route.  Checked before any payload is
/// touched or any outbound call attempted.
async fn require_relay_secret(
    State(app_state): State<Arc<AppState>>,
    req: Request<Body>,
    next: Next<Body>,
) -> Result<Response, RelayError> {
    let secret = req
        .headers()
        .get("x-relay-secret")
        .and_then(|v| v.to_str().ok());
    match secret {
        None => Err(RelayError::Unauthorized("Missing X-Relay-Secret header")),
        Some(s) if s != app_state.config.relay_secret => {
            warn!("rejected relay request with invalid secret");
            Err(RelayError::Unauthorized("Invalid X-Relay-Secret"))
        }
        Some(_) => Ok(next.run(req).await),
    }
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc().format(&Rfc3339).unwrap()
}

async fn api_info() -> impl IntoResponse {
    Json(json!({
        "api": "Order Relay API",
        "status": "online",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": now_rfc3339(),
        "endpoints": {
            "health": "/health",
            "quote": "POST /relay/delivery",
            "acceptQuote": "POST /relay/delivery/{id}/accept",
            "deliveryStatus": "GET /relay/delivery/{id}",
            "phoneCall": "POST /relay/order-call",
            "callStatus": "GET /relay/order-call/{call_sid}/status",
            "config": "GET /relay/config",
            "twiml": "POST /twilio/twiml",
        },
        "note": "All /relay endpoints require X-Relay-Secret header",
    }))
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok", "timestamp": now_rfc3339() }))
}

async fn not_found(method: Method, uri: Uri) -> impl IntoResponse {
    RelayError::NotFound(format!("Route {method} {} not found", uri.path()))
}

#[derive(Deserialize, Debug, Default)]
pub struct QuoteRequest {
    pub external_delivery_id: Option<String>,
    pub pickup_address: Option<String>,
    pub pickup_business_name: Option<String>,
    pub pickup_phone_number: Option<String>,
    pub pickup_instructions: Option<String>,
    pub dropoff_address: Option<String>,
    pub dropoff_business_name: Option<String>,
    pub dropoff_phone_number: Option<String>,
    pub dropoff_instructions: Option<String>,
    pub order_value: Option<i64>,
}

/// Enumerate missing required quote fields by name, in the documented order.
/// Present-but-empty values count as missing.
fn missing_quote_fields(req: &QuoteRequest) -> Vec<&'static str> {
    let mut missing = Vec::new();
    let mut check = |name: &'static str, value: &Option<String>| {
        if value.as_deref().map_or(true, str::is_empty) {
            missing.push(name);
        }
    };
    check("pickup_address", &req.pickup_address);
    check("pickup_business_name", &req.pickup_business_name);
    check("pickup_phone_number", &req.pickup_phone_number);
    check("dropoff_address", &req.dropoff_address);
    check("dropoff_business_name", &req.dropoff_business_name);
    check("dropoff_phone_number", &req.dropoff_phone_number);
    if req.order_value.map_or(true, |v| v == 0) {
        missing.push("order_value");
    }
    missing
}

async fn quote_delivery(
    State(app_state): State<Arc<AppState>>,
    body: Option<Json<QuoteRequest>>,
) -> Result<impl IntoResponse, RelayError> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let missing = missing_quote_fields(&req);
    if !missing.is_empty() {
        return Err(RelayError::Validation(missing.join(", ")));
    }

    // Assigned once here and immutable from then on: the same id correlates
    // the quote, the accept and every status fetch.
    let external_delivery_id = req
        .external_delivery_id
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let payload = QuotePayload {
        external_delivery_id,
        pickup_address: req.pickup_address.unwrap_or_default(),
        pickup_business_name: req.pickup_business_name.unwrap_or_default(),
        pickup_phone_number: req.pickup_phone_number.unwrap_or_default(),
        pickup_instructions: req.pickup_instructions.filter(|s| !s.is_empty()),
        dropoff_address: req.dropoff_address.unwrap_or_default(),
        dropoff_business_name: req.dropoff_business_name.unwrap_or_default(),
        dropoff_phone_number: req.dropoff_phone_number.unwrap_or_default(),
        dropoff_instructions: req.dropoff_instructions.filter(|s| !s.is_empty()),
        order_value: req.order_value.unwrap_or_default(),
    };

    let quote = app_state.dispatch.get_quote(&payload).await?;
    Ok(Json(Value::Object(quote)))
}

async fn fetch_delivery(
    State(app_state): State<Arc<AppState>>,
    Path(external_delivery_id): Path<String>,
) -> Result<impl IntoResponse, RelayError> {
    let delivery = app_state.dispatch.get_delivery(&external_delivery_id).await?;
    Ok(Json(Value::Object(delivery)))
}

#[derive(Deserialize, Debug, Default)]
pub struct AcceptRequest {
    pub tip: Option<i64>,
}

async fn accept_delivery(
    State(app_state): State<Arc<AppState>>,
    Path(external_delivery_id): Path<String>,
    body: Option<Json<AcceptRequest>>,
) -> Result<impl IntoResponse, RelayError> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let delivery = app_state
        .dispatch
        .accept_quote(&external_delivery_id, req.tip)
        .await?;
    info!(%external_delivery_id, "accepted delivery quote");
    Ok((StatusCode::CREATED, Json(Value::Object(delivery))))
}

#[derive(Deserialize, Debug, Default)]
pub struct OrderCallRequest {
    pub phone_number: Option<String>,
    pub order_details: Option<String>,
    pub delivery_id: Option<String>,
}

async fn place_order_call(
    State(app_state): State<Arc<AppState>>,
    body: Option<Json<OrderCallRequest>>,
) -> Result<impl IntoResponse, RelayError> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let mut missing = Vec::new();
    if req.phone_number.as_deref().map_or(true, str::is_empty) {
        missing.push("phone_number");
    }
    if req.order_details.as_deref().map_or(true, str::is_empty) {
        missing.push("order_details");
    }
    if !missing.is_empty() {
        return Err(RelayError::Validation(missing.join(", ")));
    }

    let record = app_state
        .gateway
        .place_call(
            &req.phone_number.unwrap_or_default(),
            &req.order_details.unwrap_or_default(),
            req.delivery_id.filter(|id| !id.is_empty()),
        )
        .await?;
    Ok(Json(json!({
        "call_sid": record.call_sid,
        "status": record.status,
        "phone_number": record.phone_number,
    })))
}

async fn order_call_status(
    State(app_state): State<Arc<AppState>>,
    Path(call_sid): Path<String>,
) -> Result<impl IntoResponse, RelayError> {
    let view = app_state.gateway.get_call_status(&call_sid).await?;
    Ok(Json(view))
}

async fn client_config(State(app_state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "test_phone_number": app_state.config.telephony.test_phone_number,
    }))
}

/// Session fields as they arrive on a webhook query string.  Everything is
/// optional here so a mangled callback still renders a script.
#[derive(Deserialize, Debug, Default)]
pub struct SessionQuery {
    pub v: Option<u8>,
    pub call_sid: Option<String>,
    pub delivery_id: Option<String>,
    pub message: Option<String>,
}

impl SessionQuery {
    /// Fold the query with the provider-posted form into a full session.
    /// The sid from the form covers the first turn, before the action URL
    /// has smuggled it.
    fn into_session(self, form: &VoiceWebhookForm) -> Option<CallSession> {
        let message = self.message.filter(|m| !m.is_empty())?;
        Some(CallSession {
            v: self.v.unwrap_or(SESSION_VERSION),
            call_sid: self.call_sid.or_else(|| form.call_sid.clone()),
            delivery_id: self.delivery_id,
            message,
        })
    }
}

fn twiml_response(script: crate::twilio_types::Response) -> Response {
    let twiml = wrap_twiml(xmlserde::xml_serialize(script));
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, "application/xml".parse().unwrap());
    (StatusCode::OK, headers, twiml).into_response()
}

async fn twiml_start(
    State(app_state): State<Arc<AppState>>,
    params: Option<Query<SessionQuery>>,
    body: String,
) -> Response {
    debug!(body = %body, "twiml start request");
    let Query(params) = params.unwrap_or_default();
    let form = serde_urlencoded::from_str::<VoiceWebhookForm>(&body).unwrap_or_default();
    match params.into_session(&form) {
        Some(session) => {
            twiml_response(ivr::prompt_script(&session, &app_state.config.public_base_url))
        }
        None => {
            warn!("twiml request without a message parameter");
            twiml_response(ivr::apology_script())
        }
    }
}

async fn twiml_order_response(
    State(app_state): State<Arc<AppState>>,
    params: Option<Query<SessionQuery>>,
    body: String,
) -> Response {
    debug!(body = %body, "order response request");
    let Query(params) = params.unwrap_or_default();
    let form = serde_urlencoded::from_str::<VoiceWebhookForm>(&body).unwrap_or_default();
    let input = IvrInput::from_digits(form.digits.as_deref());
    let Some(session) = params.into_session(&form) else {
        warn!("order response without a message parameter");
        return twiml_response(ivr::apology_script());
    };

    // Current IVR state is derived from the stored record; a sid the store
    // has never seen still gets a coherent script.
    let current = match session.call_sid.as_deref() {
        Some(sid) => match app_state.calls.get(sid).await {
            Ok(Some(record)) => IvrState::from_status(record.status),
            Ok(None) => {
                debug!(call_sid = %sid, "order response for unknown call sid");
                IvrState::AwaitingInput
            }
            Err(e) => {
                error!(error = %e, call_sid = %sid, "call store lookup failed");
                IvrState::AwaitingInput
            }
        },
        None => IvrState::AwaitingInput,
    };

    let transition = ivr::transition(current, input);
    if let (Some(status), Some(sid)) = (transition.record, session.call_sid.as_deref()) {
        record_response(&app_state, sid, status).await;
    }
    twiml_response(ivr::reply_script(
        transition.reply,
        &session,
        &app_state.config.public_base_url,
    ))
}

/// Store mutation for a settling keypress.  Failures are logged, never
/// surfaced; the callee always hears a script.
async fn record_response(app_state: &AppState, call_sid: &str, status: CallStatus) {
    match app_state
        .calls
        .update_status(call_sid, status, OffsetDateTime::now_utc())
        .await
    {
        Ok(true) => info!(call_sid, status = status.as_str(), "recorded call response"),
        Ok(false) => debug!(call_sid, "call already settled; repeat input ignored"),
        Err(e) => error!(error = %e, call_sid, "failed to record call response"),
    }
}
