pub mod call_gateway;
pub mod call_store;
pub mod config;
pub mod credential;
pub mod dispatch;
pub mod error;
pub mod handlers;
pub mod ivr;
pub mod twilio_types;
pub mod types;

pub mod consts {
    /// Seconds a partner credential stays valid after it is minted.
    pub const CREDENTIAL_TTL_SECS: i64 = 300;
    /// Outbound HTTP timeout for partner and provider calls.
    pub const OUTBOUND_TIMEOUT_SECS: u64 = 10;
    /// Seconds the IVR gather waits for a keypress before falling through.
    pub const GATHER_TIMEOUT_SECS: u16 = 10;
}
