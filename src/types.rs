use crate::call_gateway::CallGateway;
use crate::call_store::CallStore;
use crate::config::RelayConfig;
use crate::consts::OUTBOUND_TIMEOUT_SECS;
use crate::credential::{CredentialBuilder, CredentialError};
use crate::dispatch::DispatchClient;

use std::sync::Arc;
use std::time::Duration;

pub struct AppState {
    pub config: RelayConfig,
    pub dispatch: DispatchClient,
    pub gateway: CallGateway,
    pub calls: Arc<dyn CallStore>,
}

impl AppState {
    /// Wire up the outbound clients.  Fails only when the partner signing
    /// secret is malformed, which should stop the process at startup.
    pub fn new(config: RelayConfig, calls: Arc<dyn CallStore>) -> Result<Self, CredentialError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(OUTBOUND_TIMEOUT_SECS))
            .build()
            .unwrap();
        let credentials = CredentialBuilder::new(
            config.dispatch.developer_id.clone(),
            config.dispatch.key_id.clone(),
            &config.dispatch.signing_secret,
        )?;
        let dispatch = DispatchClient::new(http.clone(), config.dispatch.base_url.clone(), credentials);
        let gateway = CallGateway::new(
            http,
            config.telephony.clone(),
            config.public_base_url.clone(),
            calls.clone(),
        );
        Ok(Self {
            config,
            dispatch,
            gateway,
            calls,
        })
    }
}
