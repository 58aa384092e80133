//! Remote heartbeat: periodic server confirmation of a licensed installation.
//!
//! The engine only sees [`HeartbeatClient`]. Anything short of an explicit
//! answer from the server (transport failure, timeout, unknown device,
//! unparseable body) is [`HeartbeatOutcome::Unreachable`].

use crate::record::ActivationStatus;
use chrono::{DateTime, Utc};

/// Result of one heartbeat call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatOutcome {
    /// The server confirmed the installation, optionally extending its term.
    Ok {
        renewed_until: Option<DateTime<Utc>>,
    },
    /// The server revoked the license.
    Revoked,
    /// No usable answer.
    Unreachable,
}

impl HeartbeatOutcome {
    /// Confirmation without renewal.
    pub const CONFIRMED: Self = Self::Ok {
        renewed_until: None,
    };
}

/// Reports the installation's state to the vendor and returns the verdict.
///
/// Calls block for at most the client's configured timeout.
pub trait HeartbeatClient: Send + Sync {
    fn report(&self, device_id: &str, status: ActivationStatus) -> HeartbeatOutcome;
}

/// Client used when the heartbeat is switched off. The engine never calls
/// it; if something does, it answers Unreachable.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledHeartbeat;

impl HeartbeatClient for DisabledHeartbeat {
    fn report(&self, _device_id: &str, _status: ActivationStatus) -> HeartbeatOutcome {
        HeartbeatOutcome::Unreachable
    }
}

#[cfg(feature = "online")]
pub use http::HttpHeartbeat;

#[cfg(feature = "online")]
mod http {
    use super::{HeartbeatClient, HeartbeatOutcome};
    use crate::config::ShieldConfig;
    use crate::error::{LicenseError, LicenseResult};
    use crate::record::ActivationStatus;
    use chrono::Utc;
    use serde::{Deserialize, Serialize};
    use std::time::Duration;
    use tracing::{debug, warn};

    #[derive(Debug, Serialize)]
    struct VerifyRequest<'a> {
        app_id: &'a str,
        app_name: &'a str,
        request_id: String,
        device_id: &'a str,
        status: ActivationStatus,
        timestamp: i64,
    }

    #[derive(Debug, Deserialize)]
    struct VerifyResponse {
        success: bool,
        #[serde(default)]
        revoked: bool,
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        expiry_days: Option<u32>,
    }

    /// JSON-over-HTTPS heartbeat (`POST {heartbeat_url}/verify`).
    pub struct HttpHeartbeat {
        client: reqwest::blocking::Client,
        endpoint: String,
        app_id: String,
        app_name: String,
    }

    impl HttpHeartbeat {
        /// Builds a client from the engine configuration.
        pub fn from_config(config: &ShieldConfig) -> LicenseResult<Self> {
            let client = reqwest::blocking::Client::builder()
                .timeout(Duration::from_secs(config.heartbeat_timeout_secs))
                .user_agent(format!("{}/shield", config.app_name))
                .build()
                .map_err(|e| LicenseError::Config(format!("http client: {e}")))?;

            Ok(Self {
                client,
                endpoint: format!("{}/verify", config.heartbeat_url.trim_end_matches('/')),
                app_id: config.app_id.clone(),
                app_name: config.app_name.clone(),
            })
        }

        fn interpret(response: VerifyResponse) -> HeartbeatOutcome {
            if response.revoked {
                return HeartbeatOutcome::Revoked;
            }
            if !response.success {
                debug!(message = ?response.message, "heartbeat declined");
                return HeartbeatOutcome::Unreachable;
            }
            let renewed_until = response
                .expiry_days
                .and_then(|days| Utc::now().checked_add_signed(chrono::Duration::days(days.into())));
            HeartbeatOutcome::Ok { renewed_until }
        }
    }

    impl HeartbeatClient for HttpHeartbeat {
        fn report(&self, device_id: &str, status: ActivationStatus) -> HeartbeatOutcome {
            let body = VerifyRequest {
                app_id: &self.app_id,
                app_name: &self.app_name,
                request_id: uuid::Uuid::new_v4().to_string(),
                device_id,
                status,
                timestamp: Utc::now().timestamp(),
            };

            let resp = match self
                .client
                .post(&self.endpoint)
                .header("X-App-ID", &self.app_id)
                .json(&body)
                .send()
            {
                Ok(resp) => resp,
                Err(e) => {
                    warn!(error = %e, "heartbeat request failed");
                    return HeartbeatOutcome::Unreachable;
                }
            };

            if !resp.status().is_success() {
                warn!(http_status = %resp.status(), "heartbeat rejected");
                return HeartbeatOutcome::Unreachable;
            }

            match resp.json::<VerifyResponse>() {
                Ok(parsed) => Self::interpret(parsed),
                Err(e) => {
                    warn!(error = %e, "heartbeat response unreadable");
                    HeartbeatOutcome::Unreachable
                }
            }
        }
    }

}
