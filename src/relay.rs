use crate::types::VendorEnvelope;
use reqwest::Client;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Fixed timeout for one relayed control call. Longer than a scan probe:
/// this is a single request, not a fan-out across the whole range.
pub const DEFAULT_RELAY_TIMEOUT_MS: u64 = 3_000;

/// Abstract control actions the relay can forward to a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayAction {
    KeyEvent,
    ListApps,
    LaunchApp,
}

impl RelayAction {
    /// The vendor's `action` query value for this control action.
    fn vendor_action(self) -> &'static str {
        match self {
            RelayAction::KeyEvent => "keyevent",
            RelayAction::ListApps => "getinstalledapp",
            RelayAction::LaunchApp => "startapp",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RelayError {
    #[error("missing required parameter: {0}")]
    MissingParam(&'static str),
}

/// One control action addressed to one already-known device.
#[derive(Debug, Clone)]
pub struct RelayRequest {
    pub target_host: String,
    pub target_port: u16,
    pub action: RelayAction,
    /// Action-specific keys (keycode, packagename, count, changeIcon).
    pub params: BTreeMap<String, String>,
}

/// Forward one control action as exactly one vendor HTTP request.
///
/// Required parameters are checked before any network I/O. Transport
/// failures (timeout, refusal, unreachable host) are normalized into the
/// vendor envelope shape with status 1, so callers see a single result
/// type regardless of failure origin. Whatever the device itself answers
/// is passed through untouched; only `status == 0` ever counts as
/// success for higher layers.
pub async fn relay(
    client: &Client,
    timeout: Duration,
    req: &RelayRequest,
) -> Result<VendorEnvelope, RelayError> {
    let mut query: Vec<(&str, String)> = vec![("action", req.action.vendor_action().to_string())];
    match req.action {
        RelayAction::KeyEvent => {
            query.push(("keycode", required(&req.params, "keycode")?));
        }
        RelayAction::ListApps => {
            query.push(("count", param_or(&req.params, "count", "999")));
            query.push(("changeIcon", param_or(&req.params, "changeIcon", "1")));
        }
        RelayAction::LaunchApp => {
            // The vendor API only launches by package name.
            query.push(("type", "packagename".to_string()));
            query.push(("packagename", required(&req.params, "packagename")?));
        }
    }

    let url = format!("http://{}:{}/controller", req.target_host, req.target_port);
    let sent = client.get(&url).query(&query).timeout(timeout).send().await;
    let resp = match sent {
        Ok(resp) => resp,
        Err(e) => {
            warn!(host = %req.target_host, error = %e, "relay transport failure");
            return Ok(VendorEnvelope::request_failed());
        }
    };

    Ok(resp
        .json::<VendorEnvelope>()
        .await
        .unwrap_or_else(|_| VendorEnvelope::request_failed()))
}

fn required(
    params: &BTreeMap<String, String>,
    key: &'static str,
) -> Result<String, RelayError> {
    params
        .get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or(RelayError::MissingParam(key))
}

fn param_or(params: &BTreeMap<String, String>, key: &str, default: &str) -> String {
    params
        .get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .unwrap_or(default)
        .to_string()
}
