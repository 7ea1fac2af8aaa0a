use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Classification of a probe that did not yield a live device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    None,
    Timeout,
    ConnectionRefused,
    ProtocolError,
}

/// Outcome of a single liveness probe against one candidate host.
///
/// Produced once by the prober, consumed by the aggregator, never mutated.
#[derive(Debug, Clone)]
pub struct ProbeOutcome {
    pub host: String,
    pub port: u16,
    pub alive: bool,
    pub device_name: String,
    /// Vendor `data` payload from the liveness response, if any.
    pub raw: Option<Value>,
    pub failure: FailureKind,
}

/// One discovered device, as exposed on the wire.
///
/// `ip` and `host` both carry the dotted address; `ip` is the field the
/// original web UI reads.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DeviceRecord {
    pub devicename: String,
    pub ip: String,
    pub host: String,
    pub port: u16,
}

/// Echo of the effective scan parameters.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScanMeta {
    pub subnet: String,
    pub range_start: u8,
    pub range_end: u8,
    pub port: u16,
    pub needs_subnet: bool,
}

/// Response body for `GET /scan`.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ScanResponse {
    pub success: bool,
    pub devices: Vec<DeviceRecord>,
    pub meta: ScanMeta,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The fixed `{status, msg, data}` shape the vendor's HTTP API answers
/// with, reused verbatim as the relay's result type. `status == 0` means
/// success; any other integer is passed through untouched.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct VendorEnvelope {
    pub status: i64,
    #[serde(default)]
    pub msg: String,
    #[serde(default)]
    pub data: Option<Value>,
}

impl VendorEnvelope {
    /// Envelope substituted when the device could not be reached at all.
    pub fn request_failed() -> Self {
        Self {
            status: 1,
            msg: "request failed".to_string(),
            data: None,
        }
    }
}

/// Response body for `GET /api/local-ip`.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct LocalIpInfo {
    pub local_ip: String,
    pub server_ip: String,
    pub client_ip: String,
    pub server_ip_is_private: bool,
    pub client_ip_is_private: bool,
    pub should_prompt_manual: bool,
    pub tip: String,
    pub suggested_subnet: String,
}

/// Response body for `GET /api/get-device-name`.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct DeviceNameResponse {
    pub device_name: String,
}
