use std::net::Ipv4Addr;
use std::time::Duration;
use thiserror::Error;

use crate::netdetect;

/// Control port the vendor's TV firmware listens on.
pub const DEFAULT_CONTROL_PORT: u16 = 6095;

/// Hard per-probe timeout. Probes run in parallel, so this also bounds
/// the wall-clock time of a whole scan.
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 400;

pub const RANGE_MIN: u8 = 1;
pub const RANGE_MAX: u8 = 254;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("invalid subnet: expected three dotted octets in 0-255, e.g. \"192.168.1\"")]
    InvalidSubnet,
}

/// Validated parameters for one scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanPlan {
    /// Three validated octets with a trailing separator, e.g. "192.168.1.",
    /// ready for host-number concatenation.
    pub subnet_prefix: String,
    pub range_start: u8,
    pub range_end: u8,
    pub port: u16,
    pub probe_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanOutcome {
    Ready(ScanPlan),
    /// No subnet was supplied and the fallback address is not on a private
    /// network, so deriving one would scan something that is not the LAN.
    NeedsSubnet,
}

/// Turn raw query input into a validated scan plan.
///
/// - An explicit subnet must be three dot-separated octets (trailing dot
///   optional), each in 0-255.
/// - Without one, the subnet is derived from `fallback` by dropping its
///   last octet, but only when `fallback` is private.
/// - Range bounds outside 1-254 (or unparsable) fall back to 1 / 254 and
///   are swapped when inverted; an invalid port falls back to the vendor
///   default.
pub fn plan(
    raw_subnet: Option<&str>,
    raw_start: Option<&str>,
    raw_end: Option<&str>,
    raw_port: Option<&str>,
    fallback: Option<Ipv4Addr>,
    probe_timeout: Duration,
) -> Result<PlanOutcome, PlanError> {
    let subnet_prefix = match raw_subnet.map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => parse_subnet(raw)?,
        None => match fallback.filter(|ip| netdetect::is_private_addr(*ip)) {
            Some(ip) => netdetect::suggested_subnet(ip),
            None => return Ok(PlanOutcome::NeedsSubnet),
        },
    };

    let mut range_start = parse_range_bound(raw_start, RANGE_MIN);
    let mut range_end = parse_range_bound(raw_end, RANGE_MAX);
    if range_start > range_end {
        std::mem::swap(&mut range_start, &mut range_end);
    }

    Ok(PlanOutcome::Ready(ScanPlan {
        subnet_prefix,
        range_start,
        range_end,
        port: parse_port(raw_port),
        probe_timeout,
    }))
}

fn parse_subnet(raw: &str) -> Result<String, PlanError> {
    let trimmed = raw.strip_suffix('.').unwrap_or(raw);
    let octets: Vec<&str> = trimmed.split('.').collect();
    if octets.len() != 3 {
        return Err(PlanError::InvalidSubnet);
    }
    for octet in &octets {
        match octet.parse::<u32>() {
            Ok(v) if v <= 255 => {}
            _ => return Err(PlanError::InvalidSubnet),
        }
    }
    Ok(format!("{}.", trimmed))
}

fn parse_range_bound(raw: Option<&str>, default: u8) -> u8 {
    raw.and_then(|s| s.trim().parse::<i64>().ok())
        .filter(|v| (RANGE_MIN as i64..=RANGE_MAX as i64).contains(v))
        .map(|v| v as u8)
        .unwrap_or(default)
}

fn parse_port(raw: Option<&str>) -> u16 {
    raw.and_then(|s| s.trim().parse::<u32>().ok())
        .filter(|v| (1..=65535).contains(v))
        .map(|v| v as u16)
        .unwrap_or(DEFAULT_CONTROL_PORT)
}
