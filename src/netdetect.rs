use axum::http::HeaderMap;
use if_addrs::{get_if_addrs, IfAddr};
use ipnet::Ipv4Net;
use std::net::{Ipv4Addr, SocketAddr};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AddressError {
    #[error("no usable IPv4 interface address found")]
    NoAddressFound,
    #[error("interface lookup failed: {0}")]
    Lookup(#[from] std::io::Error),
}

/// Source of the server's own IPv4 interface addresses.
///
/// Injected into the server state so tests can substitute fixed address
/// lists for the process-wide interface table.
pub trait InterfaceSource: Send + Sync {
    /// All IPv4 addresses assigned to the process's interfaces, in
    /// enumeration order, loopback included.
    fn ipv4_addresses(&self) -> std::io::Result<Vec<Ipv4Addr>>;
}

/// Production source backed by the OS interface table.
pub struct SystemInterfaces;

impl InterfaceSource for SystemInterfaces {
    fn ipv4_addresses(&self) -> std::io::Result<Vec<Ipv4Addr>> {
        let mut out = Vec::new();
        for iface in get_if_addrs()? {
            if let IfAddr::V4(v4) = iface.addr {
                out.push(v4.ip);
            }
        }
        Ok(out)
    }
}

/// Pick the server's usable local-network address: the first
/// non-loopback IPv4 address the source reports.
pub fn resolve_server_address(source: &dyn InterfaceSource) -> Result<Ipv4Addr, AddressError> {
    source
        .ipv4_addresses()?
        .into_iter()
        .find(|ip| !ip.is_loopback())
        .ok_or(AddressError::NoAddressFound)
}

/// Determine the caller's address: the first `x-forwarded-for` entry when
/// present, otherwise the raw socket address, normalized either way.
pub fn classify_caller(headers: &HeaderMap, peer: SocketAddr) -> String {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return normalize_ip(first);
            }
        }
    }
    normalize_ip(&peer.ip().to_string())
}

/// Strip IPv4-mapped IPv6 notation and map IPv6 loopback onto IPv4.
pub fn normalize_ip(raw: &str) -> String {
    let raw = raw.trim();
    if raw == "::1" {
        return "127.0.0.1".to_string();
    }
    raw.strip_prefix("::ffff:").unwrap_or(raw).to_string()
}

/// RFC1918 (10/8, 172.16/12, 192.168/16) plus loopback.
pub fn is_private_addr(ip: Ipv4Addr) -> bool {
    ip.is_private() || ip.is_loopback()
}

/// String form of [`is_private_addr`]; anything that does not parse as
/// IPv4 (including plain IPv6) counts as non-private.
pub fn is_private(ip: &str) -> bool {
    ip.parse::<Ipv4Addr>().map(is_private_addr).unwrap_or(false)
}

/// Three-octet prefix ("a.b.c.") of the /24 network the address sits in,
/// ready for host-number concatenation.
pub fn suggested_subnet(ip: Ipv4Addr) -> String {
    let net = Ipv4Net::new(ip, 24).expect("/24 is always valid").trunc();
    let o = net.network().octets();
    format!("{}.{}.{}.", o[0], o[1], o[2])
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn suggested_subnet_drops_last_octet() {
        assert_eq!(suggested_subnet(Ipv4Addr::new(10, 1, 2, 3)), "10.1.2.");
        assert_eq!(
            suggested_subnet(Ipv4Addr::new(192, 168, 42, 99)),
            "192.168.42."
        );
    }

    #[test]
    fn private_ranges() {
        assert!(is_private("10.0.0.1"));
        assert!(is_private("172.16.0.1"));
        assert!(is_private("172.31.255.254"));
        assert!(is_private("192.168.1.101"));
        assert!(is_private("127.0.0.1"));
        assert!(!is_private("172.32.0.1"));
        assert!(!is_private("8.8.8.8"));
        assert!(!is_private("not-an-ip"));
        assert!(!is_private("::1"));
    }

    #[test]
    fn normalize_mapped_and_loopback() {
        assert_eq!(normalize_ip("::ffff:192.168.1.7"), "192.168.1.7");
        assert_eq!(normalize_ip("::1"), "127.0.0.1");
        assert_eq!(normalize_ip(" 10.0.0.2 "), "10.0.0.2");
    }

    #[test]
    fn caller_prefers_forwarded_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.9, 10.0.0.1"),
        );
        let peer: SocketAddr = "192.168.1.2:51000".parse().unwrap();
        assert_eq!(classify_caller(&headers, peer), "203.0.113.9");
    }

    #[test]
    fn caller_falls_back_to_socket_addr() {
        let headers = HeaderMap::new();
        let peer: SocketAddr = "[::ffff:192.168.1.2]:51000".parse().unwrap();
        assert_eq!(classify_caller(&headers, peer), "192.168.1.2");
    }

    struct Fixed(Vec<Ipv4Addr>);
    impl InterfaceSource for Fixed {
        fn ipv4_addresses(&self) -> std::io::Result<Vec<Ipv4Addr>> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn resolve_skips_loopback() {
        let src = Fixed(vec![
            Ipv4Addr::LOCALHOST,
            Ipv4Addr::new(192, 168, 1, 5),
            Ipv4Addr::new(10, 0, 0, 7),
        ]);
        assert_eq!(
            resolve_server_address(&src).unwrap(),
            Ipv4Addr::new(192, 168, 1, 5)
        );
    }

    #[test]
    fn resolve_errors_when_only_loopback() {
        let src = Fixed(vec![Ipv4Addr::LOCALHOST]);
        assert!(matches!(
            resolve_server_address(&src),
            Err(AddressError::NoAddressFound)
        ));
    }
}
