//! Client identity used as the rate limit key.

use http::HeaderMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// Identity used when neither a forwarded address nor a peer is known.
pub const UNKNOWN_IDENTITY: &str = "unknown";

/// Rate limit key for a request.
///
/// Takes the left-most `X-Forwarded-For` entry, falling back to the peer
/// address. Ports are stripped and loopback or IPv4-mapped IPv6 addresses
/// are folded into their IPv4 form.
#[must_use]
pub fn client_identity(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    if let Some(candidate) = forwarded {
        return normalize(candidate);
    }
    peer.map_or_else(|| UNKNOWN_IDENTITY.to_string(), |addr| canonical(addr.ip()).to_string())
}

/// Canonical form of an address string with an optional port.
#[must_use]
pub fn normalize(candidate: &str) -> String {
    let candidate = candidate.trim();
    if let Ok(ip) = candidate.parse::<IpAddr>() {
        return canonical(ip).to_string();
    }
    if let Ok(addr) = candidate.parse::<SocketAddr>() {
        return canonical(addr.ip()).to_string();
    }
    let host = candidate
        .strip_prefix('[')
        .and_then(|rest| rest.split(']').next())
        .unwrap_or_else(|| candidate.split(':').next().unwrap_or(candidate));
    match host.parse::<IpAddr>() {
        Ok(ip) => canonical(ip).to_string(),
        Err(_) => host.to_string(),
    }
}

fn canonical(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) if v6.is_loopback() => IpAddr::V4(Ipv4Addr::LOCALHOST),
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map_or(ip, IpAddr::V4),
        IpAddr::V4(_) => ip,
    }
}
