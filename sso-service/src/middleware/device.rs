use axum::{
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use service_core::error::AppError;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use crate::{models::DeviceFingerprint, AppState};

pub const NO_DEVICE_INFO: &str = "no device info provided";

fn to_ipv4(ip: IpAddr) -> Option<Ipv4Addr> {
    match ip {
        IpAddr::V4(ip) => Some(ip),
        IpAddr::V6(ip) => ip.to_ipv4_mapped(),
    }
}

fn parse_ipv4(raw: &str) -> Option<Ipv4Addr> {
    raw.trim().parse::<IpAddr>().ok().and_then(to_ipv4)
}

fn header_ip(headers: &HeaderMap) -> Option<Ipv4Addr> {
    if let Some(real_ip) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
        return parse_ipv4(real_ip);
    }
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(parse_ipv4)
}

/// Derive `(IPv4, user-agent)` for the request. Both parts are mandatory.
pub fn extract_fingerprint(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trust_proxy_headers: bool,
) -> Result<DeviceFingerprint, AppError> {
    let ip = if trust_proxy_headers {
        header_ip(headers)
    } else {
        peer.and_then(|addr| to_ipv4(addr.ip()))
    };

    let user_agent = headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|ua| !ua.is_empty());

    match (ip, user_agent) {
        (Some(ip), Some(ua)) => Ok(DeviceFingerprint::new(ip, ua)),
        _ => Err(AppError::BadRequest(anyhow::anyhow!(NO_DEVICE_INFO))),
    }
}

/// Reject requests without a usable fingerprint and attach it for handlers.
pub async fn device_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let fingerprint = extract_fingerprint(
        req.headers(),
        peer,
        state.config.security.trust_proxy_headers,
    )?;

    req.extensions_mut().insert(fingerprint);
    Ok(next.run(req).await)
}

/// Fingerprint attached by `device_middleware`.
pub struct ClientDevice(pub DeviceFingerprint);

#[axum::async_trait]
impl<S> FromRequestParts<S> for ClientDevice
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<DeviceFingerprint>()
            .cloned()
            .map(ClientDevice)
            .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!(NO_DEVICE_INFO)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(*k, HeaderValue::from_static(v));
        }
        map
    }

    fn peer(addr: &str) -> Option<SocketAddr> {
        Some(addr.parse().unwrap())
    }

    #[test]
    fn test_socket_peer_and_user_agent() {
        let fp = extract_fingerprint(&headers(&[("user-agent", "UA/1")]), peer("1.2.3.4:5000"), false)
            .unwrap();
        assert_eq!(fp.ip, Ipv4Addr::new(1, 2, 3, 4));
        assert_eq!(fp.user_agent, "UA/1");
    }

    #[test]
    fn test_mapped_ipv6_peer_is_unwrapped() {
        let fp = extract_fingerprint(
            &headers(&[("user-agent", "UA/1")]),
            peer("[::ffff:10.0.0.7]:80"),
            false,
        )
        .unwrap();
        assert_eq!(fp.ip, Ipv4Addr::new(10, 0, 0, 7));
    }

    #[test]
    fn test_missing_parts_are_rejected() {
        assert!(extract_fingerprint(&headers(&[]), peer("1.2.3.4:1"), false).is_err());
        assert!(extract_fingerprint(&headers(&[("user-agent", "  ")]), peer("1.2.3.4:1"), false).is_err());
        assert!(extract_fingerprint(&headers(&[("user-agent", "UA")]), None, false).is_err());
        assert!(extract_fingerprint(&headers(&[("user-agent", "UA")]), peer("[2001:db8::1]:1"), false).is_err());
    }

    #[test]
    fn test_proxy_headers_only_when_trusted() {
        let h = headers(&[
            ("user-agent", "UA"),
            ("x-forwarded-for", "9.9.9.9, 10.0.0.1"),
        ]);
        let trusted = extract_fingerprint(&h, peer("10.0.0.1:1"), true).unwrap();
        assert_eq!(trusted.ip, Ipv4Addr::new(9, 9, 9, 9));

        let untrusted = extract_fingerprint(&h, peer("10.0.0.1:1"), false).unwrap();
        assert_eq!(untrusted.ip, Ipv4Addr::new(10, 0, 0, 1));

        let bad = headers(&[("user-agent", "UA"), ("x-real-ip", "not-an-ip")]);
        assert!(extract_fingerprint(&bad, peer("10.0.0.1:1"), true).is_err());
    }
}
