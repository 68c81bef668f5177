use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::request::Parts;
use axum::http::{header, HeaderMap};
use ipnet::IpNet;

use crate::state::SharedState;

/// Best-effort client address.
///
/// The socket peer, unless that peer is a configured trusted proxy, in
/// which case the first `X-Forwarded-For` hop (then `X-Real-IP`) wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientIp(pub Option<IpAddr>);

impl ClientIp {
    /// Rate-limit identifier for this client.
    pub fn identifier(&self) -> String {
        self.0
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }
}

fn forwarded_ip(headers: &HeaderMap) -> Option<IpAddr> {
    let from_forwarded_for = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse().ok());

    from_forwarded_for.or_else(|| {
        headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok())
    })
}

fn resolve(peer: Option<IpAddr>, headers: &HeaderMap, trusted: &[IpNet]) -> Option<IpAddr> {
    match peer {
        Some(ip) if trusted.iter().any(|net| net.contains(&ip)) => {
            forwarded_ip(headers).or(Some(ip))
        }
        _ => peer,
    }
}

impl FromRequestParts<SharedState> for ClientIp {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());
        Ok(ClientIp(resolve(peer, &parts.headers, &state.trusted_proxies)))
    }
}

/// A request header as an owned, non-empty string.
pub fn header_string(headers: &HeaderMap, name: header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(forwarded_for: &'static str, real_ip: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static(forwarded_for));
        headers.insert("x-real-ip", HeaderValue::from_static(real_ip));
        headers
    }

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn forwarded_for_takes_first_hop() {
        let headers = headers("203.0.113.5, 10.0.0.1", "198.51.100.1");
        assert_eq!(forwarded_ip(&headers), Some(ip("203.0.113.5")));
    }

    #[test]
    fn real_ip_fallback_and_garbage() {
        let headers = headers("not-an-ip", "198.51.100.1");
        assert_eq!(forwarded_ip(&headers), Some(ip("198.51.100.1")));

        assert_eq!(forwarded_ip(&HeaderMap::new()), None);
        assert_eq!(ClientIp(None).identifier(), "unknown");
    }

    #[test]
    fn headers_ignored_from_untrusted_peer() {
        let trusted: Vec<IpNet> = vec!["10.0.0.0/8".parse().unwrap()];
        let headers = headers("203.0.113.7", "203.0.113.7");

        let peer = Some(ip("198.51.100.66"));
        assert_eq!(resolve(peer, &headers, &trusted), peer);
        assert_eq!(resolve(peer, &headers, &[]), peer);
        assert_eq!(resolve(None, &headers, &trusted), None);
    }

    #[test]
    fn headers_honoured_from_trusted_proxy() {
        let trusted: Vec<IpNet> = vec!["10.0.0.0/8".parse().unwrap()];
        let proxy = Some(ip("10.0.0.2"));

        let forwarded = headers("203.0.113.7, 10.0.0.9", "198.51.100.1");
        assert_eq!(resolve(proxy, &forwarded, &trusted), Some(ip("203.0.113.7")));

        // A proxy that sends nothing usable is the client itself.
        assert_eq!(resolve(proxy, &HeaderMap::new(), &trusted), proxy);
    }
}
