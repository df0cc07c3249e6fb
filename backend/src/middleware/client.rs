use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{header::USER_AGENT, request::Parts, HeaderMap},
};
use std::convert::Infallible;

use crate::models::security::ClientInfo;
use crate::state::AppState;

const UNKNOWN_IP: &str = "unknown";

impl FromRequestParts<AppState> for ClientInfo {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string());
        let ip = resolve_ip(&parts.headers, peer, state.config.behind_proxy);
        Ok(ClientInfo::new(ip, extract_user_agent(&parts.headers)))
    }
}

/// The peer address, or the first forwarded hop when running behind a proxy.
fn resolve_ip(headers: &HeaderMap, peer: Option<String>, behind_proxy: bool) -> String {
    let forwarded = behind_proxy
        .then(|| extract_forwarded_ip(headers))
        .flatten();
    forwarded
        .or(peer)
        .unwrap_or_else(|| UNKNOWN_IP.to_string())
}

fn extract_forwarded_ip(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        return value
            .split(',')
            .next()
            .map(|ip| ip.trim().to_string())
            .filter(|ip| !ip.is_empty());
    }
    headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty())
}

fn extract_user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(|agent| agent.trim().to_string())
        .filter(|agent| !agent.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn forwarded_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.1, 10.0.0.1".parse().unwrap());
        headers
    }

    #[test]
    fn forwarded_header_is_ignored_unless_behind_proxy() {
        let headers = forwarded_headers();
        assert_eq!(
            resolve_ip(&headers, Some("10.0.0.9".into()), false),
            "10.0.0.9"
        );
        assert_eq!(
            resolve_ip(&headers, Some("10.0.0.9".into()), true),
            "203.0.113.1"
        );
    }

    #[test]
    fn missing_peer_falls_back_to_unknown() {
        assert_eq!(resolve_ip(&HeaderMap::new(), None, true), UNKNOWN_IP);
    }

    #[test]
    fn blank_user_agent_is_dropped() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, "  ".parse().unwrap());
        assert_eq!(extract_user_agent(&headers), None);
    }
}
