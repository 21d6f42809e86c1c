//! Request extractors.

use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::request::Parts,
};
use livepoll_core::Voter;
use std::convert::Infallible;
use std::net::SocketAddr;

/// Voter fingerprint extractor.
///
/// Derives the voter key from the first `X-Forwarded-For` entry when the
/// request came through a proxy, else from the direct peer address. This
/// is the only identity the service has; clients behind the same address
/// share a fingerprint.
#[derive(Debug, Clone)]
pub struct VoterFingerprint(pub Voter);

impl<S> FromRequestParts<S> for VoterFingerprint
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let forwarded_for = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|value| value.to_str().ok());

        let peer_addr = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map_or_else(|| "unknown".to_string(), |info| info.0.ip().to_string());

        let user_agent = parts
            .headers
            .get(axum::http::header::USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();

        Ok(Self(Voter::derive(forwarded_for, &peer_addr, user_agent)))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(request: Request<()>) -> Voter {
        let (mut parts, ()) = request.into_parts();
        let VoterFingerprint(voter) = VoterFingerprint::from_request_parts(&mut parts, &())
            .await
            .unwrap();
        voter
    }

    #[tokio::test]
    async fn test_forwarded_for_takes_precedence() {
        let request = Request::builder()
            .header("x-forwarded-for", "198.51.100.1, 10.0.0.2")
            .extension(ConnectInfo(SocketAddr::from(([203, 0, 113, 9], 4321))))
            .body(())
            .unwrap();
        assert_eq!(extract(request).await.key, "198.51.100.1");
    }

    #[tokio::test]
    async fn test_peer_address_fallback() {
        let request = Request::builder()
            .extension(ConnectInfo(SocketAddr::from(([203, 0, 113, 9], 4321))))
            .header("user-agent", "curl/8")
            .body(())
            .unwrap();
        let voter = extract(request).await;
        assert_eq!(voter.key, "203.0.113.9");
        assert_eq!(voter.user_agent, "curl/8");
    }
}
