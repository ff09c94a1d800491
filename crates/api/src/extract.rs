//! Request extractors.

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::request::Parts;

/// Identity recorded as the job's requester.
///
/// The first `X-Forwarded-For` entry when present, else the peer IP,
/// else `"unknown"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requester(pub String);

pub const UNKNOWN_REQUESTER: &str = "unknown";

impl<S> FromRequestParts<S> for Requester
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let forwarded = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|first| !first.is_empty());
        if let Some(first) = forwarded {
            return Ok(Requester(first.to_string()));
        }

        if let Some(ConnectInfo(addr)) = parts.extensions.get::<ConnectInfo<SocketAddr>>() {
            return Ok(Requester(addr.ip().to_string()));
        }

        Ok(Requester(UNKNOWN_REQUESTER.to_string()))
    }
}
