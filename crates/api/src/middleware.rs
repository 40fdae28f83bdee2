use axum::{
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use stockroom_core::ActorId;

use crate::app::errors;
use crate::context::ActorContext;

pub const ACTOR_HEADER: &str = "x-actor-id";

/// Attach an [`ActorContext`] to every request.
///
/// A present but malformed header is rejected rather than silently dropped.
pub async fn actor_middleware(
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let actor_id = match extract_actor(req.headers()) {
        Ok(v) => v,
        Err(msg) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", msg),
    };

    req.extensions_mut().insert(ActorContext::new(actor_id));
    next.run(req).await
}

fn extract_actor(headers: &HeaderMap) -> Result<Option<ActorId>, String> {
    let Some(header) = headers.get(ACTOR_HEADER) else {
        return Ok(None);
    };

    let raw = header
        .to_str()
        .map_err(|_| format!("{ACTOR_HEADER} is not valid text"))?
        .trim();
    if raw.is_empty() {
        return Ok(None);
    }

    raw.parse::<ActorId>()
        .map(Some)
        .map_err(|e| format!("{ACTOR_HEADER}: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn missing_or_blank_header_is_anonymous() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_actor(&headers), Ok(None));

        headers.insert(ACTOR_HEADER, HeaderValue::from_static("  "));
        assert_eq!(extract_actor(&headers), Ok(None));
    }

    #[test]
    fn header_is_parsed_as_actor_id() {
        let actor = ActorId::new();
        let mut headers = HeaderMap::new();
        headers.insert(ACTOR_HEADER, HeaderValue::from_str(&actor.to_string()).unwrap());
        assert_eq!(extract_actor(&headers), Ok(Some(actor)));

        headers.insert(ACTOR_HEADER, HeaderValue::from_static("not-a-uuid"));
        assert!(extract_actor(&headers).is_err());
    }
}
