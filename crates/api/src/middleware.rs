use axum::{
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use canopy_core::ActorId;

use crate::context::ActorContext;

/// Attach the acting user's identity to the request.
///
/// A present but malformed `x-actor-id` header is rejected rather than
/// silently dropped, so audit entries never lose an intended attribution.
pub async fn actor_middleware(
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let actor = extract_actor(req.headers())?;
    req.extensions_mut().insert(ActorContext::new(actor));
    Ok(next.run(req).await)
}

fn extract_actor(headers: &HeaderMap) -> Result<Option<ActorId>, StatusCode> {
    let Some(header) = headers.get("x-actor-id") else {
        return Ok(None);
    };
    let value = header.to_str().map_err(|_| StatusCode::BAD_REQUEST)?;
    let actor = value.parse().map_err(|_| StatusCode::BAD_REQUEST)?;
    Ok(Some(actor))
}
