use crate::app::auth::ApiAuthParams;
use crate::http_handler::AppError;
use crate::server::ServerContext;
use axum::{
    body::Body, extract::State, http::Request as HttpRequest, middleware::Next,
    response::Response,
};
use http_body_util::BodyExt;
use std::{collections::BTreeMap, sync::Arc};
use tracing::debug;

fn params_for_signature(query: Option<&str>) -> Result<BTreeMap<String, String>, AppError> {
    let mut params = BTreeMap::new();
    if let Some(query) = query {
        for (key, value) in
            serde_urlencoded::from_str::<Vec<(String, String)>>(query).map_err(|e| {
                AppError::InvalidInput(format!("Failed to parse query string: {e}"))
            })?
        {
            if key != "auth_signature" {
                params.insert(key, value);
            }
        }
    }
    Ok(params)
}

/// `/apps/{appId}/...` — the second segment is the app id.
fn app_id_from_path(path: &str) -> Option<&str> {
    let mut segments = path.split('/').filter(|s| !s.is_empty());
    match (segments.next(), segments.next()) {
        (Some("apps"), Some(app_id)) => Some(app_id),
        _ => None,
    }
}

/// Verifies the request signature on every app-scoped route. The body is
/// buffered here so it can be hashed for `body_md5` and then handed to the
/// route handler untouched.
pub async fn api_auth_middleware(
    State(context): State<Arc<ServerContext>>,
    request: HttpRequest<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let uri = request.uri().clone();
    let method = request.method().clone();
    let path = uri.path().to_string();

    let app_id = app_id_from_path(&path)
        .ok_or_else(|| AppError::Unauthorized("Unknown application".to_string()))?
        .to_string();

    let auth_params: ApiAuthParams = match uri.query() {
        Some(query) => serde_urlencoded::from_str(query).map_err(|e| {
            AppError::InvalidInput(format!("Invalid authentication query parameters: {e}"))
        })?,
        None => {
            return Err(AppError::Unauthorized(
                "Missing authentication query parameters".to_string(),
            ))
        }
    };

    let signature_params = params_for_signature(uri.query())?;

    let (parts, body) = request.into_parts();
    let body_bytes = body
        .collect()
        .await
        .map_err(|e| AppError::InternalError(format!("Failed to read request body: {e}")))?
        .to_bytes();

    let body_for_auth = if method == axum::http::Method::GET || body_bytes.is_empty() {
        None
    } else {
        Some(body_bytes.as_ref())
    };

    context
        .verifier
        .verify_api_request(
            &app_id,
            method.as_str(),
            &path,
            &auth_params,
            &signature_params,
            body_for_auth,
        )
        .await?;

    debug!(%app_id, %path, "API request authenticated");

    let request = HttpRequest::from_parts(parts, Body::from(body_bytes));
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_id_extraction() {
        assert_eq!(app_id_from_path("/apps/123/events"), Some("123"));
        assert_eq!(app_id_from_path("/apps/123/channels/room/users"), Some("123"));
        assert_eq!(app_id_from_path("/app/key"), None);
        assert_eq!(app_id_from_path("/"), None);
    }
}
