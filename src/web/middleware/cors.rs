//! CORS middleware configuration.

use axum::http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderName, HeaderValue, Method};
use tower_http::cors::{Any, CorsLayer};

use super::auth::API_KEY_HEADER;

/// Create a CORS layer from configuration.
///
/// With no configured origins any origin is allowed, without credentials.
/// Unparseable origins are dropped; if none remain the permissive layer is
/// used.
pub fn create_cors_layer(origins: &[String]) -> CorsLayer {
    let methods = [Method::GET, Method::POST, Method::DELETE, Method::OPTIONS];

    let parsed_origins: Vec<HeaderValue> =
        origins.iter().filter_map(|o| o.parse().ok()).collect();

    if parsed_origins.is_empty() {
        return CorsLayer::new()
            .allow_methods(methods)
            .allow_headers(Any)
            .allow_origin(Any);
    }

    CorsLayer::new()
        .allow_methods(methods)
        .allow_headers([
            AUTHORIZATION,
            CONTENT_TYPE,
            ACCEPT,
            HeaderName::from_static(API_KEY_HEADER),
        ])
        .allow_credentials(true)
        .allow_origin(parsed_origins)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_cors_layer_empty_origins() {
        let _layer = create_cors_layer(&[]);
    }

    #[test]
    fn test_create_cors_layer_with_origins() {
        let origins = vec!["http://localhost:5173".to_string()];
        let _layer = create_cors_layer(&origins);
    }

    #[test]
    fn test_create_cors_layer_invalid_origins_only() {
        let origins = vec!["not a header\nvalue".to_string()];
        let _layer = create_cors_layer(&origins);
    }
}
