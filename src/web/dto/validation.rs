//! JSON body extraction with `validator` rules.

use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, Request},
    Json,
};
use serde::de::DeserializeOwned;
use validator::Validate;

use crate::web::error::ApiError;

/// A JSON body that passed its `validator` rules.
///
/// Body problems map to 400; rule violations map to 422 with per-field
/// details.
pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(rejection_to_api_error)?;

        value.validate().map_err(ApiError::from_validation_errors)?;
        Ok(ValidatedJson(value))
    }
}

fn rejection_to_api_error(rejection: JsonRejection) -> ApiError {
    match rejection {
        JsonRejection::MissingJsonContentType(_) => {
            ApiError::bad_request("Expected Content-Type: application/json")
        }
        JsonRejection::JsonSyntaxError(_) => ApiError::bad_request("Malformed JSON body"),
        // Missing or mistyped fields; the text names the field.
        other => ApiError::bad_request(format!("Invalid request body: {}", other.body_text())),
    }
}
