// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::error::{code::ErrorCode, ApiError, ApiErrorResponse, MailFusionError};
use poem::IntoResponse;
use poem_openapi::payload::Json;

/// Maps framework rejections (bad path, bad JSON, unknown route) to an error code.
fn classify(error: &poem::Error) -> Option<ErrorCode> {
    if error.is::<poem::error::NotFoundError>() {
        return Some(ErrorCode::ResourceNotFound);
    }
    if error.is::<poem::error::MethodNotAllowedError>() {
        return Some(ErrorCode::MethodNotAllowed);
    }
    let malformed = error.is::<poem::error::ParsePathError>()
        || error.is::<poem::error::ParseQueryError>()
        || error.is::<poem::error::ParseJsonError>()
        || error.is::<poem_openapi::error::ParseRequestPayloadError>()
        || error.is::<poem_openapi::error::ContentTypeError>()
        || error.is::<poem_openapi::error::ParseParamError>()
        || error.is::<poem_openapi::error::ParsePathError>();
    malformed.then_some(ErrorCode::InvalidParameter)
}

/// Every error leaves the server as the same `{message, code}` body.
pub async fn error_handler(error: poem::Error) -> impl poem::IntoResponse {
    if error.is::<MailFusionError>() {
        return error.into_response();
    }
    let code = match classify(&error) {
        Some(code) => code,
        None if error.has_source() => ErrorCode::UnhandledPoemError,
        None => return error.into_response(),
    };
    let body = Json(ApiError::new_with_error_code(error.to_string(), code as u32));
    let mut response = ApiErrorResponse::Generic(code.status(), body).into_response();
    // keep the framework's own status, e.g. 415 for a wrong content type
    response.set_status(error.status());
    response
}
