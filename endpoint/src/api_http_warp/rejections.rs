use std::convert::Infallible;

use log::warn;
use runtime_relay_net::{
    contracts::v1::responses::ErrorResponse,
    data_types::ErrorCode,
    error_codes::{
        ERROR_CODE_GENERAL_FAILURE, ERROR_CODE_MALFORMED_REQUEST, ERROR_CODE_METHOD_NOT_ALLOWED,
        ERROR_CODE_NOT_FOUND, ERROR_CODE_PAYLOAD_TOO_LARGE,
    },
};
use warp::{
    body::BodyDeserializeError,
    http::StatusCode,
    reject::{self, LengthRequired, MethodNotAllowed, PayloadTooLarge, Reject, UnsupportedMediaType},
    reply, Rejection, Reply,
};

/// Raised by handlers when a request body parses but its content is unusable
#[derive(Debug)]
pub struct MalformedRequest {
    pub msg: String,
}

impl Reject for MalformedRequest {}

impl MalformedRequest {
    pub fn reject(msg: String) -> Rejection {
        reject::custom(MalformedRequest { msg })
    }
}

fn classify(err: &Rejection) -> (StatusCode, ErrorCode, String) {
    if err.is_not_found() {
        return (StatusCode::NOT_FOUND, ERROR_CODE_NOT_FOUND, String::from("No such resource"));
    }
    if let Some(malformed) = err.find::<MalformedRequest>() {
        return (StatusCode::BAD_REQUEST, ERROR_CODE_MALFORMED_REQUEST, malformed.msg.clone());
    }
    if let Some(deserialize) = err.find::<BodyDeserializeError>() {
        return (StatusCode::BAD_REQUEST, ERROR_CODE_MALFORMED_REQUEST, deserialize.to_string());
    }
    if err.find::<PayloadTooLarge>().is_some() {
        return (
            StatusCode::PAYLOAD_TOO_LARGE,
            ERROR_CODE_PAYLOAD_TOO_LARGE,
            String::from("Request body is too large"),
        );
    }
    if err.find::<LengthRequired>().is_some() {
        return (
            StatusCode::LENGTH_REQUIRED,
            ERROR_CODE_MALFORMED_REQUEST,
            String::from("A content-length header is required"),
        );
    }
    if err.find::<UnsupportedMediaType>().is_some() {
        return (
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ERROR_CODE_MALFORMED_REQUEST,
            String::from("Request body must be JSON"),
        );
    }
    if err.find::<MethodNotAllowed>().is_some() {
        return (
            StatusCode::METHOD_NOT_ALLOWED,
            ERROR_CODE_METHOD_NOT_ALLOWED,
            String::from("Method not allowed"),
        );
    }

    warn!("Api: Unhandled rejection {err:?}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        ERROR_CODE_GENERAL_FAILURE,
        String::from("Internal error"),
    )
}

pub async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (status, code, message) = classify(&err);
    let body = ErrorResponse::new(code, &message);
    Ok(reply::with_status(reply::json(&body), status))
}
