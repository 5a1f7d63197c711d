use crate::data_types::ErrorCode;

pub const ERROR_CODE_GENERAL_FAILURE: ErrorCode = 0;
pub const ERROR_CODE_MALFORMED_REQUEST: ErrorCode = 1;
pub const ERROR_CODE_TOPIC_NOT_FOUND: ErrorCode = 2;
pub const ERROR_CODE_STORE_FAILURE: ErrorCode = 3;
pub const ERROR_CODE_NOT_FOUND: ErrorCode = 4;
pub const ERROR_CODE_PAYLOAD_TOO_LARGE: ErrorCode = 5;
pub const ERROR_CODE_METHOD_NOT_ALLOWED: ErrorCode = 6;
