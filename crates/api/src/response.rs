//! Error to status mapping
//!
//! The boundary reports every failure as a status plus a body carrying the
//! originating message. The mapping looks only at the [`ErrorKind`].

use docbase_core::{Error, ErrorKind};
use serde::Serialize;
use std::error::Error as StdError;
use std::fmt;

/// Outcome class of a boundary operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// 200
    Ok,
    /// 201
    Created,
    /// 204
    NoContent,
    /// 304
    NotModified,
    /// 400
    BadRequest,
    /// 403
    Forbidden,
    /// 404
    NotFound,
    /// 406
    NotAcceptable,
    /// 500
    InternalServerError,
}

impl Status {
    /// Numeric status code
    pub fn code(&self) -> u16 {
        match self {
            Status::Ok => 200,
            Status::Created => 201,
            Status::NoContent => 204,
            Status::NotModified => 304,
            Status::BadRequest => 400,
            Status::Forbidden => 403,
            Status::NotFound => 404,
            Status::NotAcceptable => 406,
            Status::InternalServerError => 500,
        }
    }

    /// Standard reason phrase
    pub fn reason(&self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::Created => "Created",
            Status::NoContent => "No Content",
            Status::NotModified => "Not Modified",
            Status::BadRequest => "Bad Request",
            Status::Forbidden => "Forbidden",
            Status::NotFound => "Not Found",
            Status::NotAcceptable => "Not Acceptable",
            Status::InternalServerError => "Internal Server Error",
        }
    }

    /// True for 4xx and 5xx
    pub fn is_error(&self) -> bool {
        self.code() >= 400
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code(), self.reason())
    }
}

/// Status reported for an error of `kind`
pub fn status_for(kind: ErrorKind) -> Status {
    match kind {
        ErrorKind::Validation
        | ErrorKind::Malformed
        | ErrorKind::ModificationFailure
        | ErrorKind::InvalidInput => Status::BadRequest,
        ErrorKind::PermissionDenied => Status::Forbidden,
        ErrorKind::UnsupportedRepresentation => Status::NotAcceptable,
        ErrorKind::ResourceExhausted
        | ErrorKind::TransactionFailure
        | ErrorKind::LockFailure
        | ErrorKind::StorageFailure
        | ErrorKind::InitializationFailure => Status::InternalServerError,
    }
}

/// Body reported alongside an error status
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    /// Numeric status code
    pub code: u16,
    /// Error kind name
    pub error: String,
    /// The error message followed by its causes
    pub message: String,
}

impl ErrorBody {
    /// Build the body for `error`
    ///
    /// The status follows the kind that started the failure, so an operation
    /// error wrapped by a failed abort is still reported as the caller's fault
    /// when it was.
    pub fn from_error(error: &Error) -> Self {
        let kind = error.root_kind();
        ErrorBody {
            code: status_for(kind).code(),
            error: format!("{:?}", kind),
            message: message_chain(error),
        }
    }

    /// Status of this body
    pub fn status(&self) -> Status {
        match self.code {
            400 => Status::BadRequest,
            403 => Status::Forbidden,
            406 => Status::NotAcceptable,
            _ => Status::InternalServerError,
        }
    }

    /// JSON rendering of the body
    pub fn to_json(&self) -> String {
        serde_json::json!({
            "code": self.code,
            "error": self.error,
            "message": self.message,
        })
        .to_string()
    }
}

fn message_chain(error: &Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}
