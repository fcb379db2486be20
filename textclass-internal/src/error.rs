use std::fmt::{Debug, Display};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::OnceCell;

/// Controls whether internal error messages are included in response bodies.
///
/// When false, classifier and other server-side failures are reported to clients
/// as a generic `Internal Server Error`; the full message is only written to the logs.
static DEBUG: OnceCell<bool> = OnceCell::const_new();

pub fn set_debug(debug: bool) -> Result<(), Error> {
    DEBUG.set(debug).map_err(|_| {
        Error::new(ErrorDetails::Config {
            message: "Failed to set debug mode".to_string(),
        })
    })
}

fn debug_enabled() -> bool {
    *DEBUG.get().unwrap_or(&false)
}

pub const INVALID_CONTENT_TYPE_DETAIL: &str = "Invalid content type";
pub const INTERNAL_SERVER_ERROR_DETAIL: &str = "Internal Server Error";

/// Chooses between a `Debug` or `Display` representation based on the gateway-level `DEBUG` flag.
pub struct DisplayOrDebugGateway<T: Debug + Display> {
    val: T,
}

impl<T: Debug + Display> DisplayOrDebugGateway<T> {
    pub fn new(val: T) -> Self {
        Self { val }
    }
}

impl<T: Debug + Display> Display for DisplayOrDebugGateway<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if debug_enabled() {
            write!(f, "{:?}", self.val)
        } else {
            write!(f, "{}", self.val)
        }
    }
}

#[derive(Debug, PartialEq)]
// As long as the struct member is private, we force people to use the `new` method and log the error.
// We box `ErrorDetails` per the `clippy::result_large_err` lint
pub struct Error(Box<ErrorDetails>);

impl Error {
    pub fn new(details: ErrorDetails) -> Self {
        details.log();
        Error(Box::new(details))
    }

    pub fn new_without_logging(details: ErrorDetails) -> Self {
        Error(Box::new(details))
    }

    pub fn status_code(&self) -> StatusCode {
        self.0.status_code()
    }

    pub fn get_details(&self) -> &ErrorDetails {
        &self.0
    }

    pub fn log(&self) {
        self.0.log();
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

impl std::error::Error for Error {}

impl From<ErrorDetails> for Error {
    fn from(details: ErrorDetails) -> Self {
        Error::new(details)
    }
}

/// One failed constraint in a request body, located by its path from the body root.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ValidationIssue {
    pub loc: Vec<String>,
    pub msg: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl ValidationIssue {
    pub fn new(loc: Vec<String>, msg: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            loc,
            msg: msg.into(),
            kind: kind.into(),
        }
    }
}

#[derive(Debug, PartialEq)]
pub enum ErrorDetails {
    AppState {
        message: String,
    },
    Classification {
        message: String,
    },
    Config {
        message: String,
    },
    InternalError {
        message: String,
    },
    InvalidContentType {
        content_type: Option<String>,
    },
    ModelLoad {
        model_name: String,
        message: String,
    },
    RequestBody {
        message: String,
        status_code: StatusCode,
    },
    RequestValidation {
        errors: Vec<ValidationIssue>,
    },
    RouteNotFound {
        path: String,
        method: String,
    },
}

impl ErrorDetails {
    /// Defines the error level for logging this error
    fn level(&self) -> tracing::Level {
        match self {
            ErrorDetails::AppState { .. } => tracing::Level::ERROR,
            ErrorDetails::Classification { .. } => tracing::Level::ERROR,
            ErrorDetails::Config { .. } => tracing::Level::ERROR,
            ErrorDetails::InternalError { .. } => tracing::Level::ERROR,
            ErrorDetails::InvalidContentType { .. } => tracing::Level::WARN,
            ErrorDetails::ModelLoad { .. } => tracing::Level::ERROR,
            ErrorDetails::RequestBody { .. } => tracing::Level::WARN,
            ErrorDetails::RequestValidation { .. } => tracing::Level::WARN,
            ErrorDetails::RouteNotFound { .. } => tracing::Level::WARN,
        }
    }

    /// Defines the HTTP status code for responses involving this error
    fn status_code(&self) -> StatusCode {
        match self {
            ErrorDetails::AppState { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorDetails::Classification { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorDetails::Config { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorDetails::InternalError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorDetails::InvalidContentType { .. } => StatusCode::BAD_REQUEST,
            ErrorDetails::ModelLoad { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorDetails::RequestBody { status_code, .. } => *status_code,
            ErrorDetails::RequestValidation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorDetails::RouteNotFound { .. } => StatusCode::NOT_FOUND,
        }
    }

    /// Log the error using the `tracing` library
    pub fn log(&self) {
        match self.level() {
            tracing::Level::ERROR => tracing::error!("{self}"),
            tracing::Level::WARN => tracing::warn!("{self}"),
            tracing::Level::INFO => tracing::info!("{self}"),
            tracing::Level::DEBUG => tracing::debug!("{self}"),
            tracing::Level::TRACE => tracing::trace!("{self}"),
        }
    }
}

impl std::fmt::Display for ErrorDetails {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorDetails::AppState { message } => {
                write!(f, "Error initializing AppState: {message}")
            }
            ErrorDetails::Classification { message } => {
                write!(f, "Error during classification: {message}")
            }
            ErrorDetails::Config { message } => write!(f, "{message}"),
            ErrorDetails::InternalError { message } => write!(f, "{message}"),
            ErrorDetails::InvalidContentType { content_type } => match content_type {
                Some(content_type) => {
                    write!(f, "{INVALID_CONTENT_TYPE_DETAIL}: `{content_type}`")
                }
                None => write!(f, "{INVALID_CONTENT_TYPE_DETAIL}: missing `Content-Type` header"),
            },
            ErrorDetails::ModelLoad {
                model_name,
                message,
            } => write!(f, "Failed to load model `{model_name}`: {message}"),
            ErrorDetails::RequestBody { message, .. } => {
                write!(f, "Failed to read request body: {message}")
            }
            ErrorDetails::RequestValidation { errors } => {
                let summary = errors
                    .iter()
                    .map(|issue| format!("{} ({})", issue.msg, issue.loc.join(".")))
                    .collect::<Vec<_>>()
                    .join("; ");
                write!(f, "Request validation failed: {summary}")
            }
            ErrorDetails::RouteNotFound { path, method } => {
                write!(f, "Route not found: {method} {path}")
            }
        }
    }
}

impl Error {
    /// Builds the status code and JSON body sent to the client.
    ///
    /// Client errors carry their own description. Server-side failures are reduced to a
    /// generic message unless the gateway runs in debug mode.
    pub fn to_response_json(&self) -> (StatusCode, Value) {
        let status_code = self.status_code();
        let body = match self.get_details() {
            ErrorDetails::InvalidContentType { .. } => {
                json!({"detail": INVALID_CONTENT_TYPE_DETAIL})
            }
            ErrorDetails::RequestBody { message, .. } => json!({"detail": message}),
            ErrorDetails::RequestValidation { errors } => json!({"detail": errors}),
            ErrorDetails::RouteNotFound { .. } => json!({"detail": self.to_string()}),
            _ if debug_enabled() => json!({"detail": self.to_string()}),
            _ => json!({"detail": INTERNAL_SERVER_ERROR_DETAIL}),
        };
        (status_code, body)
    }
}

impl IntoResponse for Error {
    /// Convert the error into an Axum response (it was already logged on construction)
    fn into_response(self) -> Response {
        let (status_code, body) = self.to_response_json();
        (status_code, Json(body)).into_response()
    }
}
