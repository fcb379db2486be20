use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, FromRequest, Json, Request};
use axum::http::header::CONTENT_TYPE;
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use serde::de::DeserializeOwned;
use serde_path_to_error::Segment;
use tokio::sync::oneshot::Sender;
use tower_http::trace::{DefaultOnFailure, TraceLayer};
use tracing::{instrument, Level};

use crate::classification::TextClassifier;
use crate::config_parser::Config;
use crate::endpoints;
use crate::endpoints::status::TEXTCLASS_VERSION;
use crate::error::{Error, ErrorDetails, ValidationIssue};
use crate::inference::load_classifier;

pub const VERSION_HEADER: &str = "x-textclass-gateway-version";

/// State for the API
#[derive(Clone)]
pub struct AppStateData {
    pub config: Arc<Config>,
    pub classifier: Arc<dyn TextClassifier>,
}
pub type AppState = axum::extract::State<AppStateData>;

impl AppStateData {
    /// Loads the configured classifier. This is the slow part of startup when the model
    /// has to be downloaded.
    pub async fn new(config: Arc<Config>) -> Result<Self, Error> {
        let classifier = load_classifier(&config.classifier).await.map_err(|e| {
            Error::new_without_logging(ErrorDetails::AppState {
                message: e.to_string(),
            })
        })?;
        Ok(Self::new_with_classifier(config, classifier))
    }

    pub fn new_with_classifier(config: Arc<Config>, classifier: Arc<dyn TextClassifier>) -> Self {
        Self { config, classifier }
    }
}

/// Custom Axum extractor that validates the JSON body and deserializes it into a custom type
///
/// The `Content-Type` header must start with `application/json` (case-insensitive), otherwise
/// the request is rejected before the body is read. Parse and shape errors are reported
/// with the path of the offending field.
#[derive(Debug)]
pub struct StructuredJson<T>(pub T);

impl<S, T> FromRequest<S> for StructuredJson<T>
where
    S: Send + Sync,
    T: Send + Sync + DeserializeOwned,
{
    type Rejection = Error;

    #[instrument(skip_all, level = "trace", name = "StructuredJson::from_request")]
    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        check_content_type(req.headers().get(CONTENT_TYPE))?;

        // Retrieve the request body as Bytes before deserializing it
        let bytes = bytes::Bytes::from_request(req, state).await.map_err(|e| {
            Error::new(ErrorDetails::RequestBody {
                message: e.body_text(),
                status_code: e.status(),
            })
        })?;

        // Convert the entire body into `serde_json::Value`
        let value = Json::<serde_json::Value>::from_bytes(&bytes)
            .map_err(|e| {
                Error::new(ErrorDetails::RequestValidation {
                    errors: vec![ValidationIssue::new(
                        vec!["body".to_string()],
                        e.body_text(),
                        "json_invalid",
                    )],
                })
            })?
            .0;

        // Now use `serde_path_to_error::deserialize` to attempt deserialization into `T`
        let deserialized: T = serde_path_to_error::deserialize(&value).map_err(|e| {
            Error::new(ErrorDetails::RequestValidation {
                errors: vec![validation_issue(&e)],
            })
        })?;

        Ok(StructuredJson(deserialized))
    }
}

fn check_content_type(content_type: Option<&HeaderValue>) -> Result<(), Error> {
    let Some(content_type) = content_type else {
        return Err(Error::new(ErrorDetails::InvalidContentType { content_type: None }));
    };
    let is_json = content_type
        .to_str()
        .is_ok_and(|value| value.to_ascii_lowercase().starts_with("application/json"));
    if is_json {
        Ok(())
    } else {
        Err(Error::new(ErrorDetails::InvalidContentType {
            content_type: Some(String::from_utf8_lossy(content_type.as_bytes()).into_owned()),
        }))
    }
}

fn validation_issue(error: &serde_path_to_error::Error<serde_json::Error>) -> ValidationIssue {
    let mut loc = vec!["body".to_string()];
    loc.extend(error.path().iter().filter_map(|segment| match segment {
        Segment::Seq { index } => Some(index.to_string()),
        Segment::Map { key } => Some(key.clone()),
        Segment::Enum { variant } => Some(variant.clone()),
        Segment::Unknown => None,
    }));
    let msg = error.inner().to_string();
    // serde reports a missing field at its parent, so point at the field itself
    let kind = if let Some(field) = msg
        .strip_prefix("missing field `")
        .and_then(|rest| rest.strip_suffix('`'))
    {
        loc.push(field.to_string());
        "missing"
    } else if msg.starts_with("unknown variant") {
        "enum"
    } else {
        "value_error"
    };
    ValidationIssue::new(loc, msg, kind)
}

pub async fn add_version_header(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    response
        .headers_mut()
        .insert(VERSION_HEADER, HeaderValue::from_static(TEXTCLASS_VERSION));
    response
}

/// Builds the gateway's router: the classification endpoint, health and status checks,
/// a JSON 404 fallback, and the shared middleware.
pub fn build_router(app_state: AppStateData) -> Router {
    Router::new()
        .route("/classify", post(endpoints::classify::classify_handler))
        .route("/health", get(endpoints::status::health_handler))
        .route("/status", get(endpoints::status::status_handler))
        .fallback(endpoints::fallback::handle_404)
        .layer(axum::middleware::from_fn(add_version_header))
        .layer(DefaultBodyLimit::max(100 * 1024 * 1024)) // increase the default body limit from 2MB to 100MB
        // Failed requests are logged at DEBUG since `Error` already logs on construction
        .layer(TraceLayer::new_for_http().on_failure(DefaultOnFailure::new().level(Level::DEBUG)))
        .with_state(app_state)
}

pub struct ShutdownHandle {
    #[expect(dead_code)]
    sender: Sender<()>,
}

/// Starts a new HTTP gateway on an unused local port.
///
/// Returns the address the gateway is listening on, and a `ShutdownHandle` which shuts
/// down the gateway when dropped.
pub async fn start_gateway(app_state: AppStateData) -> Result<(SocketAddr, ShutdownHandle), Error> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .map_err(|e| {
            Error::new(ErrorDetails::InternalError {
                message: format!("Failed to bind to a port: {e}"),
            })
        })?;
    let bind_addr = listener.local_addr().map_err(|e| {
        Error::new(ErrorDetails::InternalError {
            message: format!("Failed to get local address: {e}"),
        })
    })?;

    let router = build_router(app_state);

    let (sender, recv) = tokio::sync::oneshot::channel::<()>();
    let shutdown_fut = async move {
        let _ = recv.await;
    };

    tokio::spawn(
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_fut)
            .into_future(),
    );
    Ok((bind_addr, ShutdownHandle { sender }))
}
