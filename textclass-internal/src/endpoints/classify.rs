use std::sync::Arc;

use axum::debug_handler;
use axum::extract::State;
use axum::Json;
use tracing::instrument;

use crate::classification::{ClassificationOutput, ClassificationRequest, TextClassifier};
use crate::error::{DisplayOrDebugGateway, Error, ErrorDetails};
use crate::gateway_util::{AppState, AppStateData, StructuredJson};

/// A handler for the classification endpoint
#[debug_handler(state = AppStateData)]
#[instrument(
    name = "classify",
    skip_all,
    fields(
        batch = params.inputs.is_batch(),
        num_inputs = params.inputs.len(),
        top_k = ?params.top_k,
    )
)]
pub async fn classify_handler(
    State(app_state): AppState,
    StructuredJson(params): StructuredJson<ClassificationRequest>,
) -> Result<Json<ClassificationOutput>, Error> {
    classify(app_state.classifier, params).await.map(Json)
}

/// Run the classifier on a blocking thread so that inference does not stall the runtime.
pub async fn classify(
    classifier: Arc<dyn TextClassifier>,
    params: ClassificationRequest,
) -> Result<ClassificationOutput, Error> {
    let options = params.options();
    let inputs = params.inputs;
    tokio::task::spawn_blocking(move || classifier.classify(&inputs, &options))
        .await
        .map_err(|e| {
            Error::new(ErrorDetails::InternalError {
                message: format!("Classification task failed: {}", DisplayOrDebugGateway::new(e)),
            })
        })?
}
