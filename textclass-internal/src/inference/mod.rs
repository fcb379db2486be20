use std::sync::Arc;

use crate::classification::TextClassifier;
use crate::config_parser::ClassifierConfig;
use crate::error::Error;

pub mod providers;

use providers::candle::CandleClassifier;
use providers::dummy::DummyClassifier;

/// Construct the classifier described by the config. Called once at startup.
pub async fn load_classifier(config: &ClassifierConfig) -> Result<Arc<dyn TextClassifier>, Error> {
    let classifier: Arc<dyn TextClassifier> = match config {
        ClassifierConfig::Candle(candle) => Arc::new(CandleClassifier::load(candle).await?),
        ClassifierConfig::Dummy(dummy) => Arc::new(DummyClassifier::from_config(dummy)),
    };
    tracing::info!("Classifier ready: {}", classifier.describe());
    Ok(classifier)
}
