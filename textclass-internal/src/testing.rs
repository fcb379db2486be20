#![cfg(test)]

use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

use crate::config_parser::{Config, DummyClassifierConfig};
use crate::gateway_util::AppStateData;
use crate::inference::providers::dummy::DummyClassifier;

/// App state backed by the default dummy classifier, plus that classifier's call counter.
pub fn get_unit_test_app_state_data(config: Arc<Config>) -> (AppStateData, Arc<AtomicUsize>) {
    let classifier = DummyClassifier::from_config(&DummyClassifierConfig::default());
    let calls = classifier.call_counter();
    (
        AppStateData::new_with_classifier(config, Arc::new(classifier)),
        calls,
    )
}
