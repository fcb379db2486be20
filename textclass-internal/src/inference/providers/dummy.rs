use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::classification::{
    postprocess, ClassificationInput, ClassificationOptions, ClassificationOutput, InputItem,
    ProblemType, TextClassifier,
};
use crate::config_parser::DummyClassifierConfig;
use crate::error::{Error, ErrorDetails};

/// A deterministic classifier that derives logits from a hash of the input text.
///
/// Used in tests and for running the gateway without downloading a model.
/// A classifier named `error` fails every call.
#[derive(Debug)]
pub struct DummyClassifier {
    pub model_name: String,
    pub labels: Vec<String>,
    pub problem_type: Option<ProblemType>,
    calls: Arc<AtomicUsize>,
}

impl DummyClassifier {
    pub fn new(model_name: impl Into<String>, labels: Vec<String>) -> Self {
        Self {
            model_name: model_name.into(),
            labels,
            problem_type: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn from_config(config: &DummyClassifierConfig) -> Self {
        Self {
            problem_type: config.problem_type,
            ..Self::new(config.model_name.clone(), config.labels.clone())
        }
    }

    /// Shared counter of `classify` invocations, still readable after the classifier is moved.
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }

    fn logits(&self, item: InputItem<'_>) -> Result<Vec<f32>, Error> {
        let (text, text_pair) = item.text_and_pair()?;
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.model_name.as_bytes());
        hasher.update(&[0]);
        hasher.update(text.as_bytes());
        if let Some(text_pair) = text_pair {
            hasher.update(&[0]);
            hasher.update(text_pair.as_bytes());
        }
        let mut bytes = vec![0u8; self.labels.len()];
        hasher.finalize_xof().fill(&mut bytes);
        // Spread each byte over [-4, 4]
        Ok(bytes
            .into_iter()
            .map(|b| f32::from(b) / 255.0 * 8.0 - 4.0)
            .collect())
    }
}

impl TextClassifier for DummyClassifier {
    fn classify(
        &self,
        inputs: &ClassificationInput,
        options: &ClassificationOptions,
    ) -> Result<ClassificationOutput, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.model_name == "error" {
            return Err(Error::new(ErrorDetails::Classification {
                message: format!(
                    "Error sending request to Dummy classifier for model '{}'",
                    self.model_name
                ),
            }));
        }
        let items = inputs
            .items()
            .into_iter()
            .map(|item| {
                let logits = self.logits(item)?;
                Ok(postprocess(&logits, &self.labels, self.problem_type, options))
            })
            .collect::<Result<Vec<_>, Error>>()?;
        ClassificationOutput::from_items(inputs, items)
    }

    fn describe(&self) -> String {
        format!("dummy ({})", self.model_name)
    }
}
