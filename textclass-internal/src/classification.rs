use std::collections::BTreeMap;
use std::num::NonZeroUsize;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_untagged::UntaggedEnumVisitor;

use crate::error::{Error, ErrorDetails};

/// Value of a text/text-pair field: either a single text or a list of texts.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum TextPairValue {
    Text(String),
    List(Vec<String>),
}

/// The `{"text": ..., "text_pair": ...}` form of an input.
pub type TextPairMap = BTreeMap<String, TextPairValue>;

/// The accepted shapes of the `inputs` field.
///
/// A sequence must be homogeneous: all strings or all objects.
#[derive(Clone, Debug, PartialEq)]
pub enum ClassificationInput {
    SingleText(String),
    TextList(Vec<String>),
    TextPairMap(TextPairMap),
    TextPairMapList(Vec<TextPairMap>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SequenceItem {
    Text(String),
    Pair(TextPairMap),
}

impl<'de> Deserialize<'de> for ClassificationInput {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        UntaggedEnumVisitor::new()
            .expecting(
                "a string, a list of strings, an object of texts, or a list of objects of texts",
            )
            .string(|text| Ok(ClassificationInput::SingleText(text.to_string())))
            .seq(|seq| {
                let items: Vec<SequenceItem> = seq.deserialize()?;
                let mut texts = Vec::new();
                let mut pairs = Vec::new();
                for item in items {
                    match item {
                        SequenceItem::Text(text) => texts.push(text),
                        SequenceItem::Pair(pair) => pairs.push(pair),
                    }
                }
                match (texts.is_empty(), pairs.is_empty()) {
                    (_, true) => Ok(ClassificationInput::TextList(texts)),
                    (true, false) => Ok(ClassificationInput::TextPairMapList(pairs)),
                    (false, false) => Err(serde_untagged::de::Error::custom(
                        "a list of inputs must contain only strings or only objects",
                    )),
                }
            })
            .map(|map| map.deserialize().map(ClassificationInput::TextPairMap))
            .deserialize(deserializer)
    }
}

impl ClassificationInput {
    /// Whether the result is a list of lists (one per item) rather than a single list.
    pub fn is_batch(&self) -> bool {
        matches!(
            self,
            ClassificationInput::TextList(_) | ClassificationInput::TextPairMapList(_)
        )
    }

    pub fn len(&self) -> usize {
        match self {
            ClassificationInput::SingleText(_) | ClassificationInput::TextPairMap(_) => 1,
            ClassificationInput::TextList(texts) => texts.len(),
            ClassificationInput::TextPairMapList(pairs) => pairs.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flatten the input into borrowed items, in request order.
    pub fn items(&self) -> Vec<InputItem<'_>> {
        match self {
            ClassificationInput::SingleText(text) => vec![InputItem::Text(text)],
            ClassificationInput::TextList(texts) => {
                texts.iter().map(|text| InputItem::Text(text.as_str())).collect()
            }
            ClassificationInput::TextPairMap(pair) => vec![InputItem::Pair(pair)],
            ClassificationInput::TextPairMapList(pairs) => {
                pairs.iter().map(InputItem::Pair).collect()
            }
        }
    }
}

/// A single item to classify.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum InputItem<'a> {
    Text(&'a str),
    Pair(&'a TextPairMap),
}

impl<'a> InputItem<'a> {
    /// Split the item into a text and an optional second sequence.
    ///
    /// A pair object must contain `text` and may contain `text_pair`; no other keys are
    /// understood. A list value contributes its first element.
    pub fn text_and_pair(&self) -> Result<(&'a str, Option<&'a str>), Error> {
        match *self {
            InputItem::Text(text) => Ok((text, None)),
            InputItem::Pair(pair) => {
                if let Some(key) = pair
                    .keys()
                    .find(|key| key.as_str() != "text" && key.as_str() != "text_pair")
                {
                    return Err(Error::new(ErrorDetails::Classification {
                        message: format!(
                            "Unsupported key `{key}` in text pair input (expected `text` and optionally `text_pair`)"
                        ),
                    }));
                }
                let text = pair.get("text").ok_or_else(|| {
                    Error::new(ErrorDetails::Classification {
                        message: "Text pair input is missing the `text` key".to_string(),
                    })
                })?;
                let text = first_text("text", text)?;
                let text_pair = pair
                    .get("text_pair")
                    .map(|value| first_text("text_pair", value))
                    .transpose()?;
                Ok((text, text_pair))
            }
        }
    }
}

fn first_text<'a>(key: &str, value: &'a TextPairValue) -> Result<&'a str, Error> {
    match value {
        TextPairValue::Text(text) => Ok(text.as_str()),
        TextPairValue::List(texts) => texts.first().map(String::as_str).ok_or_else(|| {
            Error::new(ErrorDetails::Classification {
                message: format!("Text pair field `{key}` is an empty list"),
            })
        }),
    }
}

/// How raw model logits are turned into scores.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FunctionToApply {
    Sigmoid,
    Softmax,
    #[serde(rename = "none")]
    Identity,
    #[default]
    Default,
}

/// The problem type a classification model was trained for.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProblemType {
    #[default]
    SingleLabelClassification,
    MultiLabelClassification,
    Regression,
}

impl FunctionToApply {
    /// Resolve `default` against the model's problem type and label count.
    pub fn resolve(self, problem_type: Option<ProblemType>, num_labels: usize) -> Self {
        match self {
            FunctionToApply::Default => match problem_type {
                Some(ProblemType::MultiLabelClassification) => FunctionToApply::Sigmoid,
                Some(ProblemType::Regression) => FunctionToApply::Identity,
                _ if num_labels == 1 => FunctionToApply::Sigmoid,
                _ => FunctionToApply::Softmax,
            },
            other => other,
        }
    }

    /// Apply the (resolved) function to one row of logits.
    pub fn apply(self, logits: &[f32]) -> Vec<f32> {
        match self {
            FunctionToApply::Sigmoid => logits.iter().map(|&x| sigmoid(x)).collect(),
            FunctionToApply::Softmax | FunctionToApply::Default => softmax(logits),
            FunctionToApply::Identity => logits.to_vec(),
        }
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&x| (x - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

fn default_top_k() -> Option<NonZeroUsize> {
    Some(NonZeroUsize::MIN)
}

/// Options forwarded to the classifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClassificationOptions {
    /// Maximum number of labels returned per input. `None` returns every label.
    pub top_k: Option<NonZeroUsize>,
    pub function_to_apply: FunctionToApply,
}

impl Default for ClassificationOptions {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            function_to_apply: FunctionToApply::Default,
        }
    }
}

/// The expected payload of the classification endpoint.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ClassificationRequest {
    pub inputs: ClassificationInput,
    // Omitted means 1, an explicit `null` means all labels
    #[serde(default = "default_top_k")]
    pub top_k: Option<NonZeroUsize>,
    #[serde(default)]
    pub function_to_apply: Option<FunctionToApply>,
}

impl ClassificationRequest {
    pub fn options(&self) -> ClassificationOptions {
        ClassificationOptions {
            top_k: self.top_k,
            function_to_apply: self.function_to_apply.unwrap_or_default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LabelScore {
    pub label: String,
    pub score: f32,
}

/// Classifier output. Mirrors the shape of [`ClassificationInput`].
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ClassificationOutput {
    Single(Vec<LabelScore>),
    Batch(Vec<Vec<LabelScore>>),
}

impl ClassificationOutput {
    /// Wrap per-item results in the shape dictated by `input`.
    pub fn from_items(
        input: &ClassificationInput,
        mut items: Vec<Vec<LabelScore>>,
    ) -> Result<Self, Error> {
        if input.is_batch() {
            return Ok(ClassificationOutput::Batch(items));
        }
        match (items.pop(), items.is_empty()) {
            (Some(scores), true) => Ok(ClassificationOutput::Single(scores)),
            _ => Err(Error::new(ErrorDetails::Classification {
                message: "Expected exactly one result for a single input".to_string(),
            })),
        }
    }
}

/// Turn one row of logits into label/score entries sorted by descending score,
/// truncated to `options.top_k`.
pub fn postprocess(
    logits: &[f32],
    labels: &[String],
    problem_type: Option<ProblemType>,
    options: &ClassificationOptions,
) -> Vec<LabelScore> {
    let scores = options
        .function_to_apply
        .resolve(problem_type, logits.len())
        .apply(logits);
    let mut entries: Vec<LabelScore> = scores
        .into_iter()
        .enumerate()
        .map(|(i, score)| LabelScore {
            label: labels
                .get(i)
                .cloned()
                .unwrap_or_else(|| format!("LABEL_{i}")),
            score,
        })
        .collect();
    // Stable sort keeps label order for equal scores
    entries.sort_by(|a, b| b.score.total_cmp(&a.score));
    if let Some(top_k) = options.top_k {
        entries.truncate(top_k.get());
    }
    entries
}

/// A text-classification capability.
///
/// Implementations must be safe to call concurrently from several requests.
pub trait TextClassifier: Send + Sync {
    fn classify(
        &self,
        inputs: &ClassificationInput,
        options: &ClassificationOptions,
    ) -> Result<ClassificationOutput, Error>;

    /// Short human-readable description, used in logs and the health endpoint.
    fn describe(&self) -> String;
}
