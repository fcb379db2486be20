use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use textclass_internal::config_parser::Config;
use textclass_internal::gateway_util::{start_gateway, AppStateData, ShutdownHandle};
use textclass_internal::inference::providers::dummy::DummyClassifier;

pub const LABELS: [&str; 3] = ["positive", "neutral", "negative"];

/// A gateway running on a local port, backed by a dummy classifier.
/// The server shuts down when this is dropped.
pub struct TestGateway {
    addr: SocketAddr,
    calls: Arc<AtomicUsize>,
    _shutdown: ShutdownHandle,
}

impl TestGateway {
    pub async fn start() -> Self {
        Self::start_with_model("dummy").await
    }

    /// A model named `error` fails every classification.
    pub async fn start_with_model(model_name: &str) -> Self {
        let classifier =
            DummyClassifier::new(model_name, LABELS.iter().map(|l| l.to_string()).collect());
        let calls = classifier.call_counter();
        let app_state =
            AppStateData::new_with_classifier(Arc::new(Config::default()), Arc::new(classifier));
        let (addr, shutdown) = start_gateway(app_state).await.unwrap();
        Self {
            addr,
            calls,
            _shutdown: shutdown,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    pub fn classifier_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}
