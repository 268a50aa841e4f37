//! Loaded inference session.

use chrono::{DateTime, Utc};
use common::ChatError;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::config::SessionConfig;
use crate::engine::{ChatRequest, LoadedModel};

/// One loaded engine instance plus the configuration it was built from.
///
/// Calls are serialized through `gate` unless the engine declares that
/// overlapping requests are safe.
pub struct InferenceSession {
    config: SessionConfig,
    model: Box<dyn LoadedModel>,
    gate: Option<Mutex<()>>,
    loaded_at: DateTime<Utc>,
    load_time: Duration,
}

impl InferenceSession {
    pub fn new(config: SessionConfig, model: Box<dyn LoadedModel>, load_time: Duration) -> Self {
        let gate = if model.supports_concurrent_requests() {
            None
        } else {
            Some(Mutex::new(()))
        };
        Self {
            config,
            model,
            gate,
            loaded_at: Utc::now(),
            load_time,
        }
    }

    pub fn model_id(&self) -> &str {
        &self.config.model_id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    pub fn load_time(&self) -> Duration {
        self.load_time
    }

    pub fn is_serialized(&self) -> bool {
        self.gate.is_some()
    }

    /// Run one generation, mapping engine failures to `InferenceEngineError`.
    pub async fn generate(&self, request: ChatRequest) -> Result<String, ChatError> {
        let _turn = match &self.gate {
            Some(gate) => Some(gate.lock().await),
            None => None,
        };

        self.model
            .send_chat_request(request)
            .await
            .map_err(|e| ChatError::inference(self.model_id(), e))
    }
}

impl std::fmt::Debug for InferenceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceSession")
            .field("model_id", &self.config.model_id)
            .field("kind", &self.config.kind)
            .field("quant", &self.config.quant)
            .field("serialized", &self.gate.is_some())
            .field("loaded_at", &self.loaded_at)
            .finish()
    }
}
