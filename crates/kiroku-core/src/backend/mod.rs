pub mod cloud;
pub mod ollama;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::BackendError;
use crate::types::BackendAttempt;

/// A chat-completion backend consumed by the pipeline. Implementations wrap
/// one configured endpoint; fallback across backends lives in
/// [`invoke_chain`], not in implementations.
pub trait ChatBackend: Send {
    fn name(&self) -> &str;
    fn model(&self) -> &str;
    fn invoke(&self, system_prompt: &str, user_prompt: &str) -> Result<String, BackendError>;
}

impl std::fmt::Debug for dyn ChatBackend + '_ {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatBackend")
            .field("name", &self.name())
            .field("model", &self.model())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// An OpenAI-compatible `/chat/completions` endpoint.
    Openai,
    /// A locally hosted Ollama server.
    Ollama,
}

/// Deployment-time description of one backend; priority is the order these
/// appear in configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendSpec {
    pub name: String,
    pub kind: BackendKind,
    pub base_url: String,
    pub model: String,
    #[serde(default)]
    pub api_key: String,
}

pub fn create_backend(spec: &BackendSpec) -> Result<Box<dyn ChatBackend>, BackendError> {
    match spec.kind {
        BackendKind::Openai => Ok(Box::new(cloud::ChatCompletionsBackend::new(spec)?)),
        BackendKind::Ollama => Ok(Box::new(ollama::OllamaBackend::new(spec))),
    }
}

/// Try each backend in order, collecting every failure with its classified
/// reason. Returns the first successful raw response together with the
/// backend that produced it.
pub fn invoke_chain<'a>(
    backends: &[&'a dyn ChatBackend],
    system_prompt: &str,
    user_prompt: &str,
) -> Result<(String, &'a dyn ChatBackend), Vec<BackendAttempt>> {
    let mut attempts = Vec::new();
    for backend in backends {
        match backend.invoke(system_prompt, user_prompt) {
            Ok(raw) => return Ok((raw, *backend)),
            Err(err) => {
                warn!(
                    "backend {} failed ({}), falling through: {err}",
                    backend.name(),
                    err.kind()
                );
                attempts.push(BackendAttempt {
                    backend: backend.name().to_string(),
                    kind: err.kind(),
                    reason: err.to_string(),
                });
            }
        }
    }
    Err(attempts)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::ChatBackend;
    use crate::error::BackendError;

    /// Backend returning a canned result on every call.
    pub struct CannedBackend {
        pub name: String,
        pub model: String,
        pub response: Result<String, &'static str>,
    }

    impl CannedBackend {
        pub fn ok(name: &str, response: &str) -> Self {
            Self {
                name: name.to_string(),
                model: format!("{name}-model"),
                response: Ok(response.to_string()),
            }
        }

        pub fn failing(name: &str, reason: &'static str) -> Self {
            Self {
                name: name.to_string(),
                model: format!("{name}-model"),
                response: Err(reason),
            }
        }
    }

    impl ChatBackend for CannedBackend {
        fn name(&self) -> &str {
            &self.name
        }

        fn model(&self) -> &str {
            &self.model
        }

        fn invoke(&self, _system: &str, _user: &str) -> Result<String, BackendError> {
            match &self.response {
                Ok(raw) => Ok(raw.clone()),
                Err(reason) => Err(BackendError::Unavailable((*reason).to_string())),
            }
        }
    }
}
