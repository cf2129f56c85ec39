use serde::Deserialize;
use serde_json::json;

use super::{BackendSpec, ChatBackend};
use crate::error::BackendError;
use crate::http::{classify, default_agent};

/// Locally hosted Ollama backend via `/api/chat`, non-streaming.
pub struct OllamaBackend {
    name: String,
    base_url: String,
    model: String,
    agent: ureq::Agent,
}

impl OllamaBackend {
    pub fn new(spec: &BackendSpec) -> Self {
        Self {
            name: spec.name.clone(),
            base_url: spec.base_url.trim_end_matches('/').to_string(),
            model: spec.model.clone(),
            agent: default_agent(),
        }
    }

    fn parse_response(body: &str) -> Result<String, BackendError> {
        let response: OllamaResponse =
            serde_json::from_str(body).map_err(|e| BackendError::InvalidResponse(e.to_string()))?;
        response
            .message
            .map(|message| message.content)
            .ok_or_else(|| BackendError::InvalidResponse("no message in response".into()))
    }
}

impl ChatBackend for OllamaBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn invoke(&self, system_prompt: &str, user_prompt: &str) -> Result<String, BackendError> {
        let url = format!("{}/api/chat", self.base_url);
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": user_prompt},
            ],
            "stream": false,
            "options": {
                "temperature": 0.1,
                "num_predict": 1000,
            },
        });

        let response = self.agent.post(&url).send_json(body).map_err(classify)?;

        let raw = response
            .into_body()
            .read_to_string()
            .map_err(|e| BackendError::Unavailable(format!("{e}")))?;

        Ok(Self::parse_response(raw.trim())?.trim().to_string())
    }
}

#[derive(Deserialize)]
struct OllamaResponse {
    message: Option<OllamaMessage>,
}

#[derive(Deserialize)]
struct OllamaMessage {
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_response_extracts_message_content() {
        let body = r#"{"model":"llama3.2","message":{"role":"assistant","content":"[]"},"done":true}"#;
        assert_eq!(OllamaBackend::parse_response(body).unwrap(), "[]");
    }

    #[test]
    fn parse_response_rejects_missing_message() {
        let err = OllamaBackend::parse_response(r#"{"done":true}"#).unwrap_err();
        assert_eq!(err.kind(), "invalid_response");
    }
}
