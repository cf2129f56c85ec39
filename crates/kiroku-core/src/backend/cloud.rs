use serde::Deserialize;
use serde_json::json;

use super::{BackendSpec, ChatBackend};
use crate::error::BackendError;
use crate::http::{classify, default_agent};

/// Cloud backend speaking the OpenAI-compatible `/chat/completions` shape.
/// Covers any provider that differs only in base URL, model name and key.
#[derive(Debug)]
pub struct ChatCompletionsBackend {
    name: String,
    base_url: String,
    model: String,
    api_key: String,
    agent: ureq::Agent,
}

impl ChatCompletionsBackend {
    pub fn new(spec: &BackendSpec) -> Result<Self, BackendError> {
        let api_key = spec.api_key.trim();
        if api_key.is_empty() {
            return Err(BackendError::Auth(format!(
                "api key not set for backend {}",
                spec.name
            )));
        }
        Ok(Self {
            name: spec.name.clone(),
            base_url: spec.base_url.trim_end_matches('/').to_string(),
            model: spec.model.clone(),
            api_key: api_key.to_string(),
            agent: default_agent(),
        })
    }

    fn build_request_body(&self, system_prompt: &str, user_prompt: &str) -> serde_json::Value {
        json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": user_prompt},
            ],
            "temperature": 0.1,
            "max_tokens": 1000,
            "stream": false,
        })
    }

    fn parse_response(body: &str) -> Result<String, BackendError> {
        let response: ChatResponse =
            serde_json::from_str(body).map_err(|e| BackendError::InvalidResponse(e.to_string()))?;
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| BackendError::InvalidResponse("no choices in response".into()))?;
        Ok(choice.message.content)
    }
}

impl ChatBackend for ChatCompletionsBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn invoke(&self, system_prompt: &str, user_prompt: &str) -> Result<String, BackendError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_request_body(system_prompt, user_prompt);

        let response = self
            .agent
            .post(&url)
            .header("Authorization", &format!("Bearer {}", self.api_key))
            .send_json(body)
            .map_err(classify)?;

        let raw = response
            .into_body()
            .read_to_string()
            .map_err(|e| BackendError::Unavailable(format!("{e}")))?;

        Ok(Self::parse_response(raw.trim())?.trim().to_string())
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendKind;

    fn spec() -> BackendSpec {
        BackendSpec {
            name: "doubao".to_string(),
            kind: BackendKind::Openai,
            base_url: "https://example.com/api/v3/".to_string(),
            model: "test-model".to_string(),
            api_key: "key".to_string(),
        }
    }

    #[test]
    fn new_rejects_missing_api_key() {
        let mut spec = spec();
        spec.api_key = "  ".to_string();
        let err = ChatCompletionsBackend::new(&spec).unwrap_err();
        assert_eq!(err.kind(), "auth");
    }

    #[test]
    fn new_trims_trailing_slash_from_base_url() {
        let backend = ChatCompletionsBackend::new(&spec()).unwrap();
        assert_eq!(backend.base_url, "https://example.com/api/v3");
    }

    #[test]
    fn build_request_body_carries_prompts_and_settings() {
        let backend = ChatCompletionsBackend::new(&spec()).unwrap();
        let body = backend.build_request_body("sys", "usr");
        assert_eq!(body["model"], "test-model");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], "sys");
        assert_eq!(body["messages"][1]["content"], "usr");
        assert_eq!(body["temperature"], 0.1);
        assert_eq!(body["max_tokens"], 1000);
    }

    #[test]
    fn parse_response_extracts_first_choice() {
        let body = r#"{"choices":[{"message":{"content":"[]"}}]}"#;
        assert_eq!(ChatCompletionsBackend::parse_response(body).unwrap(), "[]");
    }

    #[test]
    fn parse_response_rejects_empty_choices() {
        let err = ChatCompletionsBackend::parse_response(r#"{"choices":[]}"#).unwrap_err();
        assert_eq!(err.kind(), "invalid_response");
    }
}
