use std::sync::Arc;
use std::time::Duration;

use reqwest::blocking::Client;
use serde_json::{Value, json};
use tracing::debug;

use crate::error::AnalysisError;
use crate::sources::throttle::RateGate;

pub trait TextAnalysis: Send + Sync {
    fn backend_id(&self) -> &str;

    fn analyze(&self, prompt: &str, document: &str) -> Result<Value, AnalysisError>;
}

#[derive(Debug, Clone)]
pub struct RemoteBackendSettings {
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

pub struct RemoteLlmBackend {
    settings: RemoteBackendSettings,
    client: Client,
    gate: Arc<RateGate>,
    id: String,
}

impl RemoteLlmBackend {
    pub fn new(settings: RemoteBackendSettings, gate: Arc<RateGate>) -> Result<Self, AnalysisError> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .gzip(true)
            .build()
            .map_err(|err| AnalysisError::Unavailable(format!("failed to build http client: {err}")))?;
        let id = format!("remote:{}", settings.model);
        Ok(Self {
            settings,
            client,
            gate,
            id,
        })
    }

    fn transport_error(&self, err: reqwest::Error) -> AnalysisError {
        if err.is_timeout() {
            AnalysisError::Timeout(self.settings.timeout)
        } else {
            AnalysisError::Transport(err.to_string())
        }
    }
}

impl TextAnalysis for RemoteLlmBackend {
    fn backend_id(&self) -> &str {
        &self.id
    }

    fn analyze(&self, prompt: &str, document: &str) -> Result<Value, AnalysisError> {
        let body = json!({
            "model": self.settings.model,
            "temperature": 0,
            "response_format": {"type": "json_object"},
            "messages": [
                {"role": "system", "content": prompt},
                {"role": "user", "content": format!("RCA document content:\n\n{document}")},
            ],
        });

        self.gate.acquire();
        let mut request = self.client.post(&self.settings.endpoint).json(&body);
        if let Some(api_key) = &self.settings.api_key {
            request = request.bearer_auth(api_key);
        }
        let response = request.send().map_err(|err| self.transport_error(err))?;

        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(AnalysisError::Unavailable(format!(
                "backend rejected credentials (HTTP {status})"
            )));
        }
        if !status.is_success() {
            return Err(AnalysisError::Transport(format!("HTTP {status}")));
        }

        let payload: Value = response.json().map_err(|err| {
            if err.is_timeout() {
                AnalysisError::Timeout(self.settings.timeout)
            } else {
                AnalysisError::Malformed(format!("response body is not json: {err}"))
            }
        })?;
        let content = payload
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                AnalysisError::Malformed("missing choices[0].message.content".to_string())
            })?;
        debug!(backend = %self.id, chars = content.len(), "analysis response received");
        parse_json_response(content)
    }
}

pub fn parse_json_response(text: &str) -> Result<Value, AnalysisError> {
    let object = extract_json_object(text)
        .ok_or_else(|| AnalysisError::Malformed("no JSON object in response".to_string()))?;
    serde_json::from_str(object).map_err(|err| AnalysisError::Malformed(err.to_string()))
}

pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_object_from_fenced_prose() {
        let text = "Here is my review:\n```json\n{\"dimensions\": {\"a\": {\"feedback\": \"use {braces}\"}}}\n```\nThanks!";
        assert_eq!(
            extract_json_object(text),
            Some("{\"dimensions\": {\"a\": {\"feedback\": \"use {braces}\"}}}")
        );
    }

    #[test]
    fn escaped_quotes_do_not_end_strings() {
        let text = r#"{"feedback": "say \"}\" twice"} trailing"#;
        assert_eq!(extract_json_object(text), Some(r#"{"feedback": "say \"}\" twice"}"#));
    }

    #[test]
    fn unbalanced_or_missing_objects_are_malformed() {
        assert!(extract_json_object("no json here").is_none());
        assert!(extract_json_object("{\"open\": true").is_none());
        assert!(matches!(
            parse_json_response("{not json}"),
            Err(AnalysisError::Malformed(_))
        ));
    }
}
