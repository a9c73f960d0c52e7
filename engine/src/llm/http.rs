//! Blocking HTTP clients for hosted chat APIs

use super::{strip_fence, LlmSettings, Provider, ProviderError, RefineHint, Refiner, DEFAULT_SYSTEM_PROMPT};
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Refiner backed by the OpenAI chat completions or Anthropic messages API
pub struct HttpRefiner {
    client: Client,
    provider: Provider,
    model: String,
    endpoint: String,
    api_key: Option<String>,
    max_output_tokens: u32,
    temperature: f32,
    timeout: Duration,
}

impl HttpRefiner {
    /// Build a client; a missing API key makes the refiner unavailable, not an error
    pub fn new(settings: &LlmSettings) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(settings.timeout())
            .build()
            .map_err(|e| ProviderError::Transport(e.to_string()))?;
        let api_key = std::env::var(settings.api_key_env())
            .ok()
            .filter(|key| !key.trim().is_empty());
        if api_key.is_none() {
            log::debug!("{} not set; LLM refinement disabled", settings.api_key_env());
        }
        Ok(Self {
            client,
            provider: settings.provider,
            model: settings.model().to_owned(),
            endpoint: settings.endpoint().to_owned(),
            api_key,
            max_output_tokens: settings.max_output_tokens,
            temperature: settings.temperature,
            timeout: settings.timeout(),
        })
    }

    fn prompt(&self, text: &str, target_tokens: u64, hint: &RefineHint) -> String {
        format!(
            "Context:\n{}\nTarget size: at most {} tokens\n\nCode to summarize:\n```\n{}\n```",
            hint.context(),
            target_tokens,
            text
        )
    }

    fn max_tokens(&self, target_tokens: u64) -> u32 {
        u32::try_from(target_tokens).unwrap_or(u32::MAX).clamp(1, self.max_output_tokens.max(1))
    }

    fn send<B: Serialize, T: for<'de> Deserialize<'de>>(
        &self,
        api_key: &str,
        body: &B,
    ) -> Result<T, ProviderError> {
        let request = self.client.post(&self.endpoint).json(body);
        let request = match self.provider {
            Provider::OpenAi => request.bearer_auth(api_key),
            Provider::Anthropic => request
                .header("x-api-key", api_key)
                .header("anthropic-version", ANTHROPIC_VERSION),
        };

        let response = request.send().map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout(self.timeout)
            } else {
                ProviderError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(ProviderError::Http { status: status.as_u16(), body });
        }
        response.json::<T>().map_err(|e| ProviderError::MalformedResponse(e.to_string()))
    }
}

impl Refiner for HttpRefiner {
    fn provider(&self) -> &str {
        self.provider.name()
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    fn refine(
        &self,
        text: &str,
        target_tokens: u64,
        hint: &RefineHint,
    ) -> Result<String, ProviderError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(ProviderError::Unavailable(format!("no API key for {}", self.provider)));
        };
        let prompt = self.prompt(text, target_tokens, hint);
        let max_tokens = self.max_tokens(target_tokens);

        let reply = match self.provider {
            Provider::OpenAi => {
                let request = ChatRequest {
                    model: &self.model,
                    messages: vec![
                        ChatMessage { role: "system", content: DEFAULT_SYSTEM_PROMPT },
                        ChatMessage { role: "user", content: &prompt },
                    ],
                    max_tokens,
                    temperature: self.temperature,
                };
                let response: ChatResponse = self.send(api_key, &request)?;
                response
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|choice| choice.message.content)
                    .ok_or_else(|| ProviderError::MalformedResponse("no choices".to_owned()))?
            }
            Provider::Anthropic => {
                let request = MessagesRequest {
                    model: &self.model,
                    system: DEFAULT_SYSTEM_PROMPT,
                    messages: vec![ChatMessage { role: "user", content: &prompt }],
                    max_tokens,
                    temperature: self.temperature,
                };
                let response: MessagesResponse = self.send(api_key, &request)?;
                response
                    .content
                    .into_iter()
                    .find_map(|block| block.text)
                    .ok_or_else(|| ProviderError::MalformedResponse("no text block".to_owned()))?
            }
        };

        let reply = strip_fence(&reply);
        if reply.is_empty() {
            return Err(ProviderError::MalformedResponse("empty reply".to_owned()));
        }
        Ok(reply.to_owned())
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    system: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    text: Option<String>,
}

#[cfg(test)]
#[allow(clippy::str_to_string)]
mod tests {
    use super::*;
    use crate::types::LanguageTag;

    fn settings(key_env: &str) -> LlmSettings {
        LlmSettings { api_key_env: Some(key_env.to_owned()), ..Default::default() }
    }

    #[test]
    fn test_unavailable_without_key() {
        let refiner = HttpRefiner::new(&settings("CONTEXTFIT_TEST_UNSET_KEY")).unwrap();
        assert!(!refiner.is_available());
        let hint = RefineHint {
            path: "a.py".to_owned(),
            language: LanguageTag::Python,
            importance: 0.5,
            target_ratio: 0.3,
        };
        assert!(matches!(refiner.refine("x", 10, &hint), Err(ProviderError::Unavailable(_))));
    }

    #[test]
    fn test_configured_client_uses_request_timeout() {
        let settings = LlmSettings { timeout_secs: 7, ..settings("CONTEXTFIT_TEST_UNSET_KEY") };
        let refiner = crate::llm::cached_client(&settings).unwrap();
        assert_eq!(refiner.inner().timeout, Duration::from_secs(7));
        assert_eq!(refiner.provider(), refiner.inner().provider());
    }

    #[test]
    fn test_max_tokens_is_bounded() {
        let refiner = HttpRefiner::new(&settings("CONTEXTFIT_TEST_UNSET_KEY")).unwrap();
        assert_eq!(refiner.max_tokens(10), 10);
        assert_eq!(refiner.max_tokens(0), 1);
        assert_eq!(refiner.max_tokens(100_000), 500);
    }

    #[test]
    fn test_request_shapes() {
        let request = ChatRequest {
            model: "gpt-3.5-turbo",
            messages: vec![ChatMessage { role: "user", content: "hi" }],
            max_tokens: 5,
            temperature: 0.3,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["messages"][0]["role"], "user");

        let reply: MessagesResponse =
            serde_json::from_str(r#"{"content":[{"type":"text","text":"ok"}]}"#).unwrap();
        assert_eq!(reply.content[0].text.as_deref(), Some("ok"));
    }
}
