//! Reasoning engine abstraction and the chat-completions implementation.
//!
//! The engine receives a question, the assembled context window, and a
//! manifest of known file paths, and must answer with a JSON object:
//!
//! ```json
//! {
//!   "answer": "…",
//!   "references": [{ "file": "src/a.js", "startLine": 10, "endLine": 25,
//!                    "snippet": "…", "explanation": "…" }],
//!   "tags": ["auth"],
//!   "refactorSuggestion": null
//! }
//! ```
//!
//! [`parse_answer`] validates the reply into an [`EngineAnswer`]. When the
//! object is wrapped in prose, the first balanced `{…}` block is tried
//! before giving up with [`Error::MalformedResponse`].
//!
//! # Status mapping
//!
//! | Upstream | Error |
//! |----------|-------|
//! | 401 | [`Error::EngineAuth`] |
//! | 429 | [`Error::EngineRateLimited`] |
//! | message mentions "request too large" / "tokens per minute" | [`Error::ContextTooLarge`] |
//! | other non-2xx | [`Error::Engine`] |
//!
//! No retries are attempted.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::models::Reference;
use crate::store::{SettingsStore, API_KEY_SETTING};

/// One question about the corpus.
#[derive(Debug, Clone)]
pub struct EngineRequest<'a> {
    pub question: &'a str,
    /// Output of [`build_context`](crate::context::build_context).
    pub context: &'a str,
    /// Paths the engine may cite.
    pub manifest: &'a [String],
}

/// A validated engine reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineAnswer {
    pub answer: String,
    #[serde(default)]
    pub references: Vec<Reference>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub refactor_suggestion: Option<String>,
}

/// A backend that can answer questions about a context window.
#[async_trait]
pub trait ReasoningEngine: Send + Sync {
    /// Model identifier, for logs.
    fn model_name(&self) -> &str;

    async fn ask(&self, request: &EngineRequest<'_>) -> Result<EngineAnswer>;
}

/// Build the system prompt: answer contract, rules, manifest, and context.
pub fn system_prompt(request: &EngineRequest<'_>) -> String {
    format!(
        r#"You are an expert code analysis assistant. You are given a codebase and must answer questions about it with precision and proof.

ALWAYS respond in this exact JSON format:
{{
  "answer": "Clear explanation of the answer",
  "references": [
    {{
      "file": "exact/file/path.js",
      "startLine": 10,
      "endLine": 25,
      "snippet": "the actual code snippet from those lines",
      "explanation": "why this file/section is relevant"
    }}
  ],
  "tags": ["auth", "middleware"],
  "refactorSuggestion": "optional: one concrete refactor suggestion if relevant, else null"
}}

Rules:
- File paths must exactly match files in the codebase
- Line numbers must be realistic based on the file content shown
- Snippets must be actual code from the files, not made up
- Include 1-5 references, prioritize the most relevant
- Tags should be 1-4 short descriptive keywords
- If you cannot find relevant code, say so clearly in the answer and return empty references array
- refactorSuggestion should be a concrete, actionable suggestion or null

The codebase files available are:
{}

Codebase content:
{}"#,
        request.manifest.join("\n"),
        request.context
    )
}

/// Validate raw engine text into an [`EngineAnswer`].
pub fn parse_answer(content: &str) -> Result<EngineAnswer> {
    let direct_err = match serde_json::from_str::<EngineAnswer>(content) {
        Ok(answer) => return Ok(answer),
        Err(e) => e,
    };

    if let Some(block) = first_json_object(content) {
        if block.len() != content.trim().len() {
            if let Ok(answer) = serde_json::from_str::<EngineAnswer>(block) {
                return Ok(answer);
            }
        }
    }

    Err(Error::MalformedResponse {
        message: direct_err.to_string(),
    })
}

/// First balanced `{…}` substring, ignoring braces inside string literals.
fn first_json_object(text: &str) -> Option<&str> {
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

// ============ Chat completions engine ============

/// Engine backed by an OpenAI-compatible `/chat/completions` endpoint
/// (Groq by default).
pub struct ChatCompletionsEngine {
    config: EngineConfig,
    api_key: String,
    client: reqwest::Client,
}

impl ChatCompletionsEngine {
    pub fn new(config: EngineConfig, api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(Error::MissingApiKey {
                env_var: config.api_key_env.clone(),
            });
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            config,
            api_key,
            client,
        })
    }
}

/// The engine credential: the stored setting, else the `api_key_env`
/// environment variable.
pub async fn api_key(config: &EngineConfig, settings: &dyn SettingsStore) -> Result<String> {
    if let Some(key) = settings.get(API_KEY_SETTING).await? {
        if !key.trim().is_empty() {
            return Ok(key);
        }
    }
    std::env::var(&config.api_key_env)
        .ok()
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| Error::MissingApiKey {
            env_var: config.api_key_env.clone(),
        })
}

/// Build the default engine with the configured credential.
pub async fn from_settings(
    config: &EngineConfig,
    settings: &dyn SettingsStore,
) -> Result<ChatCompletionsEngine> {
    let key = api_key(config, settings).await?;
    ChatCompletionsEngine::new(config.clone(), key)
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: Option<ChatMessage>,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[async_trait]
impl ReasoningEngine for ChatCompletionsEngine {
    fn model_name(&self) -> &str {
        &self.config.model
    }

    async fn ask(&self, request: &EngineRequest<'_>) -> Result<EngineAnswer> {
        let body = serde_json::json!({
            "model": self.config.model,
            "messages": [
                { "role": "system", "content": system_prompt(request) },
                { "role": "user", "content": format!("Question: {}", request.question) },
            ],
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
            "response_format": { "type": "json_object" },
        });

        let response = self
            .client
            .post(&self.config.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(classify_failure(status.as_u16(), &body_text));
        }

        let chat: ChatResponse = response.json().await.map_err(|e| Error::MalformedResponse {
            message: e.to_string(),
        })?;
        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(Error::EmptyResponse)?;

        parse_answer(&content)
    }
}

/// Map a non-2xx engine response to the error taxonomy.
fn classify_failure(status: u16, body: &str) -> Error {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| format!("Engine API error: {}", status));

    match status {
        401 => Error::EngineAuth,
        429 => Error::EngineRateLimited,
        _ => {
            let lower = message.to_lowercase();
            if lower.contains("request too large") || lower.contains("tokens per minute") {
                Error::ContextTooLarge
            } else {
                Error::Engine { message }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_clean_json() {
        let answer = parse_answer(
            r#"{"answer":"It uses JWT.","references":[{"file":"a.js","startLine":3,"endLine":5}],"tags":["auth"],"refactorSuggestion":null}"#,
        )
        .unwrap();
        assert_eq!(answer.answer, "It uses JWT.");
        assert_eq!(answer.references[0].start_line, Some(3));
        assert_eq!(answer.tags, vec!["auth"]);
        assert_eq!(answer.refactor_suggestion, None);
    }

    #[test]
    fn test_parse_coerces_whole_number_lines() {
        let answer = parse_answer(
            r#"{"answer":"a","references":[
                {"file":"a.js","startLine":3.0,"endLine":"5"},
                {"file":"b.js","startLine":" 7 ","endLine":"7.0"}
            ]}"#,
        )
        .unwrap();
        let lines: Vec<(Option<i64>, Option<i64>)> = answer
            .references
            .iter()
            .map(|r| (r.start_line, r.end_line))
            .collect();
        assert_eq!(lines, vec![(Some(3), Some(5)), (Some(7), Some(7))]);
    }

    #[test]
    fn test_parse_drops_unusable_lines_but_keeps_answer() {
        let answer = parse_answer(
            r#"{"answer":"a","references":[
                {"file":"a.js","startLine":2.5,"endLine":"ten"},
                {"file":"b.js","startLine":null,"endLine":[1]}
            ]}"#,
        )
        .unwrap();
        assert_eq!(answer.answer, "a");
        for reference in &answer.references {
            assert_eq!((reference.start_line, reference.end_line), (None, None));
        }
    }

    #[test]
    fn test_parse_defaults_missing_collections() {
        let answer = parse_answer(r#"{"answer":"Nothing relevant."}"#).unwrap();
        assert!(answer.references.is_empty());
        assert!(answer.tags.is_empty());
    }

    #[test]
    fn test_parse_embedded_in_prose() {
        let answer = parse_answer(
            "Sure! Here you go:\n{\"answer\":\"uses {braces} \\\"quoted\\\"\",\"tags\":[]}\nHope that helps {really}.",
        )
        .unwrap();
        assert_eq!(answer.answer, "uses {braces} \"quoted\"");
    }

    #[test]
    fn test_parse_rejects_wrong_shape() {
        let err = parse_answer(r#"{"answer": 42}"#).unwrap_err();
        assert!(matches!(err, Error::MalformedResponse { .. }));
        let err = parse_answer("no json here").unwrap_err();
        assert!(matches!(err, Error::MalformedResponse { .. }));
        let err = parse_answer("{ unbalanced").unwrap_err();
        assert!(matches!(err, Error::MalformedResponse { .. }));
    }

    #[test]
    fn test_first_json_object() {
        assert_eq!(first_json_object("x {a{b}c} {d}"), Some("{a{b}c}"));
        assert_eq!(first_json_object(r#"{"k":"}"}"#), Some(r#"{"k":"}"}"#));
        assert_eq!(first_json_object("none"), None);
    }

    #[test]
    fn test_classify_failure() {
        assert!(matches!(classify_failure(401, ""), Error::EngineAuth));
        assert!(matches!(classify_failure(429, ""), Error::EngineRateLimited));
        assert!(matches!(
            classify_failure(413, r#"{"error":{"message":"Request too large for model"}}"#),
            Error::ContextTooLarge
        ));
        match classify_failure(500, r#"{"error":{"message":"boom"}}"#) {
            Error::Engine { message } => assert_eq!(message, "boom"),
            other => panic!("unexpected {:?}", other),
        }
        match classify_failure(502, "<html>") {
            Error::Engine { message } => assert_eq!(message, "Engine API error: 502"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_system_prompt_lists_manifest_and_context() {
        let manifest = vec!["a.py".to_string(), "b/c.py".to_string()];
        let prompt = system_prompt(&EngineRequest {
            question: "q",
            context: "### FILE: a.py",
            manifest: &manifest,
        });
        assert!(prompt.contains("a.py\nb/c.py"));
        assert!(prompt.ends_with("### FILE: a.py"));
        assert!(prompt.contains("\"refactorSuggestion\""));
    }

    #[tokio::test]
    async fn test_api_key_prefers_stored_setting() {
        let settings = crate::store::InMemorySettings::new();
        let config = EngineConfig {
            api_key_env: "CPROOF_TEST_UNSET_KEY_VAR".to_string(),
            ..EngineConfig::default()
        };
        let err = api_key(&config, &settings).await.unwrap_err();
        assert!(matches!(err, Error::MissingApiKey { ref env_var } if env_var == "CPROOF_TEST_UNSET_KEY_VAR"));

        settings.set(API_KEY_SETTING, "gsk_stored").await.unwrap();
        assert_eq!(api_key(&config, &settings).await.unwrap(), "gsk_stored");
    }

    #[test]
    fn test_missing_key_rejected() {
        let err = ChatCompletionsEngine::new(EngineConfig::default(), "  ").err().unwrap();
        assert!(matches!(err, Error::MissingApiKey { .. }));
    }
}
