//! OpenAI-compatible chat-completions evaluator

use std::time::Duration;

use async_trait::async_trait;
use peerrank_core::{ConfigError, CriterionScores, EvaluatorError, Rubric, RubricEvaluator};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::EvaluatorConfig;
use crate::error::{classify_status, transport_error};

/// Review text beyond this many characters is not sent to the model.
pub const MAX_REVIEW_CHARS: usize = 3000;

/// User message for one review.
pub fn user_prompt(review_text: &str) -> String {
    let text: String = review_text.chars().take(MAX_REVIEW_CHARS).collect();
    format!("Review to Evaluate:\n{text}\n\nEvaluate this review using the rubric.")
}

/// Request body for one evaluation.
pub fn build_request_body(config: &EvaluatorConfig, review_text: &str, rubric: &Rubric) -> Value {
    json!({
        "model": config.model,
        "temperature": config.temperature,
        "response_format": {"type": "json_object"},
        "messages": [
            {"role": "system", "content": rubric.render_prompt()},
            {"role": "user", "content": user_prompt(review_text)},
        ],
    })
}

/// Extract criterion scores from the model's message content.
///
/// Accepts a bare JSON object or one wrapped in a markdown code fence.
/// Numeric strings are accepted; other keys such as `justification` are
/// dropped. Missing criteria are left for [`Rubric::assess`] to reject.
pub fn parse_reply(content: &str, rubric: &Rubric) -> Result<CriterionScores, EvaluatorError> {
    let body = strip_fence(content.trim());
    let value: Value = serde_json::from_str(body)
        .map_err(|e| EvaluatorError::Malformed(format!("reply is not JSON: {e}")))?;
    let Value::Object(map) = value else {
        return Err(EvaluatorError::Malformed(
            "reply is not a JSON object".to_string(),
        ));
    };

    let mut scores = CriterionScores::new();
    for name in rubric.criterion_names() {
        let Some(raw) = map.get(name) else { continue };
        let score = match raw {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        match score {
            Some(v) => {
                scores.insert(name.to_string(), v);
            }
            None => {
                return Err(EvaluatorError::Malformed(format!(
                    "criterion '{name}' is not a number: {raw}"
                )))
            }
        }
    }
    Ok(scores)
}

fn strip_fence(s: &str) -> &str {
    let Some(rest) = s.strip_prefix("```") else {
        return s;
    };
    // Drop the optional language tag on the opening line.
    let rest = match rest.find('\n') {
        Some(i) => &rest[i + 1..],
        None => rest,
    };
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Deserialize)]
struct Message {
    #[serde(default)]
    content: Option<String>,
}

/// Rubric evaluator backed by a chat-completions endpoint
pub struct OpenAiEvaluator {
    config: EvaluatorConfig,
    http_client: reqwest::Client,
}

impl OpenAiEvaluator {
    /// Validate the config and build the HTTP client.
    pub fn new(config: EvaluatorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("peerrank-evaluator/", env!("CARGO_PKG_VERSION")))
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ConfigError::InvalidEndpoint(format!("http client: {e}")))?;

        Ok(OpenAiEvaluator {
            config,
            http_client,
        })
    }

    pub fn config(&self) -> &EvaluatorConfig {
        &self.config
    }
}

fn retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[async_trait]
impl RubricEvaluator for OpenAiEvaluator {
    fn name(&self) -> &str {
        &self.config.model
    }

    async fn evaluate(
        &self,
        review_text: &str,
        rubric: &Rubric,
    ) -> Result<CriterionScores, EvaluatorError> {
        let url = self.config.completions_url();
        let body = build_request_body(&self.config, review_text, rubric);
        debug!(model = %self.config.model, %url, "requesting rubric evaluation");

        let mut request = self.http_client.post(&url).json(&body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| transport_error(&e, self.config.request_timeout))?;

        let status = response.status();
        if !status.is_success() {
            let wait = retry_after(response.headers());
            let text = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "evaluator returned an error status");
            return Err(classify_status(status.as_u16(), &text, wait));
        }

        let reply: ChatResponse = response
            .json()
            .await
            .map_err(|e| EvaluatorError::Malformed(format!("unexpected response shape: {e}")))?;
        let content = reply
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| EvaluatorError::Malformed("reply has no content".to_string()))?;

        parse_reply(&content, rubric)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rubric() -> Rubric {
        Rubric::uniform(&["depth", "clarity"], 0.0, 5.0)
    }

    #[test]
    fn test_parse_plain_object() {
        let scores = parse_reply(
            r#"{"depth": 4, "clarity": 3.5, "justification": "ok"}"#,
            &rubric(),
        )
        .unwrap();
        assert_eq!(scores.len(), 2);
        assert_eq!(scores["depth"], 4.0);
        assert_eq!(scores["clarity"], 3.5);
    }

    #[test]
    fn test_parse_fenced_object_with_string_numbers() {
        let content = "```json\n{\"depth\": \"4\", \"clarity\": 2}\n```";
        let scores = parse_reply(content, &rubric()).unwrap();
        assert_eq!(scores["depth"], 4.0);
        assert_eq!(scores["clarity"], 2.0);
    }

    #[test]
    fn test_missing_criterion_is_left_to_the_rubric() {
        let scores = parse_reply(r#"{"depth": 4}"#, &rubric()).unwrap();
        assert!(!scores.contains_key("clarity"));
    }

    #[test]
    fn test_malformed_replies() {
        assert!(matches!(
            parse_reply("I think this review is good", &rubric()),
            Err(EvaluatorError::Malformed(_))
        ));
        assert!(matches!(
            parse_reply("[1, 2]", &rubric()),
            Err(EvaluatorError::Malformed(_))
        ));
        assert!(matches!(
            parse_reply(r#"{"depth": "high", "clarity": 2}"#, &rubric()),
            Err(EvaluatorError::Malformed(_))
        ));
    }

    #[test]
    fn test_user_prompt_truncates_review() {
        let long = "z".repeat(MAX_REVIEW_CHARS + 500);
        let prompt = user_prompt(&long);
        assert_eq!(prompt.matches('z').count(), MAX_REVIEW_CHARS);
        assert!(prompt.starts_with("Review to Evaluate:\n"));
    }

    #[test]
    fn test_request_body_carries_rubric_and_model() {
        let config = EvaluatorConfig::new("http://localhost/v1", "test-model").without_auth();
        let body = build_request_body(&config, "short review", &rubric());
        assert_eq!(body["model"], "test-model");
        assert_eq!(body["response_format"]["type"], "json_object");
        let system = body["messages"][0]["content"].as_str().unwrap();
        assert!(system.contains("\"depth\""));
        let user = body["messages"][1]["content"].as_str().unwrap();
        assert!(user.contains("short review"));
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = EvaluatorConfig::new("https://api.example.com/v1", "m");
        assert!(OpenAiEvaluator::new(config).is_err());
    }
}
