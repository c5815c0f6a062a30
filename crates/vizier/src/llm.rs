//! LLM-backed mapping strategy: same [`MappingStrategy`] contract as the
//! heuristic cascade, but the decisions come from a chat-completions
//! endpoint. Configured entirely through environment variables so the CLI
//! stays flag-compatible whichever classifier is selected.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use vizier_core::classify::{MappingStrategy, normalize_name};
use vizier_core::error::{Error, Result};
use vizier_core::model::{Diagram, Mapping, MasterInfo};

const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4";
const DEFAULT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_MAX_RETRIES: u32 = 2;

pub struct LlmMapper {
    client: reqwest::blocking::Client,
    api_base: String,
    api_key: String,
    model: String,
    max_retries: u32,
}

impl LlmMapper {
    /// Build from the environment. `OPENAI_API_KEY` is required;
    /// `OPENAI_API_BASE`, `LLM_MODEL`, `OPENAI_TIMEOUT` (seconds) and
    /// `OPENAI_MAX_RETRIES` are optional.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| Error::Classifier {
            message: "OPENAI_API_KEY is not set".to_string(),
        })?;
        let api_base = std::env::var("OPENAI_API_BASE")
            .unwrap_or_else(|_| DEFAULT_API_BASE.to_string());
        let model = std::env::var("LLM_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let timeout = std::env::var("OPENAI_TIMEOUT")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        let max_retries = std::env::var("OPENAI_MAX_RETRIES")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(DEFAULT_MAX_RETRIES);

        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout))
            .build()
            .map_err(|e| Error::Classifier {
                message: format!("could not build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key,
            model,
            max_retries,
        })
    }

    /// Override the model picked up from the environment.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    fn complete(&self, prompt: &str) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            temperature: 0.3,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: prompt.to_string(),
                },
            ],
        };

        let url = format!("{}/chat/completions", self.api_base);
        let mut last_error = String::new();
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                std::thread::sleep(Duration::from_secs(1 << attempt));
                debug!(attempt, "retrying chat completion");
            }
            let response = self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send();
            match response {
                Ok(resp) if resp.status().is_success() => {
                    let parsed: ChatResponse = resp.json().map_err(|e| Error::Classifier {
                        message: format!("malformed completion response: {e}"),
                    })?;
                    let Some(choice) = parsed.choices.into_iter().next() else {
                        last_error = "completion had no choices".to_string();
                        continue;
                    };
                    return Ok(choice.message.content);
                }
                Ok(resp) => {
                    last_error = format!("endpoint returned {}", resp.status());
                }
                Err(e) => {
                    last_error = e.to_string();
                }
            }
        }
        Err(Error::Classifier {
            message: format!("chat completion failed after retries: {last_error}"),
        })
    }
}

impl MappingStrategy for LlmMapper {
    fn create_mapping(&self, diagram: &Diagram, targets: &[MasterInfo]) -> Result<Mapping> {
        let prompt = build_prompt(diagram, targets);
        let content = self.complete(&prompt)?;
        let parsed: MappingEnvelope =
            serde_json::from_str(extract_json(&content)).map_err(|e| Error::Classifier {
                message: format!("classifier returned unparseable JSON: {e}"),
            })?;

        let valid: Vec<String> = targets.iter().map(|m| normalize_name(&m.name)).collect();
        let mut mapping = Mapping::new();
        for entry in parsed.mappings {
            let norm = normalize_name(&entry.new_master_name);
            match valid.iter().position(|v| *v == norm) {
                Some(idx) => {
                    mapping.insert(entry.old_shape_id, targets[idx].name.clone());
                }
                None => {
                    warn!(
                        shape = %entry.old_shape_id,
                        master = %entry.new_master_name,
                        "classifier named an unknown master; dropping entry"
                    );
                }
            }
        }
        Ok(mapping)
    }
}

const SYSTEM_PROMPT: &str = "You map flowchart shapes from one Visio stencil to another. \
Respond with JSON only: {\"mappings\": [{\"old_shape_id\": \"...\", \
\"old_master_name\": \"...\", \"new_master_name\": \"...\", \"reason\": \"...\"}]}. \
new_master_name must be one of the provided target master names, verbatim.";

fn build_prompt(diagram: &Diagram, targets: &[MasterInfo]) -> String {
    let mut prompt = String::from("Target master names:\n");
    for m in targets {
        if m.description.is_empty() {
            prompt.push_str(&format!("- {} ({:.2} x {:.2} in)\n", m.name, m.width, m.height));
        } else {
            prompt.push_str(&format!(
                "- {} ({:.2} x {:.2} in): {}\n",
                m.name,
                m.width,
                m.height,
                truncate(&m.description, 100)
            ));
        }
    }
    prompt.push_str("\nShapes to map:\n");
    for page in &diagram.pages {
        for shape in &page.shapes {
            prompt.push_str(&format!(
                "- id={} master={} text={:?} size={:.2}x{:.2} at ({:.2},{:.2})\n",
                shape.id,
                shape.master_name.as_deref().unwrap_or("(none)"),
                truncate(&shape.text, 100),
                shape.size.width,
                shape.size.height,
                shape.position.x,
                shape.position.y,
            ));
        }
        for connector in &page.connectors {
            prompt.push_str(&format!(
                "- id={} master={} connector text={:?}\n",
                connector.id,
                connector.master_name.as_deref().unwrap_or("(none)"),
                truncate(&connector.text, 100),
            ));
        }
    }
    prompt
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((i, _)) => &text[..i],
        None => text,
    }
}

/// Models sometimes wrap the JSON in a code fence; take the outermost
/// object either way.
fn extract_json(content: &str) -> &str {
    let start = content.find('{');
    let end = content.rfind('}');
    match (start, end) {
        (Some(s), Some(e)) if e >= s => &content[s..=e],
        _ => content,
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage>,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

#[derive(Deserialize)]
struct MappingEnvelope {
    mappings: Vec<MappingEntry>,
}

#[derive(Deserialize)]
#[allow(dead_code)]
struct MappingEntry {
    old_shape_id: String,
    #[serde(default)]
    old_master_name: String,
    new_master_name: String,
    #[serde(default)]
    reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_is_unwrapped_from_fences() {
        let fenced = "```json\n{\"mappings\": []}\n```";
        assert_eq!(extract_json(fenced), "{\"mappings\": []}");
        assert_eq!(extract_json("{\"a\":1}"), "{\"a\":1}");
        assert_eq!(extract_json("no json here"), "no json here");
    }

    #[test]
    fn unknown_master_names_are_dropped() {
        let content = r#"{"mappings": [
            {"old_shape_id": "1", "old_master_name": "Rect", "new_master_name": "process", "reason": "box"},
            {"old_shape_id": "2", "old_master_name": "Blob", "new_master_name": "Nonsense", "reason": "?"}
        ]}"#;
        let parsed: MappingEnvelope = serde_json::from_str(extract_json(content)).unwrap();
        let targets = vec![MasterInfo {
            id: "1".into(),
            name: "Process".into(),
            description: String::new(),
            width: 1.0,
            height: 1.0,
        }];
        let valid: Vec<String> = targets.iter().map(|m| normalize_name(&m.name)).collect();
        let mut mapping = Mapping::new();
        for entry in parsed.mappings {
            if let Some(idx) = valid.iter().position(|v| *v == normalize_name(&entry.new_master_name)) {
                mapping.insert(entry.old_shape_id, targets[idx].name.clone());
            }
        }
        assert_eq!(mapping.len(), 1);
        assert_eq!(mapping["1"], "Process");
    }
}
