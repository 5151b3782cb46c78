use std::time::Duration;

use anyhow::anyhow;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::error::AppError;
use crate::store::{CONVERSATION_TTL, ConversationStore, MAX_CONVERSATIONS};
use crate::types::{ChatMessage, FormItem};

const CHAT_COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";
const MODEL: &str = "gpt-4o-mini";
const CHAT_TIMEOUT: Duration = Duration::from_secs(60);

const SYSTEM_PROMPT: &str = r#"You are a form-builder assistant. The user describes changes to their form; you reply with the COMPLETE updated list of form items as one fenced code block labeled json.

Each item has exactly these fields:
- "id": a UUID v4 string, freshly generated for new items, preserved for existing ones
- "type": one of "short_text", "long_text", "multiple_choice", "checkbox", "dropdown", "date", "rating"
- "order": integer position in the form, starting at 0, consecutive
- "origin": always "client"
- "name": the question label as an HTML snippet, e.g. "<p>Your email</p>"
- "section": always 0
- "required": boolean
- "options": ordered array of option records, shape depending on "type":
  - "short_text", "long_text", "date": always []
  - "multiple_choice", "checkbox", "dropdown": one record per choice, {"id": UUID, "value": string, "order": integer}
  - "rating": exactly one record, {"id": UUID, "scale": integer between 2 and 10}

Rules:
1. Reply with exactly ONE fenced code block labeled json containing the full array. No other code blocks.
2. Never invent fields beyond the ones listed.
3. Keep items the user did not mention unchanged, including their ids.
4. Brief prose outside the block is fine; the block itself must be valid JSON."#;

/// Forwards prompts to the chat-completion API with the conversation's full
/// history and parses the form-definition JSON out of the reply.
pub struct FormBot {
    client: Client,
    api_key: String,
    endpoint: String,
    store: ConversationStore,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: String,
}

impl FormBot {
    pub fn new(api_key: String) -> anyhow::Result<Self> {
        Self::with_endpoint(api_key, CHAT_COMPLETIONS_URL)
    }

    /// Same bot, different chat-completions endpoint (proxies, tests).
    pub fn with_endpoint(api_key: String, endpoint: impl Into<String>) -> anyhow::Result<Self> {
        Ok(Self {
            client: Client::builder().timeout(CHAT_TIMEOUT).build()?,
            api_key,
            endpoint: endpoint.into(),
            store: ConversationStore::new(MAX_CONVERSATIONS, CONVERSATION_TTL),
        })
    }

    /// Run one prompt/response cycle for `conversation_id` and return the
    /// parsed form items.
    pub async fn handle(
        &self,
        conversation_id: &str,
        prompt: &str,
        current_state: Option<Value>,
    ) -> Result<Value, AppError> {
        let history = self
            .store
            .get_or_seed(conversation_id, || seed_history(current_state.as_ref()));
        let mut history = history.lock().await;

        history.push(ChatMessage::user(prompt));
        let raw = match self.complete(&history).await {
            Ok(raw) => raw,
            Err(err) => {
                // History only ever records completed exchanges.
                history.pop();
                return Err(err);
            }
        };
        history.push(ChatMessage::assistant(raw.clone()));
        drop(history);

        parse_form_items(&raw)
    }

    async fn complete(&self, history: &[ChatMessage]) -> Result<String, AppError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&json!({ "model": MODEL, "messages": history }))
            .send()
            .await
            .map_err(|err| AppError::Internal(anyhow!(err).context("chat API request failed")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ChatUpstream { status: status.as_u16(), body });
        }

        let parsed: ChatResponse = response.json().await.map_err(|err| {
            AppError::Internal(anyhow!(err).context("chat API returned an unreadable body"))
        })?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| AppError::Internal(anyhow!("no choices in chat API response")))?;
        debug!(chars = content.len(), "chat API replied");
        Ok(content)
    }
}

/// First two entries of every conversation: the fixed instructions and a
/// snapshot of the form state at creation time.
pub fn seed_history(current_state: Option<&Value>) -> Vec<ChatMessage> {
    let snapshot = current_state
        .map(|state| state.to_string())
        .unwrap_or_else(|| "[]".to_string());
    vec![
        ChatMessage::system(SYSTEM_PROMPT),
        ChatMessage::user(format!("Current form state:\n{snapshot}")),
    ]
}

/// Pull the first ```json fenced block out of `reply` and parse it. The two
/// failure modes are distinct: no block at all, or a block that is not JSON.
pub fn parse_form_items(reply: &str) -> Result<Value, AppError> {
    let block = extract_json_block(reply).ok_or(AppError::NoJsonBlock)?;
    let data: Value = serde_json::from_str(block).map_err(AppError::InvalidJson)?;
    // The model is instructed, not trusted: a shape mismatch is logged but
    // the raw JSON is still what the caller gets.
    if let Err(err) = serde_json::from_value::<Vec<FormItem>>(data.clone()) {
        warn!(error = %err, "model reply does not match the form item schema");
    }
    Ok(data)
}

fn extract_json_block(reply: &str) -> Option<&str> {
    let start = reply.find("```json")? + "```json".len();
    let rest = &reply[start..];
    let end = rest.find("```")?;
    Some(rest[..end].trim())
}
