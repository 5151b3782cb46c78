use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A message in the conversation history sent to the chat-completion API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// The shape the model is instructed to emit for each form item. Used only
/// for a best-effort sanity check of the parsed reply; callers receive the
/// raw JSON untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormItem {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: FormItemKind,
    pub order: i64,
    pub origin: String,
    /// Question label as an HTML snippet.
    pub name: String,
    pub section: i64,
    pub required: bool,
    /// Option records whose shape depends on the item type.
    #[serde(default)]
    pub options: Vec<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormItemKind {
    ShortText,
    LongText,
    MultipleChoice,
    Checkbox,
    Dropdown,
    Date,
    Rating,
}
