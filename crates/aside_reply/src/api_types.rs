//! Wire types for the Anthropic Messages API (the subset we use).

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct MessagesRequest {
    pub model: String,
    pub system: String,
    pub messages: Vec<Message>,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Debug, Serialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct MessagesResponse {
    pub content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: String,
}

impl MessagesResponse {
    /// Concatenate the text blocks of the response.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter(|b| b.kind == "text")
            .map(|b| b.text.as_str())
            .collect::<Vec<_>>()
            .join("")
            .trim()
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_text_joins_text_blocks_only() {
        let json = r#"{
            "content": [
                {"type": "text", "text": "Hello "},
                {"type": "tool_use", "id": "t1", "name": "x", "input": {}},
                {"type": "text", "text": "there."}
            ]
        }"#;
        let resp: MessagesResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.text(), "Hello there.");
    }

    #[test]
    fn request_serializes_expected_shape() {
        let req = MessagesRequest {
            model: "claude-3-5-sonnet-20240620".into(),
            system: "be brief".into(),
            messages: vec![Message::user("hi")],
            max_tokens: 64,
            temperature: 0.7,
        };
        let v: serde_json::Value = serde_json::to_value(&req).unwrap();
        assert_eq!(v["messages"][0]["role"], "user");
        assert_eq!(v["max_tokens"], 64);
    }
}
