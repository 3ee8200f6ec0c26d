// src/services/telegram.rs

//! Minimal Telegram Bot API client: `sendMessage` and `getUpdates`.

use std::time::Duration;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::error::NotifyError;
use crate::models::TelegramConfig;

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    error_code: Option<u16>,
}

/// An incoming update; only text messages are of interest.
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

/// Telegram Bot API client bound to one bot token.
#[derive(Clone)]
pub struct TelegramClient {
    client: reqwest::Client,
    api_base: String,
    token: String,
}

impl TelegramClient {
    pub fn new(client: reqwest::Client, config: &TelegramConfig) -> Self {
        Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            token: config.bot_token.trim().to_string(),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }

    /// Send a Markdown message to `chat_id`.
    pub async fn send_message(&self, chat_id: &str, text: &str) -> Result<(), NotifyError> {
        let body = json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "Markdown",
        });
        let response = self
            .client
            .post(self.method_url("sendMessage"))
            .json(&body)
            .send()
            .await?;
        Self::unwrap_response::<serde_json::Value>(response).await?;
        Ok(())
    }

    /// Long-poll for updates after `offset`, waiting up to `poll_timeout`.
    pub async fn get_updates(
        &self,
        offset: Option<i64>,
        poll_timeout: Duration,
    ) -> Result<Vec<Update>, NotifyError> {
        let mut body = json!({
            "timeout": poll_timeout.as_secs(),
            "allowed_updates": ["message"],
        });
        if let Some(offset) = offset {
            body["offset"] = json!(offset);
        }
        let response = self
            .client
            .post(self.method_url("getUpdates"))
            .timeout(poll_timeout + Duration::from_secs(10))
            .json(&body)
            .send()
            .await?;
        Ok(Self::unwrap_response::<Vec<Update>>(response)
            .await?
            .unwrap_or_default())
    }

    async fn unwrap_response<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<Option<T>, NotifyError> {
        let status = response.status().as_u16();
        let body = response.bytes().await?;
        decode(status, &body)
    }
}

/// Decode a Bot API envelope; `ok:false` becomes `NotifyError::Rejected`.
fn decode<T: DeserializeOwned>(status: u16, body: &[u8]) -> Result<Option<T>, NotifyError> {
    let parsed: ApiResponse<T> = serde_json::from_slice(body)?;
    if parsed.ok {
        Ok(parsed.result)
    } else {
        Err(NotifyError::Rejected {
            status: parsed.error_code.unwrap_or(status),
            description: parsed
                .description
                .unwrap_or_else(|| "no description".to_string()),
        })
    }
}

/// Escape characters that legacy Telegram Markdown treats as markup.
pub fn escape_markdown(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '_' | '*' | '`' | '[') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_url_strips_trailing_slash() {
        let config = TelegramConfig {
            bot_token: " 123:abc ".into(),
            api_base: "https://api.telegram.org/".into(),
            ..TelegramConfig::default()
        };
        let client = TelegramClient::new(reqwest::Client::new(), &config);
        assert_eq!(
            client.method_url("sendMessage"),
            "https://api.telegram.org/bot123:abc/sendMessage"
        );
    }

    #[test]
    fn updates_deserialize_with_optional_message() {
        let raw = r#"{"ok":true,"result":[
            {"update_id":10,"message":{"message_id":1,"chat":{"id":42,"type":"private"},"text":"/list 3"}},
            {"update_id":11,"edited_message":{}}
        ]}"#;
        let updates = decode::<Vec<Update>>(200, raw.as_bytes()).unwrap().unwrap();
        assert_eq!(updates.len(), 2);
        let message = updates[0].message.as_ref().unwrap();
        assert_eq!(message.chat.id, 42);
        assert_eq!(message.text.as_deref(), Some("/list 3"));
        assert!(updates[1].message.is_none());
    }

    #[test]
    fn error_response_without_result_is_rejected() {
        let raw = r#"{"ok":false,"error_code":401,"description":"Unauthorized"}"#;
        match decode::<Vec<Update>>(200, raw.as_bytes()) {
            Err(NotifyError::Rejected {
                status,
                description,
            }) => {
                assert_eq!(status, 401);
                assert_eq!(description, "Unauthorized");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn ok_response_without_result_is_none() {
        let parsed = decode::<serde_json::Value>(200, br#"{"ok":true}"#).unwrap();
        assert!(parsed.is_none());
    }

    #[test]
    fn malformed_body_is_a_decode_error() {
        let err = decode::<serde_json::Value>(502, b"<html>Bad Gateway</html>").unwrap_err();
        assert!(matches!(err, NotifyError::Decode(_)));
    }

    #[test]
    fn test_escape_markdown() {
        assert_eq!(escape_markdown("a_b*c[d]`e"), "a\\_b\\*c\\[d]\\`e");
    }
}
