//! Telegram Bot API client.

use std::time::Duration;

use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument};

use super::error::TelegramError;
use crate::config::TelegramConfig;

/// Telegram rejects messages longer than this.
const MAX_MESSAGE_CHARS: usize = 4096;

/// Bot API client for posting messages.
#[derive(Clone)]
pub struct TelegramClient {
    client: Client,
    bot_token: SecretString,
    api_base: String,
}

impl std::fmt::Debug for TelegramClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramClient")
            .field("bot_token", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
    disable_web_page_preview: bool,
}

#[derive(Deserialize)]
struct BotResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

impl TelegramClient {
    /// Create a new Telegram client.
    #[must_use]
    pub fn new(config: &TelegramConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            client,
            bot_token: config.bot_token.clone(),
            api_base: config.api_base.trim_end_matches('/').to_owned(),
        }
    }

    /// Post an HTML-formatted message to a chat.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the Bot API answers `ok: false`.
    #[instrument(skip(self, html), fields(chat_id = %chat_id))]
    pub async fn send_message(&self, chat_id: &str, html: &str) -> Result<(), TelegramError> {
        let text = truncate_chars(html, MAX_MESSAGE_CHARS);
        let body = SendMessage {
            chat_id,
            text,
            parse_mode: "HTML",
            disable_web_page_preview: true,
        };

        let response = self
            .client
            .post(format!(
                "{}/bot{}/sendMessage",
                self.api_base,
                self.bot_token.expose_secret()
            ))
            .json(&body)
            .send()
            .await
            // reqwest errors include the URL, which carries the token.
            .map_err(|e| TelegramError::Request(e.without_url().to_string()))?;

        let result: BotResponse = response
            .json()
            .await
            .map_err(|e| TelegramError::Response(e.without_url().to_string()))?;

        if !result.ok {
            error!(error = ?result.description, "Telegram API error sending message");
            return Err(TelegramError::Api(
                result
                    .description
                    .unwrap_or_else(|| "Unknown error".to_string()),
            ));
        }

        debug!("Message posted to Telegram");
        Ok(())
    }
}

/// Escape text for Telegram's HTML parse mode.
#[must_use]
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((index, _)) => text.get(..index).unwrap_or(text),
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<b>Tom & "Jerry"</b>"#),
            "&lt;b&gt;Tom &amp; &quot;Jerry&quot;&lt;/b&gt;"
        );
        assert_eq!(escape_html("Año ñandú"), "Año ñandú");
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("ñandú", 3), "ñan");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }

    #[test]
    fn test_debug_redacts_token() {
        let client = TelegramClient::new(&TelegramConfig {
            bot_token: SecretString::from("123:secret".to_string()),
            api_base: "https://api.telegram.org/".to_string(),
        });
        let debug = format!("{client:?}");
        assert!(!debug.contains("secret"));
        assert!(debug.contains("https://api.telegram.org\""));
    }
}
