//! Telegram Bot API integration for order notifications.

mod client;
mod error;

pub use client::{TelegramClient, escape_html};
pub use error::TelegramError;
