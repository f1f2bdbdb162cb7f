//! Push notification fan-out for new chat messages.
//!
//! When a chat message document is created, the receiver's registered
//! delivery tokens and the sender's display name are looked up, and one
//! multicast notification is sent to all tokens.

use std::collections::BTreeMap;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::app_response::AppResponse;
use crate::remote_collection::{RemoteDocument, RemoteError};

pub const MAX_NOTIFICATION_CHARS: usize = 120;
pub const FALLBACK_TITLE: &str = "New message";

/// A chat message document. Absent fields decode as empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChatMessage {
    pub sender_id: String,
    pub receiver_id: String,
    pub conversation_id: String,
    pub text: String,
}

impl ChatMessage {
    pub fn from_document(document: &RemoteDocument) -> Result<Self, AppResponse> {
        serde_json::from_value(serde_json::Value::Object(document.fields.clone())).map_err(|e| {
            AppResponse::ValidationError(format!("Malformed chat message '{}': {e}", document.id))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MulticastMessage {
    pub tokens: Vec<String>,
    pub title: String,
    pub body: String,
    pub data: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MulticastReport {
    pub success_count: usize,
    pub failure_count: usize,
}

/// Lookup of user profile data needed to address a notification.
pub trait RecipientDirectory {
    fn delivery_tokens(&self, user_id: &str) -> Result<Vec<String>, RemoteError>;

    fn display_name(&self, user_id: &str) -> Result<Option<String>, RemoteError>;
}

pub trait PushMessenger {
    fn send_multicast(&self, message: &MulticastMessage) -> Result<MulticastReport, RemoteError>;
}

/// Cuts `text` to at most `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => text[..byte_index].to_string(),
        None => text.to_string(),
    }
}

/// Builds the notification for `message`, or `None` when the receiver has no
/// registered delivery tokens.
pub fn build_chat_notification(
    directory: &dyn RecipientDirectory,
    message: &ChatMessage,
) -> Result<Option<MulticastMessage>, AppResponse> {
    if message.receiver_id.is_empty() {
        return Err(AppResponse::ValidationError("Chat message has no receiver".to_string()));
    }

    let tokens: Vec<String> = directory
        .delivery_tokens(&message.receiver_id)?
        .into_iter()
        .filter(|token| !token.is_empty())
        .collect();
    if tokens.is_empty() {
        debug!("No delivery tokens for {}", message.receiver_id);
        return Ok(None);
    }

    let sender_name = directory
        .display_name(&message.sender_id)?
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| FALLBACK_TITLE.to_string());

    let mut data = BTreeMap::new();
    data.insert("senderId".to_string(), message.sender_id.clone());
    data.insert("conversationId".to_string(), message.conversation_id.clone());

    Ok(Some(MulticastMessage {
        tokens,
        title: truncate_chars(&sender_name, MAX_NOTIFICATION_CHARS),
        body: truncate_chars(&message.text, MAX_NOTIFICATION_CHARS),
        data,
    }))
}

/// Handles creation of a chat message document end to end.
pub fn notify_chat_message_created(
    directory: &dyn RecipientDirectory,
    messenger: &dyn PushMessenger,
    message: &ChatMessage,
) -> Result<Option<MulticastReport>, AppResponse> {
    let Some(notification) = build_chat_notification(directory, message)? else {
        return Ok(None);
    };

    let report = messenger.send_multicast(&notification)?;
    if report.failure_count > 0 {
        warn!(
            "Chat notification for conversation {}: {} of {} deliveries failed",
            message.conversation_id,
            report.failure_count,
            notification.tokens.len()
        );
    } else {
        info!(
            "Chat notification for conversation {} sent to {} tokens",
            message.conversation_id, report.success_count
        );
    }
    Ok(Some(report))
}
