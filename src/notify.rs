//! Real-time `newMail` events.
//!
//! The transport (a socket.io client) lives outside this crate. It hands the
//! listener raw text frames and sends [`register_frame`] once connected.

use std::sync::Arc;

use futures::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::store::MailStore;

pub const NEW_MAIL_EVENT: &str = "newMail";
pub const REGISTER_EVENT: &str = "register";

/// Payload of a `newMail` event.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMailEvent {
    #[serde(deserialize_with = "crate::models::de_id")]
    pub mail_id: String,
}

/// Decode one frame. Accepts the bare payload (`{"mailId": ..}`) and socket.io
/// event frames (`42["newMail", {..}]` or `["newMail", {..}]`).
///
/// Other events and protocol control packets yield `Ok(None)`.
pub fn parse_frame(frame: &str) -> Result<Option<NewMailEvent>> {
    let frame = frame.trim();
    let body = frame.trim_start_matches(|c: char| c.is_ascii_digit());
    let has_packet_type = body.len() != frame.len();
    if body.is_empty() {
        return Ok(None);
    }

    let value: Value = serde_json::from_str(body)
        .map_err(|e| Error::Validation(format!("unreadable frame: {e}")))?;
    match value {
        Value::Array(mut items) => {
            if items.first().and_then(Value::as_str) != Some(NEW_MAIL_EVENT) {
                return Ok(None);
            }
            if items.len() < 2 {
                return Err(Error::Validation("newMail event without payload".into()));
            }
            decode_payload(items.swap_remove(1)).map(Some)
        }
        // `0{..}` / `40{..}` are handshake packets, not events.
        Value::Object(_) if has_packet_type => Ok(None),
        Value::Object(_) => decode_payload(value).map(Some),
        _ => Ok(None),
    }
}

fn decode_payload(payload: Value) -> Result<NewMailEvent> {
    serde_json::from_value(payload)
        .map_err(|e| Error::Validation(format!("bad newMail payload: {e}")))
}

/// Frame announcing `user_id` to the server so it routes events to this client.
pub fn register_frame(user_id: &str) -> String {
    format!("42{}", serde_json::json!([REGISTER_EVENT, user_id]))
}

/// Reloads the active filter of the store whenever a new mail is announced.
#[derive(Clone)]
pub struct NotificationListener {
    store: Arc<MailStore>,
}

impl NotificationListener {
    pub fn new(store: Arc<MailStore>) -> Self {
        NotificationListener { store }
    }

    /// Handle one frame. Returns the announced event, if the frame was one.
    ///
    /// Malformed frames and failed reloads are logged, never returned.
    pub async fn handle_frame(&self, frame: &str) -> Option<NewMailEvent> {
        let event = match parse_frame(frame) {
            Ok(Some(event)) => event,
            Ok(None) => return None,
            Err(e) => {
                log::error!("Error parsing newMail event: {e}");
                return None;
            }
        };
        log::info!("New mail received: {}", event.mail_id);
        if let Err(e) = self.store.refresh().await {
            log::warn!("Reload after new mail {} failed: {e}", event.mail_id);
        }
        Some(event)
    }

    /// Consume `frames` until the stream ends. Returns how many new-mail events
    /// were seen.
    pub async fn run<S>(&self, frames: S) -> usize
    where
        S: Stream,
        S::Item: AsRef<str>,
    {
        futures::pin_mut!(frames);
        let mut seen = 0;
        while let Some(frame) = frames.next().await {
            if self.handle_frame(frame.as_ref()).await.is_some() {
                seen += 1;
            }
        }
        log::debug!("Notification stream ended after {seen} new mails");
        seen
    }
}
