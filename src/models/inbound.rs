use serde_json::Value as JsonValue;

use crate::error::{DocLinkError, Result};

use super::notification::Notification;
use super::response::Response;

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Frame carrying a `requestId`: the answer to one of our requests
    Response(Response),
    /// Frame carrying a `room`: a real-time notification
    Notification(Notification),
}

/// Decode a raw frame.
///
/// A frame whose `room` is a channel for which `is_known_channel` returns
/// true is a notification, even when it echoes a `requestId`. Otherwise a
/// frame with a `requestId` is a response, and a frame with only a `room` is a
/// notification for a channel we no longer route. Anything else (server
/// banners, heartbeats) yields `Ok(None)` and is skipped by the caller.
pub(crate) fn parse_frame<F>(frame: &[u8], is_known_channel: F) -> Result<Option<Inbound>>
where
    F: Fn(&str) -> bool,
{
    let value: JsonValue = serde_json::from_slice(frame).map_err(|e| {
        DocLinkError::SerializationError(format!("Failed to parse inbound frame: {}", e))
    })?;

    let Some(object) = value.as_object() else {
        return Ok(None);
    };

    let room = object.get("room").and_then(JsonValue::as_str);
    if room.map_or(false, &is_known_channel) {
        return notification(value);
    }

    if object.get("requestId").map_or(false, |id| id.is_string()) {
        let response: Response = serde_json::from_value(value).map_err(|e| {
            DocLinkError::SerializationError(format!("Malformed response frame: {}", e))
        })?;
        return Ok(Some(Inbound::Response(response)));
    }

    if room.is_some() {
        return notification(value);
    }

    Ok(None)
}

fn notification(value: JsonValue) -> Result<Option<Inbound>> {
    let notification: Notification = serde_json::from_value(value).map_err(|e| {
        DocLinkError::SerializationError(format!("Malformed notification frame: {}", e))
    })?;
    Ok(Some(Inbound::Notification(notification)))
}
