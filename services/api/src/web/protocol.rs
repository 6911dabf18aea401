//! services/api/src/web/protocol.rs
//!
//! Defines the WebSocket message protocol between UI clients and the API server.
//! The server pushes linkage and refresh notifications; clients only ever send
//! keep-alives or ask for a resynchronisation.

use chrono::{DateTime, Utc};
use onyx_core::events::Event;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

//=========================================================================================
// Messages Sent FROM the Client TO the Server
//=========================================================================================

#[derive(Deserialize, Debug, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Keep-alive; answered with `Pong`.
    Ping,

    /// Asks the server to emit both refresh signals, e.g. after a reconnect.
    Resync,
}

//=========================================================================================
// Messages Sent FROM the Server TO the Client
//=========================================================================================

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// A subject was linked to or unlinked from a timer.
    LinkageChanged {
        action: String,
        subject_id: Uuid,
        timer_id: Option<Uuid>,
        timestamp: DateTime<Utc>,
    },

    /// The subject list changed and should be re-fetched.
    SubjectsRefresh,

    /// The timer list changed and should be re-fetched.
    TimersRefresh,

    Pong,

    /// Reports a malformed client message.
    Error { message: String },
}

impl From<&Event> for ServerMessage {
    fn from(event: &Event) -> Self {
        match event {
            Event::LinkageChanged(change) => ServerMessage::LinkageChanged {
                action: change.kind.as_str().to_string(),
                subject_id: change.subject_id,
                timer_id: change.timer_id,
                timestamp: change.timestamp,
            },
            Event::SubjectsRefresh => ServerMessage::SubjectsRefresh,
            Event::TimersRefresh => ServerMessage::TimersRefresh,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use onyx_core::events::{LinkageChange, LinkageKind};

    #[test]
    fn messages_use_snake_case_type_tags() {
        let subject_id = Uuid::new_v4();
        let event = Event::LinkageChanged(LinkageChange {
            kind: LinkageKind::Unlink,
            subject_id,
            timer_id: None,
            timestamp: Utc::now(),
        });
        let value = serde_json::to_value(ServerMessage::from(&event)).unwrap();
        assert_eq!(value["type"], "linkage_changed");
        assert_eq!(value["action"], "unlink");
        assert_eq!(value["subject_id"], subject_id.to_string());

        let refresh = serde_json::to_value(ServerMessage::from(&Event::TimersRefresh)).unwrap();
        assert_eq!(refresh["type"], "timers_refresh");

        let parsed: ClientMessage = serde_json::from_str(r#"{"type":"resync"}"#).unwrap();
        assert_eq!(parsed, ClientMessage::Resync);
    }
}
