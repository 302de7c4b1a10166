use std::collections::HashMap;

use serde::Deserialize;

/// Response body of `GET /_matrix/client/v3/sync`.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncResponse {
    pub next_batch: String,
    #[serde(default)]
    pub rooms: Rooms,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Rooms {
    #[serde(default)]
    pub join: HashMap<String, JoinedRoom>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct JoinedRoom {
    #[serde(default)]
    pub timeline: Timeline,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Timeline {
    #[serde(default)]
    pub events: Vec<RemoteEvent>,
}

/// One timeline event as delivered by the homeserver. Transient; never
/// persisted beyond the current processing step.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub event_id: String,
    #[serde(default)]
    pub sender: String,
    #[serde(default)]
    pub content: EventContent,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct EventContent {
    #[serde(default)]
    pub msgtype: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}
