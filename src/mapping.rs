use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

/// One configured association between a local chat channel and a Matrix room.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChannelMapping {
    #[serde(deserialize_with = "deserialize_channel_id")]
    pub chat_channel_id: i64,
    pub matrix_room_id: String,
}

/// The full mapping list, re-parsed from the raw configured JSON on every
/// access so configuration changes are picked up without caching.
#[derive(Debug, Clone, Default)]
pub struct MappingTable {
    mappings: Vec<ChannelMapping>,
}

impl MappingTable {
    /// Parses the configured JSON list. Malformed JSON degrades to an empty
    /// table rather than an error.
    pub fn parse(raw: &str) -> Self {
        match serde_json::from_str::<Vec<ChannelMapping>>(raw) {
            Ok(mappings) => Self { mappings },
            Err(e) => {
                if !raw.trim().is_empty() {
                    warn!("malformed channel mapping JSON, treating as empty: {}", e);
                }
                Self::default()
            }
        }
    }

    pub fn find_by_local_channel(&self, id: i64) -> Option<&ChannelMapping> {
        self.mappings.iter().find(|m| m.chat_channel_id == id)
    }

    pub fn find_by_remote_room(&self, room_id: &str) -> Option<&ChannelMapping> {
        self.mappings.iter().find(|m| m.matrix_room_id == room_id)
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}

// Channel ids arrive as JSON numbers or numeric strings depending on how the
// setting was entered; coerce both to i64.
fn deserialize_channel_id<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| serde::de::Error::custom("channel id is not an integer")),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| serde::de::Error::custom("channel id string is not numeric")),
        other => Err(serde::de::Error::custom(format!(
            "unexpected channel id value: {other}"
        ))),
    }
}
