//! Wire frames: the decoded inbound map and the outbound operations we send.

use crate::error::{NodeError, NodeResult};
use serde::de::{self, DeserializeOwned, Deserializer};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;

/// Operation discriminator carried in the `op` field of every inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Stats,
    Event,
    PlayerUpdate,
    Other(String),
}

impl Op {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "stats" => Op::Stats,
            "event" => Op::Event,
            "playerUpdate" => Op::PlayerUpdate,
            other => Op::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Op::Stats => "stats",
            Op::Event => "event",
            Op::PlayerUpdate => "playerUpdate",
            Op::Other(raw) => raw,
        }
    }
}

/// One inbound message, decoded into a JSON object.
///
/// Anything that is not a JSON object is a decode failure; the frame is
/// dropped by the pump before it ever reaches the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    fields: Map<String, Value>,
}

impl Frame {
    pub fn decode(text: &str) -> NodeResult<Self> {
        match serde_json::from_str::<Value>(text)? {
            Value::Object(fields) => Ok(Self { fields }),
            other => Err(NodeError::Decode(format!(
                "expected a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }

    pub fn from_value(value: Value) -> NodeResult<Self> {
        match value {
            Value::Object(fields) => Ok(Self { fields }),
            other => Err(NodeError::Decode(format!(
                "expected a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// `None` when the frame has no `op` field or it is not a string.
    pub fn op(&self) -> Option<Op> {
        self.str_field("op").map(Op::parse)
    }

    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    /// Guild identifier of the session this frame targets, if it carries a valid one.
    pub fn guild_id(&self) -> Option<u64> {
        self.fields.get("guildId").and_then(guild_id_from_value)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Deserialize the whole frame into one of the typed payloads.
    pub fn parse<T: DeserializeOwned>(&self) -> NodeResult<T> {
        Ok(serde_json::from_value(Value::Object(self.fields.clone()))?)
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }
}

/// Operations the client sends to the node.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Outbound {
    /// Ask the node to keep our players alive for `timeout` seconds after a disconnect
    ConfigureResuming { key: String, timeout: u64 },
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Guild ids are snowflakes sent as decimal strings, older nodes send numbers.
fn guild_id_from_value(value: &Value) -> Option<u64> {
    match value {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_u64(),
        _ => None,
    }
}

/// serde helper for `guildId` fields in typed payloads.
pub(crate) fn deserialize_guild_id<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    struct GuildIdVisitor;

    impl<'de> de::Visitor<'de> for GuildIdVisitor {
        type Value = u64;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a guild id as a decimal string or unsigned integer")
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<u64, E> {
            Ok(v)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<u64, E> {
            u64::try_from(v).map_err(|_| E::custom("negative guild id"))
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<u64, E> {
            v.parse().map_err(E::custom)
        }
    }

    deserializer.deserialize_any(GuildIdVisitor)
}
