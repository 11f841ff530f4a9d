//! Guild channel returned by `GET_CHANNELS`.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{AppError, Result};

/// One channel of a guild.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    /// Channel snowflake.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Raw channel type; see [`ChannelKind`].
    #[serde(rename = "type")]
    pub kind: i64,
}

impl Channel {
    /// Typed view of [`Channel::kind`].
    #[must_use]
    pub fn channel_kind(&self) -> ChannelKind {
        ChannelKind::from(self.kind)
    }
}

/// Known channel types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    /// Guild text channel (0).
    Text,
    /// Guild voice channel (2).
    Voice,
    /// Category grouping other channels (4).
    Category,
    /// Announcement channel (5).
    Announcement,
    /// Stage channel (13).
    Stage,
    /// Forum channel (15).
    Forum,
    /// Any other type.
    Unknown,
}

impl ChannelKind {
    /// Upper-case label used in text output.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Text => "TEXT",
            Self::Voice => "VOICE",
            Self::Category => "CATEGORY",
            Self::Announcement => "ANNOUNCEMENT",
            Self::Stage => "STAGE",
            Self::Forum => "FORUM",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl From<i64> for ChannelKind {
    fn from(value: i64) -> Self {
        match value {
            0 => Self::Text,
            2 => Self::Voice,
            4 => Self::Category,
            5 => Self::Announcement,
            13 => Self::Stage,
            15 => Self::Forum,
            _ => Self::Unknown,
        }
    }
}

impl Display for ChannelKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Parse `GET_CHANNELS` response data.
///
/// The peer sends `{"channels": [...]}`; a bare array is accepted too.
///
/// # Errors
///
/// Returns `AppError::Framing` if `data` has neither shape or an entry is
/// missing `id`, `name`, or `type`.
pub fn channels_from_data(data: Value) -> Result<Vec<Channel>> {
    let list = match data {
        Value::Array(_) => data,
        Value::Object(mut map) => map.remove("channels").ok_or_else(|| {
            AppError::Framing("GET_CHANNELS data has no channels field".into())
        })?,
        other => {
            return Err(AppError::Framing(format!(
                "GET_CHANNELS data must be an object or array, got {other}"
            )));
        }
    };

    serde_json::from_value(list)
        .map_err(|err| AppError::Framing(format!("malformed channel list: {err}")))
}
