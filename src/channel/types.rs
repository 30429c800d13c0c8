use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelType {
    Public,
    Private,
    Presence,
}

impl ChannelType {
    /// The type is fully determined by the name prefix; everything without a
    /// recognized prefix is public.
    pub fn from_name(channel_name: &str) -> Self {
        match channel_name.split_once('-') {
            Some(("private", _)) => Self::Private,
            Some(("presence", _)) => Self::Presence,
            _ => Self::Public,
        }
    }

    pub fn requires_authentication(&self) -> bool {
        matches!(self, ChannelType::Private | ChannelType::Presence)
    }

    pub fn is_presence(&self) -> bool {
        matches!(self, ChannelType::Presence)
    }
}

/// Identity a presence subscriber asserted in its signed `channel_data`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PresenceMemberInfo {
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_info: Option<serde_json::Value>,
}
