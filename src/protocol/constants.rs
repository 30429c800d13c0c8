pub const PROTOCOL_VERSION: u8 = 7;
pub const ACTIVITY_TIMEOUT: u64 = 120;

pub const CHANNEL_NAME_MAX_LENGTH: usize = 200;
pub const CHANNEL_NAME_REGEX: &str = r"^[a-zA-Z0-9_\-=@,.;]+$";

pub const EVENT_NAME_MAX_LENGTH: usize = 200;
pub const CLIENT_EVENT_PREFIX: &str = "client-";

/// Close codes in this range tell the client not to reconnect.
pub const CLOSE_CODE_NO_RECONNECT_MIN: u16 = 4000;
pub const CLOSE_CODE_NO_RECONNECT_MAX: u16 = 4099;
