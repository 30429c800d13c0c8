use crate::error::{Error, Result};
use crate::protocol::constants::{
    CHANNEL_NAME_MAX_LENGTH, CHANNEL_NAME_REGEX, CLIENT_EVENT_PREFIX, EVENT_NAME_MAX_LENGTH,
};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref CHANNEL_NAME_PATTERN: Regex =
        Regex::new(CHANNEL_NAME_REGEX).expect("channel name pattern is a valid regex");
}

pub fn validate_channel_name(name: &str, max_length: usize) -> Result<()> {
    if name.is_empty() || name.len() > max_length {
        return Err(Error::InvalidChannelName(format!(
            "Channel name must be between 1 and {max_length} characters"
        )));
    }
    if !CHANNEL_NAME_PATTERN.is_match(name) {
        return Err(Error::InvalidChannelName(format!(
            "Channel name contains invalid characters: {name}"
        )));
    }
    Ok(())
}

pub fn default_channel_name_limit() -> usize {
    CHANNEL_NAME_MAX_LENGTH
}

pub fn validate_event_name(name: &str, max_length: usize) -> Result<()> {
    if name.is_empty() || name.len() > max_length {
        return Err(Error::InvalidEventName(format!(
            "Event name must be between 1 and {max_length} characters"
        )));
    }
    Ok(())
}

pub fn default_event_name_limit() -> usize {
    EVENT_NAME_MAX_LENGTH
}

pub fn is_client_event(event: &str) -> bool {
    event.starts_with(CLIENT_EVENT_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_name_rules() {
        assert!(validate_channel_name("presence-room_1,a.b;c@d=e", 200).is_ok());
        assert!(validate_channel_name("", 200).is_err());
        assert!(validate_channel_name("bad channel", 200).is_err());
        assert!(validate_channel_name("bad#channel", 200).is_err());
        assert!(validate_channel_name(&"x".repeat(201), 200).is_err());
    }

    #[test]
    fn client_event_prefix() {
        assert!(is_client_event("client-typing"));
        assert!(!is_client_event("pusher:ping"));
    }
}
