use std::time::{SystemTime, UNIX_EPOCH};

use crate::constants::{CHAT_TEXT_MAX_CHARS, ROOM_CODE_LEN};

const NAME_SUFFIX_LEN: usize = 4;

pub fn is_valid_room_code(raw: &str) -> bool {
    raw.chars().count() == ROOM_CODE_LEN
}

/// Trimmed and capped; `None` when nothing is left to say.
pub fn sanitize_chat_text(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(CHAT_TEXT_MAX_CHARS).collect())
}

pub fn device_label(user_agent: &str) -> &'static str {
    if ["iPhone", "iPad", "Android"]
        .iter()
        .any(|marker| user_agent.contains(marker))
    {
        "Mobile"
    } else if user_agent.contains("Windows") {
        "Windows"
    } else if user_agent.contains("Mac") {
        "Mac"
    } else if user_agent.contains("Linux") {
        "Linux"
    } else {
        "PC"
    }
}

/// `<Device>_<ABCD>`; `letters` supplies the uppercase suffix.
pub fn display_name_from_user_agent(
    user_agent: Option<&str>,
    letters: impl IntoIterator<Item = char>,
) -> String {
    let suffix: String = letters
        .into_iter()
        .filter(char::is_ascii_uppercase)
        .take(NAME_SUFFIX_LEN)
        .collect();
    format!("{}_{suffix}", device_label(user_agent.unwrap_or_default()))
}

pub fn random_name_suffix() -> impl Iterator<Item = char> {
    std::iter::repeat_with(|| char::from(b'A' + rand::random_range(0..26u8)))
}

pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
