use serde_json::{Map, Value};

use crate::types::{Action, GameMode, GameSettings};

#[derive(Debug, PartialEq)]
pub enum ParsedClientMessage {
    Join { room_code: String },
    ToggleReady,
    UpdateSettings(GameSettings),
    StartGame(GameSettings),
    Action { action: Action },
    Surrender,
    RequestRestart,
    ResetToLobby,
    QuickChat { text: String },
    Leave,
}

pub fn parse_client_message(raw: &str) -> Option<ParsedClientMessage> {
    let value: Value = serde_json::from_str(raw).ok()?;
    let object = value.as_object()?;
    let message_type = object.get("type")?.as_str()?;

    match message_type {
        "join" => {
            let room_code = object.get("roomCode")?.as_str()?.to_string();
            Some(ParsedClientMessage::Join { room_code })
        }
        "toggleReady" => Some(ParsedClientMessage::ToggleReady),
        "updateSettings" => parse_settings(object).map(ParsedClientMessage::UpdateSettings),
        "startGame" => parse_settings(object).map(ParsedClientMessage::StartGame),
        "action" => {
            let action = Action::parse(object.get("action")?.as_str()?)?;
            Some(ParsedClientMessage::Action { action })
        }
        "surrender" => Some(ParsedClientMessage::Surrender),
        "requestRestart" => Some(ParsedClientMessage::RequestRestart),
        "resetToLobby" => Some(ParsedClientMessage::ResetToLobby),
        "quickChat" => {
            let text = object.get("text")?.as_str()?.to_string();
            Some(ParsedClientMessage::QuickChat { text })
        }
        "leave" => Some(ParsedClientMessage::Leave),
        _ => None,
    }
}

fn parse_settings(object: &Map<String, Value>) -> Option<GameSettings> {
    let mode = GameMode::parse(object.get("mode")?.as_str()?)?;
    let target = parse_number(object.get("value")?)?;
    if target < 0.0 || target > u32::MAX as f64 {
        return None;
    }
    let speed = match object.get("speed") {
        None | Some(Value::Null) => None,
        Some(value) => Some(parse_number(value)?),
    };
    Some(GameSettings {
        mode,
        target: target.floor() as u32,
        speed,
    })
}

/// JSON number or numeric string; non-finite values are rejected.
fn parse_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(number) => number.as_f64()?,
        Value::String(text) => text.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    number.is_finite().then_some(number)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_join_message() {
        let parsed = parse_client_message(r#"{"type":"join","roomCode":"ABC123"}"#);
        assert_eq!(
            parsed,
            Some(ParsedClientMessage::Join {
                room_code: "ABC123".to_string()
            })
        );
    }

    #[test]
    fn parse_join_requires_string_code() {
        assert!(parse_client_message(r#"{"type":"join","roomCode":123456}"#).is_none());
        assert!(parse_client_message(r#"{"type":"join"}"#).is_none());
    }

    #[test]
    fn parse_start_game_accepts_numeric_strings() {
        let parsed =
            parse_client_message(r#"{"type":"startGame","mode":"time","value":"180","speed":"1.5"}"#)
                .expect("start message should parse");
        assert_eq!(
            parsed,
            ParsedClientMessage::StartGame(GameSettings {
                mode: GameMode::Time,
                target: 180,
                speed: Some(1.5),
            })
        );
    }

    #[test]
    fn parse_update_settings_without_speed() {
        let parsed = parse_client_message(r#"{"type":"updateSettings","mode":"score","value":500}"#);
        assert!(matches!(
            parsed,
            Some(ParsedClientMessage::UpdateSettings(GameSettings {
                mode: GameMode::Score,
                target: 500,
                speed: None,
            }))
        ));
    }

    #[test]
    fn parse_settings_rejects_bad_values() {
        assert!(parse_client_message(r#"{"type":"startGame","mode":"blitz","value":1}"#).is_none());
        assert!(parse_client_message(r#"{"type":"startGame","mode":"score","value":"abc"}"#).is_none());
        assert!(parse_client_message(r#"{"type":"startGame","mode":"score","value":-5}"#).is_none());
        assert!(parse_client_message(r#"{"type":"startGame","mode":"score","value":1e100}"#).is_none());
        assert!(parse_client_message(r#"{"type":"startGame","mode":"score"}"#).is_none());
    }

    #[test]
    fn parse_action_rejects_unknown_direction() {
        assert!(parse_client_message(r#"{"type":"action","action":"hold"}"#).is_none());
        assert_eq!(
            parse_client_message(r#"{"type":"action","action":"rotate"}"#),
            Some(ParsedClientMessage::Action {
                action: Action::Rotate
            })
        );
    }

    #[test]
    fn parse_payloadless_messages() {
        for (raw, expected) in [
            (r#"{"type":"toggleReady"}"#, ParsedClientMessage::ToggleReady),
            (r#"{"type":"surrender"}"#, ParsedClientMessage::Surrender),
            (r#"{"type":"requestRestart"}"#, ParsedClientMessage::RequestRestart),
            (r#"{"type":"resetToLobby"}"#, ParsedClientMessage::ResetToLobby),
            (r#"{"type":"leave"}"#, ParsedClientMessage::Leave),
        ] {
            assert_eq!(parse_client_message(raw), Some(expected));
        }
    }

    #[test]
    fn parse_rejects_malformed_frames() {
        assert!(parse_client_message("not json").is_none());
        assert!(parse_client_message("[1,2]").is_none());
        assert!(parse_client_message(r#"{"type":"unknown"}"#).is_none());
        assert!(parse_client_message(r#"{"type":"quickChat"}"#).is_none());
    }
}
