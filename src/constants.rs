use std::time::Duration;

use crate::types::GameMode;

pub const BASE_TICK_MS: u64 = 500;
pub const MIN_SPEED: f64 = 0.1;
pub const MAX_SPEED: f64 = 10.0;

pub const LARGE_BOARD_SIZE: usize = 40;
pub const SMALL_BOARD_SIZE: usize = 20;
pub const SMALL_BOARD_MAX_SECONDS: u32 = 180;
pub const SMALL_BOARD_SCORE_BELOW: u32 = 200;

/// Half of the 4-cell center zone used as the spawn boundary.
pub const CENTER_ZONE_HALF: i32 = 2;
pub const PERIMETER_CELL_POINTS: u32 = 5;

pub const ROOM_CODE_LEN: usize = 6;
pub const CHAT_LOG_CAPACITY: usize = 20;
pub const CHAT_TEXT_MAX_CHARS: usize = 120;
pub const MATCH_HISTORY_CAPACITY: usize = 50;
pub const MATCH_HISTORY_RECENT: usize = 10;

pub const DEFAULT_MODE: GameMode = GameMode::Score;
pub const DEFAULT_TARGET: u32 = 500;
pub const DEFAULT_SPEED: f64 = 1.0;

pub fn board_size_for(mode: GameMode, target: u32) -> usize {
    let short = match mode {
        GameMode::Time => target <= SMALL_BOARD_MAX_SECONDS,
        GameMode::Score => target < SMALL_BOARD_SCORE_BELOW,
    };
    if short {
        SMALL_BOARD_SIZE
    } else {
        LARGE_BOARD_SIZE
    }
}

pub fn normalize_speed(value: Option<f64>) -> f64 {
    match value {
        Some(speed) if speed.is_finite() && speed > 0.0 => speed.clamp(MIN_SPEED, MAX_SPEED),
        _ => DEFAULT_SPEED,
    }
}

pub fn tick_period(speed: f64) -> Duration {
    let ms = (BASE_TICK_MS as f64 / normalize_speed(Some(speed))).round() as u64;
    Duration::from_millis(ms.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_games_get_small_board() {
        assert_eq!(board_size_for(GameMode::Time, 180), SMALL_BOARD_SIZE);
        assert_eq!(board_size_for(GameMode::Time, 181), LARGE_BOARD_SIZE);
        assert_eq!(board_size_for(GameMode::Score, 199), SMALL_BOARD_SIZE);
        assert_eq!(board_size_for(GameMode::Score, 200), LARGE_BOARD_SIZE);
        assert_eq!(board_size_for(GameMode::Score, 500), LARGE_BOARD_SIZE);
    }

    #[test]
    fn tick_period_divides_base_interval() {
        assert_eq!(tick_period(1.0), Duration::from_millis(500));
        assert_eq!(tick_period(2.0), Duration::from_millis(250));
        assert_eq!(tick_period(3.0), Duration::from_millis(167));
        assert_eq!(tick_period(0.5), Duration::from_millis(1000));
    }

    #[test]
    fn speed_is_sanitized() {
        assert_eq!(normalize_speed(None), 1.0);
        assert_eq!(normalize_speed(Some(f64::NAN)), 1.0);
        assert_eq!(normalize_speed(Some(-3.0)), 1.0);
        assert_eq!(normalize_speed(Some(0.0)), 1.0);
        assert_eq!(normalize_speed(Some(1e9)), MAX_SPEED);
        assert_eq!(normalize_speed(Some(0.01)), MIN_SPEED);
    }
}
