use std::collections::BTreeMap;

use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Primary,
    Secondary,
    Spectator,
}

impl Role {
    pub fn is_spectator(self) -> bool {
        self == Self::Spectator
    }

    pub fn owner(self) -> Option<Owner> {
        match self {
            Self::Primary => Some(Owner::Primary),
            Self::Secondary => Some(Owner::Secondary),
            Self::Spectator => None,
        }
    }
}

/// Tag written into board cells. Serialized to clients as `1` / `2`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Owner {
    Primary,
    Secondary,
}

impl Owner {
    pub fn tag(self) -> u8 {
        match self {
            Self::Primary => 1,
            Self::Secondary => 2,
        }
    }

    pub fn opponent(self) -> Self {
        match self {
            Self::Primary => Self::Secondary,
            Self::Secondary => Self::Primary,
        }
    }
}

impl Serialize for Owner {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.tag())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Winner {
    Primary,
    Secondary,
    Draw,
}

impl From<Owner> for Winner {
    fn from(owner: Owner) -> Self {
        match owner {
            Owner::Primary => Self::Primary,
            Owner::Secondary => Self::Secondary,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GameMode {
    Score,
    Time,
}

impl GameMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "score" => Some(Self::Score),
            "time" => Some(Self::Time),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GravityDirection {
    Up,
    Right,
    Down,
    Left,
}

impl GravityDirection {
    pub const ALL: [Self; 4] = [Self::Up, Self::Right, Self::Down, Self::Left];

    pub fn delta(self) -> (i32, i32) {
        match self {
            Self::Up => (0, -1),
            Self::Right => (1, 0),
            Self::Down => (0, 1),
            Self::Left => (-1, 0),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    Left,
    Right,
    Up,
    Down,
    Forward,
    Rotate,
    Drop,
}

impl Action {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "left" => Some(Self::Left),
            "right" => Some(Self::Right),
            "up" => Some(Self::Up),
            "down" => Some(Self::Down),
            "forward" => Some(Self::Forward),
            "rotate" => Some(Self::Rotate),
            "drop" => Some(Self::Drop),
            _ => None,
        }
    }

    /// Manual one-cell shift, independent of the piece's gravity.
    pub fn shift(self) -> Option<(i32, i32)> {
        match self {
            Self::Left => Some((-1, 0)),
            Self::Right => Some((1, 0)),
            Self::Up => Some((0, -1)),
            Self::Down => Some((0, 1)),
            Self::Forward | Self::Rotate | Self::Drop => None,
        }
    }
}

/// Host-supplied settings for `updateSettings` / `startGame`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GameSettings {
    pub mode: GameMode,
    pub target: u32,
    pub speed: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GameConfig {
    pub mode: GameMode,
    #[serde(rename = "value")]
    pub target: u32,
    pub speed: f64,
    #[serde(rename = "startTime")]
    pub started_at_ms: u64,
    pub active: bool,
    pub winner: Option<Winner>,
    #[serde(rename = "boardSize")]
    pub board_size: usize,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    #[serde(rename = "primaryCount")]
    pub primary_count: u32,
    #[serde(rename = "secondaryCount")]
    pub secondary_count: u32,
    pub total: u32,
    #[serde(rename = "primaryScore")]
    pub primary_score: u32,
    #[serde(rename = "secondaryScore")]
    pub secondary_score: u32,
}

impl Stats {
    pub fn score(&self, owner: Owner) -> u32 {
        match owner {
            Owner::Primary => self.primary_score,
            Owner::Secondary => self.secondary_score,
        }
    }

    /// Strictly higher perimeter score wins; equal scores draw.
    pub fn leader(&self) -> Winner {
        match self.primary_score.cmp(&self.secondary_score) {
            std::cmp::Ordering::Greater => Winner::Primary,
            std::cmp::Ordering::Less => Winner::Secondary,
            std::cmp::Ordering::Equal => Winner::Draw,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct PieceView {
    pub shape: Vec<Vec<u8>>,
    pub x: i32,
    pub y: i32,
    pub owner: Owner,
    pub dir: GravityDirection,
    #[serde(rename = "gravDx")]
    pub grav_dx: i32,
    #[serde(rename = "gravDy")]
    pub grav_dy: i32,
}

#[derive(Clone, Debug, Serialize)]
pub struct ParticipantView {
    pub id: String,
    pub role: Role,
    pub name: String,
    #[serde(rename = "isReady")]
    pub ready: bool,
    pub piece: Option<PieceView>,
}

#[derive(Clone, Debug, Serialize)]
pub struct RoomStateView {
    pub participants: BTreeMap<String, ParticipantView>,
    pub config: GameConfig,
    #[serde(rename = "participantCount")]
    pub participant_count: usize,
}

#[derive(Clone, Debug, Serialize)]
pub struct StateSnapshot {
    pub board: Vec<Vec<u8>>,
    pub participants: BTreeMap<String, ParticipantView>,
    pub stats: Stats,
    pub config: GameConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChatMessage {
    pub name: String,
    /// `None` marks a system notice.
    pub role: Option<Role>,
    pub text: String,
    pub time: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MatchRecord {
    pub time: String,
    pub room: String,
    pub mode: GameMode,
    #[serde(rename = "value")]
    pub target: u32,
    pub winner: Winner,
    #[serde(rename = "primaryName")]
    pub primary_name: String,
    #[serde(rename = "secondaryName")]
    pub secondary_name: String,
    #[serde(rename = "primaryScore")]
    pub primary_score: u32,
    #[serde(rename = "secondaryScore")]
    pub secondary_score: u32,
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    Connected,
    Init {
        id: String,
        role: Role,
        #[serde(rename = "roomCode")]
        room_code: String,
        #[serde(rename = "isHost")]
        is_host: bool,
        name: String,
    },
    RoomState(RoomStateView),
    State(StateSnapshot),
    ChatMessage(ChatMessage),
    MatchHistory {
        records: Vec<MatchRecord>,
    },
    RestartStatus {
        roles: Vec<Role>,
    },
}

/// One outbound message addressed to a set of participants.
#[derive(Clone, Debug)]
pub struct Delivery {
    pub recipients: Vec<String>,
    pub message: ServerMessage,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gravity_vectors_are_unit_axes() {
        for dir in GravityDirection::ALL {
            let (dx, dy) = dir.delta();
            assert_eq!(dx.abs() + dy.abs(), 1);
        }
    }

    #[test]
    fn leader_requires_strictly_higher_score() {
        let mut stats = Stats::default();
        assert_eq!(stats.leader(), Winner::Draw);
        stats.primary_score = 10;
        assert_eq!(stats.leader(), Winner::Primary);
        stats.secondary_score = 15;
        assert_eq!(stats.leader(), Winner::Secondary);
    }

    #[test]
    fn server_message_uses_type_tag() {
        let value = serde_json::to_value(ServerMessage::RestartStatus {
            roles: vec![Role::Primary],
        })
        .expect("serializable");
        assert_eq!(value["type"], "restartStatus");
        assert_eq!(value["roles"][0], "primary");

        let value = serde_json::to_value(ServerMessage::Connected).expect("serializable");
        assert_eq!(value["type"], "connected");
    }

    #[test]
    fn action_parse_rejects_unknown() {
        assert_eq!(Action::parse("drop"), Some(Action::Drop));
        assert_eq!(Action::parse("hold"), None);
        assert_eq!(Action::Left.shift(), Some((-1, 0)));
        assert_eq!(Action::Rotate.shift(), None);
    }
}
