//! 消息类型定义
//!
//! 所有消息都是带名字的事件：`{"event": "make_move", "data": {...}}`。

use serde::{Deserialize, Serialize};

use crate::board::Position;
use crate::card::{Card, Room, Solution, Suspect, Weapon};
use crate::error::GameError;
use crate::record::{AccusationRecord, SuggestionRecord};

/// 玩家 ID
pub type PlayerId = u64;

/// 大厅 ID（6 位大写字母或数字）
pub type LobbyId = String;

/// 大厅生命周期
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LobbyState {
    /// 等待玩家加入
    Open,
    /// 已有玩家开始选角色
    CharacterSelection,
    /// 游戏进行中
    InProgress,
    /// 游戏结束
    Finished,
}

/// 回合阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GamePhase {
    AwaitingMove,
    AwaitingSuggestionOrPass,
    AwaitingDisproveResponse,
    AwaitingAccusationOrPass,
    Finished,
}

/// 大厅中的玩家信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub player_id: PlayerId,
    pub name: String,
    pub is_host: bool,
    pub character: Option<Suspect>,
    pub connected: bool,
}

/// 角色占用情况
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterInfo {
    pub character: Suspect,
    pub selected_by: Option<PlayerId>,
}

/// 角色棋子位置（未被选择的角色没有玩家）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerPosition {
    pub player_id: Option<PlayerId>,
    pub name: Option<String>,
    pub character: Suspect,
    pub position: Position,
    pub position_type: String,
}

/// 客户端发送给服务端的消息
///
/// 卡牌、角色与位置名称以字符串接收，由服务端解析，
/// 这样无法识别的名称会得到对应操作的错误码。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientMessage {
    // === 大厅 ===
    /// 创建大厅（发起者成为房主）
    CreateLobby { name: String },
    /// 加入大厅；携带 player_id 与 token 表示重新加入
    JoinLobby {
        lobby_id: LobbyId,
        #[serde(default)]
        name: String,
        #[serde(default)]
        player_id: Option<PlayerId>,
        #[serde(default)]
        token: Option<String>,
    },
    /// 离开大厅
    LeaveLobby { lobby_id: LobbyId, player_id: PlayerId },
    /// 选择角色
    SelectCharacter {
        lobby_id: LobbyId,
        player_id: PlayerId,
        character_name: String,
    },
    /// 开始游戏（仅房主）
    StartGame { lobby_id: LobbyId, player_id: PlayerId },

    // === 对局 ===
    /// 移动
    MakeMove {
        lobby_id: LobbyId,
        player_id: PlayerId,
        #[serde(rename = "move")]
        destination: String,
    },
    /// 推测（房间固定为当前所在房间）
    MakeSuggestion {
        lobby_id: LobbyId,
        player_id: PlayerId,
        suspect: String,
        weapon: String,
    },
    /// 反驳；card_shown 为空表示无法反驳
    DisproveSuggestion {
        lobby_id: LobbyId,
        player_id: PlayerId,
        suggestion_idx: usize,
        #[serde(default)]
        card_shown: Option<String>,
    },
    /// 指控
    MakeAccusation {
        lobby_id: LobbyId,
        player_id: PlayerId,
        suspect: String,
        weapon: String,
        room: String,
    },
    /// 跳过当前可选步骤
    PassTurn { lobby_id: LobbyId, player_id: PlayerId },
    /// 查询自己的手牌
    GetMyCards { lobby_id: LobbyId, player_id: PlayerId },
    /// 查询当前局面
    GetGameState { lobby_id: LobbyId, player_id: PlayerId },

    // === 心跳 ===
    Ping,
}

impl ClientMessage {
    /// 消息针对的大厅与玩家
    pub fn target(&self) -> Option<(&str, Option<PlayerId>)> {
        match self {
            ClientMessage::CreateLobby { .. } | ClientMessage::Ping => None,
            ClientMessage::JoinLobby { lobby_id, player_id, .. } => {
                Some((lobby_id.as_str(), *player_id))
            }
            ClientMessage::LeaveLobby { lobby_id, player_id }
            | ClientMessage::SelectCharacter { lobby_id, player_id, .. }
            | ClientMessage::StartGame { lobby_id, player_id }
            | ClientMessage::MakeMove { lobby_id, player_id, .. }
            | ClientMessage::MakeSuggestion { lobby_id, player_id, .. }
            | ClientMessage::DisproveSuggestion { lobby_id, player_id, .. }
            | ClientMessage::MakeAccusation { lobby_id, player_id, .. }
            | ClientMessage::PassTurn { lobby_id, player_id }
            | ClientMessage::GetMyCards { lobby_id, player_id }
            | ClientMessage::GetGameState { lobby_id, player_id } => {
                Some((lobby_id.as_str(), Some(*player_id)))
            }
        }
    }
}

/// 服务端发送给客户端的消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    // === 大厅事件 ===
    /// 大厅创建成功；token 用于断线后重新加入，只发给本人
    LobbyCreated {
        lobby_id: LobbyId,
        player_id: PlayerId,
        token: String,
    },
    /// 加入成功（只发给加入者）
    JoinAccepted {
        lobby_id: LobbyId,
        player_id: PlayerId,
        token: String,
    },
    /// 有玩家加入（广播，player_id 为加入者）
    LobbyJoined {
        lobby_id: LobbyId,
        player_id: PlayerId,
        players: Vec<PlayerInfo>,
        host_id: PlayerId,
        min_players: usize,
        max_players: usize,
        can_start: bool,
    },
    /// 有玩家离开
    PlayerLeft {
        lobby_id: LobbyId,
        player_id: PlayerId,
        host_id: PlayerId,
    },
    /// 玩家连接状态变化
    PlayerConnectionChanged { player_id: PlayerId, connected: bool },
    /// 大厅已关闭
    LobbyClosed { lobby_id: LobbyId },
    /// 角色被选择
    CharacterSelected {
        player_id: PlayerId,
        character_name: Suspect,
        characters: Vec<CharacterInfo>,
    },

    // === 对局事件 ===
    /// 游戏开始
    GameStarted {
        current_player_id: PlayerId,
        current_player_name: String,
        turn_order: Vec<PlayerId>,
        player_positions: Vec<PlayerPosition>,
        valid_moves: Vec<Position>,
    },
    /// 发牌（私有）
    CardsDealt { cards: Vec<Card> },
    /// 手牌查询结果（私有）
    MyCards { cards: Vec<Card> },
    /// 轮到下一位玩家
    TurnUpdate {
        player_id: PlayerId,
        player_name: String,
        phase: GamePhase,
        player_positions: Vec<PlayerPosition>,
        valid_moves: Vec<Position>,
        in_room: bool,
        current_location: Position,
        /// 被别人的推测移入房间，可以不移动直接推测
        can_suggest_in_place: bool,
    },
    /// 同一回合内阶段变化
    PhaseChanged { player_id: PlayerId, phase: GamePhase },
    /// 移动完成
    MoveUpdate {
        player_id: PlayerId,
        player_name: String,
        old_position: Position,
        new_position: Position,
        can_suggest: bool,
        player_positions: Vec<PlayerPosition>,
    },
    /// 推测已提出
    SuggestionMade {
        suggestion_idx: usize,
        player_id: PlayerId,
        player_name: String,
        suspect: Suspect,
        weapon: Weapon,
        room: Room,
        next_to_disprove: Option<PlayerId>,
        is_suggested_character: bool,
        player_positions: Vec<PlayerPosition>,
    },
    /// 轮到下一位候选人反驳
    DisproveRequested {
        suggestion_idx: usize,
        player_id: PlayerId,
        is_suggested_character: bool,
    },
    /// 出示的牌（只发给推测者）
    CardShown {
        suggestion_idx: usize,
        shown_by: PlayerId,
        shown_by_name: String,
        card: Card,
    },
    /// 某玩家无法反驳
    CannotDisprove {
        suggestion_idx: usize,
        player_id: PlayerId,
        player_name: String,
        is_suggested_character: bool,
    },
    /// 推测被反驳（不含牌面）
    SuggestionDisproved {
        suggestion_idx: usize,
        disproved_by: PlayerId,
        disproved_by_name: String,
    },
    /// 无人能反驳
    SuggestionNotDisproved { suggestion_idx: usize },
    /// 指控结果
    AccusationResult {
        player_id: PlayerId,
        player_name: String,
        suspect: Suspect,
        weapon: Weapon,
        room: Room,
        is_correct: bool,
    },
    /// 游戏结束
    GameOver {
        winner_id: PlayerId,
        winner_name: String,
        solution: Solution,
    },
    /// 当前局面（重新加入或查询时下发）
    GameSnapshot {
        lobby_id: LobbyId,
        state: LobbyState,
        phase: Option<GamePhase>,
        current_player_id: Option<PlayerId>,
        pending_disprover: Option<PlayerId>,
        turn_order: Vec<PlayerId>,
        players: Vec<PlayerInfo>,
        player_positions: Vec<PlayerPosition>,
        suggestions: Vec<SuggestionRecord>,
        accusations: Vec<AccusationRecord>,
        winner_id: Option<PlayerId>,
    },

    // === 心跳 ===
    Pong,

    // === 错误 ===
    Error { code: ErrorCode, message: String },
}

impl From<GameError> for ServerMessage {
    fn from(err: GameError) -> Self {
        ServerMessage::Error {
            code: err.code(),
            message: err.to_string(),
        }
    }
}

/// 错误码定义
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u16)]
pub enum ErrorCode {
    // === 大厅相关 (1xx) ===
    LobbyNotFound = 100,
    LobbyFull = 101,
    GameInProgress = 102,
    NotHost = 103,
    NotEnoughPlayers = 104,
    CharacterAlreadySelected = 105,
    CharacterNotSelected = 106,

    // === 对局相关 (2xx) ===
    NotYourTurn = 200,
    InvalidMove = 201,
    SuggestionError = 202,
    AccusationError = 203,
    DisproveError = 204,
    GameNotStarted = 205,
    GameAlreadyOver = 206,

    // === 玩家相关 (3xx) ===
    PlayerNotFound = 300,
    PlayerNotInLobby = 301,
    InvalidName = 302,
    InvalidToken = 303,
    PlayerAlreadyConnected = 304,

    // === 协议相关 (4xx) ===
    InvalidMessage = 400,

    // === 系统相关 (5xx) ===
    InternalError = 500,
    Timeout = 501,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_wire_format() {
        let json = r#"{"event":"make_suggestion","data":{"lobby_id":"ABCD12","player_id":7,"suspect":"Miss Scarlet","weapon":"Knife"}}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        assert_eq!(
            msg,
            ClientMessage::MakeSuggestion {
                lobby_id: "ABCD12".to_string(),
                player_id: 7,
                suspect: "Miss Scarlet".to_string(),
                weapon: "Knife".to_string(),
            }
        );
    }

    #[test]
    fn test_move_field_name() {
        let json = r#"{"event":"make_move","data":{"lobby_id":"ABCD12","player_id":1,"move":"hall_lounge"}}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        match msg {
            ClientMessage::MakeMove { destination, .. } => assert_eq!(
                destination.parse::<Position>().unwrap(),
                Position::Hallway(crate::Hallway::HallLounge)
            ),
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn test_unknown_names_still_decode() {
        let json = r#"{"event":"make_suggestion","data":{"lobby_id":"ABCD12","player_id":7,"suspect":"Butler","weapon":"Knife"}}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        assert!(matches!(msg, ClientMessage::MakeSuggestion { ref suspect, .. } if suspect == "Butler"));
    }

    #[test]
    fn test_optional_fields() {
        let json = r#"{"event":"disprove_suggestion","data":{"lobby_id":"X","player_id":2,"suggestion_idx":0}}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        assert!(matches!(msg, ClientMessage::DisproveSuggestion { card_shown: None, .. }));

        let json = r#"{"event":"join_lobby","data":{"lobby_id":"ABCD12","name":"Bob"}}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        assert!(matches!(msg, ClientMessage::JoinLobby { player_id: None, token: None, .. }));

        let msg: ClientMessage = serde_json::from_str(r#"{"event":"ping"}"#).unwrap();
        assert_eq!(msg, ClientMessage::Ping);
    }

    #[test]
    fn test_error_code_names() {
        let msg = ServerMessage::from(GameError::NotHost);
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["event"], "error");
        assert_eq!(value["data"]["code"], "NOT_HOST");
    }

    #[test]
    fn test_disproved_broadcast_has_no_card() {
        let msg = ServerMessage::SuggestionDisproved {
            suggestion_idx: 0,
            disproved_by: 2,
            disproved_by_name: "Q".to_string(),
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert!(value["data"].get("card").is_none());
    }

    #[test]
    fn test_target() {
        let msg = ClientMessage::GetMyCards {
            lobby_id: "ABCD12".to_string(),
            player_id: 3,
        };
        assert_eq!(msg.target(), Some(("ABCD12", Some(3))));
        assert_eq!(ClientMessage::Ping.target(), None);
    }
}
