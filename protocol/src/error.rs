//! 错误类型定义

use thiserror::Error;

use crate::board::Position;
use crate::card::{Card, Suspect};
use crate::message::{ErrorCode, PlayerId};

/// 大厅与规则错误（均可由客户端修正后重试）
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GameError {
    // === 大厅 ===
    /// 大厅不存在
    #[error("Lobby not found: {0}")]
    LobbyNotFound(String),

    /// 大厅已满
    #[error("This lobby already has {current} out of {max} players")]
    LobbyFull { current: usize, max: usize },

    /// 游戏已开始
    #[error("Game already in progress")]
    GameInProgress,

    /// 只有房主可以开始游戏
    #[error("Only the host can start the game")]
    NotHost,

    /// 人数不足
    #[error("Not enough players to start (min {min}, have {actual})")]
    NotEnoughPlayers { min: usize, actual: usize },

    /// 玩家人数不在允许范围内
    #[error("Player count {0} is outside the allowed range")]
    PlayerCount(usize),

    /// 角色已被选择
    #[error("Character {0} already selected")]
    CharacterAlreadySelected(Suspect),

    /// 有玩家尚未选择角色
    #[error("Player {0} has not selected a character")]
    CharacterNotSelected(PlayerId),

    // === 玩家 ===
    /// 玩家不存在
    #[error("Player not found: {0}")]
    PlayerNotFound(PlayerId),

    /// 玩家不在该大厅
    #[error("Player {0} is not in this lobby")]
    PlayerNotInLobby(PlayerId),

    /// 无效昵称
    #[error("Invalid name: {0}")]
    InvalidName(&'static str),

    /// 连接已绑定到某个玩家
    #[error("This connection already joined a lobby; leave it first")]
    AlreadyInLobby,

    /// 无法识别的名称
    #[error("Unknown {kind}: {name}")]
    UnknownName { kind: &'static str, name: String },

    /// 重新加入时凭证不符
    #[error("Session token does not match player {0}")]
    InvalidToken(PlayerId),

    /// 该座位仍有连接在使用
    #[error("Player {0} is already connected")]
    AlreadyConnected(PlayerId),

    // === 对局 ===
    /// 游戏未开始
    #[error("Game has not started")]
    GameNotStarted,

    /// 游戏已结束
    #[error("Game is already over")]
    GameOver,

    /// 目标位置无法识别
    #[error("Invalid move: {0}")]
    InvalidDestination(String),

    /// 推测中的名称无法识别
    #[error("Invalid suggestion: {0}")]
    InvalidSuggestion(String),

    /// 指控中的名称无法识别
    #[error("Invalid accusation: {0}")]
    InvalidAccusation(String),

    /// 出示的牌无法识别
    #[error("Invalid card: {0}")]
    InvalidCard(String),

    /// 不是你的回合
    #[error("Not your turn")]
    NotYourTurn,

    /// 当前阶段不能移动
    #[error("No move expected right now")]
    MoveNotAllowed,

    /// 非法移动
    #[error("Invalid move from {from} to {to}")]
    IllegalMove { from: Position, to: Position },

    /// 还有可走位置时不能跳过移动
    #[error("You must move while a valid move exists")]
    MustMove,

    /// 当前阶段不能提出推测
    #[error("A suggestion is not allowed right now")]
    SuggestionNotAllowed,

    /// 推测必须在房间内进行
    #[error("You must be in a room to make a suggestion")]
    NotInRoom,

    /// 当前阶段不能指控
    #[error("An accusation is not allowed right now")]
    AccusationNotAllowed,

    /// 已因错误指控失去指控资格
    #[error("You made a wrong accusation and can no longer accuse")]
    EliminatedFromAccusing,

    /// 没有待反驳的推测
    #[error("No suggestion is waiting to be disproved")]
    NoDisprovePending,

    /// 推测编号不匹配
    #[error("Suggestion {got} is not the active suggestion ({expected})")]
    StaleSuggestion { expected: usize, got: usize },

    /// 出示的牌不在手中
    #[error("You do not hold {0}")]
    CardNotHeld(Card),

    /// 出示的牌与推测无关
    #[error("{0} is not part of the suggestion")]
    CardNotInSuggestion(Card),

    /// 持有匹配的牌时必须出示
    #[error("You hold a matching card and must show one")]
    MustShowCard,

    /// 当前阶段不能跳过
    #[error("Nothing to pass right now")]
    PassNotAllowed,
}

impl GameError {
    /// 对外错误码
    pub fn code(&self) -> ErrorCode {
        match self {
            GameError::LobbyNotFound(_) => ErrorCode::LobbyNotFound,
            GameError::LobbyFull { .. } => ErrorCode::LobbyFull,
            GameError::GameInProgress => ErrorCode::GameInProgress,
            GameError::NotHost => ErrorCode::NotHost,
            GameError::NotEnoughPlayers { .. } | GameError::PlayerCount(_) => {
                ErrorCode::NotEnoughPlayers
            }
            GameError::CharacterAlreadySelected(_) => ErrorCode::CharacterAlreadySelected,
            GameError::CharacterNotSelected(_) => ErrorCode::CharacterNotSelected,
            GameError::PlayerNotFound(_) => ErrorCode::PlayerNotFound,
            GameError::PlayerNotInLobby(_) => ErrorCode::PlayerNotInLobby,
            GameError::AlreadyInLobby => ErrorCode::InvalidMessage,
            GameError::InvalidToken(_) => ErrorCode::InvalidToken,
            GameError::AlreadyConnected(_) => ErrorCode::PlayerAlreadyConnected,
            GameError::InvalidName(_) | GameError::UnknownName { .. } => ErrorCode::InvalidName,
            GameError::GameNotStarted => ErrorCode::GameNotStarted,
            GameError::GameOver => ErrorCode::GameAlreadyOver,
            GameError::NotYourTurn => ErrorCode::NotYourTurn,
            GameError::MoveNotAllowed
            | GameError::IllegalMove { .. }
            | GameError::MustMove
            | GameError::PassNotAllowed
            | GameError::InvalidDestination(_) => ErrorCode::InvalidMove,
            GameError::SuggestionNotAllowed
            | GameError::NotInRoom
            | GameError::InvalidSuggestion(_) => ErrorCode::SuggestionError,
            GameError::AccusationNotAllowed
            | GameError::EliminatedFromAccusing
            | GameError::InvalidAccusation(_) => ErrorCode::AccusationError,
            GameError::NoDisprovePending
            | GameError::InvalidCard(_)
            | GameError::StaleSuggestion { .. }
            | GameError::CardNotHeld(_)
            | GameError::CardNotInSuggestion(_)
            | GameError::MustShowCard => ErrorCode::DisproveError,
        }
    }
}

/// 协议错误类型
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// IO 错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON 序列化错误
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// 协议版本不匹配
    #[error("Protocol version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: u8, actual: u8 },

    /// 帧大小超限
    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// 连接超时
    #[error("Connection timeout")]
    ConnectionTimeout,

    /// 连接已关闭
    #[error("Connection closed")]
    ConnectionClosed,
}

/// 协议操作结果类型
pub type Result<T> = std::result::Result<T, ProtocolError>;
