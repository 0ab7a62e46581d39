//! 妙探寻凶（Clue-Less）共享协议库
//!
//! 包含:
//! - 嫌疑人、凶器、房间卡牌与谜底
//! - 棋盘拓扑、位置与角色棋子
//! - 消息类型定义 (ClientMessage, ServerMessage)
//! - 推测/指控的公开记录
//! - 传输层抽象 (Connector, Connection, Listener traits)
//! - 帧编解码 (FrameReader, FrameWriter)

mod board;
mod card;
mod constants;
mod error;
mod message;
mod record;
mod transport;

pub use board::{BoardGraph, Hallway, Position, Tokens};
pub use card::{Card, Room, Solution, Suspect, Weapon};
pub use constants::*;
pub use error::{GameError, ProtocolError, Result};
pub use message::{
    CharacterInfo, ClientMessage, ErrorCode, GamePhase, LobbyId, LobbyState, PlayerId,
    PlayerInfo, PlayerPosition, ServerMessage,
};
pub use record::{AccusationRecord, SuggestionRecord};
pub use transport::{
    Connection, Connector, FrameHeader, FrameReader, FrameWriter, Listener, TcpConnection, TcpConnector,
    TcpListener,
};
