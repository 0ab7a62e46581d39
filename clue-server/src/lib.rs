//! Clue-Less 服务端
//!
//! 包含:
//! - 大厅系统
//! - 对局状态机（移动、推测、反驳、指控）
//! - 发牌
//! - 回合计时
//! - 消息分发与连接管理

pub mod clock;
pub mod config;
pub mod deck;
pub mod disprove;
pub mod game;
pub mod lobby;
pub mod logging;
pub mod player;
pub mod server;

pub use clock::{ClockKind, TurnClock};
pub use config::{Args, ServerConfig};
pub use deck::{Deal, Deck};
pub use disprove::{DisproveRound, DisproveTimeoutPolicy};
pub use game::{Audience, GameEvent, GameRules, GameState, Seat};
pub use lobby::{LeaveOutcome, Lobby, LobbyManager};
pub use logging::setup_logging;
pub use player::Player;
pub use server::{MessageHandler, Outlet, ServerState, Session};
