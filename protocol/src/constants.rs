//! 协议常量

use std::time::Duration;

// === 规则 ===

/// 开局所需最少玩家
pub const MIN_PLAYERS: usize = 3;

/// 六名嫌疑人，每人一个座位
pub const MAX_PLAYERS: usize = 6;

/// 6 嫌疑人 + 6 凶器 + 9 房间
pub const DECK_SIZE: usize = 21;

// === 大厅 ===

pub const LOBBY_ID_LEN: usize = 6;

/// 昵称最大字符数
pub const MAX_NICKNAME_LEN: usize = 20;

// === 计时（秒，0 表示不限时） ===

pub const DISPROVE_TIMEOUT_SECS: u64 = 60;

pub const TURN_TIMEOUT_SECS: u64 = 180;

/// 对局中所有玩家离线超过此时间，大厅被移除
pub const ABANDONED_LOBBY_SECS: u64 = 300;

// === 传输 ===

/// 帧头中的版本号，JSON 帧格式为第 2 版
pub const PROTOCOL_VERSION: u8 = 2;

pub const MAX_FRAME_SIZE: usize = 64 * 1024;

pub const MAX_CONNECTIONS: usize = 100;

/// 超过此时间未收到任何消息则断开（客户端应定期发送 ping）
pub const HEARTBEAT_TIMEOUT_SECS: u64 = 30;

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
