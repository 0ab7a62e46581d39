//! 对局历史记录
//!
//! 推测与指控的公开记录。推测记录从不包含被出示的牌，
//! 可以安全地广播给所有玩家。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::card::{Room, Suspect, Weapon};
use crate::message::PlayerId;

/// 推测记录（公开部分）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestionRecord {
    /// 本局内单调递增的编号
    pub index: usize,
    pub suggester: PlayerId,
    pub suspect: Suspect,
    pub weapon: Weapon,
    pub room: Room,
    /// 反驳者；`None` 且已结束表示无人能反驳
    pub disproved_by: Option<PlayerId>,
    /// 反驳流程是否已结束
    pub resolved: bool,
    pub made_at: DateTime<Utc>,
}

/// 指控记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccusationRecord {
    pub player: PlayerId,
    pub suspect: Suspect,
    pub weapon: Weapon,
    pub room: Room,
    pub is_correct: bool,
    pub made_at: DateTime<Utc>,
}

impl AccusationRecord {
    pub fn new(player: PlayerId, suspect: Suspect, weapon: Weapon, room: Room, is_correct: bool) -> Self {
        Self {
            player,
            suspect,
            weapon,
            room,
            is_correct,
            made_at: Utc::now(),
        }
    }
}
