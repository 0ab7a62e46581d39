//! 回合计时
//!
//! 记录当前等待的玩家及其截止时间。使用 `tokio::time::Instant`，
//! 测试中可以通过暂停的时钟推进时间。

use std::time::Duration;

use tokio::time::Instant;

use protocol::PlayerId;

/// 等待的动作类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockKind {
    /// 当前回合玩家的行动
    Turn,
    /// 反驳候选人的回应
    Disprove,
}

/// 回合计时器
#[derive(Debug, Clone)]
pub struct TurnClock {
    /// 回合行动时限，`None` 表示不限时
    turn_limit: Option<Duration>,
    /// 反驳时限
    disprove_limit: Option<Duration>,
    /// 当前等待的玩家、类型与截止时间
    deadline: Option<(PlayerId, ClockKind, Instant)>,
}

impl TurnClock {
    /// 时限为 0 表示不限时
    pub fn new(turn_limit: Duration, disprove_limit: Duration) -> Self {
        let non_zero = |d: Duration| (!d.is_zero()).then_some(d);
        Self {
            turn_limit: non_zero(turn_limit),
            disprove_limit: non_zero(disprove_limit),
            deadline: None,
        }
    }

    /// 为新的等待对象重新开始计时
    pub fn restart(&mut self, actor: PlayerId, kind: ClockKind) {
        let limit = match kind {
            ClockKind::Turn => self.turn_limit,
            ClockKind::Disprove => self.disprove_limit,
        };
        self.deadline = limit.map(|limit| (actor, kind, Instant::now() + limit));
    }

    /// 停止计时（游戏结束）
    pub fn stop(&mut self) {
        self.deadline = None;
    }

    /// 已超时的等待对象
    pub fn expired(&self, now: Instant) -> Option<(PlayerId, ClockKind)> {
        match self.deadline {
            Some((actor, kind, at)) if now >= at => Some((actor, kind)),
            _ => None,
        }
    }

    /// 剩余时间
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|(_, _, at)| at.saturating_duration_since(Instant::now()))
    }

    pub fn is_running(&self) -> bool {
        self.deadline.is_some()
    }
}

impl Default for TurnClock {
    fn default() -> Self {
        Self::new(
            Duration::from_secs(protocol::TURN_TIMEOUT_SECS),
            Duration::from_secs(protocol::DISPROVE_TIMEOUT_SECS),
        )
    }
}
