//! 推测反驳流程
//!
//! 从推测者的下一个座位开始依次询问，第一个持有匹配牌的玩家
//! 必须私下向推测者出示其中一张。

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use protocol::{Card, GameError, PlayerId, Room, Suspect, Weapon};

/// 反驳超时的处理方式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisproveTimeoutPolicy {
    /// 代为出示第一张匹配的牌（嫌疑人、凶器、房间顺序）
    #[default]
    RevealFirstMatch,
    /// 视为无法反驳
    CannotDisprove,
}

/// 反驳询问顺序：`(i+1)%n, (i+2)%n, …, (i+n-1)%n`
pub fn disprove_order(suggester_seat: usize, n: usize) -> Vec<usize> {
    (1..n).map(|offset| (suggester_seat + offset) % n).collect()
}

/// 候选人的回应
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisproveResponse {
    /// 出示了一张牌，流程结束
    Shown(Card),
    /// 无法反驳，继续询问下一位
    Cannot,
}

/// 正在进行的反驳轮次
#[derive(Debug, Clone)]
pub struct DisproveRound {
    /// 推测编号
    pub suggestion: usize,
    pub suggester: PlayerId,
    pub suspect: Suspect,
    pub weapon: Weapon,
    pub room: Room,
    /// 尚未询问的候选人
    queue: VecDeque<PlayerId>,
    /// 正在等待回应的候选人
    pending: Option<PlayerId>,
}

impl DisproveRound {
    pub fn new(
        suggestion: usize,
        suggester: PlayerId,
        (suspect, weapon, room): (Suspect, Weapon, Room),
        candidates: Vec<PlayerId>,
    ) -> Self {
        Self {
            suggestion,
            suggester,
            suspect,
            weapon,
            room,
            queue: candidates.into(),
            pending: None,
        }
    }

    /// 推测涉及的三张牌
    pub fn cards(&self) -> [Card; 3] {
        [self.suspect.into(), self.weapon.into(), self.room.into()]
    }

    /// 手牌中与推测匹配的牌（按嫌疑人、凶器、房间顺序）
    pub fn matching(&self, hand: &[Card]) -> Vec<Card> {
        self.cards()
            .into_iter()
            .filter(|card| hand.contains(card))
            .collect()
    }

    pub fn pending(&self) -> Option<PlayerId> {
        self.pending
    }

    /// 询问下一位候选人；没有候选人时返回 `None`
    pub fn advance(&mut self) -> Option<PlayerId> {
        self.pending = self.queue.pop_front();
        self.pending
    }

    /// 校验并记录候选人的回应。校验失败时不推进，同一候选人需重新回应。
    pub fn respond(
        &mut self,
        player: PlayerId,
        shown: Option<Card>,
        hand: &[Card],
    ) -> Result<DisproveResponse, GameError> {
        if self.pending != Some(player) {
            return Err(GameError::NotYourTurn);
        }

        let matching = self.matching(hand);
        match shown {
            Some(card) => {
                if !self.cards().contains(&card) {
                    return Err(GameError::CardNotInSuggestion(card));
                }
                if !hand.contains(&card) {
                    return Err(GameError::CardNotHeld(card));
                }
                self.pending = None;
                self.queue.clear();
                Ok(DisproveResponse::Shown(card))
            }
            None if !matching.is_empty() => Err(GameError::MustShowCard),
            None => Ok(DisproveResponse::Cannot),
        }
    }

    /// 超时时代替候选人给出的回应
    pub fn timeout_response(&self, hand: &[Card], policy: DisproveTimeoutPolicy) -> Option<Card> {
        match policy {
            DisproveTimeoutPolicy::RevealFirstMatch => self.matching(hand).first().copied(),
            DisproveTimeoutPolicy::CannotDisprove => None,
        }
    }

    /// 超时强制结算：不做持牌校验
    pub fn force(&mut self, shown: Option<Card>) -> DisproveResponse {
        match shown {
            Some(card) => {
                self.pending = None;
                self.queue.clear();
                DisproveResponse::Shown(card)
            }
            None => DisproveResponse::Cannot,
        }
    }
}
