//! 发牌与谜底生成

use std::collections::HashMap;

use rand::seq::SliceRandom;
use rand::Rng;

use protocol::{
    Card, GameError, PlayerId, Room, Solution, Suspect, Weapon, MAX_PLAYERS, MIN_PLAYERS,
};

/// 一局的发牌结果
#[derive(Debug, Clone)]
pub struct Deal {
    pub solution: Solution,
    /// 玩家 -> 手牌（按发牌顺序）
    pub hands: HashMap<PlayerId, Vec<Card>>,
}

/// 牌堆
pub struct Deck;

impl Deck {
    /// 随机抽取谜底，其余 18 张洗牌后按座位顺序轮流发出
    pub fn deal<R: Rng + ?Sized>(players: &[PlayerId], rng: &mut R) -> Result<Deal, GameError> {
        Self::check_player_count(players.len())?;

        let suspect = Suspect::ALL[rng.gen_range(0..Suspect::ALL.len())];
        let weapon = Weapon::ALL[rng.gen_range(0..Weapon::ALL.len())];
        let room = Room::ALL[rng.gen_range(0..Room::ALL.len())];

        Self::deal_with_solution(Solution::new(suspect, weapon, room), players, rng)
    }

    /// 给定谜底，发出剩余的牌
    pub fn deal_with_solution<R: Rng + ?Sized>(
        solution: Solution,
        players: &[PlayerId],
        rng: &mut R,
    ) -> Result<Deal, GameError> {
        Self::check_player_count(players.len())?;

        let secret = solution.cards();
        let mut remaining: Vec<Card> = Card::full_deck()
            .into_iter()
            .filter(|card| !secret.contains(card))
            .collect();
        remaining.shuffle(rng);

        let mut hands: HashMap<PlayerId, Vec<Card>> =
            players.iter().map(|&id| (id, Vec::new())).collect();
        for (i, card) in remaining.into_iter().enumerate() {
            let owner = players[i % players.len()];
            if let Some(hand) = hands.get_mut(&owner) {
                hand.push(card);
            }
        }

        Ok(Deal { solution, hands })
    }

    fn check_player_count(count: usize) -> Result<(), GameError> {
        if (MIN_PLAYERS..=MAX_PLAYERS).contains(&count) {
            Ok(())
        } else {
            Err(GameError::PlayerCount(count))
        }
    }
}
