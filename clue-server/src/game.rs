//! 对局控制
//!
//! `GameState` 是单个大厅的回合状态机：移动、推测、反驳、指控。
//! 每个操作要么返回按发生顺序排列的事件列表，要么返回错误且不改变状态。

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use tracing::{debug, info};

use protocol::{
    AccusationRecord, Card, GameError, GamePhase, PlayerId, Position, Room, Solution,
    SuggestionRecord, Suspect, Tokens, Weapon,
};

use crate::clock::ClockKind;
use crate::deck::Deal;
use crate::disprove::{disprove_order, DisproveResponse, DisproveRound, DisproveTimeoutPolicy};

/// 对局规则选项
#[derive(Debug, Clone, Copy, Default)]
pub struct GameRules {
    /// 由服务端代替没有匹配牌的候选人声明无法反驳
    pub auto_skip_non_holders: bool,
    /// 反驳超时的处理方式
    pub disprove_timeout_policy: DisproveTimeoutPolicy,
}

/// 座位：玩家与其角色
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Seat {
    pub player: PlayerId,
    pub character: Suspect,
}

/// 事件的接收者
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    /// 大厅内所有玩家
    Lobby,
    /// 仅某一玩家
    Player(PlayerId),
}

/// 状态机产生的事件
#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    Moved {
        player: PlayerId,
        from: Position,
        to: Position,
        can_suggest: bool,
    },
    SuggestionMade {
        index: usize,
        player: PlayerId,
        suspect: Suspect,
        weapon: Weapon,
        room: Room,
        next_to_disprove: Option<PlayerId>,
    },
    DisproveRequested {
        index: usize,
        player: PlayerId,
        is_suggested_character: bool,
    },
    CannotDisprove {
        index: usize,
        player: PlayerId,
        is_suggested_character: bool,
    },
    /// 私有：只发给推测者
    CardShown {
        index: usize,
        suggester: PlayerId,
        by: PlayerId,
        card: Card,
    },
    SuggestionDisproved {
        index: usize,
        by: PlayerId,
    },
    SuggestionNotDisproved {
        index: usize,
    },
    PhaseChanged {
        player: PlayerId,
        phase: GamePhase,
    },
    TurnStarted {
        player: PlayerId,
    },
    Accused {
        player: PlayerId,
        suspect: Suspect,
        weapon: Weapon,
        room: Room,
        is_correct: bool,
    },
    GameWon {
        winner: PlayerId,
        solution: Solution,
    },
}

impl GameEvent {
    pub fn audience(&self) -> Audience {
        match self {
            GameEvent::CardShown { suggester, .. } => Audience::Player(*suggester),
            _ => Audience::Lobby,
        }
    }
}

/// 单局游戏状态
#[derive(Debug, Clone)]
pub struct GameState {
    /// 座位顺序即回合顺序，开局后固定
    seats: Vec<Seat>,
    current: usize,
    phase: GamePhase,
    tokens: Tokens,
    hands: HashMap<PlayerId, Vec<Card>>,
    solution: Solution,
    suggestions: Vec<SuggestionRecord>,
    accusations: Vec<AccusationRecord>,
    eliminated: HashSet<PlayerId>,
    /// 自上个回合以来被别人的推测移入房间的角色
    moved_by_suggestion: HashSet<Suspect>,
    winner: Option<PlayerId>,
    round: Option<DisproveRound>,
    rules: GameRules,
}

type Events = Vec<GameEvent>;

impl GameState {
    /// 按给定座位顺序开局，第一个座位先行动
    pub fn new(seats: Vec<Seat>, deal: Deal, rules: GameRules) -> Self {
        Self {
            seats,
            current: 0,
            phase: GamePhase::AwaitingMove,
            tokens: Tokens::initial(),
            hands: deal.hands,
            solution: deal.solution,
            suggestions: Vec::new(),
            accusations: Vec::new(),
            eliminated: HashSet::new(),
            moved_by_suggestion: HashSet::new(),
            winner: None,
            round: None,
            rules,
        }
    }

    // ========================================================================
    // 查询
    // ========================================================================

    pub fn phase(&self) -> GamePhase {
        self.phase
    }

    pub fn current_player(&self) -> PlayerId {
        self.seats[self.current].player
    }

    pub fn turn_order(&self) -> Vec<PlayerId> {
        self.seats.iter().map(|s| s.player).collect()
    }

    pub fn seats(&self) -> &[Seat] {
        &self.seats
    }

    pub fn tokens(&self) -> &Tokens {
        &self.tokens
    }

    pub fn winner(&self) -> Option<PlayerId> {
        self.winner
    }

    pub fn is_finished(&self) -> bool {
        self.phase == GamePhase::Finished
    }

    /// 谜底仅在游戏结束后可见
    pub fn revealed_solution(&self) -> Option<Solution> {
        self.is_finished().then_some(self.solution)
    }

    pub fn suggestions(&self) -> &[SuggestionRecord] {
        &self.suggestions
    }

    pub fn accusations(&self) -> &[AccusationRecord] {
        &self.accusations
    }

    pub fn is_eliminated(&self, player: PlayerId) -> bool {
        self.eliminated.contains(&player)
    }

    /// 正在等待反驳的候选人
    pub fn pending_disprover(&self) -> Option<PlayerId> {
        self.round.as_ref().and_then(DisproveRound::pending)
    }

    /// 当前需要行动的玩家及计时类型
    pub fn pending_actor(&self) -> Option<(PlayerId, ClockKind)> {
        match self.phase {
            GamePhase::Finished => None,
            GamePhase::AwaitingDisproveResponse => {
                self.pending_disprover().map(|p| (p, ClockKind::Disprove))
            }
            _ => Some((self.current_player(), ClockKind::Turn)),
        }
    }

    pub fn character_of(&self, player: PlayerId) -> Option<Suspect> {
        self.seats
            .iter()
            .find(|s| s.player == player)
            .map(|s| s.character)
    }

    pub fn player_for(&self, character: Suspect) -> Option<PlayerId> {
        self.seats
            .iter()
            .find(|s| s.character == character)
            .map(|s| s.player)
    }

    pub fn position_of(&self, player: PlayerId) -> Option<Position> {
        self.character_of(player).map(|c| self.tokens.get(c))
    }

    /// 玩家手牌（纯读取，多次调用结果相同）
    pub fn hand_of(&self, player: PlayerId) -> Result<&[Card], GameError> {
        self.hands
            .get(&player)
            .map(Vec::as_slice)
            .ok_or(GameError::PlayerNotInLobby(player))
    }

    /// 玩家当前可走的位置
    pub fn valid_moves_for(&self, player: PlayerId) -> Vec<Position> {
        self.character_of(player)
            .map(|c| self.tokens.valid_moves(c))
            .unwrap_or_default()
    }

    /// 被别人的推测移入房间后，可以不移动直接推测
    pub fn can_suggest_in_place(&self, player: PlayerId) -> bool {
        self.phase == GamePhase::AwaitingMove
            && self.current_player() == player
            && self.character_of(player).is_some_and(|c| {
                self.moved_by_suggestion.contains(&c) && self.tokens.get(c).room().is_some()
            })
    }

    // ========================================================================
    // 操作
    // ========================================================================

    /// 移动到相邻位置
    pub fn make_move(&mut self, player: PlayerId, to: Position) -> Result<Events, GameError> {
        let character = self.check_turn(player)?;
        if self.phase != GamePhase::AwaitingMove {
            return Err(GameError::MoveNotAllowed);
        }

        let from = self.tokens.get(character);
        if !self.tokens.valid_moves(character).contains(&to) {
            return Err(GameError::IllegalMove { from, to });
        }

        self.tokens.set(character, to);
        self.moved_by_suggestion.remove(&character);
        debug!(player, %from, %to, "移动");

        let can_suggest = to.room().is_some();
        let mut events = vec![GameEvent::Moved {
            player,
            from,
            to,
            can_suggest,
        }];

        if can_suggest {
            self.set_phase(GamePhase::AwaitingSuggestionOrPass, &mut events);
        } else {
            self.end_turn(&mut events);
        }
        Ok(events)
    }

    /// 在当前所在房间提出推测
    pub fn suggest(
        &mut self,
        player: PlayerId,
        suspect: Suspect,
        weapon: Weapon,
    ) -> Result<Events, GameError> {
        let character = self.check_turn(player)?;
        let allowed = match self.phase {
            GamePhase::AwaitingSuggestionOrPass => true,
            GamePhase::AwaitingMove => self.can_suggest_in_place(player),
            _ => false,
        };
        if !allowed {
            return Err(GameError::SuggestionNotAllowed);
        }
        let room = self
            .tokens
            .get(character)
            .room()
            .ok_or(GameError::NotInRoom)?;

        // 被点名的角色移到推测的房间
        let destination = Position::Room(room);
        if self.tokens.get(suspect) != destination {
            self.tokens.set(suspect, destination);
            if suspect != character && self.player_for(suspect).is_some() {
                self.moved_by_suggestion.insert(suspect);
            }
        }
        self.moved_by_suggestion.remove(&character);

        let index = self.suggestions.len();
        self.suggestions.push(SuggestionRecord {
            index,
            suggester: player,
            suspect,
            weapon,
            room,
            disproved_by: None,
            resolved: false,
            made_at: Utc::now(),
        });

        let n = self.seats.len();
        let candidates: Vec<PlayerId> = disprove_order(self.current, n)
            .into_iter()
            .map(|seat| self.seats[seat].player)
            .collect();
        debug!(player, index, %suspect, %weapon, %room, ?candidates, "推测");

        let mut events = vec![GameEvent::SuggestionMade {
            index,
            player,
            suspect,
            weapon,
            room,
            next_to_disprove: candidates.first().copied(),
        }];

        self.round = Some(DisproveRound::new(
            index,
            player,
            (suspect, weapon, room),
            candidates,
        ));
        self.phase = GamePhase::AwaitingDisproveResponse;
        self.advance_disprove(&mut events);
        Ok(events)
    }

    /// 处理候选人的反驳回应
    pub fn respond_disprove(
        &mut self,
        player: PlayerId,
        suggestion_idx: usize,
        card: Option<Card>,
    ) -> Result<Events, GameError> {
        self.check_active()?;
        let round = self.round.as_mut().ok_or(GameError::NoDisprovePending)?;
        if round.suggestion != suggestion_idx {
            return Err(GameError::StaleSuggestion {
                expected: round.suggestion,
                got: suggestion_idx,
            });
        }
        let hand = self
            .hands
            .get(&player)
            .ok_or(GameError::PlayerNotInLobby(player))?;

        let response = round.respond(player, card, hand)?;
        let mut events = Vec::new();
        self.apply_disprove(player, response, &mut events);
        Ok(events)
    }

    /// 指控
    pub fn accuse(
        &mut self,
        player: PlayerId,
        suspect: Suspect,
        weapon: Weapon,
        room: Room,
    ) -> Result<Events, GameError> {
        self.check_turn(player)?;
        if self.phase == GamePhase::AwaitingDisproveResponse {
            return Err(GameError::AccusationNotAllowed);
        }
        if self.is_eliminated(player) {
            return Err(GameError::EliminatedFromAccusing);
        }

        let is_correct = self.solution.matches(suspect, weapon, room);
        self.accusations.push(AccusationRecord::new(
            player, suspect, weapon, room, is_correct,
        ));
        info!(player, is_correct, "指控");

        let mut events = vec![GameEvent::Accused {
            player,
            suspect,
            weapon,
            room,
            is_correct,
        }];

        if is_correct {
            self.finish(player, &mut events);
            return Ok(events);
        }

        self.eliminated.insert(player);
        let eligible: Vec<PlayerId> = self
            .seats
            .iter()
            .map(|s| s.player)
            .filter(|p| !self.eliminated.contains(p))
            .collect();
        if let [last] = eligible[..] {
            // 只剩一名玩家有资格指控
            self.finish(last, &mut events);
        } else {
            self.end_turn(&mut events);
        }
        Ok(events)
    }

    /// 跳过当前可选步骤
    pub fn pass(&mut self, player: PlayerId) -> Result<Events, GameError> {
        self.check_turn(player)?;
        let mut events = Vec::new();
        match self.phase {
            GamePhase::AwaitingSuggestionOrPass => {
                self.set_phase(GamePhase::AwaitingAccusationOrPass, &mut events);
            }
            GamePhase::AwaitingAccusationOrPass => self.end_turn(&mut events),
            GamePhase::AwaitingMove => {
                if !self.valid_moves_for(player).is_empty() {
                    return Err(GameError::MustMove);
                }
                self.end_turn(&mut events);
            }
            GamePhase::AwaitingDisproveResponse | GamePhase::Finished => {
                return Err(GameError::PassNotAllowed);
            }
        }
        Ok(events)
    }

    /// 等待对象超时：反驳按策略代答，其余情况强制结束回合
    pub fn force_timeout(&mut self) -> Events {
        let mut events = Vec::new();
        match self.phase {
            GamePhase::Finished => {}
            GamePhase::AwaitingDisproveResponse => {
                let Some(round) = self.round.as_mut() else {
                    return events;
                };
                let Some(pending) = round.pending() else {
                    return events;
                };
                let hand = self.hands.get(&pending).map(Vec::as_slice).unwrap_or(&[]);
                let shown = round.timeout_response(hand, self.rules.disprove_timeout_policy);
                let response = round.force(shown);
                self.apply_disprove(pending, response, &mut events);
            }
            _ => self.end_turn(&mut events),
        }
        events
    }

    // ========================================================================
    // 内部
    // ========================================================================

    fn check_active(&self) -> Result<(), GameError> {
        if self.is_finished() {
            Err(GameError::GameOver)
        } else {
            Ok(())
        }
    }

    /// 检查是否轮到该玩家，返回其角色
    fn check_turn(&self, player: PlayerId) -> Result<Suspect, GameError> {
        self.check_active()?;
        let character = self
            .character_of(player)
            .ok_or(GameError::PlayerNotInLobby(player))?;
        if self.current_player() != player {
            return Err(GameError::NotYourTurn);
        }
        Ok(character)
    }

    fn set_phase(&mut self, phase: GamePhase, events: &mut Events) {
        self.phase = phase;
        events.push(GameEvent::PhaseChanged {
            player: self.current_player(),
            phase,
        });
    }

    fn end_turn(&mut self, events: &mut Events) {
        let finished = self.seats[self.current].character;
        self.moved_by_suggestion.remove(&finished);

        self.current = (self.current + 1) % self.seats.len();
        self.phase = GamePhase::AwaitingMove;
        let player = self.current_player();
        debug!(player, "回合开始");
        events.push(GameEvent::TurnStarted { player });
    }

    fn finish(&mut self, winner: PlayerId, events: &mut Events) {
        self.winner = Some(winner);
        self.phase = GamePhase::Finished;
        self.round = None;
        info!(winner, "游戏结束");
        events.push(GameEvent::GameWon {
            winner,
            solution: self.solution,
        });
    }

    /// 询问下一位候选人，直到需要等待回应或无人可问
    fn advance_disprove(&mut self, events: &mut Events) {
        let Some(mut round) = self.round.take() else {
            return;
        };
        let index = round.suggestion;

        loop {
            let Some(candidate) = round.advance() else {
                if let Some(record) = self.suggestions.get_mut(index) {
                    record.resolved = true;
                }
                events.push(GameEvent::SuggestionNotDisproved { index });
                self.set_phase(GamePhase::AwaitingAccusationOrPass, events);
                return;
            };

            let is_suggested_character = self.character_of(candidate) == Some(round.suspect);
            let holds_match = self
                .hands
                .get(&candidate)
                .is_some_and(|hand| !round.matching(hand).is_empty());

            if self.rules.auto_skip_non_holders && !holds_match {
                events.push(GameEvent::CannotDisprove {
                    index,
                    player: candidate,
                    is_suggested_character,
                });
                continue;
            }

            events.push(GameEvent::DisproveRequested {
                index,
                player: candidate,
                is_suggested_character,
            });
            self.round = Some(round);
            return;
        }
    }

    fn apply_disprove(&mut self, player: PlayerId, response: DisproveResponse, events: &mut Events) {
        let Some(round) = self.round.as_ref() else {
            return;
        };
        let index = round.suggestion;
        let suggester = round.suggester;
        let is_suggested_character = self.character_of(player) == Some(round.suspect);

        match response {
            DisproveResponse::Shown(card) => {
                if let Some(record) = self.suggestions.get_mut(index) {
                    record.disproved_by = Some(player);
                    record.resolved = true;
                }
                self.round = None;
                debug!(index, by = player, "推测被反驳");
                events.push(GameEvent::CardShown {
                    index,
                    suggester,
                    by: player,
                    card,
                });
                events.push(GameEvent::SuggestionDisproved { index, by: player });
                self.set_phase(GamePhase::AwaitingAccusationOrPass, events);
            }
            DisproveResponse::Cannot => {
                events.push(GameEvent::CannotDisprove {
                    index,
                    player,
                    is_suggested_character,
                });
                self.advance_disprove(events);
            }
        }
    }
}

#[cfg(test)]
impl GameState {
    /// 直接摆放棋子并设置阶段
    pub(crate) fn place(&mut self, character: Suspect, position: Position, phase: GamePhase) {
        self.tokens.set(character, position);
        self.phase = phase;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::Hallway;

    const P1: PlayerId = 1;
    const P2: PlayerId = 2;
    const P3: PlayerId = 3;

    fn solution() -> Solution {
        Solution::new(Suspect::Plum, Weapon::Rope, Room::Library)
    }

    /// 三人局：P1 Scarlet, P2 Mustard, P3 White
    fn game_with(hands: [Vec<Card>; 3], rules: GameRules) -> GameState {
        let seats = vec![
            Seat { player: P1, character: Suspect::Scarlet },
            Seat { player: P2, character: Suspect::Mustard },
            Seat { player: P3, character: Suspect::White },
        ];
        let [h1, h2, h3] = hands;
        let deal = Deal {
            solution: solution(),
            hands: HashMap::from([(P1, h1), (P2, h2), (P3, h3)]),
        };
        GameState::new(seats, deal, rules)
    }

    fn game() -> GameState {
        game_with([vec![], vec![], vec![]], GameRules::default())
    }

    /// P1 位于厨房，等待推测
    fn p1_in_kitchen(game: &mut GameState) {
        game.tokens.set(Suspect::Scarlet, Position::Room(Room::Kitchen));
        game.phase = GamePhase::AwaitingSuggestionOrPass;
    }

    #[test]
    fn test_initial_state() {
        let game = game();
        assert_eq!(game.turn_order(), vec![P1, P2, P3]);
        assert_eq!(game.current_player(), P1);
        assert_eq!(game.phase(), GamePhase::AwaitingMove);
        assert_eq!(
            game.valid_moves_for(P1),
            vec![Position::Hallway(Hallway::HallLounge)]
        );
        assert_eq!(game.pending_actor(), Some((P1, ClockKind::Turn)));
        assert_eq!(game.revealed_solution(), None);
    }

    #[test]
    fn test_move_into_hallway_ends_turn() {
        let mut game = game();
        let events = game
            .make_move(P1, Position::Hallway(Hallway::HallLounge))
            .unwrap();

        assert_eq!(
            events,
            vec![
                GameEvent::Moved {
                    player: P1,
                    from: Position::Start(Suspect::Scarlet),
                    to: Position::Hallway(Hallway::HallLounge),
                    can_suggest: false,
                },
                GameEvent::TurnStarted { player: P2 },
            ]
        );
        assert_eq!(game.current_player(), P2);
        assert_eq!(game.phase(), GamePhase::AwaitingMove);
    }

    #[test]
    fn test_move_into_room() {
        let mut game = game();
        game.make_move(P1, Position::Hallway(Hallway::HallLounge)).unwrap();
        game.make_move(P2, Position::Hallway(Hallway::LoungeDining)).unwrap();
        game.make_move(P3, Position::Hallway(Hallway::BallroomKitchen)).unwrap();

        let events = game.make_move(P1, Position::Room(Room::Lounge)).unwrap();
        assert!(matches!(
            events[0],
            GameEvent::Moved { can_suggest: true, .. }
        ));
        assert_eq!(
            events[1],
            GameEvent::PhaseChanged {
                player: P1,
                phase: GamePhase::AwaitingSuggestionOrPass
            }
        );
        assert_eq!(game.current_player(), P1);

        // 同一回合不能再次移动
        assert_eq!(
            game.make_move(P1, Position::Hallway(Hallway::HallLounge)),
            Err(GameError::MoveNotAllowed)
        );
    }

    #[test]
    fn test_illegal_moves() {
        let mut game = game();
        assert_eq!(
            game.make_move(P1, Position::Room(Room::Kitchen)),
            Err(GameError::IllegalMove {
                from: Position::Start(Suspect::Scarlet),
                to: Position::Room(Room::Kitchen),
            })
        );
        assert_eq!(
            game.make_move(P2, Position::Hallway(Hallway::LoungeDining)),
            Err(GameError::NotYourTurn)
        );
        assert_eq!(
            game.make_move(99, Position::Hallway(Hallway::LoungeDining)),
            Err(GameError::PlayerNotInLobby(99))
        );
        // 状态未改变
        assert_eq!(game.current_player(), P1);
        assert_eq!(game.tokens().get(Suspect::Scarlet), Position::Start(Suspect::Scarlet));
    }

    #[test]
    fn test_occupied_hallway_blocks() {
        let mut game = game();
        game.tokens.set(Suspect::Plum, Position::Hallway(Hallway::HallLounge));
        assert!(game.valid_moves_for(P1).is_empty());

        // 无路可走时允许跳过
        let events = game.pass(P1).unwrap();
        assert_eq!(events, vec![GameEvent::TurnStarted { player: P2 }]);

        // 有路可走时必须移动
        assert_eq!(game.pass(P2), Err(GameError::MustMove));
    }

    #[test]
    fn test_secret_passage_move() {
        let mut game = game();
        game.tokens.set(Suspect::Scarlet, Position::Room(Room::Lounge));
        let moves = game.valid_moves_for(P1);
        assert!(moves.contains(&Position::Room(Room::Conservatory)));
        assert!(!moves.contains(&Position::Room(Room::Lounge)));

        game.make_move(P1, Position::Room(Room::Conservatory)).unwrap();
        assert_eq!(game.phase(), GamePhase::AwaitingSuggestionOrPass);
    }

    #[test]
    fn test_suggestion_must_be_in_room() {
        let mut game = game();
        assert_eq!(
            game.suggest(P1, Suspect::Plum, Weapon::Rope),
            Err(GameError::SuggestionNotAllowed)
        );
    }

    #[test]
    fn test_disprove_scan_reaches_holder() {
        let mut game = game_with(
            [
                vec![],
                vec![Card::Weapon(Weapon::Rope)],
                vec![Card::Weapon(Weapon::Knife)],
            ],
            GameRules::default(),
        );
        p1_in_kitchen(&mut game);

        let events = game.suggest(P1, Suspect::Scarlet, Weapon::Knife).unwrap();
        assert_eq!(
            events,
            vec![
                GameEvent::SuggestionMade {
                    index: 0,
                    player: P1,
                    suspect: Suspect::Scarlet,
                    weapon: Weapon::Knife,
                    room: Room::Kitchen,
                    next_to_disprove: Some(P2),
                },
                GameEvent::DisproveRequested {
                    index: 0,
                    player: P2,
                    is_suggested_character: false,
                },
            ]
        );
        assert_eq!(game.phase(), GamePhase::AwaitingDisproveResponse);
        assert_eq!(game.pending_actor(), Some((P2, ClockKind::Disprove)));

        // 其他玩家不能在反驳期间行动
        assert_eq!(
            game.accuse(P1, Suspect::Plum, Weapon::Rope, Room::Library),
            Err(GameError::AccusationNotAllowed)
        );
        assert_eq!(
            game.respond_disprove(P3, 0, Some(Card::Weapon(Weapon::Knife))),
            Err(GameError::NotYourTurn)
        );

        let events = game.respond_disprove(P2, 0, None).unwrap();
        assert_eq!(
            events,
            vec![
                GameEvent::CannotDisprove {
                    index: 0,
                    player: P2,
                    is_suggested_character: false,
                },
                GameEvent::DisproveRequested {
                    index: 0,
                    player: P3,
                    is_suggested_character: false,
                },
            ]
        );

        let events = game
            .respond_disprove(P3, 0, Some(Card::Weapon(Weapon::Knife)))
            .unwrap();
        assert_eq!(events[0].audience(), Audience::Player(P1));
        assert_eq!(
            events,
            vec![
                GameEvent::CardShown {
                    index: 0,
                    suggester: P1,
                    by: P3,
                    card: Card::Weapon(Weapon::Knife),
                },
                GameEvent::SuggestionDisproved { index: 0, by: P3 },
                GameEvent::PhaseChanged {
                    player: P1,
                    phase: GamePhase::AwaitingAccusationOrPass,
                },
            ]
        );
        assert_eq!(events[1].audience(), Audience::Lobby);

        let record = &game.suggestions()[0];
        assert_eq!(record.disproved_by, Some(P3));
        assert!(record.resolved);
    }

    #[test]
    fn test_scan_halts_at_first_holder() {
        let mut game = game_with(
            [
                vec![],
                vec![Card::Room(Room::Kitchen)],
                vec![Card::Weapon(Weapon::Knife)],
            ],
            GameRules::default(),
        );
        p1_in_kitchen(&mut game);
        game.suggest(P1, Suspect::Plum, Weapon::Knife).unwrap();

        let events = game
            .respond_disprove(P2, 0, Some(Card::Room(Room::Kitchen)))
            .unwrap();
        // P3 从未被询问
        assert!(!events.iter().any(|e| matches!(
            e,
            GameEvent::DisproveRequested { player: P3, .. }
        )));
        assert_eq!(game.pending_disprover(), None);
        assert_eq!(game.phase(), GamePhase::AwaitingAccusationOrPass);
    }

    #[test]
    fn test_invalid_disprove_reprompts() {
        let mut game = game_with(
            [vec![], vec![Card::Weapon(Weapon::Knife)], vec![]],
            GameRules::default(),
        );
        p1_in_kitchen(&mut game);
        game.suggest(P1, Suspect::Plum, Weapon::Knife).unwrap();

        assert_eq!(
            game.respond_disprove(P2, 0, Some(Card::Room(Room::Kitchen))),
            Err(GameError::CardNotHeld(Card::Room(Room::Kitchen)))
        );
        assert_eq!(
            game.respond_disprove(P2, 0, None),
            Err(GameError::MustShowCard)
        );
        assert_eq!(
            game.respond_disprove(P2, 5, Some(Card::Weapon(Weapon::Knife))),
            Err(GameError::StaleSuggestion { expected: 0, got: 5 })
        );
        assert_eq!(game.pending_disprover(), Some(P2));

        game.respond_disprove(P2, 0, Some(Card::Weapon(Weapon::Knife)))
            .unwrap();
        assert_eq!(
            game.respond_disprove(P2, 0, None),
            Err(GameError::NoDisprovePending)
        );
    }

    #[test]
    fn test_nobody_disproves() {
        let mut game = game_with([vec![], vec![], vec![]], GameRules::default());
        p1_in_kitchen(&mut game);
        game.suggest(P1, Suspect::Plum, Weapon::Knife).unwrap();
        game.respond_disprove(P2, 0, None).unwrap();
        let events = game.respond_disprove(P3, 0, None).unwrap();

        assert_eq!(
            events,
            vec![
                GameEvent::CannotDisprove {
                    index: 0,
                    player: P3,
                    is_suggested_character: false,
                },
                GameEvent::SuggestionNotDisproved { index: 0 },
                GameEvent::PhaseChanged {
                    player: P1,
                    phase: GamePhase::AwaitingAccusationOrPass,
                },
            ]
        );
        let record = &game.suggestions()[0];
        assert_eq!(record.disproved_by, None);
        assert!(record.resolved);
    }

    #[test]
    fn test_auto_skip_non_holders() {
        let rules = GameRules {
            auto_skip_non_holders: true,
            ..GameRules::default()
        };
        let mut game = game_with([vec![], vec![], vec![Card::Weapon(Weapon::Knife)]], rules);
        p1_in_kitchen(&mut game);

        let events = game.suggest(P1, Suspect::White, Weapon::Knife).unwrap();
        assert_eq!(
            &events[1..],
            &[
                GameEvent::CannotDisprove {
                    index: 0,
                    player: P2,
                    is_suggested_character: false,
                },
                GameEvent::DisproveRequested {
                    index: 0,
                    player: P3,
                    is_suggested_character: true,
                },
            ]
        );
    }

    #[test]
    fn test_suggestion_summons_token() {
        let mut game = game();
        p1_in_kitchen(&mut game);
        game.suggest(P1, Suspect::White, Weapon::Rope).unwrap();
        assert_eq!(game.tokens().get(Suspect::White), Position::Room(Room::Kitchen));

        game.respond_disprove(P2, 0, None).unwrap();
        game.respond_disprove(P3, 0, None).unwrap();
        game.pass(P1).unwrap();

        // P2 正常移动，P3 被移入厨房后可以直接推测
        game.make_move(P2, Position::Hallway(Hallway::LoungeDining)).unwrap();
        assert_eq!(game.current_player(), P3);
        assert!(game.can_suggest_in_place(P3));
        game.suggest(P3, Suspect::Peacock, Weapon::Rope).unwrap();
        // 未被选择的角色也会被移动
        assert_eq!(game.tokens().get(Suspect::Peacock), Position::Room(Room::Kitchen));
        assert!(!game.can_suggest_in_place(P3));
    }

    #[test]
    fn test_summon_flag_cleared_after_turn() {
        let mut game = game();
        p1_in_kitchen(&mut game);
        game.suggest(P1, Suspect::White, Weapon::Rope).unwrap();
        game.respond_disprove(P2, 0, None).unwrap();
        game.respond_disprove(P3, 0, None).unwrap();
        game.pass(P1).unwrap();
        game.make_move(P2, Position::Hallway(Hallway::LoungeDining)).unwrap();

        // P3 选择移动，标记清除
        game.make_move(P3, Position::Hallway(Hallway::DiningKitchen)).unwrap();
        assert!(game.moved_by_suggestion.is_empty());
    }

    #[test]
    fn test_pass_transitions() {
        let mut game = game();
        p1_in_kitchen(&mut game);

        let events = game.pass(P1).unwrap();
        assert_eq!(
            events,
            vec![GameEvent::PhaseChanged {
                player: P1,
                phase: GamePhase::AwaitingAccusationOrPass
            }]
        );
        let events = game.pass(P1).unwrap();
        assert_eq!(events, vec![GameEvent::TurnStarted { player: P2 }]);
        assert_eq!(game.pass(P1), Err(GameError::NotYourTurn));
    }

    #[test]
    fn test_correct_accusation_before_moving() {
        let mut game = game();
        let events = game
            .accuse(P1, Suspect::Plum, Weapon::Rope, Room::Library)
            .unwrap();

        assert_eq!(
            events.last(),
            Some(&GameEvent::GameWon {
                winner: P1,
                solution: solution(),
            })
        );
        assert!(game.is_finished());
        assert_eq!(game.winner(), Some(P1));
        assert_eq!(game.revealed_solution(), Some(solution()));
        assert_eq!(game.pending_actor(), None);
        assert_eq!(
            game.make_move(P1, Position::Hallway(Hallway::HallLounge)),
            Err(GameError::GameOver)
        );
    }

    #[test]
    fn test_wrong_accusation_eliminates() {
        let mut game = game();
        let events = game
            .accuse(P1, Suspect::Plum, Weapon::Rope, Room::Kitchen)
            .unwrap();
        assert!(matches!(
            events[0],
            GameEvent::Accused { is_correct: false, .. }
        ));
        assert_eq!(events[1], GameEvent::TurnStarted { player: P2 });
        assert!(game.is_eliminated(P1));

        // 轮次不跳过被淘汰的玩家
        game.make_move(P2, Position::Hallway(Hallway::LoungeDining)).unwrap();
        game.make_move(P3, Position::Hallway(Hallway::BallroomKitchen)).unwrap();
        assert_eq!(game.current_player(), P1);

        // 仍可移动与推测，但不能再指控
        assert!(!game.valid_moves_for(P1).is_empty());
        assert_eq!(
            game.accuse(P1, Suspect::Plum, Weapon::Rope, Room::Library),
            Err(GameError::EliminatedFromAccusing)
        );
        game.tokens.set(Suspect::Scarlet, Position::Room(Room::Hall));
        game.phase = GamePhase::AwaitingSuggestionOrPass;
        assert!(game.suggest(P1, Suspect::Green, Weapon::Wrench).is_ok());
    }

    #[test]
    fn test_last_eligible_accuser_wins() {
        let mut game = game();
        game.accuse(P1, Suspect::Green, Weapon::Rope, Room::Library).unwrap();
        let events = game
            .accuse(P2, Suspect::White, Weapon::Rope, Room::Library)
            .unwrap();
        assert_eq!(
            events.last(),
            Some(&GameEvent::GameWon {
                winner: P3,
                solution: solution(),
            })
        );
        assert_eq!(game.winner(), Some(P3));
    }

    #[test]
    fn test_hand_of_is_pure_read() {
        let hand = vec![Card::Weapon(Weapon::Knife), Card::Room(Room::Hall)];
        let game = game_with([hand.clone(), vec![], vec![]], GameRules::default());
        assert_eq!(game.hand_of(P1).unwrap(), hand.as_slice());
        assert_eq!(game.hand_of(P1).unwrap(), game.hand_of(P1).unwrap());
        assert_eq!(game.hand_of(42), Err(GameError::PlayerNotInLobby(42)));
    }

    #[test]
    fn test_timeout_forces_pass() {
        let mut game = game();
        let events = game.force_timeout();
        assert_eq!(events, vec![GameEvent::TurnStarted { player: P2 }]);
    }

    #[test]
    fn test_disprove_timeout_reveals_first_match() {
        let mut game = game_with(
            [
                vec![],
                vec![Card::Room(Room::Kitchen), Card::Weapon(Weapon::Knife)],
                vec![],
            ],
            GameRules::default(),
        );
        p1_in_kitchen(&mut game);
        game.suggest(P1, Suspect::Plum, Weapon::Knife).unwrap();

        let events = game.force_timeout();
        assert_eq!(
            events[0],
            GameEvent::CardShown {
                index: 0,
                suggester: P1,
                by: P2,
                card: Card::Weapon(Weapon::Knife),
            }
        );
        assert_eq!(game.phase(), GamePhase::AwaitingAccusationOrPass);
    }

    #[test]
    fn test_disprove_timeout_cannot_policy() {
        let rules = GameRules {
            disprove_timeout_policy: DisproveTimeoutPolicy::CannotDisprove,
            ..GameRules::default()
        };
        let mut game = game_with([vec![], vec![Card::Weapon(Weapon::Knife)], vec![]], rules);
        p1_in_kitchen(&mut game);
        game.suggest(P1, Suspect::Plum, Weapon::Knife).unwrap();

        let events = game.force_timeout();
        assert_eq!(
            events,
            vec![
                GameEvent::CannotDisprove {
                    index: 0,
                    player: P2,
                    is_suggested_character: false,
                },
                GameEvent::DisproveRequested {
                    index: 0,
                    player: P3,
                    is_suggested_character: false,
                },
            ]
        );
    }
}
