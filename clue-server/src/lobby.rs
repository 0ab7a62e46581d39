//! 大厅系统
//!
//! `LobbyManager` 是进程级的大厅注册表，每个大厅由独立的锁保护，
//! 不同大厅之间可以并行处理。

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, info};

use protocol::{
    CharacterInfo, GameError, LobbyId, LobbyState, PlayerId, PlayerInfo, PlayerPosition, Suspect,
    Tokens, LOBBY_ID_LEN, MAX_PLAYERS, MIN_PLAYERS,
};

use crate::clock::TurnClock;
use crate::deck::Deck;
use crate::game::{GameRules, GameState, Seat};
use crate::player::Player;

/// 大厅 ID 字符集
const LOBBY_ID_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// 离开大厅的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveOutcome {
    /// 开局前离开，玩家被移除
    Removed,
    /// 对局中离开，玩家保留座位但标记为离线
    Disconnected,
}

/// 大厅
#[derive(Debug)]
pub struct Lobby {
    pub id: LobbyId,
    pub state: LobbyState,
    /// 按加入顺序排列
    players: Vec<Player>,
    host: PlayerId,
    pub game: Option<GameState>,
    pub clock: TurnClock,
    pub created_at: DateTime<Utc>,
    /// 最后一名玩家离线的时刻
    abandoned_at: Option<Instant>,
}

impl Lobby {
    /// 创建大厅，房主为第一个玩家
    pub fn new(id: LobbyId, host_id: PlayerId, host_name: String, clock: TurnClock) -> Self {
        let mut host = Player::new(host_id, host_name);
        host.is_host = true;
        Self {
            id,
            state: LobbyState::Open,
            players: vec![host],
            host: host_id,
            game: None,
            clock,
            created_at: Utc::now(),
            abandoned_at: None,
        }
    }

    pub fn host(&self) -> PlayerId {
        self.host
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn player(&self, player_id: PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| p.id == player_id)
    }

    fn player_mut(&mut self, player_id: PlayerId) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.id == player_id)
    }

    pub fn has_player(&self, player_id: PlayerId) -> bool {
        self.player(player_id).is_some()
    }

    /// 玩家昵称（未知玩家返回空字符串）
    pub fn name_of(&self, player_id: PlayerId) -> String {
        self.player(player_id)
            .map(|p| p.name.clone())
            .unwrap_or_default()
    }

    /// 所有成员 ID（用于广播）
    pub fn member_ids(&self) -> Vec<PlayerId> {
        self.players.iter().map(|p| p.id).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.players.len() >= MAX_PLAYERS
    }

    pub fn is_started(&self) -> bool {
        matches!(self.state, LobbyState::InProgress | LobbyState::Finished)
    }

    /// 是否已满足开局条件（人数）
    pub fn can_start(&self) -> bool {
        !self.is_started() && self.players.len() >= MIN_PLAYERS
    }

    pub fn player_infos(&self) -> Vec<PlayerInfo> {
        self.players.iter().map(Player::info).collect()
    }

    /// 六个角色的占用情况
    pub fn character_infos(&self) -> Vec<CharacterInfo> {
        Suspect::ALL
            .into_iter()
            .map(|character| CharacterInfo {
                character,
                selected_by: self
                    .players
                    .iter()
                    .find(|p| p.character == Some(character))
                    .map(|p| p.id),
            })
            .collect()
    }

    /// 六个角色棋子的位置；开局前所有角色都在起点
    pub fn player_positions(&self) -> Vec<PlayerPosition> {
        let initial = Tokens::initial();
        let tokens = self.game.as_ref().map(GameState::tokens).unwrap_or(&initial);
        tokens
            .iter()
            .map(|(character, position)| {
                let owner = self.players.iter().find(|p| p.character == Some(character));
                PlayerPosition {
                    player_id: owner.map(|p| p.id),
                    name: owner.map(|p| p.name.clone()),
                    character,
                    position,
                    position_type: position.kind().to_string(),
                }
            })
            .collect()
    }

    /// 新玩家加入，返回其重新加入凭证
    pub fn add_player(&mut self, player_id: PlayerId, name: String) -> Result<String, GameError> {
        if self.is_started() {
            return Err(GameError::GameInProgress);
        }
        if self.is_full() {
            return Err(GameError::LobbyFull {
                current: self.players.len(),
                max: MAX_PLAYERS,
            });
        }
        let player = Player::new(player_id, name);
        let token = player.token().to_string();
        self.players.push(player);
        debug!(lobby = %self.id, player_id, "玩家加入");
        Ok(token)
    }

    /// 已有成员凭 token 重新加入；座位仍在线时拒绝
    pub fn rejoin(&mut self, player_id: PlayerId, token: &str) -> Result<(), GameError> {
        let player = self
            .player_mut(player_id)
            .ok_or(GameError::PlayerNotInLobby(player_id))?;
        if !player.verify_token(token) {
            return Err(GameError::InvalidToken(player_id));
        }
        if player.connected {
            return Err(GameError::AlreadyConnected(player_id));
        }
        player.connected = true;
        self.refresh_abandoned();
        debug!(lobby = %self.id, player_id, "玩家重新加入");
        Ok(())
    }

    /// 设置在线状态，返回是否发生变化
    pub fn set_connected(&mut self, player_id: PlayerId, connected: bool) -> bool {
        let changed = match self.player_mut(player_id) {
            Some(player) if player.connected != connected => {
                player.connected = connected;
                true
            }
            _ => false,
        };
        self.refresh_abandoned();
        changed
    }

    /// 玩家离开。开局前移除并在需要时转移房主；对局中只标记离线。
    pub fn leave(&mut self, player_id: PlayerId) -> Result<LeaveOutcome, GameError> {
        if !self.has_player(player_id) {
            return Err(GameError::PlayerNotInLobby(player_id));
        }

        if self.is_started() {
            self.set_connected(player_id, false);
            return Ok(LeaveOutcome::Disconnected);
        }

        self.players.retain(|p| p.id != player_id);
        if self.host == player_id {
            if let Some(next) = self.players.first_mut() {
                next.is_host = true;
                self.host = next.id;
                info!(lobby = %self.id, new_host = next.id, "房主转移");
            }
        }
        if self.players.iter().all(|p| p.character.is_none()) {
            self.state = LobbyState::Open;
        }
        self.refresh_abandoned();
        Ok(LeaveOutcome::Removed)
    }

    /// 是否已无在线玩家
    pub fn is_abandoned(&self) -> bool {
        self.players.iter().all(|p| !p.connected)
    }

    /// 所有玩家离线已持续多久
    pub fn abandoned_for(&self, now: Instant) -> Option<Duration> {
        self.abandoned_at
            .map(|since| now.saturating_duration_since(since))
    }

    fn refresh_abandoned(&mut self) {
        if !self.is_abandoned() {
            self.abandoned_at = None;
        } else if self.abandoned_at.is_none() {
            self.abandoned_at = Some(Instant::now());
        }
    }

    /// 选择角色，返回是否发生变化
    pub fn select_character(
        &mut self,
        player_id: PlayerId,
        character: Suspect,
    ) -> Result<bool, GameError> {
        if self.is_started() {
            return Err(GameError::GameInProgress);
        }
        if let Some(owner) = self.players.iter().find(|p| p.character == Some(character)) {
            if owner.id == player_id {
                return Ok(false);
            }
            return Err(GameError::CharacterAlreadySelected(character));
        }

        let player = self
            .player_mut(player_id)
            .ok_or(GameError::PlayerNotInLobby(player_id))?;
        player.character = Some(character);
        self.state = LobbyState::CharacterSelection;
        debug!(lobby = %self.id, player_id, %character, "选择角色");
        Ok(true)
    }

    /// 开始游戏（仅房主）
    pub fn start<R: Rng + ?Sized>(
        &mut self,
        requester: PlayerId,
        rules: GameRules,
        require_character_selection: bool,
        rng: &mut R,
    ) -> Result<(), GameError> {
        if self.is_started() {
            return Err(GameError::GameInProgress);
        }
        if requester != self.host {
            return Err(GameError::NotHost);
        }
        if self.players.len() < MIN_PLAYERS {
            return Err(GameError::NotEnoughPlayers {
                min: MIN_PLAYERS,
                actual: self.players.len(),
            });
        }

        let unassigned = self
            .players
            .iter()
            .find(|p| p.character.is_none())
            .map(|p| p.id);
        if let Some(unassigned) = unassigned {
            if require_character_selection {
                return Err(GameError::CharacterNotSelected(unassigned));
            }
            // 未选角色的玩家随机分配剩余角色
            let mut free: Vec<Suspect> = Suspect::ALL
                .into_iter()
                .filter(|c| !self.players.iter().any(|p| p.character == Some(*c)))
                .collect();
            free.shuffle(rng);
            for player in self.players.iter_mut().filter(|p| p.character.is_none()) {
                player.character = free.pop();
            }
        }

        // 回合顺序按角色的经典座次
        let mut seats: Vec<Seat> = self
            .players
            .iter()
            .filter_map(|p| {
                p.character.map(|character| Seat {
                    player: p.id,
                    character,
                })
            })
            .collect();
        seats.sort_by_key(|s| s.character.index());

        let order: Vec<PlayerId> = seats.iter().map(|s| s.player).collect();
        let deal = Deck::deal(&order, rng)?;
        self.game = Some(GameState::new(seats, deal, rules));
        self.state = LobbyState::InProgress;
        self.sync_clock();

        info!(lobby = %self.id, players = order.len(), "游戏开始");
        Ok(())
    }

    /// 状态机变化后：结束时收尾，否则为当前等待的玩家重新计时
    pub fn sync_clock(&mut self) {
        match self.game.as_ref().and_then(GameState::pending_actor) {
            Some((actor, kind)) => self.clock.restart(actor, kind),
            None => self.clock.stop(),
        }
        if self.game.as_ref().is_some_and(GameState::is_finished) {
            self.state = LobbyState::Finished;
        }
    }
}

/// 大厅管理器
pub struct LobbyManager {
    lobbies: RwLock<HashMap<LobbyId, Arc<Mutex<Lobby>>>>,
    next_player_id: AtomicU64,
    /// 新大厅使用的计时设置
    clock: TurnClock,
}

impl LobbyManager {
    pub fn new(clock: TurnClock) -> Self {
        Self {
            lobbies: RwLock::new(HashMap::new()),
            next_player_id: AtomicU64::new(1),
            clock,
        }
    }

    /// 生成新的玩家 ID
    pub fn generate_player_id(&self) -> PlayerId {
        self.next_player_id.fetch_add(1, Ordering::SeqCst)
    }

    /// 生成随机大厅 ID
    fn generate_lobby_id() -> LobbyId {
        let mut rng = rand::thread_rng();
        (0..LOBBY_ID_LEN)
            .map(|_| LOBBY_ID_CHARSET[rng.gen_range(0..LOBBY_ID_CHARSET.len())] as char)
            .collect()
    }

    /// 大厅 ID 不区分大小写
    fn normalize(lobby_id: &str) -> LobbyId {
        lobby_id.trim().to_ascii_uppercase()
    }

    /// 创建大厅，返回大厅与房主 ID
    pub async fn create(&self, host_name: &str) -> Result<(Arc<Mutex<Lobby>>, PlayerId), GameError> {
        let host_name = Player::validate_name(host_name)?;
        let host_id = self.generate_player_id();

        let mut lobbies = self.lobbies.write().await;
        let id = loop {
            let candidate = Self::generate_lobby_id();
            if !lobbies.contains_key(&candidate) {
                break candidate;
            }
        };

        let lobby = Arc::new(Mutex::new(Lobby::new(
            id.clone(),
            host_id,
            host_name,
            self.clock.clone(),
        )));
        lobbies.insert(id.clone(), Arc::clone(&lobby));
        info!(lobby = %id, host_id, "大厅创建");

        Ok((lobby, host_id))
    }

    /// 获取大厅（释放注册表锁后返回）
    pub async fn get(&self, lobby_id: &str) -> Option<Arc<Mutex<Lobby>>> {
        self.lobbies
            .read()
            .await
            .get(&Self::normalize(lobby_id))
            .cloned()
    }

    /// 移除大厅
    pub async fn remove(&self, lobby_id: &str) -> Option<Arc<Mutex<Lobby>>> {
        let removed = self.lobbies.write().await.remove(&Self::normalize(lobby_id));
        if removed.is_some() {
            info!(lobby = %lobby_id, "大厅关闭");
        }
        removed
    }

    /// 所有大厅（用于超时巡检）
    pub async fn all(&self) -> Vec<Arc<Mutex<Lobby>>> {
        self.lobbies.read().await.values().cloned().collect()
    }

    pub async fn count(&self) -> usize {
        self.lobbies.read().await.len()
    }
}

impl Default for LobbyManager {
    fn default() -> Self {
        Self::new(TurnClock::default())
    }
}
