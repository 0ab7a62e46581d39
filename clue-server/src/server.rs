//! 服务器主逻辑
//!
//! 每个连接有一个读任务和一个写任务。读任务把消息交给 `MessageHandler`：
//! 直接回复写回本连接，其余事件经 `Outbox` 在持有大厅锁时按顺序投递，
//! 所以同一大厅的广播在所有玩家处顺序一致。投递从不等待：
//! 发送队列已满的连接会被断开，不会卡住大厅锁。

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex, Notify, RwLock};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use protocol::{
    Card, ClientMessage, Connection, ErrorCode, GameError, Listener, LobbyId, LobbyState, PlayerId,
    Position, ProtocolError, Room, ServerMessage, Suspect, TcpConnection, TcpListener, Weapon,
};

use crate::clock::TurnClock;
use crate::config::ServerConfig;
use crate::game::{Audience, GameEvent, GameState};
use crate::lobby::{LeaveOutcome, Lobby, LobbyManager};
use crate::player::Player;

/// 每个连接的发送队列长度
const OUTGOING_QUEUE: usize = 64;

type Reply = Result<Option<ServerMessage>, GameError>;

/// 解析客户端传来的名称，失败时归入所在操作的错误
fn parse_arg<T>(value: &str, wrap: fn(String) -> GameError) -> Result<T, GameError>
where
    T: FromStr<Err = GameError>,
{
    value.parse().map_err(|err: GameError| wrap(err.to_string()))
}

/// 一个连接的发送端
#[derive(Clone)]
pub struct Outlet {
    tx: mpsc::Sender<ServerMessage>,
    /// 发送队列溢出时通知连接任务断开
    kick: Arc<Notify>,
}

impl Outlet {
    pub fn new(tx: mpsc::Sender<ServerMessage>) -> Self {
        Self {
            tx,
            kick: Arc::new(Notify::new()),
        }
    }

    /// 不等待地投递；队列已满时要求断开该连接
    fn deliver(&self, msg: ServerMessage) -> bool {
        match self.tx.try_send(msg) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("发送队列已满，断开连接");
                self.kick.notify_one();
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    fn same_connection(&self, other: &Outlet) -> bool {
        self.tx.same_channel(&other.tx)
    }

    /// 连接因发送队列溢出被要求断开
    pub async fn kicked(&self) {
        self.kick.notified().await
    }
}

/// 服务器状态
pub struct ServerState {
    pub lobbies: LobbyManager,
    /// 玩家 ID -> 连接发送端
    connections: RwLock<HashMap<PlayerId, Outlet>>,
    pub config: ServerConfig,
    /// 发牌与随机角色分配
    rng: Mutex<StdRng>,
    active_connections: AtomicUsize,
}

impl ServerState {
    pub fn new(config: ServerConfig) -> Self {
        let clock = TurnClock::new(config.game.turn_timeout(), config.game.disprove_timeout());
        let rng = match config.game.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            lobbies: LobbyManager::new(clock),
            connections: RwLock::new(HashMap::new()),
            config,
            rng: Mutex::new(rng),
            active_connections: AtomicUsize::new(0),
        }
    }

    /// 绑定玩家与连接（重新加入时替换旧连接）
    pub async fn register(&self, player_id: PlayerId, outlet: Outlet) {
        self.connections.write().await.insert(player_id, outlet);
    }

    /// 解除绑定；玩家已被新连接接管时返回 false
    async fn unregister(&self, player_id: PlayerId, outlet: &Outlet) -> bool {
        let mut connections = self.connections.write().await;
        match connections.get(&player_id) {
            Some(current) if current.same_connection(outlet) => {
                connections.remove(&player_id);
                true
            }
            _ => false,
        }
    }

    pub async fn is_connected(&self, player_id: PlayerId) -> bool {
        self.connections.read().await.contains_key(&player_id)
    }

    /// 发送消息给玩家
    pub async fn send_to_player(&self, player_id: PlayerId, msg: ServerMessage) {
        if let Some(outlet) = self.connections.read().await.get(&player_id) {
            if !outlet.deliver(msg) {
                debug!(player_id, "消息未送达");
            }
        }
    }

    /// 广播给一组玩家
    pub async fn broadcast(&self, members: &[PlayerId], msg: ServerMessage) {
        let connections = self.connections.read().await;
        for player_id in members {
            if let Some(outlet) = connections.get(player_id) {
                if !outlet.deliver(msg.clone()) {
                    debug!(player_id, "消息未送达");
                }
            }
        }
    }

    pub fn active_connections(&self) -> usize {
        self.active_connections.load(Ordering::SeqCst)
    }
}

impl Default for ServerState {
    fn default() -> Self {
        Self::new(ServerConfig::default())
    }
}

/// 连接上下文
pub struct Session {
    outlet: Outlet,
    player_id: Option<PlayerId>,
    lobby_id: Option<LobbyId>,
}

impl Session {
    pub fn new(tx: mpsc::Sender<ServerMessage>) -> Self {
        Self {
            outlet: Outlet::new(tx),
            player_id: None,
            lobby_id: None,
        }
    }

    pub fn outlet(&self) -> &Outlet {
        &self.outlet
    }

    pub fn player_id(&self) -> Option<PlayerId> {
        self.player_id
    }

    pub fn lobby_id(&self) -> Option<&str> {
        self.lobby_id.as_deref()
    }

    fn bind(&mut self, lobby_id: LobbyId, player_id: PlayerId) {
        self.lobby_id = Some(lobby_id);
        self.player_id = Some(player_id);
    }

    fn unbind(&mut self) {
        self.lobby_id = None;
        self.player_id = None;
    }
}

enum Recipient {
    Player(PlayerId),
    Lobby,
}

/// 待发送的消息，保持产生时的顺序
struct Outbox {
    messages: Vec<(Recipient, ServerMessage)>,
}

impl Outbox {
    fn new() -> Self {
        Self {
            messages: Vec::new(),
        }
    }

    fn send(&mut self, player_id: PlayerId, msg: ServerMessage) {
        self.messages.push((Recipient::Player(player_id), msg));
    }

    fn broadcast(&mut self, msg: ServerMessage) {
        self.messages.push((Recipient::Lobby, msg));
    }

    async fn flush(self, state: &ServerState, members: &[PlayerId]) {
        for (recipient, msg) in self.messages {
            match recipient {
                Recipient::Player(player_id) => state.send_to_player(player_id, msg).await,
                Recipient::Lobby => state.broadcast(members, msg).await,
            }
        }
    }
}

/// 消息处理器
pub struct MessageHandler;

impl MessageHandler {
    /// 处理客户端消息，返回给本连接的直接回复
    pub async fn handle(
        state: &ServerState,
        session: &mut Session,
        msg: ClientMessage,
    ) -> Option<ServerMessage> {
        let result = match msg {
            ClientMessage::Ping => return Some(ServerMessage::Pong),
            ClientMessage::CreateLobby { name } => {
                Self::handle_create_lobby(state, session, &name).await
            }
            ClientMessage::JoinLobby {
                lobby_id,
                name,
                player_id,
                token,
            } => {
                let rejoin = player_id.map(|id| (id, token.unwrap_or_default()));
                Self::handle_join_lobby(state, session, &lobby_id, &name, rejoin).await
            }
            msg => Self::handle_lobby_message(state, session, msg).await,
        };

        match result {
            Ok(reply) => reply,
            Err(err) => {
                warn!(player_id = ?session.player_id, error = %err, "请求被拒绝");
                Some(err.into())
            }
        }
    }

    /// 创建大厅，发起者成为房主
    async fn handle_create_lobby(state: &ServerState, session: &mut Session, name: &str) -> Reply {
        if session.player_id.is_some() {
            return Err(GameError::AlreadyInLobby);
        }
        let (lobby, host_id) = state.lobbies.create(name).await?;
        let lobby = lobby.lock().await;
        let token = lobby
            .player(host_id)
            .map(|host| host.token().to_string())
            .ok_or(GameError::PlayerNotFound(host_id))?;

        state.register(host_id, session.outlet.clone()).await;
        session.bind(lobby.id.clone(), host_id);

        Ok(Some(ServerMessage::LobbyCreated {
            lobby_id: lobby.id.clone(),
            player_id: host_id,
            token,
        }))
    }

    /// 加入大厅；携带 (player_id, token) 时视为重新加入
    async fn handle_join_lobby(
        state: &ServerState,
        session: &mut Session,
        lobby_id: &str,
        name: &str,
        rejoin: Option<(PlayerId, String)>,
    ) -> Reply {
        if session.player_id.is_some() {
            return Err(GameError::AlreadyInLobby);
        }
        let lobby = state
            .lobbies
            .get(lobby_id)
            .await
            .ok_or_else(|| GameError::LobbyNotFound(lobby_id.to_string()))?;
        let mut lobby = lobby.lock().await;
        let mut outbox = Outbox::new();

        match rejoin {
            Some((player_id, token)) => {
                if let Err(err) = lobby.rejoin(player_id, &token) {
                    warn!(lobby = %lobby.id, player_id, error = %err, "拒绝重新加入");
                    return Err(err);
                }
                state.register(player_id, session.outlet.clone()).await;
                session.bind(lobby.id.clone(), player_id);
                info!(lobby = %lobby.id, player_id, "玩家重新加入");

                outbox.broadcast(ServerMessage::PlayerConnectionChanged {
                    player_id,
                    connected: true,
                });
                outbox.send(player_id, Self::snapshot(&lobby));
                if let Some(Ok(hand)) = lobby.game.as_ref().map(|game| game.hand_of(player_id)) {
                    outbox.send(player_id, ServerMessage::MyCards { cards: hand.to_vec() });
                }
            }
            None => {
                let name = Player::validate_name(name)?;
                let player_id = state.lobbies.generate_player_id();
                let token = lobby.add_player(player_id, name)?;
                state.register(player_id, session.outlet.clone()).await;
                session.bind(lobby.id.clone(), player_id);
                info!(lobby = %lobby.id, player_id, "玩家加入大厅");

                outbox.send(
                    player_id,
                    ServerMessage::JoinAccepted {
                        lobby_id: lobby.id.clone(),
                        player_id,
                        token,
                    },
                );
                outbox.broadcast(Self::lobby_joined(&lobby, player_id));
            }
        }

        outbox.flush(state, &lobby.member_ids()).await;
        Ok(None)
    }

    /// 需要已绑定玩家的大厅消息
    async fn handle_lobby_message(
        state: &ServerState,
        session: &mut Session,
        msg: ClientMessage,
    ) -> Reply {
        let (lobby_id, player_id) = match msg.target() {
            Some((lobby_id, Some(player_id))) => (lobby_id.to_string(), player_id),
            _ => return Ok(None),
        };
        // 只能以本连接绑定的玩家身份行动
        if session.player_id != Some(player_id) {
            return Err(GameError::PlayerNotFound(player_id));
        }

        let lobby = state
            .lobbies
            .get(&lobby_id)
            .await
            .ok_or_else(|| GameError::LobbyNotFound(lobby_id.clone()))?;
        let mut lobby = lobby.lock().await;
        if !lobby.has_player(player_id) {
            return Err(GameError::PlayerNotInLobby(player_id));
        }

        let leaving = matches!(msg, ClientMessage::LeaveLobby { .. });
        let mut outbox = Outbox::new();

        let result = match msg {
            ClientMessage::LeaveLobby { .. } => {
                Self::handle_leave_lobby(&mut lobby, &mut outbox, player_id)
            }
            ClientMessage::SelectCharacter { character_name, .. } => {
                let character: Suspect = character_name.parse()?;
                Self::handle_select_character(&mut lobby, &mut outbox, player_id, character)
            }
            ClientMessage::StartGame { .. } => {
                Self::handle_start_game(state, &mut lobby, &mut outbox, player_id).await
            }
            ClientMessage::MakeMove { destination, .. } => {
                let to: Position = parse_arg(&destination, GameError::InvalidDestination)?;
                Self::apply_action(&mut lobby, &mut outbox, |game| game.make_move(player_id, to))
            }
            ClientMessage::MakeSuggestion { suspect, weapon, .. } => {
                let suspect: Suspect = parse_arg(&suspect, GameError::InvalidSuggestion)?;
                let weapon: Weapon = parse_arg(&weapon, GameError::InvalidSuggestion)?;
                Self::apply_action(&mut lobby, &mut outbox, |game| {
                    game.suggest(player_id, suspect, weapon)
                })
            }
            ClientMessage::DisproveSuggestion {
                suggestion_idx,
                card_shown,
                ..
            } => {
                let card: Option<Card> = card_shown
                    .as_deref()
                    .map(|name| parse_arg(name, GameError::InvalidCard))
                    .transpose()?;
                Self::apply_action(&mut lobby, &mut outbox, |game| {
                    game.respond_disprove(player_id, suggestion_idx, card)
                })
            }
            ClientMessage::MakeAccusation {
                suspect,
                weapon,
                room,
                ..
            } => {
                let suspect: Suspect = parse_arg(&suspect, GameError::InvalidAccusation)?;
                let weapon: Weapon = parse_arg(&weapon, GameError::InvalidAccusation)?;
                let room: Room = parse_arg(&room, GameError::InvalidAccusation)?;
                Self::apply_action(&mut lobby, &mut outbox, |game| {
                    game.accuse(player_id, suspect, weapon, room)
                })
            }
            ClientMessage::PassTurn { .. } => {
                Self::apply_action(&mut lobby, &mut outbox, |game| game.pass(player_id))
            }
            ClientMessage::GetMyCards { .. } => Self::handle_get_my_cards(&lobby, player_id),
            ClientMessage::GetGameState { .. } => Ok(Some(Self::snapshot(&lobby))),
            ClientMessage::CreateLobby { .. }
            | ClientMessage::JoinLobby { .. }
            | ClientMessage::Ping => Ok(None),
        };

        outbox.flush(state, &lobby.member_ids()).await;

        if leaving && result.is_ok() {
            state.unregister(player_id, &session.outlet).await;
            session.unbind();
            let close = lobby.is_abandoned();
            drop(lobby);
            if close {
                state.lobbies.remove(&lobby_id).await;
            }
        }
        result
    }

    /// 离开大厅
    fn handle_leave_lobby(lobby: &mut Lobby, outbox: &mut Outbox, player_id: PlayerId) -> Reply {
        let outcome = lobby.leave(player_id)?;
        info!(lobby = %lobby.id, player_id, ?outcome, "玩家离开大厅");

        let left = ServerMessage::PlayerLeft {
            lobby_id: lobby.id.clone(),
            player_id,
            host_id: lobby.host(),
        };
        match outcome {
            LeaveOutcome::Removed => outbox.broadcast(left.clone()),
            LeaveOutcome::Disconnected => outbox.broadcast(ServerMessage::PlayerConnectionChanged {
                player_id,
                connected: false,
            }),
        }

        if lobby.is_abandoned() {
            Ok(Some(ServerMessage::LobbyClosed {
                lobby_id: lobby.id.clone(),
            }))
        } else {
            Ok(Some(left))
        }
    }

    /// 选择角色；重复选择同一角色只回复本人
    fn handle_select_character(
        lobby: &mut Lobby,
        outbox: &mut Outbox,
        player_id: PlayerId,
        character: Suspect,
    ) -> Reply {
        let changed = lobby.select_character(player_id, character)?;
        let msg = ServerMessage::CharacterSelected {
            player_id,
            character_name: character,
            characters: lobby.character_infos(),
        };
        if changed {
            outbox.broadcast(msg);
            Ok(None)
        } else {
            Ok(Some(msg))
        }
    }

    /// 开始游戏：广播开局信息，私发手牌
    async fn handle_start_game(
        state: &ServerState,
        lobby: &mut Lobby,
        outbox: &mut Outbox,
        player_id: PlayerId,
    ) -> Reply {
        let settings = &state.config.game;
        {
            let mut rng = state.rng.lock().await;
            lobby.start(
                player_id,
                settings.rules(),
                settings.require_character_selection,
                &mut *rng,
            )?;
        }

        let game = lobby.game.as_ref().ok_or(GameError::GameNotStarted)?;
        let current = game.current_player();
        outbox.broadcast(ServerMessage::GameStarted {
            current_player_id: current,
            current_player_name: lobby.name_of(current),
            turn_order: game.turn_order(),
            player_positions: lobby.player_positions(),
            valid_moves: game.valid_moves_for(current),
        });
        for seat in game.seats() {
            if let Ok(hand) = game.hand_of(seat.player) {
                outbox.send(seat.player, ServerMessage::CardsDealt { cards: hand.to_vec() });
            }
        }
        Ok(None)
    }

    fn handle_get_my_cards(lobby: &Lobby, player_id: PlayerId) -> Reply {
        let game = lobby.game.as_ref().ok_or(GameError::GameNotStarted)?;
        Ok(Some(ServerMessage::MyCards {
            cards: game.hand_of(player_id)?.to_vec(),
        }))
    }

    /// 执行一个对局操作并发布产生的事件
    fn apply_action<F>(lobby: &mut Lobby, outbox: &mut Outbox, action: F) -> Reply
    where
        F: FnOnce(&mut GameState) -> Result<Vec<GameEvent>, GameError>,
    {
        let game = lobby.game.as_mut().ok_or(GameError::GameNotStarted)?;
        let events = action(game)?;
        lobby.sync_clock();
        Self::publish(lobby, events, outbox);
        Ok(None)
    }

    /// 把状态机事件转成消息；私有事件只发给指定玩家
    fn publish(lobby: &Lobby, events: Vec<GameEvent>, outbox: &mut Outbox) {
        let Some(game) = lobby.game.as_ref() else {
            return;
        };
        for event in events {
            let audience = event.audience();
            let Some(msg) = Self::event_message(lobby, game, event) else {
                continue;
            };
            match audience {
                Audience::Lobby => outbox.broadcast(msg),
                Audience::Player(player_id) => outbox.send(player_id, msg),
            }
        }
    }

    fn event_message(lobby: &Lobby, game: &GameState, event: GameEvent) -> Option<ServerMessage> {
        let msg = match event {
            GameEvent::Moved {
                player,
                from,
                to,
                can_suggest,
            } => ServerMessage::MoveUpdate {
                player_id: player,
                player_name: lobby.name_of(player),
                old_position: from,
                new_position: to,
                can_suggest,
                player_positions: lobby.player_positions(),
            },
            GameEvent::SuggestionMade {
                index,
                player,
                suspect,
                weapon,
                room,
                next_to_disprove,
            } => ServerMessage::SuggestionMade {
                suggestion_idx: index,
                player_id: player,
                player_name: lobby.name_of(player),
                suspect,
                weapon,
                room,
                next_to_disprove,
                is_suggested_character: next_to_disprove
                    .and_then(|next| game.character_of(next))
                    == Some(suspect),
                player_positions: lobby.player_positions(),
            },
            GameEvent::DisproveRequested {
                index,
                player,
                is_suggested_character,
            } => ServerMessage::DisproveRequested {
                suggestion_idx: index,
                player_id: player,
                is_suggested_character,
            },
            GameEvent::CannotDisprove {
                index,
                player,
                is_suggested_character,
            } => ServerMessage::CannotDisprove {
                suggestion_idx: index,
                player_id: player,
                player_name: lobby.name_of(player),
                is_suggested_character,
            },
            GameEvent::CardShown { index, by, card, .. } => ServerMessage::CardShown {
                suggestion_idx: index,
                shown_by: by,
                shown_by_name: lobby.name_of(by),
                card,
            },
            GameEvent::SuggestionDisproved { index, by } => ServerMessage::SuggestionDisproved {
                suggestion_idx: index,
                disproved_by: by,
                disproved_by_name: lobby.name_of(by),
            },
            GameEvent::SuggestionNotDisproved { index } => {
                ServerMessage::SuggestionNotDisproved {
                    suggestion_idx: index,
                }
            }
            GameEvent::PhaseChanged { player, phase } => ServerMessage::PhaseChanged {
                player_id: player,
                phase,
            },
            GameEvent::TurnStarted { player } => return Self::turn_update(lobby, game, player),
            GameEvent::Accused {
                player,
                suspect,
                weapon,
                room,
                is_correct,
            } => ServerMessage::AccusationResult {
                player_id: player,
                player_name: lobby.name_of(player),
                suspect,
                weapon,
                room,
                is_correct,
            },
            GameEvent::GameWon { winner, solution } => ServerMessage::GameOver {
                winner_id: winner,
                winner_name: lobby.name_of(winner),
                solution,
            },
        };
        Some(msg)
    }

    fn turn_update(lobby: &Lobby, game: &GameState, player: PlayerId) -> Option<ServerMessage> {
        let location = game.position_of(player)?;
        Some(ServerMessage::TurnUpdate {
            player_id: player,
            player_name: lobby.name_of(player),
            phase: game.phase(),
            player_positions: lobby.player_positions(),
            valid_moves: game.valid_moves_for(player),
            in_room: location.room().is_some(),
            current_location: location,
            can_suggest_in_place: game.can_suggest_in_place(player),
        })
    }

    fn lobby_joined(lobby: &Lobby, player_id: PlayerId) -> ServerMessage {
        ServerMessage::LobbyJoined {
            lobby_id: lobby.id.clone(),
            player_id,
            players: lobby.player_infos(),
            host_id: lobby.host(),
            min_players: protocol::MIN_PLAYERS,
            max_players: protocol::MAX_PLAYERS,
            can_start: lobby.can_start(),
        }
    }

    /// 当前局面（不含任何人的手牌）
    fn snapshot(lobby: &Lobby) -> ServerMessage {
        let game = lobby.game.as_ref();
        ServerMessage::GameSnapshot {
            lobby_id: lobby.id.clone(),
            state: lobby.state,
            phase: game.map(GameState::phase),
            current_player_id: game
                .filter(|game| !game.is_finished())
                .map(GameState::current_player),
            pending_disprover: game.and_then(GameState::pending_disprover),
            turn_order: game.map(GameState::turn_order).unwrap_or_default(),
            players: lobby.player_infos(),
            player_positions: lobby.player_positions(),
            suggestions: game.map(|g| g.suggestions().to_vec()).unwrap_or_default(),
            accusations: game.map(|g| g.accusations().to_vec()).unwrap_or_default(),
            winner_id: game.and_then(GameState::winner),
        }
    }

    /// 巡检所有大厅：移除长时间无人在线的大厅，计时器超时则强制推进
    pub async fn check_timeouts(state: &ServerState) {
        let now = Instant::now();
        let abandoned_limit = state.config.server.abandoned_lobby_timeout();
        for lobby in state.lobbies.all().await {
            // 正在处理消息的大厅留到下一轮
            let Ok(mut lobby) = lobby.try_lock() else {
                continue;
            };
            if lobby
                .abandoned_for(now)
                .is_some_and(|idle| idle >= abandoned_limit)
            {
                info!(lobby = %lobby.id, state = ?lobby.state, "玩家全部离线过久，移除大厅");
                state.lobbies.remove(&lobby.id).await;
                continue;
            }
            let Some((actor, kind)) = lobby.clock.expired(now) else {
                continue;
            };
            warn!(lobby = %lobby.id, player_id = actor, ?kind, "等待超时，强制推进");

            let events = match lobby.game.as_mut() {
                Some(game) => game.force_timeout(),
                None => Vec::new(),
            };
            lobby.sync_clock();

            let mut outbox = Outbox::new();
            Self::publish(&lobby, events, &mut outbox);
            outbox.flush(state, &lobby.member_ids()).await;
        }
    }

    /// 处理连接断开：玩家标记为离线，保留座位等待重新加入
    pub async fn handle_disconnect(state: &ServerState, session: &mut Session) {
        let (Some(player_id), Some(lobby_id)) = (session.player_id, session.lobby_id.clone())
        else {
            return;
        };
        session.unbind();

        // 已被新连接接管
        if !state.unregister(player_id, &session.outlet).await {
            return;
        }
        let Some(lobby) = state.lobbies.get(&lobby_id).await else {
            return;
        };
        let mut lobby = lobby.lock().await;
        let mut outbox = Outbox::new();

        if lobby.set_connected(player_id, false) {
            outbox.broadcast(ServerMessage::PlayerConnectionChanged {
                player_id,
                connected: false,
            });
        }
        info!(lobby = %lobby.id, player_id, "玩家断线");

        outbox.flush(state, &lobby.member_ids()).await;

        // 对局中的大厅保留，等待玩家重新加入；全部离线过久由巡检移除
        let close = lobby.state != LobbyState::InProgress && lobby.is_abandoned();
        drop(lobby);
        if close {
            state.lobbies.remove(&lobby_id).await;
        }
    }
}

/// 服务单个连接直到断开
pub async fn serve_connection(state: &ServerState, conn: TcpConnection) {
    let peer = conn.peer_addr().unwrap_or_else(|| "unknown".to_string());
    let heartbeat = Duration::from_secs(state.config.server.heartbeat_timeout_secs);
    let (mut reader, mut writer) = conn.split();

    let (tx, mut rx) = mpsc::channel::<ServerMessage>(OUTGOING_QUEUE);
    let writer_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Err(e) = writer.write_frame(&msg).await {
                debug!(error = %e, "写入失败");
                break;
            }
        }
        let _ = writer.shutdown().await;
    });

    info!(%peer, "客户端连接");
    let mut session = Session::new(tx);
    let outlet = session.outlet().clone();
    let mut kicked = false;

    loop {
        let frame = tokio::select! {
            frame = reader.read_frame_within::<ClientMessage>(heartbeat) => frame,
            _ = outlet.kicked() => {
                warn!(%peer, "客户端未及时读取，断开连接");
                kicked = true;
                break;
            }
        };
        let reply = match frame {
            Ok(msg) => {
                debug!(%peer, ?msg, "收到消息");
                MessageHandler::handle(state, &mut session, msg).await
            }
            Err(ProtocolError::Json(e)) => Some(ServerMessage::Error {
                code: ErrorCode::InvalidMessage,
                message: e.to_string(),
            }),
            Err(ProtocolError::ConnectionClosed) => break,
            Err(ProtocolError::ConnectionTimeout) => {
                warn!(%peer, "心跳超时，断开连接");
                break;
            }
            Err(e) => {
                warn!(%peer, error = %e, "读取失败");
                break;
            }
        };
        if let Some(reply) = reply {
            if !outlet.deliver(reply) {
                kicked = true;
                break;
            }
        }
    }

    MessageHandler::handle_disconnect(state, &mut session).await;
    drop(session);
    drop(outlet);
    // 写任务可能卡在不读数据的客户端上
    if kicked {
        writer_task.abort();
    } else {
        let _ = writer_task.await;
    }
    info!(%peer, "客户端断开");
}

/// 接受连接，每个连接一个任务
pub async fn run(state: Arc<ServerState>, mut listener: TcpListener) {
    let max_connections = state.config.server.max_connections;
    loop {
        let mut conn = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!(error = %e, "接受连接失败");
                continue;
            }
        };

        if state.active_connections.fetch_add(1, Ordering::SeqCst) >= max_connections {
            state.active_connections.fetch_sub(1, Ordering::SeqCst);
            warn!(max_connections, "连接数已满，拒绝连接");
            let _ = conn
                .send(&ServerMessage::Error {
                    code: ErrorCode::InternalError,
                    message: "Server is full".to_string(),
                })
                .await;
            let _ = conn.close().await;
            continue;
        }

        let state = Arc::clone(&state);
        tokio::spawn(async move {
            serve_connection(&state, conn).await;
            state.active_connections.fetch_sub(1, Ordering::SeqCst);
        });
    }
}

/// 定期巡检回合计时
pub async fn run_timeout_sweeper(state: Arc<ServerState>, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    loop {
        ticker.tick().await;
        MessageHandler::check_timeouts(&state).await;
    }
}
