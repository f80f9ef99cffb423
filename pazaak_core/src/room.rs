//! 房间注册表：把连接路由到其所在房间，创建和回收房间，并生成要扇出的消息。
//!
//! 并发模型：
//! - `rooms` / `connections` 是 `DashMap`，分片锁保护房间的创建与删除
//! - 每个房间一把 `parking_lot::Mutex`，同一房间的所有改动 (包括断线) 都在锁内串行执行
//! - 从 map 中取出 `Arc<Room>` 后立即释放 map 的引用，再去拿房间锁
//! - 加锁顺序只允许 connections 分片 -> 房间锁，房间锁内不会再碰任何 map
//! - 房间锁只包住纯内存操作，消息投递在锁外由传输层完成

use crate::card::{CardSource, RngSource};
use crate::error::{GameError, GameResult};
use crate::message::{ClientMessage, Dispatch, ServerMessage};
use crate::state::{ConnectionId, GamePhase, GameSnapshot, GameState, RoomId};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// 为每个新房间提供随机源
pub type SourceFactory = Arc<dyn Fn() -> Box<dyn CardSource> + Send + Sync>;

#[derive(Debug, Clone, Copy, Default)]
pub struct RegistryConfig {
    /// 为每个观察者单独生成快照，隐藏对手的副牌点数。默认关闭，所有人都能看到完整手牌。
    pub conceal_opponent_hands: bool,
}

pub struct Room {
    pub id: RoomId,
    pub multiplayer: bool,
    pub created_at: SystemTime,
    inner: Mutex<RoomInner>,
}

struct RoomInner {
    game: GameState,
    // 最后一个真人离开后置位，之后的加入请求视为房间不存在
    closed: bool,
}

impl Room {
    fn new(id: RoomId, multiplayer: bool, source: Box<dyn CardSource>) -> Room {
        Room {
            id,
            multiplayer,
            created_at: SystemTime::now(),
            inner: Mutex::new(RoomInner {
                game: GameState::new(id, multiplayer, source),
                closed: false,
            }),
        }
    }

    /// 在房间锁内执行一次操作
    pub fn with_game<R>(&self, f: impl FnOnce(&mut GameState) -> R) -> R {
        f(&mut self.inner.lock().game)
    }

    pub fn snapshot(&self) -> GameSnapshot {
        self.with_game(|game| game.snapshot())
    }

    /// 房间内的真人连接
    pub fn members(&self) -> Vec<ConnectionId> {
        self.with_game(|game| game.human_ids())
    }
}

pub struct RoomRegistry {
    rooms: DashMap<RoomId, Arc<Room>>,
    connections: DashMap<ConnectionId, RoomId>,
    config: RegistryConfig,
    source_factory: SourceFactory,
}

impl Default for RoomRegistry {
    fn default() -> Self {
        RoomRegistry::new(RegistryConfig::default())
    }
}

impl RoomRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self::with_source_factory(
            config,
            Arc::new(|| -> Box<dyn CardSource> { Box::new(RngSource::from_os_rng()) }),
        )
    }

    pub fn with_source_factory(config: RegistryConfig, source_factory: SourceFactory) -> Self {
        RoomRegistry {
            rooms: DashMap::new(),
            connections: DashMap::new(),
            config,
            source_factory,
        }
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn room(&self, room_id: &RoomId) -> Option<Arc<Room>> {
        self.rooms.get(room_id).map(|r| Arc::clone(r.value()))
    }

    /// 根据连接找到其所在房间
    pub fn resolve(&self, connection_id: &ConnectionId) -> Option<Arc<Room>> {
        let room_id = *self.connections.get(connection_id)?;
        self.room(&room_id)
    }

    /// 创建新房间并让发起者入座
    pub fn create_room(&self, initiator: ConnectionId, multiplayer: bool) -> GameResult<Arc<Room>> {
        let Entry::Vacant(slot) = self.connections.entry(initiator) else {
            return Err(GameError::AlreadyInRoom);
        };
        let room = Arc::new(Room::new(Uuid::new_v4(), multiplayer, (self.source_factory)()));
        room.with_game(|game| game.add_player(initiator))?;
        self.rooms.insert(room.id, Arc::clone(&room));
        slot.insert(room.id);
        info!(room_id = %room.id, %initiator, multiplayer, "创建了新房间");
        Ok(room)
    }

    /// 加入已存在的房间
    pub fn join_room(&self, room_id: RoomId, connection_id: ConnectionId) -> GameResult<Arc<Room>> {
        let Entry::Vacant(slot) = self.connections.entry(connection_id) else {
            return Err(GameError::AlreadyInRoom);
        };
        let room = self.room(&room_id).ok_or(GameError::RoomNotFound)?;
        {
            let mut inner = room.inner.lock();
            if inner.closed {
                return Err(GameError::RoomNotFound);
            }
            inner.game.add_player(connection_id)?;
        }
        slot.insert(room_id);
        info!(%room_id, %connection_id, multiplayer = room.multiplayer, "玩家加入了房间");
        Ok(room)
    }

    /// 玩家离开 (主动离开或断线)
    ///
    /// 房间内没有真人时删除房间，否则通知剩余玩家。
    pub fn remove_player(&self, connection_id: ConnectionId) -> Vec<Dispatch> {
        let Some((_, room_id)) = self.connections.remove(&connection_id) else {
            return Vec::new();
        };
        let Some(room) = self.room(&room_id) else {
            return Vec::new();
        };

        let (snapshot, members, game_over) = {
            let mut inner = room.inner.lock();
            let was_finished = inner.game.phase == GamePhase::Finished;
            inner.game.remove_player(connection_id);
            let members = inner.game.human_ids();
            if members.is_empty() {
                inner.closed = true;
            }
            let game_over = if was_finished { None } else { inner.game.game_over() };
            (inner.game.snapshot(), members, game_over)
        };
        info!(%room_id, %connection_id, "玩家离开了房间");

        if members.is_empty() {
            self.rooms.remove(&room_id);
            let lifetime_secs = room.created_at.elapsed().map(|d| d.as_secs()).unwrap_or_default();
            info!(%room_id, multiplayer = room.multiplayer, lifetime_secs, "房间已空，已被移除");
            return Vec::new();
        }

        let mut out = vec![Dispatch::broadcast(
            members.clone(),
            ServerMessage::PlayerDisconnected { player_id: connection_id },
        )];
        out.extend(self.state_dispatches(&snapshot, &members));
        if let Some(msg) = game_over {
            out.push(Dispatch::broadcast(members, msg));
        }
        out
    }

    /// 处理一条来自连接的消息，返回需要投递的所有消息
    pub fn handle(&self, connection_id: ConnectionId, msg: ClientMessage) -> Vec<Dispatch> {
        debug!(%connection_id, ?msg, "收到消息");
        match msg {
            ClientMessage::JoinGame { room_id, multiplayer } => {
                self.handle_join(connection_id, room_id, multiplayer)
            }
            ClientMessage::PlayerReady => {
                self.apply(connection_id, |game| game.mark_ready(connection_id).map(|_| ()))
            }
            ClientMessage::Hit => self.apply(connection_id, |game| game.hit(connection_id)),
            ClientMessage::Stand => self.apply(connection_id, |game| game.stand(connection_id)),
            ClientMessage::PlaySideCard { card_id, target_player_id } => self.apply(connection_id, |game| {
                game.play_side_card(connection_id, card_id, target_player_id)
            }),
            ClientMessage::Disconnect => self.remove_player(connection_id),
        }
    }

    fn handle_join(
        &self,
        connection_id: ConnectionId,
        room_id: Option<RoomId>,
        multiplayer: bool,
    ) -> Vec<Dispatch> {
        let joined = match room_id {
            Some(id) => match self.join_room(id, connection_id) {
                Err(GameError::RoomNotFound) => {
                    info!(room_id = %id, %connection_id, "房间不存在，改为创建新房间");
                    self.create_room(connection_id, multiplayer).map(|room| (room, true))
                }
                other => other.map(|room| (room, false)),
            },
            None => self.create_room(connection_id, multiplayer).map(|room| (room, true)),
        };
        let (room, created) = match joined {
            Ok(joined) => joined,
            Err(e) => return vec![self.reject(connection_id, &e)],
        };

        let (snapshot, members) = room.with_game(|game| (game.snapshot(), game.human_ids()));
        let mut out = Vec::new();
        if created {
            out.push(Dispatch::unicast(connection_id, ServerMessage::GameCreated { room_id: room.id }));
        }
        out.push(Dispatch::unicast(
            connection_id,
            ServerMessage::RoomJoined { room_id: room.id, your_id: connection_id },
        ));
        out.extend(self.state_dispatches(&snapshot, &members));
        out
    }

    /// 在连接所在房间的锁内执行一次引擎操作，成功则广播新状态，
    /// 刚进入 Finished 时额外广播一次结算。
    fn apply(
        &self,
        connection_id: ConnectionId,
        op: impl FnOnce(&mut GameState) -> GameResult<()>,
    ) -> Vec<Dispatch> {
        let Some(room) = self.resolve(&connection_id) else {
            return vec![self.reject(connection_id, &GameError::NotInRoom)];
        };
        let outcome = room.with_game(|game| -> GameResult<_> {
            let was_finished = game.phase == GamePhase::Finished;
            op(game)?;
            let game_over = if was_finished { None } else { game.game_over() };
            Ok((game.snapshot(), game.human_ids(), game_over))
        });

        match outcome {
            Ok((snapshot, members, game_over)) => {
                let mut out = self.state_dispatches(&snapshot, &members);
                if let Some(msg) = game_over {
                    out.push(Dispatch::broadcast(members, msg));
                }
                out
            }
            Err(e) => vec![self.reject(connection_id, &e)],
        }
    }

    fn reject(&self, connection_id: ConnectionId, error: &GameError) -> Dispatch {
        warn!(%connection_id, %error, "拒绝请求");
        Dispatch::unicast(connection_id, ServerMessage::GameError { message: error.to_string() })
    }

    fn state_dispatches(&self, snapshot: &GameSnapshot, members: &[ConnectionId]) -> Vec<Dispatch> {
        if self.config.conceal_opponent_hands {
            // 快照需要为每个玩家单独生成
            members
                .iter()
                .map(|id| Dispatch::unicast(*id, ServerMessage::GameState(snapshot.for_viewer(id))))
                .collect()
        } else {
            vec![Dispatch::broadcast(members.to_vec(), ServerMessage::GameState(snapshot.clone()))]
        }
    }
}

// --- 单元测试 ---
