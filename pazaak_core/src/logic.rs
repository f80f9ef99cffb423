use crate::card::*;
use crate::dealer::{DealerDecision, dealer_policy};
use crate::error::{GameError, GameResult, MoveRejection};
use crate::message::{PlayerResult, ServerMessage};
use crate::state::*;
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, error, info};

/// 庄家单个回合内最多执行的动作数。每次要牌至少加 1 分，正常不会触及这个上限。
const MAX_DEALER_ACTIONS: usize = 32;

// --- 核心游戏流程函数 ---

impl GameState {
    pub fn new(room_id: RoomId, multiplayer: bool, source: Box<dyn CardSource>) -> GameState {
        GameState {
            room_id,
            multiplayer,
            phase: GamePhase::Waiting,
            players: HashMap::new(),
            seat_order: Vec::new(),
            current_player_id: None,
            turn_started_at: None,
            next_card_id: 0,
            source,
        }
    }

    /// 获取当前行动的玩家ID (如果存在)
    pub fn current_player_id(&self) -> Option<PlayerId> {
        self.current_player_id
    }

    pub fn player(&self, id: &PlayerId) -> Option<&Player> {
        self.players.get(id)
    }

    /// 按座位顺序遍历玩家
    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.seat_order.iter().filter_map(|id| self.players.get(id))
    }

    pub fn player_count(&self) -> usize {
        self.seat_order.len()
    }

    /// 房间内由真人控制的座位 (即需要接收消息的连接)
    pub fn human_ids(&self) -> Vec<PlayerId> {
        self.players().filter(|p| !p.is_dealer).map(|p| p.id).collect()
    }

    fn next_card_id(&mut self) -> CardId {
        let id = self.next_card_id;
        self.next_card_id += 1;
        id
    }

    /// 有放回地随机发 4 张副牌
    fn deal_hand(&mut self) -> Vec<SideCard> {
        (0..HAND_SIZE)
            .map(|_| {
                let id = self.next_card_id();
                SideCard { id, value: self.source.side_card_value() }
            })
            .collect()
    }

    fn insert_player(&mut self, player: Player) {
        // 第一个加入的玩家先手
        if self.seat_order.is_empty() {
            self.current_player_id = Some(player.id);
        }
        self.seat_order.push(player.id);
        self.players.insert(player.id, player);
    }

    /// 可供真人入座的座位数。单人模式的第二个座位留给庄家。
    fn human_seats(&self) -> usize {
        if self.multiplayer { MAX_SEATS } else { MAX_SEATS - 1 }
    }

    /// 新玩家入座，只能在 Waiting 阶段进行
    pub fn add_player(&mut self, id: PlayerId) -> GameResult<()> {
        if self.players.contains_key(&id) {
            return Err(GameError::AlreadyInRoom);
        }
        if self.seat_order.len() >= self.human_seats() {
            return Err(GameError::RoomFull);
        }
        if self.phase != GamePhase::Waiting {
            return Err(MoveRejection::WrongPhase.into());
        }
        let hand = self.deal_hand();
        self.insert_player(Player::new(id, hand));
        debug!(room_id = %self.room_id, player_id = %id, "玩家入座");
        Ok(())
    }

    /// 玩家准备。满足开局条件时直接开局，返回是否已开局。
    ///
    /// - 单人模式：房间内所有真人都准备好即开局 (庄家在开局时自动加入)
    /// - 多人模式：两个座位都坐满且都已准备
    pub fn mark_ready(&mut self, id: PlayerId) -> GameResult<bool> {
        if self.phase != GamePhase::Waiting {
            return Err(MoveRejection::WrongPhase.into());
        }
        let player = self.players.get_mut(&id).ok_or(MoveRejection::UnknownPlayer)?;
        player.is_ready = true;

        let all_ready = self.players.values().all(|p| p.is_ready);
        let should_start = if self.multiplayer {
            all_ready && self.players.len() >= MAX_SEATS
        } else {
            all_ready
        };
        if !should_start {
            return Ok(false);
        }
        self.start_game()?;
        Ok(true)
    }

    /// 开始游戏
    ///
    /// 单人模式下如果只有一个真人，自动加入一个已准备的庄家。
    /// 成功后进入 Playing，并给每位玩家发一张主牌。
    pub fn start_game(&mut self) -> GameResult<()> {
        if self.phase != GamePhase::Waiting {
            return Err(MoveRejection::WrongPhase.into());
        }
        if !self.multiplayer && self.players.len() == 1 {
            let hand = self.deal_hand();
            self.insert_player(Player::dealer(hand));
        }
        if self.players.len() < MAX_SEATS {
            return Err(GameError::NoOpponent);
        }

        self.phase = GamePhase::Playing;
        self.turn_started_at = Some(Instant::now());
        self.current_player_id = self.seat_order.first().copied();
        for id in self.seat_order.clone() {
            self.deal_main_card(id);
        }
        info!(room_id = %self.room_id, multiplayer = self.multiplayer, "游戏开始");
        Ok(())
    }

    /// 从主牌堆抽一张 [1,10] 的牌放到玩家桌面上
    fn deal_main_card(&mut self, id: PlayerId) -> Option<i32> {
        if !self.players.contains_key(&id) {
            return None;
        }
        let card = BoardCard::main(self.next_card_id(), self.source.main_card_value());
        self.players.get_mut(&id)?.place(card);
        Some(card.value)
    }

    /// 爆牌的玩家被强制停牌，不再获得回合
    fn settle_bust(&mut self, id: PlayerId) -> bool {
        match self.players.get_mut(&id) {
            Some(player) if player.is_bust() => {
                player.has_stood = true;
                true
            }
            _ => false,
        }
    }

    pub fn is_valid_move(&self, id: &PlayerId) -> GameResult<()> {
        if self.phase != GamePhase::Playing {
            return Err(MoveRejection::WrongPhase.into());
        }
        if self.current_player_id != Some(*id) {
            return Err(MoveRejection::NotYourTurn.into());
        }
        let player = self.players.get(id).ok_or(MoveRejection::UnknownPlayer)?;
        if player.has_stood {
            return Err(MoveRejection::AlreadyStood.into());
        }
        Ok(())
    }

    /// 要牌。没有爆牌时保留行动权，爆牌则强制停牌并交出回合。
    pub fn hit(&mut self, player_id: PlayerId) -> GameResult<()> {
        self.is_valid_move(&player_id)?;
        let value = self.deal_main_card(player_id);
        let busted = self.settle_bust(player_id);
        debug!(room_id = %self.room_id, %player_id, ?value, busted, "要牌");
        self.finish_action(busted);
        Ok(())
    }

    pub fn stand(&mut self, player_id: PlayerId) -> GameResult<()> {
        self.is_valid_move(&player_id)?;
        if let Some(player) = self.players.get_mut(&player_id) {
            player.has_stood = true;
        }
        debug!(room_id = %self.room_id, %player_id, "停牌");
        self.finish_action(true);
        Ok(())
    }

    /// 打出一张副牌到目标玩家 (可以是自己) 的桌面上
    ///
    /// 副牌无论打给谁都会从出牌者手中移除。
    /// 多人模式下未停牌的出牌者保留行动权，其余情况交出回合。
    pub fn play_side_card(
        &mut self,
        player_id: PlayerId,
        card_id: CardId,
        target_player_id: PlayerId,
    ) -> GameResult<()> {
        self.is_valid_move(&player_id)?;
        if !self.players.contains_key(&target_player_id) {
            return Err(MoveRejection::UnknownPlayer.into());
        }
        let card = self
            .players
            .get_mut(&player_id)
            .and_then(|p| p.take_side_card(card_id))
            .ok_or(MoveRejection::UnknownCard)?;

        if let Some(target) = self.players.get_mut(&target_player_id) {
            target.place(BoardCard::side(card.id, card.value, player_id));
        }
        let busted = self.settle_bust(target_player_id);
        debug!(
            room_id = %self.room_id, %player_id, %target_player_id,
            value = card.value, busted, "打出副牌"
        );

        let actor_stood = self.players.get(&player_id).is_some_and(|p| p.has_stood);
        self.finish_action(!self.multiplayer || actor_stood);
        Ok(())
    }

    /// 每个动作结束后先检查游戏是否结束，未结束时再按需交出回合。
    /// 先判终局保证轮转时一定存在可行动的玩家。
    fn finish_action(&mut self, yield_turn: bool) {
        if self.check_end() {
            return;
        }
        if yield_turn {
            self.advance_turn();
        }
    }

    /// 将行动权转移给下一位合法的玩家
    ///
    /// 按座位顺序向后搜索，最多检查一圈，跳过已停牌或爆牌的玩家。
    /// 单人模式只有两个座位，因此效果就是在真人和庄家之间交替。
    pub fn advance_turn(&mut self) {
        if self.phase != GamePhase::Playing {
            return;
        }
        let len = self.seat_order.len();
        if len == 0 {
            self.current_player_id = None;
            return;
        }
        let start = self
            .current_player_id
            .and_then(|id| self.seat_order.iter().position(|p| *p == id))
            .unwrap_or(len - 1);
        self.advance_from(start);
    }

    fn advance_from(&mut self, start: usize) {
        let len = self.seat_order.len();
        let next = (1..=len)
            .map(|step| self.seat_order[(start + step) % len])
            .find(|id| self.players.get(id).is_some_and(|p| !p.is_done()));

        match next {
            Some(id) => self.hand_turn_to(id),
            None => {
                // 终局检测应该已经先触发，走到这里说明状态不一致
                error!(room_id = %self.room_id, "所有玩家都已停牌，却仍在轮转回合");
                debug_assert!(false, "advance_turn with every player done");
            }
        }
    }

    fn hand_turn_to(&mut self, id: PlayerId) {
        self.current_player_id = Some(id);
        self.turn_started_at = Some(Instant::now());
        debug!(room_id = %self.room_id, player_id = %id, "轮到玩家行动");

        let is_dealer = self.players.get(&id).is_some_and(|p| p.is_dealer);
        if is_dealer && !self.multiplayer {
            self.run_dealer_turn();
        }
    }

    /// 庄家在轮转时就地行动，直到停牌、爆牌或交出回合
    fn run_dealer_turn(&mut self) {
        for _ in 0..MAX_DEALER_ACTIONS {
            if self.phase != GamePhase::Playing {
                return;
            }
            let Some(dealer_id) = self.current_player_id else {
                return;
            };
            let score = match self.players.get(&dealer_id) {
                Some(p) if p.is_dealer && !p.is_done() => p.score(),
                _ => return,
            };

            let decision = dealer_policy(score, self.source.as_mut());
            debug!(room_id = %self.room_id, score, ?decision, "庄家决策");
            let outcome = match decision {
                DealerDecision::Hit => self.hit(dealer_id),
                DealerDecision::Stand => self.stand(dealer_id),
            };
            if let Err(e) = outcome {
                error!(room_id = %self.room_id, error = %e, "庄家动作被拒绝");
                return;
            }
        }
        error!(room_id = %self.room_id, "庄家动作次数超过上限");
    }

    /// 所有玩家都停牌或爆牌时进入 Finished
    pub fn check_end(&mut self) -> bool {
        match self.phase {
            GamePhase::Finished => true,
            GamePhase::Waiting => false,
            GamePhase::Playing => {
                if self.players.values().all(Player::is_done) {
                    self.phase = GamePhase::Finished;
                    info!(room_id = %self.room_id, winner = ?self.winner(), "游戏结束");
                    true
                } else {
                    false
                }
            }
        }
    }

    /// 胜者：未爆牌玩家中分数严格最高的一位。无人合格或最高分并列时为平局 (None)。
    pub fn winner(&self) -> Option<PlayerId> {
        if self.phase != GamePhase::Finished {
            return None;
        }
        let best = self.players.values().filter(|p| !p.is_bust()).map(Player::score).max()?;
        let mut leaders = self.players().filter(|p| !p.is_bust() && p.score() == best);
        match (leaders.next(), leaders.next()) {
            (Some(player), None) => Some(player.id),
            _ => None,
        }
    }

    /// 结算消息，只在 Finished 阶段返回
    pub fn game_over(&self) -> Option<ServerMessage> {
        if self.phase != GamePhase::Finished {
            return None;
        }
        let winner = self.winner();
        let results = self
            .players()
            .map(|p| PlayerResult {
                player_id: p.id,
                score: p.score(),
                has_won: Some(p.id) == winner,
            })
            .collect();
        Some(ServerMessage::GameOver { winner, results })
    }

    /// 玩家离开房间
    ///
    /// 游戏进行中会重新检查终局；如果离开的是当前行动者，
    /// 行动权交给其后面第一个还能行动的玩家。
    pub fn remove_player(&mut self, id: PlayerId) -> bool {
        let Some(pos) = self.seat_order.iter().position(|p| *p == id) else {
            return false;
        };
        self.seat_order.remove(pos);
        self.players.remove(&id);
        let was_current = self.current_player_id == Some(id);

        if self.seat_order.is_empty() {
            self.current_player_id = None;
            return true;
        }
        match self.phase {
            GamePhase::Waiting => {
                if was_current {
                    self.current_player_id = self.seat_order.first().copied();
                }
            }
            GamePhase::Playing => {
                if !self.check_end() && was_current {
                    let len = self.seat_order.len();
                    // 从离开者原来位置的前一个座位开始搜索，即下一个被检查的是其后继
                    self.advance_from((pos + len - 1) % len);
                }
            }
            GamePhase::Finished => {}
        }
        true
    }

    /// 剩余回合时间 (毫秒)，超时后为负数
    pub fn turn_time_left_ms(&self) -> i64 {
        match self.turn_started_at {
            Some(started) => {
                let elapsed = i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX);
                TURN_TIMEOUT_MS.saturating_sub(elapsed)
            }
            None => TURN_TIMEOUT_MS,
        }
    }

    /// 完整游戏状态的快照
    pub fn snapshot(&self) -> GameSnapshot {
        GameSnapshot {
            room_id: self.room_id,
            phase: self.phase,
            current_player_id: self.current_player_id,
            players: self.players().map(Player::view).collect(),
            multiplayer: self.multiplayer,
            turn_time_left_ms: self.turn_time_left_ms(),
        }
    }
}

// --- 单元测试 ---
