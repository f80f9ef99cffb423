use crate::card::{BoardCard, CardId, CardSource, SideCard};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Instant;
use uuid::Uuid;

pub type RoomId = Uuid;
pub type PlayerId = Uuid;
/// 玩家 id 与连接一一对应，传输层直接用它标识连接
pub type ConnectionId = PlayerId;

/// 单人模式下由 AI 控制的庄家座位
pub const DEALER_ID: PlayerId = Uuid::nil();

/// 分数超过这个值即爆牌
pub const BUST_THRESHOLD: i32 = 20;

/// 每回合的提示性时限 (毫秒)，服务端不会强制结束回合
pub const TURN_TIMEOUT_MS: i64 = 30_000;

/// 一个房间最多两个座位
pub const MAX_SEATS: usize = 2;

pub struct GameState {
    pub room_id: RoomId,
    pub multiplayer: bool,
    pub phase: GamePhase,
    // 可以根据 player id 查找 player
    pub(crate) players: HashMap<PlayerId, Player>,
    // 按加入顺序排列的座位，决定先手与轮转顺序
    pub(crate) seat_order: Vec<PlayerId>,
    pub(crate) current_player_id: Option<PlayerId>,
    pub(crate) turn_started_at: Option<Instant>,
    // 房间内卡牌编号计数器，保证 CardId 在房间内唯一
    pub(crate) next_card_id: CardId,
    pub(crate) source: Box<dyn CardSource>,
}

// Ord 的派生顺序即阶段推进顺序
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum GamePhase {
    Waiting,
    Playing,
    /// 终态，不会再回到前面的阶段
    Finished,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    pub id: PlayerId,
    hand: Vec<SideCard>,
    board: Vec<BoardCard>,
    // 派生值，只在 board 变化时重新计算
    score: i32,
    pub has_stood: bool,
    pub is_ready: bool,
    pub is_dealer: bool,
}

impl Player {
    pub fn new(id: PlayerId, hand: Vec<SideCard>) -> Player {
        Player {
            id,
            hand,
            board: Vec::new(),
            score: 0,
            has_stood: false,
            is_ready: false,
            is_dealer: false,
        }
    }

    /// 庄家加入时即视为已准备
    pub fn dealer(hand: Vec<SideCard>) -> Player {
        Player {
            is_ready: true,
            is_dealer: true,
            ..Player::new(DEALER_ID, hand)
        }
    }

    pub fn hand(&self) -> &[SideCard] {
        &self.hand
    }

    pub fn board(&self) -> &[BoardCard] {
        &self.board
    }

    pub fn score(&self) -> i32 {
        self.score
    }

    pub fn is_bust(&self) -> bool {
        self.score > BUST_THRESHOLD
    }

    /// 已停牌或已爆牌的玩家不会再获得回合
    pub fn is_done(&self) -> bool {
        self.has_stood || self.is_bust()
    }

    /// board 只追加不删除
    pub(crate) fn place(&mut self, card: BoardCard) {
        self.board.push(card);
        self.recompute_score();
    }

    /// 从手牌中取出一张副牌；手牌只减不增
    pub(crate) fn take_side_card(&mut self, card_id: CardId) -> Option<SideCard> {
        let idx = self.hand.iter().position(|c| c.id == card_id)?;
        Some(self.hand.remove(idx))
    }

    fn recompute_score(&mut self) {
        self.score = self.board.iter().map(|c| c.value).sum();
    }

    pub fn view(&self) -> PlayerView {
        PlayerView {
            id: self.id,
            hand: self.hand.clone(),
            hand_size: self.hand.len(),
            board: self.board.clone(),
            score: self.score,
            has_stood: self.has_stood,
            is_ready: self.is_ready,
            is_dealer: self.is_dealer,
        }
    }
}

// --- 发给客户端的快照 ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerView {
    pub id: PlayerId,
    pub hand: Vec<SideCard>,
    // 隐藏手牌时客户端仍然可以看到剩余张数
    pub hand_size: usize,
    pub board: Vec<BoardCard>,
    pub score: i32,
    pub has_stood: bool,
    pub is_ready: bool,
    pub is_dealer: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSnapshot {
    pub room_id: RoomId,
    pub phase: GamePhase,
    pub current_player_id: Option<PlayerId>,
    // 按座位顺序
    pub players: Vec<PlayerView>,
    pub multiplayer: bool,
    /// 剩余回合时间，超时后为负数 (仅供展示)
    pub turn_time_left_ms: i64,
}

impl GameSnapshot {
    /// 为某个观察者生成快照，隐藏其他玩家的副牌点数
    pub fn for_viewer(&self, viewer: &PlayerId) -> Self {
        let mut snapshot = self.clone();
        for player in snapshot.players.iter_mut() {
            if player.id != *viewer {
                player.hand.clear();
            }
        }
        snapshot
    }

    pub fn player(&self, id: &PlayerId) -> Option<&PlayerView> {
        self.players.iter().find(|p| p.id == *id)
    }
}

// --- 单元测试 ---

#[cfg(test)]
mod tests {
    use super::*;

    fn hand(values: &[i32]) -> Vec<SideCard> {
        values
            .iter()
            .enumerate()
            .map(|(i, &value)| SideCard { id: i as CardId, value })
            .collect()
    }

    #[test]
    fn test_score_tracks_board() {
        let mut player = Player::new(Uuid::new_v4(), hand(&[1, 2, 3, 4]));
        player.place(BoardCard::main(10, 8));
        player.place(BoardCard::main(11, 9));
        player.place(BoardCard::side(12, -4, player.id));
        let sum: i32 = player.board().iter().map(|c| c.value).sum();
        assert_eq!(player.score(), sum);
        assert_eq!(player.score(), 13);
        assert!(!player.is_bust());
    }

    #[test]
    fn test_bust_and_done() {
        let mut player = Player::new(Uuid::new_v4(), vec![]);
        player.place(BoardCard::main(1, 10));
        player.place(BoardCard::main(2, 10));
        assert!(!player.is_done());
        player.place(BoardCard::main(3, 1));
        assert!(player.is_bust());
        assert!(player.is_done());
    }

    #[test]
    fn test_take_side_card_only_shrinks() {
        let mut player = Player::new(Uuid::new_v4(), hand(&[5, -2, 3, 6]));
        assert_eq!(player.take_side_card(1), Some(SideCard { id: 1, value: -2 }));
        assert_eq!(player.hand().len(), 3);
        assert_eq!(player.take_side_card(1), None);
        assert_eq!(player.hand().len(), 3);
    }

    #[test]
    fn test_dealer_is_ready() {
        let dealer = Player::dealer(vec![]);
        assert_eq!(dealer.id, DEALER_ID);
        assert!(dealer.is_dealer);
        assert!(dealer.is_ready);
    }

    #[test]
    fn test_for_viewer_hides_opponent_hand() {
        let me = Player::new(Uuid::new_v4(), hand(&[1, 2, 3, 4]));
        let other = Player::new(Uuid::new_v4(), hand(&[-1, -2, -3, -4]));
        let snapshot = GameSnapshot {
            room_id: Uuid::new_v4(),
            phase: GamePhase::Waiting,
            current_player_id: Some(me.id),
            players: vec![me.view(), other.view()],
            multiplayer: true,
            turn_time_left_ms: TURN_TIMEOUT_MS,
        };

        let mine = snapshot.for_viewer(&me.id);
        assert_eq!(mine.player(&me.id).unwrap().hand.len(), 4);
        let theirs = mine.player(&other.id).unwrap();
        assert!(theirs.hand.is_empty());
        assert_eq!(theirs.hand_size, 4);
    }
}
