use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::state::PlayerId;

// --- 核心数据结构定义 ---

/// 房间内的卡牌编号，由房间内单调递增的计数器分配
pub type CardId = u64;

/// 每位玩家开局时获得的副牌数量
pub const HAND_SIZE: usize = 4;

/// 副牌可能的点数 (不含 0)
pub const SIDE_CARD_VALUES: [i32; 12] = [-6, -5, -4, -3, -2, -1, 1, 2, 3, 4, 5, 6];

/// 主牌堆的点数范围
pub const MAIN_CARD_MIN: i32 = 1;
pub const MAIN_CARD_MAX: i32 = 10;

/// 副牌 (SideCard)，玩家手中私有的修正牌
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub struct SideCard {
    pub id: CardId,
    pub value: i32,
}

/// 桌面上的牌 (BoardCard)
///
/// 主牌堆发出的牌 `is_side_card == false`；
/// 被打出的副牌带有 `is_side_card == true` 以及出牌者 `played_by`。
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub struct BoardCard {
    pub id: CardId,
    pub value: i32,
    pub is_side_card: bool,
    pub played_by: Option<PlayerId>,
}

impl BoardCard {
    pub fn main(id: CardId, value: i32) -> BoardCard {
        BoardCard { id, value, is_side_card: false, played_by: None }
    }

    pub fn side(id: CardId, value: i32, played_by: PlayerId) -> BoardCard {
        BoardCard { id, value, is_side_card: true, played_by: Some(played_by) }
    }
}

impl fmt::Display for SideCard {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{}({:+})", self.id, self.value)
    }
}

impl fmt::Display for BoardCard {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_side_card {
            write!(f, "{:+}", self.value)
        } else {
            write!(f, "{}", self.value)
        }
    }
}

// --- 随机源 ---

/// 发牌与庄家决策使用的随机源
///
/// 引擎从不直接调用全局随机数，而是通过这个 trait 取值，
/// 这样测试可以换成固定种子或脚本化的实现。
pub trait CardSource: Send {
    /// 从 `SIDE_CARD_VALUES` 中均匀抽取一个点数 (有放回)
    fn side_card_value(&mut self) -> i32;
    /// 从 `[MAIN_CARD_MIN, MAIN_CARD_MAX]` 中均匀抽取一个点数
    fn main_card_value(&mut self) -> i32;
    /// 以 `probability` 的概率返回 true
    fn chance(&mut self, probability: f64) -> bool;
}

/// 基于 `rand::Rng` 的随机源
pub struct RngSource<R> {
    rng: R,
}

impl<R: Rng> RngSource<R> {
    pub fn new(rng: R) -> Self {
        RngSource { rng }
    }
}

impl RngSource<StdRng> {
    /// 使用操作系统熵初始化
    pub fn from_os_rng() -> Self {
        RngSource::new(StdRng::from_os_rng())
    }

    pub fn seeded(seed: u64) -> Self {
        RngSource::new(StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng + Send> CardSource for RngSource<R> {
    fn side_card_value(&mut self) -> i32 {
        SIDE_CARD_VALUES[self.rng.random_range(0..SIDE_CARD_VALUES.len())]
    }

    fn main_card_value(&mut self) -> i32 {
        self.rng.random_range(MAIN_CARD_MIN..=MAIN_CARD_MAX)
    }

    fn chance(&mut self, probability: f64) -> bool {
        self.rng.random_bool(probability.clamp(0.0, 1.0))
    }
}


// --- 单元测试 ---
