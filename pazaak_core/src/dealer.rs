//! 单人模式下的庄家 AI。
//!
//! 纯函数：只依赖庄家当前分数和注入的随机源，不保存任何内部状态，
//! 每次轮到庄家决策时都重新计算。

use crate::card::CardSource;
use crate::state::BUST_THRESHOLD;

/// 低于这个分数庄家一定要牌
pub const DEALER_HIT_BELOW: i32 = 15;

/// 分数在 [15, 20) 区间时要牌的概率
pub const DEALER_HIT_CHANCE: f64 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DealerDecision {
    Hit,
    Stand,
}

/// 按优先级判断：
/// 1. 正好 20 分停牌
/// 2. 低于 15 分要牌
/// 3. 15..20 之间以 70% 概率要牌，否则停牌
pub fn dealer_policy(score: i32, source: &mut dyn CardSource) -> DealerDecision {
    if score == BUST_THRESHOLD {
        return DealerDecision::Stand;
    }
    if score < DEALER_HIT_BELOW {
        return DealerDecision::Hit;
    }
    if score < BUST_THRESHOLD && source.chance(DEALER_HIT_CHANCE) {
        return DealerDecision::Hit;
    }
    DealerDecision::Stand
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::RngSource;
    use crate::card::scripted::ScriptedSource;

    #[test]
    fn test_stands_on_twenty() {
        // 即使随机源想要牌，20 分也必须停牌
        let mut source = ScriptedSource::new().with_coins(&[true]);
        assert_eq!(dealer_policy(20, &mut source), DealerDecision::Stand);
        assert_eq!(source.coins.len(), 1, "20 分时不应消耗随机数");
    }

    #[test]
    fn test_always_hits_below_fifteen() {
        let mut source = ScriptedSource::new();
        for score in [-5, 0, 1, 10, 14] {
            assert_eq!(dealer_policy(score, &mut source), DealerDecision::Hit);
        }
    }

    #[test]
    fn test_mid_range_follows_coin() {
        let mut source = ScriptedSource::new().with_coins(&[true, false]);
        assert_eq!(dealer_policy(17, &mut source), DealerDecision::Hit);
        assert_eq!(dealer_policy(17, &mut source), DealerDecision::Stand);
    }

    #[test]
    fn test_mid_range_hit_rate_is_roughly_seventy_percent() {
        let mut source = RngSource::seeded(2024);
        let hits = (0..10_000)
            .filter(|_| dealer_policy(18, &mut source) == DealerDecision::Hit)
            .count();
        assert!((6_500..7_500).contains(&hits), "要牌次数 {}", hits);
    }

    #[test]
    fn test_stands_when_bust() {
        let mut source = ScriptedSource::new().with_coins(&[true]);
        assert_eq!(dealer_policy(23, &mut source), DealerDecision::Stand);
    }
}
