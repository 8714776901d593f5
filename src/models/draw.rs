use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Prize, PrizeLevel};

/// 单次抽奖请求上下文（一次请求一个，由调用方构造后即不再变化）
/// now 由外部注入而非内部读取系统时钟，保证分时段逻辑可测试、可复现
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DrawContext {
    pub user_id: i64,
    /// 本次抽奖前连续未中奖次数
    pub lose_streak: u32,
    /// 最近窗口内 (默认24h) 的中奖次数
    pub recent_win_count: u32,
    /// 本次抽奖发生时间
    pub now: DateTime<Utc>,
}

impl DrawContext {
    pub fn new(user_id: i64, now: DateTime<Utc>) -> Self {
        DrawContext {
            user_id,
            lose_streak: 0,
            recent_win_count: 0,
            now,
        }
    }
}

/// 抽奖结果
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DrawOutcome {
    /// 选中的奖品（可能是未中奖档）
    pub prize: Prize,
    /// 是否由保底机制锁定
    pub is_guaranteed: bool,
    /// 是否实际消耗了一份限量库存
    pub inventory_decremented: bool,
}

impl DrawOutcome {
    pub fn is_win(&self) -> bool {
        self.prize.level.is_win()
    }
}

/// 抽奖历史记录（字段为快照，与奖品配置的后续变更解耦）
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DrawRecord {
    pub user_id: i64,
    pub prize_id: i64,
    pub prize_name: String,
    pub prize_level: PrizeLevel,
    pub is_guaranteed: bool,
    pub created_at: DateTime<Utc>,
}

impl DrawRecord {
    /// 由抽奖结果生成历史快照
    pub fn from_outcome(outcome: &DrawOutcome, ctx: &DrawContext) -> Self {
        DrawRecord {
            user_id: ctx.user_id,
            prize_id: outcome.prize.id,
            prize_name: outcome.prize.name.clone(),
            prize_level: outcome.prize.level,
            is_guaranteed: outcome.is_guaranteed,
            created_at: ctx.now,
        }
    }

    pub fn is_win(&self) -> bool {
        self.prize_level.is_win()
    }
}
