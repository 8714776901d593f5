use chrono::{DateTime, Utc};

use crate::error::AppResult;
use crate::models::{DrawRecord, Prize};

pub mod memory;

pub use memory::*;

/// 资格校验结果
#[derive(Clone, Debug)]
pub struct Eligibility {
    pub allowed: bool,
    pub reason: String,
}

impl Eligibility {
    pub fn ok() -> Self {
        Eligibility {
            allowed: true,
            reason: String::new(),
        }
    }

    pub fn denied(reason: impl Into<String>) -> Self {
        Eligibility {
            allowed: false,
            reason: reason.into(),
        }
    }
}

/// 资格校验协作者: 封装每日上限 / 最小抽奖间隔 / 封禁等判断
#[allow(async_fn_in_trait)]
pub trait EligibilityChecker {
    async fn check_eligible(&self, user_id: i64, now: DateTime<Utc>) -> AppResult<Eligibility>;
}

/// 奖池持久化协作者
#[allow(async_fn_in_trait)]
pub trait PrizeStore {
    /// 读取指定奖池的全部奖品 (含库存快照)
    async fn load_prizes(&self, pool_id: &str) -> AppResult<Vec<Prize>>;

    /// 原子扣减库存: 仅当剩余 > 0 时减一并返回 true
    /// 无限库存奖品恒返回 true 且不修改任何状态
    /// 并发约束: 剩余为 1 时两个并发调用必须恰好一成一败
    async fn atomic_decrement_stock(&self, prize_id: i64) -> AppResult<bool>;

    /// 补货 (管理端操作, 不在抽奖路径上)
    async fn restock(&self, prize_id: i64, qty: i64) -> AppResult<()>;
}

/// 抽奖历史协作者: 引擎侧视为 fire-and-forget,
/// 追加失败只记日志, 不影响已经计算完成的抽奖结果
#[allow(async_fn_in_trait)]
pub trait DrawHistory {
    async fn append_draw_record(&self, record: DrawRecord) -> AppResult<()>;
}

// 协作者通常以 Arc 共享给引擎与管理端, 这里做透明转发
impl<T: EligibilityChecker> EligibilityChecker for std::sync::Arc<T> {
    async fn check_eligible(&self, user_id: i64, now: DateTime<Utc>) -> AppResult<Eligibility> {
        (**self).check_eligible(user_id, now).await
    }
}

impl<T: PrizeStore> PrizeStore for std::sync::Arc<T> {
    async fn load_prizes(&self, pool_id: &str) -> AppResult<Vec<Prize>> {
        (**self).load_prizes(pool_id).await
    }

    async fn atomic_decrement_stock(&self, prize_id: i64) -> AppResult<bool> {
        (**self).atomic_decrement_stock(prize_id).await
    }

    async fn restock(&self, prize_id: i64, qty: i64) -> AppResult<()> {
        (**self).restock(prize_id, qty).await
    }
}

impl<T: DrawHistory> DrawHistory for std::sync::Arc<T> {
    async fn append_draw_record(&self, record: DrawRecord) -> AppResult<()> {
        (**self).append_draw_record(record).await
    }
}
