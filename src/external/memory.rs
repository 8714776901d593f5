use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::{Mutex, RwLock};

use crate::error::{AppError, AppResult};
use crate::external::{DrawHistory, Eligibility, EligibilityChecker, PrizeStore};
use crate::models::{DrawContext, DrawRecord, Prize};

/// 默认每用户每日抽奖上限
const DEFAULT_DAILY_DRAW_LIMIT: u32 = 5;
/// 默认两次抽奖最小间隔
const DEFAULT_MIN_DRAW_INTERVAL_SECS: i64 = 3;
/// 近期中奖统计的回看窗口
const RECENT_WIN_WINDOW_HOURS: i64 = 24;

struct PrizeEntry {
    prize: Prize,
    /// None = 无限库存, 不参与扣减
    remaining: Option<AtomicI64>,
}

/// 内存奖池实现 (测试与单进程部署的参考实现)
///
/// 库存扣减走每个奖品独立的原子计数器,
/// 不同奖品之间的扣减互不阻塞, 同一奖品用 CAS 循环保证不超卖
#[derive(Default)]
pub struct MemoryPrizeStore {
    /// pool_id -> 奖品 id 列表 (保持插入顺序, 抽取迭代序稳定)
    pools: RwLock<HashMap<String, Vec<i64>>>,
    entries: RwLock<HashMap<i64, Arc<PrizeEntry>>>,
}

impl MemoryPrizeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 将一组奖品放入指定奖池, 奖品的 stock_remaining 作为初始库存
    pub async fn insert_pool(&self, pool_id: &str, prizes: Vec<Prize>) {
        let mut ids = Vec::with_capacity(prizes.len());
        {
            let mut entries = self.entries.write().await;
            for prize in prizes {
                ids.push(prize.id);
                let remaining = prize.stock_remaining.map(AtomicI64::new);
                entries.insert(prize.id, Arc::new(PrizeEntry { prize, remaining }));
            }
        }
        self.pools.write().await.insert(pool_id.to_string(), ids);
    }
}

impl PrizeStore for MemoryPrizeStore {
    async fn load_prizes(&self, pool_id: &str) -> AppResult<Vec<Prize>> {
        let pools = self.pools.read().await;
        let ids = pools
            .get(pool_id)
            .ok_or_else(|| AppError::ValidationError(format!("Unknown prize pool: {pool_id}")))?;
        let entries = self.entries.read().await;
        let mut prizes = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(entry) = entries.get(id) {
                let mut prize = entry.prize.clone();
                // 库存读当前计数器而非插入时的快照
                prize.stock_remaining = entry
                    .remaining
                    .as_ref()
                    .map(|counter| counter.load(Ordering::SeqCst));
                prizes.push(prize);
            }
        }
        Ok(prizes)
    }

    async fn atomic_decrement_stock(&self, prize_id: i64) -> AppResult<bool> {
        let entries = self.entries.read().await;
        let entry = entries
            .get(&prize_id)
            .ok_or_else(|| AppError::PersistenceError(format!("Prize {prize_id} not found")))?;
        let Some(counter) = &entry.remaining else {
            // 无限库存恒成功且不修改状态
            return Ok(true);
        };

        // CAS 循环: 仅当当前值 > 0 时减一
        let mut current = counter.load(Ordering::SeqCst);
        loop {
            if current <= 0 {
                return Ok(false);
            }
            match counter.compare_exchange(
                current,
                current - 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return Ok(true),
                Err(actual) => current = actual,
            }
        }
    }

    async fn restock(&self, prize_id: i64, qty: i64) -> AppResult<()> {
        if qty <= 0 {
            return Err(AppError::ValidationError(
                "Restock quantity must be positive".into(),
            ));
        }
        let entries = self.entries.read().await;
        let entry = entries
            .get(&prize_id)
            .ok_or_else(|| AppError::PersistenceError(format!("Prize {prize_id} not found")))?;
        if let Some(counter) = &entry.remaining {
            counter.fetch_add(qty, Ordering::SeqCst);
        }
        // 无限库存奖品补货为空操作
        Ok(())
    }
}

struct UserDrawState {
    day: NaiveDate,
    draws_today: u32,
    last_draw: Option<DateTime<Utc>>,
}

/// 内存资格校验: 每日上限 + 最小间隔 + 封禁名单
pub struct MemoryEligibility {
    daily_limit: u32,
    min_interval: Duration,
    state: Mutex<HashMap<i64, UserDrawState>>,
    blocked: Mutex<HashSet<i64>>,
}

impl Default for MemoryEligibility {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryEligibility {
    pub fn new() -> Self {
        Self::with_limits(
            DEFAULT_DAILY_DRAW_LIMIT,
            Duration::seconds(DEFAULT_MIN_DRAW_INTERVAL_SECS),
        )
    }

    pub fn with_limits(daily_limit: u32, min_interval: Duration) -> Self {
        MemoryEligibility {
            daily_limit,
            min_interval,
            state: Mutex::new(HashMap::new()),
            blocked: Mutex::new(HashSet::new()),
        }
    }

    pub async fn block_user(&self, user_id: i64) {
        self.blocked.lock().await.insert(user_id);
    }

    /// 记录一次抽奖 (调用方在抽奖返回后调用); 跨天自动重置当日计数
    pub async fn record_draw(&self, user_id: i64, now: DateTime<Utc>) {
        let mut state = self.state.lock().await;
        let entry = state.entry(user_id).or_insert(UserDrawState {
            day: now.date_naive(),
            draws_today: 0,
            last_draw: None,
        });
        if entry.day != now.date_naive() {
            entry.day = now.date_naive();
            entry.draws_today = 0;
        }
        entry.draws_today += 1;
        entry.last_draw = Some(now);
    }
}

impl EligibilityChecker for MemoryEligibility {
    async fn check_eligible(&self, user_id: i64, now: DateTime<Utc>) -> AppResult<Eligibility> {
        if self.blocked.lock().await.contains(&user_id) {
            return Ok(Eligibility::denied("Account is blocked"));
        }

        let state = self.state.lock().await;
        if let Some(entry) = state.get(&user_id) {
            if entry.day == now.date_naive() && entry.draws_today >= self.daily_limit {
                return Ok(Eligibility::denied("Daily draw limit reached"));
            }
            if let Some(last) = entry.last_draw
                && now - last < self.min_interval
            {
                return Ok(Eligibility::denied("Draws too frequent, try again later"));
            }
        }
        Ok(Eligibility::ok())
    }
}

/// 永远放行的资格校验 (测试用)
#[derive(Clone, Copy, Debug, Default)]
pub struct AlwaysEligible;

impl EligibilityChecker for AlwaysEligible {
    async fn check_eligible(&self, _user_id: i64, _now: DateTime<Utc>) -> AppResult<Eligibility> {
        Ok(Eligibility::ok())
    }
}

/// 内存抽奖历史 (append-only), 并提供构造 DrawContext 所需的派生统计
#[derive(Default)]
pub struct MemoryDrawHistory {
    records: Mutex<Vec<DrawRecord>>,
}

impl MemoryDrawHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// 连续未中奖次数: 从最近一条记录向前数, 遇中奖即止
    pub async fn lose_streak(&self, user_id: i64) -> u32 {
        let records = self.records.lock().await;
        let mut streak = 0;
        for record in records.iter().rev().filter(|r| r.user_id == user_id) {
            if record.is_win() {
                break;
            }
            streak += 1;
        }
        streak
    }

    /// 回看窗口内的中奖次数
    pub async fn recent_win_count(
        &self,
        user_id: i64,
        now: DateTime<Utc>,
        window: Duration,
    ) -> u32 {
        let since = now - window;
        let records = self.records.lock().await;
        records
            .iter()
            .filter(|r| r.user_id == user_id && r.is_win() && r.created_at >= since)
            .count() as u32
    }

    /// 汇总派生统计, 生成一次抽奖的上下文 (窗口默认 24h)
    pub async fn context_for(&self, user_id: i64, now: DateTime<Utc>) -> DrawContext {
        DrawContext {
            user_id,
            lose_streak: self.lose_streak(user_id).await,
            recent_win_count: self
                .recent_win_count(user_id, now, Duration::hours(RECENT_WIN_WINDOW_HOURS))
                .await,
            now,
        }
    }

    pub async fn records_for(&self, user_id: i64) -> Vec<DrawRecord> {
        let records = self.records.lock().await;
        records
            .iter()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect()
    }
}

impl DrawHistory for MemoryDrawHistory {
    async fn append_draw_record(&self, record: DrawRecord) -> AppResult<()> {
        self.records.lock().await.push(record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PrizeLevel;
    use chrono::TimeZone;

    fn prize(id: i64, level: PrizeLevel, stock: Option<i64>) -> Prize {
        Prize {
            id,
            name: format!("prize-{id}"),
            level,
            probability: 1.0,
            stock_remaining: stock,
            daily_limit: None,
            value_cents: 0,
            points: 0,
        }
    }

    fn record(user_id: i64, level: PrizeLevel, at: DateTime<Utc>) -> DrawRecord {
        DrawRecord {
            user_id,
            prize_id: 1,
            prize_name: "prize".to_string(),
            prize_level: level,
            is_guaranteed: false,
            created_at: at,
        }
    }

    #[tokio::test]
    async fn test_decrement_until_exhausted() {
        let store = MemoryPrizeStore::new();
        store
            .insert_pool("default", vec![prize(1, PrizeLevel::Grand, Some(2))])
            .await;

        assert!(store.atomic_decrement_stock(1).await.unwrap());
        assert!(store.atomic_decrement_stock(1).await.unwrap());
        assert!(!store.atomic_decrement_stock(1).await.unwrap());

        // 耗尽立即对后续读可见
        let prizes = store.load_prizes("default").await.unwrap();
        assert_eq!(prizes[0].stock_remaining, Some(0));
        assert!(!prizes[0].is_available());
    }

    #[tokio::test]
    async fn test_unlimited_stock_never_mutates() {
        let store = MemoryPrizeStore::new();
        store
            .insert_pool("default", vec![prize(1, PrizeLevel::NoWin, None)])
            .await;
        for _ in 0..100 {
            assert!(store.atomic_decrement_stock(1).await.unwrap());
        }
        let prizes = store.load_prizes("default").await.unwrap();
        assert_eq!(prizes[0].stock_remaining, None);
    }

    #[tokio::test]
    async fn test_restock_reopens_prize() {
        let store = MemoryPrizeStore::new();
        store
            .insert_pool("default", vec![prize(1, PrizeLevel::First, Some(1))])
            .await;
        assert!(store.atomic_decrement_stock(1).await.unwrap());
        assert!(!store.atomic_decrement_stock(1).await.unwrap());

        store.restock(1, 3).await.unwrap();
        let prizes = store.load_prizes("default").await.unwrap();
        assert_eq!(prizes[0].stock_remaining, Some(3));
        assert!(store.atomic_decrement_stock(1).await.unwrap());
    }

    #[tokio::test]
    async fn test_restock_rejects_non_positive_qty() {
        let store = MemoryPrizeStore::new();
        store
            .insert_pool("default", vec![prize(1, PrizeLevel::First, Some(1))])
            .await;
        assert!(store.restock(1, 0).await.is_err());
        assert!(store.restock(1, -5).await.is_err());
    }

    #[tokio::test]
    async fn test_unknown_pool_is_an_error() {
        let store = MemoryPrizeStore::new();
        assert!(store.load_prizes("nope").await.is_err());
    }

    #[tokio::test]
    async fn test_daily_limit_and_interval() {
        let eligibility = MemoryEligibility::with_limits(2, Duration::seconds(3));
        let t0 = Utc.with_ymd_and_hms(2025, 6, 15, 10, 0, 0).unwrap();

        assert!(eligibility.check_eligible(1, t0).await.unwrap().allowed);
        eligibility.record_draw(1, t0).await;

        // 间隔不足 3 秒
        let denied = eligibility
            .check_eligible(1, t0 + Duration::seconds(1))
            .await
            .unwrap();
        assert!(!denied.allowed);

        let t1 = t0 + Duration::seconds(10);
        assert!(eligibility.check_eligible(1, t1).await.unwrap().allowed);
        eligibility.record_draw(1, t1).await;

        // 当日 2 次用尽
        let denied = eligibility
            .check_eligible(1, t1 + Duration::seconds(10))
            .await
            .unwrap();
        assert!(!denied.allowed);
        assert_eq!(denied.reason, "Daily draw limit reached");

        // 次日重置
        let next_day = t0 + Duration::days(1);
        assert!(
            eligibility
                .check_eligible(1, next_day)
                .await
                .unwrap()
                .allowed
        );
    }

    #[tokio::test]
    async fn test_blocked_user_is_denied() {
        let eligibility = MemoryEligibility::new();
        let now = Utc.with_ymd_and_hms(2025, 6, 15, 10, 0, 0).unwrap();
        eligibility.block_user(7).await;
        let result = eligibility.check_eligible(7, now).await.unwrap();
        assert!(!result.allowed);
        assert_eq!(result.reason, "Account is blocked");
    }

    #[tokio::test]
    async fn test_lose_streak_stops_at_last_win() {
        let history = MemoryDrawHistory::new();
        let t0 = Utc.with_ymd_and_hms(2025, 6, 15, 10, 0, 0).unwrap();
        for (i, level) in [
            PrizeLevel::NoWin,
            PrizeLevel::Second,
            PrizeLevel::NoWin,
            PrizeLevel::NoWin,
            PrizeLevel::NoWin,
        ]
        .into_iter()
        .enumerate()
        {
            history
                .append_draw_record(record(1, level, t0 + Duration::minutes(i as i64)))
                .await
                .unwrap();
        }
        // 其他用户的记录不影响统计
        history
            .append_draw_record(record(2, PrizeLevel::Grand, t0))
            .await
            .unwrap();

        assert_eq!(history.lose_streak(1).await, 3);
        assert_eq!(history.lose_streak(2).await, 0);
        assert_eq!(history.lose_streak(3).await, 0);
    }

    #[tokio::test]
    async fn test_recent_win_count_respects_window() {
        let history = MemoryDrawHistory::new();
        let now = Utc.with_ymd_and_hms(2025, 6, 15, 10, 0, 0).unwrap();
        history
            .append_draw_record(record(1, PrizeLevel::First, now - Duration::hours(30)))
            .await
            .unwrap();
        history
            .append_draw_record(record(1, PrizeLevel::Second, now - Duration::hours(2)))
            .await
            .unwrap();
        history
            .append_draw_record(record(1, PrizeLevel::NoWin, now - Duration::hours(1)))
            .await
            .unwrap();

        assert_eq!(
            history.recent_win_count(1, now, Duration::hours(24)).await,
            1
        );

        let ctx = history.context_for(1, now).await;
        assert_eq!(ctx.recent_win_count, 1);
        assert_eq!(ctx.lose_streak, 1);
    }
}
