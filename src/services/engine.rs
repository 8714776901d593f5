use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::DrawConfig;
use crate::error::{AppError, AppResult};
use crate::external::{DrawHistory, EligibilityChecker, PrizeStore};
use crate::models::{DrawContext, DrawOutcome, DrawRecord, Prize};
use crate::services::fairness::FairnessAdjuster;
use crate::services::selector::select_by_weight;

/// 抽奖引擎: 串联资格校验、公平性调整、加权抽取与库存扣减
///
/// 单次抽奖的状态流转:
/// Start -> 资格校验 -> {保底锁定 | 加权抽取} -> {扣减成功 | 降级未中奖} -> Done
/// 单次请求内不做重试, 降级即终态
#[derive(Clone)]
pub struct DrawEngine<E, S, H> {
    eligibility: E,
    store: S,
    history: H,
    fairness: FairnessAdjuster,
    config: DrawConfig,
}

impl<E, S, H> DrawEngine<E, S, H>
where
    E: EligibilityChecker,
    S: PrizeStore,
    H: DrawHistory,
{
    pub fn new(config: DrawConfig, eligibility: E, store: S, history: H) -> Self {
        let fairness = FairnessAdjuster::new(config.clone());
        Self {
            eligibility,
            store,
            history,
            fairness,
            config,
        }
    }

    /// 执行一次抽奖
    pub async fn draw(&self, pool_id: &str, ctx: &DrawContext) -> AppResult<DrawOutcome> {
        let mut rng = StdRng::from_entropy();
        self.draw_with_rng(pool_id, ctx, &mut rng).await
    }

    /// 注入随机源的版本 (可复现 / 测试用)
    ///
    /// 流程:
    /// 1. 资格校验 (外部协作者, 不通过返回 Ineligible)
    /// 2. 读取奖池并过滤无库存奖品, 过滤后为空视为配置错误
    /// 3. 连败达到保底阈值且保底奖品有库存时直接锁定 (确定性覆盖随机)
    /// 4. 否则经衰减 + 分时段调整后按权重随机抽取
    /// 5. 中奖档尝试原子扣减库存, 竞争失败降级为未中奖而非报错
    /// 6. 写历史记录, 失败仅记日志
    pub async fn draw_with_rng<R: Rng>(
        &self,
        pool_id: &str,
        ctx: &DrawContext,
        rng: &mut R,
    ) -> AppResult<DrawOutcome> {
        let check = self
            .eligibility
            .check_eligible(ctx.user_id, ctx.now)
            .await?;
        if !check.allowed {
            return Err(AppError::Ineligible(check.reason));
        }

        let mut pool = self.store.load_prizes(pool_id).await?;
        pool.retain(|p| p.is_available());
        if pool.is_empty() {
            return Err(AppError::EmptyPool);
        }

        let (selected, is_guaranteed) = self.select_prize(&pool, ctx, rng)?;
        let mut outcome = DrawOutcome {
            prize: selected,
            is_guaranteed,
            inventory_decremented: false,
        };

        if outcome.prize.level.is_win() {
            match self.store.atomic_decrement_stock(outcome.prize.id).await {
                Ok(true) => {
                    outcome.inventory_decremented = true;
                    // 返回给调用方的库存快照同步减一
                    if let Some(remain) = outcome.prize.stock_remaining.as_mut() {
                        *remain -= 1;
                    }
                }
                Ok(false) => {
                    log::warn!(
                        "Stock race lost for prize {}, downgrading to no-win",
                        outcome.prize.id
                    );
                    self.downgrade(&mut outcome, &pool)?;
                }
                Err(e) => {
                    log::warn!(
                        "Stock decrement failed for prize {}: {e}, downgrading to no-win",
                        outcome.prize.id
                    );
                    self.downgrade(&mut outcome, &pool)?;
                }
            }
        }

        let record = DrawRecord::from_outcome(&outcome, ctx);
        if let Err(e) = self.history.append_draw_record(record).await {
            // 结果已经确定, 历史写入失败不能让本次抽奖失败
            log::warn!(
                "Failed to append draw record for user {}: {e}",
                ctx.user_id
            );
        }

        Ok(outcome)
    }

    /// 保底优先, 否则调整后加权抽取
    fn select_prize<R: Rng>(
        &self,
        pool: &[Prize],
        ctx: &DrawContext,
        rng: &mut R,
    ) -> AppResult<(Prize, bool)> {
        if self.fairness.guarantee_due(ctx) {
            let guaranteed = pool
                .iter()
                .find(|p| p.level == self.config.guarantee_prize_level && p.is_available());
            if let Some(prize) = guaranteed {
                return Ok((prize.clone(), true));
            }
            // 保底等级奖品无库存时退回普通加权抽取
            log::warn!(
                "Guarantee due for user {} but no {} prize in stock",
                ctx.user_id,
                self.config.guarantee_prize_level
            );
        }

        let adjusted = self.fairness.adjust(pool, ctx);
        let chosen =
            select_by_weight(&adjusted, |a| a.weight, rng).ok_or(AppError::EmptyPool)?;
        Ok((chosen.prize.clone(), false))
    }

    /// 库存竞争失败时降级为未中奖; 奖池缺少未中奖档属于配置错误
    fn downgrade(&self, outcome: &mut DrawOutcome, pool: &[Prize]) -> AppResult<()> {
        let no_win = pool.iter().find(|p| !p.level.is_win()).ok_or_else(|| {
            AppError::ValidationError("Prize pool has no no-win entry to downgrade to".into())
        })?;
        outcome.prize = no_win.clone();
        outcome.is_guaranteed = false;
        outcome.inventory_decremented = false;
        Ok(())
    }
}
