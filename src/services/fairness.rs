use chrono::Timelike;

use crate::config::DrawConfig;
use crate::models::{DrawContext, Prize};

/// 权重调整后的奖品 (原始 Prize 不被修改)
#[derive(Clone, Debug)]
pub struct AdjustedPrize {
    pub prize: Prize,
    /// 调整后的有效权重
    pub weight: f64,
}

/// 公平性调整器: 在加权抽取前对奖品权重做两层乘性调整
/// 1. 衰减层 - 近期中奖越多, 中奖档权重越低 (有下限)
/// 2. 分时段层 - 按请求时刻的小时应用配置表中的系数
/// 未中奖档的权重不受任何一层影响
///
/// 层顺序固定为先衰减后分时段: 衰减层的下限裁剪与后续乘法不可交换
#[derive(Clone, Debug)]
pub struct FairnessAdjuster {
    config: DrawConfig,
}

impl FairnessAdjuster {
    pub fn new(config: DrawConfig) -> Self {
        Self { config }
    }

    /// 生成调整后的新列表, 入参列表保持原样
    pub fn adjust(&self, prizes: &[Prize], ctx: &DrawContext) -> Vec<AdjustedPrize> {
        let time_factor = self.time_factor_for(ctx.now.hour());
        prizes
            .iter()
            .map(|prize| {
                let mut weight = prize.probability;
                if prize.level.is_win() {
                    // 近期无中奖时衰减层整体跳过, 下限也不参与
                    if ctx.recent_win_count > 0 {
                        let decayed =
                            weight * self.config.decay_factor.powi(ctx.recent_win_count as i32);
                        weight = decayed.max(self.config.min_weight_floor);
                    }
                    weight *= time_factor;
                }
                AdjustedPrize {
                    prize: prize.clone(),
                    weight,
                }
            })
            .collect()
    }

    /// 分时段系数: 命中配置表中第一条匹配区间, 未命中为 1.0
    pub fn time_factor_for(&self, hour: u32) -> f64 {
        self.config
            .time_factors
            .iter()
            .find(|rule| hour >= rule.start_hour && hour < rule.end_hour)
            .map(|rule| rule.factor)
            .unwrap_or(1.0)
    }

    /// 保底预判: 连续未中奖达到阈值 - 1 时, 本次抽奖应触发保底
    /// 只做判断, 是否真正锁定保底奖品由引擎决定 (还需奖品有库存)
    pub fn guarantee_due(&self, ctx: &DrawContext) -> bool {
        ctx.lose_streak >= self.config.guarantee_threshold.saturating_sub(1)
    }
}
