use rand::Rng;

/// 按权重随机选取一项
///
/// 约定:
/// - items 为空返回 None
/// - 总权重 <= 0 时固定返回第一项, 避免除零且保证必然返回
/// - 随机值与累计权重的比较使用 <=, 边界值归属迭代序中靠前的一项
///
/// 纯函数: 结果只取决于入参与一次随机抽取, 注入固定随机源即可复现
pub fn select_by_weight<'a, T, R>(
    items: &'a [T],
    weight_of: impl Fn(&T) -> f64,
    rng: &mut R,
) -> Option<&'a T>
where
    R: Rng + ?Sized,
{
    let first = items.first()?;
    let total: f64 = items.iter().map(&weight_of).sum();
    if total <= 0.0 {
        return Some(first);
    }

    let pick = rng.gen_range(0.0..total);
    let mut acc = 0.0;
    for item in items {
        acc += weight_of(item);
        if pick <= acc {
            return Some(item);
        }
    }

    // 浮点累加误差兜底
    Some(first)
}
