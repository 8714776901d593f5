use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 奖品等级（七档，其中 NoWin 表示未中奖）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrizeLevel {
    Grand,
    First,
    Second,
    Third,
    Fourth,
    Fifth,
    NoWin,
}

impl PrizeLevel {
    /// 是否属于中奖等级
    pub fn is_win(&self) -> bool {
        !matches!(self, PrizeLevel::NoWin)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PrizeLevel::Grand => "grand",
            PrizeLevel::First => "first",
            PrizeLevel::Second => "second",
            PrizeLevel::Third => "third",
            PrizeLevel::Fourth => "fourth",
            PrizeLevel::Fifth => "fifth",
            PrizeLevel::NoWin => "no_win",
        }
    }
}

impl fmt::Display for PrizeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PrizeLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "grand" => Ok(PrizeLevel::Grand),
            "first" => Ok(PrizeLevel::First),
            "second" => Ok(PrizeLevel::Second),
            "third" => Ok(PrizeLevel::Third),
            "fourth" => Ok(PrizeLevel::Fourth),
            "fifth" => Ok(PrizeLevel::Fifth),
            "no_win" => Ok(PrizeLevel::NoWin),
            other => Err(format!("Unknown prize level: {other}")),
        }
    }
}

/// 奖品配置
/// 概念说明:
/// - probability: 基础权重, 不要求全池总和为 100
/// - stock_remaining: 剩余库存 (None 表示无限, 不参与扣减; 历史数据中的 -1 哨兵值映射为 None)
/// - daily_limit: 每日发放上限 (None = 无限制; 每日计数由外部资格校验负责, 不进入核心算法)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Prize {
    pub id: i64,
    pub name: String,
    pub level: PrizeLevel,
    /// 基础权重 (>= 0)
    pub probability: f64,
    /// 剩余库存 (None = 无限)
    pub stock_remaining: Option<i64>,
    /// 每日发放上限
    pub daily_limit: Option<i64>,
    /// 奖品面值 (美分), 虚拟/谢谢参与类为 0
    pub value_cents: i64,
    /// 附带积分
    pub points: i64,
}

impl Prize {
    /// 是否还有库存 (无限库存或剩余 > 0)
    pub fn is_available(&self) -> bool {
        match self.stock_remaining {
            None => true,
            Some(remain) => remain > 0,
        }
    }

    /// 是否是限量奖品
    pub fn is_limited(&self) -> bool {
        self.stock_remaining.is_some()
    }
}
