use serde::{Deserialize, Serialize};
use std::env;

use crate::error::{AppError, AppResult};
use crate::models::PrizeLevel;

/// 抽奖算法配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrawConfig {
    /// 防连胜衰减系数, 取值 (0,1)
    #[serde(default = "default_decay_factor")]
    pub decay_factor: f64,
    /// 衰减后的最小权重下限, 避免中奖权重被完全压制
    #[serde(default = "default_min_weight_floor")]
    pub min_weight_floor: f64,
    /// 保底阈值: 连续未中奖达到 threshold - 1 次后, 下一抽触发保底
    #[serde(default = "default_guarantee_threshold")]
    pub guarantee_threshold: u32,
    /// 保底奖品等级
    #[serde(default = "default_guarantee_prize_level")]
    pub guarantee_prize_level: PrizeLevel,
    /// 分时段概率调整表, 未命中任何区间时系数为 1.0
    #[serde(default = "default_time_factors")]
    pub time_factors: Vec<TimeFactorRule>,
}

/// 单条分时段规则: 命中 [start_hour, end_hour) 的小时应用 factor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeFactorRule {
    pub start_hour: u32,
    pub end_hour: u32,
    pub factor: f64,
}

fn default_decay_factor() -> f64 {
    0.5
}

fn default_min_weight_floor() -> f64 {
    0.1
}

fn default_guarantee_threshold() -> u32 {
    10
}

fn default_guarantee_prize_level() -> PrizeLevel {
    PrizeLevel::Third
}

fn default_time_factors() -> Vec<TimeFactorRule> {
    vec![
        // 凌晨时段提高中奖概率
        TimeFactorRule {
            start_hour: 0,
            end_hour: 6,
            factor: 1.2,
        },
        // 晚间高峰适当降低
        TimeFactorRule {
            start_hour: 18,
            end_hour: 24,
            factor: 0.8,
        },
    ]
}

impl Default for DrawConfig {
    fn default() -> Self {
        DrawConfig {
            decay_factor: default_decay_factor(),
            min_weight_floor: default_min_weight_floor(),
            guarantee_threshold: default_guarantee_threshold(),
            guarantee_prize_level: default_guarantee_prize_level(),
            time_factors: default_time_factors(),
        }
    }
}

impl DrawConfig {
    /// 读取配置文件 (CONFIG_PATH, 默认 draw.toml)
    /// 文件不存在时使用默认值; 环境变量在文件之上覆盖
    pub fn from_toml() -> AppResult<Self> {
        let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "draw.toml".to_string());
        use std::io::ErrorKind;

        let mut config: DrawConfig = match std::fs::read_to_string(&config_path) {
            Ok(config_str) => toml::from_str(&config_str)
                .map_err(|e| AppError::ConfigError(format!("Failed to parse {config_path}: {e}")))?,
            Err(e) if e.kind() == ErrorKind::NotFound => DrawConfig::default(),
            Err(e) => {
                return Err(AppError::ConfigError(format!(
                    "Failed to read {config_path}: {e}"
                )));
            }
        };

        // 环境变量覆盖（即便文件存在时也覆盖）
        if let Ok(v) = env::var("DRAW_DECAY_FACTOR")
            && let Ok(n) = v.parse()
        {
            config.decay_factor = n;
        }
        if let Ok(v) = env::var("DRAW_MIN_WEIGHT_FLOOR")
            && let Ok(n) = v.parse()
        {
            config.min_weight_floor = n;
        }
        if let Ok(v) = env::var("DRAW_GUARANTEE_THRESHOLD")
            && let Ok(n) = v.parse()
        {
            config.guarantee_threshold = n;
        }
        if let Ok(v) = env::var("DRAW_GUARANTEE_PRIZE_LEVEL")
            && let Ok(level) = v.parse()
        {
            config.guarantee_prize_level = level;
        }

        config.validate()?;
        Ok(config)
    }

    /// 数值约束校验
    pub fn validate(&self) -> AppResult<()> {
        if !(self.decay_factor > 0.0 && self.decay_factor < 1.0) {
            return Err(AppError::ConfigError(
                "decay_factor must be within (0, 1)".into(),
            ));
        }
        if self.min_weight_floor <= 0.0 {
            return Err(AppError::ConfigError(
                "min_weight_floor must be positive".into(),
            ));
        }
        if self.guarantee_threshold == 0 {
            return Err(AppError::ConfigError(
                "guarantee_threshold must be at least 1".into(),
            ));
        }
        for rule in &self.time_factors {
            if rule.start_hour >= rule.end_hour || rule.end_hour > 24 {
                return Err(AppError::ConfigError(format!(
                    "Invalid time factor range: {}..{}",
                    rule.start_hour, rule.end_hour
                )));
            }
            if rule.factor < 0.0 {
                return Err(AppError::ConfigError(
                    "Time factor must be non-negative".into(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = DrawConfig::default();
        assert_eq!(config.decay_factor, 0.5);
        assert_eq!(config.min_weight_floor, 0.1);
        assert_eq!(config.guarantee_threshold, 10);
        assert_eq!(config.guarantee_prize_level, PrizeLevel::Third);
        assert_eq!(config.time_factors.len(), 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_falls_back_to_defaults() {
        let config: DrawConfig = toml::from_str(
            r#"
            decay_factor = 0.6
            guarantee_prize_level = "second"
            "#,
        )
        .unwrap();
        assert_eq!(config.decay_factor, 0.6);
        assert_eq!(config.guarantee_prize_level, PrizeLevel::Second);
        // 未出现的键落回默认
        assert_eq!(config.min_weight_floor, 0.1);
        assert_eq!(config.guarantee_threshold, 10);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = DrawConfig::default();
        config.decay_factor = 1.0;
        assert!(config.validate().is_err());

        let mut config = DrawConfig::default();
        config.guarantee_threshold = 0;
        assert!(config.validate().is_err());

        let mut config = DrawConfig::default();
        config.time_factors = vec![TimeFactorRule {
            start_hour: 20,
            end_hour: 25,
            factor: 1.0,
        }];
        assert!(config.validate().is_err());
    }
}
