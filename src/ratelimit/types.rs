//! 限流类型定义

use serde::{Deserialize, Serialize};

/// 单个维度的配额上限
///
/// 线上协议使用 `-1` 表示不限制，进入网关后统一转换为 `Unlimited`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum Limit {
    Unlimited,
    Limit(u64),
}

impl TryFrom<i64> for Limit {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(Limit::Unlimited),
            n if n >= 0 => Ok(Limit::Limit(n as u64)),
            n => Err(format!("无效的配额值 {}（只允许非负整数或 -1）", n)),
        }
    }
}

impl From<Limit> for i64 {
    fn from(limit: Limit) -> Self {
        match limit {
            Limit::Unlimited => -1,
            Limit::Limit(n) => n.min(i64::MAX as u64) as i64,
        }
    }
}

impl Limit {
    /// `used` 是否已达到或超过上限
    pub fn is_reached_by(&self, used: u64) -> bool {
        match self {
            Limit::Unlimited => false,
            Limit::Limit(n) => used >= *n,
        }
    }
}

impl std::fmt::Display for Limit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Limit::Unlimited => write!(f, "unlimited"),
            Limit::Limit(n) => write!(f, "{}", n),
        }
    }
}

/// 计数器存储故障时的处理策略
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailPolicy {
    /// 放行请求，把错误写入诊断信息
    #[default]
    Open,
    /// 拒绝请求
    Closed,
}

/// 限流维度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    RequestsPerSecond,
    RequestsPerDay,
    TokensPerMinute,
}

impl Dimension {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::RequestsPerSecond => "requests_per_second",
            Dimension::RequestsPerDay => "requests_per_day",
            Dimension::TokensPerMinute => "tokens_per_minute",
        }
    }

    /// 窗口长度（毫秒）
    pub fn window_ms(&self) -> i64 {
        match self {
            Dimension::RequestsPerSecond => 1_000,
            Dimension::RequestsPerDay => 86_400_000,
            Dimension::TokensPerMinute => 60_000,
        }
    }
}

impl std::fmt::Display for Dimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单次限流检查结果
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitOutcome {
    pub allowed: bool,
    /// 本窗口累计计数（不限制或存储故障时为 0）
    pub count: u64,
    /// 本窗口剩余额度，不限制时为 None
    pub remaining: Option<u64>,
    /// 窗口重置时间（Unix 毫秒），不限制时为 None
    pub reset_at: Option<i64>,
    /// 存储故障信息（按故障策略处理后保留，用于诊断）
    pub error: Option<String>,
}

impl RateLimitOutcome {
    /// 不限制时的放行结果
    pub fn unlimited() -> Self {
        Self {
            allowed: true,
            count: 0,
            remaining: None,
            reset_at: None,
            error: None,
        }
    }
}

/// 多维度检查中的单个维度请求
#[derive(Debug, Clone, Copy)]
pub struct DimensionCheck {
    pub dimension: Dimension,
    pub limit: Limit,
    pub increment: u64,
}

/// 被拒绝的维度详情
#[derive(Debug, Clone, PartialEq)]
pub struct DimensionDenial {
    pub dimension: Dimension,
    pub limit: Limit,
    pub outcome: RateLimitOutcome,
}

/// 多维度检查的汇总结果
#[derive(Debug, Clone, Default)]
pub struct MultiCheckResult {
    /// 第一个拒绝的维度（按检查顺序）
    pub denied: Option<DimensionDenial>,
    /// 各维度检查中出现的存储错误
    pub errors: Vec<(Dimension, String)>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_from_wire() {
        let limit: Limit = serde_json::from_str("-1").unwrap();
        assert_eq!(limit, Limit::Unlimited);

        let limit: Limit = serde_json::from_str("100").unwrap();
        assert_eq!(limit, Limit::Limit(100));

        assert!(serde_json::from_str::<Limit>("-5").is_err());
    }

    #[test]
    fn test_limit_to_wire() {
        assert_eq!(serde_json::to_string(&Limit::Unlimited).unwrap(), "-1");
        assert_eq!(serde_json::to_string(&Limit::Limit(42)).unwrap(), "42");
    }

    #[test]
    fn test_limit_is_reached_by() {
        assert!(Limit::Limit(100).is_reached_by(100));
        assert!(!Limit::Limit(100).is_reached_by(99));
        assert!(!Limit::Unlimited.is_reached_by(u64::MAX));
    }

    #[test]
    fn test_dimension_windows() {
        assert_eq!(Dimension::RequestsPerSecond.window_ms(), 1_000);
        assert_eq!(Dimension::TokensPerMinute.window_ms(), 60_000);
        assert_eq!(Dimension::RequestsPerDay.window_ms(), 86_400_000);
        assert_eq!(Dimension::TokensPerMinute.to_string(), "tokens_per_minute");
    }
}
