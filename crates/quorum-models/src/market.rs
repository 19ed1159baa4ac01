use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub const PACKAGE_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MarketType {
    Spot,
    Futures,
}

impl MarketType {
    pub fn is_futures(self) -> bool {
        matches!(self, MarketType::Futures)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MarketType::Spot => "spot",
            MarketType::Futures => "futures",
        }
    }
}

impl std::fmt::Display for MarketType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One OHLCV bar.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candle {
    pub open_time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewsItem {
    pub title: String,
    pub source: String,
    pub published_at: DateTime<Utc>,
    #[serde(default)]
    pub summary: Option<String>,
}

/// Market snapshot handed to the pipeline by the data layer.
///
/// Read-only for the whole run. Candles are keyed by timeframe label
/// (`"15m"`, `"1h"`, `"4h"`, `"1d"`), oldest first. Indicators are opaque
/// values keyed by name (e.g. `"rsi_14:1h"`), as produced by the indicator
/// calculator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MarketDataPackage {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub symbol: String,
    pub market_type: MarketType,
    pub captured_at: DateTime<Utc>,
    #[serde(default)]
    pub candles: BTreeMap<String, Vec<Candle>>,
    #[serde(default)]
    pub indicators: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub news: Vec<NewsItem>,
    /// Perpetual funding rate per interval. Futures only.
    #[serde(default)]
    pub funding_rate: Option<Decimal>,
    /// Supply, market cap, on-chain metrics. Shape is up to the data layer.
    #[serde(default)]
    pub fundamentals: Option<serde_json::Value>,
    /// Explicit mark price; falls back to the latest close when absent.
    #[serde(default)]
    pub last_price: Option<Decimal>,
}

fn default_schema_version() -> u32 {
    PACKAGE_SCHEMA_VERSION
}

/// Length of a timeframe label such as `15m`, `4h` or `1d`, in seconds.
/// Unrecognised labels sort after every known one.
fn timeframe_seconds(timeframe: &str) -> u64 {
    let Some((split, _)) = timeframe.char_indices().last() else {
        return u64::MAX;
    };
    let (count, unit) = timeframe.split_at(split);
    let unit_seconds = match unit {
        "s" => 1,
        "m" => 60,
        "h" => 3_600,
        "d" => 86_400,
        "w" => 604_800,
        "M" => 2_592_000,
        _ => return u64::MAX,
    };
    count
        .parse::<u64>()
        .ok()
        .and_then(|n| n.checked_mul(unit_seconds))
        .unwrap_or(u64::MAX)
}

impl MarketDataPackage {
    /// The price sizing is anchored to.
    ///
    /// Uses the explicit `last_price` if set, otherwise the close of the most
    /// recent candle of the shortest non-empty timeframe.
    pub fn last_price(&self) -> Option<Decimal> {
        if let Some(price) = self.last_price {
            return Some(price);
        }
        self.candles
            .iter()
            .filter_map(|(timeframe, series)| Some((timeframe_seconds(timeframe), series.last()?)))
            .min_by_key(|(seconds, _)| *seconds)
            .map(|(_, candle)| candle.close)
    }

    /// The last `limit` candles of a timeframe.
    pub fn tail(&self, timeframe: &str, limit: usize) -> &[Candle] {
        match self.candles.get(timeframe) {
            Some(series) => &series[series.len().saturating_sub(limit)..],
            None => &[],
        }
    }

    /// Percent change between the first and last close of a timeframe.
    pub fn change_pct(&self, timeframe: &str) -> Option<Decimal> {
        let series = self.candles.get(timeframe)?;
        let first = series.first()?.close;
        let last = series.last()?.close;
        if first.is_zero() {
            return None;
        }
        Some(((last - first) / first * Decimal::ONE_HUNDRED).round_dp(4))
    }
}
