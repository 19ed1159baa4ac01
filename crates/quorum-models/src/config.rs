use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::analyst::AnalystKind;
use crate::debate::Volatility;
use crate::decision::{LeverageTier, SizeTier, StopWidth};
use crate::market::MarketType;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("unknown provider '{name}' referenced by {role}")]
    UnknownProvider { name: String, role: String },
}

/// Top-level configuration for quorum.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct QuorumConfig {
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub store: Option<StoreConfig>,
}

impl QuorumConfig {
    /// Structural checks plus every role's provider reference.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.pipeline.validate()?;
        for (role, name) in self.pipeline.provider_references() {
            if !self.providers.iter().any(|p| p.name == name) {
                return Err(ConfigError::UnknownProvider { name, role });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ProviderKind {
    /// Any `/chat/completions` endpoint: OpenAI, DeepSeek, OpenRouter, Qwen.
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(rename = "anthropic")]
    Anthropic,
    /// The local `claude` CLI.
    #[serde(rename = "claude_cli")]
    ClaudeCli,
}

/// One named LLM endpoint. Pipeline roles refer to providers by `name`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderConfig {
    pub name: String,
    pub kind: ProviderKind,
    pub model: String,
    #[serde(default)]
    pub base_url: Option<String>,
    /// Environment variable holding the API key.
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Per-call timeout.
    #[serde(default = "default_provider_timeout")]
    pub timeout_seconds: u64,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f32>,
}

fn default_provider_timeout() -> u64 {
    60
}

/// Immutable settings for one pipeline. Loaded once and shared read-only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Re-plans allowed after risk vetoes before forced escalation.
    pub max_replans: u32,
    /// Provider used by any role without an explicit one.
    pub default_provider: String,
    pub retry: RetryConfig,
    pub analysts: AnalystTeamConfig,
    pub debate: DebateConfig,
    pub trader: TraderConfig,
    pub risk: RiskPolicy,
    pub markets: MarketsConfig,
    pub fund_manager: FundManagerPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_replans: 2,
            default_provider: "default".to_string(),
            retry: RetryConfig::default(),
            analysts: AnalystTeamConfig::default(),
            debate: DebateConfig::default(),
            trader: TraderConfig::default(),
            risk: RiskPolicy::default(),
            markets: MarketsConfig::default(),
            fund_manager: FundManagerPolicy::default(),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("retry.max_attempts must be >= 1".into()));
        }
        if self.debate.rounds == 0 {
            return Err(ConfigError::Invalid("debate.rounds must be >= 1".into()));
        }
        if self.risk.max_leverage == 0 {
            return Err(ConfigError::Invalid("risk.max_leverage must be >= 1".into()));
        }
        if self.markets.params(MarketType::Futures).max_leverage == 0 {
            return Err(ConfigError::Invalid(
                "markets.futures.max_leverage must be >= 1".into(),
            ));
        }
        if self.risk.min_investment_usd > self.risk.max_investment_usd {
            return Err(ConfigError::Invalid(
                "risk.min_investment_usd exceeds risk.max_investment_usd".into(),
            ));
        }
        if self.trader.account_equity_usd <= Decimal::ZERO {
            return Err(ConfigError::Invalid(
                "trader.account_equity_usd must be positive".into(),
            ));
        }
        if self.trader.risk_reward_ratio <= Decimal::ZERO {
            return Err(ConfigError::Invalid(
                "trader.risk_reward_ratio must be positive".into(),
            ));
        }
        for market in [MarketType::Spot, MarketType::Futures] {
            let params = self.markets.params(market);
            if params.fee_rate < Decimal::ZERO || params.fee_rate >= Decimal::ONE {
                return Err(ConfigError::Invalid(format!(
                    "markets.{market}.fee_rate must be in [0, 1)"
                )));
            }
            if params.contract_multiplier <= Decimal::ZERO {
                return Err(ConfigError::Invalid(format!(
                    "markets.{market}.contract_multiplier must be positive"
                )));
            }
        }
        if self.analysts.members.iter().all(|a| !a.enabled) {
            return Err(ConfigError::Invalid("at least one analyst must be enabled".into()));
        }
        Ok(())
    }

    /// Resolve an optional per-role provider to a concrete name.
    pub fn provider_for(&self, explicit: Option<&String>) -> String {
        explicit
            .cloned()
            .unwrap_or_else(|| self.default_provider.clone())
    }

    /// Every (role, provider) pair the pipeline will call.
    pub fn provider_references(&self) -> Vec<(String, String)> {
        let mut refs = Vec::new();
        for analyst in self.analysts.members.iter().filter(|a| a.enabled) {
            refs.push((
                format!("{} analyst", analyst.kind),
                self.provider_for(analyst.provider.as_ref()),
            ));
        }
        for name in self.debate.side_providers(&self.debate.bull, &self.default_provider) {
            refs.push(("bull researcher".to_string(), name));
        }
        for name in self.debate.side_providers(&self.debate.bear, &self.default_provider) {
            refs.push(("bear researcher".to_string(), name));
        }
        if self.debate.neutral {
            refs.push((
                "neutral researcher".to_string(),
                self.provider_for(self.debate.neutral_provider.as_ref()),
            ));
        }
        if self.debate.fact_check {
            refs.push((
                "fact checker".to_string(),
                self.provider_for(self.debate.fact_checker_provider.as_ref()),
            ));
        }
        refs.push((
            "judge".to_string(),
            self.provider_for(self.debate.judge_provider.as_ref()),
        ));
        refs.push((
            "trader".to_string(),
            self.provider_for(self.trader.provider.as_ref()),
        ));
        refs
    }
}

/// Backoff for transient provider failures.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    pub base_delay_ms: u64,
    pub factor: u32,
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 1000,
            factor: 2,
            max_attempts: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnalystTeamConfig {
    /// Candles per timeframe shown to analysts.
    pub candle_tail: usize,
    pub members: Vec<AnalystConfig>,
}

impl Default for AnalystTeamConfig {
    fn default() -> Self {
        Self {
            candle_tail: 60,
            members: AnalystKind::ALL
                .iter()
                .map(|&kind| AnalystConfig {
                    kind,
                    provider: None,
                    enabled: true,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalystConfig {
    pub kind: AnalystKind,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DebateMode {
    #[default]
    Single,
    Committee,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategyKind {
    /// Arithmetic mean of confidences.
    #[default]
    Mean,
    /// Each opinion weighted by its own confidence.
    ConfidenceWeighted,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebateConfig {
    /// Total rounds including the opening round.
    pub rounds: u32,
    pub mode: DebateMode,
    /// Providers arguing the bull side. Single mode uses the first.
    pub bull: Vec<String>,
    pub bear: Vec<String>,
    pub neutral: bool,
    pub neutral_provider: Option<String>,
    pub fact_check: bool,
    pub fact_checker_provider: Option<String>,
    pub judge_provider: Option<String>,
    pub merge_strategy: MergeStrategyKind,
}

impl Default for DebateConfig {
    fn default() -> Self {
        Self {
            rounds: 2,
            mode: DebateMode::Single,
            bull: vec![],
            bear: vec![],
            neutral: false,
            neutral_provider: None,
            fact_check: false,
            fact_checker_provider: None,
            judge_provider: None,
            merge_strategy: MergeStrategyKind::Mean,
        }
    }
}

impl DebateConfig {
    /// Providers for one side, honouring the mode. Never empty.
    pub fn side_providers(&self, configured: &[String], default_provider: &str) -> Vec<String> {
        match (self.mode, configured.first()) {
            (_, None) => vec![default_provider.to_string()],
            (DebateMode::Single, Some(first)) => vec![first.clone()],
            (DebateMode::Committee, Some(_)) => configured.to_vec(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TraderConfig {
    pub provider: Option<String>,
    pub account_equity_usd: Decimal,
    pub size_fractions: SizeFractions,
    pub leverage_ladder: LeverageLadder,
    pub stop_multipliers: StopMultipliers,
    pub volatility_bands: VolatilityBands,
    /// Take-profit distance as a multiple of stop distance.
    pub risk_reward_ratio: Decimal,
}

impl Default for TraderConfig {
    fn default() -> Self {
        Self {
            provider: None,
            account_equity_usd: Decimal::new(1000, 0),
            size_fractions: SizeFractions::default(),
            leverage_ladder: LeverageLadder::default(),
            stop_multipliers: StopMultipliers::default(),
            volatility_bands: VolatilityBands::default(),
            risk_reward_ratio: Decimal::TWO,
        }
    }
}

/// Fraction of equity committed as margin per size tier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SizeFractions {
    pub conservative: Decimal,
    pub moderate: Decimal,
    pub aggressive: Decimal,
}

impl Default for SizeFractions {
    fn default() -> Self {
        Self {
            conservative: Decimal::new(5, 2),
            moderate: Decimal::new(10, 2),
            aggressive: Decimal::new(20, 2),
        }
    }
}

impl SizeFractions {
    pub fn get(&self, tier: SizeTier) -> Decimal {
        match tier {
            SizeTier::Conservative => self.conservative,
            SizeTier::Moderate => self.moderate,
            SizeTier::Aggressive => self.aggressive,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LeverageLadder {
    pub low: u32,
    pub medium: u32,
    pub high: u32,
}

impl Default for LeverageLadder {
    fn default() -> Self {
        Self {
            low: 2,
            medium: 5,
            high: 10,
        }
    }
}

impl LeverageLadder {
    pub fn get(&self, tier: LeverageTier) -> u32 {
        match tier {
            LeverageTier::Low => self.low,
            LeverageTier::Medium => self.medium,
            LeverageTier::High => self.high,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StopMultipliers {
    pub tight: Decimal,
    pub normal: Decimal,
    pub wide: Decimal,
}

impl Default for StopMultipliers {
    fn default() -> Self {
        Self {
            tight: Decimal::new(75, 2),
            normal: Decimal::ONE,
            wide: Decimal::new(15, 1),
        }
    }
}

impl StopMultipliers {
    pub fn get(&self, width: StopWidth) -> Decimal {
        match width {
            StopWidth::Tight => self.tight,
            StopWidth::Normal => self.normal,
            StopWidth::Wide => self.wide,
        }
    }
}

/// Expected adverse move, as a fraction of price, per volatility band.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VolatilityBands {
    pub low: Decimal,
    pub medium: Decimal,
    pub high: Decimal,
}

impl Default for VolatilityBands {
    fn default() -> Self {
        Self {
            low: Decimal::new(1, 2),
            medium: Decimal::new(25, 3),
            high: Decimal::new(5, 2),
        }
    }
}

impl VolatilityBands {
    pub fn get(&self, volatility: Volatility) -> Decimal {
        match volatility {
            Volatility::Low => self.low,
            Volatility::Medium => self.medium,
            Volatility::High => self.high,
        }
    }
}

/// Limits the risk gate enforces.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RiskPolicy {
    pub max_leverage: u32,
    pub min_investment_usd: Decimal,
    pub max_investment_usd: Decimal,
    pub min_stop_distance_pct: Decimal,
    /// Share of the liquidation distance (1 / leverage) a stop may use.
    pub liquidation_buffer: Decimal,
    /// Stop distance cap for spot, where there is no liquidation price.
    pub max_spot_stop_distance_pct: Decimal,
}

impl Default for RiskPolicy {
    fn default() -> Self {
        Self {
            max_leverage: 10,
            min_investment_usd: Decimal::new(10, 0),
            max_investment_usd: Decimal::new(500, 0),
            min_stop_distance_pct: Decimal::new(3, 3),
            liquidation_buffer: Decimal::new(8, 1),
            max_spot_stop_distance_pct: Decimal::new(15, 2),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MarketParams {
    pub fee_rate: Decimal,
    pub max_leverage: u32,
    /// Base units per contract.
    pub contract_multiplier: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MarketsConfig {
    pub spot: MarketParams,
    pub futures: MarketParams,
}

impl Default for MarketsConfig {
    fn default() -> Self {
        Self {
            spot: MarketParams {
                fee_rate: Decimal::new(1, 3),
                max_leverage: 1,
                contract_multiplier: Decimal::ONE,
            },
            futures: MarketParams {
                fee_rate: Decimal::new(6, 4),
                max_leverage: 20,
                contract_multiplier: Decimal::ONE,
            },
        }
    }
}

impl MarketsConfig {
    pub fn params(&self, market: MarketType) -> &MarketParams {
        match market {
            MarketType::Spot => &self.spot,
            MarketType::Futures => &self.futures,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FundManagerPolicy {
    /// Judge confidence below this forces a hold.
    pub min_judge_confidence: Decimal,
}

impl Default for FundManagerPolicy {
    fn default() -> Self {
        Self {
            min_judge_confidence: Decimal::new(55, 2),
        }
    }
}

/// Where decision reports are kept.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreConfig {
    pub sqlite_path: String,
    #[serde(default = "default_memory_capacity")]
    pub memory_max_capacity: u64,
    #[serde(default = "default_memory_ttl")]
    pub memory_ttl_seconds: u64,
}

fn default_memory_capacity() -> u64 {
    1_000
}

fn default_memory_ttl() -> u64 {
    300
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn provider(name: &str) -> ProviderConfig {
        ProviderConfig {
            name: name.to_string(),
            kind: ProviderKind::OpenAi,
            model: "gpt-4o-mini".to_string(),
            base_url: None,
            api_key_env: Some("OPENAI_API_KEY".to_string()),
            timeout_seconds: 60,
            max_tokens: None,
            temperature: None,
        }
    }

    #[test]
    fn roundtrip_quorum_config() {
        let config = QuorumConfig {
            providers: vec![provider("default")],
            pipeline: PipelineConfig::default(),
            store: Some(StoreConfig {
                sqlite_path: "data/reports.db".to_string(),
                memory_max_capacity: 100,
                memory_ttl_seconds: 60,
            }),
        };
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: QuorumConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn default_pipeline_is_valid() {
        let pipeline = PipelineConfig::default();
        assert!(pipeline.validate().is_ok());
        assert_eq!(pipeline.analysts.members.len(), 4);
        assert_eq!(pipeline.markets.futures.fee_rate, dec!(0.0006));
        assert_eq!(pipeline.retry.max_attempts, 3);
    }

    #[test]
    fn config_from_toml() {
        let toml_str = r#"
[[providers]]
name = "gpt"
kind = "openai"
model = "gpt-4o-mini"
api_key_env = "OPENAI_API_KEY"

[[providers]]
name = "claude"
kind = "anthropic"
model = "claude-3-5-haiku-latest"
timeout_seconds = 30

[pipeline]
max_replans = 3
default_provider = "gpt"

[pipeline.debate]
rounds = 3
mode = "committee"
bull = ["gpt", "claude"]
bear = ["claude"]
merge_strategy = "confidence_weighted"

[pipeline.risk]
max_leverage = 5
max_investment_usd = "250"

[pipeline.markets.futures]
fee_rate = "0.0005"
max_leverage = 50
contract_multiplier = "0.001"

[[pipeline.analysts.members]]
kind = "technical"

[[pipeline.analysts.members]]
kind = "news"
provider = "claude"
enabled = false
"#;
        let config: QuorumConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.providers.len(), 2);
        assert_eq!(config.providers[1].kind, ProviderKind::Anthropic);
        assert_eq!(config.providers[0].timeout_seconds, 60);
        assert_eq!(config.pipeline.max_replans, 3);
        assert_eq!(config.pipeline.debate.mode, DebateMode::Committee);
        assert_eq!(
            config.pipeline.debate.merge_strategy,
            MergeStrategyKind::ConfidenceWeighted
        );
        assert_eq!(config.pipeline.risk.max_leverage, 5);
        assert_eq!(config.pipeline.risk.max_investment_usd, dec!(250));
        // Unset policy fields keep their defaults.
        assert_eq!(config.pipeline.risk.min_investment_usd, dec!(10));
        assert_eq!(config.pipeline.markets.futures.contract_multiplier, dec!(0.001));
        assert_eq!(config.pipeline.markets.spot.max_leverage, 1);
        assert_eq!(config.pipeline.analysts.members.len(), 2);
        assert!(!config.pipeline.analysts.members[1].enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn unknown_provider_reference_is_rejected() {
        let mut config = QuorumConfig {
            providers: vec![provider("default")],
            ..Default::default()
        };
        config.pipeline.debate.judge_provider = Some("missing".to_string());
        let err = config.validate().unwrap_err();
        assert_eq!(
            err,
            ConfigError::UnknownProvider {
                name: "missing".to_string(),
                role: "judge".to_string()
            }
        );
    }

    #[test]
    fn side_providers_respect_mode() {
        let mut debate = DebateConfig {
            bull: vec!["a".to_string(), "b".to_string()],
            ..Default::default()
        };
        assert_eq!(debate.side_providers(&debate.bull, "default"), vec!["a"]);
        debate.mode = DebateMode::Committee;
        assert_eq!(debate.side_providers(&debate.bull, "default"), vec!["a", "b"]);
        assert_eq!(debate.side_providers(&debate.bear, "default"), vec!["default"]);
    }

    #[test]
    fn invalid_bounds_are_rejected() {
        let mut pipeline = PipelineConfig::default();
        pipeline.risk.min_investment_usd = dec!(1000);
        assert!(pipeline.validate().is_err());

        let mut pipeline = PipelineConfig::default();
        pipeline.debate.rounds = 0;
        assert!(pipeline.validate().is_err());
    }

    #[test]
    fn zero_leverage_ceiling_is_rejected() {
        let mut pipeline = PipelineConfig::default();
        pipeline.risk.max_leverage = 0;
        let err = pipeline.validate().unwrap_err();
        assert!(err.to_string().contains("risk.max_leverage"));

        let mut pipeline = PipelineConfig::default();
        pipeline.markets.futures.max_leverage = 0;
        assert!(pipeline.validate().is_err());

        let mut pipeline = PipelineConfig::default();
        pipeline.risk.max_leverage = 1;
        assert!(pipeline.validate().is_ok());
    }

    #[test]
    fn tier_lookups() {
        let trader = TraderConfig::default();
        assert_eq!(trader.size_fractions.get(SizeTier::Aggressive), dec!(0.20));
        assert_eq!(trader.leverage_ladder.get(LeverageTier::Medium), 5);
        assert_eq!(trader.stop_multipliers.get(StopWidth::Wide), dec!(1.5));
        assert_eq!(trader.volatility_bands.get(Volatility::Medium), dec!(0.025));
    }
}
