pub mod analyst;
pub mod config;
pub mod debate;
pub mod decision;
pub mod market;
pub mod report;
pub mod workflow;

pub use analyst::{AnalystKind, AnalystReport, ClaimPolarity, ClaimRef, ReportStatus};
pub use config::{
    AnalystConfig, AnalystTeamConfig, ConfigError, DebateConfig, DebateMode, FundManagerPolicy,
    LeverageLadder, MarketParams, MarketsConfig, MergeStrategyKind, PipelineConfig,
    ProviderConfig, ProviderKind, QuorumConfig, RetryConfig, RiskPolicy, SizeFractions,
    StopMultipliers, StoreConfig, TraderConfig, VolatilityBands,
};
pub use debate::{
    CommitteeOpinion, DebateLog, DebateLogError, DebateRole, DebateTurn, Direction, FlaggedClaim,
    JudgeStance, ModelOpinion, Volatility,
};
pub use decision::{
    Adjustment, ApprovalStatus, FinalApproval, LeverageTier, OverrideReason, RiskAssessment,
    RiskLevel, SizeTier, StopWidth, TradeAction, TradeChoices, TradeDecision, VetoReason,
};
pub use market::{Candle, MarketDataPackage, MarketType, NewsItem, PACKAGE_SCHEMA_VERSION};
pub use report::{DecisionReport, RunStatus, REPORT_SCHEMA_VERSION};
pub use workflow::{VetoOutcome, WorkflowState, WorkflowStateError};
