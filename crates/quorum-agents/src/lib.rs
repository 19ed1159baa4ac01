pub mod analyst;
pub mod committee;
pub mod debate;
pub mod error;
pub mod fund_manager;
pub mod llm;
pub mod outputs;
pub mod parser;
pub mod pipeline;
pub mod prompts;
pub mod report;
pub mod risk;
pub mod sizing;
pub mod structured;
pub mod trader;

pub mod test_support;

pub use analyst::{Analyst, AnalystTeam, LlmAnalyst};
pub use committee::{
    merge_strategy, CommitteeMergeStrategy, ConfidenceWeighted, MeanConfidence, MergedStance,
};
pub use debate::ResearchDebate;
pub use error::{AgentError, LlmError, ParseError, WorkflowError};
pub use fund_manager::FundManager;
pub use llm::{
    ChatMessage, CompletionRequest, LlmProvider, ProviderRegistry, ResponseFormat, RetryPolicy,
    RetryingClient,
};
pub use parser::{extract_json, parse_structured, parse_value, ExpectedSchema, Structured};
pub use pipeline::Pipeline;
pub use report::ReportAssembler;
pub use risk::RiskGate;
pub use trader::{TradeContext, TradePlan, TraderNode};
