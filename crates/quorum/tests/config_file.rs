//! The shipped configuration file stays loadable.

use quorum::models::{AnalystKind, DebateMode, MergeStrategyKind};

const SHIPPED: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../../config/quorum.toml");

#[test]
fn shipped_config_loads() {
    let config = quorum::load_config(SHIPPED).unwrap();

    assert_eq!(config.providers.len(), 3);
    assert_eq!(config.pipeline.default_provider, "gpt");
    assert_eq!(config.pipeline.debate.mode, DebateMode::Committee);
    assert_eq!(
        config.pipeline.debate.merge_strategy,
        MergeStrategyKind::ConfidenceWeighted
    );
    assert_eq!(
        config.pipeline.debate.side_providers(&config.pipeline.debate.bull, "gpt"),
        vec!["gpt".to_string(), "claude".to_string()]
    );

    let kinds: Vec<_> = config
        .pipeline
        .analysts
        .members
        .iter()
        .map(|a| a.kind)
        .collect();
    assert_eq!(kinds, AnalystKind::ALL.to_vec());
    assert_eq!(
        config.pipeline.fund_manager.min_judge_confidence.to_string(),
        "0.55"
    );
    assert_eq!(
        config.store.as_ref().map(|s| s.sqlite_path.as_str()),
        Some("data/quorum.db")
    );
}

#[test]
fn copied_config_with_edits_is_validated() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("quorum.toml");
    let raw = std::fs::read_to_string(SHIPPED)
        .unwrap()
        .replace("judge_provider = \"claude\"", "judge_provider = \"missing\"");
    std::fs::write(&path, raw).unwrap();

    let err = quorum::load_config(&path).unwrap_err();
    assert!(format!("{err:#}").contains("missing"));
}
