use delve_core::config::{
    Config, ExecutionMode, LLMConfig, DEFAULT_DATA_DIR, DEFAULT_LLM_PROVIDER, DEFAULT_MAX_REVISIONS,
    DEFAULT_OLLAMA_MODEL, DEFAULT_OLLAMA_URL, DEFAULT_OPENAI_MODEL, DEFAULT_OPENROUTER_URL,
};
use delve_core::search::SearchStrategy;

#[test]
fn test_default_config() {
    let config = Config::default();
    assert_eq!(config.llm.provider, DEFAULT_LLM_PROVIDER);
    assert_eq!(config.storage.data_dir, DEFAULT_DATA_DIR);
    assert_eq!(config.workflow.max_revisions, DEFAULT_MAX_REVISIONS);
    assert_eq!(config.search.strategy, SearchStrategy::Fallback);
    assert_eq!(config.workflow.execution, ExecutionMode::Parallel);
    assert!(config.validate().is_ok());
}

#[test]
fn test_config_to_toml() {
    let toml_str = Config::default().to_toml_string();
    assert!(toml_str.contains("[llm]"));
    assert!(toml_str.contains("[search]"));
    assert!(toml_str.contains("[aggregator]"));
    assert!(toml_str.contains("[workflow]"));
    assert!(toml_str.contains("[storage]"));
}

#[test]
fn test_api_keys_are_not_written_out() {
    let mut config = Config::default();
    config.llm.api_key = Some("sk-secret".into());
    config.search.providers[0].api_key = Some("tvly-secret".into());

    let rendered = config.to_toml_string();
    assert!(!rendered.contains("sk-secret"));
    assert!(!rendered.contains("tvly-secret"));
}

#[test]
fn test_config_from_toml() {
    let toml_str = r#"
[llm]
provider = "ollama"
model = "llama3"

[search]
strategy = "round-robin"
max_results = 5

[[search.providers]]
name = "local"
kind = "searxng"
base_url = "http://localhost:8080"

[[search.providers]]
name = "tavily"
kind = "tavily"
enabled = false

[search.circuit]
failure_threshold = 5

[workflow]
max_revisions = 1
execution = "sequential"
review_enabled = true

[storage]
data_dir = ".custom-delve"
"#;
    let config = Config::from_toml_str(toml_str).unwrap();
    assert_eq!(config.llm.provider, "ollama");
    assert_eq!(config.llm.model, Some("llama3".to_string()));
    assert_eq!(config.search.strategy, SearchStrategy::RoundRobin);
    assert_eq!(config.search.max_results, 5);
    assert_eq!(config.search.providers.len(), 2);
    assert!(!config.search.providers[1].enabled);
    assert_eq!(config.search.circuit.failure_threshold, 5);
    // Unset fields keep their defaults
    assert_eq!(config.search.retry.max_attempts, 3);
    assert_eq!(config.workflow.max_revisions, 1);
    assert_eq!(config.workflow.execution, ExecutionMode::Sequential);
    assert_eq!(config.workflow.fan_out_limit(4), 1);
    assert!(config.workflow.review_enabled);
    assert_eq!(config.storage.data_dir, ".custom-delve");
}

#[test]
fn test_invalid_values_are_rejected() {
    let cases = [
        "[search]\nmax_results = 0",
        "[search.retry]\nmax_attempts = 0",
        "[search.retry]\nbase_delay_ms = 500\nmax_delay_ms = 100",
        "[search.circuit]\nfailure_threshold = 0",
        "[[search.providers]]\nname = \"x\"\nkind = \"altavista\"",
        "[[search.providers]]\nname = \"x\"\nkind = \"searxng\"\n[[search.providers]]\nname = \"x\"\nkind = \"tavily\"",
        "[aggregator]\nsimilarity_threshold = 1.5",
        "[aggregator]\nprimary_threshold = 0.2\nsupporting_threshold = 0.5",
        "[workflow]\ncoverage_floor = -0.1",
        "[workflow]\nweb_max_queries = 0",
    ];
    for case in cases {
        assert!(Config::from_toml_str(case).is_err(), "accepted: {case}");
    }
}

#[test]
fn test_search_profiles_are_checked_and_resolved() {
    let config = Config::from_toml_str(
        r#"
[search]
profile = ["tavily"]

[[search.providers]]
name = "local"
kind = "searxng"

[[search.providers]]
name = "tavily"
kind = "tavily"

[search.route_profiles]
web = ["local", "tavily"]
agent = []
"#,
    )
    .unwrap();

    let names = |route: Option<&str>| config.search.profile_for(route).map(<[String]>::to_vec);
    assert_eq!(names(None), Some(vec!["tavily".to_string()]));
    assert_eq!(names(Some("deep")), Some(vec!["tavily".to_string()]));
    assert_eq!(names(Some("web")), Some(vec!["local".to_string(), "tavily".to_string()]));
    assert_eq!(names(Some("agent")), None);

    assert!(Config::from_toml_str("[search]
profile = [\"missing\"]").is_err());
    assert!(Config::from_toml_str("[search.route_profiles]
weird = [\"searxng\"]").is_err());
    assert!(Config::from_toml_str("[search.route_profiles]
web = [\"searxng\"]").is_ok());
}

#[test]
fn test_unknown_strategy_fails_to_parse() {
    assert!(Config::from_toml_str("[search]\nstrategy = \"random\"").is_err());
}

#[test]
fn test_backoff_doubles_and_caps() {
    let config = Config::default();
    let retry = &config.search.retry;
    assert_eq!(retry.backoff(1).as_millis(), 250);
    assert_eq!(retry.backoff(2).as_millis(), 500);
    assert_eq!(retry.backoff(3).as_millis(), 1_000);
    assert_eq!(retry.backoff(30).as_millis(), 4_000);
}

#[test]
fn test_model_and_url_defaults() {
    let mut config = LLMConfig {
        provider: "ollama".to_string(),
        ..Default::default()
    };
    assert_eq!(config.model_or_default(), DEFAULT_OLLAMA_MODEL);
    assert_eq!(config.base_url_or_default(), DEFAULT_OLLAMA_URL);

    config.provider = "openrouter".to_string();
    assert_eq!(config.base_url_or_default(), DEFAULT_OPENROUTER_URL);

    config.provider = "openai".to_string();
    assert_eq!(config.model_or_default(), DEFAULT_OPENAI_MODEL);

    config.model = Some("custom-model".to_string());
    assert_eq!(config.model_or_default(), "custom-model");
}
