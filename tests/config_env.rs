// tests/config_env.rs
// These tests touch process env vars, so they run serially.

use std::env;

use serial_test::serial;

use market_impact_alerts::analyze::{FallbackLadder, InferenceBackend};
use market_impact_alerts::config::EnrichPolicy;
use market_impact_alerts::{InferenceConfig, PipelineConfig};

fn clear_pipeline_env() {
    for k in [
        "PIPELINE_CONFIG_PATH",
        "DATA_DIR",
        "BATCH_LIMIT",
        "SCHEDULE_INTERVAL_SECS",
        "LIVENESS_URL",
        "PUSH_GATEWAY_URL",
    ] {
        env::remove_var(k);
    }
}

#[test]
#[serial]
fn env_overrides_win_over_the_file() {
    clear_pipeline_env();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pipeline.toml");
    std::fs::write(
        &path,
        r#"
batch_limit = 7
accept_threshold = 60
enrich_policy = "selective"
notify_url = "https://push.from.file"
"#,
    )
    .unwrap();

    env::set_var("PIPELINE_CONFIG_PATH", &path);
    env::set_var("BATCH_LIMIT", "9");
    env::set_var("DATA_DIR", "/var/lib/alerts");
    env::set_var("PUSH_GATEWAY_URL", "");

    let cfg = PipelineConfig::load_default().unwrap();
    clear_pipeline_env();

    assert_eq!(cfg.batch_limit, 9);
    assert_eq!(cfg.accept_threshold, 60);
    assert_eq!(cfg.enrich_policy, EnrichPolicy::Selective);
    assert_eq!(cfg.data_dir, std::path::PathBuf::from("/var/lib/alerts"));
    // An empty override disables the gateway.
    assert_eq!(cfg.notify_url, None);
    assert_eq!(cfg.capacity, 100);
}

#[test]
#[serial]
fn explicit_config_path_must_exist() {
    clear_pipeline_env();
    env::set_var("PIPELINE_CONFIG_PATH", "/definitely/not/here.toml");
    let res = PipelineConfig::load_default();
    clear_pipeline_env();
    assert!(res.is_err());
}

#[test]
#[serial]
fn providers_without_keys_are_left_out_of_the_ladder() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ai.json");
    std::fs::write(
        &path,
        r#"{
  "providers": [
    {"name": "OpenRouter", "base_url": "https://openrouter.example/api/v1/", "credentials_env": "MIA_TEST_PRIMARY",
     "models": [{"id": "a:free", "free": true}, {"id": "b", "free": false}]},
    {"name": "openai", "base_url": "https://openai.example/v1", "credentials_env": "MIA_TEST_SECONDARY",
     "models": [{"id": "c"}]},
    {"name": "empty", "base_url": "https://x", "credentials_env": "MIA_TEST_EMPTY", "models": []}
  ]
}"#,
    )
    .unwrap();

    env::remove_var("MIA_TEST_PRIMARY");
    env::remove_var("MIA_TEST_PRIMARY_1");
    env::set_var("MIA_TEST_SECONDARY_1", "sk-one");
    env::set_var("MIA_TEST_SECONDARY_2", "sk-two");

    let cfg = InferenceConfig::load_from_file(&path).unwrap();
    assert_eq!(cfg.providers.len(), 2);
    assert_eq!(cfg.providers[0].name, "openrouter");
    assert_eq!(cfg.providers[0].base_url, "https://openrouter.example/api/v1");

    let ladder = FallbackLadder::from_config(&cfg).unwrap();
    env::remove_var("MIA_TEST_SECONDARY_1");
    env::remove_var("MIA_TEST_SECONDARY_2");

    let plan: Vec<(String, String, String)> = ladder
        .plan()
        .iter()
        .map(|a| {
            (
                a.backend.name().to_string(),
                a.model.id.clone(),
                a.credential.label.clone(),
            )
        })
        .collect();
    assert_eq!(
        plan,
        vec![
            ("openai".to_string(), "c".to_string(), "openai#1".to_string()),
            ("openai".to_string(), "c".to_string(), "openai#2".to_string()),
        ]
    );
}
