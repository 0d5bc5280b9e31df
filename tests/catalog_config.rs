// tests/catalog_config.rs
use source_sentinel::catalog::{load_catalog_default, load_catalog_from, ENV_CATALOG_PATH};
use source_sentinel::{Priority, SourceType};
use std::{env, fs};

#[test]
fn parse_toml_and_json_paths() {
    let dir = tempfile::tempdir().unwrap();

    let p_toml = dir.path().join("sources.toml");
    fs::write(
        &p_toml,
        r#"
[[sources]]
name = "Central Bank Press"
authority = "Central Bank"
type = "feed"
priority = "critical"
url = "https://cb.example/press.rss"
timeout_secs = 20

[[sources]]
name = "Supervisor Notices"
authority = "Supervisor"
type = "browser-scrape"
priority = "disabled"
category = "banking"
"#,
    )
    .unwrap();
    let c = load_catalog_from(&p_toml).unwrap();
    assert_eq!(c.len(), 2);
    assert_eq!(c.sources[0].timeout_secs, Some(20));
    assert_eq!(c.sources[1].source_type, SourceType::BrowserScrape);
    assert_eq!(c.sources[1].priority, Priority::Disabled);

    let p_json = dir.path().join("sources.json");
    fs::write(
        &p_json,
        r#"[{"name":"Demo","authority":"Me","source_type":"demo","priority":"low"}]"#,
    )
    .unwrap();
    let cj = load_catalog_from(&p_json).unwrap();
    assert_eq!(cj.sources[0].source_type, SourceType::Demo);
}

#[test]
fn unnamed_or_broken_catalog_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let unnamed = dir.path().join("sources.json");
    fs::write(
        &unnamed,
        r#"[{"name":"  ","authority":"X","type":"feed","priority":"high"}]"#,
    )
    .unwrap();
    assert!(load_catalog_from(&unnamed).is_err());

    let broken = dir.path().join("broken.toml");
    fs::write(&broken, "[[sources]]\nname = ").unwrap();
    assert!(load_catalog_from(&broken).is_err());
}

#[serial_test::serial]
#[test]
fn default_uses_env_then_fallbacks() {
    // isolate CWD so the test never reads a real config/
    let old = env::current_dir().unwrap();
    let tmp = tempfile::tempdir().unwrap();
    env::set_current_dir(tmp.path()).unwrap();
    env::remove_var(ENV_CATALOG_PATH);

    // 1) nothing on disk → error (a run cannot execute without a catalog)
    assert!(load_catalog_default().is_err());

    // 2) fallback TOML in ./config/
    let cfg_dir = tmp.path().join("config");
    fs::create_dir_all(&cfg_dir).unwrap();
    fs::write(
        cfg_dir.join("sources.toml"),
        "[[sources]]\nname = \"A\"\nauthority = \"X\"\ntype = \"feed\"\npriority = \"high\"\n",
    )
    .unwrap();
    assert_eq!(load_catalog_default().unwrap().sources[0].name, "A");

    // 3) env wins
    let p_env = tmp.path().join("other.json");
    fs::write(
        &p_env,
        r#"{"sources":[{"name":"B","authority":"Y","type":"demo","priority":"low"}]}"#,
    )
    .unwrap();
    env::set_var(ENV_CATALOG_PATH, p_env.display().to_string());
    assert_eq!(load_catalog_default().unwrap().sources[0].name, "B");

    // 4) env pointing nowhere is an error, not a silent fallback
    env::set_var(ENV_CATALOG_PATH, tmp.path().join("missing.toml").display().to_string());
    assert!(load_catalog_default().is_err());
    env::remove_var(ENV_CATALOG_PATH);

    env::set_current_dir(&old).unwrap();
}
