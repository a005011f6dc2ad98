use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::debug;

use crate::Config;

/// Ordered list of config file locations searched from lowest to highest priority.
/// Later files override earlier ones.
fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    paths.push(PathBuf::from("/etc/pith/config.yaml"));
    paths.push(PathBuf::from("/etc/pith/config.yml"));

    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".config/pith/config.yaml"));
        paths.push(home.join(".config/pith/config.yml"));
    }
    if let Some(cfg) = dirs::config_dir() {
        paths.push(cfg.join("pith/config.yaml"));
        paths.push(cfg.join("pith/config.yml"));
    }

    paths.push(PathBuf::from(".pith/config.yaml"));
    paths.push(PathBuf::from(".pith/config.yml"));
    paths.push(PathBuf::from("pith.yaml"));
    paths.push(PathBuf::from("pith.yml"));

    paths
}

/// Load configuration by merging all discovered YAML files.
///
/// `extra` may provide an explicit override path (the `PITH_CONFIG`
/// environment variable, or a `--config` flag at the call site); it is
/// applied last and is an error if it does not exist.
pub fn load(extra: Option<&Path>) -> anyhow::Result<Config> {
    let mut merged = serde_yaml::Value::Mapping(serde_yaml::Mapping::new());

    for path in config_search_paths() {
        if path.is_file() {
            debug!(path = %path.display(), "loading config layer");
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            let layer: serde_yaml::Value = serde_yaml::from_str(&text)
                .with_context(|| format!("parsing {}", path.display()))?;
            merge_yaml(&mut merged, layer);
        }
    }

    if let Some(p) = extra {
        debug!(path = %p.display(), "loading explicit config");
        let text =
            std::fs::read_to_string(p).with_context(|| format!("reading {}", p.display()))?;
        let layer: serde_yaml::Value =
            serde_yaml::from_str(&text).with_context(|| format!("parsing {}", p.display()))?;
        merge_yaml(&mut merged, layer);
    }

    let mut config: Config = if matches!(merged, serde_yaml::Value::Mapping(ref m) if m.is_empty())
    {
        Config::default()
    } else {
        serde_yaml::from_value(merged).unwrap_or_default()
    };

    substitute_mcp_env(&mut config);
    Ok(config)
}

/// Deep-merge `src` into `dst`; src wins on scalar conflicts.
fn merge_yaml(dst: &mut serde_yaml::Value, src: serde_yaml::Value) {
    match (dst, src) {
        (serde_yaml::Value::Mapping(d), serde_yaml::Value::Mapping(s)) => {
            for (k, v) in s {
                let entry = d
                    .entry(k)
                    .or_insert(serde_yaml::Value::Mapping(serde_yaml::Mapping::new()));
                merge_yaml(entry, v);
            }
        }
        (dst, src) => *dst = src,
    }
}

/// Expand `${VAR}` placeholders in MCP server header values from the
/// process environment. Unset variables are left as the literal
/// placeholder so a misconfiguration is visible rather than silently
/// blank.
fn substitute_mcp_env(config: &mut Config) {
    for server in config.mcp.servers.values_mut() {
        for value in server.headers.values_mut() {
            *value = shellexpand::env(value).map(|s| s.into_owned()).unwrap_or_else(|_| value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn val(s: &str) -> serde_yaml::Value {
        serde_yaml::from_str(s).unwrap()
    }

    #[test]
    fn merge_scalar_src_wins() {
        let mut dst = val("x: 1");
        let src = val("x: 2");
        merge_yaml(&mut dst, src);
        assert_eq!(dst["x"].as_i64(), Some(2));
    }

    #[test]
    fn merge_preserves_keys_not_in_src() {
        let mut dst = val("a: 1\nb: 2");
        let src = val("b: 99");
        merge_yaml(&mut dst, src);
        assert_eq!(dst["a"].as_i64(), Some(1));
        assert_eq!(dst["b"].as_i64(), Some(99));
    }

    #[test]
    fn merge_nested_tables() {
        let mut dst = val("model:\n  provider: openai\n  model: gpt-4o");
        let src = val("model:\n  model: gpt-4o-mini");
        merge_yaml(&mut dst, src);
        assert_eq!(dst["model"]["provider"].as_str(), Some("openai"));
        assert_eq!(dst["model"]["model"].as_str(), Some("gpt-4o-mini"));
    }

    #[test]
    fn load_returns_error_when_explicit_path_missing() {
        let result = load(Some(Path::new("/tmp/pith_nonexistent_config_xyz.yaml")));
        assert!(result.is_err());
    }

    #[test]
    fn load_with_no_extra_path_returns_defaults() {
        let cfg = load(None).unwrap();
        assert_eq!(cfg.model.provider, "openai");
    }

    #[test]
    fn load_explicit_file_overrides_defaults() {
        use std::io::Write;
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "model:\n  provider: anthropic\n  model: test-model").unwrap();
        let cfg = load(Some(f.path())).unwrap();
        assert_eq!(cfg.model.provider, "anthropic");
        assert_eq!(cfg.model.model, "test-model");
    }

    #[test]
    fn mcp_header_env_substitution() {
        std::env::set_var("PITH_TEST_TOKEN", "secret123");
        let mut config = Config::default();
        config.mcp.servers.insert(
            "search".to_string(),
            crate::McpServerConfig {
                url: "https://example.com".to_string(),
                headers: [("Authorization".to_string(), "Bearer ${PITH_TEST_TOKEN}".to_string())]
                    .into_iter()
                    .collect(),
            },
        );
        substitute_mcp_env(&mut config);
        assert_eq!(
            config.mcp.servers["search"].headers["Authorization"],
            "Bearer secret123"
        );
        std::env::remove_var("PITH_TEST_TOKEN");
    }
}
