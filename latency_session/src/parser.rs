use crate::config::{EngineConfig, EngineConfigFile};
use crate::event::RequestEvent;
use anyhow::{Context, Result};
use std::path::Path;

pub async fn parse_config_from_file(path: impl AsRef<Path>) -> Result<EngineConfig> {
    let path = path.as_ref();
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading config {}", path.display()))?;

    let extension = path.extension().and_then(|s| s.to_str());

    match extension {
        Some("yaml") | Some("yml") => parse_yaml(&contents),
        Some("toml") => parse_toml(&contents),
        Some("json") => parse_json(&contents),
        _ => Err(anyhow::anyhow!(
            "Unsupported file format. Use .yaml, .yml, .toml, or .json"
        )),
    }
}

pub fn parse_config_from_str(content: &str, format: &str) -> Result<EngineConfig> {
    match format.to_lowercase().as_str() {
        "yaml" | "yml" => parse_yaml(content),
        "toml" => parse_toml(content),
        "json" => parse_json(content),
        _ => Err(anyhow::anyhow!("Unsupported format: {}", format)),
    }
}

fn parse_yaml(content: &str) -> Result<EngineConfig> {
    let config: EngineConfig = serde_yaml::from_str(content)?;
    config.validate()?;
    Ok(config)
}

fn parse_toml(content: &str) -> Result<EngineConfig> {
    let file: EngineConfigFile = toml::from_str(content)?;
    file.engine.validate()?;
    Ok(file.engine)
}

fn parse_json(content: &str) -> Result<EngineConfig> {
    let config: EngineConfig = serde_json::from_str(content)?;
    config.validate()?;
    Ok(config)
}

/// Load an event trace: JSON lines (`.jsonl`, `.ndjson`), or an array in
/// `.json`, `.yaml` or `.yml`.
pub async fn parse_trace_from_file(path: impl AsRef<Path>) -> Result<Vec<RequestEvent>> {
    let path = path.as_ref();
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading trace {}", path.display()))?;

    let format = path.extension().and_then(|s| s.to_str()).unwrap_or("jsonl");
    parse_trace_from_str(&contents, format)
}

pub fn parse_trace_from_str(content: &str, format: &str) -> Result<Vec<RequestEvent>> {
    match format.to_lowercase().as_str() {
        "jsonl" | "ndjson" => parse_json_lines(content),
        "json" => Ok(serde_json::from_str(content)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(content)?),
        _ => Err(anyhow::anyhow!("Unsupported trace format: {}", format)),
    }
}

fn parse_json_lines(content: &str) -> Result<Vec<RequestEvent>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(index, line)| {
            serde_json::from_str(line).with_context(|| format!("trace line {}", index + 1))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
store_path: "/var/lib/latency/store.json"
schemes: [http, https, wss]
reaper:
  max_age: 2m
  interval: 10s
retry:
  max_attempts: 3
  base_delay: 10ms
  max_delay: 200ms
"#;

        let config = parse_yaml(yaml).unwrap();
        assert_eq!(config.schemes.len(), 3);
        assert_eq!(config.reaper.max_age, Duration::from_secs(120));
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.base_delay, Duration::from_millis(10));
    }

    #[test]
    fn test_parse_toml() {
        let toml = r#"
[engine]
store_path = "store.json"

[engine.reaper]
max_age = "30s"
"#;

        let config = parse_toml(toml).unwrap();
        assert_eq!(config.reaper.max_age, Duration::from_secs(30));
        assert_eq!(config.reaper.interval, Duration::from_secs(30));
        assert_eq!(config.schemes, vec!["http".to_string(), "https".to_string()]);
    }

    #[test]
    fn test_parse_json_defaults() {
        let config = parse_json("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        assert!(parse_json(r#"{"schemes": []}"#).is_err());
        assert!(parse_config_from_str("{}", "ini").is_err());
    }

    #[test]
    fn test_parse_trace_json_lines() {
        let trace = r#"
# captured from a.com
{"event":"started","id":"1","method":"GET","url":"https://a.com/api/users","time":0}
{"event":"completed","id":"1","time":120}

{"event":"failed","id":"2"}
"#;
        let events = parse_trace_from_str(trace, "jsonl").unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[1], RequestEvent::completed("1", 120));
    }

    #[test]
    fn test_parse_trace_reports_line() {
        let trace = "{\"event\":\"failed\",\"id\":\"2\"}\n{\"event\":\"bogus\"}\n";
        let err = parse_trace_from_str(trace, "jsonl").unwrap_err();
        assert!(format!("{:#}", err).contains("trace line 2"));
    }

    #[test]
    fn test_parse_trace_yaml() {
        let trace = r#"
- event: started
  id: 7
  profile: a.com
  method: POST
  url: https://a.com/v1/orders
  time: 10
- event: completed
  id: 7
  time: 42
"#;
        let events = parse_trace_from_str(trace, "yaml").unwrap();
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], RequestEvent::Started { profile: Some(p), .. } if p == "a.com"));
    }
}
