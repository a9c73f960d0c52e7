//! Schema skeletons for JSON, YAML and TOML documents
//!
//! Leaves are replaced by type tags and long collections are sampled, so the
//! result is still a valid document of the same format that shows the shape
//! of the data. The first few scalar leaves in traversal order keep their
//! real values, as do identifying top-level keys such as `name` and `version`.

use super::{StrategyError, Summarizer, Summary, SummarizationConfig};
use crate::types::{CompressionLevel, FileEntry};
use serde_json::{Map, Value};

/// Object and array nesting rendered at the outline level
const OUTLINE_DEPTH: usize = 3;

/// Top-level keys whose scalar values are always kept
const IDENTITY_KEYS: [&str; 6] = ["name", "version", "type", "main", "entry", "description"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DataFormat {
    Json,
    Yaml,
    Toml,
}

impl DataFormat {
    fn name(&self) -> &'static str {
        match self {
            Self::Json => "JSON",
            Self::Yaml => "YAML",
            Self::Toml => "TOML",
        }
    }
}

/// Summarizes structured data by its schema
pub struct SchemaStrategy {
    format: DataFormat,
}

impl SchemaStrategy {
    pub fn json() -> Self {
        Self { format: DataFormat::Json }
    }

    pub fn yaml() -> Self {
        Self { format: DataFormat::Yaml }
    }

    pub fn toml() -> Self {
        Self { format: DataFormat::Toml }
    }

    fn invalid(&self, message: impl ToString) -> StrategyError {
        StrategyError::InvalidData { format: self.format.name(), message: message.to_string() }
    }

    fn parse(&self, content: &str) -> Result<Value, StrategyError> {
        match self.format {
            DataFormat::Json => serde_json::from_str(content).map_err(|e| self.invalid(e)),
            DataFormat::Yaml => {
                let value: serde_yaml::Value =
                    serde_yaml::from_str(content).map_err(|e| self.invalid(e))?;
                serde_json::to_value(value).map_err(|e| self.invalid(e))
            }
            DataFormat::Toml => {
                let value: toml::Value = toml::from_str(content).map_err(|e| self.invalid(e))?;
                Ok(toml_to_json(value))
            }
        }
    }

    fn emit(&self, value: &Value) -> Result<String, StrategyError> {
        let mut text = match self.format {
            DataFormat::Json => serde_json::to_string_pretty(value).map_err(|e| self.invalid(e))?,
            DataFormat::Yaml => serde_yaml::to_string(value).map_err(|e| self.invalid(e))?,
            DataFormat::Toml => toml::to_string_pretty(value).map_err(|e| self.invalid(e))?,
        };
        if !text.ends_with('\n') {
            text.push('\n');
        }
        Ok(text)
    }
}

impl Summarizer for SchemaStrategy {
    fn name(&self) -> &'static str {
        "schema"
    }

    fn summarize(
        &self,
        file: &FileEntry,
        config: &SummarizationConfig,
    ) -> Result<Summary, StrategyError> {
        let value = self.parse(&file.content)?;
        let shape = match config.level {
            CompressionLevel::Outline => Shape { max_depth: OUTLINE_DEPTH, items: 1, leaves: 0 },
            CompressionLevel::Minimal => Shape { max_depth: 1, items: 0, leaves: 0 },
            _ => Shape {
                max_depth: usize::MAX,
                items: config.sample_leaves,
                leaves: config.sample_leaves,
            },
        };
        let mut kept = 0;
        let text = self.emit(&shape.skeleton(&value, 0, &mut kept))?;
        Ok(Summary { text, level: config.level, truncated: false })
    }
}

struct Shape {
    max_depth: usize,
    /// Array elements rendered before the `<... N more>` marker
    items: usize,
    /// Scalar leaves that keep their real value
    leaves: usize,
}

impl Shape {
    /// `kept` counts sampled leaves so far, in traversal order
    fn skeleton(&self, value: &Value, depth: usize, kept: &mut usize) -> Value {
        match value {
            Value::Object(map) if depth >= self.max_depth => {
                Value::String(format!("<object: {} keys>", map.len()))
            }
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| {
                        let rendered = if depth == 0 && is_identity(k, v) {
                            v.clone()
                        } else {
                            self.skeleton(v, depth + 1, kept)
                        };
                        (k.clone(), rendered)
                    })
                    .collect::<Map<String, Value>>(),
            ),
            Value::Array(items) if depth >= self.max_depth || self.items == 0 => {
                Value::String(format!("<array: {} items>", items.len()))
            }
            Value::Array(items) => {
                let mut sampled: Vec<Value> = items
                    .iter()
                    .take(self.items)
                    .map(|v| self.skeleton(v, depth + 1, kept))
                    .collect();
                if items.len() > self.items {
                    sampled.push(Value::String(format!("<... {} more>", items.len() - self.items)));
                }
                Value::Array(sampled)
            }
            leaf if *kept < self.leaves => {
                *kept += 1;
                leaf.clone()
            }
            leaf => Value::String(type_tag(leaf).to_owned()),
        }
    }
}

fn is_identity(key: &str, value: &Value) -> bool {
    IDENTITY_KEYS.contains(&key) && !matches!(value, Value::Object(_) | Value::Array(_))
}

fn type_tag(value: &Value) -> &'static str {
    match value {
        Value::Null => "<null>",
        Value::Bool(_) => "<boolean>",
        Value::Number(n) if n.is_i64() || n.is_u64() => "<integer>",
        Value::Number(_) => "<number>",
        Value::String(_) => "<string>",
        Value::Array(_) => "<array>",
        Value::Object(_) => "<object>",
    }
}

/// TOML datetimes become strings; everything else maps one to one
fn toml_to_json(value: toml::Value) -> Value {
    match value {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::from(i),
        toml::Value::Float(f) => Value::from(f),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(items) => Value::Array(items.into_iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => {
            Value::Object(table.into_iter().map(|(k, v)| (k, toml_to_json(v))).collect())
        }
    }
}

#[cfg(test)]
#[allow(clippy::str_to_string)]
mod tests {
    use super::*;

    const PACKAGE: &str = r#"{
  "name": "demo",
  "version": "1.2.0",
  "private": true,
  "workers": 4,
  "ratio": 0.5,
  "scripts": {"build": "tsc", "test": "jest"},
  "files": ["a.js", "b.js", "c.js", "d.js", "e.js"],
  "nested": {"one": {"two": {"three": {"four": 1}}}}
}"#;

    fn summarize(strategy: &SchemaStrategy, content: &str, level: CompressionLevel) -> String {
        let config = SummarizationConfig::default().at_level(level);
        strategy.summarize(&FileEntry::new("data", content), &config).unwrap().text
    }

    #[test]
    fn test_json_signatures_sample_first_leaves() {
        let text = summarize(&SchemaStrategy::json(), PACKAGE, CompressionLevel::Signatures);
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["name"], "demo");
        assert_eq!(value["version"], "1.2.0");
        // First three leaves in traversal order keep their values
        assert_eq!(value["private"], true);
        assert_eq!(value["workers"], 4);
        assert_eq!(value["ratio"], 0.5);
        assert_eq!(value["scripts"]["build"], "<string>");
        let files = value["files"].as_array().unwrap();
        assert_eq!(files.len(), 4);
        assert_eq!(files[0], "<string>");
        assert_eq!(files[3], "<... 2 more>");
        assert_eq!(value["nested"]["one"]["two"]["three"]["four"], "<integer>");
        // Key order follows the source
        assert!(text.find("\"name\"").unwrap() < text.find("\"version\"").unwrap());
    }

    #[test]
    fn test_sampled_leaves_inside_arrays_keep_values() {
        let source = r#"{"name":"demo","version":"1.2.0","tags":["a","b"]}"#;
        let text = summarize(&SchemaStrategy::json(), source, CompressionLevel::Signatures);
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["name"], "demo");
        assert_eq!(value["version"], "1.2.0");
        assert_eq!(value["tags"], serde_json::json!(["a", "b"]));

        let config = SummarizationConfig { sample_leaves: 1, ..Default::default() }
            .at_level(CompressionLevel::Signatures);
        let file = FileEntry::new("data.json", source);
        let text = SchemaStrategy::json().summarize(&file, &config).unwrap().text;
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["tags"], serde_json::json!(["a", "<... 1 more>"]));
    }

    #[test]
    fn test_json_outline_limits_depth() {
        let text = summarize(&SchemaStrategy::json(), PACKAGE, CompressionLevel::Outline);
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["nested"]["one"]["two"], "<object: 1 keys>");
        assert_eq!(value["files"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_json_minimal_keeps_top_level_keys() {
        let text = summarize(&SchemaStrategy::json(), PACKAGE, CompressionLevel::Minimal);
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["scripts"], "<object: 2 keys>");
        assert_eq!(value["files"], "<array: 5 items>");
    }

    #[test]
    fn test_yaml_round_trips_as_yaml() {
        let source = "server:\n  host: localhost\n  port: 8080\nfeatures:\n  - auth\n  - cache\n  - metrics\n  - search\n";
        let text = summarize(&SchemaStrategy::yaml(), source, CompressionLevel::Signatures);
        let value: serde_yaml::Value = serde_yaml::from_str(&text).unwrap();
        assert_eq!(value["server"]["host"], serde_yaml::Value::from("localhost"));
        assert_eq!(value["server"]["port"], serde_yaml::Value::from(8080_i64));
        assert_eq!(value["features"][0], serde_yaml::Value::from("auth"));
        assert_eq!(value["features"][1], serde_yaml::Value::from("<string>"));
        assert_eq!(value["features"].as_sequence().unwrap().len(), 4);
    }

    #[test]
    fn test_toml_round_trips_as_toml() {
        let source = "[package]\nname = \"demo\"\nversion = \"0.1.0\"\nedition = \"2021\"\nauthors = [\"a\", \"b\", \"c\", \"d\", \"e\"]\n\n[dependencies]\nserde = \"1.0\"\nlog = \"0.4\"\n\n[profile.release]\nlto = true\nreleased = 1979-05-27T07:32:00Z\n";
        let text = summarize(&SchemaStrategy::toml(), source, CompressionLevel::Signatures);
        let value: toml::Value = toml::from_str(&text).unwrap();
        assert_eq!(value["package"]["name"].as_str(), Some("demo"));
        assert_eq!(value["package"]["version"].as_str(), Some("0.1.0"));
        assert_eq!(value["package"]["edition"].as_str(), Some("2021"));
        assert_eq!(value["package"]["authors"].as_array().unwrap().len(), 4);
        assert_eq!(value["dependencies"]["log"].as_str(), Some("<string>"));
        assert_eq!(value["profile"]["release"]["released"].as_str(), Some("<string>"));

        let text = summarize(&SchemaStrategy::toml(), source, CompressionLevel::Minimal);
        let value: toml::Value = toml::from_str(&text).unwrap();
        assert_eq!(value["dependencies"].as_str(), Some("<object: 2 keys>"));
    }

    #[test]
    fn test_invalid_data() {
        let config = SummarizationConfig::default();
        let file = FileEntry::new("bad.json", "{\"a\": ");
        let result = SchemaStrategy::json().summarize(&file, &config);
        assert!(matches!(result, Err(StrategyError::InvalidData { format: "JSON", .. })));
        let file = FileEntry::new("bad.yaml", "a: [1, 2\n");
        assert!(SchemaStrategy::yaml().summarize(&file, &config).is_err());
        let file = FileEntry::new("bad.toml", "[package\nname = 1\n");
        assert!(matches!(
            SchemaStrategy::toml().summarize(&file, &config),
            Err(StrategyError::InvalidData { format: "TOML", .. })
        ));
    }
}
