//! Read-only views over one namespace of the merged configuration.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_yaml::Value;

use crate::error::ConfigError;

/// A queryable view over a namespace subtree, or over the whole tree for
/// the root handle.
///
/// Paths are dot separated (`"pool.max_size"`). A numeric segment indexes
/// into a sequence (`"servers.0.host"`).
#[derive(Debug, Clone, PartialEq)]
pub struct Namespace {
    name: String,
    generation: u64,
    value: Value,
}

impl Namespace {
    pub(crate) fn new(name: impl Into<String>, generation: u64, value: Value) -> Self {
        Self {
            name: name.into(),
            generation,
            value,
        }
    }

    /// Returns the namespace name. Empty for the root handle.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the config generation this handle was built from.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns the raw subtree.
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Looks up a dotted path. An empty path returns the whole subtree.
    pub fn get(&self, path: &str) -> Option<&Value> {
        if path.is_empty() {
            return Some(&self.value);
        }

        path.split('.').try_fold(&self.value, |node, segment| match node {
            Value::Mapping(map) => map.get(segment),
            Value::Sequence(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
    }

    /// Returns true if the path resolves to a non-null value.
    pub fn contains(&self, path: &str) -> bool {
        self.get(path).map(|v| !v.is_null()).unwrap_or(false)
    }

    /// Returns a string value without conversion.
    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(Value::as_str)
    }

    /// Returns any scalar value rendered as a string.
    pub fn get_string(&self, path: &str) -> Option<String> {
        match self.get(path)? {
            Value::String(s) => Some(s.clone()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Returns an integer, accepting numeric strings.
    pub fn get_i64(&self, path: &str) -> Option<i64> {
        match self.get(path)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Returns a float, accepting integers and numeric strings.
    pub fn get_f64(&self, path: &str) -> Option<f64> {
        match self.get(path)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Returns a boolean, accepting `"true"`/`"false"` strings.
    pub fn get_bool(&self, path: &str) -> Option<bool> {
        match self.get(path)? {
            Value::Bool(b) => Some(*b),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Returns a duration. Strings use unit suffixes (`"1h30m"`, `"250ms"`);
    /// bare numbers are seconds.
    pub fn get_duration(&self, path: &str) -> Option<Duration> {
        match self.get(path)? {
            Value::Number(n) => n
                .as_u64()
                .map(Duration::from_secs)
                .or_else(|| n.as_f64().and_then(|f| Duration::try_from_secs_f64(f).ok())),
            Value::String(s) => parse_duration(s),
            _ => None,
        }
    }

    /// Returns a sequence of scalars rendered as strings.
    pub fn get_string_list(&self, path: &str) -> Option<Vec<String>> {
        let items = self.get(path)?.as_sequence()?;
        items
            .iter()
            .map(|item| match item {
                Value::String(s) => Some(s.clone()),
                Value::Bool(b) => Some(b.to_string()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect()
    }

    /// Returns the string keys of the mapping at `path`.
    pub fn keys(&self, path: &str) -> Vec<String> {
        self.get(path)
            .and_then(Value::as_mapping)
            .map(|map| {
                map.keys()
                    .filter_map(|k| k.as_str().map(str::to_owned))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Deserializes the whole subtree.
    pub fn unmarshal<T: DeserializeOwned>(&self) -> Result<T, ConfigError> {
        serde_yaml::from_value(self.value.clone()).map_err(|e| ConfigError::Decode {
            path: self.name.clone(),
            source: e,
        })
    }

    /// Deserializes the value at a dotted path.
    pub fn unmarshal_key<T: DeserializeOwned>(&self, path: &str) -> Result<T, ConfigError> {
        let full_path = self.qualify(path);
        let value = self.get(path).ok_or_else(|| ConfigError::NotFound {
            name: full_path.clone(),
        })?;

        serde_yaml::from_value(value.clone()).map_err(|e| ConfigError::Decode {
            path: full_path,
            source: e,
        })
    }

    fn qualify(&self, path: &str) -> String {
        match (self.name.is_empty(), path.is_empty()) {
            (true, _) => path.to_string(),
            (false, true) => self.name.clone(),
            (false, false) => format!("{}.{}", self.name, path),
        }
    }
}

/// Parses a duration such as `"300ms"`, `"1.5s"` or `"2h45m"`.
///
/// Units: `ns`, `us` (or `µs`), `ms`, `s`, `m`, `h`. A lone `"0"` is zero.
pub fn parse_duration(input: &str) -> Option<Duration> {
    let input = input.trim();
    if input == "0" {
        return Some(Duration::ZERO);
    }
    if input.is_empty() {
        return None;
    }

    let mut total_nanos = 0f64;
    let mut rest = input;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if number_len == 0 {
            return None;
        }
        let number: f64 = rest[..number_len].parse().ok()?;
        rest = &rest[number_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let nanos_per_unit = match &rest[..unit_len] {
            "ns" => 1.0,
            "us" | "µs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            _ => return None,
        };
        rest = &rest[unit_len..];

        total_nanos += number * nanos_per_unit;
    }

    if !total_nanos.is_finite() || total_nanos > u64::MAX as f64 {
        return None;
    }
    Some(Duration::from_nanos(total_nanos.round() as u64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    fn sample() -> Namespace {
        let value: Value = serde_yaml::from_str(
            r#"
name: api
port: 8080
port_text: "9090"
ratio: 0.75
debug: true
debug_text: "false"
timeout: 1m30s
retry_after: 5
servers:
  - host: a.internal
  - host: b.internal
tags: [blue, 3, true]
pool:
  max_size: 16
  idle: null
"#,
        )
        .unwrap();
        Namespace::new("service", 1, value)
    }

    #[test]
    fn test_typed_getters() {
        let ns = sample();

        assert_eq!(ns.name(), "service");
        assert_eq!(ns.get_str("name"), Some("api"));
        assert_eq!(ns.get_str("port"), None);
        assert_eq!(ns.get_string("port").as_deref(), Some("8080"));
        assert_eq!(ns.get_i64("port"), Some(8080));
        assert_eq!(ns.get_i64("port_text"), Some(9090));
        assert_eq!(ns.get_f64("ratio"), Some(0.75));
        assert_eq!(ns.get_bool("debug"), Some(true));
        assert_eq!(ns.get_bool("debug_text"), Some(false));
        assert_eq!(ns.get_bool("name"), None);
    }

    #[test]
    fn test_nested_paths() {
        let ns = sample();

        assert_eq!(ns.get_i64("pool.max_size"), Some(16));
        assert_eq!(ns.get_str("servers.1.host"), Some("b.internal"));
        assert!(ns.get("servers.5.host").is_none());
        assert!(ns.get("pool.max_size.deeper").is_none());
        assert!(ns.contains("pool"));
        assert!(!ns.contains("pool.idle"));
        assert!(!ns.contains("missing"));
        assert_eq!(ns.keys("pool"), vec!["max_size", "idle"]);
    }

    #[test]
    fn test_durations_and_lists() {
        let ns = sample();

        assert_eq!(ns.get_duration("timeout"), Some(Duration::from_secs(90)));
        assert_eq!(ns.get_duration("retry_after"), Some(Duration::from_secs(5)));
        assert_eq!(
            ns.get_string_list("tags"),
            Some(vec!["blue".to_string(), "3".to_string(), "true".to_string()])
        );
        assert_eq!(ns.get_string_list("servers"), None);
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("250ms"), Some(Duration::from_millis(250)));
        assert_eq!(parse_duration("2h45m"), Some(Duration::from_secs(9900)));
        assert_eq!(parse_duration("1.5s"), Some(Duration::from_millis(1500)));
        assert_eq!(parse_duration("0"), Some(Duration::ZERO));
        assert_eq!(parse_duration("10"), None);
        assert_eq!(parse_duration("5 days"), None);
        assert_eq!(parse_duration(""), None);
    }

    #[test]
    fn test_unmarshal() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Pool {
            max_size: u32,
            idle: Option<u32>,
        }

        let ns = sample();
        let pool: Pool = ns.unmarshal_key("pool").unwrap();
        assert_eq!(pool, Pool { max_size: 16, idle: None });

        let err = ns.unmarshal_key::<Pool>("name").unwrap_err();
        assert!(err.to_string().contains("service.name"));

        let err = ns.unmarshal_key::<Pool>("nope").unwrap_err();
        assert!(err.is_not_found());
    }
}
