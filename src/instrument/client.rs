use std::{thread, time::Duration};

use log::{debug, warn};
use serde_json::Value;

use super::{InstrumentSource, TagReadings};
use crate::config::AnalyserConfig;
use crate::db::TagDefinition;
use crate::error::TransportError;

const VALUE_LIST_PATH: &str = "/api/valuelist";
const TAG_LIST_PATH: &str = "/api/taglist";
const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(1);

/// Blocking HTTP client for the analyser's REST API.
///
/// Each request carries the configured timeout. Failed attempts are retried
/// up to `retry_attempts` times in total, sleeping `base * 2^attempt`
/// between attempts (attempt counted from 0).
pub struct InstrumentClient {
    agent: ureq::Agent,
    base_url: String,
    retry_attempts: u32,
    backoff_base: Duration,
}

impl InstrumentClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration, retry_attempts: u32) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();

        Self {
            agent,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            retry_attempts: retry_attempts.max(1),
            backoff_base: DEFAULT_BACKOFF_BASE,
        }
    }

    pub fn from_config(config: &AnalyserConfig) -> Self {
        Self::new(
            config.base_url(),
            config.request_timeout(),
            config.instrument.retry_attempts,
        )
    }

    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    pub fn value_list_url(&self) -> String {
        format!("{}{VALUE_LIST_PATH}", self.base_url)
    }

    pub fn tag_list_url(&self) -> String {
        format!("{}{TAG_LIST_PATH}", self.base_url)
    }

    pub fn fetch_values(&self) -> Result<TagReadings, TransportError> {
        let url = self.value_list_url();
        let body = self.get_json(&url)?;
        parse_value_list(&body).map_err(|message| TransportError::InvalidResponse { url, message })
    }

    /// Tag catalog as advertised by the instrument.
    pub fn fetch_taglist(&self) -> Result<Vec<TagDefinition>, TransportError> {
        let url = self.tag_list_url();
        let body = self.get_json(&url)?;
        parse_taglist(&body).map_err(|message| TransportError::InvalidResponse { url, message })
    }

    fn get_json(&self, url: &str) -> Result<Value, TransportError> {
        let mut attempt = 0;
        loop {
            match self.get_once(url) {
                Ok(value) => return Ok(value),
                Err(message) if attempt + 1 >= self.retry_attempts => {
                    return Err(TransportError::Exhausted {
                        url: url.to_string(),
                        attempts: self.retry_attempts,
                        message,
                    });
                }
                Err(message) => {
                    let delay = self.backoff_base.saturating_mul(1 << attempt.min(16));
                    warn!(
                        "Request to {url} failed (attempt {}/{}): {message}; retrying in {delay:?}",
                        attempt + 1,
                        self.retry_attempts
                    );
                    thread::sleep(delay);
                    attempt += 1;
                }
            }
        }
    }

    fn get_once(&self, url: &str) -> Result<Value, String> {
        let response = self.agent.get(url).call().map_err(|err| match err {
            ureq::Error::Status(code, _) => format!("HTTP status {code}"),
            ureq::Error::Transport(transport) => transport.to_string(),
        })?;
        let text = response.into_string().map_err(|err| err.to_string())?;
        debug!("{url} returned {} bytes", text.len());
        serde_json::from_str(&text).map_err(|err| format!("malformed JSON: {err}"))
    }
}

impl InstrumentSource for InstrumentClient {
    fn fetch(&self) -> Result<TagReadings, TransportError> {
        self.fetch_values()
    }

    fn describe(&self) -> String {
        self.base_url.clone()
    }
}

fn value_to_string(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// Parse `{"values":[{"name":..,"value":..}, ..]}`. Entries with an empty
/// or missing name are dropped.
pub fn parse_value_list(body: &Value) -> Result<TagReadings, String> {
    let entries = body
        .get("values")
        .and_then(Value::as_array)
        .ok_or_else(|| "missing \"values\" array".to_string())?;

    let mut readings = TagReadings::new();
    for entry in entries {
        let name = entry.get("name").and_then(Value::as_str).unwrap_or("");
        if name.is_empty() {
            continue;
        }
        readings.insert(name.to_string(), value_to_string(entry.get("value")));
    }
    Ok(readings)
}

/// Parse `{"tags":[{name,type,value,properties}, ..]}`. `properties` may be
/// a JSON object or a string holding one.
pub fn parse_taglist(body: &Value) -> Result<Vec<TagDefinition>, String> {
    let entries = body
        .get("tags")
        .and_then(Value::as_array)
        .ok_or_else(|| "missing \"tags\" array".to_string())?;

    let mut definitions = Vec::new();
    for entry in entries {
        let name = entry.get("name").and_then(Value::as_str).unwrap_or("");
        if name.is_empty() {
            continue;
        }

        let properties = match entry.get("properties") {
            Some(Value::String(raw)) => serde_json::from_str(raw).unwrap_or(Value::Null),
            Some(value) => value.clone(),
            None => Value::Null,
        };
        let text = |key: &str| {
            properties
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        let number = |key: &str| properties.get(key).and_then(Value::as_f64);
        let flag = |key: &str, default: bool| {
            properties
                .get(key)
                .and_then(Value::as_bool)
                .unwrap_or(default)
        };

        definitions.push(TagDefinition {
            name: name.to_string(),
            tag_type: value_to_string(entry.get("type")),
            description: text("Description"),
            group: text("Group"),
            units: text("Units"),
            precision: properties
                .get("Precision")
                .and_then(Value::as_u64)
                .and_then(|p| u32::try_from(p).ok()),
            eu_min: number("EuMin"),
            eu_max: number("EuMax"),
            is_read_only: flag("IsReadOnly", false),
            is_visible: flag("IsVisible", true),
            is_dashboard: flag("IsDashboard", false),
        });
    }
    Ok(definitions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn value_list_drops_unnamed_entries_and_stringifies_values() {
        let body = json!({"values": [
            {"name": "CO_CONC", "value": "27.4"},
            {"name": "", "value": "1"},
            {"value": "2"},
            {"name": "AI_PUMP_FLOW", "value": 1.5},
            {"name": "BOX_TEMP_WARN", "value": false},
            {"name": "OS_VERSION"}
        ]});

        let readings = parse_value_list(&body).unwrap();
        assert_eq!(readings.len(), 4);
        assert_eq!(readings["CO_CONC"], "27.4");
        assert_eq!(readings["AI_PUMP_FLOW"], "1.5");
        assert_eq!(readings["BOX_TEMP_WARN"], "false");
        assert_eq!(readings["OS_VERSION"], "");
    }

    #[test]
    fn value_list_requires_values_array() {
        assert!(parse_value_list(&json!({"tags": []})).is_err());
    }

    #[test]
    fn taglist_accepts_string_and_object_properties() {
        let body = json!({"tags": [
            {"name": "CO_CONC", "type": "Float", "value": "0",
             "properties": "{\"Description\":\"CO\",\"Group\":\"concentration_tags\",\"Units\":\"ppm\",\"Precision\":1,\"EuMin\":0,\"EuMax\":1000}"},
            {"name": "BOX_TEMP_WARN", "type": "Bool",
             "properties": {"Group": "warning_tags", "IsReadOnly": true, "IsVisible": false}},
            {"name": "", "type": "Float"}
        ]});

        let tags = parse_taglist(&body).unwrap();
        assert_eq!(tags.len(), 2);
        assert_eq!(tags[0].units, "ppm");
        assert_eq!(tags[0].precision, Some(1));
        assert_eq!(tags[0].eu_max, Some(1000.0));
        assert_eq!(tags[0].tag_type, "Float");
        assert_eq!(tags[1].group, "warning_tags");
        assert!(tags[1].is_read_only);
        assert!(!tags[1].is_visible);
    }

    #[test]
    fn retries_are_exhausted_against_a_closed_port() {
        let client = InstrumentClient::new("http://127.0.0.1:1", Duration::from_millis(200), 3)
            .with_backoff_base(Duration::from_millis(1));

        match client.fetch_values() {
            Err(TransportError::Exhausted { attempts, url, .. }) => {
                assert_eq!(attempts, 3);
                assert_eq!(url, "http://127.0.0.1:1/api/valuelist");
            }
            other => panic!("expected exhausted retries, got {other:?}"),
        }
    }

    #[test]
    fn zero_retry_attempts_still_tries_once() {
        let client = InstrumentClient::new("http://127.0.0.1:1/", Duration::from_millis(200), 0);
        assert_eq!(client.value_list_url(), "http://127.0.0.1:1/api/valuelist");
        match client.fetch_values() {
            Err(TransportError::Exhausted { attempts, .. }) => assert_eq!(attempts, 1),
            other => panic!("expected exhausted retries, got {other:?}"),
        }
    }
}
