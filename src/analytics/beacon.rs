//! Client beacon payload
//!
//! The beacon is a JSON object posted by the tracking script:
//!
//! ```json
//! {
//!   "deviceProperties": {"browserName": "Chrome", "browserMajorVersion": 120,
//!                        "os": "Windows", "deviceType": "desktop"},
//!   "timeOnPage": 42,
//!   "totalTimeOnSite": 310,
//!   "pageState": "exit"
//! }
//! ```
//!
//! Parsing never fails. Each field is read on its own, so a field with an
//! unexpected type is dropped without discarding the rest of the payload.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceProperties {
    #[serde(default, deserialize_with = "lenient_string")]
    pub browser_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub browser_major_version: Option<String>,
    #[serde(default, alias = "osName", deserialize_with = "lenient_string")]
    pub os: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub device_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PageState {
    Enter,
    Exit,
    Other(String),
}

impl From<String> for PageState {
    fn from(value: String) -> Self {
        match value.as_str() {
            "enter" => PageState::Enter,
            "exit" => PageState::Exit,
            _ => PageState::Other(value),
        }
    }
}

impl From<PageState> for String {
    fn from(state: PageState) -> Self {
        match state {
            PageState::Enter => "enter".to_string(),
            PageState::Exit => "exit".to_string(),
            PageState::Other(s) => s,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Beacon {
    #[serde(default, deserialize_with = "lenient_device")]
    pub device_properties: Option<DeviceProperties>,
    /// Seconds spent on the current page; fractional values are truncated
    #[serde(default, deserialize_with = "lenient_seconds")]
    pub time_on_page: Option<u64>,
    /// Seconds spent on the site during the current session
    #[serde(default, deserialize_with = "lenient_seconds")]
    pub total_time_on_site: Option<u64>,
    #[serde(default, deserialize_with = "lenient_page_state")]
    pub page_state: Option<PageState>,
}

impl Beacon {
    /// Decode a beacon, yielding an empty beacon when the input is not a JSON object
    pub fn parse(raw: &str) -> Self {
        if raw.trim().is_empty() {
            return Self::default();
        }

        let value = match serde_json::from_str::<Value>(raw) {
            Ok(value @ Value::Object(_)) => value,
            Ok(_) => {
                debug!("Ignoring beacon payload that is not a JSON object");
                return Self::default();
            }
            Err(e) => {
                debug!(error = %e, "Ignoring malformed beacon payload");
                return Self::default();
            }
        };

        serde_json::from_value(value).unwrap_or_default()
    }

    fn device(&self) -> Option<&DeviceProperties> {
        self.device_properties.as_ref()
    }

    pub fn browser_name(&self) -> Option<&str> {
        self.device()?.browser_name.as_deref()
    }

    pub fn browser_major_version(&self) -> Option<&str> {
        self.device()?.browser_major_version.as_deref()
    }

    pub fn os_name(&self) -> Option<&str> {
        self.device()?.os.as_deref()
    }

    pub fn device_type(&self) -> Option<&str> {
        self.device()?.device_type.as_deref()
    }

    pub fn is_page_enter(&self) -> bool {
        matches!(self.page_state, Some(PageState::Enter))
    }

    pub fn is_page_exit(&self) -> bool {
        matches!(self.page_state, Some(PageState::Exit))
    }
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) if !s.is_empty() => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn lenient_seconds<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let seconds = match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().and_then(whole_seconds)),
        Value::String(s) => s.trim().parse::<f64>().ok().and_then(whole_seconds),
        _ => None,
    };
    Ok(seconds)
}

fn whole_seconds(value: f64) -> Option<u64> {
    (value.is_finite() && value >= 0.0).then(|| value.trunc() as u64)
}

fn lenient_device<'de, D>(deserializer: D) -> Result<Option<DeviceProperties>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        value @ Value::Object(_) => serde_json::from_value(value).ok(),
        _ => None,
    })
}

fn lenient_page_state<'de, D>(deserializer: D) -> Result<Option<PageState>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(PageState::from(s)),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_beacon() {
        let beacon = Beacon::parse(
            r#"{"deviceProperties":{"browserName":"Firefox","browserMajorVersion":"121",
                "os":"Linux","deviceType":"desktop"},
                "timeOnPage":12,"totalTimeOnSite":95,"pageState":"enter"}"#,
        );

        assert_eq!(beacon.browser_name(), Some("Firefox"));
        assert_eq!(beacon.browser_major_version(), Some("121"));
        assert_eq!(beacon.os_name(), Some("Linux"));
        assert_eq!(beacon.device_type(), Some("desktop"));
        assert_eq!(beacon.time_on_page, Some(12));
        assert_eq!(beacon.total_time_on_site, Some(95));
        assert!(beacon.is_page_enter());
        assert!(!beacon.is_page_exit());
    }

    #[test]
    fn test_parse_partial_beacon() {
        let beacon = Beacon::parse(
            r#"{"deviceProperties":{"browserName":"Chrome"},"timeOnPage":42,"pageState":"exit"}"#,
        );

        assert_eq!(beacon.browser_name(), Some("Chrome"));
        assert_eq!(beacon.os_name(), None);
        assert_eq!(beacon.time_on_page, Some(42));
        assert!(beacon.is_page_exit());
        assert!(!beacon.is_page_enter());
    }

    #[test]
    fn test_malformed_and_empty_beacons_are_empty() {
        for raw in ["", "   ", "{not json", "[1,2,3]", "\"exit\"", "null"] {
            assert_eq!(Beacon::parse(raw), Beacon::default(), "input: {raw:?}");
        }
    }

    #[test]
    fn test_wrong_field_type_only_drops_that_field() {
        let beacon = Beacon::parse(
            r#"{"deviceProperties":"oops","timeOnPage":{"a":1},"pageState":"enter"}"#,
        );

        assert!(beacon.device_properties.is_none());
        assert!(beacon.time_on_page.is_none());
        assert!(beacon.is_page_enter());
    }

    #[test]
    fn test_numeric_fields_are_coerced() {
        let beacon = Beacon::parse(
            r#"{"deviceProperties":{"browserMajorVersion":17,"osName":"iOS"},
                "timeOnPage":"7.9","totalTimeOnSite":-3}"#,
        );

        assert_eq!(beacon.browser_major_version(), Some("17"));
        assert_eq!(beacon.os_name(), Some("iOS"));
        assert_eq!(beacon.time_on_page, Some(7));
        assert_eq!(beacon.total_time_on_site, None);
    }

    #[test]
    fn test_unknown_page_state() {
        let beacon = Beacon::parse(r#"{"pageState":"hidden"}"#);
        assert_eq!(beacon.page_state, Some(PageState::Other("hidden".to_string())));
        assert!(!beacon.is_page_enter());
        assert!(!beacon.is_page_exit());
    }
}
