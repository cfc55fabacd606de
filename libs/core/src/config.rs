use std::collections::BTreeMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing studio id")]
    MissingStudioId,
    #[error("invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: String },
    #[error("invalid url for {field}")]
    InvalidUrl {
        field: &'static str,
        #[source]
        source: url::ParseError,
    },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
    Auto,
}

impl Theme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
            Theme::Auto => "auto",
        }
    }
}

impl FromStr for Theme {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            "auto" => Ok(Theme::Auto),
            _ => Err(ConfigError::InvalidValue {
                field: "theme",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Position {
    #[default]
    BottomRight,
    BottomLeft,
}

impl FromStr for Position {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bottom-right" => Ok(Position::BottomRight),
            "bottom-left" => Ok(Position::BottomLeft),
            _ => Err(ConfigError::InvalidValue {
                field: "position",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetConfig {
    pub studio_id: String,
    pub studio_name: String,
    pub theme: Theme,
    pub accent_color: String,
    pub locale: String,
    pub position: Position,
    pub greeting: Option<String>,
    pub ai_name: String,
    pub ai_avatar: Option<String>,
    pub sound_enabled: bool,
    pub attachments_enabled: bool,
}

impl Default for WidgetConfig {
    fn default() -> Self {
        Self {
            studio_id: String::new(),
            studio_name: "Studio".to_string(),
            theme: Theme::Light,
            accent_color: "#6366f1".to_string(),
            locale: "fr".to_string(),
            position: Position::BottomRight,
            greeting: None,
            ai_name: "Assistant".to_string(),
            ai_avatar: None,
            sound_enabled: true,
            attachments_enabled: true,
        }
    }
}

/// Config object accepted by the global initializer. Every field is optional.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PartialWidgetConfig {
    pub studio_id: Option<String>,
    pub studio_name: Option<String>,
    pub theme: Option<Theme>,
    pub accent_color: Option<String>,
    pub locale: Option<String>,
    pub position: Option<Position>,
    pub greeting: Option<String>,
    pub ai_name: Option<String>,
    pub ai_avatar: Option<String>,
    pub sound_enabled: Option<bool>,
    pub attachments_enabled: Option<bool>,
}

impl PartialWidgetConfig {
    /// Reads the container element's `data-*` attributes.
    pub fn from_data_attributes(attributes: &BTreeMap<String, String>) -> Result<Self, ConfigError> {
        let get = |name: &str| {
            attributes
                .get(name)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        Ok(Self {
            studio_id: get("data-studio-id"),
            studio_name: get("data-studio-name"),
            theme: get("data-theme").map(|v| v.parse()).transpose()?,
            accent_color: get("data-accent-color"),
            locale: get("data-locale"),
            position: get("data-position").map(|v| v.parse()).transpose()?,
            greeting: get("data-greeting"),
            ai_name: get("data-ai-name"),
            ai_avatar: get("data-ai-avatar"),
            sound_enabled: get("data-sound")
                .map(|v| parse_flag("sound", &v))
                .transpose()?,
            attachments_enabled: get("data-attachments")
                .map(|v| parse_flag("attachments", &v))
                .transpose()?,
        })
    }

    /// Fields set on `other` win.
    pub fn merge(self, other: PartialWidgetConfig) -> Self {
        Self {
            studio_id: other.studio_id.or(self.studio_id),
            studio_name: other.studio_name.or(self.studio_name),
            theme: other.theme.or(self.theme),
            accent_color: other.accent_color.or(self.accent_color),
            locale: other.locale.or(self.locale),
            position: other.position.or(self.position),
            greeting: other.greeting.or(self.greeting),
            ai_name: other.ai_name.or(self.ai_name),
            ai_avatar: other.ai_avatar.or(self.ai_avatar),
            sound_enabled: other.sound_enabled.or(self.sound_enabled),
            attachments_enabled: other.attachments_enabled.or(self.attachments_enabled),
        }
    }

    /// Fills missing fields with defaults. A studio id is mandatory.
    pub fn resolve(self) -> Result<WidgetConfig, ConfigError> {
        let defaults = WidgetConfig::default();
        let studio_id = self
            .studio_id
            .filter(|id| !id.trim().is_empty())
            .ok_or(ConfigError::MissingStudioId)?;
        Ok(WidgetConfig {
            studio_id,
            studio_name: self.studio_name.unwrap_or(defaults.studio_name),
            theme: self.theme.unwrap_or(defaults.theme),
            accent_color: self.accent_color.unwrap_or(defaults.accent_color),
            locale: self.locale.unwrap_or(defaults.locale),
            position: self.position.unwrap_or(defaults.position),
            greeting: self.greeting.or(defaults.greeting),
            ai_name: self.ai_name.unwrap_or(defaults.ai_name),
            ai_avatar: self.ai_avatar.or(defaults.ai_avatar),
            sound_enabled: self.sound_enabled.unwrap_or(defaults.sound_enabled),
            attachments_enabled: self
                .attachments_enabled
                .unwrap_or(defaults.attachments_enabled),
        })
    }
}

fn parse_flag(field: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            field,
            value: value.to_string(),
        }),
    }
}

/// Where the global initializer mounts the widget: a CSS selector and the
/// matched element's attributes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MountTarget {
    pub selector: String,
    pub attributes: BTreeMap<String, String>,
}

impl MountTarget {
    pub fn new(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, name: &str, value: &str) -> Self {
        self.attributes.insert(name.to_string(), value.to_string());
        self
    }

    /// Attribute config overlaid by the initializer's partial config.
    pub fn resolve(&self, overrides: PartialWidgetConfig) -> Result<WidgetConfig, ConfigError> {
        PartialWidgetConfig::from_data_attributes(&self.attributes)?
            .merge(overrides)
            .resolve()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportConfig {
    /// Backend base URL; `None` selects the in-process simulated backend.
    pub api_base: Option<Url>,
    pub request_timeout: Duration,
    pub simulated_latency: bool,
    pub checkout_base: Option<Url>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            api_base: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            simulated_latency: true,
            checkout_base: None,
        }
    }
}

impl TransportConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let parse_url = |field: &'static str, raw: String| {
            Url::parse(raw.trim()).map_err(|source| ConfigError::InvalidUrl { field, source })
        };

        let api_base = non_empty("ROOOM_API_BASE")
            .map(|raw| parse_url("ROOOM_API_BASE", raw))
            .transpose()?;
        let checkout_base = non_empty("ROOOM_CHECKOUT_BASE")
            .map(|raw| parse_url("ROOOM_CHECKOUT_BASE", raw))
            .transpose()?;
        let request_timeout = match non_empty("ROOOM_REQUEST_TIMEOUT_MS") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| ConfigError::InvalidValue {
                    field: "ROOOM_REQUEST_TIMEOUT_MS",
                    value: raw,
                })?,
            None => DEFAULT_REQUEST_TIMEOUT,
        };
        let simulated_latency = non_empty("ROOOM_SIMULATED_LATENCY")
            .map(|v| !matches!(v.to_ascii_lowercase().as_str(), "0" | "false" | "off" | "no"))
            .unwrap_or(true);

        Ok(Self {
            api_base,
            request_timeout,
            simulated_latency,
            checkout_base,
        })
    }
}
