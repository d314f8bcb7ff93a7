//! Contexte de connexion pour les appels SOAP sortants
//!
//! Un [`StreamContext`] regroupe les options de transport par section
//! (`http`, `ssl`, `socket`, …) et des paramètres hors section (callback de
//! notification, …). [`create_stream_context`] fusionne une surcouche
//! d'options `http` dans un contexte existant sans jamais le modifier : les
//! lignes d'en-tête de la surcouche sont ajoutées après celles du contexte
//! de base, toutes les autres clés sont remplacées.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Section receiving the overlay
pub const HTTP_SECTION: &str = "http";

/// Option key holding the request header lines
pub const HEADER_KEY: &str = "header";

/// Parameter key of the transport notification callback
pub const NOTIFICATION_PARAM: &str = "notification";

const CRLF: &str = "\r\n";

/// Valeur d'une option de transport
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Lines(Vec<String>),
}

impl OptionValue {
    /// Normalise la valeur en une seule chaîne, les listes étant jointes par CRLF
    pub fn joined(&self) -> String {
        match self {
            OptionValue::Lines(lines) => lines.join(CRLF),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::Bool(b) => write!(f, "{}", b),
            OptionValue::Int(i) => write!(f, "{}", i),
            OptionValue::Float(x) => write!(f, "{}", x),
            OptionValue::Text(s) => f.write_str(s),
            OptionValue::Lines(lines) => f.write_str(&lines.join(CRLF)),
        }
    }
}

impl From<&str> for OptionValue {
    fn from(value: &str) -> Self {
        OptionValue::Text(value.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(value: String) -> Self {
        OptionValue::Text(value)
    }
}

impl From<bool> for OptionValue {
    fn from(value: bool) -> Self {
        OptionValue::Bool(value)
    }
}

impl From<i64> for OptionValue {
    fn from(value: i64) -> Self {
        OptionValue::Int(value)
    }
}

impl From<f64> for OptionValue {
    fn from(value: f64) -> Self {
        OptionValue::Float(value)
    }
}

impl From<Vec<String>> for OptionValue {
    fn from(value: Vec<String>) -> Self {
        OptionValue::Lines(value)
    }
}

impl From<Vec<&str>> for OptionValue {
    fn from(value: Vec<&str>) -> Self {
        OptionValue::Lines(value.into_iter().map(str::to_string).collect())
    }
}

/// Options of one transport section, e.g. `http`
pub type SectionOptions = BTreeMap<String, OptionValue>;

/// Overlay merged into the `http` section
pub type HttpOptions = SectionOptions;

/// All sections of a context, keyed by section name
pub type ConnectionOptions = BTreeMap<String, SectionOptions>;

/// Callback invoked by the transport with progress messages
pub type NotificationCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Paramètre hors section, transmis tel quel d'un contexte à l'autre
#[derive(Clone)]
pub enum ContextParam {
    Notification(NotificationCallback),
    Value(OptionValue),
}

impl fmt::Debug for ContextParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextParam::Notification(_) => f.write_str("Notification(<callback>)"),
            ContextParam::Value(v) => f.debug_tuple("Value").field(v).finish(),
        }
    }
}

/// Contexte de connexion immuable
#[derive(Debug, Clone, Default)]
pub struct StreamContext {
    options: ConnectionOptions,
    params: BTreeMap<String, ContextParam>,
}

impl StreamContext {
    /// Crée un contexte à partir d'options déjà organisées par section
    pub fn new(options: ConnectionOptions) -> Self {
        Self {
            options,
            params: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, name: &str, value: OptionValue) -> Self {
        self.params
            .insert(name.to_string(), ContextParam::Value(value));
        self
    }

    pub fn with_notification(mut self, callback: NotificationCallback) -> Self {
        self.params.insert(
            NOTIFICATION_PARAM.to_string(),
            ContextParam::Notification(callback),
        );
        self
    }

    pub fn options(&self) -> &ConnectionOptions {
        &self.options
    }

    pub fn section(&self, name: &str) -> Option<&SectionOptions> {
        self.options.get(name)
    }

    pub fn option(&self, section: &str, key: &str) -> Option<&OptionValue> {
        self.section(section).and_then(|s| s.get(key))
    }

    pub fn params(&self) -> &BTreeMap<String, ContextParam> {
        &self.params
    }

    pub fn param(&self, name: &str) -> Option<&ContextParam> {
        self.params.get(name)
    }

    pub fn notification(&self) -> Option<&NotificationCallback> {
        match self.params.get(NOTIFICATION_PARAM) {
            Some(ContextParam::Notification(cb)) => Some(cb),
            _ => None,
        }
    }

    /// Lignes d'en-tête de la section `http`, dans l'ordre
    pub fn header_lines(&self) -> Vec<String> {
        match self.option(HTTP_SECTION, HEADER_KEY) {
            Some(OptionValue::Lines(lines)) => lines.clone(),
            Some(value) => value
                .joined()
                .split(CRLF)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect(),
            None => Vec::new(),
        }
    }
}

/// Builds a new context by merging `overlay` into the `http` section of `base`.
///
/// * without `base`, the result only holds the overlay under `http`;
/// * the `header` entry is appended after the base header (`base + CRLF +
///   overlay`), lists being joined with CRLF first;
/// * any other `http` key of the overlay replaces the base value;
/// * other sections and all parameters of `base` are carried over unchanged.
///
/// `base` is never modified and can be reused for any number of builds.
pub fn create_stream_context(overlay: HttpOptions, base: Option<&StreamContext>) -> StreamContext {
    let (mut options, params) = match base {
        Some(ctx) => (ctx.options.clone(), ctx.params.clone()),
        None => (ConnectionOptions::new(), BTreeMap::new()),
    };

    let http = options.entry(HTTP_SECTION.to_string()).or_default();

    for (key, value) in overlay {
        if key == HEADER_KEY {
            if let Some(existing) = http.get(HEADER_KEY) {
                let merged = format!("{}{}{}", existing.joined(), CRLF, value.joined());
                http.insert(key, OptionValue::Text(merged));
                continue;
            }
        }
        http.insert(key, value);
    }

    debug!(
        sections = options.len(),
        params = params.len(),
        "Built stream context"
    );

    StreamContext { options, params }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn overlay(entries: Vec<(&str, OptionValue)>) -> HttpOptions {
        entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    }

    #[test]
    fn test_without_base() {
        let ctx = create_stream_context(overlay(vec![(HEADER_KEY, "Accept: */*".into())]), None);

        assert_eq!(ctx.options().len(), 1);
        assert_eq!(
            ctx.option(HTTP_SECTION, HEADER_KEY),
            Some(&OptionValue::Text("Accept: */*".to_string()))
        );
        assert!(ctx.params().is_empty());
    }

    #[test]
    fn test_header_without_base_header_is_kept_as_given() {
        let ctx = create_stream_context(
            overlay(vec![(HEADER_KEY, vec!["A: 1", "B: 2"].into())]),
            None,
        );

        assert_eq!(
            ctx.option(HTTP_SECTION, HEADER_KEY),
            Some(&OptionValue::Lines(vec!["A: 1".into(), "B: 2".into()]))
        );
        assert_eq!(ctx.header_lines(), vec!["A: 1", "B: 2"]);
    }

    #[test]
    fn test_empty_overlay_still_has_http_section() {
        let ctx = create_stream_context(HttpOptions::new(), None);
        assert!(ctx.section(HTTP_SECTION).unwrap().is_empty());
        assert!(ctx.header_lines().is_empty());
    }

    #[test]
    fn test_option_value_display() {
        assert_eq!(OptionValue::Bool(true).to_string(), "true");
        assert_eq!(OptionValue::Int(-3).to_string(), "-3");
        assert_eq!(OptionValue::Float(1.5).to_string(), "1.5");
        assert_eq!(
            OptionValue::from(vec!["a", "b"]).joined(),
            "a\r\nb".to_string()
        );
    }

    #[test]
    fn test_option_value_from_yaml() {
        let options: HttpOptions = serde_yaml::from_str(
            "protocol_version: \"1.1\"\nverify_peer: true\ntimeout: 30\nheader:\n  - \"A: 1\"\n",
        )
        .unwrap();

        assert_eq!(options["protocol_version"], OptionValue::Text("1.1".into()));
        assert_eq!(options["verify_peer"], OptionValue::Bool(true));
        assert_eq!(options["timeout"], OptionValue::Int(30));
        assert_eq!(options["header"], OptionValue::Lines(vec!["A: 1".into()]));
    }
}
