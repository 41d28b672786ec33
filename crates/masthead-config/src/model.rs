//! Typed configuration document, save patches, and text filter policies.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Fully defined site configuration.
///
/// Deserialized from the merged artifact document; every field carries a
/// default so documents written by earlier releases keep loading. Keys the
/// model does not know about are preserved through `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Public site name.
    #[serde(default)]
    pub sitename: String,
    /// Whether the public site is offline.
    #[serde(default)]
    pub offline: bool,
    /// Message shown while offline.
    #[serde(default)]
    pub offline_message: String,
    /// Database driver.
    #[serde(default = "default_dbtype")]
    pub dbtype: String,
    /// Database host.
    #[serde(default = "default_db_host")]
    pub host: String,
    /// Database port.
    #[serde(default = "default_db_port")]
    pub dbport: u16,
    /// Database account name.
    #[serde(default)]
    pub user: String,
    /// Database account password.
    #[serde(default)]
    pub password: String,
    /// Database name.
    #[serde(default)]
    pub db: String,
    /// Table name prefix.
    #[serde(default = "default_dbprefix")]
    pub dbprefix: String,
    /// Session storage backend (`none`, `filesystem`, `database`).
    #[serde(default = "default_session_handler")]
    pub session_handler: String,
    /// Session lifetime in minutes.
    #[serde(default = "default_session_lifetime")]
    pub session_lifetime: i64,
    /// Caching level, `0` disables.
    #[serde(default)]
    pub caching: i64,
    /// Cache backend, empty when none is selected.
    #[serde(default)]
    pub cache_handler: String,
    /// Cache lifetime in minutes.
    #[serde(default = "default_cachetime")]
    pub cachetime: i64,
    /// Cache directory for the `file` backend.
    #[serde(default)]
    pub cache_path: String,
    /// Forced-TLS level, `0` disables.
    #[serde(default)]
    pub force_ssl: i64,
    /// Whether site files are managed through the FTP layer.
    #[serde(default)]
    pub ftp_enable: bool,
    /// FTP host.
    #[serde(default)]
    pub ftp_host: String,
    /// FTP port.
    #[serde(default = "default_ftp_port")]
    pub ftp_port: u16,
    /// FTP account name.
    #[serde(default)]
    pub ftp_user: String,
    /// FTP account password.
    #[serde(default)]
    pub ftp_pass: String,
    /// Site root within the FTP account.
    #[serde(default)]
    pub ftp_root: String,
    /// Mail transport (`mail`, `sendmail`, `smtp`).
    #[serde(default = "default_mailer")]
    pub mailer: String,
    /// Sender address.
    #[serde(default)]
    pub mailfrom: String,
    /// Sender display name.
    #[serde(default)]
    pub fromname: String,
    /// SMTP host.
    #[serde(default)]
    pub smtphost: String,
    /// SMTP port.
    #[serde(default = "default_smtp_port")]
    pub smtpport: u16,
    /// Installation-time administrator identifier, removed post-install.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_user: Option<String>,
    /// Settings the typed model does not interpret.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        serde_json::from_value(Value::Object(Map::new())).unwrap_or_else(|_| unreachable!())
    }
}

fn default_dbtype() -> String {
    "pgsql".to_string()
}

fn default_db_host() -> String {
    "localhost".to_string()
}

const fn default_db_port() -> u16 {
    5432
}

fn default_dbprefix() -> String {
    "mh_".to_string()
}

fn default_session_handler() -> String {
    "none".to_string()
}

const fn default_session_lifetime() -> i64 {
    15
}

const fn default_cachetime() -> i64 {
    15
}

const fn default_ftp_port() -> u16 {
    21
}

fn default_mailer() -> String {
    "mail".to_string()
}

const fn default_smtp_port() -> u16 {
    25
}

/// Form submission accepted by the save pipeline.
///
/// `rules` and `filters` are optional sub-documents; everything else is a
/// partial settings object merged over the current configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SavePatch {
    /// Proposed root rule document.
    #[serde(default)]
    pub rules: Option<Value>,
    /// Proposed text filter mapping.
    #[serde(default)]
    pub filters: Option<Value>,
    /// Partial settings, merged over the current document.
    #[serde(flatten)]
    pub settings: Map<String, Value>,
}

/// HTML filtering mode applied to a user group's submitted content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterMode {
    /// Strip the listed tags and attributes.
    BlockList,
    /// Keep only the listed tags and attributes.
    AllowList,
    /// Strip all HTML.
    NoHtml,
    /// Pass content through unchanged.
    Unfiltered,
}

/// Filter policy for one user group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterPolicy {
    /// Filtering mode.
    pub filter_type: FilterMode,
    /// Comma-separated tag list for list-based modes.
    #[serde(default)]
    pub filter_tags: String,
    /// Comma-separated attribute list for list-based modes.
    #[serde(default)]
    pub filter_attributes: String,
}

/// Text filter policies keyed by user-group id.
pub type TextFilterSet = BTreeMap<String, FilterPolicy>;

/// Shallow-merge `patch` over `current`, returning the combined document.
#[must_use]
pub fn merge_document(current: &Value, patch: &Map<String, Value>) -> Value {
    let mut merged = current.as_object().cloned().unwrap_or_default();
    for (key, value) in patch {
        merged.insert(key.clone(), value.clone());
    }
    Value::Object(merged)
}

/// An ampersand, together with the named or numeric entity body following it
/// when it already starts one.
static AMP_OR_ENTITY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"&(#\d+;|#[xX][0-9a-fA-F]+;|[A-Za-z0-9]+;)?").expect("entity pattern compiles")
});

/// Escape bare ampersands as `&amp;`, leaving existing entities intact.
#[must_use]
pub fn amp_escape(text: &str) -> String {
    AMP_OR_ENTITY
        .replace_all(text, |caps: &regex::Captures<'_>| {
            if caps.get(1).is_some() {
                caps[0].to_string()
            } else {
                "&amp;".to_string()
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn config_loads_from_empty_document_with_defaults() {
        let config = SiteConfig::default();
        assert_eq!(config.dbtype, "pgsql");
        assert_eq!(config.dbport, 5432);
        assert_eq!(config.session_handler, "none");
        assert_eq!(config.caching, 0);
        assert!(config.root_user.is_none());
        assert!(config.extra.is_empty());
    }

    #[test]
    fn unknown_keys_survive_a_round_trip() {
        let document = json!({"sitename": "Masthead", "editor": "plain", "list_limit": 20});
        let config: SiteConfig = serde_json::from_value(document).expect("valid document");
        assert_eq!(config.extra.get("editor"), Some(&json!("plain")));

        let reserialized = serde_json::to_value(&config).expect("serializes");
        assert_eq!(reserialized.get("editor"), Some(&json!("plain")));
        assert_eq!(reserialized.get("list_limit"), Some(&json!(20)));
        assert_eq!(reserialized.get("root_user"), None);
    }

    #[test]
    fn patch_splits_rules_and_filters_from_settings() {
        let patch: SavePatch = serde_json::from_value(json!({
            "sitename": "New name",
            "rules": {"core.admin": {"8": true}},
            "filters": {"1": {"filter_type": "no_html"}},
        }))
        .expect("valid patch");
        assert!(patch.rules.is_some());
        assert!(patch.filters.is_some());
        assert_eq!(patch.settings.get("sitename"), Some(&json!("New name")));
        assert!(!patch.settings.contains_key("rules"));
    }

    #[test]
    fn merge_overlays_patch_keys_only() {
        let current = json!({"sitename": "Old", "caching": 1});
        let mut patch = Map::new();
        patch.insert("sitename".to_string(), json!("New"));
        let merged = merge_document(&current, &patch);
        assert_eq!(merged, json!({"sitename": "New", "caching": 1}));
    }

    #[test]
    fn filter_policies_decode_group_map() {
        let set: TextFilterSet = serde_json::from_value(json!({
            "1": {"filter_type": "block_list", "filter_tags": "script,iframe"},
            "8": {"filter_type": "unfiltered"},
        }))
        .expect("valid filters");
        assert_eq!(set["1"].filter_type, FilterMode::BlockList);
        assert_eq!(set["1"].filter_tags, "script,iframe");
        assert_eq!(set["8"].filter_type, FilterMode::Unfiltered);
    }

    #[test]
    fn amp_escape_is_entity_aware() {
        assert_eq!(amp_escape("fish & chips"), "fish &amp; chips");
        assert_eq!(amp_escape("a &amp; b"), "a &amp; b");
        assert_eq!(amp_escape("&#169; 2026"), "&#169; 2026");
        assert_eq!(amp_escape("&#x1F600;"), "&#x1F600;");
        assert_eq!(amp_escape("&& &;"), "&amp;&amp; &amp;;");
        assert_eq!(amp_escape("tom & jerry &copy;"), "tom &amp; jerry &copy;");
        assert_eq!(amp_escape("no ampersand"), "no ampersand");
        assert_eq!(amp_escape("trailing &"), "trailing &amp;");
        // Malformed entities are not entities.
        assert_eq!(amp_escape("&#xZZ; &#;"), "&amp;#xZZ; &amp;#;");
    }
}
