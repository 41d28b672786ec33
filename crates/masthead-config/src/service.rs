//! The configuration save pipeline.
//!
//! `ConfigSaver` coordinates the collaborators behind one save request:
//! connectivity check, conditional HTTPS probe, rule and filter persistence,
//! derived-setting rules, cache invalidation, and the artifact write. The
//! pipeline is deliberately not transactional across stores: a hard failure
//! leaves the steps already committed in place.

use std::sync::Arc;

use masthead_access::{CORE_ADMIN, RuleSet};
use masthead_data::{
    AssetStore, ConnectivityProbe, DataError, DbOptions, ExtensionStore, GroupStore, PURGE_ALL,
    ROOT_ASSET, SessionStore,
};
use masthead_fsops::{ArtifactStore, CacheScope, CacheStore, FtpSettings};
use serde_json::Value;
use tracing::{info, warn};

use crate::error::{ConfigError, ConfigResult, SaveWarning};
use crate::model::{SavePatch, SiteConfig, TextFilterSet, amp_escape, merge_document};
use crate::probe::{ProbeOutcome, SslProbe};

/// Extension element owning the configuration component's parameters.
pub const COMPONENT: &str = "com_settings";
/// Element consulted for filter policies when the component has none.
const CONTENT_COMPONENT: &str = "com_pages";
const DATABASE_HANDLER: &str = "database";
const FILE_CACHE_HANDLER: &str = "file";

/// Collaborators wired into the save pipeline.
#[derive(Clone)]
pub struct SaverPorts {
    /// Configuration artifact reader/writer.
    pub artifact: Arc<dyn ArtifactStore>,
    /// Component cache store.
    pub cache: Arc<dyn CacheStore>,
    /// Permission tree store.
    pub assets: Arc<dyn AssetStore>,
    /// Extension parameter store.
    pub extensions: Arc<dyn ExtensionStore>,
    /// Session store.
    pub sessions: Arc<dyn SessionStore>,
    /// Group membership store.
    pub groups: Arc<dyn GroupStore>,
    /// Database connectivity probe.
    pub db_probe: Arc<dyn ConnectivityProbe>,
    /// HTTPS availability probe.
    pub ssl_probe: Arc<dyn SslProbe>,
}

/// Outcome of a successful save.
#[derive(Debug, Clone)]
pub struct SaveReport {
    /// The configuration as persisted, after merging and derived rules.
    pub config: SiteConfig,
    /// Degradations applied during the save.
    pub warnings: Vec<SaveWarning>,
}

/// Service persisting submitted configuration forms.
#[derive(Clone)]
pub struct ConfigSaver {
    ports: SaverPorts,
    site_host: String,
}

impl ConfigSaver {
    /// Create a saver for the site reachable at `site_host`.
    #[must_use]
    pub fn new(ports: SaverPorts, site_host: impl Into<String>) -> Self {
        Self {
            ports,
            site_host: site_host.into(),
        }
    }

    /// Validate and persist `candidate`, acting on behalf of `actor`.
    ///
    /// # Errors
    ///
    /// Hard failures abort the remaining steps and are returned as
    /// [`ConfigError`]; previously committed steps stay committed. Soft
    /// degradations are collected on the returned [`SaveReport`].
    pub async fn save(&self, candidate: SavePatch, actor: i64) -> ConfigResult<SaveReport> {
        let current_doc = self
            .ports
            .artifact
            .load()
            .map_err(|source| ConfigError::Artifact { source })?;
        let current = decode_config("decode current configuration", current_doc.clone())?;
        let merged_doc = merge_document(&current_doc, &candidate.settings);
        let mut merged = decode_config("decode merged configuration", merged_doc)?;

        self.check_connectivity(&merged, &current).await?;

        let mut warnings = Vec::new();
        self.probe_ssl(&mut merged, &current, &mut warnings).await;

        if let Some(rules) = &candidate.rules {
            self.persist_rules(rules, actor).await?;
        }
        if let Some(filters) = &candidate.filters {
            self.persist_filters(filters).await?;
        }

        self.apply_derived(&mut merged, &current, &mut warnings)
            .await?;

        let ftp = ftp_settings(&merged);
        if let Err(err) = self.ports.cache.purge_component(COMPONENT) {
            warn!(error = %err, component = COMPONENT, "component cache purge failed");
        }

        let document = serde_json::to_value(&merged)
            .map_err(|source| ConfigError::Document {
                operation: "encode merged configuration",
                source,
            })?;
        self.ports
            .artifact
            .write(&document, &ftp)
            .map_err(|source| ConfigError::Write { source })?;

        info!(warnings = warnings.len(), "configuration saved");
        Ok(SaveReport {
            config: merged,
            warnings,
        })
    }

    /// Strip the installation `root_user` field from the artifact.
    ///
    /// Idempotent: removing an absent field rewrites an identical document.
    ///
    /// # Errors
    ///
    /// Returns an error when the artifact cannot be read or rewritten.
    pub async fn remove_root_credential(&self) -> ConfigResult<()> {
        let document = self
            .ports
            .artifact
            .load()
            .map_err(|source| ConfigError::Artifact { source })?;
        let config = decode_config("decode current configuration", document.clone())?;

        let mut object = document.as_object().cloned().unwrap_or_default();
        object.remove("root_user");
        self.ports
            .artifact
            .write(&Value::Object(object), &ftp_settings(&config))
            .map_err(|source| ConfigError::Write { source })?;
        info!("root credential removed from configuration artifact");
        Ok(())
    }

    /// Current text filter policies.
    ///
    /// Falls back to the content component's parameters when the
    /// configuration component carries no filter document, and to an empty
    /// set when neither does.
    ///
    /// # Errors
    ///
    /// Returns an error when a stored filter document is malformed or the
    /// store fails.
    pub async fn text_filters(&self) -> ConfigResult<TextFilterSet> {
        for element in [COMPONENT, CONTENT_COMPONENT] {
            let params = self
                .ports
                .extensions
                .fetch_params(element)
                .await
                .map_err(data)?;
            if let Some(filters) = params.as_ref().and_then(|params| params.get("filters")) {
                return serde_json::from_value(filters.clone()).map_err(|source| {
                    ConfigError::Document {
                        operation: "decode filter policies",
                        source,
                    }
                });
            }
        }
        Ok(TextFilterSet::new())
    }

    async fn check_connectivity(
        &self,
        merged: &SiteConfig,
        current: &SiteConfig,
    ) -> ConfigResult<()> {
        // The submitted form never carries the password back; probe with the
        // stored one.
        let options = DbOptions {
            host: merged.host.clone(),
            port: merged.dbport,
            database: merged.db.clone(),
            username: merged.user.clone(),
            password: current.password.clone(),
        };
        self.ports
            .db_probe
            .probe(&options)
            .await
            .map_err(|source| ConfigError::Connectivity { source })?;
        info!(host = %merged.host, database = %merged.db, "database connectivity verified");
        Ok(())
    }

    async fn probe_ssl(
        &self,
        merged: &mut SiteConfig,
        current: &SiteConfig,
        warnings: &mut Vec<SaveWarning>,
    ) {
        if merged.force_ssl == 0 || merged.force_ssl == current.force_ssl {
            return;
        }
        match self.ports.ssl_probe.check(&self.site_host).await {
            ProbeOutcome::Available => {
                info!(host = %self.site_host, "https probe passed");
            }
            ProbeOutcome::Unavailable { detail } => {
                warn!(host = %self.site_host, detail = %detail, "https unavailable, forcing force_ssl off");
                merged.force_ssl = 0;
                warnings.push(SaveWarning::SslUnavailable { detail });
            }
        }
    }

    async fn persist_rules(&self, rules: &Value, actor: i64) -> ConfigResult<()> {
        let proposed = RuleSet::from_value(rules).map_err(|source| ConfigError::Rules { source })?;
        let groups = self
            .ports
            .groups
            .groups_for_user(actor)
            .await
            .map_err(data)?;
        if !proposed.allows(CORE_ADMIN, &groups) {
            return Err(ConfigError::SuperAdminRevoked { groups });
        }

        let root = self
            .ports
            .assets
            .fetch_by_name(ROOT_ASSET)
            .await
            .map_err(data)?;
        if root.is_none() {
            return Err(ConfigError::AssetNotFound {
                name: ROOT_ASSET.to_string(),
            });
        }
        self.ports
            .assets
            .save_rules(ROOT_ASSET, &proposed.to_value())
            .await
            .map_err(data)?;
        info!("root permission rules updated");
        Ok(())
    }

    async fn persist_filters(&self, filters: &Value) -> ConfigResult<()> {
        let typed: TextFilterSet =
            serde_json::from_value(filters.clone()).map_err(|source| ConfigError::Document {
                operation: "decode filter policies",
                source,
            })?;
        let params = self
            .ports
            .extensions
            .fetch_params(COMPONENT)
            .await
            .map_err(data)?
            .ok_or_else(|| ConfigError::ExtensionNotFound {
                element: COMPONENT.to_string(),
            })?;

        let mut object = params.as_object().cloned().unwrap_or_default();
        let encoded = serde_json::to_value(&typed).map_err(|source| ConfigError::Document {
            operation: "encode filter policies",
            source,
        })?;
        object.insert("filters".to_string(), encoded);
        self.ports
            .extensions
            .save_params(COMPONENT, &Value::Object(object))
            .await
            .map_err(data)?;
        info!("text filter policies updated");
        Ok(())
    }

    async fn apply_derived(
        &self,
        merged: &mut SiteConfig,
        current: &SiteConfig,
        warnings: &mut Vec<SaveWarning>,
    ) -> ConfigResult<()> {
        merged.offline_message = amp_escape(&merged.offline_message);

        if merged.session_handler == DATABASE_HANDLER
            && current.session_handler != DATABASE_HANDLER
        {
            self.ports.sessions.purge(PURGE_ALL).await.map_err(data)?;
            info!("session store purged for database-backed handler");
        }

        if merged.cache_handler.is_empty() {
            merged.caching = 0;
        }
        if merged.caching > 0
            && merged.cache_handler == FILE_CACHE_HANDLER
            && !self.ports.cache.dir_writable(CacheScope::Site)
        {
            warn!("cache directory not writable, forcing caching off");
            merged.caching = 0;
            warnings.push(SaveWarning::CacheDirUnwritable);
        }
        if current.caching > 0 && merged.caching == 0 {
            if let Err(err) = self.ports.cache.flush_all() {
                warn!(error = %err, "cache flush failed");
            }
        }
        Ok(())
    }
}

fn decode_config(operation: &'static str, document: Value) -> ConfigResult<SiteConfig> {
    serde_json::from_value(document).map_err(|source| ConfigError::Document { operation, source })
}

fn ftp_settings(config: &SiteConfig) -> FtpSettings {
    FtpSettings {
        enabled: config.ftp_enable,
        host: config.ftp_host.clone(),
        port: config.ftp_port,
        username: config.ftp_user.clone(),
        password: config.ftp_pass.clone(),
        root: config.ftp_root.clone(),
    }
}

const fn data(source: DataError) -> ConfigError {
    ConfigError::Data { source }
}
