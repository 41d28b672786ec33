//! Permission toggle service: applies a single grant edit to an asset's rule
//! document and reports the recomputed effective state.

use std::sync::Arc;

use masthead_data::{AssetRecord, AssetStore, ROOT_ASSET};
use tracing::{debug, info};

use crate::error::{AccessError, Result};
use crate::rules::{CORE_ADMIN, Resolution, RuleSet, RuleState, resolve};

/// Edit applied to one action/group pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TogglePatch {
    /// Set an explicit allow (`true`) or deny (`false`).
    Set(bool),
    /// Remove the grant, reverting the pair to inheritance.
    ClearRule,
    /// Remove the entire action block.
    ClearAction,
}

/// Presentation state for one action/group pair after an edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectiveRule {
    /// The group is a super administrator; access is unconditional.
    AllowedAdmin,
    /// Allowed, either locally or by inheritance.
    Allowed,
    /// Explicitly denied on the asset itself.
    Denied,
    /// Locally allowed but overridden by an ancestor's explicit deny.
    Conflict,
    /// No local grant and an ancestor's explicit deny locks the pair.
    Locked,
    /// No grant anywhere in the chain; access defaults to denied.
    NotAllowed,
}

/// Service that edits per-asset rule documents.
#[derive(Clone)]
pub struct PermissionService {
    assets: Arc<dyn AssetStore>,
}

impl PermissionService {
    /// Create a service over the given asset store.
    #[must_use]
    pub fn new(assets: Arc<dyn AssetStore>) -> Self {
        Self { assets }
    }

    /// Apply `patch` to the `(action, group)` grant on `component` and return
    /// the recomputed effective state.
    ///
    /// A component without an asset record gets one created, seeded with the
    /// outcome of the patch (a bare clear produces an empty document).
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::SelfDemotion`] when `group` currently holds
    /// super administrator status and the edit targets its own admin grant,
    /// [`AccessError::RuleDocument`] when a stored document is malformed, and
    /// [`AccessError::Data`] when the store fails.
    pub async fn toggle(
        &self,
        component: &str,
        action: &str,
        group: i64,
        patch: TogglePatch,
    ) -> Result<EffectiveRule> {
        let root_chain = decode_chain(&self.assets.fetch_chain(ROOT_ASSET).await?)?;
        let is_admin = resolve(&root_chain, CORE_ADMIN, group) == Resolution::Allow;
        if is_admin && action == CORE_ADMIN {
            return Err(AccessError::SelfDemotion { group });
        }

        let mut rules = match self.assets.fetch_by_name(component).await? {
            Some(record) => RuleSet::from_value(&record.rules)?,
            None => {
                debug!(component, "no asset record, seeding a fresh rule document");
                RuleSet::new()
            }
        };

        match patch {
            TogglePatch::Set(allowed) => rules.set(action, group, allowed),
            TogglePatch::ClearRule => rules.clear(action, group),
            TogglePatch::ClearAction => rules.clear_action(action),
        }

        self.assets.save_rules(component, &rules.to_value()).await?;
        info!(component, action, group, "persisted permission edit");

        let chain = decode_chain(&self.assets.fetch_chain(component).await?)?;
        Ok(effective(&chain, action, group, is_admin))
    }
}

fn decode_chain(records: &[AssetRecord]) -> Result<Vec<RuleSet>> {
    records
        .iter()
        .map(|record| RuleSet::from_value(&record.rules))
        .collect()
}

fn effective(chain: &[RuleSet], action: &str, group: i64, is_admin: bool) -> EffectiveRule {
    if is_admin {
        return EffectiveRule::AllowedAdmin;
    }
    let Some((leaf, ancestors)) = chain.split_last() else {
        return EffectiveRule::NotAllowed;
    };
    match leaf.state(action, group) {
        RuleState::Allow => match resolve(ancestors, action, group) {
            Resolution::Deny => EffectiveRule::Conflict,
            Resolution::Allow | Resolution::Default => EffectiveRule::Allowed,
        },
        RuleState::Deny => EffectiveRule::Denied,
        RuleState::Inherit => match resolve(ancestors, action, group) {
            Resolution::Deny => EffectiveRule::Locked,
            Resolution::Allow => EffectiveRule::Allowed,
            Resolution::Default => EffectiveRule::NotAllowed,
        },
    }
}
