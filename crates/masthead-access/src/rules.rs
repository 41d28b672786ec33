//! Tri-state rule documents and the inheritance fold.
//!
//! A rule document maps an action name to per-group grants. `true` allows,
//! `false` denies, and an absent entry inherits from the parent asset. The
//! effective answer for an asset is a fold over its ancestor chain where an
//! explicit deny is final.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::error::{AccessError, Result};

/// Action guarding super administrator status on the root asset.
pub const CORE_ADMIN: &str = "core.admin";

/// A single grant as stored in a rule document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleState {
    /// Explicit allow.
    Allow,
    /// Explicit deny.
    Deny,
    /// No local entry; the parent asset decides.
    Inherit,
}

/// Outcome of folding an ancestor chain for one action/group pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Some asset in the chain allows and none denies.
    Allow,
    /// Some asset in the chain explicitly denies.
    Deny,
    /// No asset in the chain carries an entry; access defaults to denied.
    Default,
}

/// Decoded rule document for one asset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSet {
    actions: BTreeMap<String, BTreeMap<i64, bool>>,
}

impl RuleSet {
    /// Empty document.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a stored JSON document.
    ///
    /// Grants encoded as `0`/`1` integers are accepted alongside booleans,
    /// matching documents written by earlier releases.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::RuleDocument`] when the document is not an
    /// object of action blocks with integer group keys.
    pub fn from_value(value: &Value) -> Result<Self> {
        let Some(object) = value.as_object() else {
            return Err(malformed("document is not an object"));
        };
        let mut actions = BTreeMap::new();
        for (action, block) in object {
            let Some(entries) = block.as_object() else {
                return Err(malformed(format!("action `{action}` is not an object")));
            };
            let mut grants = BTreeMap::new();
            for (group, grant) in entries {
                let id: i64 = group
                    .parse()
                    .map_err(|_| malformed(format!("group key `{group}` is not an integer")))?;
                let allowed = match grant {
                    Value::Bool(flag) => *flag,
                    Value::Number(number) => match number.as_i64() {
                        Some(0) => false,
                        Some(1) => true,
                        _ => return Err(malformed(format!("grant for group `{group}` out of range"))),
                    },
                    _ => return Err(malformed(format!("grant for group `{group}` is not boolean"))),
                };
                grants.insert(id, allowed);
            }
            actions.insert(action.clone(), grants);
        }
        Ok(Self { actions })
    }

    /// Encode back to the stored JSON shape.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut object = Map::new();
        for (action, grants) in &self.actions {
            let mut block = Map::new();
            for (group, allowed) in grants {
                block.insert(group.to_string(), Value::Bool(*allowed));
            }
            object.insert(action.clone(), Value::Object(block));
        }
        Value::Object(object)
    }

    /// Local grant for one action/group pair.
    #[must_use]
    pub fn state(&self, action: &str, group: i64) -> RuleState {
        match self.actions.get(action).and_then(|grants| grants.get(&group)) {
            Some(true) => RuleState::Allow,
            Some(false) => RuleState::Deny,
            None => RuleState::Inherit,
        }
    }

    /// Set an explicit grant.
    pub fn set(&mut self, action: &str, group: i64, allowed: bool) {
        self.actions
            .entry(action.to_string())
            .or_default()
            .insert(group, allowed);
    }

    /// Remove the grant, reverting the pair to inheritance.
    ///
    /// An action block emptied by the removal is dropped from the document.
    pub fn clear(&mut self, action: &str, group: i64) {
        if let Some(grants) = self.actions.get_mut(action) {
            grants.remove(&group);
            if grants.is_empty() {
                self.actions.remove(action);
            }
        }
    }

    /// Remove an entire action block.
    pub fn clear_action(&mut self, action: &str) {
        self.actions.remove(action);
    }

    /// Whether the document carries no grants at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Whether `groups` hold the action under this document alone.
    ///
    /// Deny wins: one explicit deny across the groups defeats any allow, and
    /// at least one explicit allow is required.
    #[must_use]
    pub fn allows(&self, action: &str, groups: &[i64]) -> bool {
        let Some(grants) = self.actions.get(action) else {
            return false;
        };
        let mut allowed = false;
        for group in groups {
            match grants.get(group) {
                Some(false) => return false,
                Some(true) => allowed = true,
                None => {}
            }
        }
        allowed
    }
}

/// Fold an ancestor chain, root first, for one action/group pair.
///
/// An explicit deny anywhere in the chain is final and cannot be overridden
/// by a descendant allow.
#[must_use]
pub fn resolve<'a, I>(chain: I, action: &str, group: i64) -> Resolution
where
    I: IntoIterator<Item = &'a RuleSet>,
{
    let mut resolution = Resolution::Default;
    for rules in chain {
        match rules.state(action, group) {
            RuleState::Deny => return Resolution::Deny,
            RuleState::Allow => resolution = Resolution::Allow,
            RuleState::Inherit => {}
        }
    }
    resolution
}

fn malformed(detail: impl Into<String>) -> AccessError {
    AccessError::RuleDocument {
        detail: detail.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn codec_round_trips_and_accepts_numeric_grants() {
        let document = json!({"core.admin": {"8": true}, "core.edit": {"2": 1, "3": 0}});
        let rules = RuleSet::from_value(&document).expect("valid document");
        assert_eq!(rules.state("core.admin", 8), RuleState::Allow);
        assert_eq!(rules.state("core.edit", 2), RuleState::Allow);
        assert_eq!(rules.state("core.edit", 3), RuleState::Deny);
        assert_eq!(rules.state("core.edit", 9), RuleState::Inherit);

        assert_eq!(
            rules.to_value(),
            json!({"core.admin": {"8": true}, "core.edit": {"2": true, "3": false}})
        );
    }

    #[test]
    fn codec_rejects_malformed_documents() {
        for document in [
            json!([]),
            json!({"core.edit": 1}),
            json!({"core.edit": {"nope": true}}),
            json!({"core.edit": {"2": "yes"}}),
            json!({"core.edit": {"2": 5}}),
        ] {
            assert!(matches!(
                RuleSet::from_value(&document),
                Err(AccessError::RuleDocument { .. })
            ));
        }
    }

    #[test]
    fn clear_drops_empty_action_blocks() {
        let mut rules = RuleSet::new();
        rules.set("core.edit", 2, true);
        rules.clear("core.edit", 2);
        assert!(rules.is_empty());
        assert_eq!(rules.to_value(), json!({}));
    }

    #[test]
    fn allows_requires_a_grant_and_deny_wins() {
        let rules =
            RuleSet::from_value(&json!({"core.admin": {"7": true, "8": false}})).expect("valid");
        assert!(rules.allows("core.admin", &[7]));
        assert!(!rules.allows("core.admin", &[7, 8]));
        assert!(!rules.allows("core.admin", &[9]));
        assert!(!rules.allows("core.manage", &[7]));
    }

    #[test]
    fn resolve_defaults_to_deny_and_locks_on_ancestor_deny() {
        let root = RuleSet::from_value(&json!({"core.edit": {"2": false}})).expect("valid");
        let leaf = RuleSet::from_value(&json!({"core.edit": {"2": true}})).expect("valid");

        assert_eq!(resolve([&root, &leaf], "core.edit", 2), Resolution::Deny);
        assert_eq!(resolve([&leaf], "core.edit", 2), Resolution::Allow);
        assert_eq!(resolve([&root, &leaf], "core.edit", 9), Resolution::Default);
    }
}
