//! In-memory fakes for the store and filesystem ports.
//!
//! Every fake records the calls it receives so pipeline tests can assert on
//! ordering and payloads, and each one can be armed to fail for
//! failure-injection tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use serde_json::Value;

use masthead_data::{
    AssetRecord, AssetStore, ConnectivityProbe, DataError, DataResult, DbOptions, ExtensionStore,
    GroupStore, ROOT_ASSET, SessionStore,
};
use masthead_fsops::{ArtifactStore, CacheScope, CacheStore, FsOpsError, FsOpsResult, FtpSettings};

fn data_failure(operation: &'static str) -> DataError {
    DataError::QueryFailed {
        operation,
        source: sqlx::Error::PoolClosed,
    }
}

fn fs_failure(operation: &'static str) -> FsOpsError {
    FsOpsError::Io {
        operation,
        path: "memory".into(),
        source: std::io::Error::other("injected failure"),
    }
}

/// In-memory permission tree seeded with a root node.
pub struct MemoryAssets {
    nodes: Mutex<HashMap<String, AssetRecord>>,
    next_id: AtomicU64,
    saved: Mutex<Vec<(String, Value)>>,
    fail_save: AtomicBool,
}

impl Default for MemoryAssets {
    fn default() -> Self {
        let fake = Self {
            nodes: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(2),
            saved: Mutex::new(Vec::new()),
            fail_save: AtomicBool::new(false),
        };
        fake.nodes.lock().expect("assets lock").insert(
            ROOT_ASSET.to_string(),
            AssetRecord {
                id: 1,
                parent_id: None,
                name: ROOT_ASSET.to_string(),
                title: "Root".to_string(),
                rules: Value::Object(serde_json::Map::new()),
            },
        );
        fake
    }
}

impl MemoryAssets {
    /// Empty tree containing only the root node.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a node under `parent`.
    ///
    /// # Panics
    ///
    /// Panics when `parent` has not been seeded.
    pub fn seed(&self, name: &str, parent: &str, rules: Value) {
        let mut nodes = self.nodes.lock().expect("assets lock");
        let parent_id = nodes.get(parent).expect("parent seeded").id;
        #[allow(clippy::cast_possible_wrap)]
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) as i64;
        nodes.insert(
            name.to_string(),
            AssetRecord {
                id,
                parent_id: Some(parent_id),
                name: name.to_string(),
                title: name.to_string(),
                rules,
            },
        );
    }

    /// Replace the rules stored on an already-seeded node.
    ///
    /// # Panics
    ///
    /// Panics when `name` has not been seeded.
    pub fn set_rules(&self, name: &str, rules: Value) {
        let mut nodes = self.nodes.lock().expect("assets lock");
        nodes.get_mut(name).expect("node seeded").rules = rules;
    }

    /// Remove a node outright, e.g. to simulate a missing root asset.
    pub fn remove(&self, name: &str) {
        self.nodes.lock().expect("assets lock").remove(name);
    }

    /// Arm the next `save_rules` call to fail.
    pub fn fail_next_save(&self) {
        self.fail_save.store(true, Ordering::SeqCst);
    }

    /// Every `(name, rules)` pair passed to `save_rules`, in call order.
    #[must_use]
    pub fn saved(&self) -> Vec<(String, Value)> {
        self.saved.lock().expect("saved lock").clone()
    }
}

#[async_trait]
impl AssetStore for MemoryAssets {
    async fn fetch_by_name(&self, name: &str) -> DataResult<Option<AssetRecord>> {
        Ok(self.nodes.lock().expect("assets lock").get(name).cloned())
    }

    async fn fetch_chain(&self, name: &str) -> DataResult<Vec<AssetRecord>> {
        let nodes = self.nodes.lock().expect("assets lock");
        let Some(mut current) = nodes.get(name).cloned() else {
            return Ok(Vec::new());
        };
        let mut chain = vec![current.clone()];
        while let Some(parent_id) = current.parent_id {
            let parent = nodes
                .values()
                .find(|node| node.id == parent_id)
                .cloned()
                .ok_or_else(|| data_failure("fetch asset chain"))?;
            chain.push(parent.clone());
            current = parent;
        }
        chain.reverse();
        Ok(chain)
    }

    async fn save_rules(&self, name: &str, rules: &Value) -> DataResult<()> {
        if self.fail_save.swap(false, Ordering::SeqCst) {
            return Err(data_failure("save asset rules"));
        }
        self.saved
            .lock()
            .expect("saved lock")
            .push((name.to_string(), rules.clone()));
        let mut nodes = self.nodes.lock().expect("assets lock");
        if let Some(node) = nodes.get_mut(name) {
            node.rules = rules.clone();
        } else {
            let root_id = nodes.get(ROOT_ASSET).map(|root| root.id);
            #[allow(clippy::cast_possible_wrap)]
            let id = self.next_id.fetch_add(1, Ordering::SeqCst) as i64;
            nodes.insert(
                name.to_string(),
                AssetRecord {
                    id,
                    parent_id: root_id,
                    name: name.to_string(),
                    title: name.to_string(),
                    rules: rules.clone(),
                },
            );
        }
        Ok(())
    }
}

/// In-memory extension parameter table.
#[derive(Default)]
pub struct MemoryExtensions {
    params: Mutex<HashMap<String, Value>>,
    saved: Mutex<Vec<(String, Value)>>,
    fail_save: AtomicBool,
}

impl MemoryExtensions {
    /// Empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the parameter document for `element`.
    pub fn seed(&self, element: &str, params: Value) {
        self.params
            .lock()
            .expect("params lock")
            .insert(element.to_string(), params);
    }

    /// Arm the next `save_params` call to fail.
    pub fn fail_next_save(&self) {
        self.fail_save.store(true, Ordering::SeqCst);
    }

    /// Every `(element, params)` pair passed to `save_params`, in call order.
    #[must_use]
    pub fn saved(&self) -> Vec<(String, Value)> {
        self.saved.lock().expect("saved lock").clone()
    }
}

#[async_trait]
impl ExtensionStore for MemoryExtensions {
    async fn fetch_params(&self, element: &str) -> DataResult<Option<Value>> {
        Ok(self.params.lock().expect("params lock").get(element).cloned())
    }

    async fn save_params(&self, element: &str, params: &Value) -> DataResult<()> {
        if self.fail_save.swap(false, Ordering::SeqCst) {
            return Err(data_failure("save extension params"));
        }
        self.saved
            .lock()
            .expect("saved lock")
            .push((element.to_string(), params.clone()));
        self.params
            .lock()
            .expect("params lock")
            .insert(element.to_string(), params.clone());
        Ok(())
    }
}

/// In-memory session table that records purge requests.
#[derive(Default)]
pub struct MemorySessions {
    purges: Mutex<Vec<i64>>,
    fail_purge: AtomicBool,
}

impl MemorySessions {
    /// Empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the next `purge` call to fail.
    pub fn fail_next_purge(&self) {
        self.fail_purge.store(true, Ordering::SeqCst);
    }

    /// Every age argument passed to `purge`, in call order.
    #[must_use]
    pub fn purges(&self) -> Vec<i64> {
        self.purges.lock().expect("purges lock").clone()
    }
}

#[async_trait]
impl SessionStore for MemorySessions {
    async fn purge(&self, max_age_seconds: i64) -> DataResult<u64> {
        if self.fail_purge.swap(false, Ordering::SeqCst) {
            return Err(data_failure("purge sessions"));
        }
        self.purges.lock().expect("purges lock").push(max_age_seconds);
        Ok(0)
    }
}

/// In-memory group membership table.
#[derive(Default)]
pub struct MemoryGroups {
    members: Mutex<HashMap<i64, Vec<i64>>>,
}

impl MemoryGroups {
    /// Empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the group list for a user.
    pub fn seed(&self, user_id: i64, groups: Vec<i64>) {
        self.members.lock().expect("members lock").insert(user_id, groups);
    }
}

#[async_trait]
impl GroupStore for MemoryGroups {
    async fn groups_for_user(&self, user_id: i64) -> DataResult<Vec<i64>> {
        Ok(self
            .members
            .lock()
            .expect("members lock")
            .get(&user_id)
            .cloned()
            .unwrap_or_default())
    }
}

/// Connectivity probe with a scripted outcome.
#[derive(Default)]
pub struct MemoryProbe {
    fail: AtomicBool,
    calls: Mutex<Vec<DbOptions>>,
}

impl MemoryProbe {
    /// Probe that always succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Probe that always fails.
    #[must_use]
    pub fn failing() -> Self {
        let probe = Self::default();
        probe.fail.store(true, Ordering::SeqCst);
        probe
    }

    /// Every options payload the probe received, in call order.
    #[must_use]
    pub fn calls(&self) -> Vec<DbOptions> {
        self.calls.lock().expect("calls lock").clone()
    }
}

#[async_trait]
impl ConnectivityProbe for MemoryProbe {
    async fn probe(&self, options: &DbOptions) -> DataResult<()> {
        self.calls.lock().expect("calls lock").push(options.clone());
        if self.fail.load(Ordering::SeqCst) {
            return Err(DataError::ConnectFailed {
                source: sqlx::Error::PoolClosed,
            });
        }
        Ok(())
    }
}

/// In-memory configuration artifact.
pub struct MemoryArtifact {
    document: Mutex<Option<Value>>,
    writes: Mutex<Vec<(Value, FtpSettings)>>,
    fail_write: AtomicBool,
}

impl Default for MemoryArtifact {
    fn default() -> Self {
        Self {
            document: Mutex::new(None),
            writes: Mutex::new(Vec::new()),
            fail_write: AtomicBool::new(false),
        }
    }
}

impl MemoryArtifact {
    /// Artifact with no stored document; `load` fails until one is seeded.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Artifact pre-seeded with `document`.
    #[must_use]
    pub fn with_document(document: Value) -> Self {
        let artifact = Self::default();
        *artifact.document.lock().expect("document lock") = Some(document);
        artifact
    }

    /// Arm the next `write` call to fail.
    pub fn fail_next_write(&self) {
        self.fail_write.store(true, Ordering::SeqCst);
    }

    /// Every `(document, ftp)` pair passed to `write`, in call order.
    #[must_use]
    pub fn writes(&self) -> Vec<(Value, FtpSettings)> {
        self.writes.lock().expect("writes lock").clone()
    }

    /// Currently stored document, if any.
    #[must_use]
    pub fn document(&self) -> Option<Value> {
        self.document.lock().expect("document lock").clone()
    }
}

impl ArtifactStore for MemoryArtifact {
    fn load(&self) -> FsOpsResult<Value> {
        self.document
            .lock()
            .expect("document lock")
            .clone()
            .ok_or_else(|| fs_failure("artifact.read"))
    }

    fn write(&self, document: &Value, ftp: &FtpSettings) -> FsOpsResult<()> {
        if self.fail_write.swap(false, Ordering::SeqCst) {
            return Err(fs_failure("artifact.write"));
        }
        self.writes
            .lock()
            .expect("writes lock")
            .push((document.clone(), ftp.clone()));
        *self.document.lock().expect("document lock") = Some(document.clone());
        Ok(())
    }
}

/// In-memory component cache that records purge and flush requests.
pub struct MemoryCache {
    purged: Mutex<Vec<String>>,
    flushes: AtomicU64,
    writable: AtomicBool,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self {
            purged: Mutex::new(Vec::new()),
            flushes: AtomicU64::new(0),
            writable: AtomicBool::new(true),
        }
    }
}

impl MemoryCache {
    /// Writable cache with no recorded activity.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `dir_writable` report `false` for every scope.
    pub fn set_unwritable(&self) {
        self.writable.store(false, Ordering::SeqCst);
    }

    /// Every component passed to `purge_component`, in call order.
    #[must_use]
    pub fn purged(&self) -> Vec<String> {
        self.purged.lock().expect("purged lock").clone()
    }

    /// Number of `flush_all` calls received.
    #[must_use]
    pub fn flushes(&self) -> u64 {
        self.flushes.load(Ordering::SeqCst)
    }
}

impl CacheStore for MemoryCache {
    fn purge_component(&self, component: &str) -> FsOpsResult<()> {
        self.purged
            .lock()
            .expect("purged lock")
            .push(component.to_string());
        Ok(())
    }

    fn flush_all(&self) -> FsOpsResult<()> {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn dir_writable(&self, _scope: CacheScope) -> bool {
        self.writable.load(Ordering::SeqCst)
    }
}
