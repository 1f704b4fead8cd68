//! The database root: named entries (resources, collections, nested
//! databases) with path-routed REST.
//!
//! The root consumes the first path token and dispatches to the matching
//! entry. Write verbs on the root itself are refused; the aggregate GET
//! of every readable entry can be disabled for large databases.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arbor_core::AccessLevel;
use arbor_rest::{AccessControl, Permission, RestResult};
use parking_lot::Mutex;

use crate::collection::Collection;
use crate::pubsub::{Notification, SubscriptionHandle};
use crate::queue::NotifyQueue;
use crate::resource::Resource;

/// One mounted entry of a database.
#[derive(Clone, Debug)]
pub enum DatabaseEntry {
    /// A permanent resource.
    Resource(Resource),
    /// A collection of objects.
    Collection(Collection),
    /// A nested database.
    Database(Database),
}

impl DatabaseEntry {
    fn name(&self) -> &str {
        match self {
            Self::Resource(resource) => resource.name(),
            Self::Collection(collection) => collection.name(),
            Self::Database(database) => database.name(),
        }
    }

    fn read_level(&self) -> AccessLevel {
        match self {
            Self::Resource(resource) => resource.read_level(),
            Self::Collection(collection) => collection.read_level(),
            Self::Database(database) => database.shared.access_level,
        }
    }

    fn rest_get(&self, path: &str, access: &AccessControl) -> Result<String, RestResult> {
        match self {
            Self::Resource(resource) => resource.rest_get(path, access),
            Self::Collection(collection) => collection.rest_get(path, access),
            Self::Database(database) => database.rest_get(path, access),
        }
    }

    fn rest_post(&self, path: &str, body: &str, access: &AccessControl) -> RestResult {
        match self {
            Self::Resource(resource) => resource.rest_post(path, body, access),
            Self::Collection(collection) => collection.rest_post(path, body, access),
            Self::Database(database) => database.rest_post(path, body, access),
        }
    }

    fn rest_patch(&self, path: &str, body: &str, access: &AccessControl) -> RestResult {
        match self {
            Self::Resource(resource) => resource.rest_patch(path, body, access),
            Self::Collection(collection) => collection.rest_patch(path, body, access),
            Self::Database(database) => database.rest_patch(path, body, access),
        }
    }

    fn rest_put(&self, path: &str, body: &str, access: &AccessControl) -> RestResult {
        match self {
            Self::Resource(resource) => resource.rest_put(path, body, access),
            Self::Collection(collection) => collection.rest_put(path, body, access),
            Self::Database(database) => database.rest_put(path, body, access),
        }
    }

    fn rest_delete(&self, path: &str, access: &AccessControl) -> RestResult {
        match self {
            Self::Resource(resource) => resource.rest_delete(path, access),
            Self::Collection(collection) => collection.rest_delete(path, access),
            Self::Database(database) => database.rest_delete(path, access),
        }
    }

    fn subscriber_count(&self) -> usize {
        match self {
            Self::Resource(resource) => resource.subscriber_count(),
            Self::Collection(collection) => collection.subscriber_count(),
            Self::Database(database) => database.subscriber_count(),
        }
    }

    fn clear_all_data_and_subscribers(&self) {
        match self {
            Self::Resource(resource) => resource.clear_all_data_and_subscribers(),
            Self::Collection(collection) => collection.clear_all_data_and_subscribers(),
            Self::Database(database) => database.clear_all_data_and_subscribers(),
        }
    }
}

struct DatabaseShared {
    name: String,
    access_level: AccessLevel,
    allow_global_get: AtomicBool,
    entries: Mutex<BTreeMap<String, DatabaseEntry>>,
}

/// A path-routing root mounting resources, collections and nested
/// databases. Cheap to clone; clones share the entry table.
#[derive(Clone)]
pub struct Database {
    shared: Arc<DatabaseShared>,
}

impl Database {
    /// Create an empty database.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_access(name, AccessLevel::Public)
    }

    /// Create an empty database requiring `level` for reads.
    #[must_use]
    pub fn with_access(name: impl Into<String>, level: AccessLevel) -> Self {
        Self {
            shared: Arc::new(DatabaseShared {
                name: name.into(),
                access_level: level,
                allow_global_get: AtomicBool::new(true),
                entries: Mutex::new(BTreeMap::new()),
            }),
        }
    }

    /// Database name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Allow or refuse GET on the database root (the aggregate of every
    /// readable entry). Enabled by default.
    pub fn set_allow_global_get(&self, allow: bool) {
        self.shared.allow_global_get.store(allow, Ordering::Relaxed);
    }

    fn install(&self, entry: DatabaseEntry) -> bool {
        let name = entry.name().trim_matches('/').to_owned();
        if name.is_empty() || name.contains('/') {
            return false;
        }
        let mut entries = self.shared.entries.lock();
        if entries.contains_key(&name) {
            return false;
        }
        entries.insert(name, entry);
        true
    }

    /// Mount a resource under its name; false on a duplicate or invalid
    /// name.
    pub fn install_resource(&self, resource: &Resource) -> bool {
        self.install(DatabaseEntry::Resource(resource.clone()))
    }

    /// Mount a collection under its name.
    pub fn install_collection(&self, collection: &Collection) -> bool {
        self.install(DatabaseEntry::Collection(collection.clone()))
    }

    /// Mount a nested database under its name.
    pub fn install_database(&self, database: &Database) -> bool {
        self.install(DatabaseEntry::Database(database.clone()))
    }

    /// Look up a mounted entry by name.
    #[must_use]
    pub fn entry(&self, name: &str) -> Option<DatabaseEntry> {
        self.shared.entries.lock().get(name).cloned()
    }

    fn split_path(path: &str) -> (Option<&str>, String) {
        let trimmed = path.trim_start_matches('/');
        match trimmed.split_once('/') {
            Some((first, rest)) => (Some(first).filter(|t| !t.is_empty()), format!("/{rest}")),
            None => (Some(trimmed).filter(|t| !t.is_empty()), String::new()),
        }
    }

    fn route(&self, token: &str, level: AccessLevel) -> Option<DatabaseEntry> {
        let entry = self.entry(token)?;
        if level < entry.read_level() {
            return None;
        }
        Some(entry)
    }

    /// GET: the root aggregates every readable entry (when allowed);
    /// deeper paths route to the matching entry.
    ///
    /// # Errors
    ///
    /// The failing [`RestResult`].
    pub fn rest_get(&self, path: &str, access: &AccessControl) -> Result<String, RestResult> {
        let (first, rest) = Self::split_path(path);
        let Some(token) = first else {
            if !self.shared.allow_global_get.load(Ordering::Relaxed) {
                return Err(RestResult::method_not_allowed(
                    "GET on the database root is disabled",
                ));
            }
            let entries = self.shared.entries.lock().clone();
            let mut body = String::from("{");
            let mut emitted = 0;
            for (name, entry) in &entries {
                if access.level() < entry.read_level() {
                    continue;
                }
                let Ok(element) = entry.rest_get("/", access) else {
                    continue;
                };
                if emitted > 0 {
                    body.push(',');
                }
                emitted += 1;
                body.push_str(&format!("\"{name}\":{element}"));
            }
            body.push('}');
            return Ok(body);
        };
        let Some(entry) = self.route(token, access.level()) else {
            return Err(RestResult::not_found());
        };
        entry.rest_get(&rest, access)
    }

    /// POST; refused on the database root.
    pub fn rest_post(&self, path: &str, body: &str, access: &AccessControl) -> RestResult {
        let (first, rest) = Self::split_path(path);
        let Some(token) = first else {
            return RestResult::method_not_allowed("cannot POST to a database root");
        };
        let Some(entry) = self.route(token, access.level()) else {
            return RestResult::not_found();
        };
        entry.rest_post(&rest, body, access)
    }

    /// PATCH; refused on the database root.
    pub fn rest_patch(&self, path: &str, body: &str, access: &AccessControl) -> RestResult {
        let (first, rest) = Self::split_path(path);
        let Some(token) = first else {
            return RestResult::method_not_allowed("cannot PATCH a database root");
        };
        let Some(entry) = self.route(token, access.level()) else {
            return RestResult::not_found();
        };
        entry.rest_patch(&rest, body, access)
    }

    /// PUT; refused on the database root.
    pub fn rest_put(&self, path: &str, body: &str, access: &AccessControl) -> RestResult {
        let (first, rest) = Self::split_path(path);
        let Some(token) = first else {
            return RestResult::method_not_allowed("cannot PUT a database root");
        };
        let Some(entry) = self.route(token, access.level()) else {
            return RestResult::not_found();
        };
        entry.rest_put(&rest, body, access)
    }

    /// DELETE; refused on the database root.
    pub fn rest_delete(&self, path: &str, access: &AccessControl) -> RestResult {
        let (first, rest) = Self::split_path(path);
        let Some(token) = first else {
            return RestResult::method_not_allowed("cannot DELETE a database root");
        };
        let Some(entry) = self.route(token, access.level()) else {
            return RestResult::not_found();
        };
        entry.rest_delete(&rest, access)
    }

    /// Route a change subscription to the entry the path names.
    pub fn on_change_to_path(
        &self,
        path: &str,
        queue: &NotifyQueue,
        callback: impl Fn(&Notification) + Send + Sync + 'static,
    ) -> Option<SubscriptionHandle> {
        let (first, rest) = Self::split_path(path);
        let token = first?;
        match self.entry(token)? {
            DatabaseEntry::Resource(resource) => {
                resource.on_change_to_path(&rest, queue, callback)
            }
            DatabaseEntry::Collection(collection) => {
                collection.on_change_to_path(&rest, queue, callback)
            }
            DatabaseEntry::Database(database) => {
                database.on_change_to_path(&rest, queue, callback)
            }
        }
    }

    /// Restore one persisted body via PUT at root access.
    pub fn restore(&self, path: &str, json: &str) -> bool {
        let (first, rest) = Self::split_path(path);
        let Some(token) = first else {
            return false;
        };
        match self.entry(token) {
            Some(DatabaseEntry::Resource(resource)) => {
                if rest.trim_matches('/').is_empty() {
                    resource.restore(json)
                } else {
                    resource
                        .rest_put(&rest, json, &AccessControl::root())
                        .is_ok()
                }
            }
            Some(DatabaseEntry::Collection(collection)) => collection.restore(&rest, json),
            Some(DatabaseEntry::Database(database)) => database.restore(&rest, json),
            None => false,
        }
    }

    /// Path completions: entry names at the first level, entry
    /// completions below.
    #[must_use]
    pub fn search_paths(
        &self,
        prefix: &str,
        level: AccessLevel,
        permission: Permission,
        max: usize,
    ) -> Vec<String> {
        if !prefix.starts_with('/') {
            return Vec::new();
        }
        let (first, rest) = Self::split_path(prefix);
        let entries = self.shared.entries.lock().clone();
        let Some(token) = first else {
            return entries.keys().map(|name| format!("/{name}")).take(max).collect();
        };
        if rest.is_empty() && !prefix.ends_with('/') {
            return entries
                .keys()
                .filter(|name| name.starts_with(token))
                .map(|name| format!("/{name}"))
                .take(max)
                .collect();
        }
        let Some(entry) = self.route(token, level) else {
            return Vec::new();
        };
        let sub = match entry {
            DatabaseEntry::Resource(resource) => {
                resource.search_paths(&rest, level, permission, max)
            }
            DatabaseEntry::Collection(collection) => {
                collection.search_paths(&rest, level, permission, max)
            }
            DatabaseEntry::Database(database) => {
                database.search_paths(&rest, level, permission, max)
            }
        };
        sub.into_iter()
            .map(|path| format!("/{token}{path}"))
            .take(max)
            .collect()
    }

    /// Total subscriber count across all entries.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.shared
            .entries
            .lock()
            .values()
            .map(DatabaseEntry::subscriber_count)
            .sum()
    }

    /// Clear every entry's data, subscribers and validators.
    pub fn clear_all_data_and_subscribers(&self) {
        for entry in self.shared.entries.lock().values() {
            entry.clear_all_data_and_subscribers();
        }
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.shared.name)
            .field("entries", &self.shared.entries.lock().len())
            .finish()
    }
}
