//! Permanent resources: one root object behind a re-entrant lock, with
//! validators, transactions and change publication.
//!
//! All edits go through a [`Transaction`]: the root is locked, the object
//! cloned into a scratch, the scratch edited (directly or via REST), and
//! on commit the validators run, the scratch replaces the live object,
//! one notification carrying the accumulated change mask is published,
//! and the change markers are cleared. Aborting (or dropping) the
//! transaction leaves the live object untouched.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::sync::Arc;

use arbor_core::id::generate_id;
use arbor_core::{AccessLevel, FieldMask, Object, RecordType};
use arbor_rest::{
    get_json, patch_json, post_json, put_json, rest_delete, AccessControl, Permission, RestResult,
};
use parking_lot::{ReentrantMutex, ReentrantMutexGuard};

use crate::pubsub::{
    dispatch_to_subscribers, Notification, SubscriberEntry, SubscriberFetch, SubscriptionHandle,
};
use crate::queue::NotifyQueue;
use crate::validate::{run_validators, Validation, ValidationResult, Validator};

pub(crate) struct ResourceState {
    object: Object,
    subscribers: BTreeMap<u64, SubscriberEntry>,
    validators: BTreeMap<u64, Validator>,
    next_token: u64,
    can_read: AccessLevel,
    can_update: AccessLevel,
}

struct ResourceShared {
    name: String,
    state: ReentrantMutex<RefCell<ResourceState>>,
}

/// A named root object with REST access, validation and pub/sub.
///
/// `Resource` is a cheap-to-clone handle; all clones share the same
/// state and lock.
#[derive(Clone)]
pub struct Resource {
    shared: Arc<ResourceShared>,
}

impl Resource {
    /// Create a resource whose object receives a generated id.
    #[must_use]
    pub fn new(name: impl Into<String>, rtype: &Arc<RecordType>) -> Self {
        Self::with_access(name, rtype, AccessLevel::Public)
    }

    /// Create a resource requiring `level` for reads and updates.
    #[must_use]
    pub fn with_access(
        name: impl Into<String>,
        rtype: &Arc<RecordType>,
        level: AccessLevel,
    ) -> Self {
        let mut object = Object::new(rtype);
        object.assign_id(generate_id());
        object.clear_change_markers();
        Self {
            shared: Arc::new(ResourceShared {
                name: name.into(),
                state: ReentrantMutex::new(RefCell::new(ResourceState {
                    object,
                    subscribers: BTreeMap::new(),
                    validators: BTreeMap::new(),
                    next_token: 0,
                    can_read: level,
                    can_update: level,
                })),
            }),
        }
    }

    /// Resource name (its path token inside a database).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    fn lock(&self) -> ReentrantMutexGuard<'_, RefCell<ResourceState>> {
        self.shared.state.lock()
    }

    /// Minimum level required to read.
    #[must_use]
    pub fn read_level(&self) -> AccessLevel {
        self.lock().borrow().can_read
    }

    /// Change the levels required to read and update.
    pub fn set_access(&self, read: AccessLevel, update: AccessLevel) {
        let guard = self.lock();
        let mut state = guard.borrow_mut();
        state.can_read = read;
        state.can_update = update;
    }

    /// Run `f` against the live object under the lock.
    pub fn read<R>(&self, f: impl FnOnce(&Object) -> R) -> R {
        let guard = self.lock();
        let state = guard.borrow();
        f(&state.object)
    }

    /// Clone of the live object.
    #[must_use]
    pub fn snapshot(&self) -> Object {
        self.read(Object::clone)
    }

    /// Open a transaction: the root stays locked until commit or abort.
    #[must_use]
    pub fn transaction(&self) -> Transaction<'_> {
        let guard = self.lock();
        let scratch = guard.borrow().object.clone();
        Transaction {
            resource: self,
            guard,
            scratch: Some(scratch),
        }
    }

    /// Edit the object in one transaction and commit.
    pub fn edit(&self, f: impl FnOnce(&mut Object)) -> RestResult {
        let mut txn = self.transaction();
        f(txn.object_mut());
        txn.commit()
    }

    // ---- validation -----------------------------------------------------

    /// Register a validator; it runs on every commit until the handle is
    /// dropped.
    pub fn validate_with(
        &self,
        validator: impl Fn(&mut Validation<'_>) -> ValidationResult + Send + Sync + 'static,
    ) -> SubscriptionHandle {
        let token = {
            let guard = self.lock();
            let mut state = guard.borrow_mut();
            state.next_token += 1;
            let token = state.next_token;
            state.validators.insert(token, Arc::new(validator));
            token
        };
        let weak = Arc::downgrade(&self.shared);
        SubscriptionHandle::new(move || {
            if let Some(shared) = weak.upgrade() {
                let guard = shared.state.lock();
                guard.borrow_mut().validators.remove(&token);
            }
        })
    }

    // ---- pub/sub --------------------------------------------------------

    fn subscribe(
        &self,
        filter: FieldMask,
        queue: &NotifyQueue,
        callback: impl Fn(&Notification) + Send + Sync + 'static,
    ) -> SubscriptionHandle {
        let token = {
            let guard = self.lock();
            let mut state = guard.borrow_mut();
            state.next_token += 1;
            let token = state.next_token;
            state.subscribers.insert(
                token,
                SubscriberEntry {
                    filter,
                    callback: Arc::new(callback),
                    queue: queue.clone(),
                },
            );
            token
        };
        let weak = Arc::downgrade(&self.shared);
        SubscriptionHandle::new(move || {
            if let Some(shared) = weak.upgrade() {
                let guard = shared.state.lock();
                guard.borrow_mut().subscribers.remove(&token);
            }
        })
    }

    /// Subscribe to changes matching `filter`, dispatched on `queue`.
    pub fn on_change_via(
        &self,
        filter: FieldMask,
        queue: &NotifyQueue,
        callback: impl Fn(&Notification) + Send + Sync + 'static,
    ) -> SubscriptionHandle {
        self.subscribe(filter, queue, callback)
    }

    /// Subscribe to any change, dispatched inline.
    pub fn on_change(
        &self,
        callback: impl Fn(&Notification) + Send + Sync + 'static,
    ) -> SubscriptionHandle {
        self.subscribe(FieldMask::for_all_changes(), &NotifyQueue::immediate(), callback)
    }

    /// Subscribe to changes of one field named by `path`; `None` when the
    /// path does not name a field of this resource.
    pub fn on_change_to_path(
        &self,
        path: &str,
        queue: &NotifyQueue,
        callback: impl Fn(&Notification) + Send + Sync + 'static,
    ) -> Option<SubscriptionHandle> {
        let trimmed = path.trim_matches('/');
        if trimmed.is_empty() {
            return Some(self.subscribe(FieldMask::for_all_changes(), queue, callback));
        }
        let index = self.read(|object| {
            object
                .record_type()
                .find_by_label(trimmed)
                .map(|field| field.index)
        })?;
        let mut filter = FieldMask::new();
        filter.set_changed(index, true);
        Some(self.subscribe(filter, queue, callback))
    }

    /// Number of registered subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.lock().borrow().subscribers.len()
    }

    /// Drop all data, subscribers and validators.
    pub fn clear_all_data_and_subscribers(&self) {
        let guard = self.lock();
        let mut state = guard.borrow_mut();
        state.subscribers.clear();
        state.validators.clear();
        state.object.clear_all();
    }

    pub(crate) fn subscriber_fetch(&self) -> SubscriberFetch {
        let weak = Arc::downgrade(&self.shared);
        Arc::new(move || {
            weak.upgrade().map_or_else(Vec::new, |shared| {
                let guard = shared.state.lock();
                let entries = guard.borrow().subscribers.values().cloned().collect();
                entries
            })
        })
    }

    // ---- REST -----------------------------------------------------------

    fn first_token_is_empty(path: &str) -> bool {
        path.trim_matches('/').is_empty()
    }

    /// GET at `path`, returning the JSON body.
    ///
    /// # Errors
    ///
    /// The failing [`RestResult`].
    pub fn rest_get(&self, path: &str, access: &AccessControl) -> Result<String, RestResult> {
        let guard = self.lock();
        let state = guard.borrow();
        if access.level() < state.can_read {
            return Err(RestResult::forbidden());
        }
        get_json(&state.object, path, access)
    }

    /// POST at `path`; the resource root itself cannot be POSTed to.
    pub fn rest_post(&self, path: &str, body: &str, access: &AccessControl) -> RestResult {
        if Self::first_token_is_empty(path) {
            return RestResult::method_not_allowed("cannot POST to the root of a resource");
        }
        let mut txn = self.transaction();
        let result = post_json(txn.object_mut(), path, body, access);
        if !result.is_ok() {
            txn.abort();
            return result;
        }
        let committed = txn.commit();
        if committed.is_ok() {
            result
        } else {
            committed
        }
    }

    /// PATCH at `path`.
    pub fn rest_patch(&self, path: &str, body: &str, access: &AccessControl) -> RestResult {
        {
            let guard = self.lock();
            if access.level() < guard.borrow().can_update {
                return RestResult::forbidden();
            }
        }
        let mut txn = self.transaction();
        let result = patch_json(txn.object_mut(), path, body, access);
        if !result.is_ok() {
            txn.abort();
            return result;
        }
        let committed = txn.commit();
        if committed.is_ok() {
            result
        } else {
            committed
        }
    }

    /// PUT at `path`.
    pub fn rest_put(&self, path: &str, body: &str, access: &AccessControl) -> RestResult {
        {
            let guard = self.lock();
            if access.level() < guard.borrow().can_update {
                return RestResult::forbidden();
            }
        }
        let mut txn = self.transaction();
        let result = put_json(txn.object_mut(), path, body, access);
        if !result.is_ok() {
            txn.abort();
            return result;
        }
        let committed = txn.commit();
        if committed.is_ok() {
            result
        } else {
            committed
        }
    }

    /// DELETE at `path`; the resource itself cannot be deleted.
    pub fn rest_delete(&self, path: &str, access: &AccessControl) -> RestResult {
        if Self::first_token_is_empty(path) {
            return RestResult::method_not_allowed("cannot DELETE a permanent resource");
        }
        let mut txn = self.transaction();
        let result = rest_delete(txn.object_mut(), path, access);
        if !result.is_ok() {
            txn.abort();
            return result;
        }
        let committed = txn.commit();
        if committed.is_ok() {
            result
        } else {
            committed
        }
    }

    /// Restore persisted JSON state (PUT at root access).
    pub fn restore(&self, json: &str) -> bool {
        self.rest_put("/", json, &AccessControl::root()).is_ok()
    }

    /// Path completions below this resource.
    #[must_use]
    pub fn search_paths(
        &self,
        prefix: &str,
        level: AccessLevel,
        permission: Permission,
        max: usize,
    ) -> Vec<String> {
        self.read(|object| arbor_rest::search_paths(object, prefix, level, permission, max))
    }
}

impl std::fmt::Debug for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resource")
            .field("name", &self.shared.name)
            .finish_non_exhaustive()
    }
}

/// A scoped edit of a resource: holds the root lock and a scratch copy.
pub struct Transaction<'a> {
    resource: &'a Resource,
    guard: ReentrantMutexGuard<'a, RefCell<ResourceState>>,
    scratch: Option<Object>,
}

impl Transaction<'_> {
    /// The proposed state.
    #[must_use]
    pub fn object(&self) -> &Object {
        self.scratch.as_ref().expect("transaction is active")
    }

    /// The proposed state, writable.
    #[must_use]
    pub fn object_mut(&mut self) -> &mut Object {
        self.scratch.as_mut().expect("transaction is active")
    }

    /// Discard the scratch without touching the live object.
    pub fn abort(mut self) {
        self.scratch = None;
    }

    /// Validate, move the scratch into the live object, publish one
    /// notification with the accumulated change mask and clear the change
    /// markers. A validator failure aborts with 400 and the validator's
    /// message, leaving the live object untouched.
    pub fn commit(mut self) -> RestResult {
        let Some(mut scratch) = self.scratch.take() else {
            return RestResult::ok();
        };
        if !scratch.is_any_changed() {
            return RestResult::ok();
        }

        let (validators, current): (Vec<Validator>, Object) = {
            let state = self.guard.borrow();
            (
                state.validators.values().cloned().collect(),
                state.object.clone(),
            )
        };
        let mut validation = Validation::new(&mut scratch, Some(&current), false, false);
        if let Err(message) = run_validators(&validators, &mut validation) {
            tracing::debug!(resource = %self.resource.name(), %message, "validator rejected commit");
            return RestResult::bad_request(message);
        }

        let (notification, subscribers) = {
            let mut state = self.guard.borrow_mut();
            if let Err(error) = state.object.transfer(scratch) {
                return RestResult::internal(error.to_string());
            }
            let changes = state.object.changes();
            let snapshot = state.object.clone();
            state.object.clear_change_markers();
            let subscribers: Vec<SubscriberEntry> =
                state.subscribers.values().cloned().collect();
            (Notification::new(snapshot, changes), subscribers)
        };
        tracing::debug!(resource = %self.resource.name(), "commit published");
        dispatch_to_subscribers(&notification, &subscribers, &self.resource.subscriber_fetch());
        RestResult::ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_core::Field;
    use http::StatusCode;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn config_type() -> Arc<RecordType> {
        RecordType::builder("Config")
            .field(Field::signed("limit", 4))
            .field(Field::string("name", 32))
            .field(Field::bool("enabled"))
            .build()
            .unwrap()
    }

    fn resource() -> Resource {
        Resource::new("config", &config_type())
    }

    #[test]
    fn transaction_commit_replaces_live_object() {
        let res = resource();
        let mut txn = res.transaction();
        txn.object_mut().set(1, 5i64).unwrap();
        assert!(txn.commit().is_ok());
        assert_eq!(res.read(|o| o.i64_value(1)), Some(5));
    }

    #[test]
    fn abort_leaves_live_object_untouched() {
        let res = resource();
        let mut txn = res.transaction();
        txn.object_mut().set(1, 5i64).unwrap();
        txn.abort();
        assert_eq!(res.read(|o| o.i64_value(1)), None);
    }

    #[test]
    fn dropping_a_transaction_aborts() {
        let res = resource();
        {
            let mut txn = res.transaction();
            txn.object_mut().set(1, 5i64).unwrap();
        }
        assert_eq!(res.read(|o| o.i64_value(1)), None);
    }

    #[test]
    fn validator_veto_keeps_state_and_message() {
        let res = resource();
        let _guard = res.validate_with(|v| {
            if v.object().i64_value(1).is_some_and(|n| n > 10) {
                Err("limit too high".to_owned())
            } else {
                Ok(())
            }
        });

        let before = res.snapshot();
        let result = res.rest_patch("/limit", "99", &AccessControl::root());
        assert_eq!(result.status(), StatusCode::BAD_REQUEST);
        assert_eq!(result.detail(), "limit too high");
        assert!(res.snapshot() == before, "live state must be untouched");

        assert!(res.rest_patch("/limit", "7", &AccessControl::root()).is_ok());
        assert_eq!(res.read(|o| o.i64_value(1)), Some(7));
    }

    #[test]
    fn validators_run_in_insertion_order_first_failure_wins() {
        let res = resource();
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let o1 = Arc::clone(&order);
        let _a = res.validate_with(move |_| {
            o1.lock().push(1);
            Ok(())
        });
        let o2 = Arc::clone(&order);
        let _b = res.validate_with(move |_| {
            o2.lock().push(2);
            Err("second says no".to_owned())
        });
        let o3 = Arc::clone(&order);
        let _c = res.validate_with(move |_| {
            o3.lock().push(3);
            Ok(())
        });

        let result = res.rest_patch("/limit", "1", &AccessControl::root());
        assert_eq!(result.detail(), "second says no");
        assert_eq!(*order.lock(), [1, 2]);
    }

    #[test]
    fn validators_can_fix_up_the_proposed_state() {
        let res = resource();
        let _guard = res.validate_with(|v| {
            if !v.object().is_touched(3) {
                v.object_mut().set(3, true).unwrap();
            }
            Ok(())
        });
        assert!(res.rest_patch("/limit", "1", &AccessControl::root()).is_ok());
        assert_eq!(res.read(|o| o.u64_value(3)), Some(1));
    }

    #[test]
    fn commit_publishes_once_with_change_mask() {
        let res = resource();
        let notifications = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let seen = Arc::clone(&notifications);
        let _sub = res.on_change(move |n| seen.lock().push(*n.changes()));

        res.edit(|o| {
            o.set(1, 5i64).unwrap();
            o.set_string(2, "x").unwrap();
        });

        let seen = notifications.lock();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].changed(1));
        assert!(seen[0].changed(2));
        assert!(!seen[0].changed(3));
    }

    #[test]
    fn change_markers_cleared_after_publish() {
        let res = resource();
        res.edit(|o| {
            o.set(1, 5i64).unwrap();
        });
        assert!(!res.read(arbor_core::Object::is_any_changed));
    }

    #[test]
    fn filtered_subscription_only_sees_matching_changes() {
        let res = resource();
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&hits);
        let mut filter = FieldMask::new();
        filter.set_changed(2, true);
        let _sub = res.on_change_via(filter, &NotifyQueue::immediate(), move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        res.edit(|o| {
            o.set(1, 5i64).unwrap();
        });
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        res.edit(|o| {
            o.set_string(2, "now").unwrap();
        });
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn queued_subscribers_coalesce_per_queue() {
        let res = resource();
        let queue = NotifyQueue::bounded("workers", 8);
        let hits = Arc::new(AtomicUsize::new(0));
        let h1 = Arc::clone(&hits);
        let h2 = Arc::clone(&hits);
        let _a = res.on_change_via(FieldMask::for_all_changes(), &queue, move |_| {
            h1.fetch_add(1, Ordering::SeqCst);
        });
        let _b = res.on_change_via(FieldMask::for_all_changes(), &queue, move |_| {
            h2.fetch_add(1, Ordering::SeqCst);
        });

        res.edit(|o| {
            o.set(1, 1i64).unwrap();
        });

        // One coalescing job was queued for both subscribers.
        assert_eq!(queue.pending(), 1);
        assert!(queue.process(Duration::ZERO));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn dropping_the_handle_unsubscribes() {
        let res = resource();
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&hits);
        let sub = res.on_change(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(res.subscriber_count(), 1);
        drop(sub);
        assert_eq!(res.subscriber_count(), 0);

        res.edit(|o| {
            o.set(1, 1i64).unwrap();
        });
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn immediate_subscriber_may_read_back() {
        // Re-entrant lock: reading the resource from inside an immediate
        // callback must not deadlock.
        let res = resource();
        let observed = Arc::new(parking_lot::Mutex::new(None));
        let seen = Arc::clone(&observed);
        let reader = res.clone();
        let _sub = res.on_change(move |_| {
            *seen.lock() = reader.read(|o| o.i64_value(1));
        });

        res.edit(|o| {
            o.set(1, 41i64).unwrap();
        });
        assert_eq!(*observed.lock(), Some(41));
    }

    #[test]
    fn rest_verbs_respect_resource_access() {
        let res = Resource::with_access("locked", &config_type(), AccessLevel::Admin);
        let public = AccessControl::new(AccessLevel::Public);
        assert_eq!(
            res.rest_get("/", &public).unwrap_err().status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            res.rest_patch("/limit", "1", &public).status(),
            StatusCode::FORBIDDEN
        );

        let admin = AccessControl::new(AccessLevel::Admin);
        assert!(res.rest_patch("/limit", "1", &admin).is_ok());
        assert!(res.rest_get("/", &admin).is_ok());
    }

    #[test]
    fn post_and_delete_on_root_are_405() {
        let res = resource();
        let access = AccessControl::root();
        assert_eq!(
            res.rest_post("/", "{}", &access).status(),
            StatusCode::METHOD_NOT_ALLOWED
        );
        assert_eq!(
            res.rest_delete("/", &access).status(),
            StatusCode::METHOD_NOT_ALLOWED
        );
    }

    #[test]
    fn restore_puts_at_root_access() {
        let res = resource();
        assert!(res.restore(r#"{"limit":3,"name":"saved"}"#));
        assert_eq!(res.read(|o| o.i64_value(1)), Some(3));
    }
}
