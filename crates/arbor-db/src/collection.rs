//! Collections: ordered, id-keyed containers of homogeneous objects.
//!
//! A collection serialises as a JSON object map keyed by decimal id and
//! answers REST on `/id[/path]`. Element writes are transactional (clone,
//! validate, swap, publish) exactly like resource commits; creations and
//! deletions publish notifications whose `is_new`/`is_deleted` flags are
//! derived from the id field's change bit.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::sync::Arc;

use arbor_core::id::generate_id;
use arbor_core::{AccessLevel, FieldMask, Object, ObjectId, RecordType, ID_FIELD_INDEX};
use arbor_rest::{
    get_json, patch_json, post_json, put_json, rest_delete, AccessControl, Permission, RestResult,
};
use http::StatusCode;
use parking_lot::{ReentrantMutex, ReentrantMutexGuard};

use crate::pubsub::{
    dispatch_to_subscribers, id_filter, Notification, SubscriberEntry, SubscriberFetch,
    SubscriptionHandle,
};
use crate::queue::NotifyQueue;
use crate::validate::{run_validators, Validation, ValidationResult, Validator};

struct CollectionState {
    entries: BTreeMap<ObjectId, Object>,
    subscribers: BTreeMap<u64, SubscriberEntry>,
    validators: BTreeMap<u64, Validator>,
    next_token: u64,
    can_read: AccessLevel,
    can_update: AccessLevel,
    can_create: AccessLevel,
    can_delete: AccessLevel,
}

struct CollectionShared {
    name: String,
    rtype: Arc<RecordType>,
    state: ReentrantMutex<RefCell<CollectionState>>,
}

/// An id-keyed container of objects of one record type.
///
/// `Collection` is a cheap-to-clone handle; all clones share the same
/// state and lock.
#[derive(Clone)]
pub struct Collection {
    shared: Arc<CollectionShared>,
}

impl Collection {
    /// Create an empty collection.
    #[must_use]
    pub fn new(name: impl Into<String>, rtype: &Arc<RecordType>) -> Self {
        Self::with_access(name, rtype, AccessLevel::Public)
    }

    /// Create a collection requiring `level` for every verb.
    #[must_use]
    pub fn with_access(
        name: impl Into<String>,
        rtype: &Arc<RecordType>,
        level: AccessLevel,
    ) -> Self {
        Self {
            shared: Arc::new(CollectionShared {
                name: name.into(),
                rtype: Arc::clone(rtype),
                state: ReentrantMutex::new(RefCell::new(CollectionState {
                    entries: BTreeMap::new(),
                    subscribers: BTreeMap::new(),
                    validators: BTreeMap::new(),
                    next_token: 0,
                    can_read: level,
                    can_update: level,
                    can_create: level,
                    can_delete: level,
                })),
            }),
        }
    }

    /// Collection name (its path token inside a database).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Record type of the elements.
    #[must_use]
    pub fn record_type(&self) -> &Arc<RecordType> {
        &self.shared.rtype
    }

    fn lock(&self) -> ReentrantMutexGuard<'_, RefCell<CollectionState>> {
        self.shared.state.lock()
    }

    /// Minimum level required to read.
    #[must_use]
    pub fn read_level(&self) -> AccessLevel {
        self.lock().borrow().can_read
    }

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().borrow().entries.len()
    }

    /// True when the collection has no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when an element with `id` exists.
    #[must_use]
    pub fn contains(&self, id: ObjectId) -> bool {
        self.lock().borrow().entries.contains_key(&id)
    }

    /// Element ids in ascending order.
    #[must_use]
    pub fn ids(&self) -> Vec<ObjectId> {
        self.lock().borrow().entries.keys().copied().collect()
    }

    /// Run `f` against the element with `id`.
    pub fn read<R>(&self, id: ObjectId, f: impl FnOnce(&Object) -> R) -> Option<R> {
        let guard = self.lock();
        let state = guard.borrow();
        state.entries.get(&id).map(f)
    }

    /// Run `f` for each element in id order.
    pub fn for_each(&self, mut f: impl FnMut(&Object)) {
        let guard = self.lock();
        let state = guard.borrow();
        for object in state.entries.values() {
            f(object);
        }
    }

    // ---- creation, editing and deletion ---------------------------------

    /// Create an element with a generated id; `f` seeds its fields before
    /// the validators run.
    ///
    /// # Errors
    ///
    /// The failing [`RestResult`] when a validator rejects the element.
    pub fn create_with(&self, f: impl FnOnce(&mut Object)) -> Result<ObjectId, RestResult> {
        self.create_element(generate_id(), f)
    }

    /// Create an empty element with a generated id.
    ///
    /// # Errors
    ///
    /// The failing [`RestResult`] when a validator rejects the element.
    pub fn create(&self) -> Result<ObjectId, RestResult> {
        self.create_with(|_| {})
    }

    fn create_element(
        &self,
        id: ObjectId,
        f: impl FnOnce(&mut Object),
    ) -> Result<ObjectId, RestResult> {
        let guard = self.lock();
        if guard.borrow().entries.contains_key(&id) {
            return Err(RestResult::with_detail(
                StatusCode::CONFLICT,
                format!("id {id} already exists in '{}'", self.name()),
            ));
        }
        let mut object = Object::new(&self.shared.rtype);
        object.assign_id(id);
        f(&mut object);
        let committed = self.commit_element(&guard, id, object, None, true);
        if committed.is_ok() {
            Ok(id)
        } else {
            Err(committed)
        }
    }

    /// Transactionally edit the element with `id`: clone, mutate,
    /// validate, swap and publish.
    pub fn edit(&self, id: ObjectId, f: impl FnOnce(&mut Object)) -> RestResult {
        let guard = self.lock();
        let Some(current) = guard.borrow().entries.get(&id).cloned() else {
            return RestResult::not_found();
        };
        let mut scratch = current.clone();
        f(&mut scratch);
        self.commit_element(&guard, id, scratch, Some(current), false)
    }

    /// Validate and store one element, then publish its change mask.
    /// The caller holds the collection lock with no outstanding borrow.
    fn commit_element(
        &self,
        guard: &ReentrantMutexGuard<'_, RefCell<CollectionState>>,
        id: ObjectId,
        mut scratch: Object,
        current: Option<Object>,
        is_new: bool,
    ) -> RestResult {
        if !is_new && !scratch.is_any_changed() {
            return RestResult::ok();
        }
        let validators: Vec<Validator> = guard.borrow().validators.values().cloned().collect();
        let mut validation = Validation::new(&mut scratch, current.as_ref(), is_new, false);
        if let Err(message) = run_validators(&validators, &mut validation) {
            tracing::debug!(collection = %self.name(), %message, "validator rejected element");
            return RestResult::bad_request(message);
        }

        let changes = scratch.changes();
        let snapshot = scratch.clone();
        let subscribers: Vec<SubscriberEntry> = {
            let mut state = guard.borrow_mut();
            scratch.clear_change_markers();
            state.entries.insert(id, scratch);
            state.subscribers.values().cloned().collect()
        };
        let notification = Notification::new(snapshot, changes);
        dispatch_to_subscribers(&notification, &subscribers, &self.subscriber_fetch());
        RestResult::ok()
    }

    /// Delete the element with `id`, publishing a deletion notification.
    /// Returns whether an element was removed.
    pub fn delete(&self, id: ObjectId) -> bool {
        let guard = self.lock();
        let removed = guard.borrow_mut().entries.remove(&id);
        let Some(mut removed) = removed else {
            return false;
        };
        removed.clear_touch_markers();
        let changes = removed.changes();
        let subscribers: Vec<SubscriberEntry> =
            guard.borrow().subscribers.values().cloned().collect();
        tracing::debug!(collection = %self.name(), id, "element deleted");
        let notification = Notification::new(removed, changes);
        dispatch_to_subscribers(&notification, &subscribers, &self.subscriber_fetch());
        true
    }

    // ---- validation and pub/sub ------------------------------------------

    /// Register an element validator.
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

    /// Subscribe to element changes matching `filter` on `queue`.
    pub fn on_change_via(
        &self,
        filter: FieldMask,
        queue: &NotifyQueue,
        callback: impl Fn(&Notification) + Send + Sync + 'static,
    ) -> SubscriptionHandle {
        self.subscribe(filter, queue, callback)
    }

    /// Subscribe to any element change, dispatched inline.
    pub fn on_change(
        &self,
        callback: impl Fn(&Notification) + Send + Sync + 'static,
    ) -> SubscriptionHandle {
        self.subscribe(FieldMask::for_all_changes(), &NotifyQueue::immediate(), callback)
    }

    /// Subscribe to element creations on `queue`.
    pub fn on_added_via(
        &self,
        queue: &NotifyQueue,
        callback: impl Fn(&Notification) + Send + Sync + 'static,
    ) -> SubscriptionHandle {
        self.subscribe(id_filter(), queue, move |notification| {
            if notification.is_new() {
                callback(notification);
            }
        })
    }

    /// Subscribe to element creations, dispatched inline.
    pub fn on_added(
        &self,
        callback: impl Fn(&Notification) + Send + Sync + 'static,
    ) -> SubscriptionHandle {
        self.on_added_via(&NotifyQueue::immediate(), callback)
    }

    /// Subscribe to element deletions on `queue`.
    pub fn on_deleted_via(
        &self,
        queue: &NotifyQueue,
        callback: impl Fn(&Notification) + Send + Sync + 'static,
    ) -> SubscriptionHandle {
        self.subscribe(id_filter(), queue, move |notification| {
            if notification.is_deleted() {
                callback(notification);
            }
        })
    }

    /// Subscribe to element deletions, dispatched inline.
    pub fn on_deleted(
        &self,
        callback: impl Fn(&Notification) + Send + Sync + 'static,
    ) -> SubscriptionHandle {
        self.on_deleted_via(&NotifyQueue::immediate(), callback)
    }

    /// Subscribe to all element changes; a non-empty path is not
    /// routable inside a collection.
    pub fn on_change_to_path(
        &self,
        path: &str,
        queue: &NotifyQueue,
        callback: impl Fn(&Notification) + Send + Sync + 'static,
    ) -> Option<SubscriptionHandle> {
        if path.trim_matches('/').is_empty() {
            Some(self.subscribe(FieldMask::for_all_changes(), queue, callback))
        } else {
            None
        }
    }

    /// Number of registered subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.lock().borrow().subscribers.len()
    }

    /// Drop all elements, subscribers and validators.
    pub fn clear_all_data_and_subscribers(&self) {
        let guard = self.lock();
        let mut state = guard.borrow_mut();
        state.entries.clear();
        state.subscribers.clear();
        state.validators.clear();
    }

    fn subscriber_fetch(&self) -> SubscriberFetch {
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

    fn split_path(path: &str) -> (Option<&str>, String) {
        let trimmed = path.trim_start_matches('/');
        match trimmed.split_once('/') {
            Some((first, rest)) => (Some(first).filter(|t| !t.is_empty()), format!("/{rest}")),
            None => (
                Some(trimmed).filter(|t| !t.is_empty()),
                String::new(),
            ),
        }
    }

    /// Resolve a collection path token (`id` or `*key=value`) to an id.
    fn resolve_element(&self, token: &str) -> Result<ObjectId, RestResult> {
        if let Some(search) = token.strip_prefix('*') {
            let Some((key, value)) = search.split_once('=') else {
                return Err(RestResult::bad_request("malformed search token"));
            };
            let Some(key_field) = self.shared.rtype.find_by_label(key).map(|f| f.index) else {
                return Err(RestResult::bad_request(format!("unknown search key: {key}")));
            };
            let guard = self.lock();
            let state = guard.borrow();
            return state
                .entries
                .values()
                .find(|o| o.string_value(key_field) == Some(value))
                .map(Object::id)
                .ok_or_else(RestResult::not_found);
        }
        let id: ObjectId = token
            .parse()
            .map_err(|_| RestResult::bad_request(format!("invalid id: {token}")))?;
        Ok(id)
    }

    /// GET at `path`: the whole collection as `{"<id>": {...}, ...}`, or
    /// an element (sub)path.
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
        let (first, rest) = Self::split_path(path);
        let Some(token) = first else {
            let mut body = String::from("{");
            let mut emitted = 0;
            for (id, object) in &state.entries {
                let element = get_json(object, "/", access)?;
                if emitted > 0 {
                    body.push(',');
                }
                emitted += 1;
                body.push_str(&format!("\"{id}\":{element}"));
            }
            body.push('}');
            return Ok(body);
        };
        drop(state);
        let id = self.resolve_element(token)?;
        let state = guard.borrow();
        let Some(object) = state.entries.get(&id) else {
            return Err(RestResult::not_found());
        };
        get_json(object, &rest, access)
    }

    /// POST: an empty path creates an element (decoding the body into
    /// it); `/id/...` posts into an element's arrays.
    pub fn rest_post(&self, path: &str, body: &str, access: &AccessControl) -> RestResult {
        let (first, rest) = Self::split_path(path);
        let Some(token) = first else {
            let guard = self.lock();
            if access.level() < guard.borrow().can_create {
                return RestResult::forbidden();
            }
            let id = generate_id();
            if guard.borrow().entries.contains_key(&id) {
                return RestResult::with_detail(StatusCode::CONFLICT, "id collision");
            }
            let mut object = Object::new(&self.shared.rtype);
            object.assign_id(id);
            let result = patch_json(&mut object, "/", body, access);
            if !result.is_ok() {
                return result;
            }
            object.mark_field_changed(ID_FIELD_INDEX, true);
            let committed = self.commit_element(&guard, id, object, None, true);
            return if committed.is_ok() {
                RestResult::created(id)
            } else {
                committed
            };
        };
        let id = match self.resolve_element(token) {
            Ok(id) => id,
            Err(error) => return error,
        };
        {
            let guard = self.lock();
            if access.level() < guard.borrow().can_update {
                return RestResult::forbidden();
            }
        }
        self.with_element(id, |scratch| post_json(scratch, &rest, body, access))
    }

    /// PATCH `/id[/path]`.
    pub fn rest_patch(&self, path: &str, body: &str, access: &AccessControl) -> RestResult {
        let (first, rest) = Self::split_path(path);
        let Some(token) = first else {
            return RestResult::method_not_allowed("cannot PATCH a collection");
        };
        let id = match self.resolve_element(token) {
            Ok(id) => id,
            Err(error) => return error,
        };
        {
            let guard = self.lock();
            if access.level() < guard.borrow().can_update {
                return RestResult::forbidden();
            }
        }
        self.with_element(id, |scratch| patch_json(scratch, &rest, body, access))
    }

    /// PUT `/id[/path]`; PUT to a missing id creates the element, which is
    /// how persisted state is restored.
    pub fn rest_put(&self, path: &str, body: &str, access: &AccessControl) -> RestResult {
        let (first, rest) = Self::split_path(path);
        let Some(token) = first else {
            return RestResult::method_not_allowed("cannot PUT a collection");
        };
        let id = match self.resolve_element(token) {
            Ok(id) => id,
            Err(error) => return error,
        };
        {
            let guard = self.lock();
            if access.level() < guard.borrow().can_update {
                return RestResult::forbidden();
            }
        }
        if rest.trim_matches('/').is_empty() && !self.contains(id) {
            let guard = self.lock();
            if access.level() < guard.borrow().can_create {
                return RestResult::forbidden();
            }
            let mut object = Object::new(&self.shared.rtype);
            object.assign_id(id);
            let result = put_json(&mut object, "/", body, access);
            if !result.is_ok() {
                return result;
            }
            object.mark_field_changed(ID_FIELD_INDEX, true);
            let committed = self.commit_element(&guard, id, object, None, true);
            return if committed.is_ok() {
                RestResult::created(id)
            } else {
                committed
            };
        }
        self.with_element(id, |scratch| put_json(scratch, &rest, body, access))
    }

    /// DELETE `/id` removes the element; `/id/path` deletes inside it.
    pub fn rest_delete(&self, path: &str, access: &AccessControl) -> RestResult {
        let (first, rest) = Self::split_path(path);
        let Some(token) = first else {
            return RestResult::method_not_allowed("cannot DELETE a collection");
        };
        let id = match self.resolve_element(token) {
            Ok(id) => id,
            Err(error) => return error,
        };
        if rest.trim_matches('/').is_empty() {
            {
                let guard = self.lock();
                if access.level() < guard.borrow().can_delete {
                    return RestResult::forbidden();
                }
            }
            if self.delete(id) {
                RestResult::ok()
            } else {
                RestResult::not_found()
            }
        } else {
            {
                let guard = self.lock();
                if access.level() < guard.borrow().can_update {
                    return RestResult::forbidden();
                }
            }
            self.with_element(id, |scratch| rest_delete(scratch, &rest, access))
        }
    }

    /// Restore one persisted element (PUT at root access).
    pub fn restore(&self, path: &str, json: &str) -> bool {
        self.rest_put(path, json, &AccessControl::root()).is_ok()
    }

    /// Transactional element edit driven by a REST closure.
    fn with_element(&self, id: ObjectId, f: impl FnOnce(&mut Object) -> RestResult) -> RestResult {
        let guard = self.lock();
        let Some(current) = guard.borrow().entries.get(&id).cloned() else {
            return RestResult::not_found();
        };
        let mut scratch = current.clone();
        let result = f(&mut scratch);
        if !result.is_ok() {
            return result;
        }
        let committed = self.commit_element(&guard, id, scratch, Some(current), false);
        if committed.is_ok() {
            result
        } else {
            committed
        }
    }

    /// Path completions: ids at the first level, element completions
    /// below.
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
        let Some(token) = first else {
            return self
                .ids()
                .into_iter()
                .map(|id| format!("/{id}"))
                .take(max)
                .collect();
        };
        if rest.is_empty() && !prefix.ends_with('/') {
            return self
                .ids()
                .into_iter()
                .map(|id| id.to_string())
                .filter(|id| id.starts_with(token))
                .map(|id| format!("/{id}"))
                .take(max)
                .collect();
        }
        let Ok(id) = self.resolve_element(token) else {
            return Vec::new();
        };
        self.read(id, |object| {
            arbor_rest::search_paths(object, &rest, level, permission, max)
                .into_iter()
                .map(|path| format!("/{id}{path}"))
                .collect()
        })
        .unwrap_or_default()
    }
}

impl std::fmt::Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.shared.name)
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}
