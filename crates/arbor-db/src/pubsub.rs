//! Publish/subscribe plumbing shared by resources and collections.
//!
//! A commit produces one [`Notification`] (object snapshot plus change
//! mask). Subscribers whose filter overlaps the change mask are invoked:
//! immediate-queue subscribers inline at the publish site, others through
//! one coalescing job per queue that rescans that queue's subscribers.

use std::sync::Arc;

use arbor_core::{FieldMask, Object, ObjectId, ID_FIELD_INDEX};

use crate::queue::NotifyQueue;

/// Snapshot of a committed change.
#[derive(Clone)]
pub struct Notification {
    object: Object,
    changes: FieldMask,
}

impl Notification {
    pub(crate) fn new(object: Object, changes: FieldMask) -> Self {
        Self { object, changes }
    }

    /// The object as of the commit.
    #[must_use]
    pub fn object(&self) -> &Object {
        &self.object
    }

    /// The accumulated change mask of the commit.
    #[must_use]
    pub fn changes(&self) -> &FieldMask {
        &self.changes
    }

    /// Id of the object.
    #[must_use]
    pub fn id(&self) -> ObjectId {
        self.object.id()
    }

    /// True when this commit created the object (id appeared).
    #[must_use]
    pub fn is_new(&self) -> bool {
        self.changes.changed(ID_FIELD_INDEX) && self.object.has_id()
    }

    /// True when this commit deleted the object (id disappeared).
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.changes.changed(ID_FIELD_INDEX) && !self.object.has_id()
    }
}

impl std::fmt::Debug for Notification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notification")
            .field("id", &self.id())
            .field("is_new", &self.is_new())
            .field("is_deleted", &self.is_deleted())
            .field("changes", &self.changes)
            .finish()
    }
}

/// Subscriber callback.
pub type Subscriber = Arc<dyn Fn(&Notification) + Send + Sync>;

/// One registered subscription.
#[derive(Clone)]
pub(crate) struct SubscriberEntry {
    pub filter: FieldMask,
    pub callback: Subscriber,
    pub queue: NotifyQueue,
}

/// Handle owning a subscription; dropping it (or calling
/// [`unsubscribe`](Self::unsubscribe)) removes the subscription.
pub struct SubscriptionHandle {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl SubscriptionHandle {
    pub(crate) fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Handle that does nothing (a failed subscription).
    #[must_use]
    pub fn empty() -> Self {
        Self { cancel: None }
    }

    /// True when the handle still owns a live subscription.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.cancel.is_some()
    }

    /// Remove the subscription now.
    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }

    /// Keep the subscription alive for the process lifetime, discarding
    /// the handle.
    pub fn detach(mut self) {
        self.cancel = None;
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("active", &self.is_active())
            .finish()
    }
}

/// Fetches the current subscriber table for a deferred dispatch.
pub(crate) type SubscriberFetch = Arc<dyn Fn() -> Vec<SubscriberEntry> + Send + Sync>;

/// Dispatch one notification: immediate subscribers inline, one
/// coalescing job per distinct queue otherwise.
pub(crate) fn dispatch_to_subscribers(
    notification: &Notification,
    subscribers: &[SubscriberEntry],
    fetch: &SubscriberFetch,
) {
    let mut queued: Vec<NotifyQueue> = Vec::new();
    for entry in subscribers {
        if !entry.filter.overlaps(notification.changes()) {
            continue;
        }
        if entry.queue.is_immediate() {
            (entry.callback)(notification);
        } else if !queued.iter().any(|queue| queue.same_queue(&entry.queue)) {
            queued.push(entry.queue.clone());
            let queue = entry.queue.clone();
            let fetch = Arc::clone(fetch);
            let notification = notification.clone();
            entry.queue.send(Box::new(move || {
                for entry in fetch() {
                    if entry.queue.same_queue(&queue)
                        && entry.filter.overlaps(notification.changes())
                    {
                        (entry.callback)(&notification);
                    }
                }
            }));
        }
    }
}

/// Filter matching additions and deletions (the id field).
#[must_use]
pub fn id_filter() -> FieldMask {
    FieldMask::for_fields([ID_FIELD_INDEX])
}
