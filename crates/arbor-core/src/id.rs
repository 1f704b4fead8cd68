//! Object id generation.
//!
//! New array elements and root objects receive ids from the installed
//! [`IdGenerator`]. The default composes a second-resolution unix
//! timestamp (40 bits) with a wrap-around counter (24 bits), so ids are
//! unique within a process and sort roughly by creation time.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, RwLock};

use crate::schema::ObjectId;

/// Source of fresh object ids.
pub trait IdGenerator: Send + Sync {
    /// Produce the next id.
    fn next_id(&self) -> ObjectId;
}

/// Default generator: `(unix_seconds & 0xFF_FFFF_FFFF) << 24 | counter`.
#[derive(Debug, Default)]
pub struct TimestampIds {
    counter: AtomicU64,
}

impl IdGenerator for TimestampIds {
    fn next_id(&self) -> ObjectId {
        let counter = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        let now = chrono::Utc::now().timestamp();
        #[allow(clippy::cast_sign_loss)]
        let seconds = now as u64;
        ((seconds & 0xFF_FFFF_FFFF) << 24) | (counter & 0xFF_FFFF)
    }
}

/// Deterministic sequential generator, useful in tests.
#[derive(Debug, Default)]
pub struct SequentialIds {
    counter: AtomicU64,
}

impl SequentialIds {
    /// Start counting from `first`.
    #[must_use]
    pub fn starting_at(first: ObjectId) -> Self {
        Self {
            counter: AtomicU64::new(first.saturating_sub(1)),
        }
    }
}

impl IdGenerator for SequentialIds {
    fn next_id(&self) -> ObjectId {
        self.counter.fetch_add(1, Ordering::Relaxed) + 1
    }
}

fn generator() -> &'static RwLock<Arc<dyn IdGenerator>> {
    static GENERATOR: OnceLock<RwLock<Arc<dyn IdGenerator>>> = OnceLock::new();
    GENERATOR.get_or_init(|| RwLock::new(Arc::new(TimestampIds::default())))
}

/// Generate an id with the installed generator.
#[must_use]
pub fn generate_id() -> ObjectId {
    generator()
        .read()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
        .next_id()
}

/// Install a process-wide id generator, returning the previous one.
pub fn install_id_generator(new: Arc<dyn IdGenerator>) -> Arc<dyn IdGenerator> {
    let mut slot = generator()
        .write()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    std::mem::replace(&mut *slot, new)
}
