use std::{
    collections::HashMap,
    future::Future,
    sync::{Arc, Mutex},
};

use tokio::sync::OnceCell;

type Slot = Arc<OnceCell<Arc<str>>>;

/// Remembers the anonymized form of every title for the lifetime of the process.
///
/// Each title gets its own slot. The map lock is only held while a slot is looked up or
/// inserted, the computation itself runs on the slot, so a slow model call for one title
/// never blocks lookups for another. Concurrent callers asking for the same title wait on the
/// same slot and share the first result.
#[derive(Default)]
pub struct AnonymizationCache {
    slots: Mutex<HashMap<Arc<str>, Slot>>,
}

impl AnonymizationCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, raw_title: &str) -> Slot {
        // A poisoned map still holds valid slots, nothing is left half-written in it.
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(slot) = slots.get(raw_title) {
            return slot.clone();
        }
        let slot = Slot::default();
        slots.insert(raw_title.into(), slot.clone());
        slot
    }

    pub async fn get_or_compute<F, Fut>(&self, raw_title: &str, compute: F) -> Arc<str>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = String>,
    {
        let slot = self.slot(raw_title);
        slot.get_or_init(|| async move { Arc::from(compute().await) })
            .await
            .clone()
    }

    pub fn get(&self, raw_title: &str) -> Option<Arc<str>> {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.get(raw_title).and_then(|slot| slot.get().cloned())
    }

    pub fn len(&self) -> usize {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.values().filter(|slot| slot.initialized()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
