use crate::universe::snapshot::UniverseSnapshot;
use arc_swap::ArcSwap;
use std::sync::Arc;

/// Shared handle to the current universe snapshot.
///
/// Readers take an `Arc` and keep it for the whole computation; a refresh stores a new
/// snapshot wholesale, so a reader sees either the old table or the new one, never a mix.
#[derive(Clone)]
pub struct UniverseStore {
    current: Arc<ArcSwap<UniverseSnapshot>>,
}

impl UniverseStore {
    pub fn new(snapshot: UniverseSnapshot) -> Self {
        Self {
            current: Arc::new(ArcSwap::from_pointee(snapshot)),
        }
    }

    pub fn snapshot(&self) -> Arc<UniverseSnapshot> {
        self.current.load_full()
    }

    /// Atomically replace the snapshot, returning the previous one.
    pub fn replace(&self, snapshot: UniverseSnapshot) -> Arc<UniverseSnapshot> {
        self.current.swap(Arc::new(snapshot))
    }
}

impl Default for UniverseStore {
    fn default() -> Self {
        Self::new(UniverseSnapshot::empty())
    }
}

impl std::fmt::Debug for UniverseStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snap = self.current.load();
        f.debug_struct("UniverseStore")
            .field("as_of_date", &snap.as_of_date())
            .field("stocks", &snap.len())
            .finish()
    }
}
