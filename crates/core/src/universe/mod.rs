pub mod query;
pub mod snapshot;
pub mod source;
pub mod store;
pub mod summary;
pub mod table;

pub use snapshot::UniverseSnapshot;
pub use store::UniverseStore;
