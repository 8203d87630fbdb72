//! Local persistence: a TTL key/value store and the city cache built on it.

pub mod backing;
mod city;
mod store;

pub use backing::FileBacking;
#[cfg(test)]
pub use backing::MemoryBacking;
pub use city::{CityDataCache, NAMESPACE};
pub use store::TtlStore;
