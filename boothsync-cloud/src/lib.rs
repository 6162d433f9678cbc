//! Remote object stores for boothsync.
//!
//! The sync engine treats the shared store as a flat blob namespace
//! addressed by slash-delimited string keys, with eventual consistency and
//! no multi-key transactions. [`RemoteObjectStore`] is that contract;
//! implementations cover S3-compatible buckets, a plain directory (network
//! share or test fixture) and an in-memory map.

mod error;
mod fs;
mod memory;
mod s3;
mod store;

pub use error::{CloudError, CloudResult};
pub use fs::FsObjectStore;
pub use memory::MemoryObjectStore;
pub use s3::{S3Config, S3ObjectStore};
pub use store::RemoteObjectStore;
