//! Packstore storage backends
//!
//! The `StorageAdapter` trait gives every backend the same move-in/move-out
//! contract while letting each keep its own latency and availability
//! semantics: the local filesystem copies synchronously, the tape tier
//! answers "pending" until a recall lands, the replicated object store
//! transfers with end-to-end checksums.
//!
//! Backend selection is an explicit tag on the Space configuration; the
//! factory maps it to an adapter instance.

pub mod factory;
pub mod local;
pub mod object;
pub mod paths;
pub mod resolver;
pub mod tape;
pub mod traits;

mod fsutil;

pub use factory::{create_adapter, AdapterFactory, DefaultAdapterFactory};
pub use fsutil::tree_size;
pub use local::LocalFilesystemAdapter;
pub use object::ReplicatedObjectAdapter;
pub use resolver::{LocationId, LocationResolver, ResolvedLocation};
pub use tape::TieredTapeAdapter;
pub use traits::{
    PackageAvailability, StorageAdapter, StorageError, StorageResult, TransferOutcome,
};
