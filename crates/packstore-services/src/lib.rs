//! Packstore services
//!
//! Orchestration on top of the storage adapters: the AIP import pipeline,
//! the compressed-package access layer, the availability/retrieval
//! orchestrator, and the checksum/bag/compression utilities they share.

pub mod access;
pub mod bag;
pub mod checksum;
pub mod compression;
pub mod import;
pub mod recall;
pub mod test_helpers;

pub use access::{Fetch, PackageAccessService};
pub use bag::BagInfo;
pub use import::{AipImportService, ImportOutcome, ImportRequest};
pub use recall::{Retrieval, RetrievalOrchestrator};
