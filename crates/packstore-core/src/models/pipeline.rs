use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A processing system that produces packages. Referenced by packages as
/// their origin; the import pipeline falls back to an arbitrary existing
/// pipeline when none is supplied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    pub uuid: Uuid,
    pub description: Option<String>,
}
