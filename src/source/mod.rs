//! Detection sources -- providers of raw (species, timestamp) observations.

pub mod directory;
pub mod memory;

pub use self::directory::DirectorySource;
pub use self::memory::StaticSource;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to read dataset at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("detection source unavailable: {0}")]
    Unavailable(String),

    #[error("scan task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// A single raw detection of a species.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionEvent {
    pub species: String,
    /// `None` when the event carries no timestamp of its own.
    pub observed_at: Option<DateTime<Utc>>,
}

impl DetectionEvent {
    pub fn new(species: impl Into<String>, observed_at: DateTime<Utc>) -> Self {
        Self {
            species: species.into(),
            observed_at: Some(observed_at),
        }
    }

    pub fn untimed(species: impl Into<String>) -> Self {
        Self {
            species: species.into(),
            observed_at: None,
        }
    }
}

/// Trait for everything that can enumerate detection events.
#[async_trait::async_trait]
pub trait DetectionSource: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Enumerate every known detection event.
    /// An empty or absent dataset is `Ok(vec![])`, not an error.
    async fn list_events(&self) -> Result<Vec<DetectionEvent>, SourceError>;

    /// Source-level observation time, used for events without their own timestamp.
    fn observed_at(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
