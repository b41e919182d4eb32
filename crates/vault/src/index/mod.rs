//! Optional metadata index used for orientation-filtered random sampling.
//!
//! The index is a relational table `images(filepath, filename, width, height)`
//! maintained outside this service. The gateway only reads from it: it asks
//! for one random row matching an [`Orientation`] and then serves that file
//! from storage.

pub mod mysql;

pub use mysql::MySqlIndex;

use async_trait::async_trait;
use thiserror::Error;

/// Errors produced by the index layer.
#[derive(Debug, Error)]
pub enum IndexError {
    /// The query or connection failed.
    #[error("index query failed: {0}")]
    Query(String),
}

/// Aspect-ratio filter for random sampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    /// Taller than wide.
    Vertical,
    /// Wider than tall.
    Horizontal,
    /// Equal width and height.
    Square,
    /// No constraint.
    Any,
}

impl Orientation {
    /// Parse the `ratio` query parameter. Unknown values mean [`Orientation::Any`].
    pub fn parse(raw: &str) -> Self {
        match raw {
            "v" | "vertical" => Orientation::Vertical,
            "h" | "horizontal" => Orientation::Horizontal,
            "s" | "square" => Orientation::Square,
            _ => Orientation::Any,
        }
    }

    /// SQL predicate selecting rows of this orientation.
    pub fn predicate(self) -> &'static str {
        match self {
            Orientation::Vertical => "height > width",
            Orientation::Horizontal => "width > height",
            Orientation::Square => "width = height",
            Orientation::Any => "1=1",
        }
    }
}

/// One row of the index: where a file lives relative to the storage root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedImage {
    pub filepath: String,
    pub filename: String,
}

/// Read-only view of the image metadata table.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ImageIndex: Send + Sync {
    /// Pick one row uniformly at random among those matching `orientation`.
    async fn random(&self, orientation: Orientation) -> Result<Option<IndexedImage>, IndexError>;

    /// Check that the index is reachable.
    async fn ping(&self) -> Result<(), IndexError>;
}
