//! Error types shared by every overlay subsystem.

use serde::Serialize;
use thiserror::Error;

use crate::engine::features::model::FeatureId;

/// Errors reported by overlay operations.
///
/// Every operation is all-or-nothing: when one of these is returned the
/// feature store and the scene graph are unchanged, with the exception of
/// `PersistenceFailure`, which is reported after the in-memory mutation has
/// already been committed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OverlayError {
    /// Unclosed or degenerate ring, non-positive dimension, bad segment count
    /// or an out-of-range property value.
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    /// The placement point collides with an already rendered feature.
    #[error("location is occupied by {count} rendered feature(s)")]
    OccupiedLocation { count: usize },

    /// A feature with this id already exists.
    #[error("feature id already exists: {0}")]
    DuplicateId(FeatureId),

    /// No feature with this id exists.
    #[error("unknown feature: {0}")]
    UnknownFeature(FeatureId),

    /// The persistence adapter failed to read or write a snapshot.
    #[error("persistence failure: {0}")]
    PersistenceFailure(String),

    /// The import document could not be parsed or validated.
    #[error("failed to import feature collection: {0}")]
    ImportParseFailure(String),

    /// Geometry for a stored feature could not be built.
    #[error("failed to build mesh for {id}: {reason}")]
    MeshBuildFailure { id: FeatureId, reason: String },
}

/// Discriminant of `OverlayError`, used in notifications and RPC payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidGeometry,
    OccupiedLocation,
    DuplicateId,
    UnknownFeature,
    PersistenceFailure,
    ImportParseFailure,
    MeshBuildFailure,
}

impl OverlayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidGeometry(_) => ErrorKind::InvalidGeometry,
            Self::OccupiedLocation { .. } => ErrorKind::OccupiedLocation,
            Self::DuplicateId(_) => ErrorKind::DuplicateId,
            Self::UnknownFeature(_) => ErrorKind::UnknownFeature,
            Self::PersistenceFailure(_) => ErrorKind::PersistenceFailure,
            Self::ImportParseFailure(_) => ErrorKind::ImportParseFailure,
            Self::MeshBuildFailure { .. } => ErrorKind::MeshBuildFailure,
        }
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidGeometry(message.into())
    }
}

pub type OverlayResult<T> = Result<T, OverlayError>;
