//! Feature data model, the authoritative store and its GeoJSON codec.
//!
//! ## Data Flow
//!
//! ```text
//! operations ──> FeatureStore ──outbox──> publish_feature_changes ──> Events<FeatureChanged>
//!                    │                                                  │
//!                    └── snapshot(kind) ──> persistence / export          ├─> mesh lifecycle
//!                                                                        └─> RPC notifications
//! ```

/// GeoJSON `FeatureCollection` import and export.
pub mod collection;

/// Feature identity, kinds, geometry, properties and validation.
pub mod model;

/// Per-kind collections, mutation API and change events.
pub mod store;
