//! JSON-RPC 2.0 bridge between the overlay and the embedding page.
//!
//! The page drives the drawing UI, property panels and import/export
//! buttons; the overlay answers over `postMessage`.
//!
//! ## Message Flow
//!
//! ```text
//! Page (parent window)  <──postMessage──>  Overlay
//!        │                                     │
//!        ├─ Request (with ID) ───────────────> │ MessageQueue
//!        │                                     ├─ PreUpdate: parse
//!        │                                     │    ├─ reads answered at once
//!        │                                     │    └─ mutations -> PendingCommands
//!        │                                     ├─ PreUpdate: apply_pending_commands
//!        │ <──────────────── Response (ID) ────┤ Last: CommandCompleted
//!        │ <──────────── Notification (no ID) ─┤ Last: overlay events
//! ```
//!
//! ## Methods
//!
//! ### Interaction
//! - `set_interaction`: mode, kind, shape and placement dimensions
//! - `map_click`: `{ screen: [x, y], lng_lat: { lng, lat } }`
//! - `place_custom_ring`: `{ ring: [{ lng, lat }, ...] }`
//!
//! ### Features
//! - `place_feature`, `select_feature`, `rotate_feature`
//! - `update_feature`: `{ id, properties: { height?, base?, color?, rotation?, size?, content? } }`
//! - `delete_feature`, `clear_features`
//! - `import_features`: `{ kind, document }`, replaces every feature of `kind`
//! - `export_features`: `{ kind }`, answered immediately with the GeoJSON document
//!
//! ### Diagnostics
//! - `get_overlay_stats`: feature, mesh and animation counts
//! - `dismiss_notification`: `{ id }`
//!
//! ## Notifications
//!
//! - `feature_changed`: `{ id, kind, change, feature }` per store mutation
//! - `selection_changed`: `{ selected }`
//! - `overlay_notification`: `{ id, level, kind, message }` for failures and warnings
//!
//! ## Error Handling
//!
//! Standard JSON-RPC 2.0 error codes:
//! - `-32601`: Method not found
//! - `-32602`: Invalid params
//! - `-32603`: Internal error
//! - `-32000`: Operation failed, `data.kind` names the `OverlayError` kind

/// Request parsing, deferred command dispatch and outgoing messages.
pub mod web_rpc;
