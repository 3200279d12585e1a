//! Mutation API of the overlay.
//!
//! Every operation follows the same order:
//!
//! ```text
//! validate ──> FeatureStore mutation ──> persist touched kind(s) ──> run FeatureSync
//!    │ error                                  │ error
//!    └──> notification, Err, nothing changed  └──> warning, mutation kept
//! ```
//!
//! `FeatureSync` publishes the store outbox, lets the mesh lifecycle react
//! and refreshes the selection highlight, all before the operation returns.
//! Requests raised while a tick is running go through `PendingCommands` and
//! are applied at the start of the next tick.

use bevy::ecs::schedule::ScheduleLabel;
use bevy::ecs::system::SystemState;
use bevy::prelude::*;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::engine::features::collection::{export_collection_string, import_collection};
use crate::engine::features::model::{
    FeatureGeometry, FeatureId, FeatureKind, FeatureUpdate, GeographicFeature, PropertyPatch,
    signed_rotation_delta,
};
use crate::engine::features::store::{FeatureCollection, FeatureStore};
use crate::engine::geo::footprint::{normalize_rotation, rotate_ring};
use crate::engine::geo::transform::LngLat;
use crate::engine::host::HostHandle;
use crate::engine::notifications::{NotificationLevel, Notifications};
use crate::engine::persistence::persist_kind;
use crate::error::{OverlayError, OverlayResult};
use crate::tools::interaction::{InteractionState, InteractionUpdate, MapClick, handle_map_click, place_custom_ring};

/// Schedule run synchronously after each committed mutation.
#[derive(ScheduleLabel, Debug, Clone, PartialEq, Eq, Hash)]
pub struct FeatureSync;

/// Emitted whenever the selected feature changes.
#[derive(Event, Debug, Clone, PartialEq)]
pub struct SelectionChanged {
    pub selected: Option<FeatureId>,
}

/// Write an event from exclusive world access.
pub(crate) fn emit<E: Event>(world: &mut World, event: E) {
    let mut state = SystemState::<EventWriter<E>>::new(world);
    state.get_mut(world).write(event);
}

pub(crate) fn reject<T>(world: &mut World, error: OverlayError) -> OverlayResult<T> {
    warn!("Operation rejected: {}", error);
    world.resource_mut::<Notifications>().report(&error);
    Err(error)
}

fn commit(world: &mut World, kinds: &[FeatureKind]) {
    for kind in kinds {
        persist_kind(world, *kind);
    }
    world.run_schedule(FeatureSync);
}

/// Features currently rendered under `screen`, as reported by the host.
pub fn query_host(world: &World, screen: Vec2) -> Vec<String> {
    world
        .get_non_send_resource::<HostHandle>()
        .map(|host| host.0.query_rendered_features(screen))
        .unwrap_or_default()
}

/// Add `feature` to the store. With a `screen` position, placement is
/// refused if the host reports anything rendered there.
pub fn place_feature(world: &mut World, feature: GeographicFeature, screen: Option<Vec2>) -> OverlayResult<FeatureId> {
    if let Some(screen) = screen {
        let hits = query_host(world, screen);
        if !hits.is_empty() {
            return reject(world, OverlayError::OccupiedLocation { count: hits.len() });
        }
    }

    let (id, kind) = (feature.id.clone(), feature.kind);
    let added = world.resource_mut::<FeatureStore>().add(feature);
    if let Err(error) = added {
        return reject(world, error);
    }
    info!("Placed {} {}", kind.as_str(), id);
    commit(world, &[kind]);
    Ok(id)
}

/// Select a feature, or clear the selection with `None`.
pub fn select_feature(world: &mut World, id: Option<FeatureId>) -> OverlayResult<()> {
    if let Some(id) = &id {
        if !world.resource::<FeatureStore>().contains(id) {
            return reject(world, OverlayError::UnknownFeature(id.clone()));
        }
    }

    if world.resource::<InteractionState>().selected == id {
        return Ok(());
    }
    world.resource_mut::<InteractionState>().selected = id.clone();
    emit(world, SelectionChanged { selected: id });
    world.run_schedule(FeatureSync);
    Ok(())
}

/// Build the update that turns `feature` to the absolute bearing `rotation`,
/// rotating a polygon footprint by the same amount.
fn rotation_update(feature: &GeographicFeature, rotation: f64) -> OverlayResult<FeatureUpdate> {
    let rotation = normalize_rotation(rotation);
    let delta = signed_rotation_delta(feature.properties.rotation, rotation);
    let geometry = match &feature.geometry {
        FeatureGeometry::Polygon(ring) if delta != 0.0 => Some(FeatureGeometry::Polygon(rotate_ring(ring, delta)?)),
        _ => None,
    };
    Ok(FeatureUpdate {
        properties: PropertyPatch {
            rotation: Some(rotation),
            ..Default::default()
        },
        geometry,
    })
}

fn stored(world: &mut World, id: &FeatureId) -> OverlayResult<GeographicFeature> {
    let found = world.resource::<FeatureStore>().get(id).cloned();
    match found {
        Some(feature) => Ok(feature),
        None => reject(world, OverlayError::UnknownFeature(id.clone())),
    }
}

fn apply_update(world: &mut World, id: &FeatureId, update: FeatureUpdate) -> OverlayResult<GeographicFeature> {
    let Some(kind) = world.resource::<FeatureStore>().kind_of(id) else {
        return reject(world, OverlayError::UnknownFeature(id.clone()));
    };
    let updated = world.resource_mut::<FeatureStore>().update(id, update);
    if let Err(error) = updated {
        return reject(world, error);
    }
    commit(world, &[kind]);
    stored(world, id)
}

/// Turn a feature clockwise by `delta_deg`; returns the new bearing.
pub fn rotate_feature(world: &mut World, id: &FeatureId, delta_deg: f64) -> OverlayResult<f64> {
    if !delta_deg.is_finite() {
        return reject(world, OverlayError::invalid("rotation delta must be finite"));
    }
    let feature = stored(world, id)?;
    let target = feature.properties.rotation + delta_deg;
    let update = match rotation_update(&feature, target) {
        Ok(update) => update,
        Err(error) => return reject(world, error),
    };
    Ok(apply_update(world, id, update)?.properties.rotation)
}

/// Merge `patch` into a feature's properties. A new `rotation` is taken as
/// an absolute bearing and turns the footprint with it.
pub fn update_feature_properties(
    world: &mut World,
    id: &FeatureId,
    patch: PropertyPatch,
) -> OverlayResult<GeographicFeature> {
    let feature = stored(world, id)?;
    let mut update = FeatureUpdate::from(patch.clone());

    if let Some(rotation) = patch.rotation {
        if !rotation.is_finite() {
            return reject(world, OverlayError::invalid("rotation must be finite"));
        }
        match rotation_update(&feature, rotation) {
            Ok(rotated) => {
                update.properties.rotation = rotated.properties.rotation;
                update.geometry = rotated.geometry;
            }
            Err(error) => return reject(world, error),
        }
    }
    apply_update(world, id, update)
}

/// Remove a feature, its mesh and its animations.
pub fn delete_feature(world: &mut World, id: &FeatureId) -> OverlayResult<GeographicFeature> {
    let result = world.resource_mut::<FeatureStore>().remove(id);
    let removed = match result {
        Ok(removed) => removed,
        Err(error) => return reject(world, error),
    };
    info!("Deleted {} {}", removed.kind.as_str(), id);

    if world.resource::<InteractionState>().selected.as_ref() == Some(id) {
        world.resource_mut::<InteractionState>().selected = None;
        emit(world, SelectionChanged { selected: None });
    }
    commit(world, &[removed.kind]);
    Ok(removed)
}

fn drop_stale_selection(world: &mut World) {
    let selected = world.resource::<InteractionState>().selected.clone();
    if let Some(id) = selected {
        if !world.resource::<FeatureStore>().contains(&id) {
            world.resource_mut::<InteractionState>().selected = None;
            emit(world, SelectionChanged { selected: None });
        }
    }
}

/// Replace every feature of `kind` with the contents of a GeoJSON document.
pub fn import_features(world: &mut World, kind: FeatureKind, document: &str) -> OverlayResult<usize> {
    let defaults = world.resource::<crate::config::OverlayConfig>().defaults.clone();
    let collection = match import_collection(document, kind, &defaults) {
        Ok(collection) => collection,
        Err(error) => return reject(world, error),
    };

    let count = collection.len();
    let replaced = world.resource_mut::<FeatureStore>().replace_all(kind, collection);
    if let Err(error) = replaced {
        return reject(world, OverlayError::ImportParseFailure(error.to_string()));
    }

    info!("Imported {} {} feature(s)", count, kind.as_str());
    world.resource_mut::<Notifications>().push(
        NotificationLevel::Info,
        None,
        format!("Imported {} {} feature(s)", count, kind.as_str()),
    );
    drop_stale_selection(world);
    commit(world, &[kind]);
    Ok(count)
}

/// Current snapshot of `kind` as a GeoJSON document.
pub fn export_features(world: &World, kind: FeatureKind) -> String {
    export_collection_string(&world.resource::<FeatureStore>().snapshot(kind))
}

/// Remove every feature of `kind`, or of both kinds when `None`.
pub fn clear_features(world: &mut World, kind: Option<FeatureKind>) -> usize {
    let kinds: Vec<FeatureKind> = match kind {
        Some(kind) => vec![kind],
        None => FeatureKind::ALL.to_vec(),
    };

    let mut removed = 0;
    for kind in &kinds {
        let mut store = world.resource_mut::<FeatureStore>();
        removed += store.count(*kind);
        // An empty collection always validates.
        if let Err(error) = store.replace_all(*kind, FeatureCollection::new()) {
            error!("Failed to clear {}: {}", kind.as_str(), error);
        }
    }

    info!("Cleared {} feature(s)", removed);
    drop_stale_selection(world);
    commit(world, &kinds);
    removed
}

/// Request made while a tick is running, applied on the next tick.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum OverlayCommand {
    SetInteraction(InteractionUpdate),
    MapClick {
        screen: [f32; 2],
        lng_lat: LngLat,
    },
    PlaceCustomRing {
        ring: Vec<LngLat>,
    },
    PlaceFeature {
        feature: GeographicFeature,
        #[serde(default)]
        screen: Option<[f32; 2]>,
    },
    SelectFeature {
        id: Option<FeatureId>,
    },
    RotateFeature {
        id: FeatureId,
        delta: f64,
    },
    UpdateFeature {
        id: FeatureId,
        properties: PropertyPatch,
    },
    DeleteFeature {
        id: FeatureId,
    },
    ImportFeatures {
        kind: FeatureKind,
        document: String,
    },
    ClearFeatures {
        #[serde(default)]
        kind: Option<FeatureKind>,
    },
    DismissNotification {
        id: u64,
    },
}

/// Identifies a queued command in its `CommandCompleted` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandTicket(pub u64);

#[derive(Event, Debug, Clone, PartialEq)]
pub struct CommandCompleted {
    pub ticket: CommandTicket,
    pub result: Result<Value, OverlayError>,
}

#[derive(Resource, Debug, Default)]
pub struct PendingCommands {
    next_ticket: u64,
    queue: Vec<(CommandTicket, OverlayCommand)>,
}

impl PendingCommands {
    pub fn push(&mut self, command: OverlayCommand) -> CommandTicket {
        self.next_ticket += 1;
        let ticket = CommandTicket(self.next_ticket);
        self.queue.push((ticket, command));
        ticket
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

/// Run one command against the world and describe its result as JSON.
pub fn apply_command(world: &mut World, command: OverlayCommand) -> OverlayResult<Value> {
    match command {
        OverlayCommand::SetInteraction(update) => {
            let mut interaction = world.resource_mut::<InteractionState>();
            interaction.apply(update);
            Ok(json!({ "mode": interaction.mode, "kind": interaction.kind, "shape": interaction.shape }))
        }
        OverlayCommand::MapClick { screen, lng_lat } => {
            let outcome = handle_map_click(
                world,
                MapClick {
                    screen: Vec2::from_array(screen),
                    lng_lat,
                },
            )?;
            Ok(json!(outcome))
        }
        OverlayCommand::PlaceCustomRing { ring } => {
            let id = place_custom_ring(world, &ring)?;
            Ok(json!({ "id": id }))
        }
        OverlayCommand::PlaceFeature { feature, screen } => {
            let id = place_feature(world, feature, screen.map(Vec2::from_array))?;
            Ok(json!({ "id": id }))
        }
        OverlayCommand::SelectFeature { id } => {
            select_feature(world, id.clone())?;
            Ok(json!({ "selected": id }))
        }
        OverlayCommand::RotateFeature { id, delta } => {
            let rotation = rotate_feature(world, &id, delta)?;
            Ok(json!({ "id": id, "rotation": rotation }))
        }
        OverlayCommand::UpdateFeature { id, properties } => {
            let feature = update_feature_properties(world, &id, properties)?;
            Ok(json!({ "id": id, "properties": feature.properties }))
        }
        OverlayCommand::DeleteFeature { id } => {
            delete_feature(world, &id)?;
            Ok(json!({ "id": id, "deleted": true }))
        }
        OverlayCommand::ImportFeatures { kind, document } => {
            let count = import_features(world, kind, &document)?;
            Ok(json!({ "kind": kind, "imported": count }))
        }
        OverlayCommand::ClearFeatures { kind } => {
            let removed = clear_features(world, kind);
            Ok(json!({ "removed": removed }))
        }
        OverlayCommand::DismissNotification { id } => {
            let dismissed = world.resource_mut::<Notifications>().dismiss(id);
            Ok(json!({ "dismissed": dismissed }))
        }
    }
}

/// Apply commands queued during the previous tick.
pub fn apply_pending_commands(world: &mut World) {
    let queued = std::mem::take(&mut world.resource_mut::<PendingCommands>().queue);
    if queued.is_empty() {
        return;
    }
    debug!("Applying {} deferred command(s)", queued.len());

    for (ticket, command) in queued {
        let result = apply_command(world, command);
        emit(world, CommandCompleted { ticket, result });
    }
}
