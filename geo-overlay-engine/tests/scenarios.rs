mod common;

use std::time::Duration;

use bevy::math::{DMat4, Vec2};
use common::*;
use geo_overlay_engine::engine::animation::{AnimationKind, TaskState};
use geo_overlay_engine::engine::mesh::lifecycle::FeatureMesh;
use geo_overlay_engine::tools::interaction::{
    ClickOutcome, InteractionMode, InteractionUpdate, PlacementDimensions, PlacementShape,
};
use geo_overlay_engine::{FeatureGeometry, FeatureKind, PropertyPatch};

#[test]
fn rectangle_click_places_a_five_point_ring() {
    let mut h = harness();
    h.engine.set_interaction(InteractionUpdate {
        mode: Some(InteractionMode::Placing),
        kind: Some(FeatureKind::Building),
        shape: Some(PlacementShape::Rectangle),
        dimensions: Some(PlacementDimensions {
            width: Some(12.0),
            depth: Some(12.0),
            rotation: Some(0.0),
            ..Default::default()
        }),
        ..Default::default()
    });

    let outcome = h.engine.handle_map_click(Vec2::new(400.0, 300.0), LONDON).unwrap();
    let ClickOutcome::Placed { id } = outcome else {
        panic!("expected a placement, got {outcome:?}");
    };

    let feature = h.engine.feature(&id).unwrap();
    let FeatureGeometry::Polygon(ring) = &feature.geometry else {
        panic!("expected a polygon");
    };
    assert_eq!(ring.len(), 5);
    assert_eq!(ring.first(), ring.last());
    assert_eq!(feature.properties.height, 12.0);
    assert_eq!(h.engine.interaction().mode, InteractionMode::Idle);
    assert!(h.engine.mesh_entry(&id).is_some());
}

#[test]
fn height_update_animates_to_the_exact_target() {
    let mut h = harness();
    let id = h.engine.place_feature(building("b-1", LONDON, 10.0), None).unwrap();
    h.engine.next_frame(DMat4::IDENTITY);

    h.engine.update_feature_properties(&id, PropertyPatch::height(30.0)).unwrap();
    let task = h
        .engine
        .scheduler()
        .active_task(&id, AnimationKind::Height)
        .cloned()
        .unwrap();
    assert_eq!(task.from, 10.0);
    assert_eq!(task.to, 30.0);
    assert_eq!(task.state, TaskState::Active);

    h.engine.advance_time(Duration::from_millis(200));
    h.engine.next_frame(DMat4::IDENTITY);
    let halfway = h.engine.mesh_entry(&id).unwrap().current_height;
    assert!(halfway > 10.0 && halfway < 30.0, "{halfway}");

    h.engine.advance_time(Duration::from_millis(250));
    h.engine.next_frame(DMat4::IDENTITY);
    assert_eq!(h.engine.mesh_entry(&id).unwrap().current_height, 30.0);
    assert_eq!(h.engine.scheduler().state(task.id), Some(TaskState::Completed));
}

#[test]
fn rotation_wraps_at_360() {
    let mut h = harness();
    let id = h.engine.place_feature(building("b-1", LONDON, 10.0), None).unwrap();

    assert_eq!(h.engine.rotate_feature(&id, 15.0).unwrap(), 15.0);
    assert_eq!(h.engine.rotate_feature(&id, 15.0).unwrap(), 30.0);
    assert_eq!(h.engine.rotate_feature(&id, 345.0).unwrap(), 15.0);
    assert_eq!(h.engine.feature(&id).unwrap().properties.rotation, 15.0);
}

#[test]
fn rotation_swings_the_rebuilt_mesh_into_place() {
    let mut h = harness();
    let id = h.engine.place_feature(building("b-1", LONDON, 10.0), None).unwrap();
    let revision = h.engine.mesh_entry(&id).unwrap().geometry_revision;

    h.engine.rotate_feature(&id, 40.0).unwrap();
    let entry = h.engine.mesh_entry(&id).unwrap();
    assert_eq!(entry.geometry_revision, revision + 1);
    assert_eq!(entry.rotation_offset, -40.0);

    h.engine.advance_time(Duration::from_millis(350));
    h.engine.next_frame(DMat4::IDENTITY);
    assert_eq!(h.engine.mesh_entry(&id).unwrap().rotation_offset, 0.0);
}

#[test]
fn deleting_during_a_height_animation_cancels_it() {
    let mut h = harness();
    let id = h.engine.place_feature(building("b-1", LONDON, 10.0), None).unwrap();
    h.engine.next_frame(DMat4::IDENTITY);

    h.engine.update_feature_properties(&id, PropertyPatch::height(30.0)).unwrap();
    let task = h.engine.scheduler().active_task(&id, AnimationKind::Height).unwrap().id;
    h.engine.advance_time(Duration::from_millis(100));
    h.engine.next_frame(DMat4::IDENTITY);
    assert_eq!(h.engine.scheduler().state(task), Some(TaskState::Active));

    h.engine.delete_feature(&id).unwrap();
    assert_eq!(h.engine.scheduler().state(task), Some(TaskState::Cancelled));
    assert!(h.engine.mesh_entry(&id).is_none());

    h.engine.advance_time(Duration::from_secs(1));
    h.engine.next_frame(DMat4::IDENTITY);
    assert_eq!(h.engine.scheduler().state(task), Some(TaskState::Cancelled));
    assert!(!h.engine.scheduler().has_tasks_for(&id));

    let world = h.engine.world_mut();
    let meshes = world.query::<&FeatureMesh>().iter(world).count();
    assert_eq!(meshes, 0);
}

#[test]
fn new_meshes_rise_in() {
    let mut h = harness();
    let id = h.engine.place_feature(building("b-1", LONDON, 10.0), None).unwrap();
    assert!(h.engine.mesh_entry(&id).unwrap().rise_scale < 0.01);

    h.engine.advance_time(Duration::from_millis(600));
    h.engine.next_frame(DMat4::IDENTITY);
    let entry = h.engine.mesh_entry(&id).unwrap();
    assert_eq!(entry.rise_scale, 1.0);
    assert!(h.engine.scheduler().is_idle());
}

#[test]
fn superseded_height_task_starts_from_the_reached_value() {
    let mut h = harness();
    let id = h.engine.place_feature(building("b-1", LONDON, 10.0), None).unwrap();
    h.engine.next_frame(DMat4::IDENTITY);

    h.engine.update_feature_properties(&id, PropertyPatch::height(30.0)).unwrap();
    let first = h.engine.scheduler().active_task(&id, AnimationKind::Height).unwrap().id;
    h.engine.advance_time(Duration::from_millis(150));
    h.engine.next_frame(DMat4::IDENTITY);
    let reached = h.engine.mesh_entry(&id).unwrap().current_height;

    h.engine.update_feature_properties(&id, PropertyPatch::height(5.0)).unwrap();
    let second = h.engine.scheduler().active_task(&id, AnimationKind::Height).unwrap().clone();
    assert_eq!(h.engine.scheduler().state(first), Some(TaskState::Cancelled));
    assert_eq!(second.from, reached);
    assert_eq!(second.to, 5.0);
}
