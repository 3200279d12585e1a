mod common;

use bevy::math::DMat4;
use common::*;
use geo_overlay_engine::FeatureId;
use serde_json::{Value, json};

fn messages(output: Vec<String>) -> Vec<Value> {
    output.iter().map(|m| serde_json::from_str(m).unwrap()).collect()
}

fn response(messages: &[Value], id: i64) -> &Value {
    messages
        .iter()
        .find(|m| m["id"] == json!(id))
        .unwrap_or_else(|| panic!("no response for request {id} in {messages:?}"))
}

fn notifications<'a>(messages: &'a [Value], method: &str) -> Vec<&'a Value> {
    messages.iter().filter(|m| m["method"] == json!(method)).collect()
}

#[test]
fn mutation_requests_are_applied_on_the_next_tick() {
    let mut h = harness();
    h.engine.place_feature(building("b-1", LONDON, 10.0), None).unwrap();
    h.engine.next_frame(DMat4::IDENTITY);
    h.engine.take_rpc_output();

    h.engine.post_message(
        json!({ "jsonrpc": "2.0", "method": "rotate_feature", "params": { "id": "b-1", "delta": 15 }, "id": 1 })
            .to_string(),
    );
    assert_eq!(h.engine.feature(&FeatureId::new("b-1")).unwrap().properties.rotation, 0.0);

    h.engine.next_frame(DMat4::IDENTITY);
    assert_eq!(h.engine.feature(&FeatureId::new("b-1")).unwrap().properties.rotation, 15.0);

    let out = messages(h.engine.take_rpc_output());
    assert_eq!(response(&out, 1)["result"]["rotation"], json!(15.0));
    let changed = notifications(&out, "feature_changed");
    assert_eq!(changed.len(), 1);
    assert_eq!(changed[0]["params"]["change"], json!("updated"));
    assert_eq!(changed[0]["params"]["feature"]["properties"]["rotation"], json!(15.0));
}

#[test]
fn failed_operations_report_their_kind() {
    let mut h = harness();
    h.engine.post_message(
        json!({ "jsonrpc": "2.0", "method": "delete_feature", "params": { "id": "ghost" }, "id": 2 }).to_string(),
    );
    h.engine.next_frame(DMat4::IDENTITY);

    let out = messages(h.engine.take_rpc_output());
    let error = &response(&out, 2)["error"];
    assert_eq!(error["code"], json!(-32000));
    assert_eq!(error["data"]["kind"], json!("unknown_feature"));

    let pushed = notifications(&out, "overlay_notification");
    assert_eq!(pushed.len(), 1);
    assert_eq!(pushed[0]["params"]["level"], json!("error"));
}

#[test]
fn reads_and_unknown_methods_are_answered_immediately() {
    let mut h = harness();
    h.engine.place_feature(tree("t-1", LONDON), None).unwrap();
    h.engine.post_message(
        json!({ "jsonrpc": "2.0", "method": "export_features", "params": { "kind": "trees" }, "id": 3 }).to_string(),
    );
    h.engine
        .post_message(json!({ "jsonrpc": "2.0", "method": "get_overlay_stats", "id": 4 }).to_string());
    h.engine
        .post_message(json!({ "jsonrpc": "2.0", "method": "summon", "params": {}, "id": 5 }).to_string());
    h.engine.post_message("not json at all");
    h.engine.update();

    let out = messages(h.engine.take_rpc_output());
    let export = &response(&out, 3)["result"];
    assert_eq!(export["kind"], json!("tree"));
    assert_eq!(export["document"]["features"][0]["properties"]["id"], json!("t-1"));
    assert_eq!(response(&out, 4)["result"]["trees"], json!(1));
    assert_eq!(response(&out, 5)["error"]["code"], json!(-32601));
}

#[test]
fn interaction_and_clicks_work_over_rpc() {
    let mut h = harness();
    h.engine.post_message(
        json!({
            "jsonrpc": "2.0",
            "method": "set_interaction",
            "params": { "mode": "placing", "kind": "tree", "dimensions": { "size": 5.0 } },
            "id": 6
        })
        .to_string(),
    );
    h.engine.post_message(
        json!({
            "jsonrpc": "2.0",
            "method": "map_click",
            "params": { "screen": [100.0, 120.0], "lng_lat": { "lng": -0.1276, "lat": 51.5072 } },
            "id": 7
        })
        .to_string(),
    );
    h.engine.next_frame(DMat4::IDENTITY);

    let out = messages(h.engine.take_rpc_output());
    assert_eq!(response(&out, 6)["result"]["mode"], json!("placing"));
    let placed = &response(&out, 7)["result"];
    assert_eq!(placed["outcome"], json!("placed"));

    let id = FeatureId::new(placed["id"].as_str().unwrap());
    let tree = h.engine.feature(&id).unwrap();
    assert_eq!(tree.properties.size, Some(5.0));
    assert!(h.engine.mesh_entry(&id).is_some());
}

#[test]
fn selection_changes_are_pushed() {
    let mut h = harness();
    h.engine.place_feature(building("b-1", LONDON, 10.0), None).unwrap();
    h.engine.select_feature(Some(FeatureId::new("b-1"))).unwrap();
    h.engine.next_frame(DMat4::IDENTITY);

    let out = messages(h.engine.take_rpc_output());
    let selections = notifications(&out, "selection_changed");
    assert_eq!(selections.len(), 1);
    assert_eq!(selections[0]["params"]["selected"], json!("b-1"));
}
