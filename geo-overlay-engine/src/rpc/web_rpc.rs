use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::engine::features::model::FeatureKind;
use crate::engine::features::store::{FeatureChange, FeatureChanged, FeatureStore};
use crate::engine::host::overlay_stats;
use crate::engine::notifications::Notifications;
use crate::engine::operations::{
    CommandCompleted, CommandTicket, OverlayCommand, PendingCommands, SelectionChanged, apply_pending_commands,
    export_features,
};
use crate::error::OverlayError;

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::JsValue;

#[cfg(target_arch = "wasm32")]
use web_sys::{MessageEvent, window};

/// JSON-RPC 2.0 request structure.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Value,
    pub id: Option<Value>,
}

/// JSON-RPC 2.0 response structure.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub result: Option<Value>,
    pub error: Option<RpcError>,
    pub id: Option<Value>,
}

/// JSON-RPC 2.0 notification structure for one-way communication.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RpcNotification {
    pub jsonrpc: String,
    pub method: String,
    pub params: Value,
}

/// JSON-RPC 2.0 error object.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    pub data: Option<Value>,
}

/// Standard RPC error codes and constructors.
impl RpcError {
    pub fn method_not_found(method: &str) -> Self {
        Self {
            code: -32601,
            message: "Method not found".to_string(),
            data: Some(json!({ "method": method })),
        }
    }

    pub fn invalid_params(message: &str) -> Self {
        Self {
            code: -32602,
            message: message.to_string(),
            data: None,
        }
    }

    pub fn internal_error(message: &str) -> Self {
        Self {
            code: -32603,
            message: message.to_string(),
            data: None,
        }
    }

    /// Operation failure; `data.kind` carries the error kind for the page.
    pub fn from_overlay(error: &OverlayError) -> Self {
        Self {
            code: -32000,
            message: error.to_string(),
            data: Some(json!({ "kind": error.kind() })),
        }
    }
}

/// Resource managing bidirectional RPC communication with the host page.
#[derive(Resource, Default)]
pub struct WebRpcInterface {
    outgoing_notifications: Vec<RpcNotification>,
    outgoing_responses: Vec<RpcResponse>,
    /// Request ids waiting for their queued command to complete.
    awaiting: HashMap<CommandTicket, Value>,
}

impl WebRpcInterface {
    /// Send notification to the page without expecting a response.
    pub fn send_notification(&mut self, method: &str, params: Value) {
        self.outgoing_notifications.push(RpcNotification {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params,
        });
    }

    fn queue_response(&mut self, id: Value, result: Result<Value, RpcError>) {
        let (result, error) = match result {
            Ok(value) => (Some(value), None),
            Err(error) => (None, Some(error)),
        };
        self.outgoing_responses.push(RpcResponse {
            jsonrpc: "2.0".to_string(),
            result,
            error,
            id: Some(id),
        });
    }

    pub fn awaiting_count(&self) -> usize {
        self.awaiting.len()
    }
}

/// Raw messages received from the page, shared with the browser listener.
#[derive(Resource, Clone, Default)]
pub struct MessageQueue(Arc<Mutex<Vec<String>>>);

impl MessageQueue {
    pub fn push(&self, message: String) {
        if let Ok(mut queue) = self.0.lock() {
            queue.push(message);
        }
    }

    fn drain(&self) -> Vec<String> {
        self.0.lock().map(|mut queue| std::mem::take(&mut *queue)).unwrap_or_default()
    }
}

/// Serialized outgoing messages on targets without a parent window.
#[derive(Resource, Debug, Default)]
pub struct RpcTranscript(pub Vec<String>);

/// Plugin establishing the JSON-RPC bridge to the embedding page.
pub struct WebRpcPlugin;

impl Plugin for WebRpcPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<WebRpcInterface>()
            .init_resource::<MessageQueue>()
            .init_resource::<RpcTranscript>()
            .add_systems(PreUpdate, handle_rpc_messages.before(apply_pending_commands))
            .add_systems(Last, (forward_overlay_events, send_outgoing_messages).chain());

        #[cfg(target_arch = "wasm32")]
        app.add_systems(Startup, setup_message_listener);
    }
}

#[cfg(target_arch = "wasm32")]
fn setup_message_listener(queue: Res<MessageQueue>) {
    let queue = queue.clone();

    let closure = Closure::wrap(Box::new(move |event: MessageEvent| {
        // Only string payloads that look like JSON-RPC are queued.
        if let Ok(data) = event.data().dyn_into::<js_sys::JsString>() {
            let message: String = data.into();
            if message.contains("jsonrpc") {
                queue.push(message);
            }
        }
    }) as Box<dyn FnMut(MessageEvent)>);

    match window() {
        Some(window) => {
            if let Err(e) = window.add_event_listener_with_callback("message", closure.as_ref().unchecked_ref()) {
                error!("Failed to register message listener: {:?}", e);
            }
        }
        None => error!("Window object not available, RPC listener not registered"),
    }

    // Ownership moves to JS for the lifetime of the page.
    closure.forget();
}

/// Parse messages posted since the previous tick. Reads are answered
/// immediately; mutations become `PendingCommands`, so a request posted
/// between frames is applied and answered on the next tick.
fn handle_rpc_messages(world: &mut World) {
    let messages = world.resource::<MessageQueue>().drain();

    for message in messages {
        let request = match serde_json::from_str::<RpcRequest>(&message) {
            Ok(request) => request,
            Err(e) => {
                warn!("Dropping malformed RPC message: {}", e);
                continue;
            }
        };
        debug!("RPC request: {}", request.method);

        match handle_rpc_request(world, &request) {
            RequestOutcome::Answered(result) => {
                if let Some(id) = request.id {
                    world.resource_mut::<WebRpcInterface>().queue_response(id, result);
                }
            }
            RequestOutcome::Queued(ticket) => {
                if let Some(id) = request.id {
                    world.resource_mut::<WebRpcInterface>().awaiting.insert(ticket, id);
                }
            }
        }
    }
}

enum RequestOutcome {
    Answered(Result<Value, RpcError>),
    Queued(CommandTicket),
}

fn handle_rpc_request(world: &mut World, request: &RpcRequest) -> RequestOutcome {
    match request.method.as_str() {
        "export_features" => RequestOutcome::Answered(handle_export_features(world, &request.params)),
        "get_overlay_stats" => RequestOutcome::Answered(
            serde_json::to_value(overlay_stats(world)).map_err(|e| RpcError::internal_error(&e.to_string())),
        ),
        method => match parse_command(method, &request.params) {
            Ok(command) => RequestOutcome::Queued(world.resource_mut::<PendingCommands>().push(command)),
            Err(error) => {
                warn!("Rejected RPC {}: {}", method, error.message);
                RequestOutcome::Answered(Err(error))
            }
        },
    }
}

const COMMAND_METHODS: [&str; 11] = [
    "set_interaction",
    "map_click",
    "place_custom_ring",
    "place_feature",
    "select_feature",
    "rotate_feature",
    "update_feature",
    "delete_feature",
    "import_features",
    "clear_features",
    "dismiss_notification",
];

/// Turn a method name and its params into a deferred command.
fn parse_command(method: &str, params: &Value) -> Result<OverlayCommand, RpcError> {
    if !COMMAND_METHODS.contains(&method) {
        return Err(RpcError::method_not_found(method));
    }

    let mut tagged = match params {
        Value::Object(map) => map.clone(),
        Value::Null => serde_json::Map::new(),
        _ => return Err(RpcError::invalid_params("Expected params to be an object")),
    };
    tagged.insert("command".to_string(), Value::String(method.to_string()));

    serde_json::from_value(Value::Object(tagged))
        .map_err(|e| RpcError::invalid_params(&format!("Invalid params for {method}: {e}")))
}

fn handle_export_features(world: &World, params: &Value) -> Result<Value, RpcError> {
    #[derive(Deserialize)]
    struct ExportParams {
        kind: String,
    }

    let parsed = serde_json::from_value::<ExportParams>(params.clone())
        .map_err(|_| RpcError::invalid_params("Expected 'kind' parameter"))?;
    let kind = FeatureKind::from_string(&parsed.kind)
        .ok_or_else(|| RpcError::invalid_params(&format!("Unknown feature kind: {}", parsed.kind)))?;

    let document = export_features(world, kind);
    let document: Value =
        serde_json::from_str(&document).map_err(|e| RpcError::internal_error(&e.to_string()))?;
    Ok(json!({ "kind": kind, "document": document }))
}

fn change_name(change: &FeatureChange) -> &'static str {
    match change {
        FeatureChange::Created => "created",
        FeatureChange::Updated { .. } => "updated",
        FeatureChange::Removed { .. } => "removed",
    }
}

/// Turn completed commands and overlay events into messages for the page.
fn forward_overlay_events(
    mut completed: EventReader<CommandCompleted>,
    mut changes: EventReader<FeatureChanged>,
    mut selections: EventReader<SelectionChanged>,
    store: Res<FeatureStore>,
    mut notifications: ResMut<Notifications>,
    mut rpc_interface: ResMut<WebRpcInterface>,
) {
    for event in changes.read() {
        rpc_interface.send_notification(
            "feature_changed",
            json!({
                "id": event.id,
                "kind": event.kind,
                "change": change_name(&event.change),
                "feature": store.get(&event.id),
            }),
        );
    }

    for event in selections.read() {
        rpc_interface.send_notification("selection_changed", json!({ "selected": event.selected }));
    }

    for notification in notifications.take_outbox() {
        rpc_interface.send_notification("overlay_notification", json!(notification));
    }

    for event in completed.read() {
        let Some(id) = rpc_interface.awaiting.remove(&event.ticket) else {
            continue;
        };
        let result = event.result.as_ref().map(Clone::clone).map_err(RpcError::from_overlay);
        rpc_interface.queue_response(id, result);
    }
}

/// Send queued notifications and responses to the page.
fn send_outgoing_messages(mut rpc_interface: ResMut<WebRpcInterface>, mut transcript: ResMut<RpcTranscript>) {
    let notifications: Vec<RpcNotification> = rpc_interface.outgoing_notifications.drain(..).collect();
    let responses: Vec<RpcResponse> = rpc_interface.outgoing_responses.drain(..).collect();

    // Notifications first, so the page sees state changes before the reply.
    for notification in &notifications {
        send_message_to_parent(notification, &mut transcript);
    }
    for response in &responses {
        send_message_to_parent(response, &mut transcript);
    }
}

/// Send serialized message to the parent window.
fn send_message_to_parent<T: Serialize>(message: &T, transcript: &mut RpcTranscript) {
    let json = match serde_json::to_string(message) {
        Ok(json) => json,
        Err(e) => {
            error!("Failed to serialize message: {}", e);
            return;
        }
    };

    #[cfg(target_arch = "wasm32")]
    {
        let _ = transcript;
        if let Some(window) = window() {
            if let Some(parent) = window.parent().ok().flatten() {
                if let Err(e) = parent.post_message(&JsValue::from_str(&json), "*") {
                    error!("Failed to send message to parent: {:?}", e);
                }
            } else {
                warn!("No parent window available for message transmission");
            }
        } else {
            error!("Window object not available");
        }
    }

    #[cfg(not(target_arch = "wasm32"))]
    transcript.0.push(json);
}
