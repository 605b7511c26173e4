//! Introspection events.
//!
//! Listeners are invoked synchronously, in registration order, at the point
//! the event is emitted. Nothing is buffered.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use nodescript_core::id::NodeUid;

use crate::error::RuntimeError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeEvent {
    pub node_uid: NodeUid,
    /// Fraction of the node's work done, in `[0, 1]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl NodeEvent {
    pub fn progress(node_uid: NodeUid, progress: f64) -> Self {
        NodeEvent {
            node_uid,
            progress: Some(progress),
            result: None,
            error: None,
        }
    }

    pub fn result(node_uid: NodeUid, result: Value) -> Self {
        NodeEvent {
            node_uid,
            progress: None,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(node_uid: NodeUid, error: &RuntimeError) -> Self {
        NodeEvent {
            node_uid,
            progress: None,
            result: None,
            error: Some(error.to_string()),
        }
    }
}

pub type Listener = Arc<dyn Fn(&NodeEvent) + Send + Sync>;

/// Synchronous listener list shared by every scope of an evaluation.
#[derive(Clone, Default)]
pub struct EventEmitter {
    listeners: Arc<RwLock<Vec<Listener>>>,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&self, listener: impl Fn(&NodeEvent) + Send + Sync + 'static) {
        self.listeners.write().push(Arc::new(listener));
    }

    pub fn emit(&self, event: &NodeEvent) {
        // Snapshot so listeners may register further listeners.
        let listeners: Vec<Listener> = self.listeners.read().clone();
        for listener in listeners {
            listener(event);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }
}

impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEmitter")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    #[test]
    fn listeners_run_in_registration_order() {
        let emitter = EventEmitter::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for tag in ["first", "second"] {
            let seen = seen.clone();
            emitter.on(move |event| seen.lock().push((tag, event.node_uid.clone())));
        }
        emitter.emit(&NodeEvent::progress(NodeUid::from("n"), 0.0));
        assert_eq!(
            *seen.lock(),
            vec![("first", NodeUid::from("n")), ("second", NodeUid::from("n"))]
        );
    }

    #[test]
    fn serializes_only_present_fields() {
        let event = NodeEvent::result(NodeUid::from("add"), json!(33));
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"nodeUid": "add", "result": 33})
        );
        let event = NodeEvent::error(NodeUid::from("add"), &RuntimeError::node("boom"));
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"nodeUid": "add", "error": "boom"})
        );
    }
}
