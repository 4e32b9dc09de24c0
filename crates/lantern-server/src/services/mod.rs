//! The RPC methods Lantern serves.
//!
//! | method                          | kind   |
//! |---------------------------------|--------|
//! | `observer.start`                | unary  |
//! | `observer.stop`                 | unary  |
//! | `object.getTree`                | unary  |
//! | `object.find`                   | unary  |
//! | `object.getParent`              | unary  |
//! | `object.getChildren`            | unary  |
//! | `object.getProperties`          | unary  |
//! | `object.updateProperty`         | unary  |
//! | `object.getMethods`             | unary  |
//! | `object.callMethod`             | unary  |
//! | `object.listenTreeChanges`      | stream |
//! | `object.listenPropertyChanges`  | stream |

pub mod object;
pub mod observer;

use crate::call::{arm_call, CallState, StreamCallState, StreamHandler, UnaryHandler};
use crate::context::HostContext;
use crate::transport::Transport;

pub use object::{
    CallMethod, Find, GetChildren, GetMethods, GetParent, GetProperties, GetTree,
    ListenPropertyChanges, ListenTreeChanges, TreeNode, UpdateProperty,
};
pub use observer::{StartObserver, StopObserver};

/// Every method name, in registration order.
pub const METHODS: [&str; 12] = [
    StartObserver::METHOD,
    StopObserver::METHOD,
    GetTree::METHOD,
    Find::METHOD,
    GetParent::METHOD,
    GetChildren::METHOD,
    GetProperties::METHOD,
    UpdateProperty::METHOD,
    GetMethods::METHOD,
    CallMethod::METHOD,
    ListenTreeChanges::METHOD,
    ListenPropertyChanges::METHOD,
];

/// Declares every method on the transport.
pub fn register(transport: &Transport) {
    for method in METHODS {
        transport.register_method(method);
    }
}

/// Arms the first instance of every method. Runs on the owner thread.
pub fn arm_all(cx: &mut HostContext) {
    arm_call(cx, Box::new(CallState::<StartObserver>::new()));
    arm_call(cx, Box::new(CallState::<StopObserver>::new()));
    arm_call(cx, Box::new(CallState::<GetTree>::new()));
    arm_call(cx, Box::new(CallState::<Find>::new()));
    arm_call(cx, Box::new(CallState::<GetParent>::new()));
    arm_call(cx, Box::new(CallState::<GetChildren>::new()));
    arm_call(cx, Box::new(CallState::<GetProperties>::new()));
    arm_call(cx, Box::new(CallState::<UpdateProperty>::new()));
    arm_call(cx, Box::new(CallState::<GetMethods>::new()));
    arm_call(cx, Box::new(CallState::<CallMethod>::new()));
    arm_call(cx, Box::new(StreamCallState::<ListenTreeChanges>::new()));
    arm_call(cx, Box::new(StreamCallState::<ListenPropertyChanges>::new()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::{dispatch, CallHost, Phase};
    use crate::completion::{completion_queue, CompletionQueue};
    use crate::protocol::{Outbound, StatusCode};
    use crate::transport::IncomingCall;
    use lantern_core::{HostGraph, NodeId, Query, Searcher};
    use lantern_graph::{NodeSpec, ObjectTree, TreeBuilder};
    use lantern_watcher::{ChangeEvent, PropertyEvent};
    use serde_json::{json, Value};
    use tokio::sync::mpsc;
    use uuid::Uuid;

    /// Drives the services without sockets: requests go straight into the
    /// transport and completions are dispatched on the test thread.
    struct Harness {
        cx: HostContext,
        queue: CompletionQueue,
        connection: Uuid,
        reply: mpsc::UnboundedSender<Outbound>,
        replies: mpsc::UnboundedReceiver<Outbound>,
        next_id: u64,
    }

    impl Harness {
        fn new() -> Self {
            let mut tree = TreeBuilder::new()
                .root(
                    NodeSpec::new("Window")
                        .named("Main")
                        .child(
                            NodeSpec::new("Button")
                                .named("ok")
                                .property("text", "OK"),
                        )
                        .child(NodeSpec::new("Label").named("status")),
                )
                .build()
                .unwrap();
            tree.register_standard_methods();
            let (completions, queue) = completion_queue();
            let transport = Transport::new(completions);
            register(&transport);
            let mut cx = HostContext::new(tree, Searcher::new(), transport, true);
            arm_all(&mut cx);
            let (reply, replies) = mpsc::unbounded_channel();
            Self {
                cx,
                queue,
                connection: Uuid::new_v4(),
                reply,
                replies,
                next_id: 0,
            }
        }

        fn send(&mut self, method: &str, params: Value) -> Value {
            self.next_id += 1;
            let id = json!(self.next_id);
            self.cx.transport().deliver(IncomingCall {
                connection: self.connection,
                request_id: id.clone(),
                method: method.to_string(),
                params,
                reply: self.reply.clone(),
            });
            id
        }

        fn drain(&mut self) {
            while let Some((tag, ok)) = self.queue.try_next() {
                dispatch(&mut self.cx, tag, ok);
            }
        }

        fn call(&mut self, method: &str, params: Value) -> Outbound {
            self.send(method, params);
            self.drain();
            let mut replies = self.replies();
            assert_eq!(replies.len(), 1, "expected one reply, got {:?}", replies);
            replies.remove(0)
        }

        fn replies(&mut self) -> Vec<Outbound> {
            let mut out = Vec::new();
            while let Ok(reply) = self.replies.try_recv() {
                out.push(reply);
            }
            out
        }

        fn tree(&mut self) -> &mut ObjectTree {
            self.cx.graph_as_mut::<ObjectTree>().unwrap()
        }

        fn node(&self, path: &str) -> NodeId {
            self.cx
                .searcher()
                .resolve_one(self.cx.graph(), &Query::by_path(path))
                .unwrap()
        }
    }

    fn result(reply: Outbound) -> Value {
        match reply {
            Outbound::Result { result, .. } => result,
            other => panic!("expected a result, got {:?}", other),
        }
    }

    fn error_code(reply: Outbound) -> StatusCode {
        match reply {
            Outbound::Error { status, .. } => status.code,
            other => panic!("expected an error, got {:?}", other),
        }
    }

    #[test]
    fn test_every_method_armed_once() {
        let h = Harness::new();
        for method in METHODS {
            assert_eq!(h.cx.transport().armed(method), 1, "{}", method);
        }
        assert_eq!(h.cx.call_registry().len(), METHODS.len());
    }

    #[test]
    fn test_unary_calls_rearm() {
        let mut h = Harness::new();
        for _ in 0..3 {
            h.send(GetTree::METHOD, json!({}));
        }
        h.drain();

        let replies = h.replies();
        assert_eq!(replies.len(), 3);
        for reply in replies {
            let roots = result(reply)["roots"].clone();
            assert_eq!(roots.as_array().map(Vec::len), Some(1));
        }
        assert_eq!(h.cx.transport().armed(GetTree::METHOD), 1);
        assert_eq!(
            h.cx.call_registry()
                .count(GetTree::METHOD, Phase::Processing),
            1
        );
        assert_eq!(h.cx.call_registry().len(), METHODS.len());
        assert_eq!(h.cx.transport().active(), 0);
    }

    #[test]
    fn test_null_params_read_as_empty() {
        let mut h = Harness::new();
        let tree = result(h.call(GetTree::METHOD, Value::Null));
        assert_eq!(tree["roots"][0]["children"].as_array().map(Vec::len), Some(2));
    }

    #[test]
    fn test_lookup_errors() {
        let mut h = Harness::new();
        let missing = h.call(GetParent::METHOD, json!({ "query": { "path": "Nope" } }));
        assert_eq!(error_code(missing), StatusCode::NotFound);

        let ambiguous = h.call(GetParent::METHOD, json!({ "query": { "path": "Main/.*" } }));
        assert_eq!(error_code(ambiguous), StatusCode::FailedPrecondition);

        let malformed = h.call(GetParent::METHOD, json!({}));
        assert_eq!(error_code(malformed), StatusCode::InvalidArgument);

        let unsupported = h.call(Find::METHOD, json!({ "query": { "colour": "red" } }));
        assert_eq!(error_code(unsupported), StatusCode::InvalidArgument);
    }

    #[test]
    fn test_unknown_method() {
        let mut h = Harness::new();
        let reply = h.call("object.explode", json!({}));
        assert_eq!(error_code(reply), StatusCode::Unimplemented);
    }

    #[test]
    fn test_navigation() {
        let mut h = Harness::new();
        let parent = result(h.call(GetParent::METHOD, json!({ "query": { "path": "Main/ok" } })));
        let parent: Query = serde_json::from_value(parent["object"].clone()).unwrap();
        assert_eq!(parent.get("path"), Some(&json!("Main")));

        let root_parent = result(h.call(GetParent::METHOD, json!({ "query": "{\"path\":\"Main\"}" })));
        let root_parent: Query = serde_json::from_value(root_parent["object"].clone()).unwrap();
        assert!(root_parent.is_empty());

        let children = result(h.call(GetChildren::METHOD, json!({ "query": { "path": "Main" } })));
        let paths: Vec<Value> = children["objects"]
            .as_array()
            .unwrap()
            .iter()
            .map(|o| {
                let q: Query = serde_json::from_value(o.clone()).unwrap();
                q.get("path").cloned().unwrap()
            })
            .collect();
        assert_eq!(paths, vec![json!("Main/ok"), json!("Main/status")]);

        let found = result(h.call(Find::METHOD, json!({ "query": { "type": "Button|Label" } })));
        assert_eq!(found["objects"].as_array().map(Vec::len), Some(2));
    }

    #[test]
    fn test_update_property() {
        let mut h = Harness::new();
        let done = h.call(
            UpdateProperty::METHOD,
            json!({ "object": { "path": "Main/ok" }, "property": "text", "value": "Yes" }),
        );
        assert_eq!(result(done), json!({}));

        let props = result(h.call(GetProperties::METHOD, json!({ "query": { "path": "Main/ok" } })));
        let text = props["properties"]
            .as_array()
            .unwrap()
            .iter()
            .find(|p| p["name"] == "text")
            .cloned()
            .unwrap();
        assert_eq!(text["value"], json!("Yes"));
        assert_eq!(text["read_only"], json!(false));

        let wrong_kind = h.call(
            UpdateProperty::METHOD,
            json!({ "object": { "path": "Main/ok" }, "property": "text", "value": 5 }),
        );
        assert_eq!(error_code(wrong_kind), StatusCode::InvalidArgument);
    }

    #[test]
    fn test_methods_list_and_call() {
        let mut h = Harness::new();
        let listed = result(h.call(GetMethods::METHOD, json!({ "query": { "path": "Main/ok" } })));
        assert_eq!(listed["methods"][0]["name"], json!("click"));
        assert_eq!(listed["methods"][0]["parameters"], json!([]));

        let none = result(h.call(GetMethods::METHOD, json!({ "query": { "path": "Main/status" } })));
        assert_eq!(none["methods"], json!([]));

        let clicked = result(h.call(
            CallMethod::METHOD,
            json!({ "object": { "path": "Main/ok" }, "method": "click" }),
        ));
        assert_eq!(clicked, json!({ "result": 1 }));
        let ok = h.node("Main/ok");
        assert_eq!(h.cx.graph().property(ok, "clicks"), Some(json!(1)));
    }

    #[test]
    fn test_call_method_errors() {
        let mut h = Harness::new();
        let unknown = h.call(
            CallMethod::METHOD,
            json!({ "object": { "path": "Main/ok" }, "method": "explode" }),
        );
        assert_eq!(error_code(unknown), StatusCode::InvalidArgument);

        let extra = h.call(
            CallMethod::METHOD,
            json!({ "object": { "path": "Main/ok" }, "method": "click", "arguments": [1] }),
        );
        assert_eq!(error_code(extra), StatusCode::InvalidArgument);

        let missing = h.call(
            CallMethod::METHOD,
            json!({ "object": { "path": "Main/gone" }, "method": "click" }),
        );
        assert_eq!(error_code(missing), StatusCode::NotFound);
    }

    #[test]
    fn test_observer_toggle() {
        let mut h = Harness::new();
        let again = h.call(StartObserver::METHOD, json!({}));
        assert_eq!(error_code(again), StatusCode::InvalidArgument);

        let stopped = result(h.call(StopObserver::METHOD, json!({})));
        assert_eq!(stopped, json!({ "observing": false }));
        assert!(!h.cx.observers().is_enabled());

        let again = h.call(StopObserver::METHOD, json!({}));
        assert_eq!(error_code(again), StatusCode::InvalidArgument);

        let started = result(h.call(StartObserver::METHOD, json!({})));
        assert_eq!(started, json!({ "observing": true }));
    }

    #[test]
    fn test_tree_stream_reports_changes() {
        let mut h = Harness::new();
        h.send(ListenTreeChanges::METHOD, json!({}));
        h.drain();
        assert!(h.replies().is_empty());
        assert_eq!(h.cx.observers().len(), 1);

        let main = h.node("Main");
        let tree = h.tree();
        let button = tree.create("Button", Some(main)).unwrap();
        tree.set_name(button, "cancel").unwrap();
        h.cx.tick();
        h.drain();

        let replies = h.replies();
        assert_eq!(replies.len(), 1);
        let Outbound::Item { item, .. } = &replies[0] else {
            panic!("expected a stream item, got {:?}", replies[0]);
        };
        match serde_json::from_value::<ChangeEvent>(item.clone()).unwrap() {
            ChangeEvent::Added { object, parent } => {
                assert_eq!(object.get("path"), Some(&json!("Main/cancel")));
                assert_eq!(parent.get("path"), Some(&json!("Main")));
            }
            other => panic!("expected an add, got {:?}", other),
        }

        // The stream stays parked and keeps exactly one sibling armed.
        assert_eq!(h.cx.transport().armed(ListenTreeChanges::METHOD), 1);
        assert_eq!(
            h.cx.call_registry()
                .count(ListenTreeChanges::METHOD, Phase::Streaming),
            1
        );
    }

    #[test]
    fn test_cancel_releases_stream() {
        let mut h = Harness::new();
        let id = h.send(ListenTreeChanges::METHOD, json!({ "root": { "path": "Main" } }));
        h.drain();
        assert_eq!(h.cx.observers().len(), 1);

        let connection = h.connection;
        h.cx.transport().cancel(connection, &id);
        h.drain();

        assert!(h.cx.observers().is_empty());
        assert_eq!(h.cx.transport().active(), 0);
        assert_eq!(h.cx.call_registry().len(), METHODS.len());
    }

    #[test]
    fn test_connection_close_releases_streams() {
        let mut h = Harness::new();
        h.send(ListenTreeChanges::METHOD, json!({}));
        h.send(ListenPropertyChanges::METHOD, json!({ "query": { "path": "Main/ok" } }));
        h.drain();
        assert_eq!(h.cx.observers().len(), 2);

        let connection = h.connection;
        h.cx.transport().connection_closed(connection);
        h.drain();
        assert!(h.cx.observers().is_empty());
        assert_eq!(h.cx.transport().active(), 0);
    }

    #[test]
    fn test_property_stream_ends_when_target_dies() {
        let mut h = Harness::new();
        h.send(ListenPropertyChanges::METHOD, json!({ "query": { "path": "Main/status" } }));
        h.drain();

        let status = h.node("Main/status");
        h.tree().set_property(status, "visible", json!(false)).unwrap();
        h.cx.tick();
        h.drain();
        let replies = h.replies();
        assert_eq!(replies.len(), 1);
        let Outbound::Item { item, .. } = &replies[0] else {
            panic!("expected a stream item, got {:?}", replies[0]);
        };
        assert_eq!(
            serde_json::from_value::<PropertyEvent>(item.clone()).unwrap(),
            PropertyEvent::Updated {
                property: "visible".into(),
                old_value: json!(true),
                new_value: json!(false),
            }
        );

        h.tree().destroy(status).unwrap();
        h.cx.tick();
        h.drain();
        let mut replies = h.replies();
        assert_eq!(replies.len(), 1);
        assert_eq!(error_code(replies.remove(0)), StatusCode::NotFound);
        assert!(h.cx.observers().is_empty());
    }

    #[test]
    fn test_property_stream_ends_when_target_dies_while_stopped() {
        let mut h = Harness::new();
        h.send(ListenPropertyChanges::METHOD, json!({ "query": { "path": "Main/status" } }));
        h.drain();
        result(h.call(StopObserver::METHOD, json!({})));

        let status = h.node("Main/status");
        h.tree().destroy(status).unwrap();
        h.send(StartObserver::METHOD, json!({}));
        h.drain();
        for _ in 0..3 {
            h.cx.tick();
            h.drain();
        }

        let codes: Vec<Option<StatusCode>> = h
            .replies()
            .into_iter()
            .map(|reply| match reply {
                Outbound::Error { status, .. } => Some(status.code),
                _ => None,
            })
            .collect();
        assert_eq!(codes.len(), 2);
        assert!(codes.contains(&Some(StatusCode::NotFound)));
        assert!(h.cx.observers().is_empty());
        assert_eq!(h.cx.transport().active(), 0);
    }

    #[test]
    fn test_stream_with_unknown_root_fails() {
        let mut h = Harness::new();
        let reply = h.call(ListenTreeChanges::METHOD, json!({ "root": { "path": "Gone" } }));
        assert_eq!(error_code(reply), StatusCode::NotFound);
        assert!(h.cx.observers().is_empty());
        assert_eq!(h.cx.transport().armed(ListenTreeChanges::METHOD), 1);
    }

    #[test]
    fn test_shutdown_fails_everything() {
        let mut h = Harness::new();
        h.send(ListenTreeChanges::METHOD, json!({}));
        h.drain();

        h.cx.transport().shutdown();
        h.drain();
        let mut replies = h.replies();
        assert_eq!(replies.len(), 1);
        assert_eq!(error_code(replies.remove(0)), StatusCode::Cancelled);
        assert!(h.cx.call_registry().is_empty());
        assert!(h.cx.observers().is_empty());

        let late = h.call(GetTree::METHOD, json!({}));
        assert_eq!(error_code(late), StatusCode::Cancelled);
    }
}
