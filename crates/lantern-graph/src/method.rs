//! Methods registered per object type.
//!
//! A method is a name, a parameter list and a handler. Handlers receive the
//! whole tree, so they can change properties or structure the way a real
//! object's methods would.

use crate::edge::same_kind;
use crate::graph::ObjectTree;
use lantern_core::{Error, MethodInfo, NodeId, Value};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

/// Body of a registered method.
pub type MethodHandler =
    Arc<dyn Fn(&mut ObjectTree, NodeId, &[Value]) -> lantern_core::Result<Value> + Send + Sync>;

#[derive(Clone)]
struct Registered {
    info: MethodInfo,
    handler: MethodHandler,
}

#[derive(Clone, Default)]
pub(crate) struct MethodTable {
    by_type: HashMap<String, BTreeMap<String, Registered>>,
}

impl fmt::Debug for MethodTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(
                self.by_type
                    .iter()
                    .map(|(type_name, methods)| (type_name, methods.keys().collect::<Vec<_>>())),
            )
            .finish()
    }
}

impl MethodTable {
    pub fn register(&mut self, type_name: &str, info: MethodInfo, handler: MethodHandler) {
        self.by_type
            .entry(type_name.to_string())
            .or_default()
            .insert(info.name.clone(), Registered { info, handler });
    }

    /// Methods of `type_name`, sorted by name.
    pub fn list(&self, type_name: &str) -> Vec<MethodInfo> {
        self.by_type
            .get(type_name)
            .map(|methods| methods.values().map(|m| m.info.clone()).collect())
            .unwrap_or_default()
    }

    /// Finds `name` on `type_name` and checks `args` against its
    /// parameters.
    pub fn resolve(
        &self,
        type_name: &str,
        name: &str,
        args: &[Value],
    ) -> lantern_core::Result<MethodHandler> {
        let method = self
            .by_type
            .get(type_name)
            .and_then(|methods| methods.get(name))
            .ok_or_else(|| Error::InvalidArgument(format!("{type_name} has no method {name:?}")))?;

        let parameters = &method.info.parameters;
        if parameters.len() != args.len() {
            return Err(Error::InvalidArgument(format!(
                "{name} takes {} arguments, got {}",
                parameters.len(),
                args.len()
            )));
        }
        for (parameter, arg) in parameters.iter().zip(args) {
            if !same_kind(&parameter.default, arg) {
                return Err(Error::InvalidArgument(format!(
                    "argument {:?} of {name} cannot be {arg}",
                    parameter.name
                )));
            }
        }
        Ok(method.handler.clone())
    }
}

impl ObjectTree {
    /// Makes `method` callable on every object of `type_name`, replacing
    /// any method of the same name.
    pub fn register_method<F>(&mut self, type_name: &str, method: MethodInfo, handler: F)
    where
        F: Fn(&mut ObjectTree, NodeId, &[Value]) -> lantern_core::Result<Value>
            + Send
            + Sync
            + 'static,
    {
        self.methods.register(type_name, method, Arc::new(handler));
    }

    /// Registers the methods of the common widget types:
    ///
    /// - `Button.click()` counts clicks in a read-only `clicks` property;
    /// - `CheckBox.toggle()` flips `checked`;
    /// - `TextField.insert(text)` appends to `text`, `TextField.clear()`
    ///   empties it.
    pub fn register_standard_methods(&mut self) {
        self.register_method("Button", MethodInfo::new("click"), |tree, node, _| {
            let clicks = tree
                .get(node)
                .and_then(|d| d.properties.get("clicks"))
                .and_then(|slot| slot.value.as_u64())
                .unwrap_or(0)
                + 1;
            tree.define_property(node, "clicks", Value::from(clicks), true)?;
            Ok(Value::from(clicks))
        });

        self.register_method("CheckBox", MethodInfo::new("toggle"), |tree, node, _| {
            let checked = !tree
                .get(node)
                .and_then(|d| d.properties.get("checked"))
                .and_then(|slot| slot.value.as_bool())
                .unwrap_or(false);
            tree.define_property(node, "checked", Value::from(checked), false)?;
            Ok(Value::from(checked))
        });

        self.register_method(
            "TextField",
            MethodInfo::new("insert").param("text", ""),
            |tree, node, args| {
                let mut text = tree
                    .get(node)
                    .and_then(|d| d.properties.get("text"))
                    .and_then(|slot| slot.value.as_str())
                    .unwrap_or_default()
                    .to_string();
                text.push_str(args[0].as_str().unwrap_or_default());
                tree.define_property(node, "text", Value::from(text.clone()), false)?;
                Ok(Value::from(text))
            },
        );

        self.register_method("TextField", MethodInfo::new("clear"), |tree, node, _| {
            tree.define_property(node, "text", Value::from(""), false)?;
            Ok(Value::Null)
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lantern_core::HostGraph;
    use serde_json::json;

    #[test]
    fn test_standard_methods() {
        let mut tree = ObjectTree::new();
        tree.register_standard_methods();
        let button = tree.create("Button", None).unwrap();
        let field = tree.create("TextField", None).unwrap();

        assert_eq!(tree.call_method(button, "click", vec![]).unwrap(), json!(1));
        assert_eq!(tree.call_method(button, "click", vec![]).unwrap(), json!(2));
        assert_eq!(tree.property(button, "clicks"), Some(json!(2)));
        assert!(tree.is_read_only(button, "clicks"));

        tree.call_method(field, "insert", vec![json!("ab")]).unwrap();
        let text = tree.call_method(field, "insert", vec![json!("c")]).unwrap();
        assert_eq!(text, json!("abc"));
        tree.call_method(field, "clear", vec![]).unwrap();
        assert_eq!(tree.property(field, "text"), Some(json!("")));

        let names: Vec<String> = tree.methods(field).into_iter().map(|m| m.name).collect();
        assert_eq!(names, vec!["clear".to_string(), "insert".to_string()]);
        let label = tree.create("Label", None).unwrap();
        assert!(tree.methods(label).is_empty());
    }

    #[test]
    fn test_call_method_checks_arguments() {
        let mut tree = ObjectTree::new();
        tree.register_standard_methods();
        let field = tree.create("TextField", None).unwrap();

        assert!(matches!(
            tree.call_method(field, "explode", vec![]),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            tree.call_method(field, "insert", vec![]),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            tree.call_method(field, "insert", vec![json!(5)]),
            Err(Error::InvalidArgument(_))
        ));

        tree.destroy(field).unwrap();
        assert!(matches!(
            tree.call_method(field, "clear", vec![]),
            Err(Error::NotFound(_))
        ));
    }
}
