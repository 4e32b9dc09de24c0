//! CLI command implementations.

use crate::client::{parse_query, parse_value, Client};
use colored::Colorize;
use lantern_core::{MethodInfo, Query};
use lantern_graph::{NodeSpec, ObjectTree, TreeBuilder};
use lantern_server::services::{
    CallMethod, Find, GetMethods, GetProperties, GetTree, ListenPropertyChanges,
    ListenTreeChanges, StartObserver, StopObserver, TreeNode, UpdateProperty,
};
use lantern_server::{Server, ServerConfig, StreamHandler, UnaryHandler};
use lantern_watcher::{ChangeEvent, PropertyEvent};
use serde_json::{json, Value};
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

/// Start the Lantern server.
pub async fn serve(
    fixture: Option<&Path>,
    host: Option<IpAddr>,
    port: Option<u16>,
    poll_ms: Option<u64>,
) -> Result<()> {
    let mut config = ServerConfig::from_env()?;
    if let Some(host) = host {
        config.addr.set_ip(host);
    }
    if let Some(port) = port {
        config.addr.set_port(port);
    }
    if let Some(ms) = poll_ms {
        if ms == 0 {
            return Err("--poll-ms must be positive".into());
        }
        config.observe.poll_interval = Duration::from_millis(ms);
    }

    let mut tree = match fixture {
        Some(path) => {
            println!("{} {}", "Loading fixture".cyan(), path.display());
            TreeBuilder::load(path)?.build()?
        }
        None => demo_tree()?,
    };
    tree.register_standard_methods();
    let objects = tree.node_count();

    println!("{}", "Starting Lantern server...".cyan());
    let server = Server::start(config, move || tree)?;
    println!(
        "{} Hosting {} objects, polling every {}ms",
        "✓".green(),
        objects.to_string().cyan(),
        server.config().observe.poll_interval.as_millis()
    );
    println!("{} Listening on ws://{}", "✓".green(), server.config().addr);
    println!("  Press {} to stop", "Ctrl+C".cyan());

    let result = server
        .serve_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await;
    server.shutdown();
    result?;
    println!("{} Server stopped", "✓".green());
    Ok(())
}

/// A small window used when no fixture is given.
fn demo_tree() -> Result<ObjectTree> {
    let window = NodeSpec::new("Window")
        .named("Main")
        .child(
            NodeSpec::new("Panel")
                .named("login")
                .child(
                    NodeSpec::new("TextField")
                        .named("user")
                        .property("text", "")
                        .property("placeholder", "User name"),
                )
                .child(
                    NodeSpec::new("CheckBox")
                        .named("remember")
                        .property("text", "Remember me")
                        .property("checked", false),
                )
                .child(NodeSpec::new("Button").named("ok").property("text", "OK")),
        )
        .child(
            NodeSpec::new("Label")
                .named("status")
                .property("text", "Ready"),
        );
    Ok(TreeBuilder::new().root(window).build()?)
}

/// Print the object tree.
pub async fn tree(url: &str, root: Option<&str>) -> Result<()> {
    let root = root.map(parse_query).transpose()?;
    let mut client = Client::connect(url).await?;
    let result = client.call(GetTree::METHOD, json!({ "root": root })).await?;
    let roots: Vec<TreeNode> = serde_json::from_value(result["roots"].clone())?;

    if roots.is_empty() {
        println!("No objects");
        return Ok(());
    }

    let mut stack: Vec<(&TreeNode, usize)> = roots.iter().rev().map(|n| (n, 0)).collect();
    while let Some((node, depth)) = stack.pop() {
        println!("{}{}", "  ".repeat(depth), describe(&node.object));
        for child in node.children.iter().rev() {
            stack.push((child, depth + 1));
        }
    }
    Ok(())
}

/// Find objects matching a query.
pub async fn find(url: &str, query: &str) -> Result<()> {
    let query = parse_query(query)?;
    let mut client = Client::connect(url).await?;
    let result = client.call(Find::METHOD, json!({ "query": query })).await?;
    let objects: Vec<Query> = serde_json::from_value(result["objects"].clone())?;

    if objects.is_empty() {
        println!("No matches found for {}", query);
        return Ok(());
    }

    println!("Found {} matches:\n", objects.len());
    for object in &objects {
        println!("  {}", describe(object));
    }
    Ok(())
}

/// Show the properties of one object.
pub async fn props(url: &str, query: &str) -> Result<()> {
    let query = parse_query(query)?;
    let mut client = Client::connect(url).await?;
    let result = client
        .call(GetProperties::METHOD, json!({ "query": query }))
        .await?;

    let empty = Vec::new();
    let properties = result["properties"].as_array().unwrap_or(&empty);
    println!("{}", query.to_string().cyan().bold());
    for property in properties {
        let name = property["name"].as_str().unwrap_or_default();
        let marker = if property["read_only"] == json!(true) {
            " (read-only)".dimmed().to_string()
        } else {
            String::new()
        };
        println!("  {} {}{}", format!("{name}:").dimmed(), property["value"], marker);
    }
    Ok(())
}

/// Change a property of one object.
pub async fn set(url: &str, query: &str, property: &str, value: &str) -> Result<()> {
    let query = parse_query(query)?;
    let value = parse_value(value);
    let mut client = Client::connect(url).await?;
    client
        .call(
            UpdateProperty::METHOD,
            json!({ "object": query, "property": property, "value": value }),
        )
        .await?;
    println!("{} {} = {}", "✓".green(), property.cyan(), value);
    Ok(())
}

/// List the methods of one object.
pub async fn methods(url: &str, query: &str) -> Result<()> {
    let query = parse_query(query)?;
    let mut client = Client::connect(url).await?;
    let result = client.call(GetMethods::METHOD, json!({ "query": query })).await?;
    let methods: Vec<MethodInfo> = serde_json::from_value(result["methods"].clone())?;

    if methods.is_empty() {
        println!("{} has no methods", query);
        return Ok(());
    }
    for method in &methods {
        let parameters: Vec<String> = method
            .parameters
            .iter()
            .map(|p| format!("{}: {}", p.name, p.default))
            .collect();
        println!("  {}({})", method.name.cyan(), parameters.join(", ").dimmed());
    }
    Ok(())
}

/// Invoke a method on one object.
pub async fn call(url: &str, query: &str, method: &str, args: &[String]) -> Result<()> {
    let query = parse_query(query)?;
    let arguments: Vec<Value> = args.iter().map(|a| parse_value(a)).collect();
    let mut client = Client::connect(url).await?;
    let result = client
        .call(
            CallMethod::METHOD,
            json!({ "object": query, "method": method, "arguments": arguments }),
        )
        .await?;
    println!("{} {} returned {}", "✓".green(), method.cyan(), result["result"]);
    Ok(())
}

/// Stream structural changes.
pub async fn watch_tree(url: &str, root: Option<&str>) -> Result<()> {
    let root = root.map(parse_query).transpose()?;
    let mut client = Client::connect(url).await?;
    println!("{}", "Watching for changes...".cyan());
    client
        .stream(ListenTreeChanges::METHOD, json!({ "root": root }), |item| {
            let event: ChangeEvent = serde_json::from_value(item)?;
            print_change(&event);
            Ok(())
        })
        .await
}

/// Stream property changes of one object.
pub async fn watch_properties(url: &str, object: &str) -> Result<()> {
    let query = parse_query(object)?;
    let mut client = Client::connect(url).await?;
    println!("{} {}", "Watching properties of".cyan(), query);
    client
        .stream(
            ListenPropertyChanges::METHOD,
            json!({ "query": query }),
            |item| {
                let event: PropertyEvent = serde_json::from_value(item)?;
                print_property(&event);
                Ok(())
            },
        )
        .await
}

/// Switch observation on or off.
pub async fn observer(url: &str, start: bool) -> Result<()> {
    let method = if start {
        StartObserver::METHOD
    } else {
        StopObserver::METHOD
    };
    let mut client = Client::connect(url).await?;
    let result = client.call(method, json!({})).await?;
    let state = if result["observing"] == json!(true) {
        "on".green()
    } else {
        "off".yellow()
    };
    println!("{} Observation is {}", "✓".green(), state);
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Output
// ─────────────────────────────────────────────────────────────────────────────

fn describe(object: &Query) -> String {
    if object.is_empty() {
        return "(none)".dimmed().to_string();
    }
    let type_name = object.get("type").and_then(Value::as_str).unwrap_or("?");
    let path = object.get("path").and_then(Value::as_str).unwrap_or("");
    let mut line = format!("{} {}", type_name.yellow(), path.cyan());
    if let Some(props) = object.get("properties").and_then(Value::as_object) {
        if !props.is_empty() {
            line.push_str(&format!(" {}", Value::Object(props.clone()).to_string().dimmed()));
        }
    }
    line
}

fn print_change(event: &ChangeEvent) {
    match event {
        ChangeEvent::Added { object, parent } => {
            println!("{} {} under {}", "+".green(), describe(object), describe(parent))
        }
        ChangeEvent::Removed { object } => println!("{} {}", "-".red(), describe(object)),
        ChangeEvent::Reparented { object, parent } => {
            println!("{} {} to {}", "→".cyan(), describe(object), describe(parent))
        }
        ChangeEvent::Renamed {
            old_object,
            new_object,
        } => println!(
            "{} {} is now {}",
            "~".yellow(),
            describe(old_object),
            describe(new_object)
        ),
    }
}

fn print_property(event: &PropertyEvent) {
    match event {
        PropertyEvent::Added {
            property,
            value,
            read_only,
        } => {
            let marker = if *read_only { " (read-only)" } else { "" };
            println!("{} {} = {}{}", "+".green(), property.cyan(), value, marker.dimmed())
        }
        PropertyEvent::Removed { property } => println!("{} {}", "-".red(), property.cyan()),
        PropertyEvent::Updated {
            property,
            old_value,
            new_value,
        } => println!(
            "{} {}: {} → {}",
            "~".yellow(),
            property.cyan(),
            old_value.to_string().dimmed(),
            new_value
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lantern_core::{HostGraph, Searcher};

    #[test]
    fn test_demo_tree_is_addressable() {
        let tree = demo_tree().unwrap();
        let searcher = Searcher::new();
        let ok = searcher
            .resolve_one(&tree, &Query::by_path("Main/login/ok"))
            .unwrap();
        assert_eq!(tree.type_name(ok), Some("Button"));

        let described = searcher.describe(&tree, ok);
        assert!(describe(&described).contains("Main/login/ok"));
    }

    #[test]
    fn test_describe_empty_query() {
        colored::control::set_override(false);
        assert_eq!(describe(&Query::new()), "(none)");
    }
}
