//! Minimal WebSocket JSON-RPC client for talking to a running server.

use futures_util::{SinkExt, StreamExt};
use lantern_core::Query;
use lantern_server::{Request, Response, CANCEL, STREAM_ITEM};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream,
};
use tracing::debug;

pub const DEFAULT_URL: &str = "ws://127.0.0.1:5010";

type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

/// Reads a query argument: JSON if it looks like JSON, a path otherwise.
pub fn parse_query(text: &str) -> Result<Query> {
    let trimmed = text.trim();
    if trimmed.starts_with('{') {
        Ok(Query::try_parse(trimmed)?)
    } else {
        Ok(Query::by_path(trimmed))
    }
}

/// Reads a property value: JSON if it parses, a plain string otherwise.
pub fn parse_value(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

pub struct Client {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    next_id: u64,
}

impl Client {
    pub async fn connect(url: &str) -> Result<Self> {
        let (ws, _) = connect_async(url)
            .await
            .map_err(|e| format!("cannot connect to {url}: {e}"))?;
        debug!("connected to {}", url);
        Ok(Self { ws, next_id: 0 })
    }

    async fn send(&mut self, method: &str, params: Value) -> Result<Value> {
        self.next_id += 1;
        let id = json!(self.next_id);
        let request = Request::new(id.clone(), method, params);
        self.ws
            .send(Message::Text(serde_json::to_string(&request)?))
            .await?;
        Ok(id)
    }

    async fn next_frame(&mut self) -> Result<Option<Value>> {
        while let Some(message) = self.ws.next().await {
            match message? {
                Message::Text(text) => return Ok(Some(serde_json::from_str(&text)?)),
                Message::Close(_) => return Ok(None),
                _ => continue,
            }
        }
        Ok(None)
    }

    /// Calls a unary method and returns its result.
    pub async fn call(&mut self, method: &str, params: Value) -> Result<Value> {
        let id = self.send(method, params).await?;
        loop {
            let Some(frame) = self.next_frame().await? else {
                return Err("connection closed before a response arrived".into());
            };
            if frame.get("id") == Some(&id) {
                return into_result(frame);
            }
        }
    }

    /// Opens a stream and passes every item to `on_item` until the server
    /// ends it or the user interrupts.
    pub async fn stream<F>(&mut self, method: &str, params: Value, mut on_item: F) -> Result<()>
    where
        F: FnMut(Value) -> Result<()>,
    {
        let id = self.send(method, params).await?;
        loop {
            let frame = tokio::select! {
                frame = self.next_frame() => frame?,
                _ = tokio::signal::ctrl_c() => {
                    self.send(CANCEL, json!({ "id": id })).await?;
                    return Ok(());
                }
            };
            let Some(frame) = frame else {
                return Err("connection closed".into());
            };
            if frame.get("method").and_then(Value::as_str) == Some(STREAM_ITEM) {
                if frame["params"]["id"] == id {
                    on_item(frame["params"]["item"].clone())?;
                }
            } else if frame.get("id") == Some(&id) {
                into_result(frame)?;
                return Ok(());
            }
        }
    }
}

fn into_result(frame: Value) -> Result<Value> {
    let response: Response = serde_json::from_value(frame)?;
    match response.error {
        Some(error) => Err(format!("{} ({})", error.message, error.code).into()),
        None => Ok(response.result.unwrap_or(Value::Null)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_query() {
        let path = parse_query("Main/ok").unwrap();
        assert_eq!(path.get("path"), Some(&json!("Main/ok")));

        let query = parse_query(r#"{"type":"Button"}"#).unwrap();
        assert_eq!(query.get("type"), Some(&json!("Button")));

        assert!(parse_query("{broken").is_err());
    }

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value("true"), json!(true));
        assert_eq!(parse_value("42"), json!(42));
        assert_eq!(parse_value("\"quoted\""), json!("quoted"));
        assert_eq!(parse_value("plain words"), json!("plain words"));
    }

    #[test]
    fn test_error_response_becomes_error() {
        let frame = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": { "code": -32001, "message": "no such object" }
        });
        let err = into_result(frame).unwrap_err();
        assert!(err.to_string().contains("no such object"));

        let ok = json!({ "jsonrpc": "2.0", "id": 1, "result": { "observing": true } });
        assert_eq!(into_result(ok).unwrap(), json!({ "observing": true }));
    }
}
