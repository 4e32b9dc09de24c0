//! WebSocket server implementation.
//!
//! Each connection gets a reader loop and a reply channel. Requests are
//! handed to the transport, which routes them to armed calls; whatever the
//! calls send back arrives on the reply channel and is written to the
//! socket. Closing the socket cancels every call the connection started.

use crate::completion::{completion_queue, CompletionSender};
use crate::config::ServerConfig;
use crate::context::HostContext;
use crate::dispatcher::CompletionDispatcher;
use crate::error::ServerError;
use crate::owner::{OwnerHandle, OwnerThread};
use crate::protocol::{Outbound, Request, Response, CANCEL};
use crate::services;
use crate::transport::{ConnectionId, IncomingCall, ReplySink, Transport};
use futures_util::{SinkExt, StreamExt};
use lantern_core::{HostGraph, Searcher};
use std::any::Any;
use std::future::Future;
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// The Lantern server: owner thread, completion dispatcher and transport.
pub struct Server {
    config: ServerConfig,
    transport: Transport,
    completions: CompletionSender,
    owner: Option<OwnerThread<HostContext>>,
    dispatcher: Option<CompletionDispatcher>,
}

impl Server {
    /// Starts the owner thread and the dispatcher and arms every method.
    ///
    /// `graph` runs on the owner thread and builds the host graph there,
    /// so the graph itself never crosses threads.
    pub fn start<F, G>(config: ServerConfig, graph: F) -> Result<Self, ServerError>
    where
        F: FnOnce() -> G + Send + 'static,
        G: HostGraph + Any,
    {
        Self::start_with_searcher(config, graph, Searcher::new)
    }

    /// Like `start`, with a custom searcher (extra strategies or property
    /// registrations).
    pub fn start_with_searcher<F, G, S>(
        config: ServerConfig,
        graph: F,
        searcher: S,
    ) -> Result<Self, ServerError>
    where
        F: FnOnce() -> G + Send + 'static,
        G: HostGraph + Any,
        S: FnOnce() -> Searcher + Send + 'static,
    {
        let (completions, queue) = completion_queue();
        let transport = Transport::new(completions.clone());
        services::register(&transport);

        let observe = config.observe.clone();
        let context_transport = transport.clone();
        let owner = OwnerThread::spawn("lantern-owner", observe.poll_interval, move || {
            HostContext::new(
                graph(),
                searcher(),
                context_transport,
                observe.enabled_on_start,
            )
        })?;
        let dispatcher = CompletionDispatcher::spawn(queue, owner.handle())?;
        owner.handle().post(services::arm_all)?;

        Ok(Self {
            config,
            transport,
            completions,
            owner: Some(owner),
            dispatcher: Some(dispatcher),
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Handle for running code against the host graph on its own thread.
    pub fn owner(&self) -> Option<OwnerHandle<HostContext>> {
        self.owner.as_ref().map(OwnerThread::handle)
    }

    /// Runs the server forever.
    pub async fn serve(&self) -> Result<(), ServerError> {
        self.serve_until(std::future::pending()).await
    }

    /// Binds the configured address and accepts connections until
    /// `shutdown` resolves.
    pub async fn serve_until<S>(&self, shutdown: S) -> Result<(), ServerError>
    where
        S: Future<Output = ()>,
    {
        let addr = self.config.addr;
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            error!("cannot bind {}: {}", addr, e);
            lantern_core::Error::Fatal(format!("cannot bind {addr}: {e}"))
        })?;
        self.serve_listener(listener, shutdown).await
    }

    /// Accepts connections on an already bound listener until `shutdown`
    /// resolves.
    pub async fn serve_listener<S>(&self, listener: TcpListener, shutdown: S) -> Result<(), ServerError>
    where
        S: Future<Output = ()>,
    {
        info!("Lantern server listening on ws://{}", listener.local_addr()?);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        debug!("New connection from {}", addr);
                        let transport = self.transport.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, addr, transport).await {
                                warn!("Connection error from {}: {}", addr, e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("Accept error: {}", e);
                    }
                },
                _ = &mut shutdown => {
                    info!("shutdown requested");
                    return Ok(());
                }
            }
        }
    }

    /// Fails every outstanding call, then stops the dispatcher and the
    /// owner thread, in that order.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.transport.shutdown();
        self.completions.shutdown();
        if let Some(dispatcher) = self.dispatcher.take() {
            dispatcher.join();
        }
        if let Some(owner) = self.owner.take() {
            owner.stop();
        }
        info!("Lantern server stopped");
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        if self.owner.is_some() {
            self.stop();
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Connections
// ─────────────────────────────────────────────────────────────────────────────

/// Handles a single WebSocket connection.
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    transport: Transport,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let ws_stream = accept_async(stream).await?;
    let connection = Uuid::new_v4();
    info!("WebSocket connection {} established with {}", connection, addr);

    let result = pump(ws_stream, connection, &transport).await;
    transport.connection_closed(connection);
    info!("Connection closed: {}", addr);
    result
}

async fn pump(
    ws_stream: tokio_tungstenite::WebSocketStream<TcpStream>,
    connection: ConnectionId,
    transport: &Transport,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let (mut write, mut read) = ws_stream.split();
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<Outbound>();

    loop {
        tokio::select! {
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    route_message(&text, connection, &reply_tx, transport);
                }
                Some(Ok(Message::Ping(data))) => {
                    write.send(Message::Pong(data)).await?;
                }
                Some(Ok(Message::Close(_))) | None => {
                    debug!("Client {} disconnected", connection);
                    break;
                }
                Some(Err(e)) => {
                    warn!("Message error from {}: {}", connection, e);
                    break;
                }
                _ => {}
            },
            Some(outbound) = reply_rx.recv() => {
                let json = outbound.to_json()?;
                write.send(Message::Text(json)).await?;
            }
        }
    }
    Ok(())
}

/// Parses one text frame and hands it to the transport.
fn route_message(text: &str, connection: ConnectionId, reply: &ReplySink, transport: &Transport) {
    let request: Request = match serde_json::from_str(text) {
        Ok(r) => r,
        Err(_) => {
            let _ = reply.send(Outbound::Raw(Response::parse_error()));
            return;
        }
    };

    debug!("Processing method: {}", request.method);

    if request.method == CANCEL {
        match request.params.get("id") {
            Some(id) => transport.cancel(connection, id),
            None => warn!("{} without an id", CANCEL),
        }
        return;
    }

    transport.deliver(IncomingCall {
        connection,
        request_id: request.id,
        method: request.method,
        params: request.params,
        reply: reply.clone(),
    });
}
