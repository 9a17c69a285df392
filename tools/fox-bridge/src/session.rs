// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-client WebSocket session.
//!
//! Each connected client gets a session that routes control messages into
//! the hub, forwards channel/service advertisements, and streams payload
//! frames for the channels it subscribed to. Subscriptions are refcounted
//! in the hub, so closing a session releases its share.

use crate::protocol::{binary_frame, ChannelInfo, ClientMessage, ServerMessage};
use crate::ws_sink::{BridgeEvent, ChannelRecord, ServiceRecord, WsSink};
use axum::extract::ws::{Message, WebSocket};
use base64::{engine::general_purpose, Engine as _};
use cybus_bridge::FanoutHub;
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

enum Outbound {
    Control(ServerMessage),
    Data(u32, Arc<Vec<u8>>),
}

/// A WebSocket client session.
pub struct ClientSession {
    hub: Arc<FanoutHub>,
    sink: Arc<WsSink>,
    /// Subscribed channels: channel_id -> channel name.
    subscriptions: Arc<DashMap<u32, String>>,
    session_id: String,
}

impl ClientSession {
    pub fn new(hub: Arc<FanoutHub>, sink: Arc<WsSink>) -> Self {
        let session_id = Uuid::new_v4().to_string()[..8].to_string();
        info!("[{}] new session", session_id);
        Self {
            hub,
            sink,
            subscriptions: Arc::new(DashMap::new()),
            session_id,
        }
    }

    /// Run the session until the client disconnects.
    pub async fn run(
        self,
        socket: WebSocket,
        server_name: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let (mut ws_tx, mut ws_rx) = socket.split();
        let (tx, mut rx) = mpsc::channel::<Outbound>(256);

        // Forward task: serialize outbound frames onto the socket.
        let forward_id = self.session_id.clone();
        let forward = tokio::spawn(async move {
            while let Some(out) = rx.recv().await {
                let frame = match out {
                    Outbound::Control(msg) => match serde_json::to_string(&msg) {
                        Ok(json) => Message::Text(json),
                        Err(e) => {
                            error!("[{}] serialize failed: {}", forward_id, e);
                            continue;
                        }
                    },
                    Outbound::Data(id, payload) => Message::Binary(binary_frame(id, &payload)),
                };
                if ws_tx.send(frame).await.is_err() {
                    debug!("[{}] socket send failed, closing", forward_id);
                    break;
                }
            }
        });

        // Welcome plus the current channel/service snapshot.
        tx.send(Outbound::Control(ServerMessage::welcome(server_name)))
            .await?;
        for record in self.sink.snapshot_channels() {
            tx.send(Outbound::Control(advertise_message(&record))).await?;
        }
        for record in self.sink.snapshot_services() {
            tx.send(Outbound::Control(service_message(&record))).await?;
        }

        // Event task: forward bridge events, filtering payload frames down
        // to this session's subscriptions.
        let mut events = self.sink.subscribe();
        let event_subs = Arc::clone(&self.subscriptions);
        let event_tx = tx.clone();
        let event_id = self.session_id.clone();
        let events_task = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(BridgeEvent::ChannelAdvertised(record)) => {
                        if event_tx
                            .send(Outbound::Control(advertise_message(&record)))
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    Ok(BridgeEvent::ChannelClosed { id, topic }) => {
                        event_subs.remove(&id);
                        if event_tx
                            .send(Outbound::Control(ServerMessage::ChannelClosed {
                                channel_id: id,
                                topic,
                            }))
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    Ok(BridgeEvent::ServiceAdvertised(record)) => {
                        if event_tx
                            .send(Outbound::Control(service_message(&record)))
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    Ok(BridgeEvent::Message { id, payload }) => {
                        if !event_subs.contains_key(&id) {
                            continue;
                        }
                        if event_tx.send(Outbound::Data(id, payload)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("[{}] lagged {} bridge events", event_id, n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        // Inbound loop.
        while let Some(msg) = ws_rx.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    if let Err(e) = self.handle_message(&text, &tx).await {
                        warn!("[{}] error handling message: {}", self.session_id, e);
                        let _ = tx
                            .send(Outbound::Control(ServerMessage::error(e.to_string())))
                            .await;
                    }
                }
                Ok(Message::Close(_)) => {
                    info!("[{}] client closed connection", self.session_id);
                    break;
                }
                Ok(Message::Binary(_)) => {
                    warn!("[{}] binary client frames not supported", self.session_id);
                }
                Ok(_) => {}
                Err(e) => {
                    error!("[{}] socket error: {}", self.session_id, e);
                    break;
                }
            }
        }

        forward.abort();
        events_task.abort();

        // Release this session's share of every subscription refcount.
        for entry in self.subscriptions.iter() {
            let _ = self.hub.on_external_unsubscribe(entry.value());
        }
        info!("[{}] session ended", self.session_id);

        Ok(())
    }

    async fn handle_message(
        &self,
        text: &str,
        tx: &mpsc::Sender<Outbound>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let msg: ClientMessage = match serde_json::from_str(text) {
            Ok(msg) => msg,
            Err(e) => {
                tx.send(Outbound::Control(ServerMessage::error(format!(
                    "invalid message: {e}"
                ))))
                .await?;
                return Ok(());
            }
        };

        debug!("[{}] received: {:?}", self.session_id, msg);

        match msg {
            ClientMessage::Subscribe { channel_id } => {
                let Some(name) = self.sink.channel_name(channel_id) else {
                    tx.send(Outbound::Control(ServerMessage::error(format!(
                        "unknown channel id {channel_id}"
                    ))))
                    .await?;
                    return Ok(());
                };
                if self.subscriptions.contains_key(&channel_id) {
                    tx.send(Outbound::Control(ServerMessage::topic_error(
                        "already subscribed",
                        name,
                    )))
                    .await?;
                    return Ok(());
                }
                match self.hub.on_external_subscribe(&name) {
                    Ok(()) => {
                        self.subscriptions.insert(channel_id, name.clone());
                        info!("[{}] subscribed to {}", self.session_id, name);
                        tx.send(Outbound::Control(ServerMessage::Subscribed { channel_id }))
                            .await?;
                    }
                    Err(e) => {
                        tx.send(Outbound::Control(ServerMessage::topic_error(
                            e.to_string(),
                            name,
                        )))
                        .await?;
                    }
                }
            }

            ClientMessage::Unsubscribe { channel_id } => {
                let Some((_, name)) = self.subscriptions.remove(&channel_id) else {
                    tx.send(Outbound::Control(ServerMessage::error(format!(
                        "not subscribed to channel id {channel_id}"
                    ))))
                    .await?;
                    return Ok(());
                };
                let _ = self.hub.on_external_unsubscribe(&name);
                info!("[{}] unsubscribed from {}", self.session_id, name);
                tx.send(Outbound::Control(ServerMessage::Unsubscribed { channel_id }))
                    .await?;
            }

            ClientMessage::Advertise { topic, schema_name } => {
                match self.hub.on_external_advertise(&topic, &schema_name) {
                    Ok(()) => {
                        info!(
                            "[{}] client advertised {} [{}]",
                            self.session_id, topic, schema_name
                        );
                        tx.send(Outbound::Control(ServerMessage::Advertised { topic }))
                            .await?;
                    }
                    Err(e) => {
                        tx.send(Outbound::Control(ServerMessage::topic_error(
                            e.to_string(),
                            topic,
                        )))
                        .await?;
                    }
                }
            }

            ClientMessage::Unadvertise { topic } => {
                match self.hub.on_external_unadvertise(&topic) {
                    Ok(()) => {
                        tx.send(Outbound::Control(ServerMessage::Unadvertised { topic }))
                            .await?;
                    }
                    Err(e) => {
                        tx.send(Outbound::Control(ServerMessage::topic_error(
                            e.to_string(),
                            topic,
                        )))
                        .await?;
                    }
                }
            }

            ClientMessage::Publish { topic, message } => {
                match self.hub.on_external_publish(&topic, &message.to_string()) {
                    Ok(()) => {
                        tx.send(Outbound::Control(ServerMessage::Published { topic }))
                            .await?;
                    }
                    Err(e) => {
                        tx.send(Outbound::Control(ServerMessage::topic_error(
                            e.to_string(),
                            topic,
                        )))
                        .await?;
                    }
                }
            }

            ClientMessage::ServiceCall {
                service,
                request,
                call_id,
            } => {
                // The call blocks up to the hub's timeout; keep it off the
                // async workers.
                let hub = Arc::clone(&self.hub);
                let name = service.clone();
                let request_text = request.to_string();
                let result = tokio::task::spawn_blocking(move || {
                    hub.on_service_call(&name, &request_text)
                })
                .await?;

                match result {
                    Ok(response_text) => {
                        let response = serde_json::from_str(&response_text)
                            .unwrap_or(serde_json::Value::String(response_text));
                        tx.send(Outbound::Control(ServerMessage::ServiceResponse {
                            service,
                            call_id,
                            response,
                        }))
                        .await?;
                    }
                    Err(e) => {
                        tx.send(Outbound::Control(ServerMessage::topic_error(
                            e.to_string(),
                            service,
                        )))
                        .await?;
                    }
                }
            }

            ClientMessage::GetParameters { names } => {
                let parameters = self.hub.get_parameters(&names);
                tx.send(Outbound::Control(ServerMessage::Parameters { parameters }))
                    .await?;
            }

            ClientMessage::SetParameters { parameters } => {
                let parameters = self.hub.set_parameters(parameters);
                tx.send(Outbound::Control(ServerMessage::Parameters { parameters }))
                    .await?;
            }

            ClientMessage::Ping { id } => {
                tx.send(Outbound::Control(ServerMessage::Pong { id })).await?;
            }
        }

        Ok(())
    }
}

fn advertise_message(record: &ChannelRecord) -> ServerMessage {
    ServerMessage::Advertise {
        channel: ChannelInfo {
            id: record.id,
            topic: record.topic.clone(),
            schema_name: record.schema_name.clone(),
            schema: general_purpose::STANDARD.encode(&record.descriptor),
            encoding: "protobuf".to_string(),
        },
    }
}

fn service_message(record: &ServiceRecord) -> ServerMessage {
    let parse = |schema: &str| {
        serde_json::from_str(schema).unwrap_or(serde_json::Value::String(schema.to_string()))
    };
    ServerMessage::ServiceAdvertised {
        service: record.name.clone(),
        request_schema: parse(&record.request_schema),
        response_schema: parse(&record.response_schema),
    }
}
