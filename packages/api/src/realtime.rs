//! # Realtime change feed
//!
//! Client for the backend's Phoenix-channel websocket, restricted to what
//! list pages need: subscribe to row changes on one table (optionally
//! filtered, e.g. `user_id=eq.<id>`) and receive them as
//! [`ChangeEvent<Value>`](store::ChangeEvent).
//!
//! ## Protocol (vsn 1.0.0, JSON objects)
//!
//! | Direction | Event | Payload |
//! |-----------|-------|---------|
//! | out | `phx_join` | `{config: {postgres_changes: [{event, schema, table, filter?}]}, access_token}` |
//! | in | `phx_reply` | `{status: "ok" \| "error", response}` |
//! | out | `heartbeat` (topic `phoenix`) | `{}`, every [`HEARTBEAT_INTERVAL`] |
//! | in | `postgres_changes` | `{data: {type, record, old_record, commit_timestamp}}` |
//! | in | `phx_error` / `phx_close` | channel is gone |
//!
//! ## Lifetime
//!
//! A [`ChangeFeed`] does no work on its own. The owner awaits
//! [`ChangeFeed::next_change`] in a task; heartbeats are sent from inside
//! that call. Dropping the feed closes the socket, so cancelling the task is
//! the whole teardown.
//!
//! Transport is `tokio-tungstenite` natively and `gloo-net` on wasm32.

use std::future::Future;
use std::pin::{pin, Pin};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::{select, Either};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use store::{time, ChangeEvent, ChangeKind};

use crate::config::BackendConfig;

pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RealtimeError {
    #[error("realtime connection failed: {0}")]
    Connection(String),

    #[error("realtime subscription rejected: {0}")]
    Rejected(String),

    #[error("realtime protocol error: {0}")]
    Protocol(String),

    #[error("realtime channel closed")]
    Closed,
}

/// One Phoenix channel message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhxMessage {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub msg_ref: Option<String>,
}

/// Row changes to listen for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub table: String,
    /// PostgREST-style row filter, e.g. `user_id=eq.42`.
    pub filter: Option<String>,
}

impl Subscription {
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            filter: None,
        }
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn topic(&self) -> String {
        match &self.filter {
            Some(filter) => format!("realtime:public:{}:{filter}", self.table),
            None => format!("realtime:public:{}", self.table),
        }
    }

    pub fn join_message(&self, access_token: Option<&str>, msg_ref: u64) -> PhxMessage {
        let mut change = json!({ "event": "*", "schema": "public", "table": self.table });
        if let Some(filter) = &self.filter {
            change["filter"] = json!(filter);
        }
        let mut payload = json!({
            "config": {
                "broadcast": { "ack": false, "self": false },
                "presence": { "key": "" },
                "postgres_changes": [change],
            },
        });
        if let Some(token) = access_token {
            payload["access_token"] = json!(token);
        }
        PhxMessage {
            topic: self.topic(),
            event: "phx_join".into(),
            payload,
            msg_ref: Some(msg_ref.to_string()),
        }
    }
}

pub fn heartbeat_message(msg_ref: u64) -> PhxMessage {
    PhxMessage {
        topic: "phoenix".into(),
        event: "heartbeat".into(),
        payload: json!({}),
        msg_ref: Some(msg_ref.to_string()),
    }
}

/// What an incoming frame means for a subscriber of `topic`.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Change(ChangeEvent<Value>),
    Joined,
    Ignored,
}

#[derive(Deserialize)]
struct ChangePayload {
    data: ChangeData,
}

#[derive(Deserialize)]
struct ChangeData {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    record: Option<Value>,
    #[serde(default)]
    old_record: Option<Value>,
    #[serde(default)]
    commit_timestamp: Option<DateTime<Utc>>,
}

/// Interpret one text frame.
pub fn decode_frame(text: &str, topic: &str) -> Result<Frame, RealtimeError> {
    let message: PhxMessage =
        serde_json::from_str(text).map_err(|e| RealtimeError::Protocol(e.to_string()))?;
    if message.topic != topic {
        return Ok(Frame::Ignored);
    }
    match message.event.as_str() {
        "phx_reply" => {
            let status = message.payload.get("status").and_then(Value::as_str);
            match status {
                Some("ok") => Ok(Frame::Joined),
                _ => Err(RealtimeError::Rejected(
                    message
                        .payload
                        .pointer("/response/reason")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown reason")
                        .to_string(),
                )),
            }
        }
        "postgres_changes" => decode_change(message.payload).map(Frame::Change),
        "phx_error" | "phx_close" => Err(RealtimeError::Closed),
        _ => Ok(Frame::Ignored),
    }
}

fn decode_change(payload: Value) -> Result<ChangeEvent<Value>, RealtimeError> {
    let ChangePayload { data } =
        serde_json::from_value(payload).map_err(|e| RealtimeError::Protocol(e.to_string()))?;
    let kind = match data.kind.as_str() {
        "INSERT" => ChangeKind::Insert,
        "UPDATE" => ChangeKind::Update,
        "DELETE" => ChangeKind::Delete,
        other => return Err(RealtimeError::Protocol(format!("unknown change type {other}"))),
    };
    let record = match kind {
        ChangeKind::Delete => None,
        _ => data.record,
    };
    let key = record
        .as_ref()
        .or(data.old_record.as_ref())
        .and_then(|row| row.get("id"))
        .and_then(|id| match id {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .ok_or_else(|| RealtimeError::Protocol("change without a row id".into()))?;
    Ok(ChangeEvent {
        kind,
        key,
        record,
        commit_timestamp: data.commit_timestamp,
    })
}

fn encode(message: &PhxMessage) -> Result<String, RealtimeError> {
    serde_json::to_string(message).map_err(|e| RealtimeError::Protocol(e.to_string()))
}

/// A joined realtime channel.
pub struct ChangeFeed {
    socket: transport::Socket,
    topic: String,
    next_ref: u64,
    heartbeat: Pin<Box<dyn Future<Output = ()>>>,
}

impl ChangeFeed {
    /// Open the socket and join the channel for `subscription`. Returns once
    /// the join is acknowledged.
    pub async fn connect(
        config: &BackendConfig,
        access_token: Option<&str>,
        subscription: &Subscription,
    ) -> Result<Self, RealtimeError> {
        let mut socket = transport::Socket::connect(&config.realtime_url()).await?;
        socket
            .send(encode(&subscription.join_message(access_token, 1))?)
            .await?;

        let topic = subscription.topic();
        loop {
            let text = socket.next_text().await.ok_or(RealtimeError::Closed)??;
            if decode_frame(&text, &topic)? == Frame::Joined {
                break;
            }
        }
        tracing::debug!(%topic, "realtime channel joined");

        Ok(Self {
            socket,
            topic,
            next_ref: 2,
            heartbeat: Box::pin(time::sleep(HEARTBEAT_INTERVAL)),
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Wait for the next row change. `None` once the server closes the
    /// socket.
    pub async fn next_change(&mut self) -> Option<Result<ChangeEvent<Value>, RealtimeError>> {
        loop {
            let frame = {
                let next = pin!(self.socket.next_text());
                match select(self.heartbeat.as_mut(), next).await {
                    Either::Left(((), _)) => None,
                    Either::Right((frame, _)) => Some(frame),
                }
            };

            let Some(frame) = frame else {
                self.heartbeat = Box::pin(time::sleep(HEARTBEAT_INTERVAL));
                let msg_ref = self.next_ref;
                self.next_ref += 1;
                let sent = match encode(&heartbeat_message(msg_ref)) {
                    Ok(text) => self.socket.send(text).await,
                    Err(e) => Err(e),
                };
                if let Err(e) = sent {
                    return Some(Err(e));
                }
                continue;
            };

            match frame? {
                Ok(text) => match decode_frame(&text, &self.topic) {
                    Ok(Frame::Change(event)) => return Some(Ok(event)),
                    Ok(_) => continue,
                    Err(e) => return Some(Err(e)),
                },
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
mod transport {
    use futures::{SinkExt, StreamExt};
    use tokio_tungstenite::tungstenite::Message;
    use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

    use super::RealtimeError;

    pub struct Socket(WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>);

    impl Socket {
        pub async fn connect(url: &str) -> Result<Self, RealtimeError> {
            let (stream, _response) = connect_async(url)
                .await
                .map_err(|e| RealtimeError::Connection(e.to_string()))?;
            Ok(Self(stream))
        }

        pub async fn send(&mut self, text: String) -> Result<(), RealtimeError> {
            self.0
                .send(Message::Text(text))
                .await
                .map_err(|e| RealtimeError::Connection(e.to_string()))
        }

        pub async fn next_text(&mut self) -> Option<Result<String, RealtimeError>> {
            loop {
                match self.0.next().await? {
                    Ok(Message::Text(text)) => return Some(Ok(text)),
                    Ok(Message::Close(_)) => return None,
                    // Ping/pong are answered by tungstenite.
                    Ok(_) => continue,
                    Err(e) => return Some(Err(RealtimeError::Connection(e.to_string()))),
                }
            }
        }
    }
}

#[cfg(target_arch = "wasm32")]
mod transport {
    use futures::{SinkExt, StreamExt};
    use gloo_net::websocket::futures::WebSocket;
    use gloo_net::websocket::{Message, WebSocketError};

    use super::RealtimeError;

    pub struct Socket(WebSocket);

    impl Socket {
        pub async fn connect(url: &str) -> Result<Self, RealtimeError> {
            WebSocket::open(url)
                .map(Self)
                .map_err(|e| RealtimeError::Connection(e.to_string()))
        }

        pub async fn send(&mut self, text: String) -> Result<(), RealtimeError> {
            self.0
                .send(Message::Text(text))
                .await
                .map_err(|e| RealtimeError::Connection(e.to_string()))
        }

        pub async fn next_text(&mut self) -> Option<Result<String, RealtimeError>> {
            loop {
                match self.0.next().await? {
                    Ok(Message::Text(text)) => return Some(Ok(text)),
                    Ok(Message::Bytes(_)) => continue,
                    Err(WebSocketError::ConnectionClose(_)) => return None,
                    Err(e) => return Some(Err(RealtimeError::Connection(e.to_string()))),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use store::{Collection, InvestmentPlan};

    use super::*;

    #[test]
    fn test_join_message() {
        let sub = Subscription::table("transactions").filter("user_id=eq.u1");
        let join = sub.join_message(Some("jwt"), 1);
        assert_eq!(join.topic, "realtime:public:transactions:user_id=eq.u1");
        assert_eq!(join.event, "phx_join");
        assert_eq!(
            join.payload["config"]["postgres_changes"][0],
            json!({ "event": "*", "schema": "public", "table": "transactions", "filter": "user_id=eq.u1" })
        );
        assert_eq!(join.payload["access_token"], "jwt");

        let wire: Value = serde_json::from_str(&encode(&join).unwrap()).unwrap();
        assert_eq!(wire["ref"], "1");
    }

    #[test]
    fn test_heartbeat_message() {
        let wire: Value = serde_json::from_str(&encode(&heartbeat_message(7)).unwrap()).unwrap();
        assert_eq!(
            wire,
            json!({ "topic": "phoenix", "event": "heartbeat", "payload": {}, "ref": "7" })
        );
    }

    const TOPIC: &str = "realtime:public:investment_plans";

    fn frame(event: &str, payload: Value) -> String {
        json!({ "topic": TOPIC, "event": event, "payload": payload, "ref": null }).to_string()
    }

    #[test]
    fn test_join_reply() {
        assert_eq!(
            decode_frame(&frame("phx_reply", json!({ "status": "ok", "response": {} })), TOPIC),
            Ok(Frame::Joined)
        );
        assert_eq!(
            decode_frame(
                &frame("phx_reply", json!({ "status": "error", "response": { "reason": "unauthorized" } })),
                TOPIC
            ),
            Err(RealtimeError::Rejected("unauthorized".into()))
        );
        assert_eq!(decode_frame(&frame("phx_close", json!({})), TOPIC), Err(RealtimeError::Closed));
    }

    #[test]
    fn test_other_topics_ignored() {
        let reply = json!({ "topic": "phoenix", "event": "phx_reply", "payload": { "status": "ok" }, "ref": "3" });
        assert_eq!(decode_frame(&reply.to_string(), TOPIC), Ok(Frame::Ignored));
        assert_eq!(decode_frame(&frame("presence_state", json!({})), TOPIC), Ok(Frame::Ignored));
    }

    #[test]
    fn test_delete_reduces_cached_list() {
        let delete = frame(
            "postgres_changes",
            json!({ "ids": [1], "data": {
                "schema": "public", "table": "investment_plans", "type": "DELETE",
                "commit_timestamp": "2025-10-09T12:00:00Z",
                "old_record": { "id": "p2" }, "record": null, "errors": null
            }}),
        );
        let Frame::Change(event) = decode_frame(&delete, TOPIC).unwrap() else {
            panic!("expected a change");
        };
        assert_eq!(event.kind, ChangeKind::Delete);
        assert_eq!(event.key, "p2");
        assert!(event.record.is_none());

        let plan = |id: &str| -> InvestmentPlan {
            serde_json::from_value(json!({
                "id": id, "name": id, "min_amount": 100, "return_percentage": 5,
                "duration_days": 30, "total_return": 105
            }))
            .unwrap()
        };
        let mut plans = Collection::new();
        plans.replace_all(vec![plan("p1"), plan("p2"), plan("p3")]);
        plans.apply(event.decode::<InvestmentPlan>().unwrap());
        let ids: Vec<_> = plans.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["p1", "p3"]);
    }

    #[test]
    fn test_insert_with_numeric_id() {
        let insert = frame(
            "postgres_changes",
            json!({ "data": {
                "type": "INSERT", "commit_timestamp": "2025-10-09T12:00:00.512Z",
                "record": { "id": 42, "name": "Silver" }
            }}),
        );
        let Frame::Change(event) = decode_frame(&insert, TOPIC).unwrap() else {
            panic!("expected a change");
        };
        assert_eq!(event.kind, ChangeKind::Insert);
        assert_eq!(event.key, "42");
        assert!(event.commit_timestamp.is_some());
    }

    #[test]
    fn test_malformed_change() {
        let bad = frame("postgres_changes", json!({ "data": { "type": "TRUNCATE" } }));
        assert!(matches!(decode_frame(&bad, TOPIC), Err(RealtimeError::Protocol(_))));
        assert!(matches!(decode_frame("not json", TOPIC), Err(RealtimeError::Protocol(_))));
    }
}
