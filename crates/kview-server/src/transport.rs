//! Duplex frame transport split into a write half and a read half.
//!
//! The session loops only see [`FrameSink`] and [`FrameSource`]; deadlines
//! are applied by the loops, not by the transport. [`split_websocket`]
//! adapts an axum `WebSocket`.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tracing::debug;

/// A transport-level frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    /// UTF-8 payload.
    Text(String),
    /// Keepalive probe.
    Ping,
    /// Keepalive acknowledgement.
    Pong,
    /// Close handshake.
    Close,
}

/// Transport failures. All are fatal to the session.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Writing a frame failed.
    #[error("send failed: {0}")]
    Send(String),
    /// Reading a frame failed.
    #[error("receive failed: {0}")]
    Receive(String),
}

/// Write half.
#[async_trait]
pub trait FrameSink: Send + 'static {
    /// Write one frame.
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError>;

    /// Close the underlying connection.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Read half.
#[async_trait]
pub trait FrameSource: Send + 'static {
    /// Next frame, or `None` once the peer has gone away.
    async fn recv(&mut self) -> Option<Result<Frame, TransportError>>;
}

/// Write half of an axum `WebSocket`.
pub struct WsSink(SplitSink<WebSocket, Message>);

/// Read half of an axum `WebSocket`.
pub struct WsSource(SplitStream<WebSocket>);

/// Split an upgraded socket into relay transport halves.
pub fn split_websocket(socket: WebSocket) -> (WsSink, WsSource) {
    let (tx, rx) = socket.split();
    (WsSink(tx), WsSource(rx))
}

#[async_trait]
impl FrameSink for WsSink {
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        let message = match frame {
            Frame::Text(text) => Message::Text(text.into()),
            Frame::Ping => Message::Ping(Vec::new().into()),
            Frame::Pong => Message::Pong(Vec::new().into()),
            Frame::Close => Message::Close(None),
        };
        self.0
            .send(message)
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.0
            .close()
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }
}

#[async_trait]
impl FrameSource for WsSource {
    async fn recv(&mut self) -> Option<Result<Frame, TransportError>> {
        loop {
            let frame = match self.0.next().await? {
                Ok(Message::Text(text)) => Frame::Text(text.to_string()),
                // Some clients send JSON in binary frames.
                Ok(Message::Binary(data)) => match String::from_utf8(data.to_vec()) {
                    Ok(text) => Frame::Text(text),
                    Err(_) => {
                        debug!(len = data.len(), "ignoring non-UTF8 binary frame");
                        continue;
                    }
                },
                Ok(Message::Ping(_)) => Frame::Ping,
                Ok(Message::Pong(_)) => Frame::Pong,
                Ok(Message::Close(_)) => Frame::Close,
                Err(e) => return Some(Err(TransportError::Receive(e.to_string()))),
            };
            return Some(Ok(frame));
        }
    }
}
