//! TCP listener and per-connection tasks.

use std::sync::Arc;

use anyhow::Result;
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

use rg_engine::RiskEngine;

use crate::codec::{Frame, WireCodec};

/// Accept connections until cancelled, spawning one task per connection.
///
/// Rule work runs inline on the connection task that delivered the event,
/// so responses for one connection are written in request order.
pub async fn serve(
    listener: TcpListener,
    engine: Arc<RiskEngine>,
    cancel: CancellationToken,
    max_message_bytes: usize,
) -> Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "listening");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        let engine = engine.clone();
                        let cancel = cancel.clone();
                        tokio::spawn(async move {
                            tracing::debug!(%peer, "connection opened");
                            handle_connection(stream, engine, cancel, max_message_bytes).await;
                            tracing::debug!(%peer, "connection closed");
                        });
                    }
                    Err(error) => {
                        tracing::warn!(%error, "accept failed");
                    }
                }
            }
        }
    }

    tracing::info!(%addr, "listener stopped");
    Ok(())
}

async fn handle_connection(
    stream: TcpStream,
    engine: Arc<RiskEngine>,
    cancel: CancellationToken,
    max_message_bytes: usize,
) {
    stream.set_nodelay(true).ok();
    let mut framed = Framed::new(stream, WireCodec::new(max_message_bytes));

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            frame = framed.next() => {
                match frame {
                    None => break,
                    Some(Err(error)) => {
                        // Protocol or transport error: tear this
                        // connection down, others are unaffected.
                        tracing::warn!(%error, "dropping connection");
                        break;
                    }
                    Some(Ok(Frame::Close)) => {
                        tracing::debug!("peer requested close");
                        break;
                    }
                    Some(Ok(Frame::Message(msg))) => {
                        if let Some(response) = engine.handle(&msg) {
                            if let Err(error) = framed.send(&response).await {
                                tracing::warn!(%error, "response write failed");
                                break;
                            }
                        }
                    }
                }
            }
        }
    }
}
