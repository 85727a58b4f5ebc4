use anyhow::Result;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use bytes::Bytes;
use futures::stream::StreamExt;
use serde::Deserialize;
use tokio::sync::broadcast;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tracing::Instrument;

/// Query parameters of the frames websocket.
#[derive(Deserialize, Debug, Copy, Clone, Eq, PartialEq, Default)]
pub struct FramesQuery {
    /// Only send one out of every `decimation` frames.
    decimation: Option<u32>,
}

impl FramesQuery {
    fn decimation(&self) -> u64 {
        u64::from(self.decimation.unwrap_or(1).max(1))
    }
}

pub async fn handler(
    State(sender): State<broadcast::Sender<Bytes>>,
    Query(query): Query<FramesQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let decimation = query.decimation();
    let span = tracing::debug_span!("frames", decimation);
    let frames = sender.subscribe();
    ws.on_upgrade(move |socket| {
        async move {
            if let Err(error) = stream_frames(socket, frames, decimation).await {
                tracing::error!(%error, "frames client error");
            }
        }
        .instrument(span)
    })
}

// Sends frame number `sequence` when it is a multiple of the decimation.
fn selected(sequence: u64, decimation: u64) -> bool {
    sequence % decimation == 0
}

async fn stream_frames(
    mut socket: WebSocket,
    frames: broadcast::Receiver<Bytes>,
    decimation: u64,
) -> Result<()> {
    tracing::info!("frames client connected");
    let mut frames = BroadcastStream::new(frames);
    let mut sequence = 0u64;
    loop {
        tokio::select! {
            frame = frames.next() => match frame {
                Some(Ok(frame)) => {
                    if selected(sequence, decimation) {
                        socket.send(Message::Binary(frame.into())).await?;
                    }
                    sequence += 1;
                }
                Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                    // skipped frames still count for the decimation
                    sequence += skipped;
                    tracing::debug!(skipped, "frames client lagged");
                }
                None => anyhow::bail!("frame capture stopped"),
            },
            message = socket.recv() => match message {
                // replies to pings are sent by axum; other messages are ignored
                Some(Ok(Message::Close(_))) | None => {
                    tracing::info!("frames client disconnected");
                    return Ok(());
                }
                Some(Ok(_)) => (),
                Some(Err(error)) => return Err(error.into()),
            },
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn decimation() {
        assert_eq!(FramesQuery::default().decimation(), 1);
        assert_eq!(FramesQuery { decimation: Some(0) }.decimation(), 1);
        assert_eq!(FramesQuery { decimation: Some(5) }.decimation(), 5);
        let sent: Vec<u64> = (0..10).filter(|&n| selected(n, 3)).collect();
        assert_eq!(sent, vec![0, 3, 6, 9]);
    }
}
