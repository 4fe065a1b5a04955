//! The WebSocket event feed: subscribers receive every lifecycle event of
//! their chain as a JSON text frame.

use crate::events::{CoordinatorEvent, EventBus};
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use warp::{
    ws::{Message, WebSocket},
    Filter, Rejection, Reply,
};

pub fn filter(events: EventBus) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::path!(u64 / "v2" / "requests")
        .and(warp::ws())
        .map(move |chain_id: u64, ws: warp::ws::Ws| {
            let events = events.clone();
            ws.on_upgrade(move |socket| forward_events(socket, events, chain_id))
        })
}

async fn forward_events(socket: WebSocket, events: EventBus, chain_id: u64) {
    let Some(mut receiver) = events.subscribe(chain_id) else {
        tracing::debug!(chain_id, "event subscription for unknown chain");
        let _ = socket.close().await;
        return;
    };
    let (mut sink, _) = socket.split();

    loop {
        match receiver.recv().await {
            Ok(event) => {
                if send_event(&mut sink, &event).await.is_err() {
                    // Subscriber went away; delivery is best effort.
                    break;
                }
            }
            // A slow subscriber missed events. There is no retry: they can
            // only continue with the live stream.
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!(chain_id, skipped, "event subscriber lagged");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

async fn send_event(
    sink: &mut (impl futures::Sink<Message, Error = warp::Error> + Unpin),
    event: &CoordinatorEvent,
) -> Result<(), warp::Error> {
    let json = match serde_json::to_string(event) {
        Ok(json) => json,
        Err(err) => {
            tracing::error!(?err, "failed to serialize event");
            return Ok(());
        }
    };
    sink.send(Message::text(json)).await
}
