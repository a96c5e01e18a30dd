//! Live change notifications over Server-Sent Events.

use crate::shared::state::AppState;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::get;
use axum::Router;
use futures::stream::Stream;
use log::{error, info};
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

pub fn configure() -> Router<AppState> {
    Router::new().route("/events", get(event_stream))
}

/// Opens one SSE session: an initial `connected` record, then one event per
/// bus publication, with a keep-alive comment every 15 seconds.
async fn event_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut bus_rx = state.events.subscribe();
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(64);

    tokio::spawn(async move {
        let connected = Event::default().data(r#"{"type":"connected"}"#);
        if tx.send(Ok(connected)).await.is_err() {
            return;
        }

        while let Some(event) = bus_rx.recv().await {
            let payload = match serde_json::to_string(&event) {
                Ok(payload) => payload,
                Err(e) => {
                    error!("failed to encode bus event: {}", e);
                    continue;
                }
            };
            if tx.send(Ok(Event::default().data(payload))).await.is_err() {
                info!("sse client disconnected");
                break;
            }
        }
    });

    Sse::new(ReceiverStream::new(rx)).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}
