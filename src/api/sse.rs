//! Server-sent events endpoint: streams `SsePayload`s from the orchestrator's
//! broadcast channel to connected UI clients, one subscription per connection.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::stream::{self, Stream};
use tokio::sync::broadcast;

use crate::orchestrator::SsePayload;
use crate::state::AppState;

pub async fn sse_handler(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.orchestrator.subscribe_events();
    let stream = stream::unfold(rx, next_event);
    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}

async fn next_event(
    mut rx: broadcast::Receiver<SsePayload>,
) -> Option<(Result<Event, Infallible>, broadcast::Receiver<SsePayload>)> {
    loop {
        match rx.recv().await {
            Ok(payload) => {
                let data = serde_json::to_string(&payload).unwrap_or_else(|_| "{}".to_string());
                return Some((Ok(Event::default().data(data)), rx));
            }
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}
