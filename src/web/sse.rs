//! Server-Sent Events for applied poses

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use crate::{AppState, PoseUpdate};

/// Create an SSE stream of pose updates
pub fn create_pose_stream(
    app_state: Arc<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = app_state.subscribe_pose();

    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(update) => pose_to_event(&update).map(Ok),
        Err(_) => None, // Skip lagged messages
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

/// Convert a pose update to an SSE event
fn pose_to_event(update: &PoseUpdate) -> Option<Event> {
    Event::default().event("pose").json_data(update).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::PoseTransform;
    use crate::Config;

    #[test]
    fn test_pose_event_serializes() {
        let update = PoseUpdate::from_pose(3, &PoseTransform::IDENTITY);
        assert!(pose_to_event(&update).is_some());
    }

    #[tokio::test]
    async fn test_stream_preserves_order() {
        let state = AppState::new(Config::default());
        let rx = state.subscribe_pose();
        let mut stream = BroadcastStream::new(rx);

        state.publish_pose(PoseUpdate::from_pose(1, &PoseTransform::IDENTITY));
        state.publish_pose(PoseUpdate::from_pose(2, &PoseTransform::IDENTITY));

        let first = stream.next().await.unwrap().unwrap();
        let second = stream.next().await.unwrap().unwrap();
        assert_eq!((first.sequence, second.sequence), (1, 2));
    }
}
