use crate::session_tests::helpers::{FakeViewer, context_for};

use viewer_client::error::{HandshakeError, SessionError};
use viewer_client::session::{Figsize, ImshowOptions, ViewSession};

use models::{ArrayPayload, DType, ModelError, Window};

use std::time::Duration;

use serde_json::{Map, Value, json};
use serial_test::serial;
use tempfile::tempdir;

const SILENCE: Duration = Duration::from_millis(300);

fn metadata(index: u64) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert("index".to_string(), Value::from(index));
    map
}

/// Enqueue `count` small images, yielding between them, then flush.
async fn stream_images(session: &ViewSession, count: u64) -> Result<(), SessionError> {
    for index in 0..count {
        let image = ArrayPayload::zeros([1, 1, 32, 32, 1], DType::Uint8).unwrap();
        session.enqueue(Some(image), Map::new(), metadata(index))?;
        tokio::task::yield_now().await;
    }
    session.flush().await
}

/// **VALUE**: Verifies nothing is sent before the viewer page completes its handshake, and
/// exactly one header plus one payload afterwards.
///
/// **WHY THIS MATTERS**: The viewer drops frames for tokens whose page has not loaded yet.
/// Sending early silently loses the user's image.
///
/// **BUG THIS CATCHES**: Would catch a consumer that sends without awaiting the handshake,
/// or one that duplicates frames once it resolves.
#[tokio::test]
#[serial]
#[cfg(unix)]
async fn given_pending_handshake_when_enqueueing_then_frames_wait_for_resolution() {
    // GIVEN: A session connected to the fake viewer
    let dir = tempdir().unwrap();
    let mut viewer = FakeViewer::start().await;
    let context = context_for(&dir, &viewer, 5);
    let session = ViewSession::new(context.clone(), Figsize::default())
        .await
        .unwrap();
    assert_eq!(viewer.path().as_deref(), Some("/ws"));

    // WHEN: Enqueueing a 256x256 uint8 image before the handshake
    let image = ArrayPayload::zeros([1, 1, 256, 256, 1], DType::Uint8).unwrap();
    session
        .enqueue(Some(image), Map::new(), Map::new())
        .unwrap();

    // THEN: Nothing reaches the viewer yet
    viewer.assert_silent(SILENCE).await;

    // WHEN: The viewer page reports back
    viewer.handshake(session.token(), true);

    // THEN: Exactly a header and its payload arrive
    let header = viewer.next_header().await;
    assert_eq!(header["hash"], session.token());
    assert_eq!(header["shape"], json!([1, 1, 256, 256, 1]));
    assert_eq!(header["dtype"], "uint8");
    let key = header["key"].as_str().expect("Header should carry a key").to_string();

    let payload = viewer.next_payload().await;
    assert_eq!(payload.len(), session.token().len() + key.len() + 256 * 256);
    assert!(payload.starts_with(format!("{}{key}", session.token()).as_bytes()));

    session.flush().await.unwrap();
    viewer.assert_silent(SILENCE).await;

    context.shutdown().await;
}

/// **VALUE**: Verifies operations leave in enqueue order with each header before its payload.
///
/// **WHY THIS MATTERS**: Slices streamed in a loop must render in the order they were produced.
///
/// **BUG THIS CATCHES**: Would catch concurrent sends per operation or a LIFO queue.
#[tokio::test]
#[serial]
#[cfg(unix)]
async fn given_several_enqueues_when_streaming_then_frames_keep_fifo_order() {
    // GIVEN: A session whose handshake has completed
    let dir = tempdir().unwrap();
    let mut viewer = FakeViewer::start().await;
    let context = context_for(&dir, &viewer, 5);
    let session = ViewSession::new(context.clone(), Figsize::default())
        .await
        .unwrap();
    viewer.handshake(session.token(), true);

    // WHEN: Enqueueing three operations, the middle one config-only
    let slice = ArrayPayload::from_elements([1, 1, 1, 2, 1], &[1.5f32, -2.0]).unwrap();
    session
        .enqueue(Some(slice.clone()), Map::new(), metadata(0))
        .unwrap();
    session.enqueue(None, Map::new(), metadata(1)).unwrap();
    session.enqueue(Some(slice), Map::new(), metadata(2)).unwrap();
    session.flush().await.unwrap();

    // THEN: Frames arrive as header, payload, header, header, payload
    assert_eq!(viewer.next_header().await["metadata"]["index"], 0);
    assert_eq!(viewer.next_payload().await.len(), 32 + 32 + 8);

    let config_only = viewer.next_header().await;
    assert_eq!(config_only["metadata"]["index"], 1);
    assert!(config_only.get("shape").is_none());

    assert_eq!(viewer.next_header().await["metadata"]["index"], 2);
    assert_eq!(viewer.next_payload().await.len(), 32 + 32 + 8);
    assert_eq!(session.pending(), 0);

    context.shutdown().await;
}

/// **VALUE**: Verifies invalid arrays and colormaps are rejected synchronously.
///
/// **WHY THIS MATTERS**: Users must see the error at the call that caused it, not later from
/// a background task.
///
/// **BUG THIS CATCHES**: Would catch validation being deferred to the consumer, or invalid
/// operations still being queued.
#[tokio::test]
#[serial]
#[cfg(unix)]
async fn given_invalid_input_when_enqueueing_then_fails_immediately_without_frames() {
    // GIVEN: A session whose handshake has completed
    let dir = tempdir().unwrap();
    let mut viewer = FakeViewer::start().await;
    let context = context_for(&dir, &viewer, 5);
    let session = ViewSession::new(context.clone(), Figsize::default())
        .await
        .unwrap();
    viewer.handshake(session.token(), true);

    // WHEN: Enqueueing a 4-axis array, a float64 array, and an unknown colormap
    let rank_four = ArrayPayload::zeros([1, 4, 4, 1], DType::Uint8).unwrap();
    let float64 = ArrayPayload::zeros([1, 1, 4, 4, 1], DType::Float64).unwrap();
    let valid = ArrayPayload::zeros([1, 1, 4, 4, 1], DType::Uint8).unwrap();

    let rank_result = session.enqueue(Some(rank_four), Map::new(), Map::new());
    let dtype_result = session.enqueue(Some(float64), Map::new(), Map::new());
    let cmap_result = session.imshow(
        &valid,
        ImshowOptions {
            cmap: Some("jet".to_string()),
            ..ImshowOptions::default()
        },
    );

    // THEN: Every call failed with a validation error and nothing was sent
    for result in [rank_result, dtype_result, cmap_result] {
        assert!(
            matches!(result, Err(SessionError::Validation(ModelError::Validation { .. }))),
            "Expected validation error, got {result:?}"
        );
    }
    assert_eq!(session.pending(), 0);
    session.flush().await.unwrap();
    viewer.assert_silent(SILENCE).await;

    context.shutdown().await;
}

/// **VALUE**: Verifies colormap and window presets end up in the header config.
///
/// **WHY THIS MATTERS**: Segmentation maps only render correctly in lookup-table mode, and
/// window presets are how users adjust CT contrast.
///
/// **BUG THIS CATCHES**: Would catch the colormap being dropped or explicit options losing
/// to the displayable's own config.
#[tokio::test]
#[serial]
#[cfg(unix)]
async fn given_seg_colormap_and_window_preset_when_showing_then_header_config_carries_them() {
    // GIVEN: A connected session
    let dir = tempdir().unwrap();
    let mut viewer = FakeViewer::start().await;
    let context = context_for(&dir, &viewer, 5);
    let session = ViewSession::new(context.clone(), Figsize::default())
        .await
        .unwrap();
    viewer.handshake(session.token(), true);

    // WHEN: Showing a label map with `seg`, then applying a window preset
    let labels = ArrayPayload::zeros([1, 1, 2, 2, 1], DType::Uint8).unwrap();
    let mut config = Map::new();
    config.insert("opacity".to_string(), json!(0.5));
    session
        .imshow(
            &labels,
            ImshowOptions {
                config,
                cmap: Some("seg".to_string()),
                ..ImshowOptions::default()
            },
        )
        .unwrap();
    session.imshow(&Window::Lung, ImshowOptions::default()).unwrap();
    session.flush().await.unwrap();

    // THEN: The first header is in LUT mode, the second carries the window only
    let seg_header = viewer.next_header().await;
    assert_eq!(seg_header["config"]["mode"], "lut");
    assert_eq!(seg_header["config"]["opacity"], 0.5);
    viewer.next_payload().await;

    let window_header = viewer.next_header().await;
    assert_eq!(
        window_header["config"]["window"],
        json!({ "center": -600, "width": 1500 })
    );
    assert!(window_header.get("dtype").is_none());

    context.shutdown().await;
}

/// **VALUE**: Verifies a viewer answering `connected=false` fails the operation.
///
/// **WHY THIS MATTERS**: Streaming into a page that refused the session wastes bandwidth and
/// hides the problem from the user.
///
/// **BUG THIS CATCHES**: Would catch the consumer treating any resolution as success.
#[tokio::test]
#[serial]
#[cfg(unix)]
async fn given_rejected_handshake_when_flushing_then_returns_rejected() {
    let dir = tempdir().unwrap();
    let mut viewer = FakeViewer::start().await;
    let context = context_for(&dir, &viewer, 5);
    let session = ViewSession::new(context.clone(), Figsize::default())
        .await
        .unwrap();

    session.enqueue(None, Map::new(), Map::new()).unwrap();
    viewer.handshake(session.token(), false);
    let result = session.flush().await;

    assert!(
        matches!(
            result,
            Err(SessionError::Handshake(HandshakeError::Rejected { .. }))
        ),
        "Expected Rejected, got {result:?}"
    );
    viewer.assert_silent(SILENCE).await;

    context.shutdown().await;
}

/// **VALUE**: Verifies an unanswered handshake surfaces as `HandshakeTimeout` from `flush`.
///
/// **WHY THIS MATTERS**: When the viewer page never loads, the user needs an error instead of
/// a queue that silently never drains.
///
/// **BUG THIS CATCHES**: Would catch the consumer waiting without a bound, or its failure
/// being swallowed in the background task.
#[tokio::test]
#[serial]
#[cfg(unix)]
async fn given_no_handshake_when_flushing_then_returns_handshake_timeout() {
    let dir = tempdir().unwrap();
    let viewer = FakeViewer::start().await;
    let context = context_for(&dir, &viewer, 1);
    let session = ViewSession::new(context.clone(), Figsize::default())
        .await
        .unwrap();

    session.enqueue(None, Map::new(), Map::new()).unwrap();
    let result = session.flush().await;

    assert!(
        matches!(
            result,
            Err(SessionError::Handshake(HandshakeError::HandshakeTimeout { .. }))
        ),
        "Expected HandshakeTimeout, got {result:?}"
    );

    context.shutdown().await;
}

/// **VALUE**: Verifies the viewer address and its text rendering.
///
/// **WHY THIS MATTERS**: Users open this address in the browser; a wrong token in it means
/// the page never completes the handshake.
///
/// **BUG THIS CATCHES**: Would catch a uri missing the token query or the configured host.
#[tokio::test]
#[serial]
#[cfg(unix)]
async fn given_session_when_rendering_then_uri_carries_host_port_and_token() {
    let dir = tempdir().unwrap();
    let viewer = FakeViewer::start().await;
    let context = context_for(&dir, &viewer, 5);
    let session = ViewSession::new(
        context.clone(),
        Figsize {
            height: 300,
            width: 400,
        },
    )
    .await
    .unwrap();

    let token = session.token().to_string();
    let expected_uri = format!("http://127.0.0.1:{}?hash={token}", viewer.port);

    assert_eq!(token.len(), 32);
    assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    assert_eq!(session.uri(), expected_uri);
    assert_eq!(
        session.to_string(),
        format!("ViewSession(\n  uri={expected_uri},\n  height=300,\n  width=400,\n)")
    );

    context.shutdown().await;
}

/// **VALUE**: Verifies dropping a session removes its handshake entry.
///
/// **WHY THIS MATTERS**: Long-running notebooks create many sessions; entries must not pile up.
///
/// **BUG THIS CATCHES**: Would catch tokens being registered but never evicted.
#[tokio::test]
#[serial]
#[cfg(unix)]
async fn given_session_when_dropped_then_token_is_evicted() {
    let dir = tempdir().unwrap();
    let viewer = FakeViewer::start().await;
    let context = context_for(&dir, &viewer, 5);
    let session = ViewSession::new(context.clone(), Figsize::default())
        .await
        .unwrap();
    let token = session.token().to_string();
    assert!(context.registry().contains(&token));

    drop(session);

    assert!(!context.registry().contains(&token));
    context.shutdown().await;
}

/// **VALUE**: Verifies each header stays directly in front of its payload when two sessions
/// stream over the shared connection at the same time.
///
/// **WHY THIS MATTERS**: The viewer pairs a binary frame with the header just before it; a
/// payload from another session in between would be drawn into the wrong page.
///
/// **BUG THIS CATCHES**: Would catch header and payload being sent as two independent writes
/// that concurrent consumers can interleave.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
#[cfg(unix)]
async fn given_two_sessions_streaming_concurrently_when_receiving_then_payload_follows_its_header() {
    // GIVEN: Two sessions on one context, both handshaken
    const PER_SESSION: u64 = 6;
    let dir = tempdir().unwrap();
    let mut viewer = FakeViewer::start().await;
    let context = context_for(&dir, &viewer, 5);
    let first = ViewSession::new(context.clone(), Figsize::default())
        .await
        .unwrap();
    let second = ViewSession::new(context.clone(), Figsize::default())
        .await
        .unwrap();
    viewer.handshake(first.token(), true);
    viewer.handshake(second.token(), true);

    // WHEN: Both enqueue several images concurrently
    let (first_sent, second_sent) = tokio::join!(
        stream_images(&first, PER_SESSION),
        stream_images(&second, PER_SESSION)
    );
    first_sent.unwrap();
    second_sent.unwrap();

    // THEN: Every header is immediately followed by the payload carrying its token and key
    let mut seen = [0u64; 2];
    for _ in 0..PER_SESSION * 2 {
        let header = viewer.next_header().await;
        let token = header["hash"].as_str().unwrap().to_string();
        let key = header["key"].as_str().unwrap().to_string();

        let payload = viewer.next_payload().await;
        assert!(
            payload.starts_with(format!("{token}{key}").as_bytes()),
            "Payload after header of {token} belongs to another operation"
        );

        let owner = usize::from(token != first.token());
        assert_eq!(header["metadata"]["index"], seen[owner], "Session order broken");
        seen[owner] += 1;
    }
    assert_eq!(seen, [PER_SESSION, PER_SESSION]);

    context.shutdown().await;
}

/// **VALUE**: Verifies a drained session streams again on the next enqueue.
///
/// **WHY THIS MATTERS**: The consumer stops when the queue empties; interactive use enqueues
/// one image, looks at it, then enqueues the next.
///
/// **BUG THIS CATCHES**: Would catch the active flag staying set after the queue drained, so
/// no consumer is ever started again.
#[tokio::test]
#[serial]
#[cfg(unix)]
async fn given_drained_queue_when_enqueueing_again_then_consumer_resumes() {
    // GIVEN: A session that already delivered one operation
    let dir = tempdir().unwrap();
    let mut viewer = FakeViewer::start().await;
    let context = context_for(&dir, &viewer, 5);
    let session = ViewSession::new(context.clone(), Figsize::default())
        .await
        .unwrap();
    viewer.handshake(session.token(), true);

    session.enqueue(None, Map::new(), metadata(0)).unwrap();
    session.flush().await.unwrap();
    assert_eq!(viewer.next_header().await["metadata"]["index"], 0);
    viewer.assert_silent(SILENCE).await;

    // WHEN: Enqueueing after the queue drained
    session.enqueue(None, Map::new(), metadata(1)).unwrap();
    session.flush().await.unwrap();

    // THEN: The new operation is delivered
    assert_eq!(viewer.next_header().await["metadata"]["index"], 1);
    assert_eq!(session.pending(), 0);

    context.shutdown().await;
}

/// **VALUE**: Verifies a failed consumer does not poison the session: the failed batch is
/// discarded, and a later enqueue is delivered once the page answers.
///
/// **WHY THIS MATTERS**: A slow browser should cost the user one image, not the whole session.
///
/// **BUG THIS CATCHES**: Would catch the queue staying marked active after a failure, or the
/// old error being reported again by the next flush.
#[tokio::test]
#[serial]
#[cfg(unix)]
async fn given_timed_out_batch_when_enqueueing_after_handshake_then_fresh_consumer_delivers() {
    // GIVEN: A batch that failed because the page did not answer within 1s
    let dir = tempdir().unwrap();
    let mut viewer = FakeViewer::start().await;
    let context = context_for(&dir, &viewer, 1);
    let session = ViewSession::new(context.clone(), Figsize::default())
        .await
        .unwrap();

    session.enqueue(None, Map::new(), metadata(0)).unwrap();
    let failed = session.flush().await;
    assert!(
        matches!(
            failed,
            Err(SessionError::Handshake(HandshakeError::HandshakeTimeout { .. }))
        ),
        "Expected HandshakeTimeout, got {failed:?}"
    );

    // WHEN: The page answers and another operation is enqueued
    viewer.handshake(session.token(), true);
    session.enqueue(None, Map::new(), metadata(1)).unwrap();
    let retried = session.flush().await;

    // THEN: Only the new operation arrives and the flush succeeds
    assert!(retried.is_ok(), "Expected Ok, got {retried:?}");
    assert_eq!(viewer.next_header().await["metadata"]["index"], 1);
    viewer.assert_silent(SILENCE).await;

    context.shutdown().await;
}
