//! Stream session behavior: ordering, termination, cancellation

use std::convert::Infallible;

use futures::stream;
use tokio_stream::wrappers::ReceiverStream;

use sonar_core::{Frame, StreamConfig, StreamObserver, StreamSession};

#[derive(Default)]
struct Recorder {
    frames: Vec<Frame>,
    completed: u32,
    errors: Vec<String>,
}

impl StreamObserver for Recorder {
    fn on_frame(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    fn on_complete(&mut self) {
        self.completed += 1;
    }

    fn on_error(&mut self, message: String) {
        self.errors.push(message);
    }
}

fn chunks(parts: &[&str]) -> impl futures::Stream<Item = Result<Vec<u8>, Infallible>> + Unpin {
    let owned: Vec<Result<Vec<u8>, Infallible>> =
        parts.iter().map(|p| Ok(p.as_bytes().to_vec())).collect();
    stream::iter(owned)
}

#[tokio::test]
async fn frames_arrive_in_order_and_complete_exactly_once() {
    let mut rec = Recorder::default();
    let source = chunks(&[
        "data:{\"content\":\"Hel\"}\n",
        "data:{\"content\":\"lo\"}\ndata: [DONE]\n",
    ]);

    StreamSession::new().run(source, &mut rec).await;

    let deltas: Vec<&str> = rec.frames.iter().map(|f| f.delta.as_str()).collect();
    assert_eq!(deltas, vec!["Hel", "lo", ""]);
    assert!(rec.frames[2].is_final);
    assert_eq!(rec.completed, 1);
    assert!(rec.errors.is_empty());
}

#[tokio::test]
async fn nothing_is_delivered_after_the_final_frame() {
    let mut rec = Recorder::default();
    let source = chunks(&[
        "data: [DONE]\ndata:{\"content\":\"late\"}\n",
        "data:{\"content\":\"later\"}\n",
    ]);

    StreamSession::new().run(source, &mut rec).await;

    assert_eq!(rec.frames.len(), 1);
    assert!(rec.frames[0].is_final);
    assert_eq!(rec.completed, 1);
    assert!(rec.errors.is_empty());
}

#[tokio::test]
async fn channel_close_without_sentinel_completes_gracefully() {
    let mut rec = Recorder::default();
    // Unterminated tail, then EOF
    let source = chunks(&["data:{\"content\":\"partial\"}"]);

    StreamSession::new().run(source, &mut rec).await;

    assert_eq!(rec.frames.len(), 1);
    assert_eq!(rec.frames[0].delta, "partial");
    assert!(!rec.frames[0].is_final);
    assert_eq!(rec.completed, 1);
    assert!(rec.errors.is_empty());
}

#[tokio::test]
async fn empty_channel_still_completes_exactly_once() {
    let mut rec = Recorder::default();
    StreamSession::new().run(chunks(&[]), &mut rec).await;

    assert!(rec.frames.is_empty());
    assert_eq!(rec.completed, 1);
    assert!(rec.errors.is_empty());
}

#[tokio::test]
async fn transport_error_ends_the_session_via_on_error() {
    let source = stream::iter(vec![
        Ok::<_, &str>(b"data:{\"content\":\"a\"}\n".to_vec()),
        Err("connection reset by peer"),
    ]);
    let mut rec = Recorder::default();

    StreamSession::new().run(source, &mut rec).await;

    assert_eq!(rec.frames.len(), 1);
    assert_eq!(rec.completed, 0);
    assert_eq!(rec.errors, vec!["connection reset by peer".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn cancellation_suppresses_every_later_callback() {
    let (tx, rx) = tokio::sync::mpsc::channel::<Result<Vec<u8>, Infallible>>(8);
    let session = StreamSession::new();
    let cancel = session.cancellation();

    let worker = tokio::spawn(async move {
        let mut rec = Recorder::default();
        session.run(ReceiverStream::new(rx), &mut rec).await;
        rec
    });

    tx.send(Ok(b"data:{\"content\":\"first\"}\n".to_vec()))
        .await
        .unwrap();
    // Let the session drain the first chunk before cancelling
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    cancel.cancel();
    tx.send(Ok(b"data:{\"content\":\"second\"}\ndata: [DONE]\n".to_vec()))
        .await
        .unwrap();
    drop(tx);

    let rec = worker.await.unwrap();
    assert_eq!(rec.frames.len(), 1);
    assert_eq!(rec.frames[0].delta, "first");
    assert_eq!(rec.completed, 0);
    assert!(rec.errors.is_empty());
}

#[tokio::test]
async fn pre_cancelled_session_never_dispatches() {
    let session = StreamSession::new();
    session.cancellation().cancel();

    let mut rec = Recorder::default();
    session.run(chunks(&["data: [DONE]\n"]), &mut rec).await;

    assert!(rec.frames.is_empty());
    assert_eq!(rec.completed, 0);
    assert!(rec.errors.is_empty());
}

#[tokio::test(start_paused = true)]
async fn idle_timeout_surfaces_as_transport_error() {
    let (_tx, rx) = tokio::sync::mpsc::channel::<Result<Vec<u8>, Infallible>>(1);
    let config = StreamConfig {
        idle_timeout_ms: Some(5_000),
        ..StreamConfig::default()
    };

    let mut rec = Recorder::default();
    StreamSession::with_config(config)
        .run(ReceiverStream::new(rx), &mut rec)
        .await;

    assert_eq!(rec.completed, 0);
    assert_eq!(rec.errors.len(), 1);
    assert!(rec.errors[0].contains("idle timeout"));
}

#[tokio::test]
async fn configured_unit_cap_reaches_the_decoder() {
    let oversized = format!("data:{{\"content\":\"{}\"}}\n", "a".repeat(512));
    let source = chunks(&[&oversized, "data:{\"content\":\"ok\"}\ndata: [DONE]\n"]);
    let config = StreamConfig {
        max_unit_bytes: Some(128),
        ..StreamConfig::default()
    };

    let mut rec = Recorder::default();
    StreamSession::with_config(config).run(source, &mut rec).await;

    let deltas: Vec<&str> = rec.frames.iter().map(|f| f.delta.as_str()).collect();
    assert_eq!(deltas, vec!["ok", ""]);
    assert!(rec.frames[1].is_final);
    assert_eq!(rec.completed, 1);
    assert!(rec.errors.is_empty());
}

#[tokio::test]
async fn unbounded_sender_adapter_forwards_events() {
    use sonar_core::StreamEvent;

    let (mut tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let source = chunks(&["data:{\"content\":\"x\"}\ndata: [DONE]\n"]);

    StreamSession::new().run(source, &mut tx).await;
    drop(tx);

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    assert_eq!(events.len(), 3);
    assert!(matches!(&events[0], StreamEvent::Frame(f) if f.delta == "x"));
    assert!(matches!(&events[1], StreamEvent::Frame(f) if f.is_final));
    assert!(matches!(events[2], StreamEvent::Completed));
}
