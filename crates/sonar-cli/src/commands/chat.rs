//! Stream one generation to stdout

use std::io::{self, Write};

use anyhow::Result;
use tracing::debug;

use sonar_core::{Frame, FrameKind, StreamObserver, StreamSession};

use crate::api::ApiClient;

/// Prints text deltas as they arrive; task and error frames go to stderr
struct StdoutObserver {
    failed: Option<String>,
}

impl StreamObserver for StdoutObserver {
    fn on_frame(&mut self, frame: Frame) {
        match frame.kind {
            FrameKind::Text => {
                print!("{}", frame.delta);
                let _ = io::stdout().flush();
            }
            FrameKind::Task => {
                debug!("Server task notice: {}", frame.delta);
                eprintln!("[task] {}", frame.delta);
            }
            FrameKind::Error => {
                eprintln!("[server error] {}", frame.delta);
            }
        }
    }

    fn on_complete(&mut self) {
        println!();
    }

    fn on_error(&mut self, message: String) {
        self.failed = Some(message);
    }
}

pub async fn run(client: ApiClient, prompt: String) -> Result<()> {
    let channel = client.open_chat_stream(&prompt).await?;

    let session = StreamSession::new();
    let cancel = session.cancellation();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let mut observer = StdoutObserver { failed: None };
    session.run(channel, &mut observer).await;

    match observer.failed {
        Some(message) => Err(anyhow::anyhow!("stream failed: {message}")),
        None => Ok(()),
    }
}
