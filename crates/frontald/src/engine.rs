use frontal_core::{Analysis, FacePipeline, PipelineError};
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("engine panicked while analyzing: {0}")]
    Panicked(String),
    #[error("engine thread exited")]
    ChannelClosed,
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Messages sent from HTTP handlers to the engine thread.
enum EngineRequest {
    Analyze {
        image: Vec<u8>,
        reply: oneshot::Sender<Result<Analysis, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Decode, locate, extract and classify one uploaded image.
    pub async fn analyze(&self, image: Vec<u8>) -> Result<Analysis, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Analyze {
                image,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    pub fn is_running(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Move a loaded pipeline onto a dedicated OS thread.
///
/// The ONNX sessions need exclusive access, so every request is served in
/// arrival order by this one thread. A panic inside the pipeline is reported
/// to the caller and the thread keeps serving.
pub fn spawn_engine(
    mut pipeline: FacePipeline,
    queue_depth: usize,
) -> Result<EngineHandle, EngineError> {
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(queue_depth.max(1));

    std::thread::Builder::new()
        .name("frontal-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Analyze { image, reply } => {
                        let started = Instant::now();
                        let result = run_analyze(&mut pipeline, &image);
                        tracing::debug!(
                            bytes = image.len(),
                            elapsed_ms = started.elapsed().as_millis() as u64,
                            ok = result.is_ok(),
                            "analyze finished"
                        );
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })?;

    Ok(EngineHandle { tx })
}

fn run_analyze(pipeline: &mut FacePipeline, image: &[u8]) -> Result<Analysis, EngineError> {
    match panic::catch_unwind(AssertUnwindSafe(|| pipeline.analyze(image))) {
        Ok(result) => Ok(result?),
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            tracing::error!(%message, "pipeline panicked");
            Err(EngineError::Panicked(message))
        }
    }
}
