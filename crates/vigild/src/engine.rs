use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use vigil_core::photo::{self, PhotoError};
use vigil_core::{ExtractError, LandmarkExtractor, LandmarkSet};

/// Pending requests allowed before callers wait for queue space.
const ENGINE_QUEUE_DEPTH: usize = 4;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Photo(#[from] PhotoError),
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error("no face detected")]
    NoFaceDetected,
    #[error("engine thread exited")]
    ChannelClosed,
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Messages sent from HTTP handlers to the engine thread.
enum EngineRequest {
    Extract {
        photo: String,
        reply: oneshot::Sender<Result<LandmarkSet, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Decode a base64 photo and extract the live landmark set.
    pub async fn extract(&self, photo: String) -> Result<LandmarkSet, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Extract {
                photo,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// The extractor is owned by that thread, so inference sessions are never
/// used concurrently. The thread exits once every handle is dropped.
pub fn spawn_engine<E>(mut extractor: E) -> Result<EngineHandle, EngineError>
where
    E: LandmarkExtractor + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(ENGINE_QUEUE_DEPTH);

    std::thread::Builder::new()
        .name("vigil-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Extract { photo, reply } => {
                        let result = run_extract(&mut extractor, &photo);
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })?;

    Ok(EngineHandle { tx })
}

fn run_extract<E: LandmarkExtractor>(extractor: &mut E, photo: &str) -> Result<LandmarkSet, EngineError> {
    let image = photo::decode_photo(photo)?;
    extractor
        .extract(&image)?
        .ok_or(EngineError::NoFaceDetected)
}
