//! Capture-to-upload pipeline.
//!
//! Consumes the capture engine's event stream, pushes each finished
//! image (and an optional voice note) to object storage under a unique
//! name, and hands the resulting URLs to an injected workflow sink.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use lumen_capture::{CaptureEvent, CapturedImage};
use lumen_cos::{CosClient, CosError, unique_object_name};

/// Errors produced by the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("upload failed: {0}")]
    Upload(#[from] CosError),

    #[error("workflow failed: {0}")]
    Workflow(String),
}

/// Destination for captured buffers. Implemented by [`CosClient`]; test
/// doubles stand in for it elsewhere.
pub trait ObjectUploader: Send + Sync {
    /// Uploads a named object and resolves to its public URL.
    fn upload(
        &self,
        data: Vec<u8>,
        name: String,
    ) -> Pin<Box<dyn Future<Output = Result<String, PipelineError>> + Send + '_>>;
}

impl ObjectUploader for CosClient {
    fn upload(
        &self,
        data: Vec<u8>,
        name: String,
    ) -> Pin<Box<dyn Future<Output = Result<String, PipelineError>> + Send + '_>> {
        Box::pin(async move { Ok(self.smart_upload(data, &name).await?) })
    }
}

/// Downstream workflow fed with the uploaded object URLs. The result is
/// an opaque string owned by whatever service sits behind the sink.
pub trait WorkflowSink: Send + Sync {
    fn run(
        &self,
        image_url: String,
        audio_url: Option<String>,
    ) -> Pin<Box<dyn Future<Output = Result<String, PipelineError>> + Send + '_>>;
}

/// What one delivered capture produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub image_url: String,
    pub audio_url: Option<String>,
    /// Present when a workflow sink is configured.
    pub workflow_result: Option<String>,
}

/// Uploads captures and runs the downstream workflow. No retries at any
/// stage; a failed delivery is reported and the pipeline moves on.
pub struct CapturePipeline {
    uploader: Arc<dyn ObjectUploader>,
    sink: Option<Arc<dyn WorkflowSink>>,
}

impl CapturePipeline {
    pub fn new(uploader: Arc<dyn ObjectUploader>, sink: Option<Arc<dyn WorkflowSink>>) -> Self {
        Self { uploader, sink }
    }

    /// Delivers one captured image with an optional voice note: uploads
    /// both buffers under unique names, then runs the workflow sink.
    pub async fn deliver(
        &self,
        image: CapturedImage,
        audio: Option<Vec<u8>>,
    ) -> Result<Delivery, PipelineError> {
        debug!(
            width = image.width,
            height = image.height,
            repaired = image.repaired,
            "delivering capture"
        );
        let image_url = self
            .uploader
            .upload(image.bytes, unique_object_name("photo.jpg"))
            .await?;

        let audio_url = match audio {
            Some(bytes) => Some(
                self.uploader
                    .upload(bytes, unique_object_name("voice.m4a"))
                    .await?,
            ),
            None => None,
        };

        let workflow_result = match &self.sink {
            Some(sink) => Some(sink.run(image_url.clone(), audio_url.clone()).await?),
            None => None,
        };

        info!(image_url, "capture delivered");
        Ok(Delivery {
            image_url,
            audio_url,
            workflow_result,
        })
    }

    /// Drains a capture event stream, delivering every finished image
    /// and reporting each outcome on `deliveries`. Returns when the
    /// event stream closes.
    pub async fn run(
        &self,
        mut events: mpsc::Receiver<CaptureEvent>,
        deliveries: mpsc::Sender<Result<Delivery, PipelineError>>,
    ) {
        while let Some(event) = events.recv().await {
            match event {
                CaptureEvent::ImageReady(image) => {
                    let outcome = self.deliver(image, None).await;
                    if let Err(err) = &outcome {
                        warn!(error = %err, "capture delivery failed");
                    }
                    if deliveries.send(outcome).await.is_err() {
                        break;
                    }
                }
                CaptureEvent::TransferStarted {
                    expected_size,
                    width,
                    height,
                } => debug!(expected_size, width, height, "transfer started"),
                CaptureEvent::Progress(progress) => debug!(progress, "transfer progress"),
                CaptureEvent::TransferFailed(err) => warn!(error = %err, "transfer failed"),
                CaptureEvent::Info(text) => debug!(text = %text, "device message"),
            }
        }
    }
}
