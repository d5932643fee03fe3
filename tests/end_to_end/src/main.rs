fn main() {
    println!("Run `cargo test -p end-to-end` to execute the capture-to-upload tests.");
}

#[cfg(test)]
mod tests {
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use tokio::sync::mpsc;
    use tokio::time::timeout;

    use lumen_capture::{CMD_SNAP, CaptureEngine};
    use lumen_link::ChannelLink;
    use lumen_pipeline::{CapturePipeline, Delivery, ObjectUploader, PipelineError};

    /// Records every upload and hands back a fake bucket URL.
    #[derive(Default)]
    struct RecordingUploader {
        uploads: Mutex<Vec<(String, usize)>>,
    }

    impl ObjectUploader for RecordingUploader {
        fn upload(
            &self,
            data: Vec<u8>,
            name: String,
        ) -> Pin<Box<dyn Future<Output = Result<String, PipelineError>> + Send + '_>> {
            self.uploads.lock().unwrap().push((name.clone(), data.len()));
            Box::pin(async move { Ok(format!("https://bucket.example/{name}")) })
        }
    }

    /// A structurally valid JPEG padded with entropy bytes to `n` bytes.
    fn test_jpeg(n: usize) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&[0xFF, 0xD8]);
        data.extend_from_slice(&[0xFF, 0xE0, 0x00, 0x10]);
        data.extend_from_slice(b"JFIF\0");
        data.extend_from_slice(&[0x01, 0x01, 0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00]);
        data.extend_from_slice(&[0xFF, 0xC0, 0x00, 0x11, 0x08, 0x00, 0x08, 0x00, 0x08, 0x03]);
        data.extend_from_slice(&[0x01, 0x22, 0x00, 0x02, 0x11, 0x01, 0x03, 0x11, 0x01]);
        data.extend_from_slice(&[0xFF, 0xDA, 0x00, 0x0C, 0x03, 0x01, 0x00, 0x02, 0x11, 0x03]);
        data.extend_from_slice(&[0x11, 0x00, 0x3F, 0x00]);
        assert!(n >= data.len() + 2);
        data.resize(n - 2, 0x11);
        data.extend_from_slice(&[0xFF, 0xD9]);
        data
    }

    async fn first_delivery(
        rx: &mut mpsc::Receiver<Result<Delivery, PipelineError>>,
    ) -> Delivery {
        timeout(Duration::from_secs(10), rx.recv())
            .await
            .expect("timed out waiting for a delivery")
            .expect("delivery channel closed")
            .expect("delivery failed")
    }

    #[tokio::test]
    async fn pendant_capture_lands_in_storage() {
        let (link, mut device) = ChannelLink::pair();
        let frames = link.take_frames().await.unwrap();
        let (handle, events, _engine) = CaptureEngine::spawn(Arc::new(link), frames);

        let uploader = Arc::new(RecordingUploader::default());
        let pipeline = CapturePipeline::new(uploader.clone(), None);
        let (deliveries_tx, mut deliveries_rx) = mpsc::channel(4);
        tokio::spawn(async move { pipeline.run(events, deliveries_tx).await });

        // App requests a photo, the pendant streams it back in chunks.
        handle.snap().await;
        assert_eq!(device.next_command().await.as_deref(), Some(CMD_SNAP));

        let payload = test_jpeg(400);
        device
            .send_frame(format!("IMG:{}:8:8", payload.len()).into_bytes())
            .await;
        for chunk in payload.chunks(100) {
            device.send_frame(chunk.to_vec()).await;
        }
        device.send_frame(b"END".to_vec()).await;

        let delivery = first_delivery(&mut deliveries_rx).await;
        assert!(delivery.image_url.starts_with("https://bucket.example/photo_"));
        assert!(delivery.image_url.ends_with(".jpg"));
        assert_eq!(delivery.audio_url, None);

        let uploads = uploader.uploads.lock().unwrap();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].1, payload.len());
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_capture_is_repaired_and_uploaded() {
        let (link, device) = ChannelLink::pair();
        let frames = link.take_frames().await.unwrap();
        let (_handle, events, _engine) = CaptureEngine::spawn(Arc::new(link), frames);

        let uploader = Arc::new(RecordingUploader::default());
        let pipeline = CapturePipeline::new(uploader.clone(), None);
        let (deliveries_tx, mut deliveries_rx) = mpsc::channel(4);
        tokio::spawn(async move { pipeline.run(events, deliveries_tx).await });

        // The pendant loses the trailing end-of-image marker and the END
        // frame; the stall timer finishes the transfer and repair patches
        // the image.
        let payload = test_jpeg(400);
        device.send_frame(b"IMG:400:8:8".to_vec()).await;
        device.send_frame(payload[..398].to_vec()).await;

        let delivery = first_delivery(&mut deliveries_rx).await;
        assert!(delivery.image_url.ends_with(".jpg"));

        // The repaired buffer is the truncated payload plus the two
        // patched marker bytes.
        let uploads = uploader.uploads.lock().unwrap();
        assert_eq!(uploads[0].1, 400);
    }
}
