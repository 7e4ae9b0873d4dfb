//! MediaPipe iris tracker bridge
//!
//! Frames are streamed to an external helper process (see `scripts/`) that
//! runs the MediaPipe iris graph. Each frame is a fixed little-endian header
//! followed by tightly packed pixels:
//!
//! ```text
//! "IRF1" | u32 width | u32 height | u32 stride | u8 format | i64 timestamp_us | u32 len | pixels
//! ```
//!
//! The helper answers with one JSON object per line:
//! `{"timestamp_us": 0, "face_detected": true, "transform": [16 floats, column-major]}`.

use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::config::MediaPipeConfig;
use crate::error::{IrisviewError, TrackingError};
use crate::frame::{PixelFormat, Timestamp, VideoFrame};
use crate::geometry::PoseTransform;

use super::subprocess::HelperProcess;
use super::{EventSink, Tracker};

pub const FRAME_MAGIC: [u8; 4] = *b"IRF1";
pub const FRAME_HEADER_LEN: usize = 29;

/// A helper that has not taken a whole frame by then is treated as hung
const FRAME_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Decoded frame header, as the helper sees it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    pub format: PixelFormat,
    pub timestamp: Timestamp,
    pub payload_len: u32,
}

impl FrameHeader {
    pub fn parse(buf: &[u8]) -> Result<Self, TrackingError> {
        if buf.len() < FRAME_HEADER_LEN {
            return Err(TrackingError::Protocol(format!(
                "Frame header too short: {} bytes",
                buf.len()
            )));
        }
        if buf[0..4] != FRAME_MAGIC {
            return Err(TrackingError::Protocol("Bad frame magic".to_string()));
        }

        let u32_at = |i: usize| u32::from_le_bytes([buf[i], buf[i + 1], buf[i + 2], buf[i + 3]]);
        let mut ts = [0u8; 8];
        ts.copy_from_slice(&buf[17..25]);

        let format = PixelFormat::from_wire_tag(buf[16])
            .ok_or_else(|| TrackingError::Protocol(format!("Unknown pixel format {}", buf[16])))?;

        Ok(Self {
            width: u32_at(4),
            height: u32_at(8),
            stride: u32_at(12),
            format,
            timestamp: Timestamp::from_micros(i64::from_le_bytes(ts)),
            payload_len: u32_at(25),
        })
    }
}

/// Serialize one frame for the helper. Row padding is stripped.
pub fn encode_frame(frame: &VideoFrame, timestamp: Timestamp) -> Vec<u8> {
    let stride = frame.width() as usize * frame.format().bytes_per_pixel();
    let payload_len = stride * frame.height() as usize;

    let mut buf = Vec::with_capacity(FRAME_HEADER_LEN + payload_len);
    buf.extend_from_slice(&FRAME_MAGIC);
    buf.extend_from_slice(&frame.width().to_le_bytes());
    buf.extend_from_slice(&frame.height().to_le_bytes());
    buf.extend_from_slice(&(stride as u32).to_le_bytes());
    buf.push(frame.format().wire_tag());
    buf.extend_from_slice(&timestamp.as_micros().to_le_bytes());
    buf.extend_from_slice(&(payload_len as u32).to_le_bytes());
    for y in 0..frame.height() {
        buf.extend_from_slice(frame.row(y));
    }
    buf
}

/// One line of helper output
#[derive(Debug, Clone, Deserialize)]
pub struct PoseResponse {
    pub timestamp_us: i64,
    #[serde(default)]
    pub face_detected: bool,
    #[serde(default)]
    pub transform: Option<Vec<f32>>,
}

/// Parse a helper line. `Ok(None)` means no face was found in that frame.
pub fn parse_pose_line(line: &str) -> Result<Option<(Timestamp, PoseTransform)>, TrackingError> {
    let response: PoseResponse = serde_json::from_str(line)
        .map_err(|e| TrackingError::Protocol(format!("JSON parse error: {}", e)))?;

    if !response.face_detected {
        return Ok(None);
    }

    let Some(cols) = response.transform else {
        return Ok(None);
    };

    let pose = PoseTransform::from_cols_slice(&cols).ok_or_else(|| {
        TrackingError::Protocol(format!(
            "Transform must be 16 finite values, got {}",
            cols.len()
        ))
    })?;

    Ok(Some((Timestamp::from_micros(response.timestamp_us), pose)))
}

struct Running {
    frame_tx: mpsc::Sender<(VideoFrame, Timestamp)>,
    shutdown_tx: watch::Sender<bool>,
    _task: JoinHandle<()>,
}

/// Tracker backed by the external MediaPipe iris helper
pub struct MediaPipeTracker {
    config: MediaPipeConfig,
    sink: EventSink,
    running: Mutex<Option<Running>>,
    connected: Arc<AtomicBool>,
}

impl MediaPipeTracker {
    pub fn new(config: &MediaPipeConfig, sink: EventSink) -> Self {
        Self {
            config: config.clone(),
            sink,
            running: Mutex::new(None),
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether the bridge currently has a live connection to the helper
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    fn running(&self) -> MutexGuard<'_, Option<Running>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Tracker for MediaPipeTracker {
    fn name(&self) -> &'static str {
        "mediapipe"
    }

    fn start(&self) -> Result<(), IrisviewError> {
        let mut running = self.running();
        if running.is_some() {
            return Ok(());
        }

        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| TrackingError::Runtime(e.to_string()))?;

        // One in-flight frame; anything arriving while it is pending is dropped
        let (frame_tx, frame_rx) = mpsc::channel(1);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = handle.spawn(run_bridge(
            self.config.clone(),
            self.sink.clone(),
            frame_rx,
            shutdown_rx,
            Arc::clone(&self.connected),
        ));

        tracing::info!(
            "MediaPipe iris tracker started (helper: {}:{}, auto_launch: {})",
            self.config.host,
            self.config.port,
            self.config.auto_launch
        );

        *running = Some(Running {
            frame_tx,
            shutdown_tx,
            _task: task,
        });
        Ok(())
    }

    fn process(&self, frame: VideoFrame, timestamp: Timestamp) {
        let running = self.running();
        let Some(running) = running.as_ref() else {
            return;
        };

        match running.frame_tx.try_send((frame, timestamp)) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::trace!("Iris helper busy, dropping frame at {}", timestamp);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }

    fn stop(&self) {
        if let Some(running) = self.running().take() {
            let _ = running.shutdown_tx.send(true);
            tracing::info!("MediaPipe iris tracker stopping");
        }
    }
}

impl Drop for MediaPipeTracker {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn connect(config: &MediaPipeConfig) -> Result<TcpStream, TrackingError> {
    let addr = format!("{}:{}", config.host, config.port);
    let attempts = config.connect_attempts.max(1);
    let mut last_error = String::new();

    for attempt in 1..=attempts {
        match TcpStream::connect(&addr).await {
            Ok(stream) => {
                stream.set_nodelay(true).ok();
                return Ok(stream);
            }
            Err(e) => {
                tracing::debug!("Iris helper connect attempt {}/{} failed: {}", attempt, attempts, e);
                last_error = e.to_string();
                if attempt < attempts {
                    tokio::time::sleep(Duration::from_millis(config.connect_retry_ms)).await;
                }
            }
        }
    }

    Err(TrackingError::Connect {
        addr,
        message: last_error,
    })
}

/// Sleep for `delay`, returning false if shutdown was requested meanwhile
async fn wait_or_shutdown(shutdown: &mut watch::Receiver<bool>, delay: Duration) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => true,
        _ = shutdown.changed() => false,
    }
}

async fn run_bridge(
    config: MediaPipeConfig,
    sink: EventSink,
    mut frames: mpsc::Receiver<(VideoFrame, Timestamp)>,
    mut shutdown: watch::Receiver<bool>,
    connected: Arc<AtomicBool>,
) {
    let mut helper = if config.auto_launch {
        let mut helper = HelperProcess::new(&config);
        if let Err(e) = helper.start() {
            tracing::error!("Failed to auto-launch iris helper: {}", e);
        }
        Some(helper)
    } else {
        None
    };
    let restart_delay = Duration::from_secs(config.restart_delay_secs);

    'session: loop {
        if *shutdown.borrow() {
            break;
        }

        if let Some(ref mut helper) = helper {
            if !helper.is_running() && config.auto_restart {
                if let Err(e) = helper.start() {
                    tracing::error!("Failed to restart iris helper: {}", e);
                }
            }
        }

        let stream = tokio::select! {
            result = connect(&config) => result,
            _ = shutdown.changed() => break,
        };

        let stream = match stream {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!("{}", e);
                if !wait_or_shutdown(&mut shutdown, restart_delay).await {
                    break;
                }
                continue;
            }
        };

        connected.store(true, Ordering::Relaxed);
        tracing::info!("Connected to iris helper at {}:{}", config.host, config.port);

        let (reader, mut writer) = stream.into_split();
        let mut lines = BufReader::new(reader).lines();

        loop {
            tokio::select! {
                next = frames.recv() => {
                    let Some((frame, timestamp)) = next else {
                        break 'session;
                    };
                    let packet = encode_frame(&frame, timestamp);
                    let written = tokio::select! {
                        result = tokio::time::timeout(FRAME_WRITE_TIMEOUT, writer.write_all(&packet)) => result,
                        _ = shutdown.changed() => break 'session,
                    };
                    match written {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => {
                            tracing::warn!("Failed to send frame to iris helper: {}", e);
                            break;
                        }
                        Err(_) => {
                            tracing::warn!("Iris helper stopped reading frames, reconnecting");
                            break;
                        }
                    }
                    // The graph renders the input video unchanged
                    if !sink.pixel_buffer(frame) {
                        break 'session;
                    }
                }
                line = lines.next_line() => match line {
                    Ok(Some(line)) => match parse_pose_line(&line) {
                        Ok(Some((timestamp, pose))) => {
                            tracing::trace!("Pose for frame at {}", timestamp);
                            if !sink.transform(pose) {
                                break 'session;
                            }
                        }
                        Ok(None) => {}
                        Err(e) => tracing::warn!("Skipping helper output: {}", e),
                    },
                    Ok(None) => {
                        tracing::warn!("Iris helper closed the connection");
                        break;
                    }
                    Err(e) => {
                        tracing::warn!("Iris helper read error: {}", e);
                        break;
                    }
                },
                _ = shutdown.changed() => break 'session,
            }
        }

        connected.store(false, Ordering::Relaxed);
        if !wait_or_shutdown(&mut shutdown, restart_delay).await {
            break;
        }
    }

    connected.store(false, Ordering::Relaxed);
    if let Some(ref mut helper) = helper {
        helper.stop().await;
    }
    tracing::info!("Iris tracker bridge stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::TrackerEvent;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    fn test_frame() -> VideoFrame {
        // 2x2 with padded rows
        let mut data = vec![0u8; 12 * 2];
        data[0..8].copy_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
        data[12..20].copy_from_slice(&[9, 10, 11, 12, 13, 14, 15, 16]);
        VideoFrame::new(2, 2, 12, PixelFormat::Bgra8, data, Timestamp::from_micros(42)).unwrap()
    }

    #[test]
    fn test_encode_frame_layout() {
        let packet = encode_frame(&test_frame(), Timestamp::from_micros(1_234_567));
        assert_eq!(packet.len(), FRAME_HEADER_LEN + 16);
        assert_eq!(&packet[0..4], b"IRF1");

        let header = FrameHeader::parse(&packet).unwrap();
        assert_eq!(header.width, 2);
        assert_eq!(header.height, 2);
        assert_eq!(header.stride, 8);
        assert_eq!(header.format, PixelFormat::Bgra8);
        assert_eq!(header.timestamp, Timestamp::from_micros(1_234_567));
        assert_eq!(header.payload_len, 16);
        assert_eq!(&packet[FRAME_HEADER_LEN..FRAME_HEADER_LEN + 4], &[1, 2, 3, 4]);
        assert_eq!(&packet[FRAME_HEADER_LEN + 8..FRAME_HEADER_LEN + 12], &[9, 10, 11, 12]);
    }

    #[test]
    fn test_header_rejects_garbage() {
        assert!(FrameHeader::parse(b"IRF1").is_err());
        let mut packet = encode_frame(&test_frame(), Timestamp::ZERO);
        packet[0] = b'X';
        assert!(FrameHeader::parse(&packet).is_err());
        let mut packet = encode_frame(&test_frame(), Timestamp::ZERO);
        packet[16] = 9;
        assert!(FrameHeader::parse(&packet).is_err());
    }

    #[test]
    fn test_parse_pose_line() {
        let mut cols = glam::Mat4::IDENTITY.to_cols_array();
        cols[14] = -45.0;
        let line = serde_json::json!({
            "timestamp_us": 1000,
            "face_detected": true,
            "transform": cols,
        })
        .to_string();

        let (ts, pose) = parse_pose_line(&line).unwrap().unwrap();
        assert_eq!(ts, Timestamp::from_micros(1000));
        assert_eq!(pose.position(), glam::Vec3::new(0.0, 0.0, -45.0));
    }

    #[test]
    fn test_parse_no_face() {
        let line = r#"{"timestamp_us":5,"face_detected":false}"#;
        assert!(parse_pose_line(line).unwrap().is_none());

        let line = r#"{"timestamp_us":5,"face_detected":true}"#;
        assert!(parse_pose_line(line).unwrap().is_none());
    }

    #[test]
    fn test_parse_bad_lines() {
        assert!(parse_pose_line("not json").is_err());
        let line = r#"{"timestamp_us":5,"face_detected":true,"transform":[1,0,0]}"#;
        assert!(parse_pose_line(line).is_err());
    }

    #[test]
    fn test_start_requires_runtime() {
        let (sink, _rx) = EventSink::channel();
        let tracker = MediaPipeTracker::new(&MediaPipeConfig::default(), sink);
        assert!(tracker.start().is_err());
    }

    #[tokio::test]
    async fn test_round_trip_with_fake_helper() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let helper = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut header = [0u8; FRAME_HEADER_LEN];
            socket.read_exact(&mut header).await.unwrap();
            let header = FrameHeader::parse(&header).unwrap();
            let mut payload = vec![0u8; header.payload_len as usize];
            socket.read_exact(&mut payload).await.unwrap();

            let mut cols = glam::Mat4::IDENTITY.to_cols_array();
            cols[12] = 2.0;
            let line = serde_json::json!({
                "timestamp_us": header.timestamp.as_micros(),
                "face_detected": true,
                "transform": cols,
            })
            .to_string()
                + "\n";
            socket.write_all(line.as_bytes()).await.unwrap();
            // Keep the connection open until the tracker is done
            let mut rest = Vec::new();
            let _ = socket.read_to_end(&mut rest).await;
            payload
        });

        let config = MediaPipeConfig {
            port,
            connect_attempts: 5,
            connect_retry_ms: 20,
            ..Default::default()
        };
        let (sink, mut rx) = EventSink::channel();
        let tracker = MediaPipeTracker::new(&config, sink);
        tracker.start().unwrap();
        tracker.process(test_frame(), Timestamp::from_micros(42));

        let mut saw_frame = false;
        let mut saw_pose = false;
        while !(saw_frame && saw_pose) {
            let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("timed out waiting for tracker events")
                .expect("sink closed");
            match event {
                TrackerEvent::PixelBuffer(frame) => {
                    assert_eq!(frame.timestamp(), Timestamp::from_micros(42));
                    saw_frame = true;
                }
                TrackerEvent::Transform(pose) => {
                    assert_eq!(pose.position(), glam::Vec3::new(2.0, 0.0, 0.0));
                    saw_pose = true;
                }
            }
        }
        assert!(tracker.is_connected());

        tracker.stop();
        let payload = tokio::time::timeout(Duration::from_secs(5), helper)
            .await
            .expect("helper did not finish")
            .unwrap();
        assert_eq!(payload, vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16]);
    }

    #[tokio::test]
    async fn test_stop_while_helper_is_not_reading() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        // Accepts the connection and never reads from it
        let helper = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(socket);
        });

        let config = MediaPipeConfig {
            port,
            connect_attempts: 5,
            connect_retry_ms: 20,
            ..Default::default()
        };
        let (sink, _rx) = EventSink::channel();
        let tracker = MediaPipeTracker::new(&config, sink);
        tracker.start().unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while !tracker.is_connected() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(tracker.is_connected());

        for i in 0..4 {
            let timestamp = Timestamp::from_micros(i * 33_333);
            tracker.process(VideoFrame::solid(1080, 1920, [0, 0, 0, 255], timestamp), timestamp);
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        tracker.stop();
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while tracker.is_connected() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!tracker.is_connected());
        helper.abort();
    }
}
