mod encode;

pub use encode::{decode_data_uri, encode_frame, EncodedFrame, FramePayload};

use crate::camera::CaptureHandle;
use crate::session::SessionGuard;
use futures::Stream;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, trace, warn};

/// Turns the live capture stream into encoded payloads on a fixed cadence
#[derive(Clone)]
pub struct FrameSampler {
    handle: CaptureHandle,
    interval: Duration,
    quality: u8,
    guard: SessionGuard,
}

impl FrameSampler {
    pub fn new(
        handle: CaptureHandle,
        interval: Duration,
        quality: u8,
        guard: SessionGuard,
    ) -> Self {
        Self {
            handle,
            interval,
            quality,
            guard,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// One payload per tick until the session leaves Active or the capture
    /// handle is released. Each call starts a fresh sequence.
    pub fn frames(&self) -> impl Stream<Item = EncodedFrame> + Send + 'static {
        let handle = self.handle.clone();
        let guard = self.guard.clone();
        let period = self.interval;
        let quality = self.quality;

        async_stream::stream! {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;

                // Read the live state on every tick; a stale tick must not produce a payload
                if !guard.is_active() || handle.is_released() {
                    debug!("Sampling stopped (state {:?})", guard.state());
                    break;
                }

                let frame = match handle.current_frame() {
                    Some(frame) => frame,
                    None => {
                        trace!("No frame available yet");
                        continue;
                    }
                };

                match encode_frame(&frame, quality) {
                    Ok(encoded) => {
                        trace!(
                            "Sampled frame {} ({}x{}, {} bytes)",
                            encoded.frame_id,
                            encoded.width,
                            encoded.height,
                            encoded.image.len()
                        );
                        yield encoded;
                    }
                    Err(e) => warn!("Failed to encode frame {}: {}", frame.id, e),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{CameraManager, CaptureConstraints, SyntheticCamera};
    use crate::session::{SessionState, SessionView};
    use futures::StreamExt;
    use std::sync::Arc;
    use tokio::sync::watch;
    use tokio::time::timeout;

    fn constraints() -> CaptureConstraints {
        CaptureConstraints {
            ideal_width: 32,
            ideal_height: 24,
            ..CaptureConstraints::default()
        }
    }

    fn active_view() -> SessionView {
        SessionView {
            state: SessionState::Active,
            ..SessionView::idle()
        }
    }

    #[tokio::test]
    async fn test_sampler_yields_payloads_while_active() {
        let manager = CameraManager::new(Arc::new(SyntheticCamera::new()));
        let handle = manager.acquire(&constraints()).await.unwrap();
        let (_view_tx, view_rx) = watch::channel(active_view());

        let guard = SessionGuard::new(view_rx);
        let sampler = FrameSampler::new(handle, Duration::from_millis(10), 80, guard);
        let frames: Vec<_> = timeout(Duration::from_secs(2), sampler.frames().take(3).collect())
            .await
            .unwrap();

        assert_eq!(frames.len(), 3);
        assert!(frames.iter().all(|f| f.image.starts_with("data:image/jpeg;base64,")));
        assert!(frames[0].frame_id < frames[2].frame_id);
    }

    #[tokio::test]
    async fn test_sampler_stops_when_session_leaves_active() {
        let manager = CameraManager::new(Arc::new(SyntheticCamera::new()));
        let handle = manager.acquire(&constraints()).await.unwrap();
        let (view_tx, view_rx) = watch::channel(active_view());

        let guard = SessionGuard::new(view_rx);
        let sampler = FrameSampler::new(handle, Duration::from_millis(10), 80, guard);
        let mut frames = Box::pin(sampler.frames());

        assert!(frames.next().await.is_some());

        view_tx.send_modify(|view| view.state = SessionState::Stopped);
        let next = timeout(Duration::from_secs(1), frames.next()).await.unwrap();
        assert!(next.is_none());
    }

    #[tokio::test]
    async fn test_sampler_stops_when_handle_released() {
        let manager = CameraManager::new(Arc::new(SyntheticCamera::new()));
        let handle = manager.acquire(&constraints()).await.unwrap();
        let (_view_tx, view_rx) = watch::channel(active_view());

        let sampler = FrameSampler::new(
            handle.clone(),
            Duration::from_millis(10),
            80,
            SessionGuard::new(view_rx),
        );
        manager.release(Some(&handle));

        let frames: Vec<_> = timeout(Duration::from_secs(1), sampler.frames().collect())
            .await
            .unwrap();
        assert!(frames.is_empty());
    }

    #[tokio::test]
    async fn test_sampler_is_restartable() {
        let manager = CameraManager::new(Arc::new(SyntheticCamera::new()));
        let handle = manager.acquire(&constraints()).await.unwrap();
        let (_view_tx, view_rx) = watch::channel(active_view());
        let guard = SessionGuard::new(view_rx);
        let sampler = FrameSampler::new(handle, Duration::from_millis(10), 80, guard);

        let first: Vec<_> = sampler.frames().take(1).collect().await;
        let second: Vec<_> = sampler.frames().take(1).collect().await;
        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
    }
}
