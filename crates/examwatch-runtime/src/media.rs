//! Collaborator seams: face detector, cameras and microphone.
//!
//! Devices are scoped resources. [`Acquired`] releases its device when
//! dropped, so every exit path of a monitor task gives the hardware back.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use thiserror::Error;

/// Camera or microphone could not be acquired.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("permission denied")]
    Denied,
    #[error("device not found")]
    NotFound,
    #[error("device error: {0}")]
    Device(String),
}

#[derive(Debug, Error)]
pub enum DetectorError {
    /// Model not loaded yet. Transient: the tick is skipped.
    #[error("detector not ready")]
    NotReady,
    #[error("detection failed: {0}")]
    Failed(String),
}

/// One frame pulled from a video source.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub source_id: String,
    /// Per-source frame sequence number.
    pub seq: u64,
    pub width: u32,
    pub height: u32,
    pub pixels: Arc<[u8]>,
}

/// One face found by the detector. `bbox` is `[x, y, width, height]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub bbox: [f64; 4],
    pub confidence: f64,
}

/// Opaque face detector. Calls may be slow and run on the blocking pool.
pub trait FaceDetector: Send + Sync + 'static {
    /// Whether the model has finished loading.
    fn is_ready(&self) -> bool;

    fn estimate_faces(&self, frame: &VideoFrame) -> Result<Vec<Detection>, DetectorError>;
}

/// A device that must be acquired before use and released afterwards.
pub trait MediaDevice: Send + 'static {
    /// Stable identifier, also the canvas slot key for cameras.
    fn id(&self) -> &str;

    fn acquire(&mut self) -> Result<(), MediaError>;

    fn release(&mut self);
}

pub trait VideoSource: MediaDevice {
    /// Latest frame, `None` while the stream has nothing to show yet.
    fn latest_frame(&mut self) -> Option<VideoFrame>;
}

pub trait Microphone: MediaDevice {
    /// Fill `bins` with the current byte frequency-domain magnitudes.
    fn frequency_data(&mut self, bins: &mut [u8]);
}

impl<D: MediaDevice + ?Sized> MediaDevice for Box<D> {
    fn id(&self) -> &str {
        (**self).id()
    }

    fn acquire(&mut self) -> Result<(), MediaError> {
        (**self).acquire()
    }

    fn release(&mut self) {
        (**self).release();
    }
}

impl<V: VideoSource + ?Sized> VideoSource for Box<V> {
    fn latest_frame(&mut self) -> Option<VideoFrame> {
        (**self).latest_frame()
    }
}

impl<M: Microphone + ?Sized> Microphone for Box<M> {
    fn frequency_data(&mut self, bins: &mut [u8]) {
        (**self).frequency_data(bins);
    }
}

/// An acquired device. Released on drop.
pub struct Acquired<D: MediaDevice> {
    device: D,
}

impl<D: MediaDevice> Acquired<D> {
    /// Acquire `device`, handing it back with the error on failure.
    pub fn acquire(mut device: D) -> Result<Self, (D, MediaError)> {
        match device.acquire() {
            Ok(()) => {
                tracing::debug!(device = device.id(), "device acquired");
                Ok(Self { device })
            }
            Err(e) => Err((device, e)),
        }
    }
}

impl<D: MediaDevice> Deref for Acquired<D> {
    type Target = D;

    fn deref(&self) -> &D {
        &self.device
    }
}

impl<D: MediaDevice> DerefMut for Acquired<D> {
    fn deref_mut(&mut self) -> &mut D {
        &mut self.device
    }
}

impl<D: MediaDevice> Drop for Acquired<D> {
    fn drop(&mut self) {
        self.device.release();
        tracing::debug!(device = self.device.id(), "device released");
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{DeviceLedger, FakeCamera};
    use super::*;
    use std::sync::atomic::Ordering;

    #[test]
    fn acquired_releases_on_drop() {
        let ledger = Arc::new(DeviceLedger::default());
        {
            let mut cam = Acquired::acquire(FakeCamera::new("local", 640, &ledger))
                .map_err(|(_, e)| e)
                .expect("acquire");
            assert_eq!(cam.id(), "local");
            assert!(cam.latest_frame().is_some());
            assert!(!ledger.balanced());
        }
        assert!(ledger.balanced());
    }

    #[test]
    fn failed_acquire_returns_device_and_error() {
        let ledger = Arc::new(DeviceLedger::default());
        let mut cam = FakeCamera::new("ipcam", 320, &ledger);
        cam.fail = true;
        let Err((cam, err)) = Acquired::acquire(cam) else {
            panic!("acquire should fail");
        };
        assert_eq!(cam.id(), "ipcam");
        assert!(matches!(err, MediaError::Denied));
        assert_eq!(ledger.acquired.load(Ordering::SeqCst), 0);
        assert_eq!(ledger.released.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn boxed_sources_forward_to_inner() {
        let ledger = Arc::new(DeviceLedger::default());
        let boxed: Box<dyn VideoSource> = Box::new(FakeCamera::new("local", 640, &ledger));
        let mut cam = Acquired::acquire(boxed).map_err(|(_, e)| e).expect("acquire");
        let frame = cam.latest_frame().expect("frame");
        assert_eq!(frame.source_id, "local");
        assert_eq!(frame.width, 640);
        drop(cam);
        assert!(ledger.balanced());
    }
}
