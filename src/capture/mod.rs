//! CaptureBuffer - staging of incoming frames.
//!
//! A captured frame is serialized into a caller buffer as:
//! - Header (16 bytes, little-endian):
//!   - Magic: "VPSCAP" (6 bytes)
//!   - Version: u8
//!   - Channels: u8
//!   - Width: u32
//!   - Height: u32
//! - Pixels: width * height * channels bytes
//!
//! The buffer assumes a single producer. The last written frame is kept so
//! the matching engine can tell whether consecutive frames are connected.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::{ConfigStore, Param};
use crate::error::{VpsError, VpsResult};
use crate::localization::{Image, ImageView, MatchingEngine};

pub const CAPTURE_MAGIC: &[u8; 6] = b"VPSCAP";
pub const CAPTURE_VERSION: u8 = 1;
pub const CAPTURE_HEADER_SIZE: usize = 16;

/// Outcome of one capture, laid out for the flat API.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureInfo {
    /// Bytes written into the caller buffer, 0 when the frame did not fit.
    pub capture_size: i32,
    /// 1 when the frame was written and chains onto the previous one.
    pub connected: i32,
}

pub struct CaptureBuffer {
    matcher: Arc<dyn MatchingEngine>,
    config: Arc<ConfigStore>,
    previous: Mutex<Option<Image>>,
}

impl CaptureBuffer {
    pub fn new(matcher: Arc<dyn MatchingEngine>, config: Arc<ConfigStore>) -> Self {
        Self {
            matcher,
            config,
            previous: Mutex::new(None),
        }
    }

    /// Encode `image` into `out`.
    ///
    /// Writes nothing when the encoded frame is larger than `out` or than
    /// `CaptureMaxBytes`.
    pub fn capture(&self, out: &mut [u8], image: &ImageView<'_>, use_matching: bool) -> VpsResult<CaptureInfo> {
        let image = ImageView::new(image.width, image.height, image.channels, image.data)?;
        let total = CAPTURE_HEADER_SIZE + image.data.len();
        let limit = (self.config.get(Param::CaptureMaxBytes).max(0) as usize).min(out.len());
        if total > limit {
            tracing::warn!(
                "Capture of {}x{}x{} ({} bytes) exceeds limit of {} bytes",
                image.width,
                image.height,
                image.channels,
                total,
                limit
            );
            return Ok(CaptureInfo::default());
        }
        let capture_size = i32::try_from(total)
            .map_err(|_| VpsError::InvalidInput(format!("capture of {total} bytes is too large")))?;

        out[0..6].copy_from_slice(CAPTURE_MAGIC);
        out[6] = CAPTURE_VERSION;
        out[7] = image.channels;
        out[8..12].copy_from_slice(&image.width.to_le_bytes());
        out[12..16].copy_from_slice(&image.height.to_le_bytes());
        out[CAPTURE_HEADER_SIZE..total].copy_from_slice(image.data);

        let mut previous = self.previous.lock();
        let connected = match previous.as_ref() {
            Some(prev) if use_matching => match self.matcher.frames_connected(&prev.view(), &image) {
                Ok(connected) => connected,
                Err(e) => {
                    tracing::warn!("Frame connectivity check failed: {:#}", e);
                    false
                }
            },
            _ => true,
        };
        *previous = Some(image.to_image());

        tracing::debug!("Captured {} bytes (connected: {})", total, connected);
        Ok(CaptureInfo {
            capture_size,
            connected: connected as i32,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atlas::Map;
    use crate::localization::{MatchRequest, PoseCandidate};

    /// Parse a captured frame back into an image view.
    fn decode_capture(bytes: &[u8]) -> VpsResult<ImageView<'_>> {
        if bytes.len() < CAPTURE_HEADER_SIZE || &bytes[0..6] != CAPTURE_MAGIC {
            return Err(VpsError::InvalidInput("not a captured frame".into()));
        }
        if bytes[6] != CAPTURE_VERSION {
            return Err(VpsError::InvalidInput(format!(
                "unsupported capture version {}",
                bytes[6]
            )));
        }
        let channels = bytes[7];
        let width = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
        let height = u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]);
        ImageView::new(width, height, channels, &bytes[CAPTURE_HEADER_SIZE..])
    }

    /// Engine that treats frames as connected when their first pixel matches.
    struct FirstPixelEngine;

    impl MatchingEngine for FirstPixelEngine {
        fn match_map(&self, _map: &Map, _request: &MatchRequest<'_>) -> anyhow::Result<Option<PoseCandidate>> {
            Ok(None)
        }

        fn frames_connected(&self, previous: &ImageView<'_>, current: &ImageView<'_>) -> anyhow::Result<bool> {
            Ok(previous.data[0] == current.data[0])
        }
    }

    fn buffer() -> (CaptureBuffer, Arc<ConfigStore>) {
        let config = Arc::new(ConfigStore::new());
        (CaptureBuffer::new(Arc::new(FirstPixelEngine), config.clone()), config)
    }

    #[test]
    fn test_capture_and_decode() {
        let (capture, _) = buffer();
        let pixels: Vec<u8> = (0..24).collect();
        let image = ImageView::new(4, 2, 3, &pixels).unwrap();
        let mut out = vec![0u8; 64];

        let info = capture.capture(&mut out, &image, false).unwrap();
        assert_eq!(info.capture_size, 40);
        assert_eq!(info.connected, 1);

        let decoded = decode_capture(&out[..40]).unwrap();
        assert_eq!((decoded.width, decoded.height, decoded.channels), (4, 2, 3));
        assert_eq!(decoded.data, pixels.as_slice());
    }

    #[test]
    fn test_capture_does_not_fit() {
        let (capture, config) = buffer();
        let pixels = [7u8; 16];
        let image = ImageView::new(4, 4, 1, &pixels).unwrap();

        let mut small = vec![0xAAu8; 20];
        let info = capture.capture(&mut small, &image, false).unwrap();
        assert_eq!(info, CaptureInfo::default());
        assert!(small.iter().all(|b| *b == 0xAA));

        config.set_integer("CaptureMaxBytes", 31).unwrap();
        let mut big = vec![0u8; 64];
        assert_eq!(capture.capture(&mut big, &image, false).unwrap().capture_size, 0);
        config.set_integer("CaptureMaxBytes", 32).unwrap();
        assert_eq!(capture.capture(&mut big, &image, false).unwrap().capture_size, 32);
    }

    #[test]
    fn test_connectivity_uses_engine() {
        let (capture, _) = buffer();
        let mut out = vec![0u8; 64];
        let a = [1u8; 4];
        let b = [2u8; 4];

        let first = capture
            .capture(&mut out, &ImageView::new(2, 2, 1, &a).unwrap(), true)
            .unwrap();
        assert_eq!(first.connected, 1);

        let second = capture
            .capture(&mut out, &ImageView::new(2, 2, 1, &b).unwrap(), true)
            .unwrap();
        assert_eq!(second.connected, 0);

        // Without matching the check is skipped.
        let third = capture
            .capture(&mut out, &ImageView::new(2, 2, 1, &a).unwrap(), false)
            .unwrap();
        assert_eq!(third.connected, 1);
    }
}
