use crate::{CameraSource, Frame, PixelFormat, Result};
use time::OffsetDateTime;

/// Synthetic RGB source. The gradient shifts by one step per frame so that
/// consecutive frames differ.
pub struct MockCamera {
    counter: u64,
    width: u32,
    height: u32,
}

impl MockCamera {
    pub fn with_size(width: u32, height: u32) -> Self {
        Self {
            counter: 0,
            width,
            height,
        }
    }

    pub fn frames_read(&self) -> u64 {
        self.counter
    }
}

impl CameraSource for MockCamera {
    fn open(_source: &str) -> Result<Self> {
        Ok(Self::with_size(320, 240))
    }

    fn read(&mut self) -> Result<Frame> {
        self.counter += 1;
        let (width, height) = (self.width, self.height);
        let shift = self.counter as u32;
        let mut data = vec![0u8; (width * height * 3) as usize];
        for y in 0..height {
            for x in 0..width {
                let idx = ((y * width + x) * 3) as usize;
                data[idx] = ((x + shift) % 256) as u8;
                data[idx + 1] = ((y + shift) % 256) as u8;
                data[idx + 2] = ((x + y) % 256) as u8;
            }
        }
        Ok(Frame {
            width,
            height,
            pixel_format: PixelFormat::Rgb8,
            data,
            ts: Some(OffsetDateTime::now_utc()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_frames_differ() {
        let mut cam = MockCamera::with_size(16, 8);
        let a = cam.read().unwrap();
        let b = cam.read().unwrap();
        assert!(a.is_consistent());
        assert_ne!(a.data, b.data);
        assert_eq!(cam.frames_read(), 2);
    }
}
