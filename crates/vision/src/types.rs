use time::OffsetDateTime;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PixelFormat {
    Bgr8,
    Rgb8,
    Gray8,
}

impl PixelFormat {
    pub fn channels(self) -> usize {
        match self {
            PixelFormat::Bgr8 | PixelFormat::Rgb8 => 3,
            PixelFormat::Gray8 => 1,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
    pub data: Vec<u8>,
    pub ts: Option<OffsetDateTime>,
}

impl Frame {
    /// All-zero RGB frame, used as a stand-in when a camera has no sample.
    pub fn black(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixel_format: PixelFormat::Rgb8,
            data: vec![0u8; width as usize * height as usize * 3],
            ts: None,
        }
    }

    /// Expected byte length for the declared geometry.
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * self.pixel_format.channels()
    }

    pub fn is_consistent(&self) -> bool {
        self.data.len() == self.expected_len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_black_frame_geometry() {
        let f = Frame::black(640, 360);
        assert_eq!(f.data.len(), 640 * 360 * 3);
        assert!(f.is_consistent());
        assert!(f.data.iter().all(|b| *b == 0));
        assert!(f.ts.is_none());
    }

    #[test]
    fn test_channels() {
        assert_eq!(PixelFormat::Gray8.channels(), 1);
        assert_eq!(PixelFormat::Bgr8.channels(), 3);
    }
}
