use crate::{Error, Frame, PixelFormat, Result};
use std::fs;
use std::path::Path;

/// Encode a frame as binary PPM (P6). BGR input is swapped to RGB and gray
/// input is expanded to three channels.
pub fn encode_ppm(frame: &Frame) -> Result<Vec<u8>> {
    if !frame.is_consistent() {
        return Err(Error::InvalidFrame("data length does not match geometry"));
    }
    let header = format!("P6\n{} {}\n255\n", frame.width, frame.height);
    let pixels = frame.width as usize * frame.height as usize;
    let mut out = Vec::with_capacity(header.len() + pixels * 3);
    out.extend_from_slice(header.as_bytes());
    match frame.pixel_format {
        PixelFormat::Rgb8 => out.extend_from_slice(&frame.data),
        PixelFormat::Bgr8 => {
            for px in frame.data.chunks_exact(3) {
                out.extend_from_slice(&[px[2], px[1], px[0]]);
            }
        }
        PixelFormat::Gray8 => {
            for v in &frame.data {
                out.extend_from_slice(&[*v, *v, *v]);
            }
        }
    }
    Ok(out)
}

pub fn write_ppm(path: impl AsRef<Path>, frame: &Frame) -> Result<()> {
    let bytes = encode_ppm(frame)?;
    fs::write(path, bytes)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_bgr_swaps_channels() {
        let frame = Frame {
            width: 1,
            height: 1,
            pixel_format: PixelFormat::Bgr8,
            data: vec![1, 2, 3],
            ts: None,
        };
        let out = encode_ppm(&frame).unwrap();
        assert!(out.starts_with(b"P6\n1 1\n255\n"));
        assert_eq!(&out[out.len() - 3..], &[3, 2, 1]);
    }

    #[test]
    fn test_encode_rejects_short_data() {
        let mut frame = Frame::black(4, 4);
        frame.data.truncate(10);
        assert!(matches!(encode_ppm(&frame), Err(Error::InvalidFrame(_))));
    }

    #[test]
    fn test_write_gray_expands() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("g.ppm");
        let frame = Frame {
            width: 2,
            height: 1,
            pixel_format: PixelFormat::Gray8,
            data: vec![7, 9],
            ts: None,
        };
        write_ppm(&path, &frame).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[bytes.len() - 6..], &[7, 7, 7, 9, 9, 9]);
    }
}
