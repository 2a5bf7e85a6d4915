use crate::{CameraSource, Error, Frame, PixelFormat, Result};
use opencv::prelude::*;
use opencv::{core, videoio};
use time::OffsetDateTime;

/// Requested capture geometry. Drivers may ignore these; the actual values
/// are reported by [`OpenCvCamera::actual`].
#[derive(Clone, Copy, Debug, Default)]
pub struct CaptureHints {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fps: Option<u32>,
}

pub struct OpenCvCamera {
    cap: videoio::VideoCapture,
}

impl OpenCvCamera {
    pub fn open_with(source: &str, hints: CaptureHints) -> Result<Self> {
        let mut cam = Self::open(source)?;
        let props = [
            (videoio::CAP_PROP_FRAME_WIDTH, hints.width),
            (videoio::CAP_PROP_FRAME_HEIGHT, hints.height),
            (videoio::CAP_PROP_FPS, hints.fps),
        ];
        for (prop, value) in props {
            if let Some(v) = value {
                let accepted = cam
                    .cap
                    .set(prop, v as f64)
                    .map_err(|e| Error::Backend(e.to_string()))?;
                if !accepted {
                    tracing::debug!(prop, value = v, "capture property rejected");
                }
            }
        }
        Ok(cam)
    }

    /// (width, height, fps) as reported by the driver.
    pub fn actual(&self) -> Result<(u32, u32, f64)> {
        let w = self
            .cap
            .get(videoio::CAP_PROP_FRAME_WIDTH)
            .map_err(|e| Error::Backend(e.to_string()))?;
        let h = self
            .cap
            .get(videoio::CAP_PROP_FRAME_HEIGHT)
            .map_err(|e| Error::Backend(e.to_string()))?;
        let fps = self
            .cap
            .get(videoio::CAP_PROP_FPS)
            .map_err(|e| Error::Backend(e.to_string()))?;
        Ok((w as u32, h as u32, fps))
    }
}

impl CameraSource for OpenCvCamera {
    fn open(source: &str) -> Result<Self> {
        // A numeric source is a device index, anything else a path or URL
        let cap = if let Ok(idx) = source.parse::<i32>() {
            videoio::VideoCapture::new(idx, videoio::CAP_ANY)
                .map_err(|e| Error::Backend(e.to_string()))?
        } else {
            videoio::VideoCapture::from_file(source, videoio::CAP_ANY)
                .map_err(|e| Error::Backend(e.to_string()))?
        };
        let opened =
            videoio::VideoCapture::is_opened(&cap).map_err(|e| Error::Backend(e.to_string()))?;
        if !opened {
            return Err(Error::NotFound(source.to_string()));
        }
        Ok(Self { cap })
    }

    fn read(&mut self) -> Result<Frame> {
        let mut mat = core::Mat::default();
        self.cap
            .read(&mut mat)
            .map_err(|e| Error::Backend(e.to_string()))?;
        if mat.empty() {
            return Err(Error::Io("empty frame".into()));
        }

        let width = mat.cols() as u32;
        let height = mat.rows() as u32;
        // OpenCV hands out BGR; keep it and let consumers convert
        let data = mat
            .data_bytes()
            .map_err(|e| Error::Backend(e.to_string()))?
            .to_vec();
        Ok(Frame {
            width,
            height,
            pixel_format: PixelFormat::Bgr8,
            data,
            ts: Some(OffsetDateTime::now_utc()),
        })
    }
}
