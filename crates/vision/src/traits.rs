use crate::{Frame, Result};

pub trait CameraSource: Send {
    /// Open a camera source by device index or path/URL string.
    fn open(source: &str) -> Result<Self>
    where
        Self: Sized;

    /// Read a single frame.
    fn read(&mut self) -> Result<Frame>;
}

/// Open a network video stream (e.g. `tcp://192.168.2.1:40921`) with whatever
/// capture backend was compiled in.
#[cfg(feature = "opencv")]
pub fn open_stream(url: &str) -> Result<Box<dyn CameraSource>> {
    let cam = crate::OpenCvCamera::open(url)?;
    Ok(Box::new(cam))
}

#[cfg(not(feature = "opencv"))]
pub fn open_stream(url: &str) -> Result<Box<dyn CameraSource>> {
    tracing::debug!(url, "no capture backend compiled in");
    Err(crate::Error::Unsupported(
        "video streams need the `opencv` feature",
    ))
}
