//! vision: camera abstraction for the robot stream and the static webcam
//!
//! The default build only carries the `mock` backend so binaries compile on any
//! host. The `opencv` feature adds a capture backend (USB index or stream URL)
//! and a window viewer used by the drive loop.

mod types;
pub use types::{Frame, PixelFormat};

mod error;
pub use error::{Error, Result};

mod traits;
pub use traits::{open_stream, CameraSource};

mod ppm;
pub use ppm::{encode_ppm, write_ppm};

#[cfg(feature = "mock")]
mod mock;
#[cfg(feature = "mock")]
pub use mock::MockCamera;

#[cfg(feature = "opencv")]
mod opencv_backend;
#[cfg(feature = "opencv")]
pub use opencv_backend::{CaptureHints, OpenCvCamera};

#[cfg(feature = "opencv")]
mod viewer;
#[cfg(feature = "opencv")]
pub use viewer::{Key, Viewer};
