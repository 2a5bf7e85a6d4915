use crate::{Error, Frame, PixelFormat, Result};
use opencv::prelude::*;
use opencv::{core, highgui, imgproc};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Key {
    None,
    Quit,
    Other(i32),
}

impl Key {
    fn from_code(code: i32) -> Self {
        match code {
            -1 => Key::None,
            27 => Key::Quit,
            c if c == 'q' as i32 || c == 'Q' as i32 => Key::Quit,
            c => Key::Other(c),
        }
    }
}

/// A named highgui window. The window is destroyed on drop.
pub struct Viewer {
    name: String,
}

impl Viewer {
    pub fn new(name: &str) -> Result<Self> {
        highgui::named_window(name, highgui::WINDOW_AUTOSIZE).map_err(backend)?;
        Ok(Self {
            name: name.to_string(),
        })
    }

    pub fn move_to(&self, x: i32, y: i32) -> Result<()> {
        highgui::move_window(&self.name, x, y).map_err(backend)
    }

    /// Draw `lines` top-left over the frame and show it.
    pub fn show(&self, frame: &Frame, lines: &[String]) -> Result<()> {
        let mut mat = to_bgr_mat(frame)?;
        for (i, line) in lines.iter().enumerate() {
            imgproc::put_text(
                &mut mat,
                line,
                core::Point::new(10, 30 + 30 * i as i32),
                imgproc::FONT_HERSHEY_SIMPLEX,
                0.7,
                core::Scalar::new(0.0, 255.0, 0.0, 0.0),
                2,
                imgproc::LINE_8,
                false,
            )
            .map_err(backend)?;
        }
        highgui::imshow(&self.name, &mat).map_err(backend)
    }

    /// Pump the GUI event loop for up to `delay_ms` and report the key pressed.
    pub fn poll_key(delay_ms: i32) -> Result<Key> {
        let code = highgui::wait_key(delay_ms.max(1)).map_err(backend)?;
        Ok(Key::from_code(code))
    }
}

impl Drop for Viewer {
    fn drop(&mut self) {
        let _ = highgui::destroy_window(&self.name);
    }
}

fn backend(e: opencv::Error) -> Error {
    Error::Backend(e.to_string())
}

fn to_bgr_mat(frame: &Frame) -> Result<core::Mat> {
    if !frame.is_consistent() {
        return Err(Error::InvalidFrame("data length does not match geometry"));
    }
    let bgr: Vec<u8> = match frame.pixel_format {
        PixelFormat::Bgr8 => frame.data.clone(),
        PixelFormat::Rgb8 => frame
            .data
            .chunks_exact(3)
            .flat_map(|px| [px[2], px[1], px[0]])
            .collect(),
        PixelFormat::Gray8 => frame.data.iter().flat_map(|v| [*v, *v, *v]).collect(),
    };
    let flat = core::Mat::from_slice(&bgr).map_err(backend)?;
    let shaped = flat
        .reshape(3, frame.height as i32)
        .map_err(backend)?
        .try_clone()
        .map_err(backend)?;
    Ok(shaped)
}
