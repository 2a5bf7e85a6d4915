//! `robomaster video`: live view of the robot camera and the static webcam.

use crate::Cli;
use anyhow::Result;
use robot_driver::StreamResolution;
use std::sync::atomic::AtomicBool;
use teleop::TeleopConfig;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Sources {
    pub robot: bool,
    pub webcam: bool,
}

#[cfg(feature = "opencv")]
pub fn run(
    cli: &Cli,
    cfg: &TeleopConfig,
    resolution: StreamResolution,
    sources: Sources,
    device: Option<u32>,
    quit: &AtomicBool,
) -> Result<()> {
    use anyhow::Context;
    use robot_driver::RobotDriver;
    use std::sync::atomic::Ordering;
    use vision::{CameraSource, CaptureHints, Key, OpenCvCamera, Viewer};

    const ROBOT_WINDOW: &str = "RoboMaster Video";
    const WEBCAM_WINDOW: &str = "USB Webcam";
    const MARGIN: i32 = 20;

    let mut robot = if sources.robot {
        let mut driver = crate::connect_robot(cli, cfg)?;
        driver
            .start_video(resolution)
            .context("starting robot video stream")?;
        println!("Robot camera: {resolution}");
        Some((driver, Viewer::new(ROBOT_WINDOW)?))
    } else {
        None
    };

    let mut webcam = if sources.webcam {
        let index = device.unwrap_or(cfg.webcam.device_index);
        let hints = CaptureHints {
            width: Some(cfg.webcam.width),
            height: Some(cfg.webcam.height),
            fps: Some(cfg.webcam.fps),
        };
        match OpenCvCamera::open_with(&index.to_string(), hints) {
            Ok(cam) => {
                if let Ok((w, h, fps)) = cam.actual() {
                    println!("Webcam {index}: {w}x{h} at {fps:.0} fps");
                }
                let viewer = Viewer::new(WEBCAM_WINDOW)?;
                let x = 50 + resolution.dimensions().0 as i32 + MARGIN;
                viewer.move_to(if robot.is_some() { x } else { 50 }, 100)?;
                Some((cam, viewer))
            }
            // Robot view still works without the webcam
            Err(e) if robot.is_some() => {
                tracing::warn!(index, error = %e, "webcam unavailable");
                None
            }
            Err(e) => return Err(e).with_context(|| format!("opening webcam {index}")),
        }
    } else {
        None
    };
    if let Some((_, viewer)) = &robot {
        viewer.move_to(50, 100)?;
    }

    println!("Press q or Esc in a video window to quit");
    while !quit.load(Ordering::Relaxed) {
        if let Some((driver, viewer)) = robot.as_mut() {
            if let Some(frame) = driver.video_frame() {
                viewer.show(&frame, &[])?;
            }
        }
        if let Some((cam, viewer)) = webcam.as_mut() {
            match cam.read() {
                Ok(frame) => viewer.show(&frame, &[])?,
                Err(e) => tracing::debug!(error = %e, "webcam read failed"),
            }
        }
        if Viewer::poll_key(1)? == Key::Quit {
            break;
        }
    }

    println!("Closing video streams");
    drop(webcam);
    if let Some((mut driver, viewer)) = robot.take() {
        drop(viewer);
        if let Err(e) = driver.stop_video() {
            tracing::warn!(error = %e, "failed to stop video stream");
        }
        driver.disconnect().context("disconnecting")?;
    }
    Ok(())
}

#[cfg(not(feature = "opencv"))]
pub fn run(
    _cli: &Cli,
    _cfg: &TeleopConfig,
    resolution: StreamResolution,
    sources: Sources,
    _device: Option<u32>,
    _quit: &AtomicBool,
) -> Result<()> {
    tracing::debug!(%resolution, ?sources, "video requested without a capture backend");
    anyhow::bail!("video display needs a build with the `opencv` feature")
}
