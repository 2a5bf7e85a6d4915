use crate::action::wait_until_settled;
use crate::protocol::{
    gripper_level, parse_push, parse_reply, Reply, SdkCommand, CONTROL_PORT, PUSH_PORT,
    VIDEO_PORT,
};
use crate::{
    ActionTracker, ArmPosition, Capabilities, DriverError, LedColor, Result, RobotDriver,
    RobotStatus, StreamResolution, TelemetrySnapshot, TelemetryStore,
};
use std::io::{BufRead, BufReader, Write};
use std::net::{IpAddr, SocketAddr, TcpStream, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use vision::{CameraSource, Frame};

/// Step moves and arm moves give up after this long.
pub const ACTION_TIMEOUT: Duration = Duration::from_secs(5);
/// Arm travel speed used to estimate move durations, mm/s.
const ARM_SPEED_MM_S: f64 = 50.0;
const ARM_RECENTER_ESTIMATE: Duration = Duration::from_secs(1);
const STOP_ATTEMPTS: usize = 3;
const REFRESH_EVERY: Duration = Duration::from_secs(1);
/// How long a timed-out reply may still turn up before it counts as lost.
const LATE_REPLY_GRACE: Duration = Duration::from_secs(1);

#[derive(Clone, Debug)]
pub struct SdkConfig {
    pub robot_ip: IpAddr,
    /// Interface to receive pushes on; any interface when unset.
    pub local_ip: Option<IpAddr>,
    pub connect_timeout: Duration,
    pub reply_timeout: Duration,
}

impl SdkConfig {
    pub fn new(robot_ip: IpAddr) -> Self {
        Self {
            robot_ip,
            local_ip: None,
            connect_timeout: Duration::from_secs(3),
            reply_timeout: Duration::from_secs(2),
        }
    }

    pub fn video_url(&self) -> String {
        format!("tcp://{}:{}", self.robot_ip, VIDEO_PORT)
    }
}

struct ControlLink {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
    reply_timeout: Duration,
    /// The last reply timed out and may still be in flight.
    stale: bool,
}

impl ControlLink {
    fn open(cfg: &SdkConfig) -> Result<Self> {
        let addr = SocketAddr::new(cfg.robot_ip, CONTROL_PORT);
        let stream = TcpStream::connect_timeout(&addr, cfg.connect_timeout)
            .map_err(|e| DriverError::Connect(format!("{addr}: {e}")))?;
        stream.set_nodelay(true)?;
        Self::from_stream(stream, cfg.reply_timeout)
    }

    fn from_stream(stream: TcpStream, reply_timeout: Duration) -> Result<Self> {
        stream.set_read_timeout(Some(reply_timeout))?;
        let writer = stream.try_clone()?;
        Ok(Self {
            reader: BufReader::new(stream),
            writer,
            reply_timeout,
            stale: false,
        })
    }

    fn request(&mut self, cmd: &SdkCommand) -> Result<Reply> {
        if self.stale {
            self.skip_late_reply()?;
        }
        let line = cmd.encode();
        tracing::trace!(%line, "sdk send");
        self.writer.write_all(line.as_bytes())?;
        let mut buf = Vec::new();
        if let Err(e) = self.reader.read_until(b';', &mut buf) {
            let err = DriverError::from(e);
            if matches!(err, DriverError::Timeout) {
                // Bytes already read belong to this reply; the rest is skipped later
                self.stale = true;
                tracing::debug!(%line, partial = buf.len(), "sdk reply timed out");
            }
            return Err(err);
        }
        if buf.is_empty() {
            return Err(DriverError::Io("control connection closed".into()));
        }
        let text = String::from_utf8_lossy(&buf);
        tracing::trace!(reply = %text.trim(), "sdk recv");
        Ok(parse_reply(&text))
    }

    /// Consume the reply to a timed-out request so it is not taken as the
    /// answer to the next one.
    fn skip_late_reply(&mut self) -> Result<()> {
        self.stale = false;
        let grace = self.reply_timeout.max(LATE_REPLY_GRACE);
        self.reader.get_ref().set_read_timeout(Some(grace))?;
        let mut late = Vec::new();
        let read = self.reader.read_until(b';', &mut late);
        self.reader
            .get_ref()
            .set_read_timeout(Some(self.reply_timeout))?;
        match read {
            Ok(_) => {
                tracing::debug!(reply = %String::from_utf8_lossy(&late).trim(), "skipped late reply");
                Ok(())
            }
            Err(e) => match DriverError::from(e) {
                DriverError::Timeout => {
                    tracing::warn!("timed-out reply never arrived");
                    Ok(())
                }
                err => Err(err),
            },
        }
    }
}

/// Longest of the per-axis move times. NaN, infinite or negative values are
/// refused rather than handed to `Duration`.
fn move_estimate(secs: &[f64]) -> Result<Duration> {
    secs.iter().try_fold(Duration::ZERO, |longest, &s| {
        Duration::try_from_secs_f64(s)
            .map(|d| longest.max(d))
            .map_err(|e| DriverError::InvalidArgument(format!("move duration {s}: {e}")))
    })
}

/// UDP listener feeding push datagrams into the telemetry store.
struct PushListener {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl PushListener {
    fn start(bind_ip: Option<IpAddr>, store: TelemetryStore) -> Result<Self> {
        let ip = bind_ip.unwrap_or(IpAddr::from([0, 0, 0, 0]));
        let socket = UdpSocket::bind(SocketAddr::new(ip, PUSH_PORT))?;
        socket.set_read_timeout(Some(Duration::from_millis(200)))?;
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name("sdk-push".into())
            .spawn(move || {
                let mut buf = [0u8; 2048];
                while !flag.load(Ordering::Relaxed) {
                    match socket.recv(&mut buf) {
                        Ok(n) => {
                            let text = String::from_utf8_lossy(&buf[..n]);
                            for push in parse_push(&text) {
                                if !store.apply(&push) {
                                    tracing::trace!(?push, "ignored push segment");
                                }
                            }
                        }
                        Err(e)
                            if matches!(
                                e.kind(),
                                std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                            ) => {}
                        Err(e) => {
                            tracing::warn!(error = %e, "push socket failed");
                            break;
                        }
                    }
                }
            })
            .map_err(|e| DriverError::Io(e.to_string()))?;
        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }
}

impl Drop for PushListener {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

/// Driver speaking the plaintext SDK over the robot's TCP control port.
pub struct TextSdkDriver {
    config: SdkConfig,
    link: Option<ControlLink>,
    telemetry: TelemetryStore,
    push: Option<PushListener>,
    chassis: ActionTracker,
    arm: ActionTracker,
    caps: Capabilities,
    gripper_open: bool,
    battery: Option<u8>,
    video: Option<Box<dyn CameraSource>>,
    subscribed: bool,
    last_refresh: Option<Instant>,
}

impl TextSdkDriver {
    pub fn new(config: SdkConfig) -> Self {
        Self {
            config,
            link: None,
            telemetry: TelemetryStore::new(),
            push: None,
            chassis: ActionTracker::new("chassis"),
            arm: ActionTracker::new("arm"),
            caps: Capabilities::default(),
            gripper_open: true,
            battery: None,
            video: None,
            subscribed: false,
            last_refresh: None,
        }
    }

    /// Send a command. `ok` comes back as an empty string, data replies verbatim.
    pub fn command(&mut self, cmd: SdkCommand) -> Result<String> {
        let link = self.link.as_mut().ok_or(DriverError::NotConnected)?;
        match link.request(&cmd)? {
            Reply::Ok => Ok(String::new()),
            Reply::Data(d) => Ok(d),
            Reply::Rejected(reply) => Err(DriverError::Rejected {
                command: cmd.encode(),
                reply,
            }),
        }
    }

    fn probe(&mut self) {
        match self.command(SdkCommand::ArmPosition) {
            Ok(data) => {
                self.caps.arm = true;
                let v = crate::protocol::parse_floats(&data);
                if v.len() >= 2 {
                    self.telemetry.update_arm(ArmPosition { x: v[0], y: v[1] });
                }
            }
            Err(e) => tracing::info!(error = %e, "no robotic arm detected"),
        }
        match self.command(SdkCommand::GripperStatus) {
            Ok(data) => {
                self.caps.gripper = true;
                if let Ok(s) = data.trim().parse::<u8>() {
                    self.telemetry.update_gripper(s);
                }
            }
            Err(e) => tracing::info!(error = %e, "no gripper detected"),
        }
    }

    fn refresh(&mut self) -> Result<()> {
        if self.caps.gripper {
            let data = self.command(SdkCommand::GripperStatus)?;
            if let Ok(s) = data.trim().parse::<u8>() {
                self.telemetry.update_gripper(s);
            }
        }
        Ok(())
    }

    fn warn_on_err(what: &str, r: Result<()>) {
        if let Err(e) = r {
            tracing::warn!(error = %e, "{what} failed during disconnect");
        }
    }
}

impl RobotDriver for TextSdkDriver {
    fn connect(&mut self) -> Result<()> {
        let link = ControlLink::open(&self.config)?;
        self.link = Some(link);
        if let Err(e) = self.command(SdkCommand::Enter) {
            self.link = None;
            return Err(DriverError::Connect(format!("SDK mode refused: {e}")));
        }
        self.telemetry.reset();
        self.probe();
        self.battery = self.battery().ok();
        tracing::info!(
            robot = %self.config.robot_ip,
            arm = self.caps.arm,
            gripper = self.caps.gripper,
            battery = ?self.battery,
            "connected to robot"
        );
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        if self.link.is_none() {
            return Ok(());
        }
        Self::warn_on_err("stop", self.stop());
        if self.caps.gripper {
            Self::warn_on_err("gripper stop", self.gripper_stop());
        }
        Self::warn_on_err("video stop", self.stop_video());
        if self.subscribed {
            Self::warn_on_err("unsubscribe", self.unsubscribe_telemetry());
        }
        Self::warn_on_err("quit", self.command(SdkCommand::Quit).map(|_| ()));
        self.link = None;
        tracing::info!("disconnected from robot");
        Ok(())
    }

    fn status(&self) -> RobotStatus {
        RobotStatus {
            connected: self.link.is_some(),
            arm_ready: self.arm.is_ready(),
            arm_status: if self.caps.arm {
                self.arm.status()
            } else {
                "N/A".to_string()
            },
            gripper_open: self.gripper_open,
            battery: self.battery,
        }
    }

    fn capabilities(&self) -> Capabilities {
        self.caps
    }

    fn version(&mut self) -> Result<String> {
        let data = self.command(SdkCommand::Version)?;
        Ok(data.trim_start_matches("version").trim().to_string())
    }

    fn battery(&mut self) -> Result<u8> {
        let data = self.command(SdkCommand::Battery)?;
        let pct = data
            .trim()
            .parse::<u8>()
            .map_err(|_| DriverError::Protocol(format!("battery reply `{data}`")))?;
        self.battery = Some(pct);
        Ok(pct)
    }

    fn drive_speed(&mut self, vx: f64, vy: f64, vz: f64) -> Result<()> {
        self.command(SdkCommand::ChassisSpeed {
            x: vx,
            y: vy,
            z: vz,
        })
        .map(|_| ())
    }

    fn drive_move(
        &mut self,
        x: f64,
        y: f64,
        z: f64,
        xy_speed: f64,
        z_speed: f64,
    ) -> Result<bool> {
        let linear = x.hypot(y) / xy_speed.max(f64::EPSILON);
        let angular = z.abs() / z_speed.max(f64::EPSILON);
        let estimate = move_estimate(&[linear, angular])?;
        if !self.chassis.begin() {
            return Ok(false);
        }
        if let Err(e) = self.command(SdkCommand::ChassisMove {
            x,
            y,
            z,
            xy_speed,
            z_speed,
        }) {
            self.chassis.fail(&e);
            return Err(e);
        }
        let store = self.telemetry.clone();
        self.chassis.spawn_wait(move || {
            Ok(wait_until_settled(
                || {
                    let p = store.position();
                    [p.x, p.y, p.yaw]
                },
                estimate,
                ACTION_TIMEOUT,
            ))
        });
        Ok(true)
    }

    fn stop(&mut self) -> Result<()> {
        let mut last = None;
        for _ in 0..STOP_ATTEMPTS {
            match self.drive_speed(0.0, 0.0, 0.0) {
                Ok(()) => return Ok(()),
                Err(e) => last = Some(e),
            }
        }
        Err(last.unwrap_or(DriverError::NotConnected))
    }

    fn is_chassis_ready(&self) -> bool {
        self.chassis.is_ready()
    }

    fn arm_move(&mut self, x: f64, y: f64) -> Result<bool> {
        if !self.caps.arm {
            return Err(DriverError::Unsupported("no robotic arm"));
        }
        let estimate = move_estimate(&[x.hypot(y) / ARM_SPEED_MM_S])?;
        if !self.arm.begin() {
            return Ok(false);
        }
        if let Err(e) = self.command(SdkCommand::ArmMove { x, y }) {
            self.arm.fail(&e);
            return Err(e);
        }
        let store = self.telemetry.clone();
        self.arm.spawn_wait(move || {
            Ok(wait_until_settled(
                || {
                    let a = store.arm();
                    [a.x, a.y, 0.0]
                },
                estimate,
                ACTION_TIMEOUT,
            ))
        });
        Ok(true)
    }

    fn arm_recenter(&mut self) -> Result<bool> {
        if !self.caps.arm {
            return Err(DriverError::Unsupported("no robotic arm"));
        }
        if !self.arm.begin() {
            return Ok(false);
        }
        if let Err(e) = self.command(SdkCommand::ArmRecenter) {
            self.arm.fail(&e);
            return Err(e);
        }
        let store = self.telemetry.clone();
        self.arm.spawn_wait(move || {
            Ok(wait_until_settled(
                || {
                    let a = store.arm();
                    [a.x, a.y, 0.0]
                },
                ARM_RECENTER_ESTIMATE,
                ACTION_TIMEOUT,
            ))
        });
        Ok(true)
    }

    fn is_arm_ready(&self) -> bool {
        self.arm.is_ready()
    }

    fn gripper_open(&mut self, power: u8) -> Result<()> {
        self.command(SdkCommand::GripperOpen(gripper_level(power)))?;
        self.gripper_open = true;
        Ok(())
    }

    fn gripper_close(&mut self, power: u8) -> Result<()> {
        self.command(SdkCommand::GripperClose(gripper_level(power)))?;
        self.gripper_open = false;
        Ok(())
    }

    fn gripper_stop(&mut self) -> Result<()> {
        self.command(SdkCommand::GripperStop).map(|_| ())
    }

    fn led_on(&mut self, color: LedColor) -> Result<()> {
        self.command(SdkCommand::Led(color)).map(|_| ())
    }

    fn led_off(&mut self) -> Result<()> {
        self.command(SdkCommand::LedOff).map(|_| ())
    }

    fn start_video(&mut self, resolution: StreamResolution) -> Result<()> {
        // The plaintext stream has a fixed resolution
        tracing::debug!(%resolution, "requested stream resolution ignored by text SDK");
        self.command(SdkCommand::StreamOn)?;
        let url = self.config.video_url();
        match vision::open_stream(&url) {
            Ok(cam) => {
                tracing::info!(%url, "robot video stream opened");
                self.video = Some(cam);
                Ok(())
            }
            Err(e) => {
                let _ = self.command(SdkCommand::StreamOff);
                Err(e.into())
            }
        }
    }

    fn stop_video(&mut self) -> Result<()> {
        if self.video.take().is_some() {
            self.command(SdkCommand::StreamOff)?;
        }
        Ok(())
    }

    fn video_frame(&mut self) -> Option<Frame> {
        let cam = self.video.as_mut()?;
        match cam.read() {
            Ok(f) => Some(f),
            Err(e) => {
                tracing::debug!(error = %e, "robot frame unavailable");
                None
            }
        }
    }

    fn subscribe_telemetry(&mut self, freq_hz: u32) -> Result<()> {
        if self.push.is_none() {
            self.push = Some(PushListener::start(
                self.config.local_ip,
                self.telemetry.clone(),
            )?);
        }
        self.command(SdkCommand::ChassisPush {
            position: Some(freq_hz),
            attitude: Some(freq_hz),
            status: Some(freq_hz),
        })?;
        if self.caps.arm {
            if let Err(e) = self.command(SdkCommand::ArmPush(Some(freq_hz))) {
                tracing::warn!(error = %e, "arm position push unavailable");
            }
        }
        self.subscribed = true;
        Ok(())
    }

    fn unsubscribe_telemetry(&mut self) -> Result<()> {
        self.subscribed = false;
        let result = self
            .command(SdkCommand::ChassisPush {
                position: None,
                attitude: None,
                status: None,
            })
            .map(|_| ());
        if self.caps.arm {
            let _ = self.command(SdkCommand::ArmPush(None));
        }
        self.push = None;
        result
    }

    fn telemetry(&self) -> TelemetrySnapshot {
        self.telemetry.snapshot()
    }

    fn poll(&mut self) -> Result<()> {
        if !self.subscribed {
            return Ok(());
        }
        let due = self
            .last_refresh
            .map_or(true, |t| t.elapsed() >= REFRESH_EVERY);
        if due {
            self.last_refresh = Some(Instant::now());
            self.refresh()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::net::TcpListener;

    /// Fake robot answering each `;`-terminated command from a script.
    fn fake_robot(replies: Vec<&'static str>) -> (SocketAddr, JoinHandle<Vec<String>>) {
        slow_robot(replies.into_iter().map(|r| (r, Duration::ZERO)).collect())
    }

    /// Like `fake_robot`, but each reply is held back for its delay.
    fn slow_robot(
        replies: Vec<(&'static str, Duration)>,
    ) -> (SocketAddr, JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = thread::spawn(move || {
            let (mut sock, _) = listener.accept().unwrap();
            let mut seen = Vec::new();
            let mut pending = Vec::new();
            let mut byte = [0u8; 1];
            let mut replies = replies.into_iter();
            while let Ok(1) = sock.read(&mut byte) {
                pending.push(byte[0]);
                if byte[0] == b';' {
                    seen.push(String::from_utf8_lossy(&pending).to_string());
                    pending.clear();
                    let (reply, delay) = replies.next().unwrap_or(("ok;", Duration::ZERO));
                    thread::sleep(delay);
                    sock.write_all(reply.as_bytes()).unwrap();
                }
            }
            seen
        });
        (addr, handle)
    }

    fn driver_for(addr: SocketAddr) -> TextSdkDriver {
        driver_with_timeout(addr, Duration::from_secs(2))
    }

    fn driver_with_timeout(addr: SocketAddr, reply_timeout: Duration) -> TextSdkDriver {
        let mut cfg = SdkConfig::new(addr.ip());
        cfg.reply_timeout = reply_timeout;
        let mut drv = TextSdkDriver::new(cfg);
        // Tests talk to an ephemeral port instead of the fixed control port
        let stream = TcpStream::connect(addr).unwrap();
        drv.link = Some(ControlLink::from_stream(stream, reply_timeout).unwrap());
        drv
    }

    #[test]
    fn test_probe_and_commands() {
        let (addr, robot) = fake_robot(vec!["120 40;", "2;", "87;", "fail;"]);
        let mut drv = driver_for(addr);
        drv.probe();
        assert!(drv.capabilities().arm);
        assert!(drv.capabilities().gripper);
        assert_eq!(drv.telemetry().arm.x, 120.0);
        assert_eq!(drv.battery().unwrap(), 87);
        let err = drv.led_on(LedColor::RED).unwrap_err();
        assert!(matches!(err, DriverError::Rejected { .. }));
        drv.gripper_close(50).unwrap();
        assert!(!drv.status().gripper_open);
        drop(drv);
        let seen = robot.join().unwrap();
        assert_eq!(seen[0], "robotic_arm position ?;");
        assert_eq!(seen[3], "led control comp all r 255 g 0 b 0 effect solid;");
        assert_eq!(seen[4], "robotic_gripper close 2;");
    }

    #[test]
    fn test_step_move_tracked() {
        let (addr, robot) = fake_robot(vec![]);
        let mut drv = driver_for(addr);
        assert!(drv.drive_move(0.0, 0.0, 0.0, 0.5, 60.0).unwrap());
        // Already running: refused without touching the wire
        assert!(!drv.drive_move(0.2, 0.0, 0.0, 0.5, 60.0).unwrap());
        let start = Instant::now();
        while !drv.is_chassis_ready() && start.elapsed() < Duration::from_secs(3) {
            thread::sleep(Duration::from_millis(10));
        }
        assert!(drv.is_chassis_ready());
        drop(drv);
        let seen = robot.join().unwrap();
        assert_eq!(seen, vec!["chassis move x 0 y 0 z 0 vxy 0.5 vz 60;"]);
    }

    #[test]
    fn test_late_reply_not_taken_for_next() {
        let (addr, robot) = slow_robot(vec![
            ("version 00.01.0100;", Duration::from_millis(400)),
            ("87;", Duration::ZERO),
            ("ok;", Duration::ZERO),
        ]);
        let mut drv = driver_with_timeout(addr, Duration::from_millis(200));
        assert!(matches!(
            drv.command(SdkCommand::Version),
            Err(DriverError::Timeout)
        ));
        assert_eq!(drv.battery().unwrap(), 87);
        assert_eq!(drv.command(SdkCommand::Enter).unwrap(), "");
        drop(drv);
        let seen = robot.join().unwrap();
        assert_eq!(seen, vec!["version ?;", "robot battery ?;", "command;"]);
    }

    #[test]
    fn test_unrepresentable_move_refused() {
        let (addr, robot) = fake_robot(vec![]);
        let mut drv = driver_for(addr);
        drv.caps.arm = true;
        assert!(matches!(
            drv.drive_move(f64::NAN, 0.0, 0.0, 0.5, 60.0),
            Err(DriverError::InvalidArgument(_))
        ));
        assert!(matches!(
            drv.drive_move(0.0, 0.0, f64::INFINITY, 0.5, 60.0),
            Err(DriverError::InvalidArgument(_))
        ));
        assert!(matches!(
            drv.arm_move(f64::INFINITY, 0.0),
            Err(DriverError::InvalidArgument(_))
        ));
        // Refused before the tracker or the wire saw anything
        assert!(drv.is_chassis_ready());
        assert!(drv.is_arm_ready());
        drop(drv);
        assert!(robot.join().unwrap().is_empty());
    }

    #[test]
    fn test_not_connected() {
        let mut drv = TextSdkDriver::new(SdkConfig::new(IpAddr::from([127, 0, 0, 1])));
        assert!(matches!(
            drv.drive_speed(0.0, 0.0, 0.0),
            Err(DriverError::NotConnected)
        ));
        assert!(drv.disconnect().is_ok());
    }
}
