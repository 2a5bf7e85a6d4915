use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use gamepad::{list_gamepads, Gamepad, GamepadError, GilrsGamepad, InputMonitor};
use robot_driver::{LedColor, RobotDriver, SdkConfig, StreamResolution, TextSdkDriver};
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use teleop::config::DEFAULT_CONFIG_FILE;
use teleop::{report_lines, DriveMode, TeleopConfig};

mod drive;
mod video;

#[derive(Parser, Debug)]
#[command(
    name = "robomaster",
    version,
    about = "RoboMaster EP teleoperation CLI",
    disable_help_subcommand = true
)]
struct Cli {
    /// YAML settings file; defaults apply when it does not exist
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Local interface address (overrides connection.local_ip)
    #[arg(short = 'l', long, global = true)]
    local_ip: Option<IpAddr>,

    /// Robot address (overrides connection.robot_ip)
    #[arg(short = 'r', long, global = true)]
    robot_ip: Option<IpAddr>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Resolution {
    #[value(name = "360p")]
    P360,
    #[value(name = "540p")]
    P540,
    #[value(name = "720p")]
    P720,
}

impl From<Resolution> for StreamResolution {
    fn from(r: Resolution) -> Self {
        match r {
            Resolution::P360 => StreamResolution::P360,
            Resolution::P540 => StreamResolution::P540,
            Resolution::P720 => StreamResolution::P720,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Mode {
    Continuous,
    Step,
}

impl From<Mode> for DriveMode {
    fn from(m: Mode) -> Self {
        match m {
            Mode::Continuous => DriveMode::Continuous,
            Mode::Step => DriveMode::Step,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum LedAction {
    On,
    Off,
    Set,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print version, battery and sensor readings
    Info {
        /// Seconds to collect sensor pushes
        #[arg(short = 'w', long, default_value_t = 1.5)]
        wait: f64,
    },
    /// Show the robot camera and/or the static webcam
    Video {
        #[arg(long, value_enum)]
        resolution: Option<Resolution>,
        /// Webcam only
        #[arg(long = "static", action = ArgAction::SetTrue, conflicts_with = "robot")]
        static_only: bool,
        /// Robot camera only
        #[arg(long, action = ArgAction::SetTrue)]
        robot: bool,
        /// Webcam device index (overrides webcam.device_index)
        #[arg(short = 'd', long)]
        device: Option<u32>,
    },
    /// Switch the LEDs on, off or to a colour
    Led {
        #[arg(value_enum, default_value_t = LedAction::On)]
        action: LedAction,
        /// Name, #RRGGBB or r,g,b
        #[arg(short = 'c', long, default_value = "white")]
        color: String,
    },
    /// Drive with a game controller
    Drive(DriveArgs),
    /// List controllers and print input changes to find axis/button indices
    ControlConfig {
        #[arg(long, default_value_t = 0)]
        gamepad: usize,
    },
}

#[derive(Args, Debug)]
struct DriveArgs {
    #[arg(short = 'm', long, value_enum, default_value_t = Mode::Continuous)]
    mode: Mode,
    #[arg(long, value_enum)]
    resolution: Option<Resolution>,
    #[arg(long, action = ArgAction::SetTrue)]
    no_video: bool,
    /// Drive the kinematic simulator instead of a robot
    #[arg(long, action = ArgAction::SetTrue)]
    simu: bool,
    /// Log commands to PATH (a timestamped name when omitted)
    #[arg(long, num_args = 0..=1, conflicts_with = "replay")]
    record: Option<Option<PathBuf>>,
    /// Replay a command log instead of reading the sticks
    #[arg(long, conflicts_with = "dataset")]
    replay: Option<PathBuf>,
    /// Replay on recorded timestamps without waiting for the robot's pose
    #[arg(long, action = ArgAction::SetTrue, requires = "replay")]
    time_based: bool,
    /// Capture a dataset episode while driving
    #[arg(long, action = ArgAction::SetTrue)]
    dataset: bool,
    /// Sample the episode but write nothing
    #[arg(long, action = ArgAction::SetTrue, requires = "dataset")]
    dry_run: bool,
    /// Task description stored with the episode
    #[arg(long, requires = "dataset")]
    task: Option<String>,
    /// Dataset sampling rate (overrides dataset.fps)
    #[arg(long, requires = "dataset")]
    fps: Option<u32>,
    /// Log telemetry and add it to the video overlay
    #[arg(long, action = ArgAction::SetTrue)]
    telemetry: bool,
    /// Controller index
    #[arg(long, default_value_t = 0)]
    gamepad: usize,
    /// Print loop counters in the Prometheus text format on exit
    #[arg(long, action = ArgAction::SetTrue)]
    metrics: bool,
}

fn main() -> Result<()> {
    setup_tracing();
    let cli = Cli::parse();
    let cfg = TeleopConfig::load(&cli.config)?;

    let quit = Arc::new(AtomicBool::new(false));
    install_ctrl_c(quit.clone())?;

    match &cli.command {
        Commands::Info { wait } => info(&cli, &cfg, *wait),
        Commands::Video {
            resolution,
            static_only,
            robot,
            device,
        } => {
            let res = resolution.map_or(cfg.robot_video.default_resolution, Into::into);
            let sources = video::Sources {
                robot: !static_only,
                webcam: !robot,
            };
            video::run(&cli, &cfg, res, sources, *device, &quit)
        }
        Commands::Led { action, color } => led(&cli, &cfg, *action, color),
        Commands::Drive(args) => drive::run(&cli, &cfg, args, &quit),
        Commands::ControlConfig { gamepad } => control_config(&cfg, *gamepad, &quit),
    }
}

fn setup_tracing() {
    // Best-effort; avoid panics if already set
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// First Ctrl-C asks the loops to stop; a second one exits immediately.
fn install_ctrl_c(quit: Arc<AtomicBool>) -> Result<()> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("building signal runtime")?;
    thread::Builder::new()
        .name("ctrl-c".into())
        .spawn(move || {
            rt.block_on(async {
                if tokio::signal::ctrl_c().await.is_err() {
                    return;
                }
                tracing::info!("interrupt received, stopping");
                quit.store(true, Ordering::Relaxed);
                if tokio::signal::ctrl_c().await.is_ok() {
                    std::process::exit(130);
                }
            });
        })
        .context("spawning signal thread")?;
    Ok(())
}

fn parse_ip(raw: &str, field: &str) -> Result<IpAddr> {
    raw.parse()
        .with_context(|| format!("invalid {field} `{raw}`"))
}

fn sdk_config(cli: &Cli, cfg: &TeleopConfig) -> Result<SdkConfig> {
    let robot_ip = match cli.robot_ip {
        Some(ip) => ip,
        None => parse_ip(&cfg.connection.robot_ip, "connection.robot_ip")?,
    };
    let local_ip = match cli.local_ip {
        Some(ip) => Some(ip),
        None if cfg.connection.local_ip.trim().is_empty() => None,
        None => Some(parse_ip(&cfg.connection.local_ip, "connection.local_ip")?),
    };
    let mut sdk = SdkConfig::new(robot_ip);
    sdk.local_ip = local_ip;
    Ok(sdk)
}

fn connect_robot(cli: &Cli, cfg: &TeleopConfig) -> Result<TextSdkDriver> {
    let sdk = sdk_config(cli, cfg)?;
    let target = sdk.robot_ip;
    let mut driver = TextSdkDriver::new(sdk);
    driver
        .connect()
        .with_context(|| format!("connecting to robot at {target}"))?;
    println!("Connected to {target}");
    Ok(driver)
}

fn info(cli: &Cli, cfg: &TeleopConfig, wait: f64) -> Result<()> {
    let mut driver = connect_robot(cli, cfg)?;

    println!("\n--- Basic info ---");
    match driver.version() {
        Ok(v) => println!("Version: {v}"),
        Err(e) => println!("Version: error ({e})"),
    }
    match driver.battery() {
        Ok(b) => println!("Battery: {b}%"),
        Err(e) => println!("Battery: error ({e})"),
    }
    let caps = driver.capabilities();
    println!("Arm: {}  Gripper: {}", yes_no(caps.arm), yes_no(caps.gripper));

    println!("\nCollecting sensor data ({wait:.1}s)...");
    driver
        .subscribe_telemetry(10)
        .context("subscribing to sensor pushes")?;
    let until = Instant::now() + Duration::from_secs_f64(wait.max(0.0));
    while Instant::now() < until {
        if let Err(e) = driver.poll() {
            tracing::warn!(error = %e, "poll failed");
        }
        thread::sleep(Duration::from_millis(50));
    }

    println!("\n--- Sensors ---");
    for line in report_lines(&driver.telemetry(), 10) {
        println!("{line}");
    }
    let status = driver.status();
    println!("Arm status: {}", status.arm_status);

    if let Err(e) = driver.unsubscribe_telemetry() {
        tracing::warn!(error = %e, "unsubscribe failed");
    }
    driver.disconnect().context("disconnecting")?;
    Ok(())
}

fn yes_no(b: bool) -> &'static str {
    if b {
        "yes"
    } else {
        "no"
    }
}

fn led(cli: &Cli, cfg: &TeleopConfig, action: LedAction, color: &str) -> Result<()> {
    let rgb: LedColor = color.parse().map_err(|e| anyhow!("{e}"))?;
    let mut driver = connect_robot(cli, cfg)?;
    match action {
        LedAction::Off => {
            driver.led_off().context("switching LEDs off")?;
            println!("LEDs off");
        }
        LedAction::On | LedAction::Set => {
            driver.led_on(rgb).context("setting LEDs")?;
            println!("LEDs on: {rgb}");
        }
    }
    driver.disconnect().context("disconnecting")?;
    Ok(())
}

fn control_config(cfg: &TeleopConfig, index: usize, quit: &AtomicBool) -> Result<()> {
    let pads = list_gamepads().context("enumerating controllers")?;
    if pads.is_empty() {
        println!("No controller detected.");
        println!("Check that your user can read /dev/input (e.g. is in the `input` group),");
        println!("then unplug and replug the controller.");
        return Ok(());
    }
    println!("Found {} controller(s):", pads.len());
    for p in &pads {
        println!("  [{}] {}", p.index, p.name);
    }

    let mut pad = GilrsGamepad::open(index).context("opening controller")?;
    println!(
        "\nUsing: {} ({} axes, {} buttons)",
        pad.name(),
        pad.axis_count(),
        pad.button_count()
    );
    println!("Move sticks and press buttons. Ctrl-C to finish.\n");

    let mut monitor = InputMonitor::new();
    let mut last_summary = Instant::now();
    while !quit.load(Ordering::Relaxed) {
        let raw = match pad.poll() {
            Ok(raw) => raw,
            Err(GamepadError::Disconnected) => {
                println!("Controller disconnected");
                break;
            }
            Err(e) => return Err(e).context("reading controller"),
        };
        for event in monitor.update(&raw) {
            println!("{event}");
        }
        if last_summary.elapsed() >= Duration::from_secs(2) {
            println!("{}", InputMonitor::summary(&raw));
            last_summary = Instant::now();
        }
        thread::sleep(Duration::from_millis(20));
    }

    let section = serde_yaml::to_string(&cfg.controller.map()).context("serializing map")?;
    println!("\nCurrent mapping; copy under `controller.map` in the config to change it:\n");
    println!("{section}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_drive_flags() {
        let cli = Cli::try_parse_from([
            "robomaster", "-r", "10.0.0.5", "drive", "--mode", "step", "--record", "--telemetry",
        ])
        .unwrap();
        assert_eq!(cli.robot_ip, Some("10.0.0.5".parse().unwrap()));
        let Commands::Drive(args) = cli.command else {
            unreachable!("parsed as drive");
        };
        assert_eq!(args.mode, Mode::Step);
        assert_eq!(args.record, Some(None));
        assert!(args.telemetry);
        assert!(!args.simu);
    }

    #[test]
    fn test_record_takes_optional_path() {
        let cli =
            Cli::try_parse_from(["robomaster", "drive", "--record", "out.json", "--simu"]).unwrap();
        let Commands::Drive(args) = cli.command else {
            unreachable!("parsed as drive");
        };
        assert_eq!(args.record, Some(Some(PathBuf::from("out.json"))));
        assert!(args.simu);
    }

    #[test]
    fn test_time_based_replay_flag() {
        let cli =
            Cli::try_parse_from(["robomaster", "drive", "--replay", "log.json", "--time-based"])
                .unwrap();
        let Commands::Drive(args) = cli.command else {
            unreachable!("parsed as drive");
        };
        assert!(args.time_based);
        assert_eq!(args.replay, Some(PathBuf::from("log.json")));

        let cli = Cli::try_parse_from(["robomaster", "drive", "--replay", "log.json"]).unwrap();
        let Commands::Drive(args) = cli.command else {
            unreachable!("parsed as drive");
        };
        assert!(!args.time_based);
        // Only meaningful alongside a replay
        assert!(Cli::try_parse_from(["robomaster", "drive", "--time-based"]).is_err());
    }

    #[test]
    fn test_conflicting_flags_rejected() {
        assert!(Cli::try_parse_from(["robomaster", "video", "--static", "--robot"]).is_err());
        assert!(
            Cli::try_parse_from(["robomaster", "drive", "--record", "a", "--replay", "b"]).is_err()
        );
        assert!(Cli::try_parse_from(["robomaster", "drive", "--dry-run"]).is_err());
    }

    #[test]
    fn test_resolution_and_led_values() {
        let cli = Cli::try_parse_from(["robomaster", "video", "--resolution", "720p"]).unwrap();
        let Commands::Video { resolution, .. } = cli.command else {
            unreachable!("parsed as video");
        };
        assert_eq!(resolution.map(StreamResolution::from), Some(StreamResolution::P720));

        let cli = Cli::try_parse_from(["robomaster", "led", "off"]).unwrap();
        assert!(matches!(cli.command, Commands::Led { action: LedAction::Off, .. }));
        let cli = Cli::try_parse_from(["robomaster", "led"]).unwrap();
        assert!(matches!(cli.command, Commands::Led { action: LedAction::On, ref color } if color == "white"));
    }

    #[test]
    fn test_sdk_config_prefers_flags() {
        let cfg = TeleopConfig::default();
        let cli = Cli::try_parse_from(["robomaster", "-l", "10.0.0.9", "info"]).unwrap();
        let sdk = sdk_config(&cli, &cfg).unwrap();
        assert_eq!(sdk.robot_ip, "192.168.2.1".parse::<IpAddr>().unwrap());
        assert_eq!(sdk.local_ip, Some("10.0.0.9".parse().unwrap()));

        let mut bad = TeleopConfig::default();
        bad.connection.robot_ip = "not-an-ip".into();
        let cli = Cli::try_parse_from(["robomaster", "info"]).unwrap();
        assert!(sdk_config(&cli, &bad).is_err());
    }
}
