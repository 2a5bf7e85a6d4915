use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

/// Control-loop counters, exported in the Prometheus text format.
#[derive(Clone)]
pub struct TeleopMetrics {
    pub registry: Registry,
    pub loop_ticks: IntCounter,
    pub loop_overruns: IntCounter,
    pub commands_sent: IntCounter,
    pub driver_errors: IntCounter,
    pub video_frames: IntCounter,
    pub episode_frames: IntGauge,
}

impl TeleopMetrics {
    pub fn new() -> Result<Self, String> {
        let registry = Registry::new();
        let err = |e: prometheus::Error| format!("metrics init error: {e}");
        let loop_ticks =
            IntCounter::new("rm_loop_ticks", "Control loop iterations").map_err(err)?;
        let loop_overruns = IntCounter::new(
            "rm_loop_overruns",
            "Control loop iterations that exceeded their period",
        )
        .map_err(err)?;
        let commands_sent =
            IntCounter::new("rm_commands_sent", "Robot commands sent").map_err(err)?;
        let driver_errors =
            IntCounter::new("rm_driver_errors", "Robot commands that failed").map_err(err)?;
        let video_frames =
            IntCounter::new("rm_video_frames", "Robot camera frames received").map_err(err)?;
        let episode_frames = IntGauge::new(
            "rm_episode_frames",
            "Samples taken in the current dataset episode",
        )
        .map_err(err)?;
        let _ = registry.register(Box::new(loop_ticks.clone()));
        let _ = registry.register(Box::new(loop_overruns.clone()));
        let _ = registry.register(Box::new(commands_sent.clone()));
        let _ = registry.register(Box::new(driver_errors.clone()));
        let _ = registry.register(Box::new(video_frames.clone()));
        let _ = registry.register(Box::new(episode_frames.clone()));
        Ok(Self {
            registry,
            loop_ticks,
            loop_overruns,
            commands_sent,
            driver_errors,
            video_frames,
            episode_frames,
        })
    }

    pub fn encode_text(&self) -> String {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buf) {
            return format!("error encoding metrics: {e}");
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}

impl std::fmt::Debug for TeleopMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TeleopMetrics")
            .field("loop_ticks", &self.loop_ticks.get())
            .field("commands_sent", &self.commands_sent.get())
            .field("driver_errors", &self.driver_errors.get())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_contains_counters() {
        let m = TeleopMetrics::new().unwrap();
        m.commands_sent.inc_by(3);
        m.episode_frames.set(12);
        let text = m.encode_text();
        assert!(text.contains("rm_commands_sent 3"));
        assert!(text.contains("rm_episode_frames 12"));
        assert!(text.contains("rm_driver_errors 0"));
    }
}
