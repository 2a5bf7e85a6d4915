//! teleop-record: command logs and demonstration datasets
//!
//! Two recording paths share the driver's command tap. [`CommandRecorder`]
//! writes a timestamped JSON log that [`CommandPlayer`] can replay, and
//! [`EpisodeRecorder`] samples camera frames and aggregated actions at a fixed
//! rate into an [`EpisodeSink`] such as [`DatasetWriter`].

mod error;
pub use error::{RecordError, Result};

mod command_log;
pub use command_log::{
    default_recording_name, optimize, CommandPlayer, CommandRecorder, RecordedCommand, Recording,
    FORMAT_VERSION, XY_TOLERANCE, YAW_TOLERANCE,
};

mod actions;
pub use actions::{
    denormalize_action, normalize_action, ActionRanges, RawAction, ACTION_DIM, ACTION_NAMES,
};

mod frame_buffer;
pub use frame_buffer::{CameraSlot, FrameBuffer};

mod episode;
pub use episode::{
    CommandTap, EpisodeConfig, EpisodeRecorder, EpisodeSink, EpisodeSummary, NullSink, Sample,
    DEFAULT_TASK,
};

mod dataset;
pub use dataset::{DatasetInfo, DatasetWriter, EpisodeLine, Feature, FrameLine, DATASET_VERSION};
