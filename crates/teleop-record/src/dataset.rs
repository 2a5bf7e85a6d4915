//! On-disk episode dataset.
//!
//! ```text
//! <root>/<name>/
//!   meta/info.json          fps, features, action names, totals
//!   meta/episodes.jsonl     one line per episode
//!   meta/tasks.jsonl        one line per distinct task
//!   data/episode_NNNNNN.jsonl
//!   images/<feature>/episode_NNNNNN/frame_NNNNNN.ppm
//! ```
//!
//! An episode is written under `.staging/<uuid>` and moved into place by
//! `finish`, so an aborted episode leaves nothing behind.

use crate::actions::{ACTION_DIM, ACTION_NAMES};
use crate::episode::{EpisodeSink, EpisodeSummary, Sample};
use crate::frame_buffer::CameraSlot;
use crate::{RecordError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use uuid::Uuid;

pub const DATASET_VERSION: &str = "1.0";
const STAGING_DIR: &str = ".staging";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub dtype: String,
    pub shape: Vec<usize>,
    pub names: Vec<String>,
}

impl Feature {
    fn image(width: u32, height: u32) -> Self {
        Self {
            dtype: "image".into(),
            shape: vec![height as usize, width as usize, 3],
            names: vec!["height".into(), "width".into(), "channels".into()],
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DatasetInfo {
    pub version: String,
    pub fps: u32,
    pub total_episodes: usize,
    pub total_frames: usize,
    pub total_tasks: usize,
    pub action_names: Vec<String>,
    pub features: BTreeMap<String, Feature>,
}

impl DatasetInfo {
    pub fn new(fps: u32, robot_size: (u32, u32), webcam_size: (u32, u32)) -> Self {
        let mut features = BTreeMap::new();
        features.insert(
            CameraSlot::Robot.feature().to_string(),
            Feature::image(robot_size.0, robot_size.1),
        );
        features.insert(
            CameraSlot::Webcam.feature().to_string(),
            Feature::image(webcam_size.0, webcam_size.1),
        );
        features.insert(
            "action".to_string(),
            Feature {
                dtype: "float32".into(),
                shape: vec![ACTION_DIM],
                names: ACTION_NAMES.iter().map(|s| s.to_string()).collect(),
            },
        );
        Self {
            version: DATASET_VERSION.to_string(),
            fps,
            total_episodes: 0,
            total_frames: 0,
            total_tasks: 0,
            action_names: ACTION_NAMES.iter().map(|s| s.to_string()).collect(),
            features,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct TaskLine {
    task_index: usize,
    task: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EpisodeLine {
    pub episode_index: usize,
    pub session_id: Uuid,
    pub task_index: usize,
    pub length: usize,
    pub recorded_at: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FrameLine {
    pub index: usize,
    pub frame_index: usize,
    pub timestamp: f64,
    pub episode_index: usize,
    pub task_index: usize,
    pub action: [f32; ACTION_DIM],
    #[serde(default, skip_serializing_if = "is_false")]
    pub robot_missing: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub webcam_missing: bool,
}

fn is_false(b: &bool) -> bool {
    !*b
}

struct Staged {
    session_id: Uuid,
    dir: PathBuf,
    data: BufWriter<File>,
    episode_index: usize,
    task_index: usize,
    task: String,
    new_task: bool,
    frames: usize,
}

pub struct DatasetWriter {
    dir: PathBuf,
    info: DatasetInfo,
    tasks: Vec<String>,
    staged: Option<Staged>,
}

fn episode_name(index: usize) -> String {
    format!("episode_{index:06}")
}

fn read_jsonl<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let mut out = Vec::new();
    for line in BufReader::new(File::open(path)?).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        out.push(serde_json::from_str(&line)?);
    }
    Ok(out)
}

fn append_jsonl<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut f = OpenOptions::new().create(true).append(true).open(path)?;
    let mut line = serde_json::to_vec(value)?;
    line.push(b'\n');
    f.write_all(&line)?;
    Ok(())
}

impl DatasetWriter {
    /// Open `<root>/<name>`, appending to it when it already holds a dataset.
    pub fn open(
        root: impl AsRef<Path>,
        name: &str,
        fps: u32,
        robot_size: (u32, u32),
        webcam_size: (u32, u32),
    ) -> Result<Self> {
        let dir = root.as_ref().join(name);
        let info_path = dir.join("meta").join("info.json");
        let (info, tasks) = if info_path.exists() {
            let info: DatasetInfo = serde_json::from_reader(BufReader::new(File::open(&info_path)?))?;
            if info.fps != fps {
                return Err(RecordError::InvalidDataset(format!(
                    "{} was recorded at {} fps, not {fps}",
                    dir.display(),
                    info.fps
                )));
            }
            let mut lines: Vec<TaskLine> = read_jsonl(&dir.join("meta").join("tasks.jsonl"))?;
            lines.sort_by_key(|t| t.task_index);
            let tasks = lines.into_iter().map(|t| t.task).collect();
            tracing::info!(
                path = %dir.display(),
                episodes = info.total_episodes,
                "appending to existing dataset"
            );
            (info, tasks)
        } else {
            (DatasetInfo::new(fps, robot_size, webcam_size), Vec::new())
        };
        Ok(Self {
            dir,
            info,
            tasks,
            staged: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    pub fn info(&self) -> &DatasetInfo {
        &self.info
    }

    pub fn tasks(&self) -> &[String] {
        &self.tasks
    }

    fn write_info(&self) -> Result<()> {
        let meta = self.dir.join("meta");
        let tmp = meta.join("info.json.tmp");
        let mut w = BufWriter::new(File::create(&tmp)?);
        serde_json::to_writer_pretty(&mut w, &self.info)?;
        w.flush()?;
        drop(w);
        fs::rename(&tmp, meta.join("info.json"))?;
        Ok(())
    }

    fn remove_staging_root(&self) {
        let root = self.dir.join(STAGING_DIR);
        let _ = fs::remove_dir(&root);
        // Only succeeds when nothing else was ever written.
        let _ = fs::remove_dir(&self.dir);
    }
}

impl EpisodeSink for DatasetWriter {
    fn begin(&mut self, task: &str) -> Result<()> {
        if self.staged.is_some() {
            return Err(RecordError::AlreadyRecording);
        }
        let session_id = Uuid::new_v4();
        let dir = self.dir.join(STAGING_DIR).join(session_id.to_string());
        fs::create_dir_all(&dir)?;
        for slot in [CameraSlot::Robot, CameraSlot::Webcam] {
            fs::create_dir_all(dir.join(slot.feature()))?;
        }
        let data = BufWriter::new(File::create(dir.join("data.jsonl"))?);
        let (task_index, new_task) = match self.tasks.iter().position(|t| t == task) {
            Some(i) => (i, false),
            None => (self.tasks.len(), true),
        };
        tracing::debug!(%session_id, staging = %dir.display(), "episode staged");
        self.staged = Some(Staged {
            session_id,
            dir,
            data,
            episode_index: self.info.total_episodes,
            task_index,
            task: task.to_string(),
            new_task,
            frames: 0,
        });
        Ok(())
    }

    fn write(&mut self, sample: &Sample) -> Result<()> {
        let base = self.info.total_frames;
        let st = self.staged.as_mut().ok_or(RecordError::NoEpisode)?;
        let line = FrameLine {
            index: base + sample.index,
            frame_index: sample.index,
            timestamp: sample.timestamp,
            episode_index: st.episode_index,
            task_index: st.task_index,
            action: sample.action,
            robot_missing: sample.robot_missing,
            webcam_missing: sample.webcam_missing,
        };
        serde_json::to_writer(&mut st.data, &line)?;
        st.data.write_all(b"\n")?;
        let file = format!("frame_{:06}.ppm", sample.index);
        vision::write_ppm(st.dir.join(CameraSlot::Robot.feature()).join(&file), &sample.robot)?;
        vision::write_ppm(st.dir.join(CameraSlot::Webcam.feature()).join(&file), &sample.webcam)?;
        st.frames += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<EpisodeSummary> {
        let mut st = self.staged.take().ok_or(RecordError::NoEpisode)?;
        st.data.flush()?;
        let name = episode_name(st.episode_index);

        let data_dir = self.dir.join("data");
        let meta_dir = self.dir.join("meta");
        fs::create_dir_all(&data_dir)?;
        fs::create_dir_all(&meta_dir)?;
        let Staged {
            session_id,
            dir,
            data,
            episode_index,
            task_index,
            task,
            new_task,
            frames,
        } = st;
        drop(data);

        fs::rename(dir.join("data.jsonl"), data_dir.join(format!("{name}.jsonl")))?;
        for slot in [CameraSlot::Robot, CameraSlot::Webcam] {
            let target = self.dir.join("images").join(slot.feature());
            fs::create_dir_all(&target)?;
            fs::rename(dir.join(slot.feature()), target.join(&name))?;
        }
        fs::remove_dir_all(&dir)?;
        self.remove_staging_root();

        if new_task {
            append_jsonl(
                &meta_dir.join("tasks.jsonl"),
                &TaskLine {
                    task_index,
                    task: task.clone(),
                },
            )?;
            self.tasks.push(task.clone());
        }
        append_jsonl(
            &meta_dir.join("episodes.jsonl"),
            &EpisodeLine {
                episode_index,
                session_id,
                task_index,
                length: frames,
                recorded_at: OffsetDateTime::now_utc()
                    .format(&Rfc3339)
                    .unwrap_or_default(),
            },
        )?;

        self.info.total_episodes += 1;
        self.info.total_frames += frames;
        self.info.total_tasks = self.tasks.len();
        self.write_info()?;

        Ok(EpisodeSummary {
            episode_index: Some(episode_index),
            frames,
            task,
            location: Some(self.dir.clone()),
        })
    }

    fn discard(&mut self) -> Result<()> {
        let Some(st) = self.staged.take() else {
            return Ok(());
        };
        let dir = st.dir.clone();
        drop(st);
        fs::remove_dir_all(&dir)?;
        self.remove_staging_root();
        Ok(())
    }
}
