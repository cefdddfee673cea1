use std::fs::{self, File};
use std::io::{LineWriter, Write};
use std::path::{Path, PathBuf};

use serde_json::Value;
use sim_ecs::{Entity, EntityComponentManager};
use sim_msgs::WorldStatistics;

use crate::builtin::LOG_RECORD;
use crate::events::EventManager;
use crate::system::{System, UpdateInfo};

/// Appends one JSON line of [`WorldStatistics`] per step to
/// `<path>/<world>.jsonl`, where `path` comes from the `"path"` config key.
///
/// Without a usable path the system stays attached but records nothing.
#[derive(Debug, Default)]
pub struct LogRecord {
    world: String,
    file: Option<PathBuf>,
    writer: Option<LineWriter<File>>,
}

impl LogRecord {
    /// The file being written, once configured.
    #[must_use]
    pub fn file(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    fn open(dir: &Path, world: &str) -> std::io::Result<(PathBuf, LineWriter<File>)> {
        fs::create_dir_all(dir)?;
        let stem: String = world
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        let path = dir.join(format!("{stem}.jsonl"));
        let file = File::create(&path)?;
        Ok((path, LineWriter::new(file)))
    }
}

impl System for LogRecord {
    fn name(&self) -> &str {
        LOG_RECORD
    }

    fn configure(
        &mut self,
        entity: Entity,
        config: &Value,
        ecm: &mut EntityComponentManager,
        _events: &EventManager,
    ) {
        self.world = ecm.name(entity).unwrap_or_default().to_string();
        let Some(dir) = config.get("path").and_then(Value::as_str) else {
            tracing::warn!(world = %self.world, "log_record has no 'path' configured, recording disabled");
            return;
        };
        match Self::open(Path::new(dir), &self.world) {
            Ok((path, writer)) => {
                tracing::info!(world = %self.world, path = %path.display(), "recording world state");
                self.file = Some(path);
                self.writer = Some(writer);
            }
            Err(e) => {
                tracing::error!(world = %self.world, path = dir, error = %e, "failed to open log record");
            }
        }
    }

    fn post_update(&mut self, info: &UpdateInfo, _ecm: &EntityComponentManager) {
        let Some(writer) = self.writer.as_mut() else {
            return;
        };
        let stats = WorldStatistics {
            world: self.world.clone(),
            iterations: info.iterations + 1,
            sim_time: (info.sim_time + info.dt).as_secs_f64(),
            real_time: info.real_time.as_secs_f64(),
            paused: info.paused,
        };
        let written = serde_json::to_writer(&mut *writer, &stats)
            .map_err(std::io::Error::from)
            .and_then(|()| writer.write_all(b"\n"));
        if let Err(e) = written {
            tracing::error!(world = %self.world, error = %e, "log record write failed, recording stopped");
            self.writer = None;
        }
    }
}
