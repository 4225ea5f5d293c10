use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use super::TriggerSink;
use crate::error::CoreError;
use crate::model::TriggerRecord;

/// Appends `deviceId|label|transition` lines to a shared file.
#[derive(Debug)]
pub struct FileTriggerSink {
    path: PathBuf,
    // Keeps concurrent sessions from interleaving partial lines.
    write_lock: Mutex<()>,
}

impl FileTriggerSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl TriggerSink for FileTriggerSink {
    async fn deliver(&self, record: &TriggerRecord) -> Result<(), CoreError> {
        let line = format!("{record}\n");
        let _guard = self.write_lock.lock().await;

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| CoreError::Trigger {
                message: format!("cannot open {}: {e}", self.path.display()),
            })?;

        let write_err = |e: std::io::Error| CoreError::Trigger {
            message: format!("cannot write {}: {e}", self.path.display()),
        };
        file.write_all(line.as_bytes()).await.map_err(write_err)?;
        file.flush().await.map_err(write_err)?;

        debug!(path = %self.path.display(), trigger = %record, "trigger written");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::{DeviceId, Label, Transition};

    #[tokio::test]
    async fn appends_lines_creating_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trigger");
        let sink = FileTriggerSink::new(&path);

        sink.deliver(&TriggerRecord::new(DeviceId(3), Label::Person, Transition::Start))
            .await
            .unwrap();
        sink.deliver(&TriggerRecord::new(DeviceId(3), Label::Person, Transition::Stop))
            .await
            .unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "3|Person|start\n3|Person|stop\n");
    }

    #[tokio::test]
    async fn missing_directory_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileTriggerSink::new(dir.path().join("nope").join("trigger"));

        let err = sink
            .deliver(&TriggerRecord::new(DeviceId(1), Label::Motion, Transition::Start))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Trigger { .. }));
    }
}
