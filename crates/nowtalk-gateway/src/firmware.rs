//! Badge firmware availability.
//!
//! The gateway polls the modification time of the firmware image. A change
//! marks every badge as having an update pending.

use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::{debug, info};

/// File name of the badge firmware image inside the firmware directory.
pub const FIRMWARE_FILE: &str = "nowTalkBadge.bin";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirmwareCheck {
    Missing,
    /// First sighting of the image.
    Available,
    Unchanged,
    Changed,
}

#[derive(Debug)]
pub struct FirmwareMonitor {
    path: PathBuf,
    last_modified: Option<SystemTime>,
}

impl FirmwareMonitor {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(FIRMWARE_FILE),
            last_modified: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn check(&mut self) -> io::Result<FirmwareCheck> {
        let modified = match tokio::fs::metadata(&self.path).await {
            Ok(meta) => meta.modified()?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                if self.last_modified.take().is_some() {
                    info!(path = %self.path.display(), "Badge firmware removed");
                }
                return Ok(FirmwareCheck::Missing);
            }
            Err(e) => return Err(e),
        };

        let check = match self.last_modified.replace(modified) {
            None => {
                info!(path = %self.path.display(), "Badge firmware available");
                FirmwareCheck::Available
            }
            Some(previous) if previous == modified => FirmwareCheck::Unchanged,
            Some(_) => {
                info!(path = %self.path.display(), "Badge firmware changed");
                FirmwareCheck::Changed
            }
        };
        debug!(?check, "Firmware checked");
        Ok(check)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::time::Duration;

    #[tokio::test]
    async fn test_firmware_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let mut monitor = FirmwareMonitor::new(dir.path());
        assert_eq!(monitor.check().await.unwrap(), FirmwareCheck::Missing);

        let file = File::create(monitor.path()).unwrap();
        let base = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        file.set_modified(base).unwrap();
        assert_eq!(monitor.check().await.unwrap(), FirmwareCheck::Available);
        assert_eq!(monitor.check().await.unwrap(), FirmwareCheck::Unchanged);

        file.set_modified(base + Duration::from_secs(60)).unwrap();
        assert_eq!(monitor.check().await.unwrap(), FirmwareCheck::Changed);
        assert_eq!(monitor.check().await.unwrap(), FirmwareCheck::Unchanged);

        drop(file);
        std::fs::remove_file(monitor.path()).unwrap();
        assert_eq!(monitor.check().await.unwrap(), FirmwareCheck::Missing);
    }
}
