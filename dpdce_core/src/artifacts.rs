//! Plot files written by the worker and referenced from `Results`.
use dpdce_traits::Clock;
use std::fs;
use std::path::PathBuf;

/// Public references handed to clients are relative to this prefix.
pub const PUBLIC_PREFIX: &str = "dpd/";

/// Time of one plotting step; shared by every file written in that step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stamp {
    pub unix: u64,
    /// Human-readable label drawn into the plot.
    pub label: String,
}

/// A plot file location plus the reference published in `Results`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlotFile {
    pub path: PathBuf,
    pub public: String,
}

pub struct ArtifactManager {
    dir: PathBuf,
    clock: Box<dyn Clock + Send>,
}

impl ArtifactManager {
    pub fn new(dir: impl Into<PathBuf>, clock: Box<dyn Clock + Send>) -> Self {
        Self {
            dir: dir.into(),
            clock,
        }
    }

    pub fn ensure_dir(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.dir)
    }

    pub fn stamp(&self) -> Stamp {
        let now = self.clock.now();
        Stamp {
            unix: self.clock.unix_secs(),
            label: now.format("%Y-%m-%dT%H%M%S").to_string(),
        }
    }

    /// `<dir>/<stem>_<unix>.png`
    pub fn file(&self, stem: &str, stamp: &Stamp) -> PlotFile {
        let name = format!("{stem}_{}.png", stamp.unix);
        PlotFile {
            path: self.dir.join(&name),
            public: format!("{PUBLIC_PREFIX}{name}"),
        }
    }

    /// Delete every `*.png` in the plot directory.
    ///
    /// Best effort: each file that cannot be removed yields one warning line
    /// and the sweep continues.
    pub fn clear(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return warnings,
            Err(e) => {
                tracing::warn!(dir = %self.dir.display(), error = %e, "cannot list plot directory");
                warnings.push(format!("failed to list {}", self.dir.display()));
                return warnings;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("png") {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => tracing::debug!(path = %path.display(), "removed plot"),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to delete plot");
                    warnings.push(format!("failed to delete {}", path.display()));
                }
            }
        }
        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dpdce_traits::ManualClock;
    use std::path::Path;

    fn manager(dir: &Path) -> ArtifactManager {
        // 2023-11-14T22:13:20Z
        ArtifactManager::new(dir, Box::new(ManualClock::at_unix(1_700_000_000)))
    }

    #[test]
    fn names_carry_second_resolution_stamp() {
        let dir = tempfile::tempdir().unwrap();
        let m = manager(dir.path());
        let stamp = m.stamp();
        assert_eq!(stamp.unix, 1_700_000_000);
        assert_eq!(stamp.label, "2023-11-14T221320");
        let f = m.file("model_am", &stamp);
        assert_eq!(f.public, "dpd/model_am_1700000000.png");
        assert_eq!(f.path, dir.path().join("model_am_1700000000.png"));
    }

    #[test]
    fn clear_removes_only_pngs() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("stats_1.png"), b"x").unwrap();
        fs::write(dir.path().join("model_am_1.png"), b"x").unwrap();
        fs::write(dir.path().join("notes.txt"), b"keep").unwrap();
        let warnings = manager(dir.path()).clear();
        assert!(warnings.is_empty());
        assert!(!dir.path().join("stats_1.png").exists());
        assert!(!dir.path().join("model_am_1.png").exists());
        assert!(dir.path().join("notes.txt").exists());
    }

    #[test]
    fn clear_on_missing_dir_is_quiet() {
        let dir = tempfile::tempdir().unwrap();
        let m = manager(&dir.path().join("not-there"));
        assert!(m.clear().is_empty());
    }

    #[test]
    fn undeletable_entry_becomes_warning() {
        let dir = tempfile::tempdir().unwrap();
        // A directory named like a plot cannot be removed with remove_file.
        fs::create_dir(dir.path().join("stuck.png")).unwrap();
        fs::write(dir.path().join("stats_2.png"), b"x").unwrap();
        let warnings = manager(dir.path()).clear();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].starts_with("failed to delete"));
        assert!(!dir.path().join("stats_2.png").exists());
    }
}
