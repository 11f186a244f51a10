// ============================================================
// Layer 6 - Sample Store (write side)
// ============================================================
// Appends collected samples to the on-disk dataset:
//
//   <root>/match_ready/20261017T143205123Z_9f2c01ab.jpg
//   <root>/not_match_ready/...
//
// Append-safety under concurrent submissions:
//   1. bytes are written to a hidden temp file in the class dir
//      (SampleLoader ignores dot-files, so a training snapshot
//      never sees a half-written image)
//   2. the temp file is persisted with `persist_noclobber`, which
//      fails instead of replacing an existing file
//   3. on a name collision a new random suffix is drawn
//
// Nothing here validates content; SubmitUseCase does that first.

use std::{
    fs,
    io::Write,
    path::PathBuf,
};

use chrono::Utc;
use rand::Rng;

use crate::domain::{
    error::{PipelineError, PipelineResult},
    label::Label,
    traits::SampleSink,
};

const MAX_NAME_ATTEMPTS: usize = 8;

pub struct SampleStore {
    root: PathBuf,
}

impl SampleStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn class_dir(&self, label: Label) -> PathBuf {
        self.root.join(label.dir_name())
    }

    /// Number of stored (non-hidden) files for `label`.
    pub fn count(&self, label: Label) -> PipelineResult<usize> {
        let dir = self.class_dir(label);
        if !dir.exists() {
            return Ok(0);
        }
        let entries = fs::read_dir(&dir).map_err(|e| PipelineError::storage(&dir, e))?;
        let mut count = 0;
        for entry in entries {
            let entry = entry.map_err(|e| PipelineError::storage(&dir, e))?;
            let visible = entry
                .file_name()
                .to_str()
                .map_or(false, |n| !n.starts_with('.'));
            if visible && entry.path().is_file() {
                count += 1;
            }
        }
        Ok(count)
    }
}

fn generated_name(extension: &str) -> String {
    let suffix: u32 = rand::thread_rng().gen();
    format!(
        "{}_{:08x}.{}",
        Utc::now().format("%Y%m%dT%H%M%S%3fZ"),
        suffix,
        extension
    )
}

impl SampleSink for SampleStore {
    fn append(&self, label: Label, bytes: &[u8], extension: &str) -> PipelineResult<PathBuf> {
        let dir = self.class_dir(label);
        fs::create_dir_all(&dir).map_err(|e| PipelineError::storage(&dir, e))?;

        let mut temp = tempfile::Builder::new()
            .prefix(".incoming")
            .tempfile_in(&dir)
            .map_err(|e| PipelineError::storage(&dir, e))?;
        temp.write_all(bytes)
            .and_then(|_| temp.as_file().sync_all())
            .map_err(|e| PipelineError::storage(temp.path(), e))?;

        let mut last_err = None;
        for _ in 0..MAX_NAME_ATTEMPTS {
            let target = dir.join(generated_name(extension));
            match temp.persist_noclobber(&target) {
                Ok(_) => {
                    tracing::debug!("Stored '{}' sample at '{}'", label, target.display());
                    return Ok(target);
                }
                Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => {
                    temp = e.file;
                    last_err = Some((target, e.error));
                }
                Err(e) => return Err(PipelineError::storage(target, e.error)),
            }
        }

        // the temp file is dropped (and removed) here
        let (path, err) = last_err.unwrap_or_else(|| {
            (
                dir.clone(),
                std::io::Error::new(std::io::ErrorKind::AlreadyExists, "no free file name"),
            )
        });
        Err(PipelineError::storage(path, err))
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use tempfile::TempDir;

    #[test]
    fn test_append_writes_under_label_dir() {
        let dir = TempDir::new().unwrap();
        let store = SampleStore::new(dir.path());

        let path = store.append(Label::MatchReady, b"bytes", "png").unwrap();
        assert!(path.starts_with(dir.path().join("match_ready")));
        assert_eq!(fs::read(&path).unwrap(), b"bytes");
        assert_eq!(store.count(Label::MatchReady).unwrap(), 1);
        assert_eq!(store.count(Label::NotMatchReady).unwrap(), 0);
    }

    #[test]
    fn test_generated_names_are_unique() {
        let dir = TempDir::new().unwrap();
        let store = SampleStore::new(dir.path());

        let paths: HashSet<PathBuf> = (0..20)
            .map(|_| store.append(Label::NotMatchReady, b"x", "jpg").unwrap())
            .collect();
        assert_eq!(paths.len(), 20);
        assert_eq!(store.count(Label::NotMatchReady).unwrap(), 20);
    }

    #[test]
    fn test_concurrent_appends_never_clobber() {
        let dir = TempDir::new().unwrap();
        let store = SampleStore::new(dir.path());

        std::thread::scope(|s| {
            for t in 0..4u8 {
                let store = &store;
                s.spawn(move || {
                    for _ in 0..5 {
                        store.append(Label::MatchReady, &[t], "png").unwrap();
                    }
                });
            }
        });
        assert_eq!(store.count(Label::MatchReady).unwrap(), 20);
    }

    #[test]
    fn test_name_format() {
        let name = generated_name("png");
        let (stamp, rest) = name.split_once('_').unwrap();
        assert_eq!(stamp.len(), "20261017T143205123Z".len());
        assert!(rest.ends_with(".png"));
        assert_eq!(rest.len(), 8 + ".png".len());
    }
}
