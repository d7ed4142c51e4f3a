//! Durable progress tracking for the embedding pipeline.
//!
//! A single-writer on-disk set of resource keys. Keys are appended to a log
//! file as they complete and loaded into a `HashSet` on open, so `--skip-existing`
//! re-runs never re-embed finished work. Marking is idempotent; the file is
//! compacted when a prefix is cleared.

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::info;

use crate::StoreError;

/// On-disk set of completed resource keys.
pub struct ProgressTracker {
    path: PathBuf,
    keys: HashSet<String>,
    writer: BufWriter<File>,
}

impl ProgressTracker {
    /// Open (or create) a tracker file and load its keys.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let mut keys = HashSet::new();
        if path.exists() {
            let reader = BufReader::new(File::open(path)?);
            for line in reader.lines() {
                let line = line?;
                let key = line.trim();
                if !key.is_empty() {
                    keys.insert(key.to_string());
                }
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        info!(keys = keys.len(), path = %path.display(), "opened progress tracker");
        Ok(Self {
            path: path.to_path_buf(),
            keys,
            writer: BufWriter::new(file),
        })
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn has(&self, resource_key: &str) -> bool {
        self.keys.contains(resource_key)
    }

    /// Membership for a batch of keys, in input order.
    pub fn has_many(&self, resource_keys: &[String]) -> Vec<bool> {
        resource_keys.iter().map(|k| self.has(k)).collect()
    }

    /// Record one completed key. Re-marking is a no-op.
    pub fn mark(&mut self, resource_key: &str) -> Result<(), StoreError> {
        if self.keys.insert(resource_key.to_string()) {
            writeln!(self.writer, "{resource_key}")?;
            self.writer.flush()?;
        }
        Ok(())
    }

    /// Record a batch of completed keys, flushing once.
    pub fn mark_many(&mut self, resource_keys: &[String]) -> Result<(), StoreError> {
        let mut wrote = false;
        for key in resource_keys {
            if self.keys.insert(key.clone()) {
                writeln!(self.writer, "{key}")?;
                wrote = true;
            }
        }
        if wrote {
            self.writer.flush()?;
        }
        Ok(())
    }

    /// Count keys beginning with a prefix (e.g. `act_section:`).
    pub fn count_by_prefix(&self, prefix: &str) -> usize {
        self.keys.iter().filter(|k| k.starts_with(prefix)).count()
    }

    /// Drop every key beginning with a prefix and compact the log file.
    pub fn clear_by_prefix(&mut self, prefix: &str) -> Result<usize, StoreError> {
        let before = self.keys.len();
        self.keys.retain(|k| !k.starts_with(prefix));
        let removed = before - self.keys.len();
        if removed > 0 {
            self.rewrite()?;
        }
        Ok(removed)
    }

    /// Up to `limit` keys, sorted, for diagnostics.
    pub fn sample_keys(&self, limit: usize) -> Vec<String> {
        let mut keys: Vec<String> = self.keys.iter().cloned().collect();
        keys.sort();
        keys.truncate(limit);
        keys
    }

    fn rewrite(&mut self) -> Result<(), StoreError> {
        let tmp_path = self.path.with_extension("tmp");
        {
            let mut tmp = BufWriter::new(File::create(&tmp_path)?);
            for key in &self.keys {
                writeln!(tmp, "{key}")?;
            }
            tmp.flush()?;
        }
        std::fs::rename(&tmp_path, &self.path)?;
        let file = OpenOptions::new().append(true).open(&self.path)?;
        self.writer = BufWriter::new(file);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn mark_and_query() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("progress.log");
        let mut tracker = ProgressTracker::open(&path).unwrap();
        assert!(tracker.is_empty());

        tracker.mark("act:C-46:en:0").unwrap();
        assert!(tracker.has("act:C-46:en:0"));
        assert!(!tracker.has("act:C-46:en:1"));
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn remark_is_noop() {
        let tmp = TempDir::new().unwrap();
        let mut tracker = ProgressTracker::open(&tmp.path().join("p.log")).unwrap();
        tracker.mark("k").unwrap();
        tracker.mark("k").unwrap();
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn mark_many_and_has_many() {
        let tmp = TempDir::new().unwrap();
        let mut tracker = ProgressTracker::open(&tmp.path().join("p.log")).unwrap();
        let keys: Vec<String> = vec!["a:1".into(), "b:2".into()];
        tracker.mark_many(&keys).unwrap();
        assert_eq!(
            tracker.has_many(&["a:1".into(), "c:3".into(), "b:2".into()]),
            vec![true, false, true]
        );
    }

    #[test]
    fn persists_across_reopen() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("p.log");
        {
            let mut tracker = ProgressTracker::open(&path).unwrap();
            tracker
                .mark_many(&["act:A:en:0".into(), "act:A:en:1".into()])
                .unwrap();
        }
        let tracker = ProgressTracker::open(&path).unwrap();
        assert_eq!(tracker.len(), 2);
        assert!(tracker.has("act:A:en:1"));
    }

    #[test]
    fn count_and_clear_by_prefix() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("p.log");
        let mut tracker = ProgressTracker::open(&path).unwrap();
        tracker
            .mark_many(&[
                "act:A:en:0".into(),
                "act:A:en:1".into(),
                "regulation:B:en:0".into(),
            ])
            .unwrap();
        assert_eq!(tracker.count_by_prefix("act:"), 2);
        assert_eq!(tracker.count_by_prefix("regulation:"), 1);

        assert_eq!(tracker.clear_by_prefix("act:").unwrap(), 2);
        assert_eq!(tracker.len(), 1);

        // Compaction survives reopen.
        drop(tracker);
        let tracker = ProgressTracker::open(&path).unwrap();
        assert_eq!(tracker.len(), 1);
        assert!(tracker.has("regulation:B:en:0"));
    }

    #[test]
    fn sample_keys_sorted_and_bounded() {
        let tmp = TempDir::new().unwrap();
        let mut tracker = ProgressTracker::open(&tmp.path().join("p.log")).unwrap();
        tracker
            .mark_many(&["c".into(), "a".into(), "b".into()])
            .unwrap();
        assert_eq!(tracker.sample_keys(2), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn marking_after_clear_appends() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("p.log");
        let mut tracker = ProgressTracker::open(&path).unwrap();
        tracker.mark("act:A:en:0").unwrap();
        tracker.clear_by_prefix("act:").unwrap();
        tracker.mark("act:A:en:0").unwrap();
        drop(tracker);
        let tracker = ProgressTracker::open(&path).unwrap();
        assert_eq!(tracker.len(), 1);
    }
}
