use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// Completed statuses retained for inspection.
const COMPLETED_CAPACITY: usize = 100;

/// Progress snapshot of one project's indexing run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectStatus {
    pub project_id: String,
    pub project_path: String,
    pub is_indexing: bool,
    pub last_indexed: Option<i64>,
    pub total_files: usize,
    pub indexed_files: usize,
    pub failed_files: usize,
    pub progress_percent: u8,
}

impl ProjectStatus {
    fn new(project_id: String, project_path: String) -> Self {
        Self {
            project_id,
            project_path,
            is_indexing: true,
            last_indexed: None,
            total_files: 0,
            indexed_files: 0,
            failed_files: 0,
            progress_percent: 0,
        }
    }

    fn recompute_progress(&mut self) {
        self.progress_percent = if self.total_files == 0 {
            0
        } else {
            #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let percent = ((self.indexed_files + self.failed_files) as f64
                / self.total_files as f64
                * 100.0)
                .round() as u8;
            percent.min(100)
        };
    }
}

/// Registry of per-project statuses: one active slot per project while it
/// indexes, moved into a bounded completed table on termination.
#[derive(Default)]
pub struct StatusRegistry {
    inner: Mutex<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    active: HashMap<String, ProjectStatus>,
    completed: HashMap<String, ProjectStatus>,
    completed_order: VecDeque<String>,
}

impl StatusRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open an active status for a project starting to index. Replaces any
    /// completed record for the same project.
    pub fn begin(&self, project_id: &str, project_path: &str) {
        let mut inner = self.inner.lock().expect("status lock");
        inner.completed.remove(project_id);
        inner.completed_order.retain(|id| id != project_id);
        inner.active.insert(
            project_id.to_string(),
            ProjectStatus::new(project_id.to_string(), project_path.to_string()),
        );
    }

    pub fn set_total(&self, project_id: &str, total_files: usize) {
        let mut inner = self.inner.lock().expect("status lock");
        if let Some(status) = inner.active.get_mut(project_id) {
            status.total_files = total_files;
            status.recompute_progress();
        }
    }

    /// Add to the success / failure counters of the active run.
    pub fn record_files(&self, project_id: &str, indexed: usize, failed: usize) {
        let mut inner = self.inner.lock().expect("status lock");
        if let Some(status) = inner.active.get_mut(project_id) {
            status.indexed_files += indexed;
            status.failed_files += failed;
            debug_assert!(status.indexed_files + status.failed_files <= status.total_files);
            status.recompute_progress();
        }
    }

    /// Current progress percentage of the active run, if any.
    #[must_use]
    pub fn progress(&self, project_id: &str) -> Option<u8> {
        self.inner
            .lock()
            .expect("status lock")
            .active
            .get(project_id)
            .map(|s| s.progress_percent)
    }

    /// Whether the project has an active (queued or running) status.
    #[must_use]
    pub fn is_indexing(&self, project_id: &str) -> bool {
        self.inner
            .lock()
            .expect("status lock")
            .active
            .contains_key(project_id)
    }

    /// Terminate the active run, stamping `last_indexed` on success, and
    /// move the record to the completed table.
    pub fn complete(&self, project_id: &str, last_indexed: Option<i64>) {
        let mut inner = self.inner.lock().expect("status lock");
        let Some(mut status) = inner.active.remove(project_id) else {
            return;
        };
        status.is_indexing = false;
        if last_indexed.is_some() {
            status.last_indexed = last_indexed;
        }
        status.recompute_progress();

        inner.completed.insert(project_id.to_string(), status);
        inner.completed_order.push_back(project_id.to_string());
        while inner.completed_order.len() > COMPLETED_CAPACITY {
            if let Some(evicted) = inner.completed_order.pop_front() {
                inner.completed.remove(&evicted);
            }
        }
    }

    /// Status lookup: active first, then completed.
    #[must_use]
    pub fn get(&self, project_id: &str) -> Option<ProjectStatus> {
        let inner = self.inner.lock().expect("status lock");
        inner
            .active
            .get(project_id)
            .or_else(|| inner.completed.get(project_id))
            .cloned()
    }

    /// All known statuses, active before completed.
    #[must_use]
    pub fn all(&self) -> Vec<ProjectStatus> {
        let inner = self.inner.lock().expect("status lock");
        let mut out: Vec<ProjectStatus> = inner.active.values().cloned().collect();
        out.extend(inner.completed.values().cloned());
        out.sort_by(|a, b| a.project_id.cmp(&b.project_id));
        out
    }

    /// Forget a project entirely (both tables).
    pub fn remove(&self, project_id: &str) {
        let mut inner = self.inner.lock().expect("status lock");
        inner.active.remove(project_id);
        inner.completed.remove(project_id);
        inner.completed_order.retain(|id| id != project_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn progress_follows_counters() {
        let registry = StatusRegistry::new();
        registry.begin("p1", "/tmp/p1");
        registry.set_total("p1", 4);

        registry.record_files("p1", 1, 0);
        assert_eq!(registry.progress("p1"), Some(25));

        registry.record_files("p1", 1, 1);
        assert_eq!(registry.progress("p1"), Some(75));

        registry.record_files("p1", 1, 0);
        assert_eq!(registry.progress("p1"), Some(100));
    }

    #[test]
    fn completion_moves_status_to_completed_table() {
        let registry = StatusRegistry::new();
        registry.begin("p1", "/tmp/p1");
        registry.set_total("p1", 1);
        registry.record_files("p1", 1, 0);

        assert!(registry.is_indexing("p1"));
        registry.complete("p1", Some(1_700_000_000));
        assert!(!registry.is_indexing("p1"));

        let status = registry.get("p1").unwrap();
        assert!(!status.is_indexing);
        assert_eq!(status.last_indexed, Some(1_700_000_000));
        assert_eq!(status.progress_percent, 100);
    }

    #[test]
    fn begin_clears_stale_completed_record() {
        let registry = StatusRegistry::new();
        registry.begin("p1", "/tmp/p1");
        registry.complete("p1", None);
        registry.begin("p1", "/tmp/p1");

        let status = registry.get("p1").unwrap();
        assert!(status.is_indexing);
        assert_eq!(status.indexed_files, 0);
    }

    #[test]
    fn completed_table_is_bounded() {
        let registry = StatusRegistry::new();
        for i in 0..(COMPLETED_CAPACITY + 10) {
            let id = format!("p{i}");
            registry.begin(&id, "/tmp");
            registry.complete(&id, None);
        }
        assert!(registry.get("p0").is_none());
        assert!(registry.get(&format!("p{COMPLETED_CAPACITY}")).is_some());
    }

    #[test]
    fn remove_forgets_both_tables() {
        let registry = StatusRegistry::new();
        registry.begin("p1", "/tmp");
        registry.remove("p1");
        assert!(registry.get("p1").is_none());

        registry.begin("p2", "/tmp");
        registry.complete("p2", None);
        registry.remove("p2");
        assert!(registry.get("p2").is_none());
    }

    #[test]
    fn zero_total_yields_zero_progress() {
        let registry = StatusRegistry::new();
        registry.begin("p1", "/tmp");
        registry.set_total("p1", 0);
        assert_eq!(registry.progress("p1"), Some(0));
    }
}
