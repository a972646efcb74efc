use crate::error::{CatalogError, Result};
use crate::unix_now;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Stable project identity: canonical path → 16-hex-char id, plus the
/// derived collection and space names, persisted as a JSON mapping updated
/// atomically (temp-write + rename).
pub struct ProjectIds {
    mapping_path: PathBuf,
    state: Mutex<MappingState>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct MappingState {
    projects: BTreeMap<String, ProjectMapping>,
}

/// Persisted per-project mapping record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectMapping {
    pub path: String,
    pub collection_name: String,
    pub space_name: String,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_indexed_at: Option<i64>,
}

impl ProjectIds {
    /// Load (or lazily create) the mapping file at the given path.
    pub fn open(mapping_path: impl Into<PathBuf>) -> Result<Self> {
        let mapping_path = mapping_path.into();
        let state = match std::fs::read_to_string(&mapping_path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                log::warn!(
                    "project mapping at {} is unreadable ({e}); starting fresh",
                    mapping_path.display()
                );
                MappingState::default()
            }),
            Err(_) => MappingState::default(),
        };
        Ok(Self {
            mapping_path,
            state: Mutex::new(state),
        })
    }

    /// Stable id for a project root: canonicalized path, SHA-256, first 16
    /// hex chars. An id for a given canonical path never changes once
    /// assigned; repeated calls refresh `updated_at` only.
    pub fn generate_or_fetch(&self, path: &Path) -> Result<String> {
        let canonical = canonicalize_root(path)?;
        let id = derive_id(&canonical);
        let now = unix_now();

        let mut state = self.state.lock().expect("mapping lock");
        let entry = state
            .projects
            .entry(id.clone())
            .or_insert_with(|| ProjectMapping {
                path: canonical.clone(),
                collection_name: collection_name(&id),
                space_name: space_name(&id),
                created_at: now,
                updated_at: now,
                last_indexed_at: None,
            });
        entry.updated_at = now;
        self.persist(&state)?;
        Ok(id)
    }

    /// The mapping for a known id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<ProjectMapping> {
        self.state
            .lock()
            .expect("mapping lock")
            .projects
            .get(id)
            .cloned()
    }

    /// Find the id registered for a path, without creating one.
    pub fn lookup(&self, path: &Path) -> Result<Option<String>> {
        let canonical = canonicalize_root(path)?;
        let id = derive_id(&canonical);
        let state = self.state.lock().expect("mapping lock");
        Ok(state.projects.contains_key(&id).then_some(id))
    }

    /// Record a completed index pass.
    pub fn touch_indexed(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock().expect("mapping lock");
        if let Some(entry) = state.projects.get_mut(id) {
            let now = unix_now();
            entry.last_indexed_at = Some(now);
            entry.updated_at = now;
            self.persist(&state)?;
        }
        Ok(())
    }

    /// Drop a project from the mapping.
    pub fn remove(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock().expect("mapping lock");
        if state.projects.remove(id).is_some() {
            self.persist(&state)?;
        }
        Ok(())
    }

    /// Ids currently known to the mapping.
    #[must_use]
    pub fn known_ids(&self) -> Vec<String> {
        self.state
            .lock()
            .expect("mapping lock")
            .projects
            .keys()
            .cloned()
            .collect()
    }

    fn persist(&self, state: &MappingState) -> Result<()> {
        if let Some(parent) = self.mapping_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(state)?;
        let tmp = self.mapping_path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        if let Err(err) = std::fs::rename(&tmp, &self.mapping_path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(CatalogError::Io(err));
        }
        Ok(())
    }
}

/// Vector-store collection name for a project id.
#[must_use]
pub fn collection_name(id: &str) -> String {
    format!("project-{id}")
}

/// Graph-store space name for a project id.
#[must_use]
pub fn space_name(id: &str) -> String {
    format!("project_{id}")
}

fn canonicalize_root(path: &Path) -> Result<String> {
    let canonical = path
        .canonicalize()
        .map_err(|e| CatalogError::InvalidPath(format!("{}: {e}", path.display())))?;
    let display = canonical.to_string_lossy().to_string();
    if cfg!(any(target_os = "windows", target_os = "macos")) {
        // Case-insensitive filesystems: one directory, one id.
        Ok(display.to_lowercase())
    } else {
        Ok(display)
    }
}

fn derive_id(canonical: &str) -> String {
    let digest = Sha256::digest(canonical.as_bytes());
    let mut id = String::with_capacity(16);
    for byte in digest.iter().take(8) {
        id.push_str(&format!("{byte:02x}"));
    }
    id
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn fixture() -> (TempDir, ProjectIds, PathBuf) {
        let temp = TempDir::new().unwrap();
        let project_dir = temp.path().join("project");
        std::fs::create_dir_all(&project_dir).unwrap();
        let ids = ProjectIds::open(temp.path().join("state/projects.json")).unwrap();
        (temp, ids, project_dir)
    }

    #[test]
    fn id_is_stable_for_the_same_path() {
        let (_temp, ids, project_dir) = fixture();
        let first = ids.generate_or_fetch(&project_dir).unwrap();
        let second = ids.generate_or_fetch(&project_dir).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 16);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn distinct_paths_get_distinct_ids() {
        let (temp, ids, project_dir) = fixture();
        let other_dir = temp.path().join("other");
        std::fs::create_dir_all(&other_dir).unwrap();

        let a = ids.generate_or_fetch(&project_dir).unwrap();
        let b = ids.generate_or_fetch(&other_dir).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn collection_and_space_names_are_derived() {
        let (_temp, ids, project_dir) = fixture();
        let id = ids.generate_or_fetch(&project_dir).unwrap();
        let mapping = ids.get(&id).unwrap();
        assert_eq!(mapping.collection_name, format!("project-{id}"));
        assert_eq!(mapping.space_name, format!("project_{id}"));
    }

    #[test]
    fn mapping_survives_reload() {
        let temp = TempDir::new().unwrap();
        let project_dir = temp.path().join("project");
        std::fs::create_dir_all(&project_dir).unwrap();
        let mapping_path = temp.path().join("projects.json");

        let id = {
            let ids = ProjectIds::open(&mapping_path).unwrap();
            ids.generate_or_fetch(&project_dir).unwrap()
        };

        let reloaded = ProjectIds::open(&mapping_path).unwrap();
        assert_eq!(reloaded.lookup(&project_dir).unwrap(), Some(id.clone()));
        assert!(reloaded.get(&id).is_some());
    }

    #[test]
    fn corrupt_mapping_file_starts_fresh() {
        let temp = TempDir::new().unwrap();
        let mapping_path = temp.path().join("projects.json");
        std::fs::write(&mapping_path, "{not json").unwrap();

        let ids = ProjectIds::open(&mapping_path).unwrap();
        assert!(ids.known_ids().is_empty());
    }

    #[test]
    fn missing_path_is_an_error() {
        let (temp, ids, _project_dir) = fixture();
        let ghost = temp.path().join("does-not-exist");
        assert!(ids.generate_or_fetch(&ghost).is_err());
    }

    #[test]
    fn remove_forgets_the_project() {
        let (_temp, ids, project_dir) = fixture();
        let id = ids.generate_or_fetch(&project_dir).unwrap();
        ids.remove(&id).unwrap();
        assert!(ids.get(&id).is_none());
        assert_eq!(ids.lookup(&project_dir).unwrap(), None);
    }

    #[test]
    fn touch_indexed_records_timestamp() {
        let (_temp, ids, project_dir) = fixture();
        let id = ids.generate_or_fetch(&project_dir).unwrap();
        ids.touch_indexed(&id).unwrap();
        assert!(ids.get(&id).unwrap().last_indexed_at.is_some());
    }
}
