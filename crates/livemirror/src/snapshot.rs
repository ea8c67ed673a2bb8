//! On-disk snapshots of a scanned session.
//!
//! A snapshot holds the graph and nothing else: no sockets, no callbacks, no
//! signals. Playback state is meaningless once reloaded, so every clip comes
//! back Stopped.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{LiveError, Result};
use crate::model::{Scene, SessionGraph, Track};

const EXTENSION: &str = "set";

/// Serialized form of a [`SessionGraph`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub tracks: Vec<Track>,
    pub groups: Vec<usize>,
    pub scenes: Vec<Scene>,
}

impl From<&SessionGraph> for Snapshot {
    fn from(graph: &SessionGraph) -> Self {
        Self {
            tracks: graph.tracks.clone(),
            groups: graph.groups.clone(),
            scenes: graph.scenes.clone(),
        }
    }
}

impl From<Snapshot> for SessionGraph {
    fn from(snapshot: Snapshot) -> Self {
        let mut graph = SessionGraph {
            tracks: snapshot.tracks,
            groups: snapshot.groups,
            scenes: snapshot.scenes,
        };
        graph.reset_clip_states();
        graph
    }
}

/// Directory of named snapshots, `<dir>/<name>.set`.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", name, EXTENSION))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.path_for(name).exists()
    }

    pub fn modified(&self, name: &str) -> Option<SystemTime> {
        fs::metadata(self.path_for(name)).and_then(|m| m.modified()).ok()
    }

    pub fn save(&self, graph: &SessionGraph, name: &str) -> Result<PathBuf> {
        let path = self.path_for(name);
        fs::create_dir_all(&self.dir).map_err(|e| LiveError::io(&self.dir, e))?;

        let bytes = bincode::serialize(&Snapshot::from(graph)).map_err(|e| LiveError::Snapshot {
            path: path.clone(),
            reason: format!("failed to serialize: {}", e),
        })?;

        // Write then rename so a crash never leaves half a snapshot behind
        let tmp = path.with_extension(format!("{}.tmp", EXTENSION));
        fs::write(&tmp, &bytes).map_err(|e| LiveError::io(&tmp, e))?;
        fs::rename(&tmp, &path).map_err(|e| LiveError::io(&path, e))?;

        info!("saved {} tracks to {} ({} bytes)", graph.tracks.len(), path.display(), bytes.len());
        Ok(path)
    }

    pub fn load(&self, name: &str) -> Result<SessionGraph> {
        let path = self.path_for(name);
        let bytes = fs::read(&path).map_err(|e| LiveError::io(&path, e))?;
        let snapshot: Snapshot = bincode::deserialize(&bytes).map_err(|e| LiveError::Snapshot {
            path: path.clone(),
            reason: format!("failed to deserialize: {}", e),
        })?;
        debug!("loaded {} tracks from {}", snapshot.tracks.len(), path.display());
        Ok(snapshot.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Clip, ClipState};
    use pretty_assertions::assert_eq;

    fn sample_graph() -> SessionGraph {
        let mut graph = SessionGraph::default();
        let mut group = Track::new_group(0, 0, "Drums");
        group.add_member(1);
        let mut kick = Track::new(1, "Kick");
        kick.group = Some(0);
        let mut clip = Clip::new(1, 2, 4.0);
        clip.state = ClipState::Playing;
        kick.insert_clip(clip.clone());
        group.insert_clip(Clip { track: 0, ..clip });
        graph.tracks.push(group);
        graph.tracks.push(kick);
        graph.groups.push(0);
        graph.scenes.push(Scene { index: 0, name: Some("A".into()) });
        graph
    }

    #[test]
    fn test_roundtrip_forces_stopped() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        let graph = sample_graph();

        let path = store.save(&graph, "gig").unwrap();
        assert_eq!(path, dir.path().join("gig.set"));

        let loaded = store.load("gig").unwrap();
        assert_eq!(loaded.tracks.len(), 2);
        assert_eq!(loaded.groups, vec![0]);
        assert_eq!(loaded.scenes, graph.scenes);
        assert_eq!(loaded.clip(1, 2).unwrap().state, ClipState::Stopped);
        assert_eq!(loaded.clip(0, 2).unwrap().state, ClipState::Stopped);
        assert_eq!(loaded.track(1).unwrap().group, Some(0));
    }

    #[test]
    fn test_missing_snapshot_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        assert!(matches!(store.load("absent"), Err(LiveError::Io { .. })));
        assert!(store.modified("absent").is_none());
    }

    #[test]
    fn test_corrupt_snapshot_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        fs::write(store.path_for("junk"), b"\xff\xff\xff\xff\xff\xff\xff\xff\x01").unwrap();
        assert!(matches!(store.load("junk"), Err(LiveError::Snapshot { .. })));
    }

    #[test]
    fn test_save_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("nested/cache"));
        store.save(&sample_graph(), "s").unwrap();
        assert!(store.exists("s"));
        assert!(store.modified("s").is_some());
    }
}
