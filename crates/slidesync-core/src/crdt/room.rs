//! Loro-backed room state.

use loro::{ExportMode, LoroDoc, LoroList, LoroMap, LoroResult, LoroValue};

use crate::error::{RoomError, RoomResult};
use crate::scene::{RoomState, SceneDescriptor, ScenePathType};

/// Key for the scene directory map.
pub const SCENES_KEY: &str = "scenes";
/// Key for the shared state map.
pub const STATE_KEY: &str = "state";
/// Shared page number inside the state map.
pub const PAGE_KEY: &str = "page";
/// Active scene path inside the state map.
pub const SCENE_PATH_KEY: &str = "scene_path";

/// Room state replicated through a Loro document.
pub struct CrdtRoom {
    doc: LoroDoc,
    writable: bool,
}

impl CrdtRoom {
    pub fn new(writable: bool) -> Self {
        Self {
            doc: LoroDoc::new(),
            writable,
        }
    }

    /// Create a room from a peer's snapshot.
    pub fn from_snapshot(bytes: &[u8], writable: bool) -> LoroResult<Self> {
        let doc = LoroDoc::new();
        doc.import(bytes)?;
        Ok(Self { doc, writable })
    }

    pub fn loro_doc(&self) -> &LoroDoc {
        &self.doc
    }

    pub fn set_writable(&mut self, writable: bool) {
        self.writable = writable;
    }

    pub fn export_snapshot(&self) -> Vec<u8> {
        self.doc.export(ExportMode::Snapshot).unwrap_or_default()
    }

    pub fn export_updates(&self, since: &loro::VersionVector) -> Vec<u8> {
        self.doc.export(ExportMode::updates(since)).unwrap_or_default()
    }

    /// Merge updates from another peer.
    pub fn import(&mut self, bytes: &[u8]) -> LoroResult<()> {
        self.doc.import(bytes)?;
        Ok(())
    }

    pub fn version(&self) -> loro::VersionVector {
        self.doc.oplog_vv()
    }

    /// Scene names under `base_path`, in order.
    pub fn scenes(&self, base_path: &str) -> Vec<String> {
        let LoroValue::Map(dirs) = self.scenes_map().get_deep_value() else {
            return Vec::new();
        };
        match dirs.get(base_path) {
            Some(LoroValue::List(names)) => names
                .iter()
                .filter_map(|v| match v {
                    LoroValue::String(s) => Some(s.to_string()),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Scene path last activated by any client.
    pub fn active_scene(&self) -> Option<String> {
        match self.state_value(SCENE_PATH_KEY)? {
            LoroValue::String(s) => Some(s.to_string()),
            _ => None,
        }
    }

    fn scenes_map(&self) -> LoroMap {
        self.doc.get_map(SCENES_KEY)
    }

    fn state_map(&self) -> LoroMap {
        self.doc.get_map(STATE_KEY)
    }

    fn state_value(&self, key: &str) -> Option<LoroValue> {
        match self.state_map().get_deep_value() {
            LoroValue::Map(map) => map.get(key).cloned(),
            _ => None,
        }
    }

    fn has_dir(&self, base_path: &str) -> bool {
        match self.scenes_map().get_deep_value() {
            LoroValue::Map(dirs) => dirs.contains_key(base_path),
            _ => false,
        }
    }

    fn write_scenes(&mut self, base_path: &str, names: &[String]) -> LoroResult<()> {
        let dirs = self.scenes_map();
        if self.has_dir(base_path) {
            dirs.delete(base_path)?;
        }
        let list = dirs.insert_container(base_path, LoroList::new())?;
        for name in names {
            list.push(LoroValue::String(name.clone().into()))?;
        }
        self.doc.commit();
        Ok(())
    }
}

impl RoomState for CrdtRoom {
    fn scene_path_type(&self, path: &str) -> ScenePathType {
        let path = path.trim_end_matches('/');
        if self.has_dir(path) {
            return ScenePathType::Dir;
        }
        match path.rsplit_once('/') {
            Some((base, name)) if self.scenes(base).iter().any(|s| s == name) => ScenePathType::Page,
            _ => ScenePathType::None,
        }
    }

    fn put_scenes(&mut self, base_path: &str, scenes: &[SceneDescriptor]) -> RoomResult<()> {
        let mut names = self.scenes(base_path);
        for scene in scenes {
            if !names.contains(&scene.name) {
                names.push(scene.name.clone());
            }
        }
        self.write_scenes(base_path, &names)?;
        Ok(())
    }

    fn remove_scenes(&mut self, base_path: &str) -> RoomResult<()> {
        if self.has_dir(base_path) {
            self.scenes_map().delete(base_path)?;
            self.doc.commit();
        }
        Ok(())
    }

    fn set_scene_path(&mut self, path: &str) -> RoomResult<()> {
        if self.scene_path_type(path) != ScenePathType::Page {
            return Err(RoomError::InvalidPath(path.to_string()));
        }
        self.state_map().insert(SCENE_PATH_KEY, path)?;
        self.doc.commit();
        Ok(())
    }

    fn is_writable(&self) -> bool {
        self.writable
    }

    fn set_shared_page(&mut self, page: u32) -> RoomResult<()> {
        if !self.writable {
            return Err(RoomError::ReadOnly);
        }
        self.state_map().insert(PAGE_KEY, i64::from(page))?;
        self.doc.commit();
        Ok(())
    }

    fn shared_page(&self) -> Option<u32> {
        match self.state_value(PAGE_KEY)? {
            LoroValue::I64(page) => u32::try_from(page).ok(),
            LoroValue::Double(page) => Some(page as u32),
            _ => None,
        }
    }
}

impl Default for CrdtRoom {
    fn default() -> Self {
        Self::new(true)
    }
}
