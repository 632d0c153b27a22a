//! Scene reconciler.
//!
//! Keeps the whiteboard's shared scene path aligned with the renderer's
//! current page. Every page of a deck has a scene entry named after its
//! page number under the deck's base path.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::{RoomError, RoomResult};

/// Position in the shared document tree: `{base_path}/{page}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScenePath {
    pub base_path: String,
    pub page: u32,
}

impl ScenePath {
    pub fn new(base_path: impl Into<String>, page: u32) -> Self {
        let base_path: String = base_path.into();
        Self {
            base_path: base_path.trim_end_matches('/').to_string(),
            page,
        }
    }
}

impl fmt::Display for ScenePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base_path, self.page)
    }
}

/// What the host knows about a scene path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenePathType {
    None,
    Page,
    Dir,
}

/// A scene entry to create under a base path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneDescriptor {
    pub name: String,
}

/// Host room/document state consumed by the reconciler.
pub trait RoomState {
    /// Classify `path`. Known host defect: may report `None` for an
    /// existing entry.
    fn scene_path_type(&self, path: &str) -> ScenePathType;

    /// Create scene entries under `base_path`.
    fn put_scenes(&mut self, base_path: &str, scenes: &[SceneDescriptor]) -> RoomResult<()>;

    /// Remove every scene under `base_path`.
    fn remove_scenes(&mut self, base_path: &str) -> RoomResult<()>;

    /// Make `path` the active scene.
    fn set_scene_path(&mut self, path: &str) -> RoomResult<()>;

    /// Whether this client may write shared state.
    fn is_writable(&self) -> bool;

    /// Persist the current page number into shared document state.
    fn set_shared_page(&mut self, page: u32) -> RoomResult<()>;

    /// Page number last persisted by any client.
    fn shared_page(&self) -> Option<u32>;
}

/// Maps settled renderer pages onto scene paths.
#[derive(Debug, Clone)]
pub struct SceneReconciler {
    base_path: String,
}

impl SceneReconciler {
    pub fn new(base_path: impl Into<String>) -> Self {
        let base_path: String = base_path.into();
        Self {
            base_path: base_path.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    pub fn scene_path(&self, page: u32) -> ScenePath {
        ScenePath::new(self.base_path.clone(), page)
    }

    /// Align the room with the renderer's settled `page`.
    ///
    /// `None` means the renderer has no page yet and nothing is touched.
    /// Returns the scene path that was activated.
    pub fn reconcile<H: RoomState + ?Sized>(
        &self,
        room: &mut H,
        page: Option<u32>,
        slide_count: u32,
    ) -> RoomResult<Option<ScenePath>> {
        let Some(page) = page else {
            return Ok(None);
        };
        if page == 0 || page > slide_count {
            return Err(RoomError::InvalidPath(format!(
                "page {} outside 1..={}",
                page, slide_count
            )));
        }

        let path = self.scene_path(page);
        let key = path.to_string();
        if room.scene_path_type(&key) == ScenePathType::None {
            self.rebuild(room, slide_count)?;
        }

        room.set_scene_path(&key)?;
        if room.is_writable() {
            room.set_shared_page(page)?;
        }
        Ok(Some(path))
    }

    /// Replace every scene under the base path with entries `1..=slide_count`.
    pub fn rebuild<H: RoomState + ?Sized>(&self, room: &mut H, slide_count: u32) -> RoomResult<()> {
        log::info!(
            "Rebuilding {} scenes under {}",
            slide_count,
            self.base_path
        );
        let scenes: Vec<SceneDescriptor> = (1..=slide_count)
            .map(|page| SceneDescriptor {
                name: page.to_string(),
            })
            .collect();
        room.remove_scenes(&self.base_path)?;
        room.put_scenes(&self.base_path, &scenes)
    }
}

/// In-memory room for tests and single-process use.
#[derive(Debug, Default)]
pub struct MemoryRoom {
    scenes: BTreeMap<String, Vec<String>>,
    active: Option<String>,
    shared_page: Option<u32>,
    writable: bool,
    /// Simulates the host reporting `None` for entries that exist.
    misreport_missing: bool,
}

impl MemoryRoom {
    pub fn new(writable: bool) -> Self {
        Self {
            writable,
            ..Self::default()
        }
    }

    pub fn set_writable(&mut self, writable: bool) {
        self.writable = writable;
    }

    pub fn set_misreport_missing(&mut self, misreport: bool) {
        self.misreport_missing = misreport;
    }

    /// Scene names under `base_path`, in creation order.
    pub fn scenes(&self, base_path: &str) -> &[String] {
        self.scenes.get(base_path).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn active_scene(&self) -> Option<&str> {
        self.active.as_deref()
    }

    /// Simulate another client persisting a page.
    pub fn set_remote_page(&mut self, page: u32) {
        self.shared_page = Some(page);
    }

    fn split(path: &str) -> Option<(&str, &str)> {
        path.rsplit_once('/')
    }
}

impl RoomState for MemoryRoom {
    fn scene_path_type(&self, path: &str) -> ScenePathType {
        if self.misreport_missing {
            return ScenePathType::None;
        }
        if self.scenes.contains_key(path.trim_end_matches('/')) {
            return ScenePathType::Dir;
        }
        match Self::split(path) {
            Some((base, name)) if self.scenes(base).iter().any(|s| s == name) => ScenePathType::Page,
            _ => ScenePathType::None,
        }
    }

    fn put_scenes(&mut self, base_path: &str, scenes: &[SceneDescriptor]) -> RoomResult<()> {
        let entry = self.scenes.entry(base_path.to_string()).or_default();
        for scene in scenes {
            if !entry.contains(&scene.name) {
                entry.push(scene.name.clone());
            }
        }
        Ok(())
    }

    fn remove_scenes(&mut self, base_path: &str) -> RoomResult<()> {
        self.scenes.remove(base_path);
        Ok(())
    }

    fn set_scene_path(&mut self, path: &str) -> RoomResult<()> {
        let exists = match Self::split(path) {
            Some((base, name)) => self.scenes(base).iter().any(|s| s == name),
            None => false,
        };
        if !exists {
            return Err(RoomError::InvalidPath(path.to_string()));
        }
        self.active = Some(path.to_string());
        Ok(())
    }

    fn is_writable(&self) -> bool {
        self.writable
    }

    fn set_shared_page(&mut self, page: u32) -> RoomResult<()> {
        if !self.writable {
            return Err(RoomError::ReadOnly);
        }
        self.shared_page = Some(page);
        Ok(())
    }

    fn shared_page(&self) -> Option<u32> {
        self.shared_page
    }
}
