//! Replicated room state using Loro.
//!
//! # Schema
//!
//! ```text
//! LoroDoc
//! ├── "scenes": LoroMap<base_path, LoroList<String>> (scene names per deck)
//! └── "state": LoroMap
//!     ├── "page": i64 (shared page number)
//!     └── "scene_path": String (active scene)
//! ```

mod room;

pub use room::{CrdtRoom, PAGE_KEY, SCENES_KEY, SCENE_PATH_KEY, STATE_KEY};

pub use loro::VersionVector;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{RoomState, SceneReconciler, ScenePathType};
    use crate::error::RoomError;

    #[test]
    fn test_reconcile_populates_crdt_room() {
        let mut room = CrdtRoom::new(true);
        let reconciler = SceneReconciler::new("/deck");

        reconciler.reconcile(&mut room, Some(2), 4).expect("reconcile");

        assert_eq!(room.scenes("/deck"), vec!["1", "2", "3", "4"]);
        assert_eq!(room.active_scene().as_deref(), Some("/deck/2"));
        assert_eq!(room.shared_page(), Some(2));
        assert_eq!(room.scene_path_type("/deck/4"), ScenePathType::Page);
        assert_eq!(room.scene_path_type("/deck"), ScenePathType::Dir);
        assert_eq!(room.scene_path_type("/deck/5"), ScenePathType::None);
    }

    #[test]
    fn test_snapshot_replicates_to_peer() {
        let mut presenter = CrdtRoom::new(true);
        SceneReconciler::new("/deck")
            .reconcile(&mut presenter, Some(3), 5)
            .expect("reconcile");

        let peer = CrdtRoom::from_snapshot(&presenter.export_snapshot(), false).expect("import");

        assert_eq!(peer.scenes("/deck").len(), 5);
        assert_eq!(peer.shared_page(), Some(3));
        assert!(!peer.is_writable());
    }

    #[test]
    fn test_incremental_updates() {
        let mut presenter = CrdtRoom::new(true);
        let reconciler = SceneReconciler::new("/deck");
        reconciler.reconcile(&mut presenter, Some(1), 3).expect("reconcile");

        let mut peer = CrdtRoom::from_snapshot(&presenter.export_snapshot(), false).expect("import");
        let since = peer.version();

        reconciler.reconcile(&mut presenter, Some(3), 3).expect("reconcile");
        peer.import(&presenter.export_updates(&since)).expect("import updates");

        assert_eq!(peer.shared_page(), Some(3));
        assert_eq!(peer.active_scene().as_deref(), Some("/deck/3"));
    }

    #[test]
    fn test_put_scenes_is_idempotent() {
        let mut room = CrdtRoom::new(true);
        let reconciler = SceneReconciler::new("/deck");
        reconciler.rebuild(&mut room, 3).expect("rebuild");
        reconciler.rebuild(&mut room, 3).expect("rebuild");
        assert_eq!(room.scenes("/deck").len(), 3);
    }

    #[test]
    fn test_read_only_room_rejects_page_write() {
        let mut room = CrdtRoom::new(false);
        assert!(matches!(room.set_shared_page(2), Err(RoomError::ReadOnly)));
        assert_eq!(room.shared_page(), None);
    }
}
