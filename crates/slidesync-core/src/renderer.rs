//! Renderer adapter.
//!
//! The slide renderer itself is opaque: it turns a page number into visual
//! output on its own schedule and reports progress through [`RendererEvent`]s.
//! Implementations wrap a concrete engine behind [`SlideRenderer`] and publish
//! lifecycle and sync events on a [`RendererEvents`] emitter.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use serde::{Deserialize, Serialize};

use crate::relay::SyncPayload;

/// Lifecycle and sync events emitted by a renderer.
#[derive(Debug, Clone, PartialEq)]
pub enum RendererEvent {
    /// The renderer's current page changed.
    SlideChange { page: u32 },
    /// A render request started working toward `page`.
    RenderStart { page: u32 },
    /// The renderer settled on `page`.
    RenderEnd { page: u32 },
    /// The in-flight render failed.
    RenderError { page: Option<u32>, message: String },
    /// Internal state transition that peers must replay.
    SyncDispatch(SyncPayload),
    /// A payload injected through [`SlideRenderer::apply_sync`] was applied.
    SyncReceive(SyncPayload),
}

/// Which side of the sync relationship this renderer plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerRole {
    /// Drives animations and dispatches sync events.
    #[default]
    Presenter,
    /// Only replays sync events received from peers.
    Follower,
}

/// Options handed to the renderer engine at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererOptions {
    /// Host element the renderer attaches to (an element id on web).
    pub anchor: Option<String>,
    pub interactive: bool,
    pub resizable: bool,
    pub controller_role: ControllerRole,
}

impl Default for RendererOptions {
    fn default() -> Self {
        Self {
            anchor: None,
            interactive: true,
            resizable: false,
            controller_role: ControllerRole::Presenter,
        }
    }
}

/// A slide rendering engine.
///
/// All work is asynchronous from the caller's point of view: `render_page`
/// only issues a request, and completion is observed through
/// [`RendererEvent::RenderEnd`] or [`RendererEvent::RenderError`]. Calling
/// `render_page` while a render is in flight redirects the renderer toward
/// the new page.
pub trait SlideRenderer {
    /// Request the renderer to show `page` (1-based).
    fn render_page(&mut self, page: u32);

    /// Number of slides, or 0 while metadata is still loading.
    fn slide_count(&self) -> u32;

    /// Page the renderer is currently showing, if any.
    fn current_page(&self) -> Option<u32>;

    /// Replay a sync payload received from a peer.
    fn apply_sync(&mut self, payload: &SyncPayload);

    /// Point the renderer at the converted document for `task_id`.
    fn load_resource(&mut self, task_id: &str, url: &str);

    /// Event emitter for lifecycle and sync events.
    fn events(&self) -> &RendererEvents;

    /// Release all renderer resources.
    fn destroy(&mut self);
}

type Listener = Box<dyn FnMut(&RendererEvent)>;

#[derive(Default)]
struct Listeners {
    next_id: u64,
    entries: Vec<(u64, Listener)>,
    /// Ids dropped while their listener was detached for dispatch.
    removed_during_emit: Vec<u64>,
    emitting: bool,
}

/// Multi-listener dispatcher for [`RendererEvent`]s.
#[derive(Clone, Default)]
pub struct RendererEvents {
    inner: Rc<RefCell<Listeners>>,
}

impl RendererEvents {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener. It stays attached until the returned
    /// [`Subscription`] is dropped.
    #[must_use = "dropping the subscription detaches the listener"]
    pub fn subscribe(&self, listener: impl FnMut(&RendererEvent) + 'static) -> Subscription {
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.entries.push((id, Box::new(listener)));
        Subscription {
            id,
            registry: Rc::downgrade(&self.inner),
        }
    }

    /// Deliver `event` to every attached listener in registration order.
    pub fn emit(&self, event: RendererEvent) {
        let mut entries = {
            let mut inner = self.inner.borrow_mut();
            inner.emitting = true;
            std::mem::take(&mut inner.entries)
        };

        for (_, listener) in entries.iter_mut() {
            listener(&event);
        }

        let mut inner = self.inner.borrow_mut();
        inner.emitting = false;
        let removed = std::mem::take(&mut inner.removed_during_emit);
        entries.retain(|(id, _)| !removed.contains(id));
        // Listeners added during dispatch go after the existing ones.
        entries.append(&mut inner.entries);
        inner.entries = entries;
    }

    /// Number of attached listeners.
    pub fn listener_count(&self) -> usize {
        self.inner.borrow().entries.len()
    }
}

/// Handle for one attached listener; detaches on drop.
pub struct Subscription {
    id: u64,
    registry: Weak<RefCell<Listeners>>,
}

impl Subscription {
    /// Detach the listener now.
    pub fn cancel(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        let Ok(mut inner) = registry.try_borrow_mut() else {
            log::warn!("Listener {} dropped while registry is borrowed", self.id);
            return;
        };
        let before = inner.entries.len();
        inner.entries.retain(|(id, _)| *id != self.id);
        if inner.entries.len() == before && inner.emitting {
            inner.removed_during_emit.push(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_reaches_all_listeners() {
        let events = RendererEvents::new();
        let seen = Rc::new(RefCell::new(Vec::new()));

        let a = seen.clone();
        let _s1 = events.subscribe(move |e| a.borrow_mut().push(("a", e.clone())));
        let b = seen.clone();
        let _s2 = events.subscribe(move |e| b.borrow_mut().push(("b", e.clone())));

        events.emit(RendererEvent::RenderStart { page: 2 });

        let seen = seen.borrow();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].0, "a");
        assert_eq!(seen[1].1, RendererEvent::RenderStart { page: 2 });
    }

    #[test]
    fn test_drop_subscription_detaches() {
        let events = RendererEvents::new();
        let count = Rc::new(RefCell::new(0));
        let c = count.clone();
        let sub = events.subscribe(move |_| *c.borrow_mut() += 1);

        events.emit(RendererEvent::SlideChange { page: 1 });
        sub.cancel();
        events.emit(RendererEvent::SlideChange { page: 2 });

        assert_eq!(*count.borrow(), 1);
        assert_eq!(events.listener_count(), 0);
    }

    #[test]
    fn test_subscription_outlives_emitter() {
        let events = RendererEvents::new();
        let sub = events.subscribe(|_| {});
        drop(events);
        drop(sub);
    }

    #[test]
    fn test_unsubscribe_during_emit() {
        let events = RendererEvents::new();
        let slot: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));
        let count = Rc::new(RefCell::new(0));

        let s = slot.clone();
        let c = count.clone();
        let sub = events.subscribe(move |_| {
            *c.borrow_mut() += 1;
            s.borrow_mut().take();
        });
        *slot.borrow_mut() = Some(sub);

        events.emit(RendererEvent::RenderEnd { page: 1 });
        events.emit(RendererEvent::RenderEnd { page: 1 });

        assert_eq!(*count.borrow(), 1);
        assert_eq!(events.listener_count(), 0);
    }
}
