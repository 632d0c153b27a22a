//! Render session: one mounted slide viewer.
//!
//! Owns the renderer for the lifetime of the mount and wires it to the
//! navigation machine, readiness monitor, peer relay, and scene reconciler.
//! Everything runs on one thread; renderer callbacks land in a mailbox that
//! the session drains after every call into it and on every [`tick`].
//!
//! [`tick`]: RenderSession::tick

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

#[cfg(not(target_arch = "wasm32"))]
use std::time::Instant;

#[cfg(target_arch = "wasm32")]
use web_time::Instant;

use crate::config::SessionConfig;
use crate::disposer::Disposer;
use crate::error::SessionError;
use crate::navigation::{NavigationState, Navigator};
use crate::readiness::{Ready, ReadinessMonitor, ReadyInfo};
use crate::relay::{BroadcastTransport, SyncPayload, SyncRelay};
use crate::renderer::{RendererEvent, RendererOptions, SlideRenderer};
use crate::scene::{RoomState, ScenePath, SceneReconciler};

/// Notifications for UI collaborators.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The renderer loaded its metadata.
    Ready { slide_count: u32 },
    /// The transition indicator should show (`busy`) or hide.
    TransitionChanged { busy: bool },
    /// The renderer is now showing `page`.
    PageChanged { page: u32 },
    /// The active scene now points at `path`.
    SceneChanged { path: ScenePath },
    /// A render failed; navigation is idle again.
    RenderFailed { page: Option<u32>, message: String },
    /// The host rejected a scene update.
    SceneSyncFailed { message: String },
}

/// A mounted slide viewer bound to a room and a peer transport.
pub struct RenderSession<R: SlideRenderer, H: RoomState, T: BroadcastTransport> {
    config: SessionConfig,
    renderer: R,
    room: H,
    transport: T,
    navigator: Navigator,
    readiness: ReadinessMonitor,
    relay: SyncRelay,
    reconciler: SceneReconciler,
    disposer: Disposer,
    mailbox: Rc<RefCell<VecDeque<RendererEvent>>>,
    events: Vec<SessionEvent>,
    /// Shared page last seen in (or written to) the room.
    last_shared_page: Option<u32>,
    destroyed: bool,
}

impl<R: SlideRenderer, H: RoomState, T: BroadcastTransport> RenderSession<R, H, T> {
    /// Mount a viewer.
    ///
    /// `build_renderer` receives the configured renderer options.
    pub fn new(
        config: SessionConfig,
        build_renderer: impl FnOnce(&RendererOptions) -> R,
        room: H,
        mut transport: T,
    ) -> Result<Self, SessionError> {
        config.validate()?;

        let mut renderer = build_renderer(&config.renderer);
        if let Some(resource) = &config.resource {
            renderer.load_resource(&resource.task_id, &resource.url);
        }

        let channel = config.channel();
        transport.listen(&channel)?;
        let relay = SyncRelay::new(channel, transport.observer().clone());

        let mailbox = Rc::new(RefCell::new(VecDeque::new()));
        let mut disposer = Disposer::new();
        let inbox = mailbox.clone();
        disposer.add_subscription(
            renderer
                .events()
                .subscribe(move |event| inbox.borrow_mut().push_back(event.clone())),
        );

        log::info!(
            "Mounted slide session for {} as {}",
            config.document_id,
            relay.observer()
        );

        Ok(Self {
            reconciler: SceneReconciler::new(config.base_scene_path()),
            readiness: ReadinessMonitor::new(config.readiness_interval()),
            config,
            renderer,
            room,
            transport,
            navigator: Navigator::new(),
            relay,
            disposer,
            mailbox,
            events: Vec::new(),
            last_shared_page: None,
            destroyed: false,
        })
    }

    // --- Navigation ---

    /// Navigate to `page` (clamped into the deck). Ignored until ready.
    pub fn jump_to_page(&mut self, page: i64) {
        if self.destroyed {
            return;
        }
        if !self.refresh_ready() {
            log::debug!("Ignoring jump to {} before renderer is ready", page);
            return;
        }
        self.navigate(page);
        self.pump();
    }

    /// Step one page forward from the latest target.
    pub fn next_page(&mut self) {
        self.step(1);
    }

    /// Step one page back from the latest target.
    pub fn prev_page(&mut self) {
        self.step(-1);
    }

    fn step(&mut self, delta: i64) {
        if self.destroyed || !self.refresh_ready() {
            return;
        }
        let was_busy = self.navigator.is_busy();
        let current = self.renderer.current_page();
        if let Some(page) = self.navigator.step(delta, current, self.renderer.slide_count()) {
            self.renderer.render_page(page);
        }
        self.note_transition(was_busy);
        self.pump();
    }

    fn navigate(&mut self, page: i64) {
        let was_busy = self.navigator.is_busy();
        if let Some(target) = self.navigator.request(page, self.renderer.slide_count()) {
            self.renderer.render_page(target);
        }
        self.note_transition(was_busy);
    }

    // --- Peer sync ---

    /// Replay a peer's sync payload into the local renderer. Ignored until
    /// ready.
    pub fn receive_sync_event(&mut self, payload: SyncPayload) {
        if self.destroyed || !self.refresh_ready() {
            return;
        }
        self.renderer.apply_sync(&payload);
        self.pump();
    }

    // --- Driving ---

    /// Advance timers and drain pending renderer and peer events.
    pub fn tick(&mut self, now: Instant) {
        if self.destroyed {
            return;
        }

        if let Some(info) = self.readiness.poll(now, || self.renderer.slide_count()) {
            self.on_ready(info);
        }

        for message in self.transport.poll_messages() {
            let Some(payload) = self.relay.inbound(&message) else {
                continue;
            };
            if self.readiness.is_ready() {
                self.renderer.apply_sync(payload);
            } else {
                log::debug!("Dropping sync from {} before ready", message.sender);
            }
        }

        self.follow_room();
        self.pump();
    }

    /// Tear down the session: detach listeners, leave the channel, and
    /// destroy the renderer. Safe to call more than once.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        self.disposer.dispose();
        self.transport.unlisten(self.relay.channel());
        self.renderer.destroy();
        self.readiness.cancel();
        self.navigator.reset();
        self.mailbox.borrow_mut().clear();
        log::info!("Destroyed slide session for {}", self.config.document_id);
    }

    /// Drain UI notifications.
    pub fn poll_events(&mut self) -> Vec<SessionEvent> {
        std::mem::take(&mut self.events)
    }

    // --- Accessors ---

    /// Future resolving once the renderer is ready.
    pub fn ready(&self) -> Ready {
        self.readiness.ready()
    }

    pub fn is_ready(&self) -> bool {
        self.readiness.is_ready()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    pub fn slide_count(&self) -> u32 {
        self.renderer.slide_count()
    }

    pub fn current_page(&self) -> Option<u32> {
        self.renderer.current_page()
    }

    pub fn targeting_page(&self) -> Option<u32> {
        self.navigator.targeting_page()
    }

    pub fn navigation_state(&self) -> NavigationState {
        self.navigator.state()
    }

    pub fn is_busy(&self) -> bool {
        self.navigator.is_busy()
    }

    pub fn scene_path(&self) -> Option<ScenePath> {
        self.current_page().map(|page| self.reconciler.scene_path(page))
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn relay(&self) -> &SyncRelay {
        &self.relay
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    pub fn room(&self) -> &H {
        &self.room
    }

    pub fn room_mut(&mut self) -> &mut H {
        &mut self.room
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    // --- Internals ---

    /// Resolve readiness eagerly if the renderer already has a page count.
    fn refresh_ready(&mut self) -> bool {
        if self.readiness.is_ready() {
            return true;
        }
        if let Some(info) = self.readiness.notify(self.renderer.slide_count()) {
            self.on_ready(info);
        }
        self.readiness.is_ready()
    }

    fn on_ready(&mut self, info: ReadyInfo) {
        self.events.push(SessionEvent::Ready {
            slide_count: info.slide_count,
        });
        let current = self.renderer.current_page();
        if let Some(page) = current {
            self.navigator.settle(page);
        }

        let shared = self.room.shared_page();
        self.last_shared_page = shared;
        match shared {
            Some(page) if self.config.follow_shared_page && Some(page) != current => {
                log::info!("Joining at shared page {}", page);
                self.navigate(i64::from(page));
            }
            _ => self.reconcile(current),
        }
    }

    /// Jump to the page another client persisted, if it changed.
    fn follow_room(&mut self) {
        if !self.config.follow_shared_page || !self.readiness.is_ready() {
            return;
        }
        let shared = self.room.shared_page();
        if shared.is_none() || shared == self.last_shared_page {
            return;
        }
        self.last_shared_page = shared;
        if let Some(page) = shared {
            log::debug!("Following shared page {}", page);
            self.navigate(i64::from(page));
        }
    }

    /// Handle renderer events until the mailbox is empty.
    fn pump(&mut self) {
        loop {
            let next = self.mailbox.borrow_mut().pop_front();
            let Some(event) = next else {
                break;
            };
            self.handle_renderer_event(event);
        }
    }

    fn handle_renderer_event(&mut self, event: RendererEvent) {
        let was_busy = self.navigator.is_busy();
        match event {
            RendererEvent::SlideChange { page } => {
                self.events.push(SessionEvent::PageChanged { page });
                if !self.navigator.is_busy() {
                    self.navigator.settle(page);
                    self.reconcile(Some(page));
                }
            }
            RendererEvent::RenderStart { page } => {
                self.navigator.on_render_start(page);
            }
            RendererEvent::RenderEnd { page } => match self.navigator.on_render_end(page) {
                Some(target) => self.renderer.render_page(target),
                None => self.reconcile(Some(page)),
            },
            RendererEvent::RenderError { page, message } => {
                log::warn!("Render of page {:?} failed: {}", page, message);
                self.navigator.on_render_error(self.renderer.current_page());
                self.events.push(SessionEvent::RenderFailed { page, message });
                self.reconcile(self.renderer.current_page());
            }
            RendererEvent::SyncDispatch(payload) => {
                if let Err(e) = self.relay.outbound(&mut self.transport, &payload) {
                    log::warn!("Failed to broadcast sync event: {}", e);
                }
            }
            RendererEvent::SyncReceive(_) => {
                log::debug!("Renderer applied peer sync");
            }
        }
        self.note_transition(was_busy);
    }

    fn reconcile(&mut self, page: Option<u32>) {
        let slide_count = self.renderer.slide_count();
        match self.reconciler.reconcile(&mut self.room, page, slide_count) {
            Ok(Some(path)) => {
                if self.room.is_writable() {
                    self.last_shared_page = Some(path.page);
                }
                self.events.push(SessionEvent::SceneChanged { path });
            }
            Ok(None) => {}
            Err(e) => {
                log::warn!("Scene reconcile failed: {}", e);
                self.events.push(SessionEvent::SceneSyncFailed {
                    message: e.to_string(),
                });
            }
        }
    }

    fn note_transition(&mut self, was_busy: bool) {
        let busy = self.navigator.is_busy();
        if busy != was_busy {
            self.events.push(SessionEvent::TransitionChanged { busy });
        }
    }
}

impl<R: SlideRenderer, H: RoomState, T: BroadcastTransport> Drop for RenderSession<R, H, T> {
    fn drop(&mut self) {
        self.destroy();
    }
}
