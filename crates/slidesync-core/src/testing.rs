//! Scripted renderer for unit tests.

use crate::relay::SyncPayload;
use crate::renderer::{RendererEvent, RendererEvents, RendererOptions, SlideRenderer};

/// Renderer whose asynchronous work is completed by hand.
///
/// A render call while another is in flight redirects it, like the real
/// engine: no second `RenderStart` is emitted and the eventual settle lands
/// on the newest page.
pub(crate) struct ScriptedRenderer {
    pub options: RendererOptions,
    pub slide_count: u32,
    pub current: Option<u32>,
    pub in_flight: Option<u32>,
    pub render_calls: Vec<u32>,
    pub starts: u32,
    pub applied: Vec<SyncPayload>,
    pub resources: Vec<(String, String)>,
    pub destroyed: bool,
    events: RendererEvents,
}

impl ScriptedRenderer {
    pub fn new(options: &RendererOptions) -> Self {
        Self {
            options: options.clone(),
            slide_count: 0,
            current: None,
            in_flight: None,
            render_calls: Vec::new(),
            starts: 0,
            applied: Vec::new(),
            resources: Vec::new(),
            destroyed: false,
            events: RendererEvents::new(),
        }
    }

    /// Metadata finished loading; the first page is showing.
    pub fn load_metadata(&mut self, slide_count: u32) {
        self.slide_count = slide_count;
        self.current = Some(1);
    }

    /// Complete the in-flight render.
    pub fn finish(&mut self) {
        if let Some(page) = self.in_flight.take() {
            self.current = Some(page);
            self.events.emit(RendererEvent::SlideChange { page });
            self.events.emit(RendererEvent::RenderEnd { page });
        }
    }

    /// Complete the in-flight render on a page other than requested.
    pub fn finish_at(&mut self, page: u32) {
        self.in_flight = None;
        self.current = Some(page);
        self.events.emit(RendererEvent::SlideChange { page });
        self.events.emit(RendererEvent::RenderEnd { page });
    }

    /// Fail the in-flight render without changing the current page.
    pub fn fail(&mut self, message: &str) {
        let page = self.in_flight.take();
        self.events.emit(RendererEvent::RenderError {
            page,
            message: message.to_string(),
        });
    }

    /// Emit an internal transition that peers must replay.
    pub fn dispatch(&mut self, payload: SyncPayload) {
        self.events.emit(RendererEvent::SyncDispatch(payload));
    }
}

impl SlideRenderer for ScriptedRenderer {
    fn render_page(&mut self, page: u32) {
        self.render_calls.push(page);
        if self.in_flight.is_none() {
            self.starts += 1;
            self.in_flight = Some(page);
            self.events.emit(RendererEvent::RenderStart { page });
        } else {
            self.in_flight = Some(page);
        }
    }

    fn slide_count(&self) -> u32 {
        self.slide_count
    }

    fn current_page(&self) -> Option<u32> {
        self.current
    }

    fn apply_sync(&mut self, payload: &SyncPayload) {
        self.applied.push(payload.clone());
        self.events.emit(RendererEvent::SyncReceive(payload.clone()));
    }

    fn load_resource(&mut self, task_id: &str, url: &str) {
        self.resources.push((task_id.to_string(), url.to_string()));
    }

    fn events(&self) -> &RendererEvents {
        &self.events
    }

    fn destroy(&mut self) {
        self.destroyed = true;
        self.in_flight = None;
    }
}
