//! Navigation state machine.
//!
//! Tracks the single in-flight target page against what the renderer has
//! actually settled on. The machine never talks to the renderer directly:
//! each transition returns the page that should be rendered, if any.

/// Whether a render request is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NavigationState {
    #[default]
    Idle,
    Transitioning,
}

/// Clamp a requested page into `[1, slide_count]`.
pub fn clamp_page(page: i64, slide_count: u32) -> u32 {
    let last = i64::from(slide_count.max(1));
    // Bounded by `last`, which came from a u32.
    page.clamp(1, last) as u32
}

/// Last-write-wins navigation toward the most recently requested page.
#[derive(Debug, Default)]
pub struct Navigator {
    state: NavigationState,
    targeting_page: Option<u32>,
    /// Set once a catch-up render toward `targeting_page` has been issued
    /// after the renderer settled elsewhere.
    catch_up_issued: bool,
}

impl Navigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> NavigationState {
        self.state
    }

    pub fn is_busy(&self) -> bool {
        self.state == NavigationState::Transitioning
    }

    pub fn targeting_page(&self) -> Option<u32> {
        self.targeting_page
    }

    /// Align the target with a page the renderer is known to show.
    pub fn settle(&mut self, page: u32) {
        self.targeting_page = Some(page);
    }

    /// Handle a navigation request.
    ///
    /// Returns the page to hand to the renderer, or `None` when the request
    /// is a duplicate of the current target.
    pub fn request(&mut self, page: i64, slide_count: u32) -> Option<u32> {
        let page = clamp_page(page, slide_count);
        if self.targeting_page == Some(page) {
            return None;
        }
        if self.is_busy() {
            log::debug!(
                "Redirecting in-flight render from {:?} to {}",
                self.targeting_page,
                page
            );
        }
        self.targeting_page = Some(page);
        self.state = NavigationState::Transitioning;
        self.catch_up_issued = false;
        Some(page)
    }

    /// Relative request from the latest target (or `current` when nothing
    /// has been targeted yet).
    pub fn step(&mut self, delta: i64, current: Option<u32>, slide_count: u32) -> Option<u32> {
        let from = self.targeting_page.or(current)?;
        self.request(i64::from(from) + delta, slide_count)
    }

    /// The renderer began a transition.
    pub fn on_render_start(&mut self, page: u32) {
        if self.state == NavigationState::Idle {
            // Started by the renderer itself, e.g. replaying a peer's sync.
            self.targeting_page = Some(page);
            self.state = NavigationState::Transitioning;
        }
    }

    /// The renderer settled on `page`.
    ///
    /// Returns a page to render when the renderer settled somewhere other
    /// than the latest target and no catch-up has been tried yet.
    pub fn on_render_end(&mut self, page: u32) -> Option<u32> {
        match (self.state, self.targeting_page) {
            (NavigationState::Transitioning, Some(target))
                if target != page && !self.catch_up_issued =>
            {
                self.catch_up_issued = true;
                Some(target)
            }
            (_, target) => {
                if target.is_some_and(|t| t != page) {
                    log::warn!("Renderer settled on {} instead of {:?}", page, target);
                }
                self.finish(Some(page));
                None
            }
        }
    }

    /// The in-flight render failed; return to idle at whatever page the
    /// renderer is showing.
    pub fn on_render_error(&mut self, current: Option<u32>) {
        self.finish(current);
    }

    /// Drop all navigation state.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    fn finish(&mut self, settled: Option<u32>) {
        self.state = NavigationState::Idle;
        self.targeting_page = settled;
        self.catch_up_issued = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_page() {
        assert_eq!(clamp_page(0, 10), 1);
        assert_eq!(clamp_page(-4, 10), 1);
        assert_eq!(clamp_page(5, 10), 5);
        assert_eq!(clamp_page(11, 10), 10);
        assert_eq!(clamp_page(i64::MAX, 10), 10);
        assert_eq!(clamp_page(3, 0), 1);
    }

    #[test]
    fn test_clamp_matches_min_max_for_range() {
        for p in -3..15 {
            let expected = p.min(10).max(1) as u32;
            assert_eq!(clamp_page(p, 10), expected);
        }
    }

    #[test]
    fn test_request_enters_transitioning() {
        let mut nav = Navigator::new();
        nav.settle(1);
        assert_eq!(nav.request(5, 10), Some(5));
        assert_eq!(nav.state(), NavigationState::Transitioning);
        assert_eq!(nav.targeting_page(), Some(5));
    }

    #[test]
    fn test_duplicate_request_is_suppressed() {
        let mut nav = Navigator::new();
        nav.settle(1);
        assert_eq!(nav.request(5, 10), Some(5));
        assert_eq!(nav.request(5, 10), None);
        assert_eq!(nav.request(5, 10), None);
        assert!(nav.is_busy());
    }

    #[test]
    fn test_request_for_current_page_while_idle() {
        let mut nav = Navigator::new();
        nav.settle(3);
        assert_eq!(nav.request(3, 10), None);
        assert_eq!(nav.state(), NavigationState::Idle);
    }

    #[test]
    fn test_redirect_while_transitioning() {
        let mut nav = Navigator::new();
        nav.settle(1);
        assert_eq!(nav.request(5, 10), Some(5));
        nav.on_render_start(5);
        assert_eq!(nav.request(9, 10), Some(9));
        assert_eq!(nav.targeting_page(), Some(9));

        assert_eq!(nav.on_render_end(9), None);
        assert_eq!(nav.state(), NavigationState::Idle);
        assert_eq!(nav.targeting_page(), Some(9));
    }

    #[test]
    fn test_catch_up_when_renderer_ignores_redirect() {
        let mut nav = Navigator::new();
        nav.settle(1);
        nav.request(5, 10);
        nav.request(9, 10);

        // Renderer finished the stale request first.
        assert_eq!(nav.on_render_end(5), Some(9));
        assert!(nav.is_busy());
        assert_eq!(nav.on_render_end(9), None);
        assert!(!nav.is_busy());
    }

    #[test]
    fn test_catch_up_only_once() {
        let mut nav = Navigator::new();
        nav.settle(1);
        nav.request(7, 10);
        assert_eq!(nav.on_render_end(2), Some(7));
        assert_eq!(nav.on_render_end(2), None);
        assert_eq!(nav.state(), NavigationState::Idle);
        assert_eq!(nav.targeting_page(), Some(2));
    }

    #[test]
    fn test_error_returns_to_idle() {
        let mut nav = Navigator::new();
        nav.settle(1);
        nav.request(4, 10);
        nav.on_render_error(Some(1));
        assert_eq!(nav.state(), NavigationState::Idle);
        assert_eq!(nav.targeting_page(), Some(1));

        // Navigation is not stuck afterwards.
        assert_eq!(nav.request(4, 10), Some(4));
    }

    #[test]
    fn test_step_accumulates_on_target() {
        let mut nav = Navigator::new();
        nav.settle(1);
        assert_eq!(nav.step(1, Some(1), 10), Some(2));
        assert_eq!(nav.step(1, Some(1), 10), Some(3));
        assert_eq!(nav.step(1, Some(1), 10), Some(4));
        assert_eq!(nav.step(-1, Some(1), 10), Some(3));
    }

    #[test]
    fn test_step_at_bounds_is_noop() {
        let mut nav = Navigator::new();
        nav.settle(10);
        assert_eq!(nav.step(1, Some(10), 10), None);
        nav.settle(1);
        assert_eq!(nav.step(-1, Some(1), 10), None);
    }

    #[test]
    fn test_renderer_initiated_transition() {
        let mut nav = Navigator::new();
        nav.settle(1);
        nav.on_render_start(2);
        assert!(nav.is_busy());
        assert_eq!(nav.on_render_end(2), None);
        assert_eq!(nav.targeting_page(), Some(2));
    }
}
