//! Auto-follow for a scrollable region whose content grows over time.
//!
//! The controller keeps two samples: whether the viewport was near the bottom
//! at the last scroll, and whether the region overflowed at the last sample.
//! A size change snaps to the bottom when the viewport was near the bottom, or
//! when the region goes from fitting its content to overflowing.

/// Distance from the bottom edge still treated as "at the bottom".
pub const NEAR_BOTTOM_THRESHOLD: f32 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollMetrics {
    /// Distance scrolled from the top of the content.
    pub offset: f32,
    pub visible_height: f32,
    pub content_height: f32,
}

impl ScrollMetrics {
    pub fn distance_from_bottom(&self) -> f32 {
        self.content_height - self.offset - self.visible_height
    }

    pub fn has_overflow(&self) -> bool {
        self.content_height > self.visible_height
    }
}

/// Geometry of one scrollable region.
pub trait ScrollRegion {
    /// `None` while the region is not attached to a window.
    fn metrics(&self) -> Option<ScrollMetrics>;

    /// Scroll so that `offset` is the top of the viewport. Implementations
    /// clamp to the scrollable range.
    fn scroll_to(&self, offset: f32);
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FollowState {
    pub was_near_bottom: bool,
    pub had_scrollbar: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowMode {
    Following,
    Detached,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Overflow {
    Present,
    Absent,
}

impl FollowState {
    pub fn mode(&self) -> FollowMode {
        if self.was_near_bottom {
            FollowMode::Following
        } else {
            FollowMode::Detached
        }
    }

    pub fn overflow(&self) -> Overflow {
        if self.had_scrollbar {
            Overflow::Present
        } else {
            Overflow::Absent
        }
    }

    fn should_snap(&self, has_scrollbar_now: bool) -> bool {
        self.was_near_bottom || (!self.had_scrollbar && has_scrollbar_now)
    }
}

pub struct FollowController<R: ScrollRegion> {
    region: R,
    state: FollowState,
    mounted: bool,
}

impl<R: ScrollRegion> FollowController<R> {
    /// Attach to `region`, settle the initial position, then record it.
    /// The trailing scroll sample stands in for the scroll notification a
    /// snap would raise, so the resulting state is the same either way.
    pub fn mount(region: R) -> Self {
        let mut controller = Self {
            region,
            state: FollowState::default(),
            mounted: true,
        };
        controller.on_size_changed();
        controller.on_scroll();
        controller
    }

    pub fn on_scroll(&mut self) {
        let Some(metrics) = self.sample() else {
            return;
        };

        self.state.was_near_bottom = metrics.distance_from_bottom() <= NEAR_BOTTOM_THRESHOLD;
        self.state.had_scrollbar = metrics.has_overflow();
    }

    /// Returns `true` when the region was snapped to the bottom.
    pub fn on_size_changed(&mut self) -> bool {
        let Some(metrics) = self.sample() else {
            return false;
        };

        let has_scrollbar_now = metrics.has_overflow();
        let snap = self.state.should_snap(has_scrollbar_now);
        if snap {
            self.region.scroll_to(metrics.content_height);
        }

        self.state.had_scrollbar = has_scrollbar_now;
        snap
    }

    /// Stop reacting to notifications. Later callbacks are no-ops.
    pub fn unmount(&mut self) {
        self.mounted = false;
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    pub fn state(&self) -> FollowState {
        self.state
    }

    fn sample(&self) -> Option<ScrollMetrics> {
        if !self.mounted {
            return None;
        }
        self.region.metrics()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    struct FakeRegion {
        attached: Cell<bool>,
        offset: Cell<f32>,
        visible: Cell<f32>,
        content: Cell<f32>,
        scroll_targets: RefCell<Vec<f32>>,
    }

    impl FakeRegion {
        fn new(offset: f32, visible: f32, content: f32) -> Self {
            Self {
                attached: Cell::new(true),
                offset: Cell::new(offset),
                visible: Cell::new(visible),
                content: Cell::new(content),
                scroll_targets: RefCell::new(Vec::new()),
            }
        }

        fn detached() -> Self {
            let region = Self::new(0.0, 500.0, 1000.0);
            region.attached.set(false);
            region
        }
    }

    impl ScrollRegion for &FakeRegion {
        fn metrics(&self) -> Option<ScrollMetrics> {
            self.attached.get().then(|| ScrollMetrics {
                offset: self.offset.get(),
                visible_height: self.visible.get(),
                content_height: self.content.get(),
            })
        }

        fn scroll_to(&self, offset: f32) {
            self.scroll_targets.borrow_mut().push(offset);
            let max = (self.content.get() - self.visible.get()).max(0.0);
            self.offset.set(offset.clamp(0.0, max));
        }
    }

    fn controller_with(region: &FakeRegion, state: FollowState) -> FollowController<&FakeRegion> {
        FollowController {
            region,
            state,
            mounted: true,
        }
    }

    #[test]
    fn near_bottom_always_snaps() {
        for had_scrollbar in [false, true] {
            let region = FakeRegion::new(0.0, 500.0, 1000.0);
            let mut controller = controller_with(
                &region,
                FollowState {
                    was_near_bottom: true,
                    had_scrollbar,
                },
            );

            assert!(controller.on_size_changed());
            assert_eq!(*region.scroll_targets.borrow(), vec![1000.0]);
        }
    }

    #[test]
    fn detached_with_prior_overflow_never_snaps() {
        for content in [400.0, 1000.0] {
            let region = FakeRegion::new(0.0, 500.0, content);
            let mut controller = controller_with(
                &region,
                FollowState {
                    was_near_bottom: false,
                    had_scrollbar: true,
                },
            );

            assert!(!controller.on_size_changed());
            assert!(region.scroll_targets.borrow().is_empty());
        }
    }

    #[test]
    fn first_overflow_snaps_even_when_detached() {
        let region = FakeRegion::new(0.0, 500.0, 501.0);
        let mut controller = controller_with(&region, FollowState::default());

        assert!(controller.on_size_changed());
        assert_eq!(controller.state().overflow(), Overflow::Present);
    }

    #[test]
    fn growing_from_fit_to_overflow_snaps_to_new_height() {
        let region = FakeRegion::new(0.0, 500.0, 500.0);
        let mut controller = FollowController::mount(&region);
        assert!(!controller.state().had_scrollbar);

        region.content.set(600.0);
        assert!(controller.on_size_changed());

        assert_eq!(region.scroll_targets.borrow().last().copied(), Some(600.0));
        assert_eq!(region.offset.get(), 100.0);
        assert!(controller.state().had_scrollbar);
    }

    #[test]
    fn reading_history_is_not_interrupted_by_new_messages() {
        let region = FakeRegion::new(500.0, 500.0, 1000.0);
        let mut controller = FollowController::mount(&region);
        assert_eq!(controller.state().mode(), FollowMode::Following);

        region.offset.set(0.0);
        controller.on_scroll();
        assert_eq!(controller.state().mode(), FollowMode::Detached);

        region.content.set(1100.0);
        assert!(!controller.on_size_changed());
        assert_eq!(region.offset.get(), 0.0);
    }

    #[test]
    fn threshold_is_inclusive() {
        let region = FakeRegion::new(450.0, 500.0, 1000.0);
        let mut controller = controller_with(&region, FollowState::default());

        controller.on_scroll();
        assert!(controller.state().was_near_bottom);

        region.offset.set(449.0);
        controller.on_scroll();
        assert!(!controller.state().was_near_bottom);
    }

    #[test]
    fn mount_snaps_an_already_overflowing_region() {
        let region = FakeRegion::new(0.0, 500.0, 2000.0);
        let controller = FollowController::mount(&region);

        assert_eq!(region.offset.get(), 1500.0);
        assert_eq!(controller.state().mode(), FollowMode::Following);
        assert_eq!(controller.state().overflow(), Overflow::Present);
    }

    #[test]
    fn detached_region_is_a_no_op() {
        let region = FakeRegion::detached();
        let mut controller = FollowController::mount(&region);

        controller.on_scroll();
        assert!(!controller.on_size_changed());
        assert_eq!(controller.state(), FollowState::default());
        assert!(region.scroll_targets.borrow().is_empty());
    }

    #[test]
    fn unmounted_controller_ignores_notifications() {
        let region = FakeRegion::new(0.0, 500.0, 500.0);
        let mut controller = FollowController::mount(&region);
        controller.unmount();

        region.content.set(900.0);
        assert!(!controller.on_size_changed());
        assert!(!controller.is_mounted());
        assert!(region.scroll_targets.borrow().is_empty());
    }
}
