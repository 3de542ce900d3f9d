use crate::AppWindow;
use chat_host_runtime::{FollowController, ScrollMetrics, ScrollRegion};
use slint::{CloseRequestResponse, ComponentHandle};
use std::cell::RefCell;
use std::rc::Rc;
use tracing::debug;

/// The message transcript `Flickable`. Slint reports `viewport-y` as a
/// non-positive value that decreases as the content scrolls up.
struct TranscriptRegion {
    ui: slint::Weak<AppWindow>,
}

impl ScrollRegion for TranscriptRegion {
    fn metrics(&self) -> Option<ScrollMetrics> {
        let ui = self.ui.upgrade()?;
        Some(ScrollMetrics {
            offset: -ui.get_transcript_viewport_y(),
            visible_height: ui.get_transcript_visible_height(),
            content_height: ui.get_transcript_content_height(),
        })
    }

    fn scroll_to(&self, offset: f32) {
        let Some(ui) = self.ui.upgrade() else {
            return;
        };
        let max_offset =
            (ui.get_transcript_content_height() - ui.get_transcript_visible_height()).max(0.0);
        ui.set_transcript_viewport_y(-offset.clamp(0.0, max_offset));
    }
}

pub fn attach(ui: &AppWindow) {
    let controller = Rc::new(RefCell::new(FollowController::mount(TranscriptRegion {
        ui: ui.as_weak(),
    })));

    let scrolled = controller.clone();
    ui.on_transcript_scrolled(move || {
        if let Ok(mut controller) = scrolled.try_borrow_mut() {
            controller.on_scroll();
        }
    });

    let resized = controller.clone();
    ui.on_transcript_resized(move || {
        if let Ok(mut controller) = resized.try_borrow_mut() {
            if controller.on_size_changed() {
                debug!("transcript snapped to bottom");
            }
        }
    });

    ui.window().on_close_requested(move || {
        controller.borrow_mut().unmount();
        CloseRequestResponse::HideWindow
    });
}
