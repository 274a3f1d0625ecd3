//! Scene color capture.
//!
//! Blits the host's composited color buffer into a designated surface once
//! per frame. The composited buffer may be over-allocated relative to the
//! live viewport, so the blit samples only the meaningful sub-rectangle.

use crate::host::RenderHost;
use glam::Vec2;

/// Captures the composited scene color into an optional destination surface.
///
/// With no destination configured, capture is inactive for the frame; that is
/// ordinary configuration state, not an error.
pub struct SceneColorCapture<H: RenderHost> {
    target: Option<H::Surface>,
}

impl<H: RenderHost> SceneColorCapture<H> {
    pub fn new() -> Self {
        Self { target: None }
    }

    pub fn target(&self) -> Option<&H::Surface> {
        self.target.as_ref()
    }

    pub fn set_target(&mut self, target: Option<H::Surface>) {
        self.target = target;
    }

    /// Issue the capture blit for the current frame.
    ///
    /// Must be called on the GPU-submission context: the composited buffer is
    /// only valid there, for the duration of the hook invocation. Skips
    /// silently when the destination or scene buffer is absent or either the
    /// viewport or the source buffer has a zero dimension.
    pub fn capture(&self, host: &H, scene: Option<&H::SceneColor>) {
        let Some(target) = self.target.as_ref() else {
            return;
        };
        let Some(scene) = scene else {
            return;
        };
        let (view_w, view_h) = host.viewport_size();
        if view_w == 0 || view_h == 0 {
            return;
        }
        let (src_w, src_h) = host.scene_color_size(scene);
        if src_w == 0 || src_h == 0 {
            return;
        }
        // The viewport never samples outside the composited buffer, so the
        // scale clamps to 1.0 per axis.
        let scale = Vec2::new(
            (view_w as f32 / src_w as f32).clamp(0.0, 1.0),
            (view_h as f32 / src_h as f32).clamp(0.0, 1.0),
        );
        host.draw_scaled_quad(scene, target, scale);
    }
}

impl<H: RenderHost> Default for SceneColorCapture<H> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::mock::{MockHost, MockSurface};
    use glam::Vec2;

    #[test]
    fn test_capture_scales_viewport_to_source() {
        let host = MockHost::new((960, 540));
        let scene = MockSurface::new("scene", 1920, 1080);
        let dest = MockSurface::new("dest", 512, 512);

        let mut capture = SceneColorCapture::new();
        capture.set_target(Some(dest));
        capture.capture(host.as_ref(), Some(&scene));

        let blits = host.blits.lock().unwrap();
        assert_eq!(blits.len(), 1);
        assert_eq!(blits[0].dest, "dest");
        assert_eq!(blits[0].scale, Vec2::new(0.5, 0.5));
    }

    #[test]
    fn test_capture_clamps_oversized_viewport() {
        let host = MockHost::new((2560, 1440));
        let scene = MockSurface::new("scene", 1920, 1080);
        let dest = MockSurface::new("dest", 512, 512);

        let mut capture = SceneColorCapture::new();
        capture.set_target(Some(dest));
        capture.capture(host.as_ref(), Some(&scene));

        let blits = host.blits.lock().unwrap();
        assert_eq!(blits[0].scale, Vec2::new(1.0, 1.0));
    }

    #[test]
    fn test_capture_without_target_is_noop() {
        let host = MockHost::new((960, 540));
        let scene = MockSurface::new("scene", 1920, 1080);

        let capture: SceneColorCapture<MockHost> = SceneColorCapture::new();
        capture.capture(host.as_ref(), Some(&scene));

        assert!(host.blits.lock().unwrap().is_empty());
    }

    #[test]
    fn test_capture_without_scene_is_noop() {
        let host = MockHost::new((960, 540));
        let dest = MockSurface::new("dest", 512, 512);

        let mut capture = SceneColorCapture::new();
        capture.set_target(Some(dest));
        capture.capture(host.as_ref(), None);

        assert!(host.blits.lock().unwrap().is_empty());
    }

    #[test]
    fn test_capture_with_zero_viewport_is_noop() {
        let host = MockHost::new((0, 0));
        let scene = MockSurface::new("scene", 1920, 1080);
        let dest = MockSurface::new("dest", 512, 512);

        let mut capture = SceneColorCapture::new();
        capture.set_target(Some(dest));
        capture.capture(host.as_ref(), Some(&scene));

        assert!(host.blits.lock().unwrap().is_empty());
    }

    #[test]
    fn test_capture_with_zero_sized_source_is_noop() {
        let host = MockHost::new((960, 540));
        let scene = MockSurface::new("scene", 0, 0);
        let dest = MockSurface::new("dest", 512, 512);

        let mut capture = SceneColorCapture::new();
        capture.set_target(Some(dest));
        capture.capture(host.as_ref(), Some(&scene));

        assert!(host.blits.lock().unwrap().is_empty());
    }
}
