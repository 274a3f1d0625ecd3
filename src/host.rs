//! Host renderer capabilities.
//!
//! The pipeline never talks to a GPU API directly. Everything it needs from
//! the embedding renderer is expressed as the [`RenderHost`] trait: surface
//! handles, effect templates and instances, the scaled blit used for scene
//! color capture, and scoped draw-target acquisition. The `gpu` module
//! provides the wgpu implementation; tests run against an in-memory host.

use glam::Vec2;

/// Per-frame hook callback, invoked by the host once per view after scene
/// composition. The scene color handle is only valid for the duration of the
/// call; `None` means the host has no composited buffer this frame.
pub type FrameCallback<H> =
    Box<dyn FnMut(Option<&<H as RenderHost>::SceneColor>) + Send + 'static>;

/// Capabilities the pipeline consumes from the embedding renderer.
///
/// Surfaces and templates are cheap clonable handles owned by the
/// application; the pipeline never allocates or frees them. All drawing
/// operations are infallible at this boundary: a host that cannot service a
/// call drops it rather than failing the frame.
pub trait RenderHost: Send + Sync + 'static {
    /// Addressable 2D pixel buffer usable as capture destination or stage
    /// input/output.
    type Surface: Clone + Send + Sync + 'static;
    /// Read-only handle to the current frame's composited color buffer.
    type SceneColor;
    /// Shader/material definition an instance is created from.
    type Template: Clone + Send + Sync + 'static;
    /// Parameterized instance bound to a template.
    type Instance: Send + 'static;
    /// Scoped draw target, open between `begin_draw` and `end_draw`.
    type DrawCtx;
    /// Token identifying a registered frame hook.
    type HookHandle: Send;

    fn surface_size(&self, surface: &Self::Surface) -> (u32, u32);
    fn scene_color_size(&self, scene: &Self::SceneColor) -> (u32, u32);

    /// Logical size of the active view, which may be smaller than the
    /// composited buffer when the host over-allocates it.
    fn viewport_size(&self) -> (u32, u32);

    /// Create a fresh parameterized instance of `template`. This is the
    /// expensive operation the chain's dirty discipline exists to avoid
    /// repeating every frame.
    fn create_instance(&self, template: &Self::Template) -> Self::Instance;

    /// Bind `surface` into `instance` under `name`.
    fn bind_surface(&self, instance: &mut Self::Instance, name: &str, surface: &Self::Surface);

    /// Full-quad blit of the composited buffer into `dest`, sampling the
    /// source sub-rectangle `[0, scale]` per axis.
    fn draw_scaled_quad(&self, scene: &Self::SceneColor, dest: &Self::Surface, scale: Vec2);

    fn begin_draw(&self, dest: &Self::Surface) -> Self::DrawCtx;

    /// Draw `instance` as a full-coverage quad into the open target.
    fn draw_effect(&self, ctx: &mut Self::DrawCtx, instance: &Self::Instance);

    fn end_draw(&self, ctx: Self::DrawCtx);

    fn register_frame_hook(&self, callback: FrameCallback<Self>) -> Self::HookHandle;

    /// Deregistering an unknown handle is a no-op.
    fn deregister_frame_hook(&self, handle: Self::HookHandle);
}

/// Scoped draw-target acquisition. The target is closed on every exit path,
/// including early returns and panics, when the scope drops.
pub struct DrawScope<'a, H: RenderHost> {
    host: &'a H,
    ctx: Option<H::DrawCtx>,
}

impl<'a, H: RenderHost> DrawScope<'a, H> {
    pub fn begin(host: &'a H, dest: &H::Surface) -> Self {
        Self {
            host,
            ctx: Some(host.begin_draw(dest)),
        }
    }

    pub fn draw(&mut self, instance: &H::Instance) {
        if let Some(ctx) = self.ctx.as_mut() {
            self.host.draw_effect(ctx, instance);
        }
    }
}

impl<H: RenderHost> Drop for DrawScope<'_, H> {
    fn drop(&mut self) {
        if let Some(ctx) = self.ctx.take() {
            self.host.end_draw(ctx);
        }
    }
}

#[cfg(test)]
pub(crate) mod mock {
    //! In-memory host with spyable draw primitives.

    use super::{FrameCallback, RenderHost};
    use glam::Vec2;
    use std::collections::BTreeMap;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::{Arc, Mutex};

    pub struct MockSurface {
        pub name: String,
        pub width: u32,
        pub height: u32,
        /// Marker strings written by draws, newest last.
        pub contents: Mutex<Vec<String>>,
    }

    impl MockSurface {
        pub fn new(name: &str, width: u32, height: u32) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                width,
                height,
                contents: Mutex::new(Vec::new()),
            })
        }

        pub fn last_marker(&self) -> Option<String> {
            self.contents.lock().unwrap().last().cloned()
        }
    }

    #[derive(Clone)]
    pub struct MockTemplate {
        pub effect: String,
    }

    impl MockTemplate {
        pub fn new(effect: &str) -> Self {
            Self {
                effect: effect.to_string(),
            }
        }
    }

    pub struct MockInstance {
        pub id: u64,
        pub effect: String,
        pub bound: BTreeMap<String, Arc<MockSurface>>,
    }

    pub struct MockDrawCtx {
        target: Arc<MockSurface>,
    }

    #[derive(Clone, Debug, PartialEq)]
    pub struct ScaledBlit {
        pub dest: String,
        pub scale: Vec2,
    }

    #[derive(Default)]
    pub struct MockHost {
        pub viewport: Mutex<(u32, u32)>,
        pub blits: Mutex<Vec<ScaledBlit>>,
        /// Journal of begin/draw/end events in call order.
        pub events: Mutex<Vec<String>>,
        pub hooks: Mutex<HashMap<u64, FrameCallback<MockHost>>>,
        next_hook: AtomicU64,
        next_instance: AtomicU64,
    }

    impl MockHost {
        pub fn new(viewport: (u32, u32)) -> Arc<Self> {
            let host = Self::default();
            *host.viewport.lock().unwrap() = viewport;
            Arc::new(host)
        }

        pub fn hook_count(&self) -> usize {
            self.hooks.lock().unwrap().len()
        }

        /// Simulate the host's per-frame dispatch on the GPU-submission side.
        pub fn fire_frame(&self, scene: Option<&Arc<MockSurface>>) {
            let mut hooks = self.hooks.lock().unwrap();
            for callback in hooks.values_mut() {
                callback(scene);
            }
        }

        pub fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }
    }

    impl RenderHost for MockHost {
        type Surface = Arc<MockSurface>;
        type SceneColor = Arc<MockSurface>;
        type Template = MockTemplate;
        type Instance = MockInstance;
        type DrawCtx = MockDrawCtx;
        type HookHandle = u64;

        fn surface_size(&self, surface: &Self::Surface) -> (u32, u32) {
            (surface.width, surface.height)
        }

        fn scene_color_size(&self, scene: &Self::SceneColor) -> (u32, u32) {
            (scene.width, scene.height)
        }

        fn viewport_size(&self) -> (u32, u32) {
            *self.viewport.lock().unwrap()
        }

        fn create_instance(&self, template: &Self::Template) -> Self::Instance {
            MockInstance {
                id: self.next_instance.fetch_add(1, Ordering::Relaxed),
                effect: template.effect.clone(),
                bound: BTreeMap::new(),
            }
        }

        fn bind_surface(&self, instance: &mut Self::Instance, name: &str, surface: &Self::Surface) {
            instance.bound.insert(name.to_string(), surface.clone());
        }

        fn draw_scaled_quad(&self, scene: &Self::SceneColor, dest: &Self::Surface, scale: Vec2) {
            self.blits.lock().unwrap().push(ScaledBlit {
                dest: dest.name.clone(),
                scale,
            });
            let marker = format!("capture({})", scene.name);
            dest.contents.lock().unwrap().push(marker);
        }

        fn begin_draw(&self, dest: &Self::Surface) -> Self::DrawCtx {
            self.events.lock().unwrap().push(format!("begin:{}", dest.name));
            MockDrawCtx {
                target: dest.clone(),
            }
        }

        fn draw_effect(&self, ctx: &mut Self::DrawCtx, instance: &Self::Instance) {
            let inputs: Vec<String> = instance
                .bound
                .values()
                .map(|s| s.last_marker().unwrap_or_else(|| s.name.clone()))
                .collect();
            let marker = format!("{}({})", instance.effect, inputs.join(","));
            ctx.target.contents.lock().unwrap().push(marker);
            self.events
                .lock()
                .unwrap()
                .push(format!("draw:{}:{}", ctx.target.name, instance.effect));
        }

        fn end_draw(&self, ctx: Self::DrawCtx) {
            self.events.lock().unwrap().push(format!("end:{}", ctx.target.name));
        }

        fn register_frame_hook(&self, callback: FrameCallback<Self>) -> Self::HookHandle {
            let id = self.next_hook.fetch_add(1, Ordering::Relaxed);
            self.hooks.lock().unwrap().insert(id, callback);
            id
        }

        fn deregister_frame_hook(&self, handle: Self::HookHandle) {
            self.hooks.lock().unwrap().remove(&handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::*;
    use super::*;

    #[test]
    fn test_draw_scope_closes_on_drop() {
        let host = MockHost::new((64, 64));
        let surface = MockSurface::new("out", 64, 64);
        let template = MockTemplate::new("fx");
        let instance = host.create_instance(&template);
        {
            let mut scope = DrawScope::begin(host.as_ref(), &surface);
            scope.draw(&instance);
        }
        assert_eq!(host.events(), vec!["begin:out", "draw:out:fx", "end:out"]);
    }

    #[test]
    fn test_draw_scope_closes_without_draw() {
        let host = MockHost::new((64, 64));
        let surface = MockSurface::new("out", 64, 64);
        {
            let _scope = DrawScope::begin(host.as_ref(), &surface);
        }
        assert_eq!(host.events(), vec!["begin:out", "end:out"]);
    }
}
