//! The pipeline: capture + chain composition and the per-frame hook.
//!
//! Two execution contexts meet here. The host invokes the frame hook on its
//! GPU-submission context, where the composited color buffer is valid; the
//! chain's preparation and execution belong to the orchestration context that
//! drives per-frame application logic. The hook is the only synchronization
//! boundary between the two: it blits synchronously, then posts the chain
//! update to the orchestration task queue holding nothing but a weak
//! reference to the pipeline state.

use crate::capture::SceneColorCapture;
use crate::chain::EffectChain;
use crate::host::{FrameCallback, RenderHost};
use crate::tasks::TaskSender;
use std::sync::{Arc, Mutex, MutexGuard};

/// Capture and chain state shared between the two contexts.
///
/// The orchestration context is the sole mutator; the frame hook only reads
/// the capture destination while blitting. The mutex makes that single-writer
/// discipline safe rather than conventional.
pub struct PipelineState<H: RenderHost> {
    pub capture: SceneColorCapture<H>,
    pub chain: EffectChain<H>,
}

impl<H: RenderHost> PipelineState<H> {
    fn new() -> Self {
        Self {
            capture: SceneColorCapture::new(),
            chain: EffectChain::new(),
        }
    }
}

/// Owns the pipeline state and its registration with the host renderer.
///
/// `activate` registers the frame hook, `deactivate` removes it; both are
/// idempotent and dropping the pipeline deactivates it. After deactivation a
/// continuation already sitting in the task queue finds its weak reference
/// dead once the pipeline is gone and degrades to a no-op.
pub struct PostPipeline<H: RenderHost> {
    host: Arc<H>,
    state: Arc<Mutex<PipelineState<H>>>,
    tasks: TaskSender,
    hook: Option<H::HookHandle>,
}

impl<H: RenderHost> PostPipeline<H> {
    pub fn new(host: Arc<H>, tasks: TaskSender) -> Self {
        Self {
            host,
            state: Arc::new(Mutex::new(PipelineState::new())),
            tasks,
            hook: None,
        }
    }

    pub fn host(&self) -> &Arc<H> {
        &self.host
    }

    /// Lock the pipeline state for configuration from the orchestration
    /// context.
    pub fn state(&self) -> MutexGuard<'_, PipelineState<H>> {
        self.state.lock().unwrap()
    }

    pub fn set_capture_target(&self, target: Option<H::Surface>) {
        self.state().capture.set_target(target);
    }

    pub fn is_active(&self) -> bool {
        self.hook.is_some()
    }

    /// Register the frame hook with the host. Registering an already-active
    /// pipeline does not produce a second hook.
    pub fn activate(&mut self) {
        if self.hook.is_some() {
            return;
        }
        let callback = Self::frame_hook(
            Arc::downgrade(&self.state),
            Arc::clone(&self.host),
            self.tasks.clone(),
        );
        self.hook = Some(self.host.register_frame_hook(callback));
        log::info!("post pipeline activated");
    }

    /// Deregister the frame hook. Must run before the pipeline state is
    /// released so no further invocation observes freed state; deactivating
    /// an inactive pipeline is a no-op.
    pub fn deactivate(&mut self) {
        if let Some(handle) = self.hook.take() {
            self.host.deregister_frame_hook(handle);
            log::info!("post pipeline deactivated");
        }
    }

    /// Build the per-frame callback the host invokes on its GPU-submission
    /// context.
    fn frame_hook(
        state: std::sync::Weak<Mutex<PipelineState<H>>>,
        host: Arc<H>,
        tasks: TaskSender,
    ) -> FrameCallback<H> {
        Box::new(move |scene| {
            let Some(state) = state.upgrade() else {
                return;
            };
            // Capture runs here, synchronously: the composited buffer is
            // only valid inside this invocation.
            {
                let Ok(guard) = state.lock() else {
                    return;
                };
                guard.capture.capture(host.as_ref(), scene);
            }
            // The chain update hops to the orchestration context. The task
            // re-checks liveness at run time; the pipeline may be torn down
            // in between.
            let weak = Arc::downgrade(&state);
            let host = Arc::clone(&host);
            tasks.post(move || {
                let Some(state) = weak.upgrade() else {
                    return;
                };
                let Ok(mut guard) = state.lock() else {
                    return;
                };
                guard.chain.update(host.as_ref());
            });
        })
    }
}

impl<H: RenderHost> Drop for PostPipeline<H> {
    fn drop(&mut self) {
        self.deactivate();
    }
}
