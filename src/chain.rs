//! The effect chain: an ordered list of processing stages with a
//! generation-counter dirty discipline.
//!
//! Stages chain only through shared surfaces: stage N writes a surface that
//! stage N+1 reads as its input. Effect instances are expensive to create, so
//! they are cached per stage and rebuilt only after a configuration change
//! marks the chain dirty.

use crate::host::{DrawScope, RenderHost};

/// Configuration for one stage, handed to [`EffectChain::push`] or
/// [`EffectChain::insert`]. Unset fields leave the stage inactive rather than
/// failing it.
pub struct StageConfig<H: RenderHost> {
    pub input: Option<H::Surface>,
    pub input_binding: String,
    pub template: Option<H::Template>,
    pub output: Option<H::Surface>,
}

impl<H: RenderHost> StageConfig<H> {
    pub fn new() -> Self {
        Self {
            input: None,
            input_binding: "source".to_string(),
            template: None,
            output: None,
        }
    }

    pub fn with_input(mut self, surface: H::Surface) -> Self {
        self.input = Some(surface);
        self
    }

    pub fn with_input_binding(mut self, name: impl Into<String>) -> Self {
        self.input_binding = name.into();
        self
    }

    pub fn with_template(mut self, template: H::Template) -> Self {
        self.template = Some(template);
        self
    }

    pub fn with_output(mut self, surface: H::Surface) -> Self {
        self.output = Some(surface);
        self
    }
}

impl<H: RenderHost> Default for StageConfig<H> {
    fn default() -> Self {
        Self::new()
    }
}

/// One step of the chain: input surface, binding name, template, cached
/// instance and output surface.
pub struct EffectStage<H: RenderHost> {
    input: Option<H::Surface>,
    input_binding: String,
    template: Option<H::Template>,
    output: Option<H::Surface>,
    instance: Option<H::Instance>,
    /// Generation the cached instance was built at.
    built_at: u64,
}

impl<H: RenderHost> EffectStage<H> {
    fn from_config(config: StageConfig<H>) -> Self {
        Self {
            input: config.input,
            input_binding: config.input_binding,
            template: config.template,
            output: config.output,
            instance: None,
            built_at: 0,
        }
    }

    pub fn input(&self) -> Option<&H::Surface> {
        self.input.as_ref()
    }

    pub fn input_binding(&self) -> &str {
        &self.input_binding
    }

    pub fn template(&self) -> Option<&H::Template> {
        self.template.as_ref()
    }

    pub fn output(&self) -> Option<&H::Surface> {
        self.output.as_ref()
    }

    pub fn instance(&self) -> Option<&H::Instance> {
        self.instance.as_ref()
    }

    /// Host-specific tweaks (effect parameters) that do not require an
    /// instance rebuild go through here.
    pub fn instance_mut(&mut self) -> Option<&mut H::Instance> {
        self.instance.as_mut()
    }

    /// A stage runs only when instance, input and output are all present.
    pub fn is_executable(&self) -> bool {
        self.instance.is_some() && self.input.is_some() && self.output.is_some()
    }
}

/// Ordered sequence of effect stages plus the dirty discipline.
///
/// Every configuration mutation bumps the generation counter; `prepare`
/// rebuilds cached instances only when the prepared generation lags behind.
/// Execution walks the stages strictly in order, skipping incomplete ones
/// independently.
pub struct EffectChain<H: RenderHost> {
    stages: Vec<EffectStage<H>>,
    generation: u64,
    prepared: u64,
}

impl<H: RenderHost> EffectChain<H> {
    pub fn new() -> Self {
        // generation starts ahead of prepared: a fresh chain is dirty.
        Self {
            stages: Vec::new(),
            generation: 1,
            prepared: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn stage(&self, index: usize) -> Option<&EffectStage<H>> {
        self.stages.get(index)
    }

    pub fn stage_mut(&mut self, index: usize) -> Option<&mut EffectStage<H>> {
        self.stages.get_mut(index)
    }

    pub fn stages(&self) -> &[EffectStage<H>] {
        &self.stages
    }

    pub fn is_dirty(&self) -> bool {
        self.prepared != self.generation
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Force instance rebuilds on the next `prepare`. All mutation methods
    /// call this; it is public for configuration layers that edit state out
    /// of band.
    pub fn mark_dirty(&mut self) {
        self.generation += 1;
    }

    /// Append a stage. Returns its index.
    pub fn push(&mut self, config: StageConfig<H>) -> usize {
        self.stages.push(EffectStage::from_config(config));
        self.mark_dirty();
        self.stages.len() - 1
    }

    /// Insert a stage at `index`, shifting later stages down the chain.
    pub fn insert(&mut self, index: usize, config: StageConfig<H>) {
        self.stages.insert(index, EffectStage::from_config(config));
        self.mark_dirty();
    }

    pub fn remove(&mut self, index: usize) {
        self.stages.remove(index);
        self.mark_dirty();
    }

    pub fn clear(&mut self) {
        self.stages.clear();
        self.mark_dirty();
    }

    pub fn set_input(&mut self, index: usize, surface: Option<H::Surface>) {
        self.stages[index].input = surface;
        self.mark_dirty();
    }

    pub fn set_input_binding(&mut self, index: usize, name: impl Into<String>) {
        self.stages[index].input_binding = name.into();
        self.mark_dirty();
    }

    pub fn set_template(&mut self, index: usize, template: Option<H::Template>) {
        self.stages[index].template = template;
        self.mark_dirty();
    }

    pub fn set_output(&mut self, index: usize, surface: Option<H::Surface>) {
        self.stages[index].output = surface;
        self.mark_dirty();
    }

    /// Materialize effect instances for the current configuration.
    ///
    /// While clean this is a no-op, so calling it every frame costs nothing.
    /// While dirty, every stage with a template gets a fresh instance (the
    /// previous one is discarded) and stages without a template drop any
    /// stale instance. Must run on the orchestration context: instance
    /// creation may query application state.
    pub fn prepare(&mut self, host: &H) {
        if !self.is_dirty() {
            return;
        }
        let mut built = 0;
        for stage in &mut self.stages {
            match &stage.template {
                Some(template) => {
                    if stage.built_at != self.generation {
                        stage.instance = Some(host.create_instance(template));
                        stage.built_at = self.generation;
                        built += 1;
                    }
                }
                None => {
                    stage.instance = None;
                }
            }
        }
        self.prepared = self.generation;
        log::debug!(
            "prepared effect chain: {} instance(s) rebuilt at generation {}",
            built,
            self.generation
        );
    }

    /// Run every executable stage strictly in sequence order.
    ///
    /// Each stage binds its input into its instance, opens a scoped draw
    /// target on its output, draws a full-coverage quad and closes the
    /// target. Incomplete stages are skipped without affecting the rest of
    /// the chain.
    pub fn execute(&mut self, host: &H) {
        for stage in &mut self.stages {
            let Some(instance) = stage.instance.as_mut() else {
                continue;
            };
            let Some(input) = stage.input.as_ref() else {
                continue;
            };
            let Some(output) = stage.output.as_ref() else {
                continue;
            };
            host.bind_surface(instance, &stage.input_binding, input);
            let mut scope = DrawScope::begin(host, output);
            scope.draw(instance);
        }
    }

    /// Per-frame entry point: prepare if dirty, then execute.
    pub fn update(&mut self, host: &H) {
        self.prepare(host);
        self.execute(host);
    }
}

impl<H: RenderHost> Default for EffectChain<H> {
    fn default() -> Self {
        Self::new()
    }
}
