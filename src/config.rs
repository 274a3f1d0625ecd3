//! Named pipeline configuration.
//!
//! The application owns surfaces and effect templates; this layer lets it
//! describe a pipeline by name (JSON-friendly) and resolve the names against
//! registries into live stage configurations. Unresolvable names are logged
//! and left unset — the affected stage is simply inactive, matching the
//! pipeline's silent-skip semantics.

use crate::chain::StageConfig;
use crate::host::RenderHost;
use crate::pipeline::PipelineState;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Registry of application-owned surfaces by name.
pub struct SurfaceRegistry<H: RenderHost> {
    entries: HashMap<String, H::Surface>,
}

impl<H: RenderHost> SurfaceRegistry<H> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn register(&mut self, name: impl Into<String>, surface: H::Surface) {
        self.entries.insert(name.into(), surface);
    }

    pub fn get(&self, name: &str) -> Option<&H::Surface> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }
}

impl<H: RenderHost> Default for SurfaceRegistry<H> {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry of effect templates by name.
pub struct TemplateRegistry<H: RenderHost> {
    entries: HashMap<String, H::Template>,
}

impl<H: RenderHost> TemplateRegistry<H> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn register(&mut self, name: impl Into<String>, template: H::Template) {
        self.entries.insert(name.into(), template);
    }

    pub fn get(&self, name: &str) -> Option<&H::Template> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }
}

impl<H: RenderHost> Default for TemplateRegistry<H> {
    fn default() -> Self {
        Self::new()
    }
}

fn default_binding() -> String {
    "source".to_string()
}

/// One stage described by name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageSpec {
    #[serde(default)]
    pub input: Option<String>,
    #[serde(default = "default_binding")]
    pub binding: String,
    #[serde(default)]
    pub effect: Option<String>,
    #[serde(default)]
    pub output: Option<String>,
}

/// A whole pipeline described by name: the capture destination plus the
/// ordered stage list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineSpec {
    #[serde(default)]
    pub capture_target: Option<String>,
    #[serde(default)]
    pub stages: Vec<StageSpec>,
}

impl PipelineSpec {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("parse pipeline spec")
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("serialize pipeline spec")
    }

    /// Replace `state`'s capture target and stage list with this spec,
    /// resolving names against the registries. The chain comes out dirty and
    /// rebuilds its instances on the next prepare.
    pub fn apply<H: RenderHost>(
        &self,
        state: &mut PipelineState<H>,
        surfaces: &SurfaceRegistry<H>,
        templates: &TemplateRegistry<H>,
    ) {
        state
            .capture
            .set_target(resolve_surface(surfaces, self.capture_target.as_deref(), "capture target"));
        state.chain.clear();
        for spec in &self.stages {
            let mut config = StageConfig::new().with_input_binding(spec.binding.clone());
            config.input = resolve_surface(surfaces, spec.input.as_deref(), "stage input");
            config.output = resolve_surface(surfaces, spec.output.as_deref(), "stage output");
            config.template = match spec.effect.as_deref() {
                Some(name) => {
                    let found = templates.get(name).cloned();
                    if found.is_none() {
                        log::warn!("unknown effect template '{}'; stage left inactive", name);
                    }
                    found
                }
                None => None,
            };
            state.chain.push(config);
        }
    }
}

fn resolve_surface<H: RenderHost>(
    registry: &SurfaceRegistry<H>,
    name: Option<&str>,
    role: &str,
) -> Option<H::Surface> {
    let name = name?;
    let found = registry.get(name).cloned();
    if found.is_none() {
        log::warn!("unknown {} surface '{}'", role, name);
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::mock::{MockHost, MockSurface, MockTemplate};
    use crate::pipeline::PostPipeline;
    use crate::tasks::TaskQueue;

    fn registries() -> (SurfaceRegistry<MockHost>, TemplateRegistry<MockHost>) {
        let mut surfaces = SurfaceRegistry::new();
        surfaces.register("captured", MockSurface::new("captured", 512, 512));
        surfaces.register("half", MockSurface::new("half", 256, 256));
        let mut templates = TemplateRegistry::new();
        templates.register("blur", MockTemplate::new("blur"));
        (surfaces, templates)
    }

    #[test]
    fn test_spec_round_trips_through_json() {
        let json = r#"{
            "capture_target": "captured",
            "stages": [
                { "input": "captured", "effect": "blur", "output": "half" },
                { "input": "half", "binding": "previous", "output": "captured" }
            ]
        }"#;
        let spec = PipelineSpec::from_json(json).unwrap();
        assert_eq!(spec.capture_target.as_deref(), Some("captured"));
        assert_eq!(spec.stages.len(), 2);
        assert_eq!(spec.stages[0].binding, "source");
        assert_eq!(spec.stages[1].binding, "previous");

        let again = PipelineSpec::from_json(&spec.to_json().unwrap()).unwrap();
        assert_eq!(again.stages.len(), 2);
    }

    #[test]
    fn test_apply_resolves_names() {
        let host = MockHost::new((512, 512));
        let queue = TaskQueue::new();
        let pipeline = PostPipeline::new(host.clone(), queue.sender());
        let (surfaces, templates) = registries();

        let spec = PipelineSpec::from_json(
            r#"{
                "capture_target": "captured",
                "stages": [{ "input": "captured", "effect": "blur", "output": "half" }]
            }"#,
        )
        .unwrap();

        let mut state = pipeline.state();
        spec.apply(&mut state, &surfaces, &templates);

        assert!(state.capture.target().is_some());
        assert_eq!(state.chain.len(), 1);
        let stage = state.chain.stage(0).unwrap();
        assert!(stage.input().is_some());
        assert!(stage.template().is_some());
        assert!(stage.output().is_some());
        assert!(state.chain.is_dirty());
    }

    #[test]
    fn test_unknown_names_leave_stage_inactive() {
        let host = MockHost::new((512, 512));
        let (surfaces, templates) = registries();

        let spec = PipelineSpec::from_json(
            r#"{
                "capture_target": "missing",
                "stages": [{ "input": "captured", "effect": "missing_fx", "output": "nowhere" }]
            }"#,
        )
        .unwrap();

        let queue = TaskQueue::new();
        let pipeline = PostPipeline::new(host.clone(), queue.sender());
        let mut state = pipeline.state();
        spec.apply(&mut state, &surfaces, &templates);

        assert!(state.capture.target().is_none());
        let stage = state.chain.stage(0).unwrap();
        assert!(stage.input().is_some());
        assert!(stage.template().is_none());
        assert!(stage.output().is_none());

        // An inactive stage never becomes executable.
        state.chain.prepare(host.as_ref());
        assert!(!state.chain.stage(0).unwrap().is_executable());
    }
}
