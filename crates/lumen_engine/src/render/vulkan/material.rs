//! Material assets: a vertex/fragment shader pair and the pipeline built from them
//!
//! A material follows its shaders' reloads lazily. A shader reload only marks
//! the material dirty. The rebuild is deferred out of the reload broadcast and
//! into the next recorded frame, where [`Material::bind`] performs it before
//! binding.

use super::pipeline::{GraphicsPipeline, PipelineBackend, PipelineBinder};
use super::shader::{Shader, ShaderStage};
use crate::assets::toml_asset::parse_document;
use crate::assets::{Asset, AssetCore, AssetId, AssetRegistry, LoadAsset, ReloadSubscription};
use crate::foundation::fail::{FailureKind, OrFail};
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Deserialize)]
struct MaterialDocument {
    vert_shader: AssetId,
    frag_shader: AssetId,
}

/// Where a material is in its build/rebuild cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterialStatus {
    /// No pipeline has been built
    Unloaded,
    /// The pipeline matches the current shaders
    Loaded,
    /// A shader changed; the pipeline is rebuilt on the next bind
    Dirty,
}

struct ShaderBinding<B: PipelineBackend> {
    shader: Arc<Shader<B>>,
    subscription: ReloadSubscription,
}

impl<B: PipelineBackend> ShaderBinding<B> {
    fn release(self) {
        self.shader.deregister_reload_callback(self.subscription);
    }
}

struct MaterialState<B: PipelineBackend> {
    vertex: Option<ShaderBinding<B>>,
    fragment: Option<ShaderBinding<B>>,
    pipeline: Option<GraphicsPipeline>,
}

/// A graphics pipeline described by a TOML document
///
/// ```toml
/// vert_shader = "engine:shaders/triangle.vert"
/// frag_shader = "engine:shaders/triangle.frag"
/// ```
pub struct Material<B: PipelineBackend> {
    core: AssetCore,
    registry: Arc<AssetRegistry>,
    backend: Arc<B>,
    dirty: Arc<AtomicBool>,
    state: Mutex<MaterialState<B>>,
}

impl<B: PipelineBackend> Material<B> {
    fn state(&self) -> MutexGuard<'_, MaterialState<B>> {
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Current build state
    pub fn status(&self) -> MaterialStatus {
        if self.state().pipeline.is_none() {
            MaterialStatus::Unloaded
        } else if self.dirty.load(Ordering::Acquire) {
            MaterialStatus::Dirty
        } else {
            MaterialStatus::Loaded
        }
    }

    /// The shader currently used for `stage`
    pub fn shader(&self, stage: ShaderStage) -> Option<Arc<Shader<B>>> {
        let state = self.state();
        let binding = match stage {
            ShaderStage::Vertex => state.vertex.as_ref(),
            ShaderStage::Fragment => state.fragment.as_ref(),
        };
        binding.map(|binding| Arc::clone(&binding.shader))
    }

    /// Rebuild if a shader changed, then bind the pipeline into `binder`
    pub fn bind(&self, binder: &mut impl PipelineBinder) {
        if self.dirty.load(Ordering::Acquire) {
            self.reload();
        }

        let pipeline = self
            .state()
            .pipeline
            .or_fail(FailureKind::Gpu, format_args!("material {} has no pipeline", self.core.id()));
        binder.bind_graphics_pipeline(pipeline.pipeline);
    }

    /// Point `slot` at `id`, re-subscribing only when the shader actually changes
    fn rebind_shader(&self, slot: &mut Option<ShaderBinding<B>>, id: AssetId, stage: ShaderStage) -> Arc<Shader<B>> {
        if let Some(binding) = slot.as_ref().filter(|binding| *binding.shader.id() == id) {
            return Arc::clone(&binding.shader);
        }

        if let Some(previous) = slot.take() {
            previous.release();
        }

        let shader = Shader::load_as(&self.registry, id, &self.backend, stage);
        let dirty = Arc::clone(&self.dirty);
        let subscription = shader.register_reload_callback(Arc::new(move || {
            dirty.store(true, Ordering::Release);
        }));
        *slot = Some(ShaderBinding {
            shader: Arc::clone(&shader),
            subscription,
        });
        shader
    }
}

impl<B: PipelineBackend> Asset for Material<B> {
    fn core(&self) -> &AssetCore {
        &self.core
    }

    fn load(&self) {
        let document: MaterialDocument = parse_document(self.core.id());

        let mut guard = self.state();
        let state = &mut *guard;
        let vertex = self.rebind_shader(&mut state.vertex, document.vert_shader, ShaderStage::Vertex);
        let fragment = self.rebind_shader(&mut state.fragment, document.frag_shader, ShaderStage::Fragment);

        if let Some(previous) = state.pipeline.take() {
            self.backend.retire_pipeline(previous);
        }
        state.pipeline = Some(self.backend.create_pipeline(vertex.module(), fragment.module()));
        self.dirty.store(false, Ordering::Release);

        log::info!(
            "Built pipeline for material {} ({} + {})",
            self.core.id(),
            vertex.id(),
            fragment.id()
        );
    }
}

impl<B: PipelineBackend> LoadAsset for Material<B> {
    type Context = Arc<B>;

    fn create(registry: &Arc<AssetRegistry>, id: AssetId, backend: Arc<B>) -> Self {
        let material = Self {
            core: AssetCore::new(id),
            registry: Arc::clone(registry),
            backend,
            dirty: Arc::new(AtomicBool::new(false)),
            state: Mutex::new(MaterialState {
                vertex: None,
                fragment: None,
                pipeline: None,
            }),
        };
        Asset::load(&material);
        material
    }
}

impl<B: PipelineBackend> Drop for Material<B> {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(binding) = state.vertex.take() {
            binding.release();
        }
        if let Some(binding) = state.fragment.take() {
            binding.release();
        }
        if let Some(pipeline) = state.pipeline.take() {
            self.backend.retire_pipeline(pipeline);
        }
    }
}
