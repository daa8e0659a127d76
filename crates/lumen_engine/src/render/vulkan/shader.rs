//! Shader assets: GLSL source compiled to a shader module at load time

use super::pipeline::PipelineBackend;
use crate::assets::{Asset, AssetCore, AssetId, AssetRegistry, LoadAsset};
use crate::foundation::fail::{fail, FailureKind, OrFail};
use ash::vk;
use std::sync::{Arc, Mutex, MutexGuard};

/// Programmable pipeline stage a shader runs in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    /// Vertex shader
    Vertex,
    /// Fragment shader
    Fragment,
}

impl ShaderStage {
    /// Stage implied by a conventional file extension (`vert`, `frag`)
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension {
            "vert" => Some(Self::Vertex),
            "frag" => Some(Self::Fragment),
            _ => None,
        }
    }

    /// Vulkan stage flag
    pub const fn flags(self) -> vk::ShaderStageFlags {
        match self {
            Self::Vertex => vk::ShaderStageFlags::VERTEX,
            Self::Fragment => vk::ShaderStageFlags::FRAGMENT,
        }
    }

    /// shaderc compilation kind
    pub const fn shader_kind(self) -> shaderc::ShaderKind {
        match self {
            Self::Vertex => shaderc::ShaderKind::Vertex,
            Self::Fragment => shaderc::ShaderKind::Fragment,
        }
    }
}

/// A GLSL shader and the module compiled from it
///
/// Reloading recompiles the source; the previous module is retired through
/// the backend so in-flight frames can finish with it.
pub struct Shader<B: PipelineBackend> {
    core: AssetCore,
    backend: Arc<B>,
    stage: ShaderStage,
    module: Mutex<Option<vk::ShaderModule>>,
}

impl<B: PipelineBackend> Shader<B> {
    /// Load `id` as a `stage` shader through `registry`
    ///
    /// Fails if the registry already holds `id` compiled for another stage.
    #[track_caller]
    pub fn load_as(registry: &Arc<AssetRegistry>, id: AssetId, backend: &Arc<B>, stage: ShaderStage) -> Arc<Self> {
        let shader = registry.load_with::<Self>(id, (Arc::clone(backend), stage));
        if shader.stage != stage {
            fail(
                FailureKind::AssetTypeMismatch,
                format_args!("{} is loaded as a {:?} shader, requested {:?}", shader.id(), shader.stage, stage),
            );
        }
        shader
    }

    fn module_slot(&self) -> MutexGuard<'_, Option<vk::ShaderModule>> {
        self.module.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// The stage this shader was compiled for
    pub const fn stage(&self) -> ShaderStage {
        self.stage
    }

    /// The current shader module
    pub fn module(&self) -> vk::ShaderModule {
        self.module_slot()
            .or_fail(FailureKind::ShaderCompilation, format_args!("{} has no module", self.core.id()))
    }
}

impl<B: PipelineBackend> Asset for Shader<B> {
    fn core(&self) -> &AssetCore {
        &self.core
    }

    fn load(&self) {
        let id = self.core.id();
        let source = id.read_to_string().or_fail(FailureKind::AssetMissing, "reading shader source");

        let mut slot = self.module_slot();
        if let Some(previous) = slot.take() {
            self.backend.retire_shader_module(previous);
        }
        *slot = Some(self.backend.create_shader_module(id, self.stage, &source));
        log::debug!("Compiled {:?} shader {}", self.stage, id);
    }
}

impl<B: PipelineBackend> LoadAsset for Shader<B> {
    type Context = (Arc<B>, ShaderStage);

    fn create(_registry: &Arc<AssetRegistry>, id: AssetId, (backend, stage): (Arc<B>, ShaderStage)) -> Self {
        let shader = Self {
            core: AssetCore::new(id),
            backend,
            stage,
            module: Mutex::new(None),
        };
        Asset::load(&shader);
        shader
    }
}

impl<B: PipelineBackend> Drop for Shader<B> {
    fn drop(&mut self) {
        if let Some(module) = self.module_slot().take() {
            self.backend.retire_shader_module(module);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::vulkan::pipeline::testing::CountingBackend;

    const VERTEX: &str = "engine:shaders/triangle.vert";

    #[test]
    fn test_stage_from_extension() {
        assert_eq!(ShaderStage::from_extension("vert"), Some(ShaderStage::Vertex));
        assert_eq!(ShaderStage::from_extension("frag"), Some(ShaderStage::Fragment));
        assert_eq!(ShaderStage::from_extension("comp"), None);
        assert_eq!(ShaderStage::Fragment.flags(), vk::ShaderStageFlags::FRAGMENT);
    }

    #[test]
    fn test_reload_retires_previous_module() {
        let registry = AssetRegistry::new();
        let backend = Arc::new(CountingBackend::default());
        let shader = Shader::load_as(&registry, AssetId::parse(VERTEX), &backend, ShaderStage::Vertex);
        let first = shader.module();
        assert_eq!(backend.modules_created(), 1);

        shader.reload();
        assert_eq!(backend.modules_created(), 2);
        assert_ne!(shader.module(), first);
        assert_eq!(backend.retired_modules(), vec![first]);

        let second = shader.module();
        drop(shader);
        assert_eq!(backend.retired_modules(), vec![first, second]);
    }

    #[test]
    fn test_same_id_and_stage_shares_instance() {
        let registry = AssetRegistry::new();
        let backend = Arc::new(CountingBackend::default());
        let a = Shader::load_as(&registry, AssetId::parse(VERTEX), &backend, ShaderStage::Vertex);
        let b = Shader::load_as(&registry, AssetId::parse(VERTEX), &backend, ShaderStage::Vertex);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(backend.modules_created(), 1);
    }

    #[test]
    #[should_panic(expected = "fatal asset type mismatch failure")]
    fn test_stage_mismatch_is_fatal() {
        let registry = AssetRegistry::new();
        let backend = Arc::new(CountingBackend::default());
        let _vertex = Shader::load_as(&registry, AssetId::parse(VERTEX), &backend, ShaderStage::Vertex);
        let _ = Shader::load_as(&registry, AssetId::parse(VERTEX), &backend, ShaderStage::Fragment);
    }
}
