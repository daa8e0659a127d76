//! Graphics pipeline construction
//!
//! Shader and material assets talk to the GPU only through
//! [`PipelineBackend`], and record binds only through [`PipelineBinder`].

use super::shader::ShaderStage;
use super::{Device, PendingDestroy};
use crate::assets::AssetId;
use crate::foundation::fail::{FailureKind, OrFail};
use ash::vk;
use std::ffi::CStr;
use std::sync::Arc;

const ENTRY_POINT: &CStr = c"main";

/// A pipeline and the layout it was created with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphicsPipeline {
    /// Pipeline layout
    pub layout: vk::PipelineLayout,
    /// Pipeline object
    pub pipeline: vk::Pipeline,
}

/// Creates and retires the GPU objects behind shader and material assets
///
/// Retired objects may still be referenced by frames in flight; implementors
/// must not destroy them before the GPU has finished with them.
pub trait PipelineBackend: Send + Sync + 'static {
    /// Compile `source` and create a shader module
    fn create_shader_module(&self, id: &AssetId, stage: ShaderStage, source: &str) -> vk::ShaderModule;

    /// Release a shader module once no frame uses it
    fn retire_shader_module(&self, module: vk::ShaderModule);

    /// Build the fixed-function triangle pipeline around two modules
    fn create_pipeline(&self, vertex: vk::ShaderModule, fragment: vk::ShaderModule) -> GraphicsPipeline;

    /// Release a pipeline once no frame uses it
    fn retire_pipeline(&self, pipeline: GraphicsPipeline);
}

/// Something that records a pipeline bind into the current frame
pub trait PipelineBinder {
    /// Bind `pipeline` for subsequent draws
    fn bind_graphics_pipeline(&mut self, pipeline: vk::Pipeline);
}

/// Compile GLSL to SPIR-V words for a Vulkan 1.0 target
pub fn compile_glsl(id: &AssetId, stage: ShaderStage, source: &str) -> Vec<u32> {
    let compiler = shaderc::Compiler::new().or_fail(FailureKind::ShaderCompilation, "shaderc is unavailable");
    let mut options =
        shaderc::CompileOptions::new().or_fail(FailureKind::ShaderCompilation, "shaderc options are unavailable");
    options.set_target_env(shaderc::TargetEnv::Vulkan, shaderc::EnvVersion::Vulkan1_0 as u32);
    options.set_optimization_level(shaderc::OptimizationLevel::Performance);

    let artifact = compiler
        .compile_into_spirv(
            source,
            stage.shader_kind(),
            &id.fully_qualified(),
            "main",
            Some(&options),
        )
        .or_fail(FailureKind::ShaderCompilation, format_args!("compiling {id}"));

    if artifact.get_num_warnings() > 0 {
        log::warn!("Shader {} compiled with warnings:\n{}", id, artifact.get_warning_messages());
    }

    artifact.as_binary().to_vec()
}

/// [`PipelineBackend`] that builds real Vulkan objects for one render pass
pub struct VulkanPipelines {
    device: Arc<Device>,
    render_pass: vk::RenderPass,
}

impl VulkanPipelines {
    /// Build pipelines compatible with `render_pass`
    pub fn new(device: &Arc<Device>, render_pass: vk::RenderPass) -> Self {
        Self {
            device: Arc::clone(device),
            render_pass,
        }
    }
}

impl PipelineBackend for VulkanPipelines {
    fn create_shader_module(&self, id: &AssetId, stage: ShaderStage, source: &str) -> vk::ShaderModule {
        let code = compile_glsl(id, stage, source);
        self.device.create_shader_module(&code)
    }

    fn retire_shader_module(&self, module: vk::ShaderModule) {
        self.device.push_to_deletion_queue(PendingDestroy::ShaderModule(module));
    }

    fn create_pipeline(&self, vertex: vk::ShaderModule, fragment: vk::ShaderModule) -> GraphicsPipeline {
        let stages = [
            vk::PipelineShaderStageCreateInfo::builder()
                .stage(ShaderStage::Vertex.flags())
                .module(vertex)
                .name(ENTRY_POINT)
                .build(),
            vk::PipelineShaderStageCreateInfo::builder()
                .stage(ShaderStage::Fragment.flags())
                .module(fragment)
                .name(ENTRY_POINT)
                .build(),
        ];

        // Vertices come from gl_VertexIndex
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::builder();
        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state = vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&dynamic_states);
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewport_count(1)
            .scissor_count(1);

        let rasterization = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(vk::CullModeFlags::BACK)
            .front_face(vk::FrontFace::CLOCKWISE)
            .depth_bias_enable(false);

        let multisample = vk::PipelineMultisampleStateCreateInfo::builder()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1)
            .sample_shading_enable(false);

        let blend_attachments = [vk::PipelineColorBlendAttachmentState::builder()
            .blend_enable(false)
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .build()];
        let color_blend = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .attachments(&blend_attachments);

        let layout = self
            .device
            .create_pipeline_layout(&vk::PipelineLayoutCreateInfo::builder());

        let info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .color_blend_state(&color_blend)
            .dynamic_state(&dynamic_state)
            .layout(layout)
            .render_pass(self.render_pass)
            .subpass(0)
            .build();

        GraphicsPipeline {
            layout,
            pipeline: self.device.create_graphics_pipeline(&info),
        }
    }

    fn retire_pipeline(&self, pipeline: GraphicsPipeline) {
        self.device.push_to_deletion_queue(PendingDestroy::Pipeline(pipeline.pipeline));
        self.device.push_to_deletion_queue(PendingDestroy::PipelineLayout(pipeline.layout));
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use ash::vk::Handle;
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Backend that hands out fake handles and records every call
    #[derive(Default)]
    pub struct CountingBackend {
        next_handle: AtomicU64,
        modules_created: AtomicUsize,
        pipelines_created: AtomicUsize,
        retired_modules: Mutex<Vec<vk::ShaderModule>>,
        retired_pipelines: Mutex<Vec<GraphicsPipeline>>,
    }

    impl CountingBackend {
        fn next(&self) -> u64 {
            self.next_handle.fetch_add(1, Ordering::SeqCst) + 1
        }

        pub fn modules_created(&self) -> usize {
            self.modules_created.load(Ordering::SeqCst)
        }

        pub fn pipelines_created(&self) -> usize {
            self.pipelines_created.load(Ordering::SeqCst)
        }

        pub fn retired_modules(&self) -> Vec<vk::ShaderModule> {
            self.retired_modules.lock().unwrap().clone()
        }

        pub fn retired_pipelines(&self) -> Vec<GraphicsPipeline> {
            self.retired_pipelines.lock().unwrap().clone()
        }
    }

    impl PipelineBackend for CountingBackend {
        fn create_shader_module(&self, _id: &AssetId, _stage: ShaderStage, source: &str) -> vk::ShaderModule {
            assert!(source.contains("void main"));
            self.modules_created.fetch_add(1, Ordering::SeqCst);
            vk::ShaderModule::from_raw(self.next())
        }

        fn retire_shader_module(&self, module: vk::ShaderModule) {
            self.retired_modules.lock().unwrap().push(module);
        }

        fn create_pipeline(&self, vertex: vk::ShaderModule, fragment: vk::ShaderModule) -> GraphicsPipeline {
            assert_ne!(vertex, fragment);
            self.pipelines_created.fetch_add(1, Ordering::SeqCst);
            GraphicsPipeline {
                layout: vk::PipelineLayout::from_raw(self.next()),
                pipeline: vk::Pipeline::from_raw(self.next()),
            }
        }

        fn retire_pipeline(&self, pipeline: GraphicsPipeline) {
            self.retired_pipelines.lock().unwrap().push(pipeline);
        }
    }

    /// Binder that remembers what was bound
    #[derive(Default)]
    pub struct RecordingBinder {
        pub bound: Vec<vk::Pipeline>,
    }

    impl PipelineBinder for RecordingBinder {
        fn bind_graphics_pipeline(&mut self, pipeline: vk::Pipeline) {
            self.bound.push(pipeline);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPIRV_MAGIC: u32 = 0x0723_0203;

    #[test]
    fn test_engine_shaders_compile_to_spirv() {
        for (path, stage) in [
            ("engine:shaders/triangle.vert", ShaderStage::Vertex),
            ("engine:shaders/triangle.frag", ShaderStage::Fragment),
        ] {
            let id = AssetId::parse(path);
            let source = id.read_to_string().unwrap();
            let words = compile_glsl(&id, stage, &source);
            assert_eq!(words.first(), Some(&SPIRV_MAGIC), "{path}");
        }
    }

    #[test]
    #[should_panic(expected = "fatal shader compilation failure: compiling engine:shaders/triangle.frag")]
    fn test_broken_glsl_is_fatal() {
        let id = AssetId::parse("engine:shaders/triangle.frag");
        let _ = compile_glsl(&id, ShaderStage::Fragment, "#version 450\nvoid main() { undeclared = 1.0; }\n");
    }
}
