// SPDX-License-Identifier: LGPL-2.1-or-later
// See Notices.txt for copyright information

#![allow(dead_code)]

use enum_map::EnumMap;
use parking_lot::Mutex;
use pipeline_compiler::shader_compiler_backend::{
    CompileFailure, CompileRequest, CompileStatistics, CompiledShader, Compiler, ResourceUsage,
};
use pipeline_compiler::shader_compiler_ir::ShaderStage;
use pipeline_compiler::{
    Device, DeviceConfig, GraphicsPipelineCreateInfo, GraphicsPipelineState, MultisampleState,
    PipelineLayout, RasterizationState, RenderPassState, ShaderModule, ShaderStageCreateInfo,
};
use std::sync::Arc;

pub const VERTEX: &str = "shader vertex \"main\"\n\
                          %0 = load_input 16\n\
                          store_output 0 %0\n\
                          store_output 8 %0\n";
pub const FRAGMENT: &str = "shader fragment \"main\"\n\
                            %0 = load_input 8\n\
                            store_output 4 %0\n";
pub const COMPUTE: &str = "shader compute \"main\"\n\
                           .workgroup_size 64 1 1\n\
                           .shared_memory 256\n\
                           %0 = const 4\n\
                           %1 = load shared %0\n\
                           barrier\n\
                           store shared %0 %1\n";

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// deterministic stand-in for a real code generator
#[derive(Debug, Default)]
pub struct FakeCompiler {
    fail_stage: Mutex<Option<ShaderStage>>,
    invocations: Mutex<Vec<ShaderStage>>,
    stack_sizes: Mutex<EnumMap<ShaderStage, u32>>,
}

impl FakeCompiler {
    pub fn fail_on(&self, stage: Option<ShaderStage>) {
        *self.fail_stage.lock() = stage;
    }
    pub fn set_stack_size(&self, stage: ShaderStage, stack_size: u32) {
        self.stack_sizes.lock()[stage] = stack_size;
    }
    pub fn invocations(&self) -> Vec<ShaderStage> {
        self.invocations.lock().clone()
    }
    pub fn invocation_count(&self) -> usize {
        self.invocations.lock().len()
    }
    pub fn count(&self, stage: ShaderStage) -> usize {
        self.invocations
            .lock()
            .iter()
            .filter(|&&v| v == stage)
            .count()
    }
}

impl Compiler for FakeCompiler {
    fn name(&self) -> &'static str {
        "fake"
    }
    fn compile(&self, request: &CompileRequest) -> Result<CompiledShader, CompileFailure> {
        let program = request.program;
        let stage = program.stage;
        self.invocations.lock().push(stage);
        if *self.fail_stage.lock() == Some(stage) {
            return Err(CompileFailure::new(format!("{} shader rejected", stage)));
        }
        let mut code = request.key.to_bytes();
        code.extend_from_slice(program.to_string().as_bytes());
        let widths: Vec<u8> = if stage == ShaderStage::Fragment {
            request.limits.simd_widths.clone()
        } else {
            request.limits.simd_widths.iter().copied().take(1).collect()
        };
        let max_dispatch_width = widths.iter().copied().max().unwrap_or(0);
        let statistics = widths
            .iter()
            .map(|&dispatch_width| CompileStatistics {
                dispatch_width,
                instructions: program.instructions.len() as u32,
                cycles: 2 * program.instructions.len() as u32,
                max_live_registers: program.value_count(),
                max_dispatch_width,
                ..CompileStatistics::default()
            })
            .collect();
        Ok(CompiledShader {
            code,
            resource_usage: ResourceUsage {
                shared_memory_size: program.info.shared_memory_size,
                stack_size: self.stack_sizes.lock()[stage],
                ray_queries: program.info.ray_queries,
                output_slots_valid: program.info.outputs_written,
                ..ResourceUsage::default()
            },
            statistics,
            disassembly: if request.config.capture_disassembly {
                Some(format!("; {} shader, {} bytes\n", stage, program.instructions.len()))
            } else {
                None
            },
        })
    }
}

pub fn device_with(config: DeviceConfig) -> (Device, Arc<FakeCompiler>) {
    init_logging();
    let compiler = Arc::new(FakeCompiler::default());
    (Device::new(config, compiler.clone()), compiler)
}

pub fn device() -> (Device, Arc<FakeCompiler>) {
    device_with(DeviceConfig::default())
}

pub fn stage(stage: ShaderStage, text: &str) -> ShaderStageCreateInfo {
    ShaderStageCreateInfo::new(stage, Arc::new(ShaderModule::new(text)))
}

pub fn layout() -> Arc<PipelineLayout> {
    Arc::new(PipelineLayout::default())
}

pub fn state(samples: u32) -> GraphicsPipelineState {
    GraphicsPipelineState {
        rasterization: Some(RasterizationState::default()),
        multisample: Some(MultisampleState {
            rasterization_samples: samples,
            ..MultisampleState::default()
        }),
        render_pass: Some(RenderPassState {
            view_mask: 0,
            color_attachments: vec![true],
        }),
        ..GraphicsPipelineState::default()
    }
}

pub fn graphics_info(stages: Vec<ShaderStageCreateInfo>) -> GraphicsPipelineCreateInfo {
    GraphicsPipelineCreateInfo {
        stages,
        state: state(1),
        ..GraphicsPipelineCreateInfo::new(layout())
    }
}

pub fn vertex_fragment() -> GraphicsPipelineCreateInfo {
    graphics_info(vec![
        stage(ShaderStage::Vertex, VERTEX),
        stage(ShaderStage::Fragment, FRAGMENT),
    ])
}
