// SPDX-License-Identifier: LGPL-2.1-or-later
// See Notices.txt for copyright information

//! pipeline creation: keys, cache lookup, linking, compiling and libraries

mod compute;
mod config;
mod descriptor_set;
mod device;
mod errors;
mod executable;
mod flags;
mod graphics;
mod key;
mod library;
mod link;
mod lower;
mod pipeline;
mod ray_tracing;
mod shader_module;
mod stage;
mod stage_compiler;
mod stage_set;
mod state;

pub use crate::compute::{ComputePipeline, ComputePipelineCreateInfo};
pub use crate::config::DeviceConfig;
pub use crate::descriptor_set::{
    DescriptorLayout, DescriptorSetLayout, PipelineLayout, PushConstantRange,
    COLOR_ATTACHMENT_SET, COLOR_OUTPUT_DISABLED, COLOR_OUTPUT_UNUSED,
};
pub use crate::device::Device;
pub use crate::errors::{PipelineError, Result};
pub use crate::executable::{
    ExecutableStatistic, InternalRepresentation, PipelineExecutable, StatisticValue,
};
pub use crate::flags::{DynamicStates, PipelineCreateFlags};
pub use crate::graphics::{GraphicsPipeline, GraphicsPipelineCreateInfo, GraphicsShader};
pub use crate::key::{HashedStage, KeyBuilder};
pub use crate::library::GraphicsLibraryPipeline;
pub use crate::link::{link_varyings, unify_interfaces};
pub use crate::lower::{apply_pipeline_layout, LowerContext};
pub use crate::pipeline::{
    create_pipelines, CreationFeedback, GenericPipeline, GenericPipelineSized, Pipeline,
    PipelineCore, PipelineCreationFeedback,
};
pub use crate::ray_tracing::{
    ray_tracing_stack_size, GroupKind, GroupShader, RayTracingPipeline,
    RayTracingPipelineCreateInfo, RayTracingShaderGroup, ResolvedShaderGroup,
};
pub use crate::shader_module::{
    IrTextTranslator, ShaderModule, ShaderSource, ShaderStageCreateInfo, ShaderTranslator,
    TranslateError,
};
pub use crate::stage_set::ShaderStageSet;
pub use crate::state::{
    FragmentShadingRateState, GraphicsPipelineState, MultisampleState, RasterizationState,
    RenderPassState, TessellationState,
};
pub use pipeline_cache;
pub use shader_compiler_backend;
pub use shader_compiler_ir;
