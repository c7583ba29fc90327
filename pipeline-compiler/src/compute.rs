// SPDX-License-Identifier: LGPL-2.1-or-later
// See Notices.txt for copyright information

use crate::descriptor_set::PipelineLayout;
use crate::device::Device;
use crate::errors::{PipelineError, Result};
use crate::executable::add_executables;
use crate::flags::PipelineCreateFlags;
use crate::key::KeyBuilder;
use crate::lower::{lower_stage, LowerContext};
use crate::pipeline::{GenericPipeline, GenericPipelineSized, Pipeline, PipelineCore};
use crate::shader_module::ShaderStageCreateInfo;
use crate::stage::Stage;
use crate::stage_compiler::{upload_binaries, PendingUploads, StageCompiler};
use log::debug;
use pipeline_cache::{CacheKey, PipelineCache, ShaderBinary};
use shader_compiler_ir::ShaderStage;
use std::slice;
use std::sync::Arc;
use std::time::Instant;
use typed_arena::Arena;

#[derive(Clone, Debug)]
pub struct ComputePipelineCreateInfo {
    pub flags: PipelineCreateFlags,
    pub stage: ShaderStageCreateInfo,
    pub layout: Arc<PipelineLayout>,
    pub debug_name: Option<String>,
}

#[derive(Debug)]
pub struct ComputePipeline {
    core: PipelineCore,
    binary: Arc<ShaderBinary>,
}

impl ComputePipeline {
    pub fn binary(&self) -> &Arc<ShaderBinary> {
        &self.binary
    }
    pub fn workgroup_memory_size(&self) -> u32 {
        self.binary.resource_usage.shared_memory_size
    }
}

impl GenericPipeline for ComputePipeline {
    fn core(&self) -> &PipelineCore {
        &self.core
    }
}

impl GenericPipelineSized for ComputePipeline {
    type PipelineCreateInfo = ComputePipelineCreateInfo;
    fn create(
        device: &Device,
        pipeline_cache: Option<&PipelineCache>,
        create_info: &ComputePipelineCreateInfo,
    ) -> Result<Self> {
        let start = Instant::now();
        let cache = device.cache(pipeline_cache);
        let config = device.config();
        let flags = create_info.flags;
        let layout = &*create_info.layout;
        if create_info.stage.stage != ShaderStage::Compute {
            return Err(PipelineError::InvalidUsage(format!(
                "{} shader in a compute pipeline",
                create_info.stage.stage
            )));
        }
        let arena = Arena::new();
        let keys = KeyBuilder::new(config);
        let robust_flags = keys.robust_flags(create_info.stage.robustness);
        let mut stage = Stage::from_create_info(&create_info.stage, robust_flags, 0);
        stage.key = keys.compute_key(robust_flags);
        stage.cache_key = CacheKey {
            stage: ShaderStage::Compute,
            hash: keys.compute_hash(layout, &stage.key, &stage.shader_sha),
        };
        debug!("creating compute pipeline {:?}", create_info.debug_name);

        let capture = flags.contains(PipelineCreateFlags::CAPTURE_INTERNAL_REPRESENTATIONS);
        if !capture {
            let lookup_start = Instant::now();
            stage.binary = cache.lookup_binary(&stage.cache_key);
            stage.feedback.cache_hit = stage.binary.is_some();
            stage.feedback.duration += lookup_start.elapsed();
        }
        if stage.binary.is_none() {
            if flags.contains(PipelineCreateFlags::FAIL_ON_PIPELINE_COMPILE_REQUIRED) {
                return Err(PipelineError::CompileRequired);
            }
            let stage_start = Instant::now();
            let compiler = StageCompiler::new(device, cache, flags, layout);
            let mut uploads = PendingUploads::default();
            let mut program = compiler.load_program(&stage, &mut uploads)?;
            compiler.preprocess(&mut program, false);
            stage.program = Some(arena.alloc(program));
            lower_stage(&mut stage, layout, &LowerContext::new(config))?;
            stage.binary = Some(compiler.compile(&mut stage)?);
            uploads.commit(cache);
            if !capture {
                upload_binaries(cache, slice::from_mut(&mut stage));
            }
            stage.feedback.duration += stage_start.elapsed();
        }
        let binary = stage.binary.clone().ok_or_else(|| {
            PipelineError::Unknown("compute stage has no binary".into())
        })?;

        let mut core = PipelineCore::new(flags, create_info.layout.clone());
        core.account(&binary);
        add_executables(&mut core.executables, &binary);
        core.record_stage_feedback(slice::from_ref(&stage));
        core.finish(start, stage.feedback.cache_hit);
        Ok(Self { core, binary })
    }
    fn create_flags(create_info: &ComputePipelineCreateInfo) -> PipelineCreateFlags {
        create_info.flags
    }
    fn to_pipeline(self) -> Pipeline {
        Pipeline::Compute(self)
    }
}
