// SPDX-License-Identifier: LGPL-2.1-or-later
// See Notices.txt for copyright information

use crate::descriptor_set::PipelineLayout;
use crate::device::Device;
use crate::errors::{PipelineError, Result};
use crate::flags::PipelineCreateFlags;
use crate::lower::{preprocess_passes, LowerContext};
use crate::stage::Stage;
use log::debug;
use pipeline_cache::{CacheKey, CachedProgram, PipelineCache, ShaderBinary};
use shader_compiler_backend::{
    CompileRequest, CompilerIndependentConfig, OptimizationMode,
};
use shader_compiler_ir::opt::optimization_passes;
use shader_compiler_ir::Program;
use std::sync::Arc;

/// cache writes held back until every stage of a pipeline has compiled
#[derive(Debug, Default)]
pub struct PendingUploads {
    programs: Vec<Arc<CachedProgram>>,
}

impl PendingUploads {
    pub fn add_program(&mut self, key: CacheKey, program: &Program) {
        self.programs.push(Arc::new(CachedProgram {
            key,
            program: program.clone(),
        }));
    }
    pub fn commit(self, cache: &PipelineCache) {
        for program in self.programs {
            cache.insert_program(program);
        }
    }
}

/// compiles single stages; shared by every pipeline kind
pub struct StageCompiler<'a> {
    device: &'a Device,
    cache: &'a PipelineCache,
    flags: PipelineCreateFlags,
    layout: &'a PipelineLayout,
}

impl<'a> StageCompiler<'a> {
    pub fn new(
        device: &'a Device,
        cache: &'a PipelineCache,
        flags: PipelineCreateFlags,
        layout: &'a PipelineLayout,
    ) -> Self {
        Self {
            device,
            cache,
            flags,
            layout,
        }
    }
    fn program_key(stage: &Stage) -> CacheKey {
        CacheKey {
            stage: stage.stage,
            hash: stage.shader_sha,
        }
    }
    /// the stage's intermediate program: retained, cached or freshly translated
    pub fn load_program(&self, stage: &Stage, uploads: &mut PendingUploads) -> Result<Program> {
        if let Some(retained) = &stage.retained_program {
            return Ok((**retained).clone());
        }
        let key = Self::program_key(stage);
        if let Some(cached) = self.cache.lookup_program(&key) {
            debug!("{} program found in cache", stage.stage);
            return Ok(cached.program.clone());
        }
        let create_info = stage.create_info.ok_or_else(|| {
            PipelineError::Unknown(format!(
                "unable to load intermediate program: no source for {} stage",
                stage.stage
            ))
        })?;
        let module = create_info
            .module()
            .ok_or(PipelineError::CompileRequired)?;
        let program = self
            .device
            .translator()
            .translate(module, stage.stage, &create_info.entry_point, self.layout)
            .map_err(|e| {
                PipelineError::Unknown(format!("unable to load intermediate program: {}", e))
            })?;
        uploads.add_program(key, &program);
        Ok(program)
    }
    /// the stage's program, only if it's already in the program cache
    pub fn lookup_program(&self, stage: &Stage) -> Option<Program> {
        if let Some(retained) = &stage.retained_program {
            return Some((**retained).clone());
        }
        self.cache
            .lookup_program(&Self::program_key(stage))
            .map(|cached| cached.program.clone())
    }
    /// device-level clean up shared by every stage kind
    pub fn preprocess(&self, program: &mut Program, separate_shader: bool) {
        program.info.separate_shader = separate_shader;
        preprocess_passes().run_once(program, &LowerContext::new(self.device.config()));
        program.gather_info();
    }
    fn optimize(&self) -> bool {
        !self.flags.contains(PipelineCreateFlags::DISABLE_OPTIMIZATION)
            && self.device.config().optimization_mode != OptimizationMode::NoOptimizations
    }
    /// optimize and compile the stage's lowered program
    ///
    /// the result isn't inserted into the cache.
    pub fn compile(&self, stage: &mut Stage) -> Result<Arc<ShaderBinary>> {
        let config = self.device.config();
        let program = stage.program.as_deref_mut().ok_or_else(|| {
            PipelineError::Unknown(format!("{} stage has no program to compile", stage.stage))
        })?;
        if self.optimize() {
            let outcome = optimization_passes::<()>().run_to_fixed_point(
                program,
                &(),
                config.max_optimization_iterations,
            );
            if !outcome.converged {
                debug!(
                    "{}: optimization stopped after {} iterations",
                    stage.stage, outcome.iterations
                );
            }
        }
        let capture = self
            .flags
            .contains(PipelineCreateFlags::CAPTURE_INTERNAL_REPRESENTATIONS);
        let ir_text = if capture {
            Some(program.to_string())
        } else {
            None
        };
        let compiler_config = CompilerIndependentConfig {
            optimization_mode: if self.optimize() {
                config.optimization_mode
            } else {
                OptimizationMode::NoOptimizations
            },
            capture_disassembly: capture,
        };
        let compiled = self
            .device
            .compiler()
            .compile(&CompileRequest {
                program,
                key: &stage.key,
                limits: &config.limits,
                config: &compiler_config,
                source_hash: stage.source_hash,
            })
            .map_err(|failure| {
                if failure.message.is_empty() {
                    PipelineError::OutOfMemory
                } else {
                    PipelineError::Backend {
                        stage: stage.stage,
                        message: failure.message,
                    }
                }
            })?;
        let usage = &compiled.resource_usage;
        if usage.scratch_size > config.limits.max_scratch_size
            || usage.shared_memory_size > config.limits.max_workgroup_memory
        {
            return Err(PipelineError::OutOfMemory);
        }
        debug!(
            "compiled {} shader with {}: {} instructions, {} bytes of code",
            stage.stage,
            self.device.compiler().name(),
            program.instructions.len(),
            compiled.code.len()
        );
        Ok(Arc::new(ShaderBinary {
            key: stage.cache_key,
            stage: stage.stage,
            code: compiled.code,
            resource_usage: compiled.resource_usage,
            statistics: compiled.statistics,
            bind_map: stage.bind_map.clone(),
            push_descriptor_mask: stage.push_descriptor_mask,
            source_hash: stage.source_hash,
            ir_text,
            disassembly: compiled.disassembly,
        }))
    }
}

/// insert the stages compiled in this call, adopting whichever copy wins
pub fn upload_binaries(cache: &PipelineCache, stages: &mut [Stage]) {
    for stage in stages.iter_mut().filter(|v| v.is_compiling()) {
        if let Some(binary) = stage.binary.take() {
            stage.binary = Some(cache.insert_binary(binary));
        }
    }
}
