// SPDX-License-Identifier: LGPL-2.1-or-later
// See Notices.txt for copyright information

use crate::descriptor_set::PipelineLayout;
use crate::device::Device;
use crate::errors::{PipelineError, Result};
use crate::executable::add_executables;
use crate::flags::PipelineCreateFlags;
use crate::key::{HashedStage, KeyBuilder};
use crate::library::{GraphicsLibraryPipeline, LibraryImports};
use crate::link::{link_backward, unify_interfaces};
use crate::lower::{lower_stage, LowerContext};
use crate::pipeline::{GenericPipeline, GenericPipelineSized, Pipeline, PipelineCore};
use crate::shader_module::ShaderStageCreateInfo;
use crate::stage::Stage;
use crate::stage_compiler::{upload_binaries, PendingUploads, StageCompiler};
use crate::stage_set::ShaderStageSet;
use crate::state::GraphicsPipelineState;
use log::{debug, warn};
use pipeline_cache::{CacheKey, PipelineCache, ShaderBinary};
use shader_compiler_backend::key::{RobustFlags, VueLayout};
use shader_compiler_backend::StageKey;
use shader_compiler_ir::{varying_slot, Op, Program, ShaderInfo, ShaderStage};
use std::sync::Arc;
use std::time::Instant;
use typed_arena::Arena;

const MAX_VIEWS_FOR_PRIMITIVE_REPLICATION: u32 = 16;

#[derive(Clone, Debug)]
pub struct GraphicsPipelineCreateInfo {
    pub flags: PipelineCreateFlags,
    pub stages: Vec<ShaderStageCreateInfo>,
    pub state: GraphicsPipelineState,
    pub layout: Arc<PipelineLayout>,
    pub libraries: Vec<Arc<GraphicsLibraryPipeline>>,
    /// not part of any cache key
    pub debug_name: Option<String>,
}

impl GraphicsPipelineCreateInfo {
    pub fn new(layout: Arc<PipelineLayout>) -> Self {
        Self {
            flags: PipelineCreateFlags::empty(),
            stages: Vec::new(),
            state: GraphicsPipelineState::default(),
            layout,
            libraries: Vec::new(),
            debug_name: None,
        }
    }
}

/// a stage of a finished graphics pipeline or library
#[derive(Clone, Debug)]
pub struct GraphicsShader {
    pub stage: ShaderStage,
    pub binary: Arc<ShaderBinary>,
    pub shader_sha: [u8; 32],
    pub robust_flags: RobustFlags,
    /// index into the owning pipeline's per-stage creation feedback
    pub feedback_index: usize,
    /// only kept by libraries created with `RETAIN_LINK_TIME_OPTIMIZATION_INFO`
    pub retained_program: Option<Arc<Program>>,
}

/// what graphics pipelines and graphics libraries have in common
#[derive(Debug)]
pub struct GraphicsBase {
    pub(crate) core: PipelineCore,
    pub(crate) state: GraphicsPipelineState,
    /// in pipeline stage order
    pub(crate) shaders: Vec<GraphicsShader>,
}

impl GraphicsBase {
    pub fn state(&self) -> &GraphicsPipelineState {
        &self.state
    }
    pub fn shaders(&self) -> &[GraphicsShader] {
        &self.shaders
    }
    pub fn shader(&self, stage: ShaderStage) -> Option<&GraphicsShader> {
        self.shaders.iter().find(|shader| shader.stage == stage)
    }
}

#[derive(Debug)]
pub struct GraphicsPipeline {
    base: GraphicsBase,
}

impl GraphicsPipeline {
    pub fn state(&self) -> &GraphicsPipelineState {
        self.base.state()
    }
    pub fn shaders(&self) -> &[GraphicsShader] {
        self.base.shaders()
    }
    pub fn shader(&self, stage: ShaderStage) -> Option<&GraphicsShader> {
        self.base.shader(stage)
    }
}

impl GenericPipeline for GraphicsPipeline {
    fn core(&self) -> &PipelineCore {
        &self.base.core
    }
}

impl GenericPipelineSized for GraphicsPipeline {
    type PipelineCreateInfo = GraphicsPipelineCreateInfo;
    fn create(
        device: &Device,
        pipeline_cache: Option<&PipelineCache>,
        create_info: &GraphicsPipelineCreateInfo,
    ) -> Result<Self> {
        if create_info.flags.contains(PipelineCreateFlags::LIBRARY) {
            return Err(PipelineError::InvalidUsage(
                "graphics libraries are created as GraphicsLibraryPipeline".into(),
            ));
        }
        let base = assemble(
            device,
            device.cache(pipeline_cache),
            create_info,
            create_info.flags,
            false,
        )?;
        Ok(Self { base })
    }
    fn create_flags(create_info: &GraphicsPipelineCreateInfo) -> PipelineCreateFlags {
        create_info.flags
    }
    fn to_pipeline(self) -> Pipeline {
        Pipeline::Graphics(self)
    }
}

/// use the binaries already in the cache if every stage is there
///
/// a partial hit means the cache is inconsistent: every hit is dropped and
/// the whole pipeline is compiled.
fn load_cached_shaders(cache: &PipelineCache, stages: &mut [Stage]) -> bool {
    let mut cache_hits = 0;
    for stage in stages.iter_mut().filter(|stage| stage.binary.is_none()) {
        let start = Instant::now();
        if let Some(binary) = cache.lookup_binary(&stage.cache_key) {
            stage.binary = Some(binary);
            stage.feedback.cache_hit = true;
            cache_hits += 1;
        }
        stage.feedback.duration += start.elapsed();
    }
    if stages.iter().all(|stage| stage.binary.is_some()) {
        return true;
    }
    if cache_hits > 0 {
        warn!(
            "found a partial pipeline in the cache. This is most likely \
             caused by an incomplete pipeline cache import or export"
        );
        for stage in stages.iter_mut().filter(|stage| stage.feedback.cache_hit) {
            stage.binary = None;
            stage.feedback.cache_hit = false;
        }
    }
    false
}

/// primitive replication replaces instancing for multiview when only the
/// vertex stage runs before rasterization and it doesn't read the view index
fn use_primitive_replication(
    device: &Device,
    stages: &[Stage],
    active_stages: ShaderStageSet,
    view_mask: u32,
) -> bool {
    if !device.config().primitive_replication
        || view_mask == 0
        || view_mask.count_ones() > MAX_VIEWS_FOR_PRIMITIVE_REPLICATION
    {
        return false;
    }
    let pre_raster_only_vertex = active_stages.iter().all(|stage| {
        stage == ShaderStage::Vertex || stage == ShaderStage::Fragment
    });
    pre_raster_only_vertex
        && stages.iter().any(|stage| {
            stage.stage == ShaderStage::Vertex
                && stage
                    .program
                    .as_deref()
                    .map_or(false, |program| !program.info.uses_view_index())
        })
}

/// make the last pre-rasterization stage write a primitive shading rate
fn force_primitive_shading_rate(stages: &mut [Stage]) {
    let last = stages
        .iter_mut()
        .rev()
        .find(|stage| stage.stage != ShaderStage::Fragment);
    let program = match last {
        Some(stage) if stage.stage.can_set_fragment_shading_rate() => {
            match stage.program.as_deref_mut() {
                Some(program) => program,
                None => return,
            }
        }
        _ => return,
    };
    let slot = varying_slot::PRIMITIVE_SHADING_RATE;
    if program.info.outputs_written & varying_slot::bit(slot) != 0 {
        return;
    }
    // 0 is a 1x1 rate
    let value = program.push_value(Op::Constant(0));
    program.push(Op::StoreOutput { slot, value });
    program.gather_info();
}

/// thread the interface of the previous compiled stage into `stage`'s key
fn thread_interface(stage: &mut Stage, prev_info: Option<&ShaderInfo>, prev_output_slots: Option<u64>) {
    let own_info = stage.program.as_deref().map(|program| program.info.clone());
    match &mut stage.key {
        StageKey::TessellationControl(key) => {
            if let Some(info) = own_info {
                key.outputs_written = info.outputs_written;
                key.patch_outputs_written = info.patch_outputs_written;
            }
        }
        StageKey::TessellationEvaluation(key) => {
            if let Some(prev_info) = prev_info {
                key.inputs_read = prev_info.outputs_written;
                key.patch_inputs_read = prev_info.patch_outputs_written;
            }
        }
        StageKey::Fragment(key) => {
            if let Some(slots) = prev_output_slots {
                key.input_slots_valid = slots;
            }
        }
        _ => {}
    }
}

/// build a graphics pipeline or library
///
/// `flags` replaces `create_info.flags`, libraries always have `LIBRARY` set.
pub(crate) fn assemble(
    device: &Device,
    cache: &PipelineCache,
    create_info: &GraphicsPipelineCreateInfo,
    flags: PipelineCreateFlags,
    retain: bool,
) -> Result<GraphicsBase> {
    let start = Instant::now();
    let config = device.config();
    let link_time_optimize = flags.contains(PipelineCreateFlags::LINK_TIME_OPTIMIZATION);
    let capture = flags.contains(PipelineCreateFlags::CAPTURE_INTERNAL_REPRESENTATIONS);
    let arena = Arena::new();

    let mut imports = LibraryImports::new(&create_info.layout, &create_info.state);
    for library in &create_info.libraries {
        imports.import(library, link_time_optimize)?;
    }
    let LibraryImports {
        layout,
        state,
        shaders: imported_shaders,
        executables: imported_executables,
        feedback_count: imported_count,
        ..
    } = imports;
    let keys = KeyBuilder::new(config);

    let mut stages: Vec<Stage> = Vec::new();
    for shader in &imported_shaders {
        let mut stage = Stage::new(shader.stage, shader.shader_sha, shader.robust_flags);
        stage.feedback_index = shader.feedback_index;
        stage.retained_program = shader.retained_program.clone();
        if !link_time_optimize {
            stage.imported_binary = Some(shader.binary.clone());
            stage.binary = Some(shader.binary.clone());
        }
        stages.push(stage);
    }
    let imported_stage_count = stages.len();
    for (index, stage_info) in create_info.stages.iter().enumerate() {
        if !stage_info.stage.is_graphics() {
            return Err(PipelineError::InvalidUsage(format!(
                "{} shader in a graphics pipeline",
                stage_info.stage
            )));
        }
        if stages[..imported_stage_count]
            .iter()
            .any(|stage| stage.stage == stage_info.stage)
        {
            debug!(
                "{} stage provided by a library, ignoring the create info's",
                stage_info.stage
            );
            continue;
        }
        if stages[imported_stage_count..]
            .iter()
            .any(|stage| stage.stage == stage_info.stage)
        {
            return Err(PipelineError::InvalidUsage(format!(
                "{} stage specified twice",
                stage_info.stage
            )));
        }
        stages.push(Stage::from_create_info(
            stage_info,
            keys.robust_flags(stage_info.robustness),
            imported_count + index,
        ));
    }
    stages.sort_by_key(|stage| stage.stage.graphics_order_index());
    let active_stages: ShaderStageSet = stages.iter().map(|stage| stage.stage).collect();

    // every stage gets a key, cached or not
    let vue_layout = keys.vue_layout(flags);
    for stage in &mut stages {
        stage.key = keys.graphics_stage_key(
            stage.stage,
            stage.robust_flags,
            vue_layout,
            &state,
            active_stages,
        );
    }
    let view_mask = state.view_mask();
    let hash = {
        let hashed: Vec<HashedStage> = stages
            .iter()
            .map(|stage| HashedStage {
                stage: stage.stage,
                key: &stage.key,
                shader_sha: &stage.shader_sha,
            })
            .collect();
        keys.graphics_hash(&layout, view_mask, &hashed)
    };
    for stage in &mut stages {
        stage.cache_key = CacheKey {
            stage: stage.stage,
            hash,
        };
    }
    debug!(
        "creating graphics {} {:?} with stages {:?}",
        if flags.contains(PipelineCreateFlags::LIBRARY) {
            "library"
        } else {
            "pipeline"
        },
        create_info.debug_name,
        active_stages
    );

    let compiler = StageCompiler::new(device, cache, flags, &layout);
    let mut found_all = !capture && load_cached_shaders(cache, &mut stages);
    if found_all && retain {
        // a retaining library needs programs even for cached binaries
        let programs: Option<Vec<Program>> = stages
            .iter()
            .map(|stage| compiler.lookup_program(stage))
            .collect();
        match programs {
            Some(programs) => {
                for (stage, mut program) in stages.iter_mut().zip(programs) {
                    compiler.preprocess(&mut program, vue_layout != VueLayout::Fixed);
                    stage.retained_program = Some(Arc::new(program));
                }
            }
            None => {
                warn!("retained programs missing from the cache, recompiling the pipeline");
                found_all = false;
                for stage in stages.iter_mut().filter(|stage| stage.feedback.cache_hit) {
                    stage.binary = None;
                    stage.feedback.cache_hit = false;
                }
            }
        }
    }

    if !found_all {
        if flags.contains(PipelineCreateFlags::FAIL_ON_PIPELINE_COMPILE_REQUIRED) {
            return Err(PipelineError::CompileRequired);
        }
        let mut uploads = PendingUploads::default();
        for stage in stages.iter_mut().filter(|stage| stage.binary.is_none()) {
            let stage_start = Instant::now();
            let mut program = compiler.load_program(stage, &mut uploads)?;
            compiler.preprocess(&mut program, vue_layout != VueLayout::Fixed);
            if retain {
                stage.retained_program = Some(Arc::new(program.clone()));
            }
            stage.program = Some(arena.alloc(program));
            stage.feedback.duration += stage_start.elapsed();
        }

        let rp_color_mask = match &state.render_pass {
            Some(rp) if !rp.color_attachments.is_empty() => rp.color_mask(),
            _ => 0xff,
        };
        link_backward(&mut stages, rp_color_mask)?;

        let context = LowerContext {
            config,
            view_mask,
            use_primitive_replication: use_primitive_replication(
                device,
                &stages,
                active_stages,
                view_mask,
            ),
        };
        if config.fragment_shading_rate
            && config.coarse_pixel_primitive
            && stages.iter().any(|stage| match &stage.key {
                StageKey::Fragment(key) => key.coarse_pixel,
                _ => false,
            })
        {
            force_primitive_shading_rate(&mut stages);
        }

        for index in 0..stages.len() {
            if !stages[index].is_compiling() {
                continue;
            }
            let stage_start = Instant::now();
            lower_stage(&mut stages[index], &layout, &context)?;
            // only unify with the adjacent active stage, and only if it is compiled here too
            if index > 0 {
                let (head, tail) = stages.split_at_mut(index);
                let consumer_stage = tail[0].stage;
                if let (Some(producer), Some(consumer)) = (
                    head[index - 1].program.as_deref_mut(),
                    tail[0].program.as_deref_mut(),
                ) {
                    match consumer_stage {
                        ShaderStage::TessellationControl
                        | ShaderStage::TessellationEvaluation
                        | ShaderStage::Geometry => unify_interfaces(producer, consumer),
                        _ => {}
                    }
                }
            }
            stages[index].feedback.duration += stage_start.elapsed();
        }

        let mut prev_info: Option<ShaderInfo> = None;
        let mut prev_output_slots: Option<u64> = None;
        for stage in stages.iter_mut() {
            if !stage.is_compiling() {
                if let Some(binary) = &stage.binary {
                    prev_output_slots = Some(binary.resource_usage.output_slots_valid);
                }
                prev_info = None;
                continue;
            }
            let stage_start = Instant::now();
            thread_interface(stage, prev_info.as_ref(), prev_output_slots);
            let binary = compiler.compile(stage)?;
            prev_output_slots = Some(binary.resource_usage.output_slots_valid);
            prev_info = stage.program.as_deref().map(|program| program.info.clone());
            stage.binary = Some(binary);
            stage.feedback.duration += stage_start.elapsed();
        }

        // nothing reaches the cache unless every stage compiled
        uploads.commit(cache);
        if !capture {
            upload_binaries(cache, &mut stages);
        }
    }

    let mut core = PipelineCore::new(flags, Arc::new(layout));
    core.executables = imported_executables;
    let mut shaders = Vec::with_capacity(stages.len());
    for stage in &stages {
        let binary = stage.binary.clone().ok_or_else(|| {
            PipelineError::Unknown(format!("{} stage has no binary", stage.stage))
        })?;
        core.account(&binary);
        if stage.imported_binary.is_none() {
            add_executables(&mut core.executables, &binary);
        }
        shaders.push(GraphicsShader {
            stage: stage.stage,
            binary,
            shader_sha: stage.shader_sha,
            robust_flags: stage.robust_flags,
            feedback_index: stage.feedback_index,
            retained_program: if retain {
                stage.retained_program.clone()
            } else {
                None
            },
        });
    }
    core.record_stage_feedback(&stages);
    let feedback_len = imported_count + create_info.stages.len();
    if core.feedback.stages.len() < feedback_len {
        core.feedback.stages.resize(feedback_len, Default::default());
    }
    core.finish(start, found_all);
    Ok(GraphicsBase {
        core,
        state,
        shaders,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceConfig;
    use pipeline_cache::BindMap;
    use shader_compiler_backend::ResourceUsage;

    fn binary(stage: ShaderStage, hash: [u8; 32]) -> Arc<ShaderBinary> {
        Arc::new(ShaderBinary {
            key: CacheKey { stage, hash },
            stage,
            code: vec![1, 2, 3],
            resource_usage: ResourceUsage::default(),
            statistics: Vec::new(),
            bind_map: BindMap::default(),
            push_descriptor_mask: 0,
            source_hash: 0,
            ir_text: None,
            disassembly: None,
        })
    }

    fn stage<'a>(stage: ShaderStage, hash: [u8; 32]) -> Stage<'a> {
        let mut retval = Stage::new(stage, [0; 32], RobustFlags::empty());
        retval.cache_key = CacheKey { stage, hash };
        retval
    }

    #[test]
    fn test_load_cached_shaders() {
        let cache = PipelineCache::new(DeviceConfig::default().cache_header());
        let mut stages = vec![
            stage(ShaderStage::Vertex, [1; 32]),
            stage(ShaderStage::Fragment, [1; 32]),
        ];
        assert!(!load_cached_shaders(&cache, &mut stages));
        cache.insert_binary(binary(ShaderStage::Vertex, [1; 32]));
        assert!(!load_cached_shaders(&cache, &mut stages));
        assert!(stages.iter().all(|stage| stage.binary.is_none()));
        assert!(stages.iter().all(|stage| !stage.feedback.cache_hit));
        cache.insert_binary(binary(ShaderStage::Fragment, [1; 32]));
        assert!(load_cached_shaders(&cache, &mut stages));
        assert!(stages.iter().all(|stage| stage.feedback.cache_hit));
    }

    #[test]
    fn test_imported_binary_counts_as_found() {
        let cache = PipelineCache::new(DeviceConfig::default().cache_header());
        let mut stages = vec![
            stage(ShaderStage::Vertex, [2; 32]),
            stage(ShaderStage::Fragment, [2; 32]),
        ];
        let imported = binary(ShaderStage::Vertex, [3; 32]);
        stages[0].imported_binary = Some(imported.clone());
        stages[0].binary = Some(imported);
        assert!(!load_cached_shaders(&cache, &mut stages));
        assert!(stages[0].binary.is_some());
        cache.insert_binary(binary(ShaderStage::Fragment, [2; 32]));
        assert!(load_cached_shaders(&cache, &mut stages));
        assert!(!stages[0].feedback.cache_hit);
    }

    #[test]
    fn test_force_primitive_shading_rate() {
        let mut vs = Program::parse("shader vertex \"main\"\n%0 = const 1\nstore_output 0 %0\n")
            .unwrap();
        let mut tes = Program::new(ShaderStage::TessellationEvaluation, "main");
        {
            let mut stages = vec![stage(ShaderStage::Vertex, [0; 32])];
            stages[0].program = Some(&mut vs);
            force_primitive_shading_rate(&mut stages);
        }
        assert_ne!(
            vs.info.outputs_written & varying_slot::bit(varying_slot::PRIMITIVE_SHADING_RATE),
            0
        );
        let mut stages = vec![stage(ShaderStage::TessellationEvaluation, [0; 32])];
        stages[0].program = Some(&mut tes);
        force_primitive_shading_rate(&mut stages);
        drop(stages);
        assert!(tes.instructions.is_empty());
    }
}
