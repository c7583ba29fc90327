// SPDX-License-Identifier: LGPL-2.1-or-later
// See Notices.txt for copyright information

use crate::descriptor_set::PipelineLayout;
use crate::device::Device;
use crate::errors::{PipelineError, Result};
use crate::executable::add_executables;
use crate::flags::{DynamicStates, PipelineCreateFlags};
use crate::key::KeyBuilder;
use crate::lower::{lower_stage, LowerContext};
use crate::pipeline::{GenericPipeline, GenericPipelineSized, Pipeline, PipelineCore};
use crate::shader_module::ShaderStageCreateInfo;
use crate::stage::Stage;
use crate::stage_compiler::{upload_binaries, PendingUploads, StageCompiler};
use enum_map::EnumMap;
use hashbrown::HashMap;
use log::debug;
use pipeline_cache::{CacheKey, PipelineCache, ShaderBinary};
use sha2::{Digest, Sha256};
use shader_compiler_backend::key::RayFlags;
use shader_compiler_ir::{Program, ShaderStage};
use std::sync::Arc;
use std::time::Instant;
use typed_arena::Arena;

/// stage indices are into `RayTracingPipelineCreateInfo::stages`
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum RayTracingShaderGroup {
    General {
        general: u32,
    },
    TrianglesHit {
        closest_hit: Option<u32>,
        any_hit: Option<u32>,
    },
    ProceduralHit {
        intersection: u32,
        closest_hit: Option<u32>,
        any_hit: Option<u32>,
    },
}

impl RayTracingShaderGroup {
    pub fn kind(&self) -> GroupKind {
        match self {
            RayTracingShaderGroup::General { .. } => GroupKind::General,
            RayTracingShaderGroup::TrianglesHit { .. } => GroupKind::TrianglesHit,
            RayTracingShaderGroup::ProceduralHit { .. } => GroupKind::ProceduralHit,
        }
    }
}

#[derive(Clone, Debug)]
pub struct RayTracingPipelineCreateInfo {
    pub flags: PipelineCreateFlags,
    pub stages: Vec<ShaderStageCreateInfo>,
    pub groups: Vec<RayTracingShaderGroup>,
    pub max_recursion_depth: u32,
    pub layout: Arc<PipelineLayout>,
    pub libraries: Vec<Arc<RayTracingPipeline>>,
    pub dynamic: DynamicStates,
    pub debug_name: Option<String>,
}

impl RayTracingPipelineCreateInfo {
    pub fn new(layout: Arc<PipelineLayout>) -> Self {
        Self {
            flags: PipelineCreateFlags::empty(),
            stages: Vec::new(),
            groups: Vec::new(),
            max_recursion_depth: 1,
            layout,
            libraries: Vec::new(),
            dynamic: DynamicStates::empty(),
            debug_name: None,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum GroupKind {
    General,
    TrianglesHit,
    ProceduralHit,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum GroupShader {
    General,
    ClosestHit,
    AnyHit,
    Intersection,
}

/// a shader group with its binaries
///
/// the any-hit shader of a procedural group is compiled into `intersection`.
#[derive(Clone, Debug)]
pub struct ResolvedShaderGroup {
    pub kind: GroupKind,
    pub general: Option<Arc<ShaderBinary>>,
    pub closest_hit: Option<Arc<ShaderBinary>>,
    pub any_hit: Option<Arc<ShaderBinary>>,
    pub intersection: Option<Arc<ShaderBinary>>,
    /// the group came from a library
    pub imported: bool,
    pub handle: [u8; 32],
}

impl ResolvedShaderGroup {
    fn new(
        kind: GroupKind,
        general: Option<Arc<ShaderBinary>>,
        closest_hit: Option<Arc<ShaderBinary>>,
        any_hit: Option<Arc<ShaderBinary>>,
        intersection: Option<Arc<ShaderBinary>>,
    ) -> Self {
        let mut hasher = Sha256::new();
        hasher.update([kind as u8]);
        for binary in [&general, &closest_hit, &any_hit, &intersection] {
            match binary {
                Some(binary) => {
                    hasher.update([1]);
                    hasher.update(binary.key.to_bytes());
                }
                None => hasher.update([0]),
            }
        }
        Self {
            kind,
            general,
            closest_hit,
            any_hit,
            intersection,
            imported: false,
            handle: hasher.finalize().into(),
        }
    }
    pub fn shader(&self, shader: GroupShader) -> Option<&Arc<ShaderBinary>> {
        match shader {
            GroupShader::General => self.general.as_ref(),
            GroupShader::ClosestHit => self.closest_hit.as_ref(),
            GroupShader::AnyHit => self.any_hit.as_ref(),
            GroupShader::Intersection => self.intersection.as_ref(),
        }
    }
}

#[derive(Debug)]
pub struct RayTracingPipeline {
    core: PipelineCore,
    groups: Vec<ResolvedShaderGroup>,
    binaries: Vec<Arc<ShaderBinary>>,
    stack_size: u32,
    dynamic_stack_size: bool,
}

impl RayTracingPipeline {
    pub fn groups(&self) -> &[ResolvedShaderGroup] {
        &self.groups
    }
    fn group(&self, index: usize) -> Result<&ResolvedShaderGroup> {
        self.groups.get(index).ok_or_else(|| {
            PipelineError::InvalidUsage(format!("shader group index out of range: {}", index))
        })
    }
    /// the opaque handle of group `index`
    pub fn group_handle(&self, index: usize) -> Result<[u8; 32]> {
        Ok(self.group(index)?.handle)
    }
    pub fn group_stack_size(&self, index: usize, shader: GroupShader) -> Result<u32> {
        Ok(self
            .group(index)?
            .shader(shader)
            .map_or(0, |binary| binary.resource_usage.stack_size))
    }
    /// every binary the pipeline references, including imported ones
    pub fn binaries(&self) -> &[Arc<ShaderBinary>] {
        &self.binaries
    }
    /// 0 if the stack size is set dynamically
    pub fn stack_size(&self) -> u32 {
        self.stack_size
    }
    pub fn uses_dynamic_stack_size(&self) -> bool {
        self.dynamic_stack_size
    }
}

impl GenericPipeline for RayTracingPipeline {
    fn core(&self) -> &PipelineCore {
        &self.core
    }
}

/// worst-case stack size for the per-stage-kind maximums in `stack_max`
pub fn ray_tracing_stack_size(stack_max: &EnumMap<ShaderStage, u32>, max_recursion_depth: u32) -> u32 {
    let hit_or_miss = stack_max[ShaderStage::ClosestHit].max(stack_max[ShaderStage::Miss]);
    let any_hit_stage = hit_or_miss
        .max(stack_max[ShaderStage::Intersection])
        .max(stack_max[ShaderStage::AnyHit]);
    // saturates instead of wrapping on absurd recursion depths
    let retval = stack_max[ShaderStage::RayGeneration]
        .saturating_add(max_recursion_depth.min(1) * any_hit_stage)
        .saturating_add(max_recursion_depth.saturating_sub(1).saturating_mul(hit_or_miss))
        .saturating_add(stack_max[ShaderStage::Callable].saturating_mul(2));
    // 0 would read as a dynamic stack size
    retval.max(1)
}

fn ray_flags(flags: PipelineCreateFlags) -> Result<RayFlags> {
    let mut retval = RayFlags::empty();
    if flags.contains(PipelineCreateFlags::RAY_TRACING_SKIP_TRIANGLES) {
        retval |= RayFlags::SKIP_TRIANGLES;
    }
    if flags.contains(PipelineCreateFlags::RAY_TRACING_SKIP_AABBS) {
        retval |= RayFlags::SKIP_AABBS;
    }
    if retval.is_all() {
        return Err(PipelineError::InvalidUsage(
            "RAY_TRACING_SKIP_TRIANGLES and RAY_TRACING_SKIP_AABBS are mutually exclusive".into(),
        ));
    }
    Ok(retval)
}

fn group_stage(
    stages: &[ShaderStageCreateInfo],
    index: u32,
    expected: ShaderStage,
) -> Result<usize> {
    let stage = stages.get(index as usize).ok_or_else(|| {
        PipelineError::InvalidUsage(format!(
            "shader group uses stage {}, but there are only {} stages",
            index,
            stages.len()
        ))
    })?;
    if stage.stage != expected {
        return Err(PipelineError::InvalidUsage(format!(
            "shader group uses stage {} as a {} shader, but it's a {} shader",
            index, expected, stage.stage
        )));
    }
    Ok(index as usize)
}

/// compile units used by one group
#[derive(Copy, Clone, Debug)]
struct GroupUnits {
    kind: GroupKind,
    general: Option<usize>,
    closest_hit: Option<usize>,
    any_hit: Option<usize>,
    intersection: Option<usize>,
}

/// where a compile unit's program comes from
#[derive(Copy, Clone, Debug)]
struct UnitSource {
    stage: usize,
    /// any-hit stage fused into an intersection stage
    any_hit: Option<usize>,
}

fn load_source(
    compiler: &StageCompiler,
    sources: &[Stage],
    programs: &mut [Option<Program>],
    index: usize,
    uploads: &mut PendingUploads,
) -> Result<Program> {
    if let Some(program) = &programs[index] {
        return Ok(program.clone());
    }
    let mut program = compiler.load_program(&sources[index], uploads)?;
    compiler.preprocess(&mut program, false);
    programs[index] = Some(program.clone());
    Ok(program)
}

fn unit_binary(units: &[Stage], unit: Option<usize>) -> Result<Option<Arc<ShaderBinary>>> {
    match unit {
        None => Ok(None),
        Some(unit) => units[unit].binary.clone().map(Some).ok_or_else(|| {
            PipelineError::Unknown(format!("{} unit has no binary", units[unit].stage))
        }),
    }
}

impl GenericPipelineSized for RayTracingPipeline {
    type PipelineCreateInfo = RayTracingPipelineCreateInfo;
    fn create(
        device: &Device,
        pipeline_cache: Option<&PipelineCache>,
        create_info: &RayTracingPipelineCreateInfo,
    ) -> Result<Self> {
        let start = Instant::now();
        let cache = device.cache(pipeline_cache);
        let config = device.config();
        let flags = create_info.flags;
        let layout = &*create_info.layout;
        let ray_flags = ray_flags(flags)?;
        for stage in &create_info.stages {
            if !stage.stage.is_ray_tracing() {
                return Err(PipelineError::InvalidUsage(format!(
                    "{} shader in a ray-tracing pipeline",
                    stage.stage
                )));
            }
        }
        for library in &create_info.libraries {
            if !library.flags().contains(PipelineCreateFlags::LIBRARY) {
                return Err(PipelineError::InvalidUsage(
                    "imported ray-tracing pipeline wasn't created with LIBRARY".into(),
                ));
            }
        }
        debug!("creating ray-tracing pipeline {:?}", create_info.debug_name);

        let arena = Arena::new();
        let keys = KeyBuilder::new(config);
        let sources: Vec<Stage> = create_info
            .stages
            .iter()
            .enumerate()
            .map(|(index, info)| {
                let robust_flags = keys.robust_flags(info.robustness);
                let mut stage = Stage::from_create_info(info, robust_flags, index);
                stage.key = keys.ray_tracing_key(info.stage, robust_flags, ray_flags);
                stage.cache_key = CacheKey {
                    stage: info.stage,
                    hash: keys.ray_tracing_shader_hash(layout, &stage.key, &stage.shader_sha),
                };
                stage
            })
            .collect();
        let stages = &create_info.stages;
        let new_unit = |index: usize| {
            let source = &sources[index];
            let mut unit = Stage::from_create_info(&stages[index], source.robust_flags, index);
            unit.key = source.key.clone();
            unit.cache_key = source.cache_key;
            unit
        };

        // every stage is a compile unit except intersection stages, which
        // are compiled per group, fused with the group's any-hit stage
        let mut units: Vec<Stage> = Vec::new();
        let mut unit_sources: Vec<UnitSource> = Vec::new();
        let mut standalone: HashMap<usize, usize> = HashMap::new();
        let mut fused: HashMap<CacheKey, usize> = HashMap::new();
        for (index, source) in sources.iter().enumerate() {
            if source.stage != ShaderStage::Intersection {
                standalone.insert(index, units.len());
                units.push(new_unit(index));
                unit_sources.push(UnitSource {
                    stage: index,
                    any_hit: None,
                });
            }
        }
        let mut group_units = Vec::with_capacity(create_info.groups.len());
        for group in &create_info.groups {
            let hit_units = |closest_hit: Option<u32>, any_hit: Option<u32>| -> Result<_> {
                let closest_hit = match closest_hit {
                    Some(index) => Some(group_stage(stages, index, ShaderStage::ClosestHit)?),
                    None => None,
                };
                let any_hit = match any_hit {
                    Some(index) => Some(group_stage(stages, index, ShaderStage::AnyHit)?),
                    None => None,
                };
                Ok((closest_hit, any_hit))
            };
            let kind = group.kind();
            let mut units_of_group = GroupUnits {
                kind,
                general: None,
                closest_hit: None,
                any_hit: None,
                intersection: None,
            };
            match *group {
                RayTracingShaderGroup::General { general } => {
                    let index = general as usize;
                    match stages.get(index).map(|v| v.stage) {
                        Some(ShaderStage::RayGeneration)
                        | Some(ShaderStage::Miss)
                        | Some(ShaderStage::Callable) => {}
                        _ => {
                            return Err(PipelineError::InvalidUsage(format!(
                                "general shader group uses stage {}, which isn't a \
                                 ray generation, miss or callable shader",
                                index
                            )))
                        }
                    }
                    units_of_group.general = standalone.get(&index).copied();
                }
                RayTracingShaderGroup::TrianglesHit {
                    closest_hit,
                    any_hit,
                } => {
                    let (closest_hit, any_hit) = hit_units(closest_hit, any_hit)?;
                    units_of_group.closest_hit = closest_hit.and_then(|v| standalone.get(&v).copied());
                    units_of_group.any_hit = any_hit.and_then(|v| standalone.get(&v).copied());
                }
                RayTracingShaderGroup::ProceduralHit {
                    intersection,
                    closest_hit,
                    any_hit,
                } => {
                    let intersection = group_stage(stages, intersection, ShaderStage::Intersection)?;
                    let (closest_hit, any_hit) = hit_units(closest_hit, any_hit)?;
                    units_of_group.closest_hit = closest_hit.and_then(|v| standalone.get(&v).copied());
                    let source = &sources[intersection];
                    units_of_group.intersection = match any_hit {
                        None => match standalone.get(&intersection) {
                            Some(&unit) => Some(unit),
                            None => {
                                standalone.insert(intersection, units.len());
                                units.push(new_unit(intersection));
                                unit_sources.push(UnitSource {
                                    stage: intersection,
                                    any_hit: None,
                                });
                                Some(units.len() - 1)
                            }
                        },
                        Some(any_hit) => {
                            let any_hit_source = &sources[any_hit];
                            let cache_key = CacheKey {
                                stage: ShaderStage::Intersection,
                                hash: keys.ray_tracing_combined_hash(
                                    layout,
                                    (&source.key, &source.shader_sha),
                                    (&any_hit_source.key, &any_hit_source.shader_sha),
                                ),
                            };
                            match fused.get(&cache_key) {
                                Some(&unit) => Some(unit),
                                None => {
                                    fused.insert(cache_key, units.len());
                                    let mut unit = new_unit(intersection);
                                    unit.cache_key = cache_key;
                                    units.push(unit);
                                    unit_sources.push(UnitSource {
                                        stage: intersection,
                                        any_hit: Some(any_hit),
                                    });
                                    Some(units.len() - 1)
                                }
                            }
                        }
                    };
                }
            }
            group_units.push(units_of_group);
        }

        let capture = flags.contains(PipelineCreateFlags::CAPTURE_INTERNAL_REPRESENTATIONS);
        if !capture {
            for unit in &mut units {
                let lookup_start = Instant::now();
                unit.binary = cache.lookup_binary(&unit.cache_key);
                unit.feedback.cache_hit = unit.binary.is_some();
                unit.feedback.duration += lookup_start.elapsed();
            }
        }
        let found_all = units.iter().all(|unit| unit.binary.is_some());
        if !found_all {
            if flags.contains(PipelineCreateFlags::FAIL_ON_PIPELINE_COMPILE_REQUIRED) {
                return Err(PipelineError::CompileRequired);
            }
            let compiler = StageCompiler::new(device, cache, flags, layout);
            let context = LowerContext::new(config);
            let mut uploads = PendingUploads::default();
            let mut programs: Vec<Option<Program>> = vec![None; sources.len()];
            for (unit, source) in units.iter_mut().zip(&unit_sources) {
                if unit.binary.is_some() {
                    continue;
                }
                let unit_start = Instant::now();
                let mut program =
                    load_source(&compiler, &sources, &mut programs, source.stage, &mut uploads)?;
                if let Some(any_hit) = source.any_hit {
                    let any_hit =
                        load_source(&compiler, &sources, &mut programs, any_hit, &mut uploads)?;
                    let instructions = program.import_instructions(&any_hit);
                    program.instructions.extend(instructions);
                    program.gather_info();
                }
                unit.program = Some(arena.alloc(program));
                lower_stage(unit, layout, &context)?;
                unit.binary = Some(compiler.compile(unit)?);
                unit.feedback.duration += unit_start.elapsed();
            }
            uploads.commit(cache);
            if !capture {
                upload_binaries(cache, &mut units);
            }
        }

        let mut core = PipelineCore::new(flags, create_info.layout.clone());
        let mut binaries = Vec::with_capacity(units.len());
        for unit in 0..units.len() {
            if let Some(binary) = unit_binary(&units, Some(unit))? {
                core.account(&binary);
                add_executables(&mut core.executables, &binary);
                binaries.push(binary);
            }
        }
        let mut groups = Vec::with_capacity(group_units.len());
        for group in &group_units {
            groups.push(ResolvedShaderGroup::new(
                group.kind,
                unit_binary(&units, group.general)?,
                unit_binary(&units, group.closest_hit)?,
                unit_binary(&units, group.any_hit)?,
                unit_binary(&units, group.intersection)?,
            ));
        }

        let dynamic_stack_size = create_info
            .dynamic
            .contains(DynamicStates::RAY_TRACING_STACK_SIZE);
        let stack_size = if dynamic_stack_size {
            0
        } else {
            let mut stack_max: EnumMap<ShaderStage, u32> = EnumMap::default();
            for binary in &binaries {
                let max = &mut stack_max[binary.stage];
                *max = (*max).max(binary.resource_usage.stack_size);
            }
            ray_tracing_stack_size(&stack_max, create_info.max_recursion_depth)
        };

        for library in &create_info.libraries {
            groups.extend(library.groups.iter().cloned().map(|mut group| {
                group.imported = true;
                group
            }));
            for binary in &library.binaries {
                core.account(binary);
                binaries.push(binary.clone());
            }
            core.executables
                .extend(library.executables().iter().cloned());
        }

        core.record_stage_feedback(&units);
        if core.feedback.stages.len() < sources.len() {
            core.feedback.stages.resize(sources.len(), Default::default());
        }
        core.finish(start, found_all);
        Ok(Self {
            core,
            groups,
            binaries,
            stack_size,
            dynamic_stack_size,
        })
    }
    fn create_flags(create_info: &RayTracingPipelineCreateInfo) -> PipelineCreateFlags {
        create_info.flags
    }
    fn to_pipeline(self) -> Pipeline {
        Pipeline::RayTracing(Arc::new(self))
    }
}
