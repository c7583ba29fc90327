// SPDX-License-Identifier: LGPL-2.1-or-later
// See Notices.txt for copyright information

//! device and layout dependent lowering

use crate::config::DeviceConfig;
use crate::descriptor_set::PipelineLayout;
use crate::errors::{PipelineError, Result};
use crate::stage::Stage;
use hashbrown::HashMap;
use pipeline_cache::{BindMap, PipelineBinding};
use shader_compiler_ir::{varying_slot, Op, Pass, PassList, Program, Resource, ShaderStage, SystemValue};

/// inputs shared by the lowering passes
#[derive(Copy, Clone, Debug)]
pub struct LowerContext<'a> {
    pub config: &'a DeviceConfig,
    pub view_mask: u32,
    pub use_primitive_replication: bool,
}

impl<'a> LowerContext<'a> {
    pub fn new(config: &'a DeviceConfig) -> Self {
        Self {
            config,
            view_mask: 0,
            use_primitive_replication: false,
        }
    }
}

#[derive(Copy, Clone, Debug, Default)]
pub struct LowerTerminateToDiscard;

impl<'a> Pass<LowerContext<'a>> for LowerTerminateToDiscard {
    fn name(&self) -> &'static str {
        "lower_terminate_to_discard"
    }
    fn run(&self, program: &mut Program, context: &LowerContext<'a>) -> bool {
        if !context.config.lower_terminate_to_discard {
            return false;
        }
        let mut changed = false;
        for instruction in &mut program.instructions {
            if instruction.op == Op::Terminate {
                instruction.op = Op::Discard;
                changed = true;
            }
        }
        changed
    }
}

/// resolve the view index
///
/// without multiview the view index is always 0. With primitive replication
/// the vertex stage writes one position per view instead.
#[derive(Copy, Clone, Debug, Default)]
pub struct LowerMultiview;

impl<'a> Pass<LowerContext<'a>> for LowerMultiview {
    fn name(&self) -> &'static str {
        "lower_multiview"
    }
    fn run(&self, program: &mut Program, context: &LowerContext<'a>) -> bool {
        if context.view_mask == 0 {
            let mut changed = false;
            for instruction in &mut program.instructions {
                if instruction.op == Op::LoadSystemValue(SystemValue::ViewIndex) {
                    instruction.op = Op::Constant(0);
                    changed = true;
                }
            }
            return changed;
        }
        if context.use_primitive_replication && program.stage == ShaderStage::Vertex {
            let pos = varying_slot::bit(varying_slot::POS);
            if program.info.per_view_outputs & pos == 0 {
                program.info.per_view_outputs |= pos;
                return true;
            }
        }
        false
    }
}

/// replace the subgroup size with the device default when workgroups are
/// known to be made of full subgroups
#[derive(Copy, Clone, Debug, Default)]
pub struct FixupSubgroupSize;

impl<'a> Pass<LowerContext<'a>> for FixupSubgroupSize {
    fn name(&self) -> &'static str {
        "fixup_subgroup_size"
    }
    fn run(&self, program: &mut Program, context: &LowerContext<'a>) -> bool {
        if !program.stage.uses_workgroup() {
            return false;
        }
        let config = context.config;
        let assume_full = config.assume_full_subgroups
            || (config.assume_full_subgroups_with_barrier && program.info.uses_barrier)
            || (config.assume_full_subgroups_with_shared_memory
                && program.info.shared_memory_size != 0);
        let subgroup_size = config.limits.default_subgroup_size;
        if !assume_full
            || subgroup_size == 0
            || program.info.workgroup_invocations() % subgroup_size != 0
        {
            return false;
        }
        let mut changed = false;
        for instruction in &mut program.instructions {
            if instruction.op == Op::LoadSystemValue(SystemValue::SubgroupSize) {
                instruction.op = Op::Constant(subgroup_size);
                changed = true;
            }
        }
        changed
    }
}

/// passes run on every freshly loaded program
pub fn preprocess_passes<'p, 'a>() -> PassList<'p, LowerContext<'a>> {
    PassList::new().with(LowerTerminateToDiscard)
}

/// passes run once the pipeline-wide lowering inputs are known
pub fn lowering_passes<'p, 'a>() -> PassList<'p, LowerContext<'a>> {
    PassList::new().with(LowerMultiview).with(FixupSubgroupSize)
}

/// rewrite descriptor accesses against `layout`
///
/// color attachment surfaces already in `bind_map` keep their slots; each
/// descriptor binding gets one surface per array element after them, unless
/// descriptors are fetched indirectly.
pub fn apply_pipeline_layout(
    program: &mut Program,
    layout: &PipelineLayout,
    config: &DeviceConfig,
    bind_map: &mut BindMap,
) -> Result<u32> {
    let mut surfaces: HashMap<(u32, u32), u32> = HashMap::new();
    let mut push_descriptor_mask = 0;
    let stage = program.stage;
    for instruction in &mut program.instructions {
        let resource = match &mut instruction.op {
            Op::Load { resource, .. } | Op::Store { resource, .. } => resource,
            _ => continue,
        };
        let (set, binding) = match *resource {
            Resource::Descriptor { set, binding } => (set, binding),
            _ => continue,
        };
        let set_layout = layout.set_layout(set);
        let descriptor = set_layout.and_then(|v| v.binding(binding)).ok_or_else(|| {
            PipelineError::InvalidUsage(format!(
                "{} shader uses set {} binding {}, which isn't in the pipeline layout",
                stage, set, binding
            ))
        })?;
        let push_descriptor = set_layout.map_or(false, |v| v.push_descriptor);
        if push_descriptor && set < 32 {
            push_descriptor_mask |= 1 << set;
        }
        if config.indirect_descriptors && !push_descriptor && !descriptor.is_dynamic() {
            if let Some(descriptor_offset) = set_layout.and_then(|v| v.descriptor_offset(binding)) {
                *resource = Resource::Indirect {
                    set,
                    descriptor_offset,
                };
                continue;
            }
        }
        let surface = *surfaces.entry((set, binding)).or_insert_with(|| {
            let first = bind_map.surfaces.len() as u32;
            for index in 0..descriptor.count().max(1) {
                bind_map.surfaces.push(PipelineBinding {
                    set,
                    binding,
                    index,
                });
            }
            first
        });
        *resource = Resource::Surface(surface);
    }
    bind_map.push_ranges = layout.push_ranges(stage);
    bind_map.layout_hash = layout.hash();
    Ok(push_descriptor_mask)
}

/// layout lowering followed by the late passes; leaves the program's info current
pub fn lower_stage(
    stage: &mut Stage,
    layout: &PipelineLayout,
    context: &LowerContext,
) -> Result<()> {
    let program = match stage.program.as_deref_mut() {
        Some(program) => program,
        None => return Ok(()),
    };
    stage.push_descriptor_mask =
        apply_pipeline_layout(program, layout, context.config, &mut stage.bind_map)?;
    lowering_passes().run_once(program, context);
    program.gather_info();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor_set::{DescriptorLayout, DescriptorSetLayout};
    use std::sync::Arc;

    fn layout(push_descriptor: bool) -> PipelineLayout {
        PipelineLayout::new(
            vec![Some(Arc::new(DescriptorSetLayout {
                bindings: vec![
                    Some(DescriptorLayout::UniformBuffer { count: 1 }),
                    Some(DescriptorLayout::SampledImage { count: 3 }),
                ],
                push_descriptor,
            }))],
            vec![],
        )
    }

    #[test]
    fn test_apply_pipeline_layout() {
        let mut program = Program::parse(
            "shader fragment \"main\"\n\
             %0 = const 0\n\
             %1 = load descriptor(0,1) %0\n\
             %2 = load descriptor(0,0) %0\n\
             %3 = load descriptor(0,1) %0\n\
             store_output 4 %1\n",
        )
        .unwrap();
        let config = DeviceConfig::default();
        let mut bind_map = BindMap::default();
        let mask = apply_pipeline_layout(&mut program, &layout(false), &config, &mut bind_map)
            .unwrap();
        assert_eq!(mask, 0);
        assert_eq!(bind_map.surfaces.len(), 4);
        assert_eq!(
            program.instructions[1].op,
            Op::Load {
                resource: Resource::Surface(0),
                offset: program.instructions[0].result.unwrap(),
            }
        );
        match program.instructions[2].op {
            Op::Load { resource, .. } => assert_eq!(resource, Resource::Surface(3)),
            ref op => panic!("unexpected op: {:?}", op),
        }
        match program.instructions[3].op {
            Op::Load { resource, .. } => assert_eq!(resource, Resource::Surface(0)),
            ref op => panic!("unexpected op: {:?}", op),
        }
    }

    #[test]
    fn test_indirect_and_push_descriptors() {
        let text = "shader compute \"main\"\n%0 = const 0\n%1 = load descriptor(0,1) %0\n";
        let config = DeviceConfig {
            indirect_descriptors: true,
            ..DeviceConfig::default()
        };
        let mut program = Program::parse(text).unwrap();
        let mut bind_map = BindMap::default();
        apply_pipeline_layout(&mut program, &layout(false), &config, &mut bind_map).unwrap();
        match program.instructions[1].op {
            Op::Load { resource, .. } => assert_eq!(
                resource,
                Resource::Indirect {
                    set: 0,
                    descriptor_offset: 16
                }
            ),
            ref op => panic!("unexpected op: {:?}", op),
        }
        assert!(bind_map.surfaces.is_empty());
        let mut program = Program::parse(text).unwrap();
        let mut bind_map = BindMap::default();
        let mask =
            apply_pipeline_layout(&mut program, &layout(true), &config, &mut bind_map).unwrap();
        assert_eq!(mask, 1);
        assert_eq!(bind_map.surfaces.len(), 3);
    }

    #[test]
    fn test_missing_binding() {
        let mut program = Program::parse(
            "shader compute \"main\"\n%0 = const 0\n%1 = load descriptor(2,0) %0\n",
        )
        .unwrap();
        let error = apply_pipeline_layout(
            &mut program,
            &layout(false),
            &DeviceConfig::default(),
            &mut BindMap::default(),
        )
        .unwrap_err();
        match error {
            PipelineError::InvalidUsage(_) => {}
            error => panic!("unexpected error: {}", error),
        }
    }

    #[test]
    fn test_lowering_passes() {
        let config = DeviceConfig {
            lower_terminate_to_discard: true,
            assume_full_subgroups: true,
            ..DeviceConfig::default()
        };
        let mut context = LowerContext::new(&config);
        let mut program = Program::parse(
            "shader vertex \"main\"\n%0 = load_system_value view_index\nstore_output 8 %0\nterminate\n",
        )
        .unwrap();
        assert!(preprocess_passes().run_once(&mut program, &context));
        assert_eq!(program.instructions[2].op, Op::Discard);
        assert!(lowering_passes().run_once(&mut program, &context));
        assert_eq!(program.instructions[0].op, Op::Constant(0));
        let mut replicated = Program::parse(
            "shader vertex \"main\"\n%0 = load_input 8\nstore_output 0 %0\n",
        )
        .unwrap();
        context.view_mask = 0b11;
        context.use_primitive_replication = true;
        assert!(lowering_passes().run_once(&mut replicated, &context));
        assert_eq!(
            replicated.info.per_view_outputs,
            varying_slot::bit(varying_slot::POS)
        );
        let mut compute = Program::new(ShaderStage::Compute, "main");
        compute.info.workgroup_size = [32, 1, 1];
        compute.push_value(Op::LoadSystemValue(SystemValue::SubgroupSize));
        assert!(FixupSubgroupSize.run(&mut compute, &context));
        assert_eq!(compute.instructions[0].op, Op::Constant(16));
        compute.info.workgroup_size = [24, 1, 1];
        compute.instructions[0].op = Op::LoadSystemValue(SystemValue::SubgroupSize);
        assert!(!FixupSubgroupSize.run(&mut compute, &context));
    }
}
