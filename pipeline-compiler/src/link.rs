// SPDX-License-Identifier: LGPL-2.1-or-later
// See Notices.txt for copyright information

//! cross-stage interface linking
//!
//! only adjacent active stages compiled in the same call are linked with
//! each other; a stage imported from a library keeps the interface it was
//! compiled with, and so do its neighbours' sides of that interface.

use crate::descriptor_set::{COLOR_ATTACHMENT_SET, COLOR_OUTPUT_DISABLED, COLOR_OUTPUT_UNUSED};
use crate::errors::Result;
use crate::key::last_bit;
use crate::stage::Stage;
use pipeline_cache::PipelineBinding;
use shader_compiler_backend::key::Sometimes;
use shader_compiler_backend::StageKey;
use shader_compiler_ir::{fragment_result, varying_slot, Op, Program, ShaderStage};

const TESS_LEVELS: u64 = (1 << varying_slot::TESS_LEVEL_OUTER) | (1 << varying_slot::TESS_LEVEL_INNER);

fn is_generic_varying(slot: u32) -> bool {
    slot >= varying_slot::VAR0
}

/// drop producer varyings the consumer never reads, and read 0 for
/// consumer varyings the producer never writes
pub fn link_varyings(producer: &mut Program, consumer: &mut Program) {
    let read = consumer.info.inputs_read;
    let written = producer.info.outputs_written;
    producer.instructions.retain(|instruction| match instruction.op {
        Op::StoreOutput { slot, .. } if is_generic_varying(slot) => {
            read & varying_slot::bit(slot) != 0
        }
        _ => true,
    });
    for instruction in &mut consumer.instructions {
        if let Op::LoadInput { slot } = instruction.op {
            if is_generic_varying(slot) && written & varying_slot::bit(slot) == 0 {
                instruction.op = Op::Constant(0);
            }
        }
    }
    producer.gather_info();
    consumer.gather_info();
}

fn link_tcs(tcs: &mut Stage, tes: &mut Stage) -> Result<()> {
    let (tcs_program, tes_program) = match (tcs.program.as_deref_mut(), tes.program.as_deref_mut()) {
        (Some(tcs_program), Some(tes_program)) => (tcs_program, tes_program),
        _ => return Ok(()),
    };
    link_varyings(tcs_program, tes_program);
    let tess = tcs_program.info.tess.merge(&tes_program.info.tess)?;
    tcs_program.info.tess = tess;
    tes_program.info.tess = tess;
    if let StageKey::TessellationControl(key) = &mut tcs.key {
        key.tes_primitive_mode = tess.primitive_mode;
    }
    Ok(())
}

/// work out which render targets the fragment stage really writes
///
/// the color attachment surfaces are the first entries of the bind map.
fn link_fs(stage: &mut Stage, rp_color_mask: u8) {
    let program = match stage.program.as_deref_mut() {
        Some(program) => program,
        None => return,
    };
    let key = match &mut stage.key {
        StageKey::Fragment(key) => key,
        _ => return,
    };
    // stores to attachments the render pass doesn't have go nowhere
    program.instructions.retain(|instruction| match instruction.op {
        Op::StoreOutput { slot, .. } if slot >= fragment_result::DATA0 => {
            let rt = slot - fragment_result::DATA0;
            rt < fragment_result::MAX_COLOR_ATTACHMENTS && rp_color_mask & (1 << rt) != 0
        }
        _ => true,
    });
    program.gather_info();
    let written = (program.info.outputs_written >> fragment_result::DATA0) as u8;
    key.color_outputs_valid = written & rp_color_mask;
    key.nr_color_regions = last_bit(key.color_outputs_valid);
    let surfaces = &mut stage.bind_map.surfaces;
    surfaces.clear();
    if key.nr_color_regions > 0 {
        for rt in 0..u32::from(key.nr_color_regions) {
            let index = if key.color_outputs_valid & (1 << rt) != 0 {
                rt
            } else {
                COLOR_OUTPUT_UNUSED
            };
            surfaces.push(PipelineBinding {
                set: COLOR_ATTACHMENT_SET,
                binding: u32::MAX,
                index,
            });
        }
    } else if key.alpha_to_coverage != Sometimes::Never
        || program.info.outputs_written & varying_slot::bit(fragment_result::SAMPLE_MASK) != 0
        || program.info.uses_discard
    {
        // the hardware needs a render target to discard or mask against
        key.color_outputs_valid = 1;
        key.nr_color_regions = 1;
        surfaces.push(PipelineBinding {
            set: COLOR_ATTACHMENT_SET,
            binding: u32::MAX,
            index: COLOR_OUTPUT_DISABLED,
        });
    }
}

/// last to first over all active stages, which must be in pipeline order
///
/// stages without a program are imported and pass through untouched.
pub fn link_backward(stages: &mut [Stage], rp_color_mask: u8) -> Result<()> {
    for index in (0..stages.len()).rev() {
        let (head, tail) = stages.split_at_mut(index + 1);
        let stage = &mut head[index];
        let next = tail.first_mut();
        match (stage.stage, next) {
            (ShaderStage::Fragment, _) => link_fs(stage, rp_color_mask),
            (ShaderStage::TessellationControl, Some(next))
                if next.stage == ShaderStage::TessellationEvaluation =>
            {
                link_tcs(stage, next)?
            }
            // task to mesh goes through the task payload
            (ShaderStage::Task, _) => {}
            (_, Some(next)) => {
                if let (Some(producer), Some(consumer)) =
                    (stage.program.as_deref_mut(), next.program.as_deref_mut())
                {
                    link_varyings(producer, consumer);
                }
            }
            (_, None) => {}
        }
    }
    Ok(())
}

/// make both sides of an interface declare the union of what either uses
pub fn unify_interfaces(producer: &mut Program, consumer: &mut Program) {
    producer.info.outputs_written |= consumer.info.inputs_read & !TESS_LEVELS;
    consumer.info.inputs_read |= producer.info.outputs_written & !TESS_LEVELS;
    producer.info.patch_outputs_written |= consumer.info.patch_inputs_read;
    consumer.info.patch_inputs_read |= producer.info.patch_outputs_written;
}

#[cfg(test)]
mod tests {
    use super::*;
    use shader_compiler_backend::key::{BaseKey, RobustFlags};
    use shader_compiler_ir::TessPrimitiveMode;

    fn stage<'a>(program: &'a mut Program) -> Stage<'a> {
        let mut retval = Stage::new(program.stage, [0; 32], RobustFlags::empty());
        retval.key = StageKey::new(program.stage, BaseKey::default());
        retval.program = Some(program);
        retval
    }

    #[test]
    fn test_link_varyings() {
        let mut vs = Program::parse(
            "shader vertex \"main\"\n%0 = const 1\nstore_output 0 %0\nstore_output 8 %0\nstore_output 9 %0\n",
        )
        .unwrap();
        let mut fs = Program::parse(
            "shader fragment \"main\"\n%0 = load_input 9\n%1 = load_input 10\nstore_output 4 %1\n",
        )
        .unwrap();
        link_varyings(&mut vs, &mut fs);
        assert_eq!(
            vs.info.outputs_written,
            varying_slot::bit(0) | varying_slot::bit(9)
        );
        assert_eq!(fs.info.inputs_read, varying_slot::bit(9));
        assert_eq!(fs.instructions[1].op, Op::Constant(0));
    }

    #[test]
    fn test_link_fs() {
        let mut fs = Program::parse(
            "shader fragment \"main\"\n%0 = const 1\nstore_output 4 %0\nstore_output 6 %0\nstore_output 7 %0\n",
        )
        .unwrap();
        let mut fs_stage = stage(&mut fs);
        link_fs(&mut fs_stage, 0b101);
        match &fs_stage.key {
            StageKey::Fragment(key) => {
                assert_eq!(key.color_outputs_valid, 0b101);
                assert_eq!(key.nr_color_regions, 3);
            }
            key => panic!("wrong key: {:?}", key),
        }
        let indices: Vec<u32> = fs_stage.bind_map.surfaces.iter().map(|v| v.index).collect();
        assert_eq!(indices, vec![0, COLOR_OUTPUT_UNUSED, 2]);
        drop(fs_stage);
        assert_eq!(fs.instructions.len(), 3);
    }

    #[test]
    fn test_link_fs_null_render_target() {
        let mut fs = Program::parse("shader fragment \"main\"\ndiscard\n").unwrap();
        let mut fs_stage = stage(&mut fs);
        link_fs(&mut fs_stage, 0xff);
        assert_eq!(fs_stage.bind_map.surfaces.len(), 1);
        assert_eq!(fs_stage.bind_map.surfaces[0].index, COLOR_OUTPUT_DISABLED);
        let mut empty = Program::parse("shader fragment \"main\"\n").unwrap();
        let mut empty_stage = stage(&mut empty);
        if let StageKey::Fragment(key) = &mut empty_stage.key {
            key.alpha_to_coverage = Sometimes::Never;
        }
        link_fs(&mut empty_stage, 0xff);
        assert!(empty_stage.bind_map.surfaces.is_empty());
    }

    #[test]
    fn test_link_tessellation() {
        let mut tcs = Program::parse(
            "shader tess_ctrl \"main\"\n.tess_vertices_out 3\n%0 = const 1\nstore_output 8 %0\n",
        )
        .unwrap();
        let mut tes = Program::parse(
            "shader tess_eval \"main\"\n.tess_primitive_mode triangles\n%0 = load_input 8\nstore_output 0 %0\n",
        )
        .unwrap();
        let mut stages = vec![stage(&mut tcs), stage(&mut tes)];
        link_backward(&mut stages, 0xff).unwrap();
        match &stages[0].key {
            StageKey::TessellationControl(key) => {
                assert_eq!(key.tes_primitive_mode, TessPrimitiveMode::Triangles)
            }
            key => panic!("wrong key: {:?}", key),
        }
        drop(stages);
        assert_eq!(tcs.info.tess.vertices_out, 3);
        assert_eq!(tcs.info.tess.primitive_mode, TessPrimitiveMode::Triangles);
    }

    #[test]
    fn test_link_tessellation_conflict() {
        let mut tcs = Program::parse(
            "shader tess_ctrl \"main\"\n.tess_primitive_mode quads\n",
        )
        .unwrap();
        let mut tes = Program::parse(
            "shader tess_eval \"main\"\n.tess_primitive_mode isolines\n",
        )
        .unwrap();
        let mut stages = vec![stage(&mut tcs), stage(&mut tes)];
        assert!(link_backward(&mut stages, 0xff).is_err());
    }

    #[test]
    fn test_link_around_imported_stage() {
        let mut vs = Program::parse(
            "shader vertex \"main\"\n%0 = const 1\nstore_output 0 %0\nstore_output 8 %0\nstore_output 9 %0\n",
        )
        .unwrap();
        let mut fs = Program::parse(
            "shader fragment \"main\"\n%0 = load_input 8\n%1 = load_input 9\nstore_output 4 %1\n",
        )
        .unwrap();
        // the geometry stage comes from a library, so it has no program here
        let gs = Stage::new(ShaderStage::Geometry, [0; 32], RobustFlags::empty());
        let mut stages = vec![stage(&mut vs), gs, stage(&mut fs)];
        link_backward(&mut stages, 0xff).unwrap();
        drop(stages);
        assert_eq!(
            vs.info.outputs_written,
            varying_slot::bit(0) | varying_slot::bit(8) | varying_slot::bit(9)
        );
        assert_eq!(fs.info.inputs_read, varying_slot::bit(8) | varying_slot::bit(9));
        assert!(!fs.instructions.iter().any(|v| v.op == Op::Constant(0)));
    }

    #[test]
    fn test_unify_interfaces() {
        let mut tcs = Program::new(ShaderStage::TessellationControl, "main");
        let mut tes = Program::new(ShaderStage::TessellationEvaluation, "main");
        tcs.info.outputs_written = varying_slot::bit(8) | TESS_LEVELS;
        tes.info.inputs_read = varying_slot::bit(9);
        tes.info.patch_inputs_read = 1;
        unify_interfaces(&mut tcs, &mut tes);
        assert_eq!(
            tcs.info.outputs_written,
            varying_slot::bit(8) | varying_slot::bit(9) | TESS_LEVELS
        );
        assert_eq!(tes.info.inputs_read, varying_slot::bit(8) | varying_slot::bit(9));
        assert_eq!(tcs.info.patch_outputs_written, 1);
    }
}
