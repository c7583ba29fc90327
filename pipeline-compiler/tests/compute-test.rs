// SPDX-License-Identifier: LGPL-2.1-or-later
// See Notices.txt for copyright information

mod common;

use common::*;
use pipeline_compiler::shader_compiler_ir::ShaderStage;
use pipeline_compiler::{
    ComputePipelineCreateInfo, GenericPipeline, PipelineCreateFlags, PipelineError,
};

fn compute_info(text: &str, flags: PipelineCreateFlags) -> ComputePipelineCreateInfo {
    ComputePipelineCreateInfo {
        flags,
        stage: stage(ShaderStage::Compute, text),
        layout: layout(),
        debug_name: None,
    }
}

const INVALID: &str = "shader compute \"main\"\n%0 = bogus 1\n";

#[test]
fn test_compute_pipeline() {
    let (device, compiler) = device();
    let (pipelines, result) =
        device.create_compute_pipelines(None, &[compute_info(COMPUTE, PipelineCreateFlags::empty())]);
    result.unwrap();
    let pipeline = pipelines[0].as_ref().unwrap();
    let compute = pipeline.as_compute().unwrap();
    assert_eq!(compute.workgroup_memory_size(), 256);
    assert_eq!(compute.binary().stage, ShaderStage::Compute);
    assert_eq!(pipeline.executables().len(), 1);
    assert_eq!(pipeline.creation_feedback().stages.len(), 1);
    assert_eq!(compiler.invocations(), vec![ShaderStage::Compute]);

    let (pipelines, result) =
        device.create_compute_pipelines(None, &[compute_info(COMPUTE, PipelineCreateFlags::empty())]);
    result.unwrap();
    let pipeline = pipelines[0].as_ref().unwrap();
    assert!(pipeline.creation_feedback().pipeline.cache_hit);
    assert!(pipeline.creation_feedback().stages[0].cache_hit);
    assert_eq!(compiler.invocation_count(), 1);
}

#[test]
fn test_wrong_stage() {
    let (device, compiler) = device();
    let create_info = ComputePipelineCreateInfo {
        stage: stage(ShaderStage::Fragment, FRAGMENT),
        ..compute_info(COMPUTE, PipelineCreateFlags::empty())
    };
    let (pipelines, result) = device.create_compute_pipelines(None, &[create_info]);
    assert!(matches!(result, Err(PipelineError::InvalidUsage(_))));
    assert!(pipelines[0].is_none());
    assert_eq!(compiler.invocation_count(), 0);
}

#[test]
fn test_batch_keeps_going_after_failure() {
    let (device, _) = device();
    let flags = PipelineCreateFlags::empty();
    let create_infos = [
        compute_info(COMPUTE, flags),
        compute_info(INVALID, flags),
        compute_info("shader compute \"main\"\n.workgroup_size 8 8 1\nbarrier\n", flags),
    ];
    let (pipelines, result) = device.create_compute_pipelines(None, &create_infos);
    assert!(matches!(result, Err(PipelineError::Unknown(_))));
    assert_eq!(pipelines.len(), 3);
    assert!(pipelines[0].is_some());
    assert!(pipelines[1].is_none());
    assert!(pipelines[2].is_some());
}

#[test]
fn test_batch_early_return() {
    let (device, compiler) = device();
    let flags = PipelineCreateFlags::EARLY_RETURN_ON_FAILURE;
    let create_infos = [
        compute_info(COMPUTE, flags),
        compute_info(INVALID, flags),
        compute_info("shader compute \"main\"\n.workgroup_size 8 8 1\nbarrier\n", flags),
    ];
    let (pipelines, result) = device.create_compute_pipelines(None, &create_infos);
    assert!(result.is_err());
    assert_eq!(pipelines.len(), 3);
    assert!(pipelines[0].is_some());
    assert!(pipelines[1].is_none());
    assert!(pipelines[2].is_none());
    assert_eq!(compiler.invocation_count(), 1);
}

#[test]
fn test_backend_failure() {
    let (device, compiler) = device();
    compiler.fail_on(Some(ShaderStage::Compute));
    let cache = device.create_pipeline_cache(None);
    let (_, result) = device
        .create_compute_pipelines(Some(&cache), &[compute_info(COMPUTE, PipelineCreateFlags::empty())]);
    assert_eq!(
        result,
        Err(PipelineError::Backend {
            stage: ShaderStage::Compute,
            message: "compute shader rejected".into(),
        })
    );
    assert!(cache.is_empty());
}

#[test]
fn test_compile_required_then_unoptimized() {
    let (device, compiler) = device();
    let (_, result) = device.create_compute_pipelines(
        None,
        &[compute_info(COMPUTE, PipelineCreateFlags::FAIL_ON_PIPELINE_COMPILE_REQUIRED)],
    );
    assert_eq!(result, Err(PipelineError::CompileRequired));
    assert_eq!(compiler.invocation_count(), 0);
    let (pipelines, result) = device.create_compute_pipelines(
        None,
        &[compute_info(COMPUTE, PipelineCreateFlags::DISABLE_OPTIMIZATION)],
    );
    result.unwrap();
    assert!(pipelines[0].is_some());
    assert_eq!(compiler.invocation_count(), 1);
}
