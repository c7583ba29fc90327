// SPDX-License-Identifier: LGPL-2.1-or-later
// See Notices.txt for copyright information

mod common;

use common::*;
use pipeline_compiler::shader_compiler_ir::ShaderStage;
use pipeline_compiler::{
    DynamicStates, GenericPipeline, GroupKind, GroupShader, Pipeline, PipelineCreateFlags,
    PipelineError, RayTracingPipeline, RayTracingPipelineCreateInfo, RayTracingShaderGroup,
};
use std::sync::Arc;

const RAYGEN: &str = "shader raygen \"main\"\n%0 = const 0\ntrace_ray %0\n";
const MISS: &str = "shader miss \"main\"\n%0 = const 1\nexecute_callable %0\n";
const CLOSEST_HIT: &str = "shader closest_hit \"main\"\n%0 = const 2\ntrace_ray %0\n";
const ANY_HIT: &str = "shader any_hit \"main\"\nignore_intersection\n";
const INTERSECTION: &str = "shader intersection \"main\"\n%0 = const 3\nreport_intersection %0\n";
const CALLABLE: &str = "shader callable \"main\"\n%0 = const 4\n%1 = ray_query %0\n";

/// raygen, miss, closest hit, intersection, any hit, callable
fn create_info() -> RayTracingPipelineCreateInfo {
    RayTracingPipelineCreateInfo {
        stages: vec![
            stage(ShaderStage::RayGeneration, RAYGEN),
            stage(ShaderStage::Miss, MISS),
            stage(ShaderStage::ClosestHit, CLOSEST_HIT),
            stage(ShaderStage::Intersection, INTERSECTION),
            stage(ShaderStage::AnyHit, ANY_HIT),
            stage(ShaderStage::Callable, CALLABLE),
        ],
        groups: vec![
            RayTracingShaderGroup::General { general: 0 },
            RayTracingShaderGroup::General { general: 1 },
            RayTracingShaderGroup::ProceduralHit {
                intersection: 3,
                closest_hit: Some(2),
                any_hit: Some(4),
            },
            RayTracingShaderGroup::ProceduralHit {
                intersection: 3,
                closest_hit: None,
                any_hit: Some(4),
            },
            RayTracingShaderGroup::TrianglesHit {
                closest_hit: Some(2),
                any_hit: Some(4),
            },
            RayTracingShaderGroup::General { general: 5 },
        ],
        max_recursion_depth: 2,
        ..RayTracingPipelineCreateInfo::new(layout())
    }
}

fn create_one(
    device: &pipeline_compiler::Device,
    create_info: RayTracingPipelineCreateInfo,
) -> Result<Arc<RayTracingPipeline>, PipelineError> {
    let (mut pipelines, result) = device.create_ray_tracing_pipelines(None, &[create_info]);
    result?;
    Ok(pipelines
        .remove(0)
        .and_then(|pipeline| pipeline.as_ray_tracing().cloned())
        .expect("pipeline created"))
}

fn set_stack_sizes(compiler: &FakeCompiler) {
    compiler.set_stack_size(ShaderStage::RayGeneration, 30);
    compiler.set_stack_size(ShaderStage::Miss, 80);
    compiler.set_stack_size(ShaderStage::ClosestHit, 100);
    compiler.set_stack_size(ShaderStage::AnyHit, 20);
    compiler.set_stack_size(ShaderStage::Intersection, 50);
    compiler.set_stack_size(ShaderStage::Callable, 10);
}

#[test]
fn test_intersection_fused_once() {
    let (device, compiler) = device();
    let pipeline = create_one(&device, create_info()).unwrap();
    assert_eq!(compiler.count(ShaderStage::Intersection), 1);
    assert_eq!(compiler.count(ShaderStage::AnyHit), 1);
    let groups = pipeline.groups();
    assert_eq!(groups.len(), 6);
    assert_eq!(groups[2].kind, GroupKind::ProceduralHit);
    let first = groups[2].shader(GroupShader::Intersection).unwrap();
    let second = groups[3].shader(GroupShader::Intersection).unwrap();
    assert!(Arc::ptr_eq(first, second));
    // the any-hit program is part of the intersection binary
    assert!(groups[2].any_hit.is_none());
    assert!(groups[4].shader(GroupShader::AnyHit).is_some());
    assert!(groups[3].closest_hit.is_none());
    assert_ne!(pipeline.group_handle(2).unwrap(), pipeline.group_handle(3).unwrap());
    assert!(pipeline.group_handle(6).is_err());
    // one binary per stage, intersection and any hit share one
    assert_eq!(pipeline.binaries().len(), 6);
    assert_eq!(pipeline.creation_feedback().stages.len(), 6);
    assert_eq!(pipeline.ray_queries(), 1);
}

#[test]
fn test_stack_size() {
    let (device, compiler) = device();
    set_stack_sizes(&compiler);
    let pipeline = create_one(&device, create_info()).unwrap();
    assert_eq!(pipeline.stack_size(), 250);
    assert!(!pipeline.uses_dynamic_stack_size());
    assert_eq!(pipeline.group_stack_size(0, GroupShader::General).unwrap(), 30);
    assert_eq!(pipeline.group_stack_size(2, GroupShader::Intersection).unwrap(), 50);
    assert_eq!(pipeline.group_stack_size(2, GroupShader::AnyHit).unwrap(), 0);

    let dynamic = create_one(
        &device,
        RayTracingPipelineCreateInfo {
            dynamic: DynamicStates::RAY_TRACING_STACK_SIZE,
            ..create_info()
        },
    )
    .unwrap();
    assert_eq!(dynamic.stack_size(), 0);
    assert!(dynamic.uses_dynamic_stack_size());
}

#[test]
fn test_cached_units() {
    let (device, compiler) = device();
    create_one(&device, create_info()).unwrap();
    let invocations = compiler.invocation_count();
    let pipeline = create_one(&device, create_info()).unwrap();
    assert_eq!(compiler.invocation_count(), invocations);
    let feedback = pipeline.creation_feedback();
    assert!(feedback.pipeline.cache_hit);
    assert!(feedback.stages.iter().all(|v| v.valid && v.cache_hit));
}

#[test]
fn test_invalid_groups() {
    let (device, compiler) = device();
    let mut wrong_kind = create_info();
    wrong_kind.groups.push(RayTracingShaderGroup::TrianglesHit {
        closest_hit: Some(4),
        any_hit: None,
    });
    assert!(matches!(
        create_one(&device, wrong_kind),
        Err(PipelineError::InvalidUsage(_))
    ));
    let mut out_of_range = create_info();
    out_of_range
        .groups
        .push(RayTracingShaderGroup::General { general: 6 });
    assert!(matches!(
        create_one(&device, out_of_range),
        Err(PipelineError::InvalidUsage(_))
    ));
    let both_skips = RayTracingPipelineCreateInfo {
        flags: PipelineCreateFlags::RAY_TRACING_SKIP_TRIANGLES
            | PipelineCreateFlags::RAY_TRACING_SKIP_AABBS,
        ..create_info()
    };
    assert!(matches!(
        create_one(&device, both_skips),
        Err(PipelineError::InvalidUsage(_))
    ));
    assert_eq!(compiler.invocation_count(), 0);
}

#[test]
fn test_skip_flags_change_keys() {
    let (device, compiler) = device();
    create_one(&device, create_info()).unwrap();
    let invocations = compiler.invocation_count();
    let skipping = create_one(
        &device,
        RayTracingPipelineCreateInfo {
            flags: PipelineCreateFlags::RAY_TRACING_SKIP_AABBS,
            ..create_info()
        },
    )
    .unwrap();
    assert_eq!(compiler.invocation_count(), 2 * invocations);
    assert!(!skipping.creation_feedback().pipeline.cache_hit);
}

#[test]
fn test_library() {
    let (device, compiler) = device();
    let library_info = RayTracingPipelineCreateInfo {
        flags: PipelineCreateFlags::LIBRARY,
        stages: vec![stage(ShaderStage::Miss, MISS)],
        groups: vec![RayTracingShaderGroup::General { general: 0 }],
        ..RayTracingPipelineCreateInfo::new(layout())
    };
    let library = create_one(&device, library_info.clone()).unwrap();
    let pipeline = create_one(
        &device,
        RayTracingPipelineCreateInfo {
            stages: vec![stage(ShaderStage::RayGeneration, RAYGEN)],
            groups: vec![RayTracingShaderGroup::General { general: 0 }],
            libraries: vec![library.clone()],
            ..RayTracingPipelineCreateInfo::new(layout())
        },
    )
    .unwrap();
    assert_eq!(compiler.count(ShaderStage::Miss), 1);
    let groups = pipeline.groups();
    assert_eq!(groups.len(), 2);
    assert!(!groups[0].imported);
    assert!(groups[1].imported);
    assert_eq!(groups[1].handle, library.groups()[0].handle);
    assert!(pipeline.active_stages().contains(ShaderStage::Miss));
    assert_eq!(pipeline.executables().len(), 2);

    // a library must be created as one
    let not_library = create_one(
        &device,
        RayTracingPipelineCreateInfo {
            flags: PipelineCreateFlags::empty(),
            ..library_info
        },
    )
    .unwrap();
    let importing = RayTracingPipelineCreateInfo {
        libraries: vec![not_library],
        ..RayTracingPipelineCreateInfo::new(layout())
    };
    assert!(matches!(
        create_one(&device, importing),
        Err(PipelineError::InvalidUsage(_))
    ));
}

#[test]
fn test_pipeline_variant() {
    let (device, _) = device();
    let (pipelines, result) = device.create_ray_tracing_pipelines(None, &[create_info()]);
    result.unwrap();
    match &pipelines[0] {
        Some(Pipeline::RayTracing(pipeline)) => {
            assert!(pipeline.active_stages().contains(ShaderStage::Callable))
        }
        other => panic!("unexpected pipeline: {:?}", other),
    }
}
