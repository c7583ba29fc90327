// SPDX-License-Identifier: LGPL-2.1-or-later
// See Notices.txt for copyright information
#![deny(missing_docs)]

//! Shader Compiler Backend Traits for Kazan

use shader_compiler_ir::Program;
use std::fmt::Debug;
use thiserror::Error;

pub mod key;

pub use crate::key::StageKey;

/// hardware limits forwarded verbatim to the backend
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct DeviceLimits {
    /// supported SIMD dispatch widths, narrowest first
    pub simd_widths: Vec<u8>,
    /// general registers per thread
    pub register_file_size: u32,
    /// largest per-thread scratch allocation in bytes
    pub max_scratch_size: u32,
    /// largest workgroup shared memory allocation in bytes
    pub max_workgroup_memory: u32,
    /// subgroup width used when the application doesn't require one
    pub default_subgroup_size: u32,
}

impl Default for DeviceLimits {
    fn default() -> Self {
        Self {
            simd_widths: vec![8, 16, 32],
            register_file_size: 128,
            max_scratch_size: 2 * 1024 * 1024,
            max_workgroup_memory: 64 * 1024,
            default_subgroup_size: 16,
        }
    }
}

/// optimization mode
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum OptimizationMode {
    /// no optimizations are enabled
    NoOptimizations,
    /// default optimizations are enabled
    Normal,
}

impl Default for OptimizationMode {
    fn default() -> Self {
        OptimizationMode::Normal
    }
}

/// compiler independent config options
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct CompilerIndependentConfig {
    /// optimization mode
    pub optimization_mode: OptimizationMode,
    /// ask the backend for disassembly of the generated code
    pub capture_disassembly: bool,
}

/// one call into the backend
#[derive(Copy, Clone, Debug)]
pub struct CompileRequest<'a> {
    /// the lowered program
    pub program: &'a Program,
    /// the final key, after linking
    pub key: &'a StageKey,
    /// hardware limits
    pub limits: &'a DeviceLimits,
    /// compiler options
    pub config: &'a CompilerIndependentConfig,
    /// short hash of the source, reported in statistics
    pub source_hash: u32,
}

/// resource usage of a compiled shader
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct ResourceUsage {
    /// per-thread scratch memory in bytes
    pub scratch_size: u32,
    /// workgroup shared memory in bytes
    pub shared_memory_size: u32,
    /// ray-tracing call stack size in bytes
    pub stack_size: u32,
    /// general registers used
    pub registers_used: u32,
    /// number of ray-query objects
    pub ray_queries: u32,
    /// varying slots written, consumed by the next stage's key
    pub output_slots_valid: u64,
    /// bytes of push constants read
    pub push_constant_size: u32,
}

/// statistics for one compiled dispatch width
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct CompileStatistics {
    /// SIMD width, 0 for stages without a fixed width
    pub dispatch_width: u8,
    /// instruction count
    pub instructions: u32,
    /// send message count
    pub sends: u32,
    /// loop count
    pub loops: u32,
    /// cycle estimate
    pub cycles: u32,
    /// register spills
    pub spills: u32,
    /// register fills
    pub fills: u32,
    /// peak live registers
    pub max_live_registers: u32,
    /// widest width the program could dispatch at
    pub max_dispatch_width: u8,
}

/// the output of a successful compile
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct CompiledShader {
    /// machine code
    pub code: Vec<u8>,
    /// resources used
    pub resource_usage: ResourceUsage,
    /// one entry per compiled dispatch width
    pub statistics: Vec<CompileStatistics>,
    /// disassembly, when requested
    pub disassembly: Option<String>,
}

/// the backend rejected a program
#[derive(Clone, Debug, Eq, PartialEq, Error)]
#[error("{message}")]
pub struct CompileFailure {
    /// the backend's diagnostic text
    pub message: String,
}

impl CompileFailure {
    /// create a `CompileFailure`
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// main compiler backend trait
pub trait Compiler: Debug + Send + Sync {
    /// get shader compiler's name
    fn name(&self) -> &'static str;
    /// compile one program
    fn compile(&self, request: &CompileRequest) -> Result<CompiledShader, CompileFailure>;
}
