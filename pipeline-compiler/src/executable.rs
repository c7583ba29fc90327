// SPDX-License-Identifier: LGPL-2.1-or-later
// See Notices.txt for copyright information

use pipeline_cache::ShaderBinary;
use shader_compiler_backend::CompileStatistics;
use shader_compiler_ir::ShaderStage;
use std::fmt;
use std::sync::Arc;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum StatisticValue {
    U64(u64),
}

impl fmt::Display for StatisticValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            StatisticValue::U64(v) => write!(f, "{}", v),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExecutableStatistic {
    pub name: &'static str,
    pub description: &'static str,
    pub value: StatisticValue,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InternalRepresentation {
    pub name: &'static str,
    pub description: &'static str,
    pub text: String,
}

/// one compiled variant of one stage
#[derive(Clone, Debug)]
pub struct PipelineExecutable {
    binary: Arc<ShaderBinary>,
    statistics_index: usize,
}

impl PipelineExecutable {
    pub fn stage(&self) -> ShaderStage {
        self.binary.stage
    }
    pub fn binary(&self) -> &Arc<ShaderBinary> {
        &self.binary
    }
    fn compile_statistics(&self) -> CompileStatistics {
        self.binary
            .statistics
            .get(self.statistics_index)
            .cloned()
            .unwrap_or_default()
    }
    pub fn dispatch_width(&self) -> u8 {
        self.compile_statistics().dispatch_width
    }
    pub fn name(&self) -> String {
        match self.dispatch_width() {
            0 => self.stage().name().to_uppercase(),
            width => format!("SIMD{} {}", width, self.stage().name().to_uppercase()),
        }
    }
    pub fn description(&self) -> String {
        let stage = match self.stage() {
            ShaderStage::Vertex => "vertex",
            ShaderStage::TessellationControl => "tessellation control",
            ShaderStage::TessellationEvaluation => "tessellation evaluation",
            ShaderStage::Geometry => "geometry",
            ShaderStage::Task => "task",
            ShaderStage::Mesh => "mesh",
            ShaderStage::Fragment => "fragment",
            ShaderStage::Compute => "compute",
            ShaderStage::RayGeneration => "ray generation",
            ShaderStage::AnyHit => "any-hit",
            ShaderStage::ClosestHit => "closest-hit",
            ShaderStage::Miss => "miss",
            ShaderStage::Intersection => "intersection",
            ShaderStage::Callable => "callable",
        };
        format!("{} shader", stage)
    }
    pub fn statistics(&self) -> Vec<ExecutableStatistic> {
        let stats = self.compile_statistics();
        let usage = &self.binary.resource_usage;
        let stage = self.stage();
        let mut retval = Vec::new();
        let mut add = |name: &'static str, description: &'static str, value: u64| {
            retval.push(ExecutableStatistic {
                name,
                description,
                value: StatisticValue::U64(value),
            })
        };
        add(
            "Instruction Count",
            "Number of instructions in the final generated shader executable.",
            stats.instructions.into(),
        );
        add(
            "SEND Count",
            "Number of instructions in the final generated shader executable which access external units such as the constant cache or the sampler.",
            stats.sends.into(),
        );
        add(
            "Loop Count",
            "Number of loops (not unrolled) in the final generated shader executable.",
            stats.loops.into(),
        );
        add(
            "Cycle Count",
            "Estimate of the number of cycles required to execute the final generated executable. This is an estimate only and may vary greatly from actual run-time performance.",
            stats.cycles.into(),
        );
        add(
            "Spill Count",
            "Number of scratch spill operations. This gives a rough estimate of the cost incurred due to spilling temporary values to memory. If this is non-zero, you may want to adjust your shader to reduce register pressure.",
            stats.spills.into(),
        );
        add(
            "Fill Count",
            "Number of scratch fill operations. This gives a rough estimate of the cost incurred due to spilling temporary values to memory. If this is non-zero, you may want to adjust your shader to reduce register pressure.",
            stats.fills.into(),
        );
        add(
            "Scratch Memory Size",
            "Number of bytes of scratch memory required by the generated shader executable. If this is non-zero, you may want to adjust your shader to reduce register pressure.",
            usage.scratch_size.into(),
        );
        // every fragment variant shares one maximum
        if stage != ShaderStage::Fragment || self.statistics_index == 0 {
            add(
                "Max dispatch width",
                "Largest SIMD dispatch width.",
                stats.max_dispatch_width.into(),
            );
        }
        add(
            "Max live registers",
            "Maximum number of registers used across the entire shader.",
            stats.max_live_registers.into(),
        );
        if stage.uses_workgroup() {
            add(
                "Workgroup Memory Size",
                "Number of bytes of workgroup shared memory used by this shader including any padding.",
                usage.shared_memory_size.into(),
            );
        }
        let source_hash = if stage.is_ray_tracing() {
            0
        } else {
            self.binary.source_hash
        };
        add(
            "Source hash",
            "Hash generated from the shader source.",
            source_hash.into(),
        );
        retval
    }
    /// the text captured at creation; empty unless internal representations were requested
    pub fn internal_representations(&self) -> Vec<InternalRepresentation> {
        let mut retval = Vec::new();
        if let Some(text) = &self.binary.ir_text {
            retval.push(InternalRepresentation {
                name: "Final IR",
                description: "Final intermediate program before code generation",
                text: text.clone(),
            });
        }
        if let Some(text) = &self.binary.disassembly {
            retval.push(InternalRepresentation {
                name: "Final disassembly",
                description: "Final generated machine code",
                text: text.clone(),
            });
        }
        retval
    }
}

/// append the executables of `binary`: one per fragment dispatch width, one otherwise
pub fn add_executables(executables: &mut Vec<PipelineExecutable>, binary: &Arc<ShaderBinary>) {
    let count = if binary.stage == ShaderStage::Fragment {
        binary.statistics.len().max(1)
    } else {
        1
    };
    for statistics_index in 0..count {
        executables.push(PipelineExecutable {
            binary: binary.clone(),
            statistics_index,
        });
    }
}
