// SPDX-License-Identifier: LGPL-2.1-or-later
// See Notices.txt for copyright information

use bitflags::bitflags;

bitflags! {
    /// options passed when creating a pipeline
    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
    pub struct PipelineCreateFlags: u32 {
        /// compile without optimizations
        const DISABLE_OPTIMIZATION = 1 << 0;
        /// the pipeline is a library to be imported by other pipelines
        const LIBRARY = 1 << 1;
        /// keep intermediate programs so importers can link-time optimize
        const RETAIN_LINK_TIME_OPTIMIZATION_INFO = 1 << 2;
        /// recompile imported library stages together
        const LINK_TIME_OPTIMIZATION = 1 << 3;
        /// return `CompileRequired` instead of compiling
        const FAIL_ON_PIPELINE_COMPILE_REQUIRED = 1 << 4;
        /// stop a batch at the first failure
        const EARLY_RETURN_ON_FAILURE = 1 << 5;
        /// collect executable statistics
        const CAPTURE_STATISTICS = 1 << 6;
        /// bypass the cache and collect final IR and disassembly
        const CAPTURE_INTERNAL_REPRESENTATIONS = 1 << 7;
        /// rays never hit triangles
        const RAY_TRACING_SKIP_TRIANGLES = 1 << 8;
        /// rays never hit procedural geometry
        const RAY_TRACING_SKIP_AABBS = 1 << 9;
    }
}

bitflags! {
    /// state set at draw time instead of at pipeline creation
    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
    pub struct DynamicStates: u32 {
        /// multisample rasterization sample count
        const RASTERIZATION_SAMPLES = 1 << 0;
        /// alpha to coverage enable
        const ALPHA_TO_COVERAGE = 1 << 1;
        /// provoking vertex convention
        const PROVOKING_VERTEX = 1 << 2;
        /// rasterizer discard enable
        const RASTERIZER_DISCARD = 1 << 3;
        /// tessellation patch size
        const PATCH_CONTROL_POINTS = 1 << 4;
        /// fragment shading rate
        const FRAGMENT_SHADING_RATE = 1 << 5;
        /// ray-tracing pipeline stack size
        const RAY_TRACING_STACK_SIZE = 1 << 6;
    }
}
