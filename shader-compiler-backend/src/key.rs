// SPDX-License-Identifier: LGPL-2.1-or-later
// See Notices.txt for copyright information

//! per-stage compile keys
//!
//! A key carries every fixed-function or device input that changes the
//! generated code of one stage. `StageKey::encode` produces the stable byte
//! form used for cache hashing; field order there is part of the cache
//! format and must not change without bumping the cache version.

use bitflags::bitflags;
use shader_compiler_ir::{ShaderStage, TessPrimitiveMode};

bitflags! {
    /// buffer/image robustness enabled for a stage
    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
    pub struct RobustFlags: u8 {
        /// bounds-check uniform buffer accesses
        const UNIFORM_BUFFERS = 1 << 0;
        /// bounds-check storage buffer accesses
        const STORAGE_BUFFERS = 1 << 1;
        /// bounds-check image accesses
        const IMAGES = 1 << 2;
    }
}

bitflags! {
    /// ray flags forced on every trace in a ray-tracing pipeline
    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
    pub struct RayFlags: u8 {
        /// triangle geometry is never hit
        const SKIP_TRIANGLES = 1 << 0;
        /// procedural geometry is never hit
        const SKIP_AABBS = 1 << 1;
    }
}

/// layout of the vertex attribute block passed between pre-rasterization stages
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum VueLayout {
    /// layout fixed across the whole pipeline
    Fixed,
    /// stages compiled separately agree on a layout independent of neighbours
    Separate,
    /// `Separate`, with a mesh stage feeding the fragment stage
    SeparateMesh,
}

impl Default for VueLayout {
    fn default() -> Self {
        VueLayout::Fixed
    }
}

/// a state that may be known to be off, known to be on, or decided at draw time
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Sometimes {
    /// always off
    Never,
    /// dynamic
    Sometimes,
    /// always on
    Always,
}

impl Sometimes {
    /// `Always` or `Never`
    pub fn from_bool(value: bool) -> Self {
        if value {
            Sometimes::Always
        } else {
            Sometimes::Never
        }
    }
    fn to_byte(self) -> u8 {
        match self {
            Sometimes::Never => 0,
            Sometimes::Sometimes => 1,
            Sometimes::Always => 2,
        }
    }
}

impl Default for Sometimes {
    fn default() -> Self {
        Sometimes::Never
    }
}

/// fields shared by every stage key
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct BaseKey {
    /// robustness
    pub robust_flags: RobustFlags,
    /// vertex attribute block layout
    pub vue_layout: VueLayout,
    /// clamp trigonometric inputs to a reduced range
    pub limit_trig_input_range: bool,
    /// push constant address is passed inline
    pub uses_inline_push_addr: bool,
}

/// vertex stage key
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct VertexKey {
    /// shared fields
    pub base: BaseKey,
    /// pack vertex fetch components
    pub vf_component_packing: bool,
}

/// tessellation control stage key
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct TessControlKey {
    /// shared fields
    pub base: BaseKey,
    /// input patch size
    pub input_vertices: u8,
    /// domain, filled in from the evaluation stage while linking
    pub tes_primitive_mode: TessPrimitiveMode,
    /// outputs needed by the evaluation stage, filled in while linking
    pub outputs_written: u64,
    /// patch outputs needed by the evaluation stage, filled in while linking
    pub patch_outputs_written: u32,
}

/// tessellation evaluation stage key
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct TessEvalKey {
    /// shared fields
    pub base: BaseKey,
    /// inputs written by the control stage, filled in while linking
    pub inputs_read: u64,
    /// patch inputs written by the control stage, filled in while linking
    pub patch_inputs_read: u32,
}

/// geometry stage key
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct GeometryKey {
    /// shared fields
    pub base: BaseKey,
}

/// task stage key
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct TaskKey {
    /// shared fields
    pub base: BaseKey,
}

/// mesh stage key
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct MeshKey {
    /// shared fields
    pub base: BaseKey,
    /// compact the mesh output block
    pub compact_mue: bool,
}

/// fragment stage key
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct FragmentKey {
    /// shared fields
    pub base: BaseKey,
    /// varying slots written by the previous stage, filled in while compiling
    pub input_slots_valid: u64,
    /// attachments with a non-zero write mask, filled in while linking
    pub color_outputs_valid: u8,
    /// number of color attachments
    pub nr_color_regions: u8,
    /// rendering to a multisampled attachment
    pub multisample_fbo: Sometimes,
    /// interpolate per sample
    pub persample_interp: Sometimes,
    /// alpha to coverage
    pub alpha_to_coverage: Sometimes,
    /// last-vertex provoking convention
    pub provoking_vertex_last: Sometimes,
    /// fed by a mesh stage
    pub mesh_input: Sometimes,
    /// coarse pixel shading possible
    pub coarse_pixel: bool,
    /// sample mask output has no effect
    pub ignore_sample_mask_out: bool,
    /// hardware workaround for missing push constants
    pub null_push_constant_workaround: bool,
    /// minimum sample shading requested
    pub min_sample_shading: bool,
}

/// compute stage key
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct ComputeKey {
    /// shared fields
    pub base: BaseKey,
}

/// ray-tracing stage key
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct RayTracingKey {
    /// shared fields
    pub base: BaseKey,
    /// pipeline-wide ray flags
    pub ray_flags: RayFlags,
}

/// the key for one stage
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum StageKey {
    /// vertex
    Vertex(VertexKey),
    /// tessellation control
    TessellationControl(TessControlKey),
    /// tessellation evaluation
    TessellationEvaluation(TessEvalKey),
    /// geometry
    Geometry(GeometryKey),
    /// task
    Task(TaskKey),
    /// mesh
    Mesh(MeshKey),
    /// fragment
    Fragment(FragmentKey),
    /// compute
    Compute(ComputeKey),
    /// any ray-tracing stage
    RayTracing(RayTracingKey),
}

struct Encoder<'a>(&'a mut Vec<u8>);

impl Encoder<'_> {
    fn u8(&mut self, v: u8) -> &mut Self {
        self.0.push(v);
        self
    }
    fn bool(&mut self, v: bool) -> &mut Self {
        self.u8(v as u8)
    }
    fn u32(&mut self, v: u32) -> &mut Self {
        self.0.extend_from_slice(&v.to_le_bytes());
        self
    }
    fn u64(&mut self, v: u64) -> &mut Self {
        self.0.extend_from_slice(&v.to_le_bytes());
        self
    }
    fn sometimes(&mut self, v: Sometimes) -> &mut Self {
        self.u8(v.to_byte())
    }
    fn base(&mut self, base: &BaseKey) -> &mut Self {
        let vue_layout = match base.vue_layout {
            VueLayout::Fixed => 0,
            VueLayout::Separate => 1,
            VueLayout::SeparateMesh => 2,
        };
        self.u8(base.robust_flags.bits())
            .u8(vue_layout)
            .bool(base.limit_trig_input_range)
            .bool(base.uses_inline_push_addr)
    }
}

fn tess_primitive_mode_byte(mode: TessPrimitiveMode) -> u8 {
    match mode {
        TessPrimitiveMode::Unspecified => 0,
        TessPrimitiveMode::Triangles => 1,
        TessPrimitiveMode::Quads => 2,
        TessPrimitiveMode::Isolines => 3,
    }
}

impl StageKey {
    /// the default key for `stage`
    pub fn new(stage: ShaderStage, base: BaseKey) -> Self {
        match stage {
            ShaderStage::Vertex => StageKey::Vertex(VertexKey {
                base,
                ..VertexKey::default()
            }),
            ShaderStage::TessellationControl => StageKey::TessellationControl(TessControlKey {
                base,
                input_vertices: 0,
                tes_primitive_mode: TessPrimitiveMode::Unspecified,
                outputs_written: 0,
                patch_outputs_written: 0,
            }),
            ShaderStage::TessellationEvaluation => {
                StageKey::TessellationEvaluation(TessEvalKey {
                    base,
                    ..TessEvalKey::default()
                })
            }
            ShaderStage::Geometry => StageKey::Geometry(GeometryKey { base }),
            ShaderStage::Task => StageKey::Task(TaskKey { base }),
            ShaderStage::Mesh => StageKey::Mesh(MeshKey {
                base,
                ..MeshKey::default()
            }),
            ShaderStage::Fragment => StageKey::Fragment(FragmentKey {
                base,
                ..FragmentKey::default()
            }),
            ShaderStage::Compute => StageKey::Compute(ComputeKey { base }),
            ShaderStage::RayGeneration
            | ShaderStage::AnyHit
            | ShaderStage::ClosestHit
            | ShaderStage::Miss
            | ShaderStage::Intersection
            | ShaderStage::Callable => StageKey::RayTracing(RayTracingKey {
                base,
                ..RayTracingKey::default()
            }),
        }
    }
    /// the shared fields
    pub fn base(&self) -> &BaseKey {
        match self {
            StageKey::Vertex(key) => &key.base,
            StageKey::TessellationControl(key) => &key.base,
            StageKey::TessellationEvaluation(key) => &key.base,
            StageKey::Geometry(key) => &key.base,
            StageKey::Task(key) => &key.base,
            StageKey::Mesh(key) => &key.base,
            StageKey::Fragment(key) => &key.base,
            StageKey::Compute(key) => &key.base,
            StageKey::RayTracing(key) => &key.base,
        }
    }
    /// the shared fields
    pub fn base_mut(&mut self) -> &mut BaseKey {
        match self {
            StageKey::Vertex(key) => &mut key.base,
            StageKey::TessellationControl(key) => &mut key.base,
            StageKey::TessellationEvaluation(key) => &mut key.base,
            StageKey::Geometry(key) => &mut key.base,
            StageKey::Task(key) => &mut key.base,
            StageKey::Mesh(key) => &mut key.base,
            StageKey::Fragment(key) => &mut key.base,
            StageKey::Compute(key) => &mut key.base,
            StageKey::RayTracing(key) => &mut key.base,
        }
    }
    /// `true` if `self` is a valid key for `stage`
    pub fn matches_stage(&self, stage: ShaderStage) -> bool {
        match self {
            StageKey::Vertex(_) => stage == ShaderStage::Vertex,
            StageKey::TessellationControl(_) => stage == ShaderStage::TessellationControl,
            StageKey::TessellationEvaluation(_) => stage == ShaderStage::TessellationEvaluation,
            StageKey::Geometry(_) => stage == ShaderStage::Geometry,
            StageKey::Task(_) => stage == ShaderStage::Task,
            StageKey::Mesh(_) => stage == ShaderStage::Mesh,
            StageKey::Fragment(_) => stage == ShaderStage::Fragment,
            StageKey::Compute(_) => stage == ShaderStage::Compute,
            StageKey::RayTracing(_) => stage.is_ray_tracing(),
        }
    }
    /// append the stable byte encoding of `self` to `out`
    pub fn encode(&self, out: &mut Vec<u8>) {
        let mut e = Encoder(out);
        match self {
            StageKey::Vertex(key) => {
                e.u8(0).base(&key.base).bool(key.vf_component_packing);
            }
            StageKey::TessellationControl(key) => {
                e.u8(1)
                    .base(&key.base)
                    .u8(key.input_vertices)
                    .u8(tess_primitive_mode_byte(key.tes_primitive_mode))
                    .u64(key.outputs_written)
                    .u32(key.patch_outputs_written);
            }
            StageKey::TessellationEvaluation(key) => {
                e.u8(2)
                    .base(&key.base)
                    .u64(key.inputs_read)
                    .u32(key.patch_inputs_read);
            }
            StageKey::Geometry(key) => {
                e.u8(3).base(&key.base);
            }
            StageKey::Task(key) => {
                e.u8(4).base(&key.base);
            }
            StageKey::Mesh(key) => {
                e.u8(5).base(&key.base).bool(key.compact_mue);
            }
            StageKey::Fragment(key) => {
                e.u8(6)
                    .base(&key.base)
                    .u64(key.input_slots_valid)
                    .u8(key.color_outputs_valid)
                    .u8(key.nr_color_regions)
                    .sometimes(key.multisample_fbo)
                    .sometimes(key.persample_interp)
                    .sometimes(key.alpha_to_coverage)
                    .sometimes(key.provoking_vertex_last)
                    .sometimes(key.mesh_input)
                    .bool(key.coarse_pixel)
                    .bool(key.ignore_sample_mask_out)
                    .bool(key.null_push_constant_workaround)
                    .bool(key.min_sample_shading);
            }
            StageKey::Compute(key) => {
                e.u8(7).base(&key.base);
            }
            StageKey::RayTracing(key) => {
                e.u8(8).base(&key.base).u8(key.ray_flags.bits());
            }
        }
    }
    /// the stable byte encoding of `self`
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut retval = Vec::new();
        self.encode(&mut retval);
        retval
    }
}
