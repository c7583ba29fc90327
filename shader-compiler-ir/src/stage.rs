// SPDX-License-Identifier: LGPL-2.1-or-later
// See Notices.txt for copyright information

use enum_map::Enum;
use std::fmt;

/// a shader stage
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Enum)]
pub enum ShaderStage {
    /// vertex shader
    Vertex,
    /// tessellation control shader
    TessellationControl,
    /// tessellation evaluation shader
    TessellationEvaluation,
    /// geometry shader
    Geometry,
    /// task shader
    Task,
    /// mesh shader
    Mesh,
    /// fragment shader
    Fragment,
    /// compute shader
    Compute,
    /// ray generation shader
    RayGeneration,
    /// any-hit shader
    AnyHit,
    /// closest-hit shader
    ClosestHit,
    /// miss shader
    Miss,
    /// intersection shader
    Intersection,
    /// callable shader
    Callable,
}

impl ShaderStage {
    /// every stage, in declaration order
    pub const ALL: [ShaderStage; 14] = [
        ShaderStage::Vertex,
        ShaderStage::TessellationControl,
        ShaderStage::TessellationEvaluation,
        ShaderStage::Geometry,
        ShaderStage::Task,
        ShaderStage::Mesh,
        ShaderStage::Fragment,
        ShaderStage::Compute,
        ShaderStage::RayGeneration,
        ShaderStage::AnyHit,
        ShaderStage::ClosestHit,
        ShaderStage::Miss,
        ShaderStage::Intersection,
        ShaderStage::Callable,
    ];
    /// the graphics stages in execution order
    ///
    /// task and mesh are an alternate front end to vertex, so at most one of
    /// the two groups is active in any pipeline.
    pub const GRAPHICS_ORDER: [ShaderStage; 7] = [
        ShaderStage::Vertex,
        ShaderStage::TessellationControl,
        ShaderStage::TessellationEvaluation,
        ShaderStage::Geometry,
        ShaderStage::Task,
        ShaderStage::Mesh,
        ShaderStage::Fragment,
    ];
    /// the keyword used for `self` in the text format
    pub fn name(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::TessellationControl => "tess_ctrl",
            ShaderStage::TessellationEvaluation => "tess_eval",
            ShaderStage::Geometry => "geometry",
            ShaderStage::Task => "task",
            ShaderStage::Mesh => "mesh",
            ShaderStage::Fragment => "fragment",
            ShaderStage::Compute => "compute",
            ShaderStage::RayGeneration => "raygen",
            ShaderStage::AnyHit => "any_hit",
            ShaderStage::ClosestHit => "closest_hit",
            ShaderStage::Miss => "miss",
            ShaderStage::Intersection => "intersection",
            ShaderStage::Callable => "callable",
        }
    }
    /// the stage with keyword `name`
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|stage| stage.name() == name)
    }
    /// stable numeric encoding, used for hashing and serialization
    pub fn to_index(self) -> u8 {
        self.into_usize() as u8
    }
    /// inverse of `to_index`
    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }
    /// `true` for the stages of a graphics pipeline
    pub fn is_graphics(self) -> bool {
        Self::GRAPHICS_ORDER.contains(&self)
    }
    /// `true` for the stages of a ray-tracing pipeline
    pub fn is_ray_tracing(self) -> bool {
        match self {
            ShaderStage::RayGeneration
            | ShaderStage::AnyHit
            | ShaderStage::ClosestHit
            | ShaderStage::Miss
            | ShaderStage::Intersection
            | ShaderStage::Callable => true,
            _ => false,
        }
    }
    /// `true` for stages dispatched in workgroups
    pub fn uses_workgroup(self) -> bool {
        match self {
            ShaderStage::Compute | ShaderStage::Task | ShaderStage::Mesh => true,
            _ => false,
        }
    }
    /// `true` for stages that can write the primitive shading rate
    pub fn can_set_fragment_shading_rate(self) -> bool {
        match self {
            ShaderStage::Vertex | ShaderStage::Geometry | ShaderStage::Mesh => true,
            _ => false,
        }
    }
    /// position of `self` in `GRAPHICS_ORDER`
    pub fn graphics_order_index(self) -> Option<usize> {
        Self::GRAPHICS_ORDER.iter().position(|&stage| stage == self)
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}
