// SPDX-License-Identifier: LGPL-2.1-or-later
// See Notices.txt for copyright information

//! shader metadata gathered from or declared on a `Program`

use crate::program::{Op, Program};
use std::fmt;
use thiserror::Error;

/// varying slot numbers used by `LoadInput`/`StoreOutput`
pub mod varying_slot {
    /// vertex position
    pub const POS: u32 = 0;
    /// point size
    pub const PSIZ: u32 = 1;
    /// per-primitive fragment shading rate
    pub const PRIMITIVE_SHADING_RATE: u32 = 2;
    /// outer tessellation levels
    pub const TESS_LEVEL_OUTER: u32 = 3;
    /// inner tessellation levels
    pub const TESS_LEVEL_INNER: u32 = 4;
    /// first generic varying
    pub const VAR0: u32 = 8;
    /// number of slots representable in an interface mask
    pub const COUNT: u32 = 64;

    /// bit for `slot` in an interface mask
    pub fn bit(slot: u32) -> u64 {
        if slot < COUNT {
            1 << slot
        } else {
            0
        }
    }
}

/// fragment shader output slot numbers used by `StoreOutput`
pub mod fragment_result {
    /// fragment depth
    pub const DEPTH: u32 = 0;
    /// stencil reference
    pub const STENCIL: u32 = 1;
    /// sample mask
    pub const SAMPLE_MASK: u32 = 2;
    /// first color attachment
    pub const DATA0: u32 = 4;
    /// maximum number of color attachments
    pub const MAX_COLOR_ATTACHMENTS: u32 = 8;
}

/// a system-generated value readable by `LoadSystemValue`
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum SystemValue {
    /// vertex index
    VertexId,
    /// instance index
    InstanceId,
    /// multiview view index
    ViewIndex,
    /// fragment coordinate
    FragCoord,
    /// sample index
    SampleId,
    /// workgroup index
    WorkgroupId,
    /// invocation index within the workgroup
    LocalInvocationId,
    /// subgroup width
    SubgroupSize,
    /// ray launch index
    LaunchId,
    /// primitive index
    PrimitiveId,
}

impl SystemValue {
    /// every system value
    pub const ALL: [SystemValue; 10] = [
        SystemValue::VertexId,
        SystemValue::InstanceId,
        SystemValue::ViewIndex,
        SystemValue::FragCoord,
        SystemValue::SampleId,
        SystemValue::WorkgroupId,
        SystemValue::LocalInvocationId,
        SystemValue::SubgroupSize,
        SystemValue::LaunchId,
        SystemValue::PrimitiveId,
    ];
    /// the keyword used for `self` in the text format
    pub fn name(self) -> &'static str {
        match self {
            SystemValue::VertexId => "vertex_id",
            SystemValue::InstanceId => "instance_id",
            SystemValue::ViewIndex => "view_index",
            SystemValue::FragCoord => "frag_coord",
            SystemValue::SampleId => "sample_id",
            SystemValue::WorkgroupId => "workgroup_id",
            SystemValue::LocalInvocationId => "local_invocation_id",
            SystemValue::SubgroupSize => "subgroup_size",
            SystemValue::LaunchId => "launch_id",
            SystemValue::PrimitiveId => "primitive_id",
        }
    }
    /// the system value with keyword `name`
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|v| v.name() == name)
    }
    fn bit(self) -> u32 {
        1 << (self as u32)
    }
}

/// a set of `SystemValue`s
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct SystemValues(u32);

impl SystemValues {
    /// add `value`
    pub fn insert(&mut self, value: SystemValue) {
        self.0 |= value.bit();
    }
    /// check for `value`
    pub fn contains(self, value: SystemValue) -> bool {
        self.0 & value.bit() != 0
    }
    /// the raw bits
    pub fn bits(self) -> u32 {
        self.0
    }
}

/// tessellation spacing
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum TessSpacing {
    /// not declared by this stage
    Unspecified,
    /// equal spacing
    Equal,
    /// fractional odd spacing
    FractionalOdd,
    /// fractional even spacing
    FractionalEven,
}

/// tessellation domain
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum TessPrimitiveMode {
    /// not declared by this stage
    Unspecified,
    /// triangle domain
    Triangles,
    /// quad domain
    Quads,
    /// isoline domain
    Isolines,
}

impl TessSpacing {
    pub(crate) fn name(self) -> &'static str {
        match self {
            TessSpacing::Unspecified => "unspecified",
            TessSpacing::Equal => "equal",
            TessSpacing::FractionalOdd => "fractional_odd",
            TessSpacing::FractionalEven => "fractional_even",
        }
    }
    pub(crate) fn from_name(name: &str) -> Option<Self> {
        [
            TessSpacing::Unspecified,
            TessSpacing::Equal,
            TessSpacing::FractionalOdd,
            TessSpacing::FractionalEven,
        ]
        .iter()
        .copied()
        .find(|v| v.name() == name)
    }
}

impl TessPrimitiveMode {
    pub(crate) fn name(self) -> &'static str {
        match self {
            TessPrimitiveMode::Unspecified => "unspecified",
            TessPrimitiveMode::Triangles => "triangles",
            TessPrimitiveMode::Quads => "quads",
            TessPrimitiveMode::Isolines => "isolines",
        }
    }
    pub(crate) fn from_name(name: &str) -> Option<Self> {
        [
            TessPrimitiveMode::Unspecified,
            TessPrimitiveMode::Triangles,
            TessPrimitiveMode::Quads,
            TessPrimitiveMode::Isolines,
        ]
        .iter()
        .copied()
        .find(|v| v.name() == name)
    }
}

/// tessellation mode metadata; either tessellation stage may declare it
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct TessInfo {
    /// output patch size, 0 if not declared
    pub vertices_out: u8,
    /// spacing
    pub spacing: TessSpacing,
    /// domain
    pub primitive_mode: TessPrimitiveMode,
    /// counter-clockwise winding
    pub ccw: bool,
    /// output points
    pub point_mode: bool,
}

impl Default for TessInfo {
    fn default() -> Self {
        Self {
            vertices_out: 0,
            spacing: TessSpacing::Unspecified,
            primitive_mode: TessPrimitiveMode::Unspecified,
            ccw: false,
            point_mode: false,
        }
    }
}

/// two tessellation stages set the same field to different values
#[derive(Clone, Debug, Eq, PartialEq, Error)]
#[error("conflicting tessellation {field}: {first} vs {second}")]
pub struct TessInfoConflict {
    /// the field name
    pub field: &'static str,
    /// the value from the control stage
    pub first: String,
    /// the value from the evaluation stage
    pub second: String,
}

fn merge_field<T: Copy + Eq + fmt::Debug>(
    field: &'static str,
    first: T,
    second: T,
    unset: T,
) -> Result<T, TessInfoConflict> {
    if first == unset {
        Ok(second)
    } else if second == unset || first == second {
        Ok(first)
    } else {
        Err(TessInfoConflict {
            field,
            first: format!("{:?}", first),
            second: format!("{:?}", second),
        })
    }
}

impl TessInfo {
    /// combine the declarations of both tessellation stages
    ///
    /// fields left unspecified by one side take the other side's value.
    pub fn merge(&self, other: &TessInfo) -> Result<TessInfo, TessInfoConflict> {
        Ok(TessInfo {
            vertices_out: merge_field("vertices_out", self.vertices_out, other.vertices_out, 0)?,
            spacing: merge_field(
                "spacing",
                self.spacing,
                other.spacing,
                TessSpacing::Unspecified,
            )?,
            primitive_mode: merge_field(
                "primitive_mode",
                self.primitive_mode,
                other.primitive_mode,
                TessPrimitiveMode::Unspecified,
            )?,
            ccw: self.ccw || other.ccw,
            point_mode: self.point_mode || other.point_mode,
        })
    }
}

/// per-program metadata
///
/// `tess`, `workgroup_size`, `shared_memory_size`, `per_view_outputs` and
/// `separate_shader` are declarations carried by the program text; the
/// remaining fields are recomputed by `Program::gather_info`.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct ShaderInfo {
    /// varying slots read
    pub inputs_read: u64,
    /// varying slots written
    pub outputs_written: u64,
    /// per-patch slots read
    pub patch_inputs_read: u32,
    /// per-patch slots written
    pub patch_outputs_written: u32,
    /// outputs replicated once per view
    pub per_view_outputs: u64,
    /// system values read
    pub system_values_read: SystemValues,
    /// tessellation metadata
    pub tess: TessInfo,
    /// local workgroup size
    pub workgroup_size: [u32; 3],
    /// workgroup shared memory in bytes
    pub shared_memory_size: u32,
    /// number of ray-query operations
    pub ray_queries: u32,
    /// the program uses `Discard`
    pub uses_discard: bool,
    /// the program uses `Barrier`
    pub uses_barrier: bool,
    /// the program was compiled without knowledge of its neighbours
    pub separate_shader: bool,
}

impl ShaderInfo {
    /// the view index is read
    pub fn uses_view_index(&self) -> bool {
        self.system_values_read.contains(SystemValue::ViewIndex)
    }
    /// total invocations per workgroup
    pub fn workgroup_invocations(&self) -> u32 {
        self.workgroup_size
            .iter()
            .fold(1u32, |acc, &v| acc.saturating_mul(v.max(1)))
    }
}

impl Program {
    /// recompute the derived fields of `self.info` from the instructions
    pub fn gather_info(&mut self) {
        let info = &mut self.info;
        info.inputs_read = 0;
        info.outputs_written = 0;
        info.patch_inputs_read = 0;
        info.patch_outputs_written = 0;
        info.system_values_read = SystemValues::default();
        info.ray_queries = 0;
        info.uses_discard = false;
        info.uses_barrier = false;
        for instruction in &self.instructions {
            match instruction.op {
                Op::LoadInput { slot } => info.inputs_read |= varying_slot::bit(slot),
                Op::StoreOutput { slot, .. } => info.outputs_written |= varying_slot::bit(slot),
                Op::LoadPatchInput { slot } if slot < 32 => info.patch_inputs_read |= 1 << slot,
                Op::StorePatchOutput { slot, .. } if slot < 32 => {
                    info.patch_outputs_written |= 1 << slot
                }
                Op::LoadSystemValue(value) => info.system_values_read.insert(value),
                Op::RayQuery { .. } => info.ray_queries += 1,
                Op::Discard | Op::Terminate => info.uses_discard = true,
                Op::Barrier => info.uses_barrier = true,
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tess_merge() {
        let tcs = TessInfo {
            vertices_out: 3,
            ccw: true,
            ..TessInfo::default()
        };
        let tes = TessInfo {
            spacing: TessSpacing::FractionalOdd,
            primitive_mode: TessPrimitiveMode::Triangles,
            ..TessInfo::default()
        };
        let merged = tcs.merge(&tes).unwrap();
        assert_eq!(merged.vertices_out, 3);
        assert_eq!(merged.spacing, TessSpacing::FractionalOdd);
        assert_eq!(merged.primitive_mode, TessPrimitiveMode::Triangles);
        assert!(merged.ccw);
        assert!(!merged.point_mode);
    }

    #[test]
    fn test_tess_merge_conflict() {
        let tcs = TessInfo {
            primitive_mode: TessPrimitiveMode::Quads,
            ..TessInfo::default()
        };
        let tes = TessInfo {
            primitive_mode: TessPrimitiveMode::Triangles,
            ..TessInfo::default()
        };
        let error = tcs.merge(&tes).unwrap_err();
        assert_eq!(error.field, "primitive_mode");
        let same = tcs.merge(&tcs).unwrap();
        assert_eq!(same.primitive_mode, TessPrimitiveMode::Quads);
    }

    #[test]
    fn test_system_values() {
        let mut values = SystemValues::default();
        assert!(!values.contains(SystemValue::ViewIndex));
        values.insert(SystemValue::ViewIndex);
        assert!(values.contains(SystemValue::ViewIndex));
        assert!(!values.contains(SystemValue::VertexId));
        for value in SystemValue::ALL.iter().copied() {
            assert_eq!(SystemValue::from_name(value.name()), Some(value));
        }
    }
}
