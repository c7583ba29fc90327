// SPDX-License-Identifier: LGPL-2.1-or-later
// See Notices.txt for copyright information

use crate::codec::{DecodeError, Reader, Writer};
use crate::key::CacheKey;
use shader_compiler_backend::{CompileStatistics, ResourceUsage};
use shader_compiler_ir::{Program, ShaderStage};
use std::sync::Arc;

/// the kinds of object a `PipelineCache` holds
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum ObjectKind {
    /// a compiled `ShaderBinary`
    ShaderBinary,
    /// an intermediate `Program`
    Program,
}

impl ObjectKind {
    pub(crate) fn to_byte(self) -> u8 {
        match self {
            ObjectKind::ShaderBinary => 1,
            ObjectKind::Program => 2,
        }
    }
    pub(crate) fn from_byte(value: u8) -> Option<Self> {
        match value {
            1 => Some(ObjectKind::ShaderBinary),
            2 => Some(ObjectKind::Program),
            _ => None,
        }
    }
}

/// where a binding-table slot's descriptor comes from
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct PipelineBinding {
    /// descriptor set
    pub set: u32,
    /// binding in the set
    pub binding: u32,
    /// array element
    pub index: u32,
}

/// a push constant range copied into the thread payload
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct PushRange {
    /// byte offset
    pub offset: u32,
    /// byte size
    pub size: u32,
}

/// how a compiled shader's resource slots map to descriptors
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct BindMap {
    /// binding-table surfaces in slot order
    pub surfaces: Vec<PipelineBinding>,
    /// push constant ranges
    pub push_ranges: Vec<PushRange>,
    /// hash of the descriptor set layouts the map was built against
    pub layout_hash: [u8; 32],
}

/// a compiled shader with everything needed to bind and introspect it
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct ShaderBinary {
    /// the address this binary is cached under
    pub key: CacheKey,
    /// the stage
    pub stage: ShaderStage,
    /// machine code
    pub code: Vec<u8>,
    /// resource usage
    pub resource_usage: ResourceUsage,
    /// one entry per compiled dispatch width
    pub statistics: Vec<CompileStatistics>,
    /// descriptor mapping
    pub bind_map: BindMap,
    /// mask of push-descriptor bindings accessed
    pub push_descriptor_mask: u32,
    /// short hash of the source, reported in statistics
    pub source_hash: u32,
    /// final intermediate program text, when captured
    pub ir_text: Option<String>,
    /// final disassembly, when captured
    pub disassembly: Option<String>,
}

impl ShaderBinary {
    /// `true` if push descriptors are accessed
    pub fn uses_push_descriptors(&self) -> bool {
        self.push_descriptor_mask != 0
    }

    pub(crate) fn encode(&self, w: &mut Writer) {
        w.bytes(&self.code);
        let usage = &self.resource_usage;
        w.u32(usage.scratch_size);
        w.u32(usage.shared_memory_size);
        w.u32(usage.stack_size);
        w.u32(usage.registers_used);
        w.u32(usage.ray_queries);
        w.u64(usage.output_slots_valid);
        w.u32(usage.push_constant_size);
        w.u32(self.statistics.len() as u32);
        for stats in &self.statistics {
            w.u8(stats.dispatch_width);
            w.u32(stats.instructions);
            w.u32(stats.sends);
            w.u32(stats.loops);
            w.u32(stats.cycles);
            w.u32(stats.spills);
            w.u32(stats.fills);
            w.u32(stats.max_live_registers);
            w.u8(stats.max_dispatch_width);
        }
        w.u32(self.bind_map.surfaces.len() as u32);
        for surface in &self.bind_map.surfaces {
            w.u32(surface.set);
            w.u32(surface.binding);
            w.u32(surface.index);
        }
        w.u32(self.bind_map.push_ranges.len() as u32);
        for range in &self.bind_map.push_ranges {
            w.u32(range.offset);
            w.u32(range.size);
        }
        w.raw(&self.bind_map.layout_hash);
        w.u32(self.push_descriptor_mask);
        w.u32(self.source_hash);
        w.opt_str(self.ir_text.as_deref());
        w.opt_str(self.disassembly.as_deref());
    }

    pub(crate) fn decode(key: CacheKey, r: &mut Reader) -> Result<Self, DecodeError> {
        let code = r.bytes()?.to_vec();
        let resource_usage = ResourceUsage {
            scratch_size: r.u32()?,
            shared_memory_size: r.u32()?,
            stack_size: r.u32()?,
            registers_used: r.u32()?,
            ray_queries: r.u32()?,
            output_slots_valid: r.u64()?,
            push_constant_size: r.u32()?,
        };
        let statistics = (0..r.u32()?)
            .map(|_| {
                Ok(CompileStatistics {
                    dispatch_width: r.u8()?,
                    instructions: r.u32()?,
                    sends: r.u32()?,
                    loops: r.u32()?,
                    cycles: r.u32()?,
                    spills: r.u32()?,
                    fills: r.u32()?,
                    max_live_registers: r.u32()?,
                    max_dispatch_width: r.u8()?,
                })
            })
            .collect::<Result<_, DecodeError>>()?;
        let surfaces = (0..r.u32()?)
            .map(|_| {
                Ok(PipelineBinding {
                    set: r.u32()?,
                    binding: r.u32()?,
                    index: r.u32()?,
                })
            })
            .collect::<Result<_, DecodeError>>()?;
        let push_ranges = (0..r.u32()?)
            .map(|_| {
                Ok(PushRange {
                    offset: r.u32()?,
                    size: r.u32()?,
                })
            })
            .collect::<Result<_, DecodeError>>()?;
        let layout_hash = r.array()?;
        Ok(ShaderBinary {
            key,
            stage: key.stage,
            code,
            resource_usage,
            statistics,
            bind_map: BindMap {
                surfaces,
                push_ranges,
                layout_hash,
            },
            push_descriptor_mask: r.u32()?,
            source_hash: r.u32()?,
            ir_text: r.opt_string()?,
            disassembly: r.opt_string()?,
        })
    }
}

/// an intermediate program kept for later recompilation
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct CachedProgram {
    /// the address this program is cached under
    pub key: CacheKey,
    /// the program
    pub program: Program,
}

impl CachedProgram {
    pub(crate) fn encode(&self, w: &mut Writer) {
        w.raw(self.program.to_string().as_bytes());
    }
    pub(crate) fn decode(key: CacheKey, r: &mut Reader) -> Result<Self, DecodeError> {
        let text = r.raw(r.remaining())?;
        let text = std::str::from_utf8(text).map_err(|_| DecodeError::InvalidUtf8)?;
        let program = Program::parse(text)?;
        if program.stage != key.stage {
            return Err(DecodeError::InvalidValue {
                what: "program stage",
                value: program.stage.to_index().into(),
            });
        }
        Ok(CachedProgram { key, program })
    }
}

/// an object held by a `PipelineCache`
#[derive(Clone, Debug)]
pub enum CacheObject {
    /// a compiled shader
    ShaderBinary(Arc<ShaderBinary>),
    /// an intermediate program
    Program(Arc<CachedProgram>),
}

impl CacheObject {
    /// the object's kind
    pub fn kind(&self) -> ObjectKind {
        match self {
            CacheObject::ShaderBinary(_) => ObjectKind::ShaderBinary,
            CacheObject::Program(_) => ObjectKind::Program,
        }
    }
    /// the object's address
    pub fn key(&self) -> CacheKey {
        match self {
            CacheObject::ShaderBinary(v) => v.key,
            CacheObject::Program(v) => v.key,
        }
    }
    /// `true` if both refer to the same allocation
    pub fn ptr_eq(&self, other: &CacheObject) -> bool {
        match (self, other) {
            (CacheObject::ShaderBinary(a), CacheObject::ShaderBinary(b)) => Arc::ptr_eq(a, b),
            (CacheObject::Program(a), CacheObject::Program(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
    pub(crate) fn encode(&self, w: &mut Writer) {
        match self {
            CacheObject::ShaderBinary(v) => v.encode(w),
            CacheObject::Program(v) => v.encode(w),
        }
    }
    pub(crate) fn decode(kind: ObjectKind, key: CacheKey, payload: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(payload);
        let retval = match kind {
            ObjectKind::ShaderBinary => {
                CacheObject::ShaderBinary(Arc::new(ShaderBinary::decode(key, &mut r)?))
            }
            ObjectKind::Program => CacheObject::Program(Arc::new(CachedProgram::decode(key, &mut r)?)),
        };
        r.finish()?;
        Ok(retval)
    }
}

impl From<ShaderBinary> for CacheObject {
    fn from(v: ShaderBinary) -> Self {
        CacheObject::ShaderBinary(Arc::new(v))
    }
}

impl From<CachedProgram> for CacheObject {
    fn from(v: CachedProgram) -> Self {
        CacheObject::Program(Arc::new(v))
    }
}
