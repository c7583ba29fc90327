// SPDX-License-Identifier: LGPL-2.1-or-later
// See Notices.txt for copyright information

use crate::info::{ShaderInfo, SystemValue};
use crate::stage::ShaderStage;
use std::fmt;

/// an SSA value produced by an `Instruction`
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ValueId(pub u32);

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// a two-operand integer operation
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum BinaryOp {
    /// wrapping addition
    Add,
    /// wrapping subtraction
    Sub,
    /// wrapping multiplication
    Mul,
    /// bitwise and
    And,
    /// bitwise or
    Or,
    /// bitwise xor
    Xor,
    /// shift left
    Shl,
    /// logical shift right
    Shr,
}

impl BinaryOp {
    /// every binary op
    pub const ALL: [BinaryOp; 8] = [
        BinaryOp::Add,
        BinaryOp::Sub,
        BinaryOp::Mul,
        BinaryOp::And,
        BinaryOp::Or,
        BinaryOp::Xor,
        BinaryOp::Shl,
        BinaryOp::Shr,
    ];
    /// the keyword used for `self` in the text format
    pub fn name(self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::Xor => "xor",
            BinaryOp::Shl => "shl",
            BinaryOp::Shr => "shr",
        }
    }
    /// the op with keyword `name`
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|op| op.name() == name)
    }
    /// evaluate on constants
    pub fn evaluate(self, lhs: u32, rhs: u32) -> u32 {
        match self {
            BinaryOp::Add => lhs.wrapping_add(rhs),
            BinaryOp::Sub => lhs.wrapping_sub(rhs),
            BinaryOp::Mul => lhs.wrapping_mul(rhs),
            BinaryOp::And => lhs & rhs,
            BinaryOp::Or => lhs | rhs,
            BinaryOp::Xor => lhs ^ rhs,
            BinaryOp::Shl => lhs.wrapping_shl(rhs),
            BinaryOp::Shr => lhs.wrapping_shr(rhs),
        }
    }
}

/// memory accessed by `Load`/`Store`
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Resource {
    /// a descriptor named by set and binding, not yet lowered
    Descriptor {
        /// descriptor set index
        set: u32,
        /// binding within the set
        binding: u32,
    },
    /// a binding-table surface slot
    Surface(u32),
    /// a descriptor fetched from descriptor-set memory
    Indirect {
        /// descriptor set index
        set: u32,
        /// byte offset of the descriptor within the set
        descriptor_offset: u32,
    },
    /// push constants
    PushConstant,
    /// workgroup shared memory
    Shared,
}

/// an instruction's operation
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum Op {
    /// a 32-bit constant
    Constant(u32),
    /// copy of another value
    Copy(ValueId),
    /// integer arithmetic
    Binary(BinaryOp, ValueId, ValueId),
    /// read a varying input
    LoadInput {
        /// varying slot
        slot: u32,
    },
    /// write a varying output
    StoreOutput {
        /// varying slot
        slot: u32,
        /// stored value
        value: ValueId,
    },
    /// read a per-patch input
    LoadPatchInput {
        /// patch slot
        slot: u32,
    },
    /// write a per-patch output
    StorePatchOutput {
        /// patch slot
        slot: u32,
        /// stored value
        value: ValueId,
    },
    /// read a system value
    LoadSystemValue(SystemValue),
    /// read memory
    Load {
        /// accessed memory
        resource: Resource,
        /// byte offset
        offset: ValueId,
    },
    /// write memory
    Store {
        /// accessed memory
        resource: Resource,
        /// byte offset
        offset: ValueId,
        /// stored value
        value: ValueId,
    },
    /// discard the fragment, continue as a helper invocation
    Discard,
    /// discard the fragment and stop executing
    Terminate,
    /// workgroup barrier
    Barrier,
    /// trace a ray
    TraceRay {
        /// payload value
        payload: ValueId,
    },
    /// report a candidate intersection
    ReportIntersection {
        /// hit distance
        hit_t: ValueId,
    },
    /// reject the current candidate intersection
    IgnoreIntersection,
    /// invoke a callable shader
    ExecuteCallable {
        /// callable data
        data: ValueId,
    },
    /// a ray-query operation
    RayQuery {
        /// query operand
        operand: ValueId,
    },
}

impl Op {
    /// `true` if the op defines a value
    pub fn has_result(&self) -> bool {
        match self {
            Op::Constant(_)
            | Op::Copy(_)
            | Op::Binary(..)
            | Op::LoadInput { .. }
            | Op::LoadPatchInput { .. }
            | Op::LoadSystemValue(_)
            | Op::Load { .. }
            | Op::RayQuery { .. } => true,
            _ => false,
        }
    }
    /// `true` if the op can't be removed when its result is unused
    pub fn has_side_effects(&self) -> bool {
        match self {
            Op::Constant(_)
            | Op::Copy(_)
            | Op::Binary(..)
            | Op::LoadInput { .. }
            | Op::LoadPatchInput { .. }
            | Op::LoadSystemValue(_)
            | Op::Load { .. } => false,
            _ => true,
        }
    }
    /// the values read by the op
    pub fn operands(&self) -> Vec<ValueId> {
        let mut retval = Vec::new();
        self.visit_operands(|v| retval.push(v));
        retval
    }
    /// call `f` on every value read by the op
    pub fn visit_operands(&self, mut f: impl FnMut(ValueId)) {
        match *self {
            Op::Copy(v)
            | Op::StoreOutput { value: v, .. }
            | Op::StorePatchOutput { value: v, .. }
            | Op::Load { offset: v, .. }
            | Op::TraceRay { payload: v }
            | Op::ReportIntersection { hit_t: v }
            | Op::ExecuteCallable { data: v }
            | Op::RayQuery { operand: v } => f(v),
            Op::Binary(_, lhs, rhs) => {
                f(lhs);
                f(rhs);
            }
            Op::Store { offset, value, .. } => {
                f(offset);
                f(value);
            }
            Op::Constant(_)
            | Op::LoadInput { .. }
            | Op::LoadPatchInput { .. }
            | Op::LoadSystemValue(_)
            | Op::Discard
            | Op::Terminate
            | Op::Barrier
            | Op::IgnoreIntersection => {}
        }
    }
    /// call `f` on a mutable reference to every value read by the op
    pub fn visit_operands_mut(&mut self, mut f: impl FnMut(&mut ValueId)) {
        match self {
            Op::Copy(v)
            | Op::StoreOutput { value: v, .. }
            | Op::StorePatchOutput { value: v, .. }
            | Op::Load { offset: v, .. }
            | Op::TraceRay { payload: v }
            | Op::ReportIntersection { hit_t: v }
            | Op::ExecuteCallable { data: v }
            | Op::RayQuery { operand: v } => f(v),
            Op::Binary(_, lhs, rhs) => {
                f(lhs);
                f(rhs);
            }
            Op::Store { offset, value, .. } => {
                f(offset);
                f(value);
            }
            Op::Constant(_)
            | Op::LoadInput { .. }
            | Op::LoadPatchInput { .. }
            | Op::LoadSystemValue(_)
            | Op::Discard
            | Op::Terminate
            | Op::Barrier
            | Op::IgnoreIntersection => {}
        }
    }
}

/// one instruction of a `Program`
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct Instruction {
    /// defined value, present iff `op.has_result()`
    pub result: Option<ValueId>,
    /// the operation
    pub op: Op,
}

/// a straight-line shader program for one stage
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct Program {
    /// the stage this program runs in
    pub stage: ShaderStage,
    /// entry point name
    pub entry_point: String,
    /// metadata
    pub info: ShaderInfo,
    /// instructions in execution order
    pub instructions: Vec<Instruction>,
    next_value: u32,
}

impl Program {
    /// create an empty program
    pub fn new(stage: ShaderStage, entry_point: impl Into<String>) -> Self {
        Self {
            stage,
            entry_point: entry_point.into(),
            info: ShaderInfo::default(),
            instructions: Vec::new(),
            next_value: 0,
        }
    }
    /// allocate a fresh value
    pub fn new_value(&mut self) -> ValueId {
        let retval = ValueId(self.next_value);
        self.next_value += 1;
        retval
    }
    /// the number of values allocated so far
    pub fn value_count(&self) -> u32 {
        self.next_value
    }
    pub(crate) fn reserve_value(&mut self, value: ValueId) {
        self.next_value = self.next_value.max(value.0 + 1);
    }
    /// append `op`, returning its result if it has one
    pub fn push(&mut self, op: Op) -> Option<ValueId> {
        let result = if op.has_result() {
            Some(self.new_value())
        } else {
            None
        };
        self.instructions.push(Instruction { result, op });
        result
    }
    /// append `op`, which must define a value
    ///
    /// # Panics
    ///
    /// panics if `op` doesn't define a value
    pub fn push_value(&mut self, op: Op) -> ValueId {
        assert!(op.has_result(), "op defines no value: {:?}", op);
        let result = self.new_value();
        self.instructions.push(Instruction {
            result: Some(result),
            op,
        });
        result
    }
    /// renumber `other`'s values past this program's values and return its
    /// instructions, ready to be spliced into `self`
    pub fn import_instructions(&mut self, other: &Program) -> Vec<Instruction> {
        let base = self.next_value;
        self.next_value += other.next_value;
        other
            .instructions
            .iter()
            .map(|instruction| {
                let mut instruction = instruction.clone();
                instruction.result = instruction.result.map(|v| ValueId(v.0 + base));
                instruction.op.visit_operands_mut(|v| v.0 += base);
                instruction
            })
            .collect()
    }
}
