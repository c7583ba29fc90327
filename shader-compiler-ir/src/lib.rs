// SPDX-License-Identifier: LGPL-2.1-or-later
// See Notices.txt for copyright information
#![deny(missing_docs)]

//! Shader Compiler Intermediate Representation

mod info;
pub mod opt;
mod pass;
mod program;
mod stage;
mod text;

pub use crate::info::{
    fragment_result, varying_slot, ShaderInfo, SystemValue, SystemValues, TessInfo,
    TessInfoConflict, TessPrimitiveMode, TessSpacing,
};
pub use crate::pass::{FixedPointOutcome, Pass, PassList};
pub use crate::program::{BinaryOp, Instruction, Op, Program, Resource, ValueId};
pub use crate::stage::ShaderStage;
pub use crate::text::{ParseError, TextLocation};
