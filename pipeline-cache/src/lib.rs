// SPDX-License-Identifier: LGPL-2.1-or-later
// See Notices.txt for copyright information
#![deny(missing_docs)]

//! content-addressed store for compiled shaders and intermediate programs

mod codec;
mod key;
mod object;
mod store;

pub use crate::codec::DecodeError;
pub use crate::key::CacheKey;
pub use crate::object::{
    BindMap, CacheObject, CachedProgram, ObjectKind, PipelineBinding, PushRange, ShaderBinary,
};
pub use crate::store::{CacheHeader, CacheStats, ImportReport, PipelineCache};
