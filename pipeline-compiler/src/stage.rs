// SPDX-License-Identifier: LGPL-2.1-or-later
// See Notices.txt for copyright information

use crate::pipeline::CreationFeedback;
use crate::shader_module::ShaderStageCreateInfo;
use pipeline_cache::{BindMap, CacheKey, ShaderBinary};
use shader_compiler_backend::key::{BaseKey, RobustFlags};
use shader_compiler_backend::StageKey;
use shader_compiler_ir::{Program, ShaderStage};
use std::sync::Arc;

/// working state for one stage during a single pipeline compile
///
/// `program` points into the compile's arena and is gone once the compile
/// returns; only `binary` outlives it.
#[derive(Debug)]
pub struct Stage<'a> {
    pub stage: ShaderStage,
    pub create_info: Option<&'a ShaderStageCreateInfo>,
    pub shader_sha: [u8; 32],
    pub source_hash: u32,
    pub robust_flags: RobustFlags,
    pub key: StageKey,
    pub cache_key: CacheKey,
    pub feedback: CreationFeedback,
    pub feedback_index: usize,
    /// binary compiled by an imported library
    pub imported_binary: Option<Arc<ShaderBinary>>,
    /// program kept by an imported library or retained for this one
    pub retained_program: Option<Arc<Program>>,
    pub program: Option<&'a mut Program>,
    pub bind_map: BindMap,
    pub push_descriptor_mask: u32,
    pub binary: Option<Arc<ShaderBinary>>,
}

impl<'a> Stage<'a> {
    pub fn new(stage: ShaderStage, shader_sha: [u8; 32], robust_flags: RobustFlags) -> Self {
        Self {
            stage,
            create_info: None,
            shader_sha,
            source_hash: u32::from_le_bytes([
                shader_sha[0],
                shader_sha[1],
                shader_sha[2],
                shader_sha[3],
            ]),
            robust_flags,
            key: StageKey::new(stage, BaseKey::default()),
            cache_key: CacheKey {
                stage,
                hash: [0; 32],
            },
            feedback: CreationFeedback::default(),
            feedback_index: 0,
            imported_binary: None,
            retained_program: None,
            program: None,
            bind_map: BindMap::default(),
            push_descriptor_mask: 0,
            binary: None,
        }
    }
    pub fn from_create_info(
        create_info: &'a ShaderStageCreateInfo,
        robust_flags: RobustFlags,
        feedback_index: usize,
    ) -> Self {
        Self {
            create_info: Some(create_info),
            feedback_index,
            ..Self::new(create_info.stage, create_info.shader_sha(), robust_flags)
        }
    }
    /// `true` if the stage is being compiled in this call
    pub fn is_compiling(&self) -> bool {
        self.program.is_some()
    }
}
