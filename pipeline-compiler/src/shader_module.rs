// SPDX-License-Identifier: LGPL-2.1-or-later
// See Notices.txt for copyright information

use crate::descriptor_set::PipelineLayout;
use sha2::{Digest, Sha256};
use shader_compiler_backend::key::RobustFlags;
use shader_compiler_ir::{Program, ShaderStage};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

#[derive(Clone, Eq, PartialEq, Hash)]
pub struct ShaderModule {
    code: String,
    sha: [u8; 32],
}

impl ShaderModule {
    pub fn new(code: impl Into<String>) -> Self {
        let code = code.into();
        let sha = Sha256::digest(code.as_bytes()).into();
        Self { code, sha }
    }
    pub fn code(&self) -> &str {
        &self.code
    }
    /// the identifier an application can pass instead of the module
    pub fn identifier(&self) -> [u8; 32] {
        self.sha
    }
}

impl fmt::Debug for ShaderModule {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ShaderModule")
            .field("code_len", &self.code.len())
            .finish()
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum ShaderSource {
    Module(Arc<ShaderModule>),
    /// a module identifier; only usable if the program is already cached
    Identifier([u8; 32]),
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct ShaderStageCreateInfo {
    pub stage: ShaderStage,
    pub source: ShaderSource,
    pub entry_point: String,
    /// overrides the device's default robustness
    pub robustness: Option<RobustFlags>,
}

impl ShaderStageCreateInfo {
    pub fn new(stage: ShaderStage, module: Arc<ShaderModule>) -> Self {
        Self {
            stage,
            source: ShaderSource::Module(module),
            entry_point: "main".into(),
            robustness: None,
        }
    }
    pub fn module(&self) -> Option<&ShaderModule> {
        match &self.source {
            ShaderSource::Module(module) => Some(module),
            ShaderSource::Identifier(_) => None,
        }
    }
    /// hash identifying the stage's source
    ///
    /// a module and its identifier produce the same hash.
    pub fn shader_sha(&self) -> [u8; 32] {
        let identifier = match &self.source {
            ShaderSource::Module(module) => module.identifier(),
            ShaderSource::Identifier(identifier) => *identifier,
        };
        let mut hasher = Sha256::new();
        hasher.update([self.stage.to_index()]);
        hasher.update(identifier);
        hasher.update((self.entry_point.len() as u32).to_le_bytes());
        hasher.update(self.entry_point.as_bytes());
        hasher.finalize().into()
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Error)]
#[error("{message}")]
pub struct TranslateError {
    pub message: String,
}

/// turns shader modules into intermediate programs
pub trait ShaderTranslator: fmt::Debug + Send + Sync {
    fn translate(
        &self,
        module: &ShaderModule,
        stage: ShaderStage,
        entry_point: &str,
        layout: &PipelineLayout,
    ) -> Result<Program, TranslateError>;
}

/// translator for modules written in the intermediate program's text form
#[derive(Copy, Clone, Debug, Default)]
pub struct IrTextTranslator;

impl ShaderTranslator for IrTextTranslator {
    fn translate(
        &self,
        module: &ShaderModule,
        stage: ShaderStage,
        entry_point: &str,
        _layout: &PipelineLayout,
    ) -> Result<Program, TranslateError> {
        let program = Program::parse(module.code()).map_err(|e| TranslateError {
            message: e.to_string(),
        })?;
        if program.stage != stage {
            return Err(TranslateError {
                message: format!("module is a {} shader, not {}", program.stage, stage),
            });
        }
        if program.entry_point != entry_point {
            return Err(TranslateError {
                message: format!("entry point not found: {}", entry_point),
            });
        }
        Ok(program)
    }
}
