// SPDX-License-Identifier: LGPL-2.1-or-later
// See Notices.txt for copyright information

use crate::descriptor_set::PipelineLayout;
use crate::device::Device;
use crate::errors::{PipelineError, Result};
use crate::executable::PipelineExecutable;
use crate::flags::PipelineCreateFlags;
use crate::graphics::{assemble, GraphicsBase, GraphicsPipelineCreateInfo, GraphicsShader};
use crate::pipeline::{GenericPipeline, GenericPipelineSized, Pipeline, PipelineCore};
use crate::stage_set::ShaderStageSet;
use crate::state::GraphicsPipelineState;
use log::debug;
use pipeline_cache::PipelineCache;
use shader_compiler_ir::ShaderStage;
use std::sync::Arc;

/// a graphics pipeline holding a subset of the stages, imported into later
/// pipelines
#[derive(Debug)]
pub struct GraphicsLibraryPipeline {
    base: GraphicsBase,
    retain: bool,
}

impl GraphicsLibraryPipeline {
    pub fn state(&self) -> &GraphicsPipelineState {
        self.base.state()
    }
    pub fn shaders(&self) -> &[GraphicsShader] {
        self.base.shaders()
    }
    pub fn shader(&self, stage: ShaderStage) -> Option<&GraphicsShader> {
        self.base.shader(stage)
    }
    /// `true` if the intermediate programs were kept for link-time optimization
    pub fn retains_programs(&self) -> bool {
        self.retain
    }
}

impl GenericPipeline for GraphicsLibraryPipeline {
    fn core(&self) -> &PipelineCore {
        &self.base.core
    }
}

impl GenericPipelineSized for GraphicsLibraryPipeline {
    type PipelineCreateInfo = GraphicsPipelineCreateInfo;
    fn create(
        device: &Device,
        pipeline_cache: Option<&PipelineCache>,
        create_info: &GraphicsPipelineCreateInfo,
    ) -> Result<Self> {
        let flags = create_info.flags | PipelineCreateFlags::LIBRARY;
        let retain = flags.contains(PipelineCreateFlags::RETAIN_LINK_TIME_OPTIMIZATION_INFO);
        let base = assemble(device, device.cache(pipeline_cache), create_info, flags, retain)?;
        Ok(Self { base, retain })
    }
    fn create_flags(create_info: &GraphicsPipelineCreateInfo) -> PipelineCreateFlags {
        create_info.flags | PipelineCreateFlags::LIBRARY
    }
    fn to_pipeline(self) -> Pipeline {
        Pipeline::GraphicsLibrary(Arc::new(self))
    }
}

/// what a pipeline in progress collects from the libraries it imports
#[derive(Debug)]
pub(crate) struct LibraryImports {
    pub(crate) layout: PipelineLayout,
    pub(crate) state: GraphicsPipelineState,
    /// feedback indices already rebased onto the importing pipeline
    pub(crate) shaders: Vec<GraphicsShader>,
    pub(crate) executables: Vec<PipelineExecutable>,
    pub(crate) stages: ShaderStageSet,
    /// number of per-stage feedback slots taken by imported stages
    pub(crate) feedback_count: usize,
}

impl LibraryImports {
    pub(crate) fn new(layout: &PipelineLayout, state: &GraphicsPipelineState) -> Self {
        Self {
            layout: layout.clone(),
            state: state.clone(),
            shaders: Vec::new(),
            executables: Vec::new(),
            stages: ShaderStageSet::empty(),
            feedback_count: 0,
        }
    }
    pub(crate) fn import(
        &mut self,
        library: &GraphicsLibraryPipeline,
        link_time_optimize: bool,
    ) -> Result<()> {
        if link_time_optimize && !library.retains_programs() {
            return Err(PipelineError::InvalidUsage(
                "link-time optimization needs libraries created with \
                 RETAIN_LINK_TIME_OPTIMIZATION_INFO"
                    .into(),
            ));
        }
        let library_stages: ShaderStageSet = library.shaders().iter().map(|v| v.stage).collect();
        if self.stages.intersects(library_stages) {
            return Err(PipelineError::InvalidUsage(format!(
                "stages {:?} are provided by more than one library",
                self.stages.intersection(library_stages)
            )));
        }
        debug!("importing graphics library with stages {:?}", library_stages);
        self.layout.merge(library.layout());
        self.state.merge(library.state());
        let offset = self.feedback_count;
        for shader in library.shaders() {
            let mut shader = shader.clone();
            shader.feedback_index += offset;
            self.shaders.push(shader);
        }
        self.feedback_count += library.creation_feedback().stages.len();
        self.stages = self.stages.union(library_stages);
        // link-time optimization produces new binaries with new executables
        if !link_time_optimize {
            self.executables
                .extend(library.executables().iter().cloned());
        }
        Ok(())
    }
}
