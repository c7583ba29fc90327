// SPDX-License-Identifier: LGPL-2.1-or-later
// See Notices.txt for copyright information

use crate::compute::ComputePipeline;
use crate::descriptor_set::PipelineLayout;
use crate::device::Device;
use crate::errors::{PipelineError, Result};
use crate::executable::{ExecutableStatistic, InternalRepresentation, PipelineExecutable};
use crate::flags::PipelineCreateFlags;
use crate::graphics::GraphicsPipeline;
use crate::library::GraphicsLibraryPipeline;
use crate::ray_tracing::RayTracingPipeline;
use crate::stage::Stage;
use crate::stage_set::ShaderStageSet;
use pipeline_cache::{PipelineCache, ShaderBinary};
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct CreationFeedback {
    pub valid: bool,
    /// found in the pipeline cache instead of compiled
    pub cache_hit: bool,
    pub duration: Duration,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PipelineCreationFeedback {
    pub pipeline: CreationFeedback,
    /// indexed by the order stages were specified, imported stages first
    pub stages: Vec<CreationFeedback>,
}

/// state shared by every pipeline kind
#[derive(Debug)]
pub struct PipelineCore {
    pub(crate) flags: PipelineCreateFlags,
    pub(crate) layout: Arc<PipelineLayout>,
    pub(crate) active_stages: ShaderStageSet,
    pub(crate) executables: Vec<PipelineExecutable>,
    pub(crate) feedback: PipelineCreationFeedback,
    pub(crate) scratch_size: u32,
    pub(crate) ray_queries: u32,
    pub(crate) uses_push_descriptors: bool,
}

impl PipelineCore {
    pub(crate) fn new(flags: PipelineCreateFlags, layout: Arc<PipelineLayout>) -> Self {
        Self {
            flags,
            layout,
            active_stages: ShaderStageSet::empty(),
            executables: Vec::new(),
            feedback: PipelineCreationFeedback::default(),
            scratch_size: 0,
            ray_queries: 0,
            uses_push_descriptors: false,
        }
    }
    /// include `binary` in the pipeline-wide resource totals
    pub(crate) fn account(&mut self, binary: &ShaderBinary) {
        self.active_stages.insert(binary.stage);
        self.scratch_size = self.scratch_size.max(binary.resource_usage.scratch_size);
        self.ray_queries = self.ray_queries.max(binary.resource_usage.ray_queries);
        self.uses_push_descriptors |= binary.uses_push_descriptors();
    }
    /// record per-stage feedback, slot `feedback_index` for each stage
    pub(crate) fn record_stage_feedback(&mut self, stages: &[Stage]) {
        for stage in stages {
            let stages = &mut self.feedback.stages;
            if stages.len() <= stage.feedback_index {
                stages.resize(stage.feedback_index + 1, CreationFeedback::default());
            }
            stages[stage.feedback_index] = CreationFeedback {
                valid: true,
                ..stage.feedback
            };
        }
    }
    pub(crate) fn finish(&mut self, start: Instant, cache_hit: bool) {
        self.feedback.pipeline = CreationFeedback {
            valid: true,
            cache_hit,
            duration: start.elapsed(),
        };
    }
}

pub trait GenericPipeline: fmt::Debug + Send + Sync + 'static {
    fn core(&self) -> &PipelineCore;
    fn flags(&self) -> PipelineCreateFlags {
        self.core().flags
    }
    fn layout(&self) -> &Arc<PipelineLayout> {
        &self.core().layout
    }
    fn active_stages(&self) -> ShaderStageSet {
        self.core().active_stages
    }
    fn creation_feedback(&self) -> &PipelineCreationFeedback {
        &self.core().feedback
    }
    /// largest per-thread scratch size of any stage
    fn scratch_size(&self) -> u32 {
        self.core().scratch_size
    }
    fn ray_queries(&self) -> u32 {
        self.core().ray_queries
    }
    fn uses_push_descriptors(&self) -> bool {
        self.core().uses_push_descriptors
    }
    fn executables(&self) -> &[PipelineExecutable] {
        &self.core().executables
    }
    fn executable(&self, index: usize) -> Result<&PipelineExecutable> {
        self.executables().get(index).ok_or_else(|| {
            PipelineError::InvalidUsage(format!("executable index out of range: {}", index))
        })
    }
    fn executable_statistics(&self, index: usize) -> Result<Vec<ExecutableStatistic>> {
        if !self.flags().contains(PipelineCreateFlags::CAPTURE_STATISTICS) {
            return Err(PipelineError::InvalidUsage(
                "pipeline wasn't created with CAPTURE_STATISTICS".into(),
            ));
        }
        Ok(self.executable(index)?.statistics())
    }
    fn executable_internal_representations(
        &self,
        index: usize,
    ) -> Result<Vec<InternalRepresentation>> {
        if !self
            .flags()
            .contains(PipelineCreateFlags::CAPTURE_INTERNAL_REPRESENTATIONS)
        {
            return Err(PipelineError::InvalidUsage(
                "pipeline wasn't created with CAPTURE_INTERNAL_REPRESENTATIONS".into(),
            ));
        }
        Ok(self.executable(index)?.internal_representations())
    }
}

pub trait GenericPipelineSized: GenericPipeline + Sized {
    type PipelineCreateInfo;
    fn create(
        device: &Device,
        pipeline_cache: Option<&PipelineCache>,
        create_info: &Self::PipelineCreateInfo,
    ) -> Result<Self>;
    fn create_flags(create_info: &Self::PipelineCreateInfo) -> PipelineCreateFlags;
    fn to_pipeline(self) -> Pipeline;
}

#[derive(Debug)]
pub enum Pipeline {
    Graphics(GraphicsPipeline),
    GraphicsLibrary(Arc<GraphicsLibraryPipeline>),
    Compute(ComputePipeline),
    RayTracing(Arc<RayTracingPipeline>),
}

impl Pipeline {
    pub fn as_graphics(&self) -> Option<&GraphicsPipeline> {
        match self {
            Pipeline::Graphics(v) => Some(v),
            _ => None,
        }
    }
    pub fn as_graphics_library(&self) -> Option<&Arc<GraphicsLibraryPipeline>> {
        match self {
            Pipeline::GraphicsLibrary(v) => Some(v),
            _ => None,
        }
    }
    pub fn as_compute(&self) -> Option<&ComputePipeline> {
        match self {
            Pipeline::Compute(v) => Some(v),
            _ => None,
        }
    }
    pub fn as_ray_tracing(&self) -> Option<&Arc<RayTracingPipeline>> {
        match self {
            Pipeline::RayTracing(v) => Some(v),
            _ => None,
        }
    }
}

impl Deref for Pipeline {
    type Target = dyn GenericPipeline;
    fn deref(&self) -> &dyn GenericPipeline {
        match self {
            Pipeline::Graphics(v) => v,
            Pipeline::GraphicsLibrary(v) => &**v,
            Pipeline::Compute(v) => v,
            Pipeline::RayTracing(v) => &**v,
        }
    }
}

/// create one pipeline per create info
///
/// a failed slot stays `None` and the last error is returned. with
/// `EARLY_RETURN_ON_FAILURE` the remaining create infos are skipped.
pub fn create_pipelines<T: GenericPipelineSized>(
    device: &Device,
    pipeline_cache: Option<&PipelineCache>,
    create_infos: &[T::PipelineCreateInfo],
) -> (Vec<Option<Pipeline>>, Result<()>) {
    let mut pipelines: Vec<Option<Pipeline>> = create_infos.iter().map(|_| None).collect();
    let mut result = Ok(());
    for (pipeline, create_info) in pipelines.iter_mut().zip(create_infos.iter()) {
        match T::create(device, pipeline_cache, create_info) {
            Ok(v) => *pipeline = Some(v.to_pipeline()),
            Err(error) => {
                result = Err(error);
                if T::create_flags(create_info).contains(PipelineCreateFlags::EARLY_RETURN_ON_FAILURE)
                {
                    break;
                }
            }
        }
    }
    (pipelines, result)
}
