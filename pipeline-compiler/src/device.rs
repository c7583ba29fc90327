// SPDX-License-Identifier: LGPL-2.1-or-later
// See Notices.txt for copyright information

use crate::compute::{ComputePipeline, ComputePipelineCreateInfo};
use crate::config::DeviceConfig;
use crate::errors::Result;
use crate::graphics::{GraphicsPipeline, GraphicsPipelineCreateInfo};
use crate::library::GraphicsLibraryPipeline;
use crate::pipeline::{create_pipelines, Pipeline};
use crate::ray_tracing::{RayTracingPipeline, RayTracingPipelineCreateInfo};
use crate::shader_module::{IrTextTranslator, ShaderTranslator};
use pipeline_cache::PipelineCache;
use shader_compiler_backend::Compiler;
use std::sync::Arc;

/// everything pipeline creation needs from the device
///
/// the default cache is used when no pipeline cache is passed in.
#[derive(Debug)]
pub struct Device {
    config: DeviceConfig,
    compiler: Arc<dyn Compiler>,
    translator: Arc<dyn ShaderTranslator>,
    default_cache: PipelineCache,
}

impl Device {
    pub fn new(config: DeviceConfig, compiler: Arc<dyn Compiler>) -> Self {
        Self::with_translator(config, compiler, Arc::new(IrTextTranslator))
    }
    pub fn with_translator(
        config: DeviceConfig,
        compiler: Arc<dyn Compiler>,
        translator: Arc<dyn ShaderTranslator>,
    ) -> Self {
        let default_cache = PipelineCache::new(config.cache_header());
        Self {
            config,
            compiler,
            translator,
            default_cache,
        }
    }
    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }
    pub fn compiler(&self) -> &dyn Compiler {
        &*self.compiler
    }
    pub fn translator(&self) -> &dyn ShaderTranslator {
        &*self.translator
    }
    /// a new cache holding whatever in `initial_data` was exported by a
    /// compatible device
    pub fn create_pipeline_cache(&self, initial_data: Option<&[u8]>) -> PipelineCache {
        match initial_data {
            Some(data) => PipelineCache::with_data(self.config.cache_header(), data),
            None => PipelineCache::new(self.config.cache_header()),
        }
    }
    pub fn default_cache(&self) -> &PipelineCache {
        &self.default_cache
    }
    pub(crate) fn cache<'a>(&'a self, pipeline_cache: Option<&'a PipelineCache>) -> &'a PipelineCache {
        pipeline_cache.unwrap_or(&self.default_cache)
    }
    pub fn create_graphics_pipelines(
        &self,
        pipeline_cache: Option<&PipelineCache>,
        create_infos: &[GraphicsPipelineCreateInfo],
    ) -> (Vec<Option<Pipeline>>, Result<()>) {
        create_pipelines::<GraphicsPipeline>(self, pipeline_cache, create_infos)
    }
    pub fn create_graphics_library_pipelines(
        &self,
        pipeline_cache: Option<&PipelineCache>,
        create_infos: &[GraphicsPipelineCreateInfo],
    ) -> (Vec<Option<Pipeline>>, Result<()>) {
        create_pipelines::<GraphicsLibraryPipeline>(self, pipeline_cache, create_infos)
    }
    pub fn create_compute_pipelines(
        &self,
        pipeline_cache: Option<&PipelineCache>,
        create_infos: &[ComputePipelineCreateInfo],
    ) -> (Vec<Option<Pipeline>>, Result<()>) {
        create_pipelines::<ComputePipeline>(self, pipeline_cache, create_infos)
    }
    pub fn create_ray_tracing_pipelines(
        &self,
        pipeline_cache: Option<&PipelineCache>,
        create_infos: &[RayTracingPipelineCreateInfo],
    ) -> (Vec<Option<Pipeline>>, Result<()>) {
        create_pipelines::<RayTracingPipeline>(self, pipeline_cache, create_infos)
    }
}
