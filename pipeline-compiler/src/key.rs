// SPDX-License-Identifier: LGPL-2.1-or-later
// See Notices.txt for copyright information

//! stage keys and pipeline hashes
//!
//! every stage of a pipeline is cached under the hash of the whole pipeline,
//! so the hash covers the keys and sources of all active stages, including
//! the ones imported from libraries. That makes a pipeline composed from
//! libraries find the same cache entries a monolithic compile produced.

use crate::config::DeviceConfig;
use crate::descriptor_set::PipelineLayout;
use crate::flags::{DynamicStates, PipelineCreateFlags};
use crate::stage_set::ShaderStageSet;
use crate::state::GraphicsPipelineState;
use sha2::{Digest, Sha256};
use shader_compiler_backend::key::{BaseKey, RayFlags, RobustFlags, Sometimes, VueLayout};
use shader_compiler_backend::StageKey;
use shader_compiler_ir::{fragment_result, ShaderStage};

struct KeyHasher {
    hasher: Sha256,
    scratch: Vec<u8>,
}

impl KeyHasher {
    fn new() -> Self {
        Self {
            hasher: Sha256::new(),
            scratch: Vec::new(),
        }
    }
    fn bool(&mut self, v: bool) -> &mut Self {
        self.hasher.update([v as u8]);
        self
    }
    fn u32(&mut self, v: u32) -> &mut Self {
        self.hasher.update(v.to_le_bytes());
        self
    }
    fn bytes(&mut self, v: &[u8]) -> &mut Self {
        self.hasher.update(v);
        self
    }
    /// a stage: fixed-function fields first, source hash last
    fn stage(&mut self, key: &StageKey, shader_sha: &[u8; 32]) -> &mut Self {
        self.scratch.clear();
        key.encode(&mut self.scratch);
        self.hasher.update((self.scratch.len() as u32).to_le_bytes());
        self.hasher.update(&self.scratch);
        self.hasher.update(shader_sha);
        self
    }
    fn finish(self) -> [u8; 32] {
        self.hasher.finalize().into()
    }
}

/// one stage's inputs to a pipeline hash
#[derive(Copy, Clone, Debug)]
pub struct HashedStage<'a> {
    pub stage: ShaderStage,
    pub key: &'a StageKey,
    pub shader_sha: &'a [u8; 32],
}

#[derive(Copy, Clone, Debug)]
pub struct KeyBuilder<'a> {
    config: &'a DeviceConfig,
}

impl<'a> KeyBuilder<'a> {
    pub fn new(config: &'a DeviceConfig) -> Self {
        Self { config }
    }
    /// the stage's robustness, `requested` overriding the device default
    pub fn robust_flags(&self, requested: Option<RobustFlags>) -> RobustFlags {
        requested.unwrap_or_else(|| {
            let mut retval = RobustFlags::empty();
            if self.config.robust_buffer_access {
                retval |= RobustFlags::UNIFORM_BUFFERS | RobustFlags::STORAGE_BUFFERS;
            }
            if self.config.robust_image_access {
                retval |= RobustFlags::IMAGES;
            }
            retval
        })
    }
    /// the attribute-block layout shared by a graphics pipeline's stages
    pub fn vue_layout(&self, flags: PipelineCreateFlags) -> VueLayout {
        if flags.contains(PipelineCreateFlags::LINK_TIME_OPTIMIZATION)
            || !self.config.graphics_pipeline_library
        {
            VueLayout::Fixed
        } else if flags.contains(PipelineCreateFlags::LIBRARY) && self.config.mesh_shader {
            VueLayout::SeparateMesh
        } else {
            VueLayout::Separate
        }
    }
    fn base_key(&self, robust_flags: RobustFlags, vue_layout: VueLayout) -> BaseKey {
        BaseKey {
            robust_flags,
            vue_layout,
            limit_trig_input_range: self.config.limit_trig_input_range,
            uses_inline_push_addr: false,
        }
    }
    /// the key for graphics stage `stage`
    ///
    /// `state` must already have the imported libraries' state merged in and
    /// `active_stages` must include imported stages.
    pub fn graphics_stage_key(
        &self,
        stage: ShaderStage,
        robust_flags: RobustFlags,
        vue_layout: VueLayout,
        state: &GraphicsPipelineState,
        active_stages: ShaderStageSet,
    ) -> StageKey {
        let mut key = StageKey::new(stage, self.base_key(robust_flags, vue_layout));
        match &mut key {
            StageKey::Vertex(key) => key.vf_component_packing = self.config.vf_component_packing,
            StageKey::TessellationControl(key) => {
                key.input_vertices = if state.dynamic.contains(DynamicStates::PATCH_CONTROL_POINTS) {
                    0
                } else {
                    state
                        .tessellation
                        .map_or(0, |ts| ts.patch_control_points.min(u8::MAX.into()) as u8)
                };
            }
            StageKey::Task(key) => {
                key.base.vue_layout = VueLayout::Fixed;
                key.base.uses_inline_push_addr = true;
            }
            StageKey::Mesh(key) => {
                key.base.uses_inline_push_addr = true;
                key.compact_mue = vue_layout == VueLayout::Fixed;
            }
            StageKey::Fragment(key) => {
                let raster_enabled = state.raster_enabled();
                let multisample = if raster_enabled { state.multisample } else { None };
                let rasterization = if raster_enabled {
                    state.rasterization
                } else {
                    None
                };
                let dynamic = state.dynamic;
                key.color_outputs_valid = match &state.render_pass {
                    Some(rp) if !rp.color_attachments.is_empty() => rp.color_mask(),
                    _ => all_color_outputs(),
                };
                key.nr_color_regions = last_bit(key.color_outputs_valid);
                match multisample {
                    Some(ms) => {
                        let dynamic_samples = dynamic.contains(DynamicStates::RASTERIZATION_SAMPLES);
                        key.multisample_fbo = if dynamic_samples {
                            Sometimes::Sometimes
                        } else {
                            Sometimes::from_bool(ms.rasterization_samples > 1)
                        };
                        key.persample_interp = if dynamic_samples {
                            Sometimes::Sometimes
                        } else {
                            Sometimes::from_bool(
                                ms.sample_shading_enable
                                    && ms.min_sample_shading * ms.rasterization_samples as f32
                                        > 1.0,
                            )
                        };
                        key.alpha_to_coverage = if dynamic.contains(DynamicStates::ALPHA_TO_COVERAGE)
                        {
                            Sometimes::Sometimes
                        } else {
                            Sometimes::from_bool(ms.alpha_to_coverage)
                        };
                        key.min_sample_shading = ms.sample_shading_enable;
                        key.ignore_sample_mask_out = self.config.sample_mask_out_opengl_behaviour
                            && key.multisample_fbo == Sometimes::Never;
                    }
                    None => {
                        key.color_outputs_valid = all_color_outputs();
                        key.nr_color_regions = fragment_result::MAX_COLOR_ATTACHMENTS as u8;
                        key.multisample_fbo = Sometimes::Sometimes;
                        key.persample_interp = Sometimes::Sometimes;
                        key.alpha_to_coverage = Sometimes::Sometimes;
                    }
                }
                key.provoking_vertex_last = if !self.config.provoking_vertex_in_key {
                    Sometimes::Never
                } else {
                    match rasterization {
                        Some(_) if dynamic.contains(DynamicStates::PROVOKING_VERTEX) => {
                            Sometimes::Sometimes
                        }
                        Some(rs) => Sometimes::from_bool(rs.provoking_vertex_last),
                        None => Sometimes::Sometimes,
                    }
                };
                key.mesh_input = if !self.config.mesh_shader
                    || active_stages.contains(ShaderStage::Vertex)
                {
                    Sometimes::Never
                } else if active_stages.contains(ShaderStage::Mesh) {
                    Sometimes::Always
                } else {
                    Sometimes::Sometimes
                };
                key.coarse_pixel = self.config.fragment_shading_rate && {
                    let mut coarse_state = state.clone();
                    coarse_state.multisample = multisample;
                    coarse_state.has_coarse_pixel()
                };
                key.null_push_constant_workaround = self.config.null_push_constant_workaround;
            }
            StageKey::Geometry(_) | StageKey::TessellationEvaluation(_) => {}
            StageKey::Compute(_) | StageKey::RayTracing(_) => {
                unreachable!("not a graphics stage: {}", stage)
            }
        }
        key
    }
    pub fn compute_key(&self, robust_flags: RobustFlags) -> StageKey {
        let mut key = StageKey::new(
            ShaderStage::Compute,
            self.base_key(robust_flags, VueLayout::Fixed),
        );
        key.base_mut().uses_inline_push_addr = self.config.inline_push_address;
        key
    }
    pub fn ray_tracing_key(
        &self,
        stage: ShaderStage,
        robust_flags: RobustFlags,
        ray_flags: RayFlags,
    ) -> StageKey {
        let mut key = StageKey::new(stage, self.base_key(robust_flags, VueLayout::Fixed));
        if let StageKey::RayTracing(key) = &mut key {
            key.ray_flags = ray_flags;
        }
        key
    }
    fn hash_common(&self, hasher: &mut KeyHasher, layout: &PipelineLayout) {
        hasher
            .bytes(&layout.hash())
            .bool(self.config.indirect_descriptors)
            .bool(self.config.lower_terminate_to_discard)
            .bool(self.config.robust_buffer_access)
            .u32(self.config.spilling_rate)
            .bool(self.config.emulate_read_without_format);
    }
    fn hash_subgroup_assumptions(&self, hasher: &mut KeyHasher) {
        hasher
            .bool(self.config.assume_full_subgroups)
            .bool(self.config.assume_full_subgroups_with_barrier)
            .bool(self.config.assume_full_subgroups_with_shared_memory);
    }
    /// the hash every stage of a graphics pipeline is cached under
    ///
    /// `stages` must be in pipeline stage order.
    pub fn graphics_hash(
        &self,
        layout: &PipelineLayout,
        view_mask: u32,
        stages: &[HashedStage],
    ) -> [u8; 32] {
        let mut hasher = KeyHasher::new();
        self.hash_common(&mut hasher, layout);
        hasher.u32(view_mask);
        for stage in stages {
            hasher.stage(stage.key, stage.shader_sha);
        }
        if stages
            .iter()
            .any(|s| s.stage == ShaderStage::Task || s.stage == ShaderStage::Mesh)
        {
            hasher
                .bool(self.config.assume_full_subgroups)
                .bool(self.config.assume_full_subgroups_with_shared_memory);
        }
        hasher.finish()
    }
    pub fn compute_hash(
        &self,
        layout: &PipelineLayout,
        key: &StageKey,
        shader_sha: &[u8; 32],
    ) -> [u8; 32] {
        let mut hasher = KeyHasher::new();
        self.hash_common(&mut hasher, layout);
        self.hash_subgroup_assumptions(&mut hasher);
        hasher.stage(key, shader_sha);
        hasher.finish()
    }
    pub fn ray_tracing_shader_hash(
        &self,
        layout: &PipelineLayout,
        key: &StageKey,
        shader_sha: &[u8; 32],
    ) -> [u8; 32] {
        let mut hasher = KeyHasher::new();
        self.hash_common(&mut hasher, layout);
        hasher.stage(key, shader_sha);
        hasher.finish()
    }
    /// the hash of an intersection stage fused with an any-hit stage
    pub fn ray_tracing_combined_hash(
        &self,
        layout: &PipelineLayout,
        intersection: (&StageKey, &[u8; 32]),
        any_hit: (&StageKey, &[u8; 32]),
    ) -> [u8; 32] {
        let mut hasher = KeyHasher::new();
        hasher
            .bytes(&layout.hash())
            .bool(self.config.robust_buffer_access)
            .stage(intersection.0, intersection.1)
            .stage(any_hit.0, any_hit.1);
        hasher.finish()
    }
}

fn all_color_outputs() -> u8 {
    ((1u32 << fragment_result::MAX_COLOR_ATTACHMENTS) - 1) as u8
}

pub(crate) fn last_bit(mask: u8) -> u8 {
    (8 - mask.leading_zeros()) as u8
}
