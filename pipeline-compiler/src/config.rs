// SPDX-License-Identifier: LGPL-2.1-or-later
// See Notices.txt for copyright information

use pipeline_cache::CacheHeader;
use shader_compiler_backend::{DeviceLimits, OptimizationMode};
use uuid::Uuid;

const CACHE_UUID_NAMESPACE: Uuid = Uuid::from_bytes([
    0x3c, 0x1d, 0x8e, 0x52, 0x0a, 0x6f, 0x4b, 0x27, 0x9d, 0x71, 0xe4, 0x05, 0xb8, 0x2a, 0x93, 0xc6,
]);

/// device configuration that affects generated code
///
/// every field except `vendor_id` flows into a stage key, a pipeline hash or
/// the cache UUID, so changing any of them makes previously cached shaders
/// unreachable.
#[derive(Clone, Debug, PartialEq)]
pub struct DeviceConfig {
    /// PCI vendor id
    pub vendor_id: u32,
    /// PCI device id
    pub device_id: u32,
    /// hardware limits forwarded to the backend
    pub limits: DeviceLimits,
    /// backend optimization mode
    pub optimization_mode: OptimizationMode,
    /// iteration limit for the fixed-point optimization loop
    pub max_optimization_iterations: usize,
    /// descriptors are fetched from descriptor-set memory instead of a binding table
    pub indirect_descriptors: bool,
    /// bounds-check buffer accesses unless a stage overrides it
    pub robust_buffer_access: bool,
    /// bounds-check image accesses unless a stage overrides it
    pub robust_image_access: bool,
    /// compile `terminate` as `discard`
    pub lower_terminate_to_discard: bool,
    /// emulate storage image reads without a declared format
    pub emulate_read_without_format: bool,
    /// register spilling aggressiveness
    pub spilling_rate: u32,
    /// clamp trigonometric inputs to a reduced range
    pub limit_trig_input_range: bool,
    /// pack vertex fetch components
    pub vf_component_packing: bool,
    /// assume compute workgroups are made of full subgroups
    pub assume_full_subgroups: bool,
    /// `assume_full_subgroups` for workgroups using barriers
    pub assume_full_subgroups_with_barrier: bool,
    /// `assume_full_subgroups` for workgroups using shared memory
    pub assume_full_subgroups_with_shared_memory: bool,
    /// a sample mask output is ignored when not multisampling
    pub sample_mask_out_opengl_behaviour: bool,
    /// graphics pipeline libraries are enabled
    pub graphics_pipeline_library: bool,
    /// task and mesh shaders are enabled
    pub mesh_shader: bool,
    /// fragment shading rate is enabled
    pub fragment_shading_rate: bool,
    /// hardware can replicate primitives for multiview
    pub primitive_replication: bool,
    /// hardware can take a per-primitive coarse pixel size
    pub coarse_pixel_primitive: bool,
    /// the provoking vertex convention is compiled into fragment shaders
    pub provoking_vertex_in_key: bool,
    /// compute push constants are addressed inline
    pub inline_push_address: bool,
    /// hardware needs a workaround for fragment shaders without push constants
    pub null_push_constant_workaround: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            vendor_id: 0x8086,
            device_id: 0,
            limits: DeviceLimits::default(),
            optimization_mode: OptimizationMode::Normal,
            max_optimization_iterations: 16,
            indirect_descriptors: false,
            robust_buffer_access: false,
            robust_image_access: false,
            lower_terminate_to_discard: false,
            emulate_read_without_format: false,
            spilling_rate: 0,
            limit_trig_input_range: false,
            vf_component_packing: false,
            assume_full_subgroups: false,
            assume_full_subgroups_with_barrier: false,
            assume_full_subgroups_with_shared_memory: false,
            sample_mask_out_opengl_behaviour: false,
            graphics_pipeline_library: true,
            mesh_shader: false,
            fragment_shading_rate: false,
            primitive_replication: false,
            coarse_pixel_primitive: false,
            provoking_vertex_in_key: false,
            inline_push_address: true,
            null_push_constant_workaround: false,
        }
    }
}

impl DeviceConfig {
    /// the pipeline-cache UUID
    ///
    /// derived from the device limits and the options that change code
    /// generation without appearing in any key.
    pub fn cache_uuid(&self) -> Uuid {
        let mut name = Vec::new();
        name.extend_from_slice(b"pipeline-compiler cache v1");
        name.extend_from_slice(&self.device_id.to_le_bytes());
        name.push(self.limits.simd_widths.len() as u8);
        name.extend_from_slice(&self.limits.simd_widths);
        for v in [
            self.limits.register_file_size,
            self.limits.max_scratch_size,
            self.limits.max_workgroup_memory,
            self.limits.default_subgroup_size,
        ] {
            name.extend_from_slice(&v.to_le_bytes());
        }
        name.push(match self.optimization_mode {
            OptimizationMode::NoOptimizations => 0,
            OptimizationMode::Normal => 1,
        });
        name.extend_from_slice(&(self.max_optimization_iterations as u64).to_le_bytes());
        for v in [
            self.primitive_replication,
            self.coarse_pixel_primitive,
            self.provoking_vertex_in_key,
            self.inline_push_address,
        ] {
            name.push(v as u8);
        }
        Uuid::new_v5(&CACHE_UUID_NAMESPACE, &name)
    }
    /// the header for pipeline caches created on this device
    pub fn cache_header(&self) -> CacheHeader {
        CacheHeader {
            vendor_id: self.vendor_id,
            device_id: self.device_id,
            uuid: self.cache_uuid(),
        }
    }
}
