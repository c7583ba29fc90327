// SPDX-License-Identifier: LGPL-2.1-or-later
// See Notices.txt for copyright information

use crate::stage_set::ShaderStageSet;
use pipeline_cache::PushRange;
use sha2::{Digest, Sha256};
use shader_compiler_ir::ShaderStage;
use std::sync::Arc;

/// descriptor set number used for color attachment bindings
pub const COLOR_ATTACHMENT_SET: u32 = 0xffff_fffe;
/// color attachment index of a render target the shader doesn't write
pub const COLOR_OUTPUT_UNUSED: u32 = 0xffff_fffe;
/// color attachment index of the null render target
pub const COLOR_OUTPUT_DISABLED: u32 = 0xffff_ffff;

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum DescriptorLayout {
    Sampler {
        count: u32,
        immutable_samplers: bool,
    },
    CombinedImageSampler {
        count: u32,
        immutable_samplers: bool,
    },
    SampledImage {
        count: u32,
    },
    StorageImage {
        count: u32,
    },
    UniformTexelBuffer {
        count: u32,
    },
    StorageTexelBuffer {
        count: u32,
    },
    UniformBuffer {
        count: u32,
    },
    StorageBuffer {
        count: u32,
    },
    UniformBufferDynamic {
        count: u32,
    },
    StorageBufferDynamic {
        count: u32,
    },
    InputAttachment {
        count: u32,
    },
    AccelerationStructure {
        count: u32,
    },
}

impl DescriptorLayout {
    pub fn count(&self) -> u32 {
        match *self {
            DescriptorLayout::Sampler { count, .. } => count,
            DescriptorLayout::CombinedImageSampler { count, .. } => count,
            DescriptorLayout::SampledImage { count } => count,
            DescriptorLayout::StorageImage { count } => count,
            DescriptorLayout::UniformTexelBuffer { count } => count,
            DescriptorLayout::StorageTexelBuffer { count } => count,
            DescriptorLayout::UniformBuffer { count } => count,
            DescriptorLayout::StorageBuffer { count } => count,
            DescriptorLayout::UniformBufferDynamic { count } => count,
            DescriptorLayout::StorageBufferDynamic { count } => count,
            DescriptorLayout::InputAttachment { count } => count,
            DescriptorLayout::AccelerationStructure { count } => count,
        }
    }
    pub fn has_immutable_samplers(&self) -> bool {
        match *self {
            DescriptorLayout::Sampler {
                immutable_samplers, ..
            }
            | DescriptorLayout::CombinedImageSampler {
                immutable_samplers, ..
            } => immutable_samplers,
            _ => false,
        }
    }
    /// bytes of descriptor-set memory taken by one array element
    pub fn descriptor_size(&self) -> u32 {
        match self {
            DescriptorLayout::Sampler { .. } => 16,
            DescriptorLayout::CombinedImageSampler { .. } => 64,
            DescriptorLayout::SampledImage { .. }
            | DescriptorLayout::StorageImage { .. }
            | DescriptorLayout::InputAttachment { .. } => 32,
            DescriptorLayout::UniformTexelBuffer { .. }
            | DescriptorLayout::StorageTexelBuffer { .. }
            | DescriptorLayout::UniformBuffer { .. }
            | DescriptorLayout::StorageBuffer { .. }
            | DescriptorLayout::AccelerationStructure { .. } => 16,
            DescriptorLayout::UniformBufferDynamic { .. }
            | DescriptorLayout::StorageBufferDynamic { .. } => 0,
        }
    }
    pub fn is_dynamic(&self) -> bool {
        match self {
            DescriptorLayout::UniformBufferDynamic { .. }
            | DescriptorLayout::StorageBufferDynamic { .. } => true,
            _ => false,
        }
    }
    fn type_tag(&self) -> u8 {
        match self {
            DescriptorLayout::Sampler { .. } => 0,
            DescriptorLayout::CombinedImageSampler { .. } => 1,
            DescriptorLayout::SampledImage { .. } => 2,
            DescriptorLayout::StorageImage { .. } => 3,
            DescriptorLayout::UniformTexelBuffer { .. } => 4,
            DescriptorLayout::StorageTexelBuffer { .. } => 5,
            DescriptorLayout::UniformBuffer { .. } => 6,
            DescriptorLayout::StorageBuffer { .. } => 7,
            DescriptorLayout::UniformBufferDynamic { .. } => 8,
            DescriptorLayout::StorageBufferDynamic { .. } => 9,
            DescriptorLayout::InputAttachment { .. } => 10,
            DescriptorLayout::AccelerationStructure { .. } => 11,
        }
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct DescriptorSetLayout {
    pub bindings: Vec<Option<DescriptorLayout>>,
    /// descriptors are pushed into the command buffer instead of allocated
    pub push_descriptor: bool,
}

impl DescriptorSetLayout {
    pub fn new(bindings: Vec<Option<DescriptorLayout>>) -> Self {
        Self {
            bindings,
            push_descriptor: false,
        }
    }
    pub fn binding(&self, binding: u32) -> Option<&DescriptorLayout> {
        self.bindings.get(binding as usize)?.as_ref()
    }
    /// byte offset of `binding` within descriptor-set memory
    pub fn descriptor_offset(&self, binding: u32) -> Option<u32> {
        self.binding(binding)?;
        Some(
            self.bindings[..binding as usize]
                .iter()
                .flatten()
                .map(|layout| layout.descriptor_size() * layout.count())
                .sum(),
        )
    }
    fn encode(&self, hasher: &mut Sha256) {
        hasher.update([self.push_descriptor as u8]);
        hasher.update((self.bindings.len() as u32).to_le_bytes());
        for binding in &self.bindings {
            match binding {
                Some(layout) => {
                    hasher.update([
                        1,
                        layout.type_tag(),
                        layout.has_immutable_samplers() as u8,
                    ]);
                    hasher.update(layout.count().to_le_bytes());
                }
                None => hasher.update([0]),
            }
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct PushConstantRange {
    pub stages: ShaderStageSet,
    pub offset: u32,
    pub size: u32,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct PipelineLayout {
    pub push_constants_size: u32,
    pub push_constant_ranges: Vec<PushConstantRange>,
    pub descriptor_set_layouts: Vec<Option<Arc<DescriptorSetLayout>>>,
    /// sets may be bound by libraries built against different layouts
    pub independent_sets: bool,
}

impl PipelineLayout {
    pub fn new(
        descriptor_set_layouts: Vec<Option<Arc<DescriptorSetLayout>>>,
        push_constant_ranges: Vec<PushConstantRange>,
    ) -> Self {
        let push_constants_size = push_constant_ranges
            .iter()
            .map(|range| range.offset + range.size)
            .max()
            .unwrap_or(0);
        Self {
            push_constants_size,
            push_constant_ranges,
            descriptor_set_layouts,
            independent_sets: false,
        }
    }
    pub fn set_layout(&self, set: u32) -> Option<&DescriptorSetLayout> {
        self.descriptor_set_layouts.get(set as usize)?.as_deref()
    }
    pub fn binding(&self, set: u32, binding: u32) -> Option<&DescriptorLayout> {
        self.set_layout(set)?.binding(binding)
    }
    pub fn uses_push_descriptors(&self) -> bool {
        self.descriptor_set_layouts
            .iter()
            .flatten()
            .any(|set| set.push_descriptor)
    }
    /// the push constant ranges visible to `stage`, sorted by offset
    pub fn push_ranges(&self, stage: ShaderStage) -> Vec<PushRange> {
        let mut retval: Vec<PushRange> = self
            .push_constant_ranges
            .iter()
            .filter(|range| range.stages.contains(stage))
            .map(|range| PushRange {
                offset: range.offset,
                size: range.size,
            })
            .collect();
        retval.sort_by_key(|range| range.offset);
        retval
    }
    /// fill the sets `self` leaves empty from `other`
    ///
    /// used when importing a library built against a partial layout.
    pub fn merge(&mut self, other: &PipelineLayout) {
        if self.descriptor_set_layouts.len() < other.descriptor_set_layouts.len() {
            self.descriptor_set_layouts
                .resize(other.descriptor_set_layouts.len(), None);
        }
        for (set, other_set) in self
            .descriptor_set_layouts
            .iter_mut()
            .zip(&other.descriptor_set_layouts)
        {
            if set.is_none() {
                *set = other_set.clone();
            }
        }
        for range in &other.push_constant_ranges {
            if !self.push_constant_ranges.contains(range) {
                self.push_constant_ranges.push(*range);
            }
        }
        self.push_constants_size = self.push_constants_size.max(other.push_constants_size);
        self.independent_sets |= other.independent_sets;
    }
    /// SHA-256 of everything in the layout that affects code generation
    pub fn hash(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.push_constants_size.to_le_bytes());
        let mut ranges = self.push_constant_ranges.clone();
        ranges.sort_by_key(|range| (range.offset, range.size, range.stages.to_bits()));
        hasher.update((ranges.len() as u32).to_le_bytes());
        for range in &ranges {
            hasher.update(range.stages.to_bits().to_le_bytes());
            hasher.update(range.offset.to_le_bytes());
            hasher.update(range.size.to_le_bytes());
        }
        hasher.update((self.descriptor_set_layouts.len() as u32).to_le_bytes());
        for set in &self.descriptor_set_layouts {
            match set {
                Some(set) => {
                    hasher.update([1]);
                    set.encode(&mut hasher);
                }
                None => hasher.update([0]),
            }
        }
        hasher.finalize().into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(bindings: Vec<Option<DescriptorLayout>>) -> Option<Arc<DescriptorSetLayout>> {
        Some(Arc::new(DescriptorSetLayout::new(bindings)))
    }

    #[test]
    fn test_descriptor_offset() {
        let layout = DescriptorSetLayout::new(vec![
            Some(DescriptorLayout::UniformBuffer { count: 2 }),
            None,
            Some(DescriptorLayout::SampledImage { count: 1 }),
            Some(DescriptorLayout::StorageBuffer { count: 1 }),
        ]);
        assert_eq!(layout.descriptor_offset(0), Some(0));
        assert_eq!(layout.descriptor_offset(1), None);
        assert_eq!(layout.descriptor_offset(2), Some(32));
        assert_eq!(layout.descriptor_offset(3), Some(64));
        assert_eq!(layout.descriptor_offset(9), None);
    }

    #[test]
    fn test_merge_and_hash() {
        let vertex_sets = PipelineLayout {
            independent_sets: true,
            ..PipelineLayout::new(
                vec![set(vec![Some(DescriptorLayout::UniformBuffer { count: 1 })])],
                vec![PushConstantRange {
                    stages: ShaderStage::Vertex.into(),
                    offset: 0,
                    size: 16,
                }],
            )
        };
        let fragment_sets = PipelineLayout::new(
            vec![None, set(vec![Some(DescriptorLayout::SampledImage { count: 4 })])],
            vec![],
        );
        let mut merged = fragment_sets.clone();
        merged.merge(&vertex_sets);
        assert!(merged.independent_sets);
        assert!(merged.binding(0, 0).is_some());
        assert_eq!(merged.binding(1, 0).map(|v| v.count()), Some(4));
        assert_eq!(merged.push_constants_size, 16);
        assert_eq!(merged.push_ranges(ShaderStage::Vertex).len(), 1);
        assert!(merged.push_ranges(ShaderStage::Fragment).is_empty());
        let mut both = PipelineLayout::new(
            vec![
                set(vec![Some(DescriptorLayout::UniformBuffer { count: 1 })]),
                set(vec![Some(DescriptorLayout::SampledImage { count: 4 })]),
            ],
            vertex_sets.push_constant_ranges.clone(),
        );
        assert_ne!(both.hash(), fragment_sets.hash());
        both.independent_sets = true;
        assert_eq!(both.hash(), merged.hash());
    }
}
