// SPDX-License-Identifier: LGPL-2.1-or-later
// See Notices.txt for copyright information

//! fixed-function graphics state that shader keys depend on
//!
//! each sub-state is optional: a pipeline library only carries the state of
//! the parts it implements, and the missing parts are filled in from the
//! libraries a complete pipeline imports.

use crate::flags::DynamicStates;
use shader_compiler_ir::fragment_result;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct TessellationState {
    pub patch_control_points: u32,
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct RasterizationState {
    pub rasterizer_discard: bool,
    pub provoking_vertex_last: bool,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct MultisampleState {
    pub rasterization_samples: u32,
    pub sample_shading_enable: bool,
    pub min_sample_shading: f32,
    pub alpha_to_coverage: bool,
}

impl Default for MultisampleState {
    fn default() -> Self {
        Self {
            rasterization_samples: 1,
            sample_shading_enable: false,
            min_sample_shading: 0.0,
            alpha_to_coverage: false,
        }
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct RenderPassState {
    /// multiview mask, 0 without multiview
    pub view_mask: u32,
    /// `true` for each color attachment with a defined format
    pub color_attachments: Vec<bool>,
}

impl RenderPassState {
    /// mask of the color attachments that can be written
    pub fn color_mask(&self) -> u8 {
        let mut retval = 0;
        for (index, &present) in self
            .color_attachments
            .iter()
            .enumerate()
            .take(fragment_result::MAX_COLOR_ATTACHMENTS as usize)
        {
            if present {
                retval |= 1 << index;
            }
        }
        retval
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct FragmentShadingRateState {
    pub fragment_size: [u32; 2],
    /// the primitive and attachment rates can't override the pipeline rate
    pub keep_combiner_ops: bool,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct GraphicsPipelineState {
    pub tessellation: Option<TessellationState>,
    pub rasterization: Option<RasterizationState>,
    pub multisample: Option<MultisampleState>,
    pub render_pass: Option<RenderPassState>,
    pub fragment_shading_rate: Option<FragmentShadingRateState>,
    pub dynamic: DynamicStates,
}

impl GraphicsPipelineState {
    /// fill the parts `self` leaves unset from `other`
    pub fn merge(&mut self, other: &GraphicsPipelineState) {
        fn fill<T: Clone>(dest: &mut Option<T>, src: &Option<T>) {
            if dest.is_none() {
                *dest = src.clone();
            }
        }
        fill(&mut self.tessellation, &other.tessellation);
        fill(&mut self.rasterization, &other.rasterization);
        fill(&mut self.multisample, &other.multisample);
        fill(&mut self.render_pass, &other.render_pass);
        fill(&mut self.fragment_shading_rate, &other.fragment_shading_rate);
        self.dynamic |= other.dynamic;
    }
    pub fn view_mask(&self) -> u32 {
        self.render_pass.as_ref().map_or(0, |rp| rp.view_mask)
    }
    /// `false` only if rasterizer discard is statically enabled
    pub fn raster_enabled(&self) -> bool {
        match self.rasterization {
            None => true,
            Some(rs) => {
                !rs.rasterizer_discard || self.dynamic.contains(DynamicStates::RASTERIZER_DISCARD)
            }
        }
    }
    /// `true` if fragments may be shaded at a coarser rate than one per pixel
    pub fn has_coarse_pixel(&self) -> bool {
        if self
            .multisample
            .map_or(false, |ms| ms.sample_shading_enable)
        {
            return false;
        }
        if self.dynamic.contains(DynamicStates::FRAGMENT_SHADING_RATE) {
            return true;
        }
        match self.fragment_shading_rate {
            None => false,
            Some(fsr) => {
                fsr.fragment_size[0] > 1 || fsr.fragment_size[1] > 1 || !fsr.keep_combiner_ops
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge() {
        let mut fragment = GraphicsPipelineState {
            multisample: Some(MultisampleState {
                rasterization_samples: 4,
                ..MultisampleState::default()
            }),
            dynamic: DynamicStates::ALPHA_TO_COVERAGE,
            ..GraphicsPipelineState::default()
        };
        let pre_rasterization = GraphicsPipelineState {
            rasterization: Some(RasterizationState::default()),
            multisample: Some(MultisampleState::default()),
            render_pass: Some(RenderPassState {
                view_mask: 3,
                color_attachments: vec![true, false, true],
            }),
            dynamic: DynamicStates::PATCH_CONTROL_POINTS,
            ..GraphicsPipelineState::default()
        };
        fragment.merge(&pre_rasterization);
        assert_eq!(fragment.multisample.map(|ms| ms.rasterization_samples), Some(4));
        assert!(fragment.rasterization.is_some());
        assert_eq!(fragment.view_mask(), 3);
        assert_eq!(fragment.render_pass.as_ref().map(|rp| rp.color_mask()), Some(0b101));
        assert_eq!(
            fragment.dynamic,
            DynamicStates::ALPHA_TO_COVERAGE | DynamicStates::PATCH_CONTROL_POINTS
        );
    }

    #[test]
    fn test_raster_and_coarse_pixel() {
        let mut state = GraphicsPipelineState {
            rasterization: Some(RasterizationState {
                rasterizer_discard: true,
                ..RasterizationState::default()
            }),
            ..GraphicsPipelineState::default()
        };
        assert!(!state.raster_enabled());
        state.dynamic |= DynamicStates::RASTERIZER_DISCARD;
        assert!(state.raster_enabled());
        assert!(!state.has_coarse_pixel());
        state.fragment_shading_rate = Some(FragmentShadingRateState {
            fragment_size: [2, 2],
            keep_combiner_ops: true,
        });
        assert!(state.has_coarse_pixel());
        state.multisample = Some(MultisampleState {
            sample_shading_enable: true,
            ..MultisampleState::default()
        });
        assert!(!state.has_coarse_pixel());
    }
}
