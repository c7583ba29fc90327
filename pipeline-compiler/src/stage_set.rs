// SPDX-License-Identifier: LGPL-2.1-or-later
// See Notices.txt for copyright information

use enum_map::{enum_map, EnumMap};
use shader_compiler_ir::ShaderStage;
use std::fmt;
use std::iter::FromIterator;
use std::ops::{Deref, DerefMut};

/// a set of shader stages
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct ShaderStageSet(EnumMap<ShaderStage, bool>);

impl Default for ShaderStageSet {
    fn default() -> Self {
        ShaderStageSet(enum_map! {_ => false})
    }
}

impl ShaderStageSet {
    /// the empty set
    pub fn empty() -> Self {
        Self::default()
    }
    /// every graphics stage
    pub fn all_graphics() -> Self {
        ShaderStage::GRAPHICS_ORDER.iter().copied().collect()
    }
    /// every ray-tracing stage
    pub fn all_ray_tracing() -> Self {
        ShaderStage::ALL
            .iter()
            .copied()
            .filter(|stage| stage.is_ray_tracing())
            .collect()
    }
    /// `true` if `stage` is in the set
    pub fn contains(&self, stage: ShaderStage) -> bool {
        self.0[stage]
    }
    /// add `stage`, returning `true` if it wasn't present
    pub fn insert(&mut self, stage: ShaderStage) -> bool {
        !std::mem::replace(&mut self.0[stage], true)
    }
    /// remove `stage`
    pub fn remove(&mut self, stage: ShaderStage) {
        self.0[stage] = false;
    }
    /// the stages in the set, in `ShaderStage` order
    pub fn iter(&self) -> impl Iterator<Item = ShaderStage> + '_ {
        self.0
            .iter()
            .filter_map(|(stage, &present)| if present { Some(stage) } else { None })
    }
    /// the number of stages in the set
    pub fn len(&self) -> usize {
        self.0.values().filter(|&&present| present).count()
    }
    /// `true` if the set has no stages
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// the stages in both sets
    pub fn intersection(self, other: Self) -> Self {
        ShaderStageSet(EnumMap::from_fn(|stage| self.0[stage] && other.0[stage]))
    }
    /// the stages in either set
    pub fn union(self, other: Self) -> Self {
        ShaderStageSet(EnumMap::from_fn(|stage| self.0[stage] || other.0[stage]))
    }
    /// `true` if any stage is in both sets
    pub fn intersects(self, other: Self) -> bool {
        !self.intersection(other).is_empty()
    }
    /// one bit per stage, in `ShaderStage::to_index` order
    pub fn to_bits(self) -> u32 {
        let mut retval = 0;
        for stage in self.iter() {
            retval |= 1 << stage.to_index();
        }
        retval
    }
}

impl fmt::Debug for ShaderStageSet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl From<EnumMap<ShaderStage, bool>> for ShaderStageSet {
    fn from(v: EnumMap<ShaderStage, bool>) -> Self {
        ShaderStageSet(v)
    }
}

impl From<ShaderStage> for ShaderStageSet {
    fn from(v: ShaderStage) -> Self {
        ShaderStageSet(EnumMap::from_fn(|stage| stage == v))
    }
}

impl FromIterator<ShaderStage> for ShaderStageSet {
    fn from_iter<I: IntoIterator<Item = ShaderStage>>(iter: I) -> Self {
        let mut retval = Self::empty();
        for stage in iter {
            retval.insert(stage);
        }
        retval
    }
}

impl Deref for ShaderStageSet {
    type Target = EnumMap<ShaderStage, bool>;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for ShaderStageSet {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}
