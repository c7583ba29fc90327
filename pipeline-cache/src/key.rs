// SPDX-License-Identifier: LGPL-2.1-or-later
// See Notices.txt for copyright information

use sha2::{Digest, Sha256};
use shader_compiler_ir::ShaderStage;
use std::fmt;

/// the address of a cached object
#[derive(Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct CacheKey {
    /// the stage the object was built for
    pub stage: ShaderStage,
    /// SHA-256 of every input that affects the object
    pub hash: [u8; 32],
}

impl CacheKey {
    /// the key for `stage` whose inputs encode to `data`
    pub fn from_data(stage: ShaderStage, data: &[u8]) -> Self {
        Self {
            stage,
            hash: Sha256::digest(data).into(),
        }
    }
    /// the byte form: stage index followed by the hash
    pub fn to_bytes(&self) -> [u8; 33] {
        let mut retval = [0; 33];
        retval[0] = self.stage.to_index();
        retval[1..].copy_from_slice(&self.hash);
        retval
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:", self.stage)?;
        for byte in &self.hash[..8] {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Debug for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "CacheKey({})", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_data() {
        let a = CacheKey::from_data(ShaderStage::Vertex, b"abc");
        let b = CacheKey::from_data(ShaderStage::Vertex, b"abc");
        let c = CacheKey::from_data(ShaderStage::Vertex, b"abd");
        assert_eq!(a, b);
        assert_ne!(a.hash, c.hash);
        assert_eq!(a.to_bytes()[0], ShaderStage::Vertex.to_index());
        assert_eq!(a.to_string(), "vertex:ba7816bf8f01cfea");
    }
}
