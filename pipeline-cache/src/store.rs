// SPDX-License-Identifier: LGPL-2.1-or-later
// See Notices.txt for copyright information

use crate::codec::{DecodeError, Reader, Writer};
use crate::key::CacheKey;
use crate::object::{CacheObject, CachedProgram, ObjectKind, ShaderBinary};
use hashbrown::hash_map::Entry;
use hashbrown::HashMap;
use log::{debug, warn};
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use shader_compiler_ir::ShaderStage;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

const HEADER_SIZE: u32 = 32;
const HEADER_VERSION_ONE: u32 = 1;

/// identifies the device and configuration a cache blob was produced by
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct CacheHeader {
    /// PCI vendor id
    pub vendor_id: u32,
    /// PCI device id
    pub device_id: u32,
    /// cache compatibility UUID
    pub uuid: Uuid,
}

/// lookup counters
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct CacheStats {
    /// successful lookups
    pub hits: u64,
    /// failed lookups
    pub misses: u64,
}

/// outcome of `PipelineCache::import`
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct ImportReport {
    /// entries added to the cache
    pub imported: usize,
    /// entries already present
    pub duplicates: usize,
    /// entries skipped as unknown or corrupt
    pub skipped: usize,
    /// the blob ended in the middle of an entry
    pub truncated: bool,
    /// the whole blob was ignored
    pub rejected: bool,
}

/// a thread-safe store of `CacheObject`s
///
/// objects are immutable once inserted and shared through `Arc`, so lookups
/// hand out references that stay valid after the cache is dropped.
#[derive(Debug)]
pub struct PipelineCache {
    header: CacheHeader,
    objects: RwLock<HashMap<(ObjectKind, CacheKey), CacheObject>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

fn checksum(payload: &[u8]) -> [u8; 8] {
    let digest = Sha256::digest(payload);
    let mut retval = [0; 8];
    retval.copy_from_slice(&digest[..8]);
    retval
}

type RawEntry<'a> = (u8, u8, [u8; 32], [u8; 8], &'a [u8]);

fn read_entry<'a>(r: &mut Reader<'a>) -> Result<RawEntry<'a>, DecodeError> {
    let kind = r.u8()?;
    let stage = r.u8()?;
    let hash = r.array()?;
    let len = r.u32()? as usize;
    let expected_checksum = r.array()?;
    let payload = r.raw(len)?;
    Ok((kind, stage, hash, expected_checksum, payload))
}

impl PipelineCache {
    /// create an empty cache
    pub fn new(header: CacheHeader) -> Self {
        Self {
            header,
            objects: RwLock::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }
    /// create a cache holding the importable contents of `data`
    pub fn with_data(header: CacheHeader, data: &[u8]) -> Self {
        let retval = Self::new(header);
        retval.import(data);
        retval
    }
    /// the header written by `export`
    pub fn header(&self) -> &CacheHeader {
        &self.header
    }
    /// number of objects
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }
    /// `true` if there are no objects
    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }
    /// lookup counters
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
    /// check for an object without touching the counters
    pub fn contains(&self, kind: ObjectKind, key: &CacheKey) -> bool {
        self.objects.read().contains_key(&(kind, *key))
    }
    /// find an object
    pub fn lookup(&self, kind: ObjectKind, key: &CacheKey) -> Option<CacheObject> {
        let retval = self.objects.read().get(&(kind, *key)).cloned();
        if retval.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!("cache hit: {:?} {}", kind, key);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            debug!("cache miss: {:?} {}", kind, key);
        }
        retval
    }
    /// find a compiled shader
    pub fn lookup_binary(&self, key: &CacheKey) -> Option<Arc<ShaderBinary>> {
        match self.lookup(ObjectKind::ShaderBinary, key)? {
            CacheObject::ShaderBinary(v) => Some(v),
            CacheObject::Program(_) => None,
        }
    }
    /// find an intermediate program
    pub fn lookup_program(&self, key: &CacheKey) -> Option<Arc<CachedProgram>> {
        match self.lookup(ObjectKind::Program, key)? {
            CacheObject::Program(v) => Some(v),
            CacheObject::ShaderBinary(_) => None,
        }
    }
    /// insert `object` unless an object with the same address exists
    ///
    /// returns whichever object ends up in the cache, so racing inserters
    /// all hold the same allocation.
    pub fn insert(&self, object: CacheObject) -> CacheObject {
        let address = (object.kind(), object.key());
        if let Some(existing) = self.objects.read().get(&address) {
            return existing.clone();
        }
        match self.objects.write().entry(address) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => entry.insert(object).clone(),
        }
    }
    /// insert a compiled shader, see `insert`
    pub fn insert_binary(&self, binary: Arc<ShaderBinary>) -> Arc<ShaderBinary> {
        match self.insert(CacheObject::ShaderBinary(binary.clone())) {
            CacheObject::ShaderBinary(v) => v,
            CacheObject::Program(_) => binary,
        }
    }
    /// insert an intermediate program, see `insert`
    pub fn insert_program(&self, program: Arc<CachedProgram>) -> Arc<CachedProgram> {
        match self.insert(CacheObject::Program(program.clone())) {
            CacheObject::Program(v) => v,
            CacheObject::ShaderBinary(_) => program,
        }
    }
    /// copy every object of `sources` into `self`
    pub fn merge<'a>(&self, sources: impl IntoIterator<Item = &'a PipelineCache>) {
        for source in sources {
            if std::ptr::eq(source, self) {
                continue;
            }
            let objects: Vec<CacheObject> = source.objects.read().values().cloned().collect();
            for object in objects {
                self.insert(object);
            }
        }
    }
    /// serialize every object into a versioned blob
    ///
    /// entries are written in address order so equal caches produce equal
    /// blobs.
    pub fn export(&self) -> Vec<u8> {
        let mut objects: Vec<CacheObject> = self.objects.read().values().cloned().collect();
        objects.sort_by_key(|object| (object.kind(), object.key()));
        let mut w = Writer::default();
        w.u32(HEADER_SIZE);
        w.u32(HEADER_VERSION_ONE);
        w.u32(self.header.vendor_id);
        w.u32(self.header.device_id);
        w.raw(self.header.uuid.as_bytes());
        for object in objects {
            let mut payload = Writer::default();
            object.encode(&mut payload);
            let key = object.key();
            w.u8(object.kind().to_byte());
            w.u8(key.stage.to_index());
            w.raw(&key.hash);
            w.u32(payload.bytes.len() as u32);
            w.raw(&checksum(&payload.bytes));
            w.raw(&payload.bytes);
        }
        w.bytes
    }
    fn check_header(&self, r: &mut Reader) -> Option<()> {
        let header_size = r.u32().ok()?;
        let version = r.u32().ok()?;
        let vendor_id = r.u32().ok()?;
        let device_id = r.u32().ok()?;
        let uuid = Uuid::from_bytes(r.array().ok()?);
        if header_size < HEADER_SIZE || version != HEADER_VERSION_ONE {
            warn!(
                "ignoring pipeline cache data: unsupported header (size {}, version {})",
                header_size, version
            );
            return None;
        }
        let header = CacheHeader {
            vendor_id,
            device_id,
            uuid,
        };
        if header != self.header {
            warn!(
                "ignoring pipeline cache data from a different device or configuration ({})",
                uuid
            );
            return None;
        }
        r.raw((header_size - HEADER_SIZE) as usize).ok()?;
        Some(())
    }
    /// add the entries of a blob produced by `export`
    ///
    /// a blob from a different device or configuration is ignored as a
    /// whole. entries of unknown kind, with a bad checksum, or that fail to
    /// decode are skipped; nothing of a skipped entry is applied. a truncated
    /// blob is imported up to the last complete entry.
    pub fn import(&self, data: &[u8]) -> ImportReport {
        let mut report = ImportReport::default();
        let mut r = Reader::new(data);
        if self.check_header(&mut r).is_none() {
            report.rejected = true;
            return report;
        }
        while r.remaining() != 0 {
            let (kind, stage, hash, expected_checksum, payload) = match read_entry(&mut r) {
                Ok(entry) => entry,
                Err(_) => {
                    warn!("pipeline cache data truncated");
                    report.truncated = true;
                    break;
                }
            };
            let (kind, stage) = match (ObjectKind::from_byte(kind), ShaderStage::from_index(stage)) {
                (Some(kind), Some(stage)) => (kind, stage),
                _ => {
                    debug!("skipping unknown pipeline cache entry (kind {}, stage {})", kind, stage);
                    report.skipped += 1;
                    continue;
                }
            };
            if checksum(payload) != expected_checksum {
                warn!("skipping pipeline cache entry with bad checksum");
                report.skipped += 1;
                continue;
            }
            let key = CacheKey { stage, hash };
            match CacheObject::decode(kind, key, payload) {
                Ok(object) => {
                    if self.contains(kind, &key) {
                        report.duplicates += 1;
                    } else {
                        self.insert(object);
                        report.imported += 1;
                    }
                }
                Err(error) => {
                    warn!("skipping undecodable pipeline cache entry {}: {}", key, error);
                    report.skipped += 1;
                }
            }
        }
        report
    }
}

impl Clone for PipelineCache {
    fn clone(&self) -> Self {
        Self {
            header: self.header,
            objects: RwLock::new(self.objects.read().clone()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::BindMap;
    use shader_compiler_backend::ResourceUsage;

    fn header() -> CacheHeader {
        CacheHeader {
            vendor_id: 0x8086,
            device_id: 0x1234,
            uuid: Uuid::from_bytes([7; 16]),
        }
    }

    fn binary(seed: u8) -> ShaderBinary {
        ShaderBinary {
            key: CacheKey::from_data(ShaderStage::Fragment, &[seed]),
            stage: ShaderStage::Fragment,
            code: vec![seed; 4],
            resource_usage: ResourceUsage::default(),
            statistics: Vec::new(),
            bind_map: BindMap::default(),
            push_descriptor_mask: 0,
            source_hash: seed.into(),
            ir_text: None,
            disassembly: None,
        }
    }

    #[test]
    fn test_insert_idempotent() {
        let cache = PipelineCache::new(header());
        let first = cache.insert_binary(Arc::new(binary(1)));
        let mut loser = binary(1);
        loser.code = vec![9];
        let second = cache.insert_binary(Arc::new(loser));
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.code, vec![1; 4]);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_lookup_counts() {
        let cache = PipelineCache::new(header());
        let key = binary(1).key;
        assert!(cache.lookup_binary(&key).is_none());
        cache.insert_binary(Arc::new(binary(1)));
        assert!(cache.lookup_binary(&key).is_some());
        assert!(cache.lookup_program(&key).is_none());
        assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 2 });
    }

    #[test]
    fn test_merge() {
        let a = PipelineCache::new(header());
        let b = PipelineCache::new(header());
        a.insert_binary(Arc::new(binary(1)));
        b.insert_binary(Arc::new(binary(2)));
        let c = PipelineCache::new(header());
        c.merge(vec![&a, &b, &c]);
        assert_eq!(c.len(), 2);
        assert_eq!(c.export(), {
            let d = a.clone();
            d.merge(Some(&b));
            d.export()
        });
    }
}
