// SPDX-License-Identifier: LGPL-2.1-or-later
// See Notices.txt for copyright information

use pipeline_cache::{
    BindMap, CacheHeader, CacheKey, CachedProgram, ObjectKind, PipelineBinding, PipelineCache,
    PushRange, ShaderBinary,
};
use shader_compiler_backend::{CompileStatistics, ResourceUsage};
use shader_compiler_ir::{Program, ShaderStage};
use std::sync::Arc;
use uuid::Uuid;

const HEADER_SIZE: usize = 32;
const ENTRY_HEADER_SIZE: usize = 46;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn header() -> CacheHeader {
    CacheHeader {
        vendor_id: 0x8086,
        device_id: 0x46a6,
        uuid: Uuid::from_bytes([0x5a; 16]),
    }
}

fn binary(stage: ShaderStage, seed: u8) -> ShaderBinary {
    ShaderBinary {
        key: CacheKey::from_data(stage, &[seed]),
        stage,
        code: vec![seed, seed.wrapping_add(1), 0xc0, 0xde],
        resource_usage: ResourceUsage {
            scratch_size: 1024,
            output_slots_valid: 0x101,
            ..ResourceUsage::default()
        },
        statistics: vec![
            CompileStatistics {
                dispatch_width: 8,
                instructions: 12,
                cycles: 40,
                max_dispatch_width: 16,
                ..CompileStatistics::default()
            },
            CompileStatistics {
                dispatch_width: 16,
                instructions: 14,
                cycles: 60,
                ..CompileStatistics::default()
            },
        ],
        bind_map: BindMap {
            surfaces: vec![PipelineBinding {
                set: 0,
                binding: 2,
                index: 0,
            }],
            push_ranges: vec![PushRange {
                offset: 0,
                size: 32,
            }],
            layout_hash: [seed; 32],
        },
        push_descriptor_mask: 0,
        source_hash: 0xdead_beef,
        ir_text: Some(format!("shader {} \"main\"\n", stage)),
        disassembly: None,
    }
}

fn program(stage: ShaderStage, seed: u8) -> CachedProgram {
    let text = format!(
        "shader {} \"main\"\n%0 = const {}\nstore_output 8 %0\n",
        stage, seed
    );
    CachedProgram {
        key: CacheKey::from_data(stage, text.as_bytes()),
        program: Program::parse(&text).unwrap(),
    }
}

fn single_binary_blob() -> (Vec<u8>, ShaderBinary) {
    let cache = PipelineCache::new(header());
    let binary = binary(ShaderStage::Fragment, 3);
    cache.insert_binary(Arc::new(binary.clone()));
    (cache.export(), binary)
}

#[test]
fn test_export_import() {
    init_logging();
    let cache = PipelineCache::new(header());
    cache.insert_binary(Arc::new(binary(ShaderStage::Vertex, 1)));
    cache.insert_binary(Arc::new(binary(ShaderStage::Fragment, 2)));
    let program = program(ShaderStage::Vertex, 7);
    cache.insert_program(Arc::new(program.clone()));
    let data = cache.export();
    let imported = PipelineCache::new(header());
    let report = imported.import(&data);
    assert_eq!(report.imported, 3);
    assert_eq!(report.skipped, 0);
    assert!(!report.truncated && !report.rejected);
    let vertex = binary(ShaderStage::Vertex, 1);
    assert_eq!(*imported.lookup_binary(&vertex.key).unwrap(), vertex);
    assert_eq!(*imported.lookup_program(&program.key).unwrap(), program);
    assert_eq!(imported.export(), data);
    let report = imported.import(&data);
    assert_eq!(report.duplicates, 3);
    assert_eq!(imported.len(), 3);
}

#[test]
fn test_foreign_header_ignored() {
    init_logging();
    let (data, _) = single_binary_blob();
    let other = PipelineCache::new(CacheHeader {
        uuid: Uuid::from_bytes([0x11; 16]),
        ..header()
    });
    let report = other.import(&data);
    assert!(report.rejected);
    assert!(other.is_empty());
    let mut bad_version = data.clone();
    bad_version[4] = 2;
    let cache = PipelineCache::new(header());
    assert!(cache.import(&bad_version).rejected);
    assert!(cache.import(&data[..10]).rejected);
    assert!(cache.is_empty());
}

#[test]
fn test_corrupt_entries_skipped() {
    init_logging();
    let (data, binary) = single_binary_blob();
    let cache = PipelineCache::new(header());

    let mut bad_checksum = data.clone();
    bad_checksum[HEADER_SIZE + ENTRY_HEADER_SIZE] ^= 0xff;
    let report = cache.import(&bad_checksum);
    assert_eq!((report.imported, report.skipped), (0, 1));

    let mut unknown_kind = data.clone();
    unknown_kind[HEADER_SIZE] = 0x7f;
    let report = cache.import(&unknown_kind);
    assert_eq!((report.imported, report.skipped), (0, 1));

    let mut wrong_kind = data.clone();
    wrong_kind[HEADER_SIZE] = 2;
    let report = cache.import(&wrong_kind);
    assert_eq!((report.imported, report.skipped), (0, 1));
    assert!(cache.is_empty());

    let mut doubled = unknown_kind;
    doubled.extend_from_slice(&data[HEADER_SIZE..]);
    let report = cache.import(&doubled);
    assert_eq!((report.imported, report.skipped), (1, 1));
    assert!(cache.contains(ObjectKind::ShaderBinary, &binary.key));
}

#[test]
fn test_truncated_blob() {
    init_logging();
    let (data, _) = single_binary_blob();
    let cache = PipelineCache::new(header());
    let report = cache.import(&data[..data.len() - 1]);
    assert!(report.truncated);
    assert_eq!(report.imported, 0);
    assert!(cache.is_empty());
    let report = cache.import(&data[..HEADER_SIZE]);
    assert_eq!(report, Default::default());
}

#[test]
fn test_concurrent_insert_single_winner() {
    let cache = PipelineCache::new(header());
    let winners: Vec<Arc<ShaderBinary>> = std::thread::scope(|scope| {
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let cache = &cache;
                scope.spawn(move || cache.insert_binary(Arc::new(binary(ShaderStage::Compute, 9))))
            })
            .collect();
        threads
            .into_iter()
            .map(|thread| thread.join().unwrap())
            .collect()
    });
    assert_eq!(cache.len(), 1);
    let stored = cache.lookup_binary(&winners[0].key).unwrap();
    for winner in &winners {
        assert!(Arc::ptr_eq(winner, &stored));
    }
    drop(winners);
    assert_eq!(Arc::strong_count(&stored), 2);
}
