use std::{collections::BTreeMap, sync::Arc, time::Duration};

use hdt_common::error::FormatViolation;
use hdt_sequence::SequenceStorage;
use hdt_testkit::{
    Spo,
    data_gen::{TripleSetParams, generate},
    dirs,
};
use hdt_triples::{
    BitmapTriples, IndexSet, ObjectIndexOptions, ObjectIndexStrategy, SpoolOptions, TripleId,
    TripleOrder, TriplesOptions, spool::ChunkCodec,
};

fn load(triples: &[Spo], object_index: ObjectIndexOptions) -> BitmapTriples {
    let options = TriplesOptions {
        object_index,
        ..Default::default()
    };
    BitmapTriples::load(
        TripleOrder::Spo,
        triples.iter().copied().map(TripleId::from_array),
        options,
    )
    .unwrap()
}

fn small_spool(directory: Option<std::path::PathBuf>, codec: ChunkCodec) -> SpoolOptions {
    SpoolOptions {
        bucket_size: 97,
        buffer_records: 50,
        codec,
        directory,
    }
}

/// Checks the object index against the Z level and the predicate index
/// against the Y level.
fn check_indexes(bt: &BitmapTriples, indexes: &IndexSet) {
    let mut expected: BTreeMap<u64, Vec<u64>> = BTreeMap::new();
    let mut pos_y = 0;
    for pos_z in 0..bt.len() {
        let object = bt.seq_z().get(pos_z).unwrap();
        expected.entry(object).or_default().push(pos_y);
        if bt.bitmap_z().get(pos_z) {
            pos_y += 1;
        }
    }
    let object_index = indexes.object();
    assert_eq!(object_index.number_of_objects(), expected.len() as u64);
    for (&object, positions) in &expected {
        let range = object_index.list_range(object).unwrap();
        let mut found: Vec<u64> = range
            .clone()
            .map(|i| object_index.sequence().get(i).unwrap())
            .collect();
        let keys: Vec<(u64, u64)> = found
            .iter()
            .map(|&p| (bt.seq_y().get(p).unwrap(), p))
            .collect();
        assert!(keys.windows(2).all(|w| w[0] <= w[1]), "object {object}");
        found.sort_unstable();
        assert_eq!(&found, positions, "object {object}");
    }

    let predicate_index = indexes.predicate().unwrap();
    let mut by_predicate: BTreeMap<u64, Vec<u64>> = BTreeMap::new();
    for pos_y in 0..bt.number_of_y() {
        by_predicate
            .entry(bt.seq_y().get(pos_y).unwrap())
            .or_default()
            .push(pos_y);
    }
    for (&predicate, positions) in &by_predicate {
        let range = predicate_index.list_range(predicate).unwrap();
        let found: Vec<u64> = range
            .map(|i| predicate_index.sequence().get(i).unwrap())
            .collect();
        assert_eq!(&found, positions, "predicate {predicate}");
        assert_eq!(
            indexes.predicate_count(predicate).unwrap(),
            positions.len() as u64
        );
    }
}

#[test]
fn test_memory_efficient_variants() {
    let triples = generate(&TripleSetParams {
        subjects: 300,
        objects: 200,
        duplicates: true,
        ..Default::default()
    });
    for (pipeline, codec) in [
        (true, ChunkCodec::Lz4),
        (false, ChunkCodec::Plain),
        (true, ChunkCodec::Zstd { level: 3 }),
    ] {
        let options = ObjectIndexOptions {
            pipeline,
            pipeline_depth: 2,
            poll_timeout: Duration::from_millis(5),
            parallel_sort_batch: 64,
            sort_threads: 2,
            spool: small_spool(None, codec),
            ..Default::default()
        };
        let bt = load(&triples, options);
        let indexes = bt.generate_object_index().unwrap();
        check_indexes(&bt, indexes);
    }
}

#[test]
fn test_disk_sort_matches_memory_efficient() {
    let triples = generate(&TripleSetParams {
        subjects: 250,
        objects: 180,
        duplicates: true,
        ..Default::default()
    });
    let memory = load(&triples, ObjectIndexOptions::default());
    let disk = load(
        &triples,
        ObjectIndexOptions {
            strategy: ObjectIndexStrategy::DiskSort,
            run_length: 100,
            batch_size: 33,
            ..Default::default()
        },
    );
    let a = memory.generate_object_index().unwrap();
    let b = disk.generate_object_index().unwrap();
    check_indexes(&disk, b);
    assert_eq!(
        a.object().sequence().to_vec().unwrap(),
        b.object().sequence().to_vec().unwrap()
    );
    assert_eq!(
        a.predicate_counts().to_vec().unwrap(),
        b.predicate_counts().to_vec().unwrap()
    );
}

#[test]
fn test_disk_backed_index_sequences() {
    let triples = generate(&TripleSetParams::default());
    let store = hdt_io_impl::temp_file_store::create_file_based(1 << 30, None).unwrap();
    let options = ObjectIndexOptions {
        index_storage: SequenceStorage::Disk(Arc::clone(&store)),
        temp_store: Some(store),
        strategy: ObjectIndexStrategy::DiskSort,
        run_length: 256,
        ..Default::default()
    };
    let bt = load(&triples, options);
    let indexes = bt.generate_object_index().unwrap();
    assert!(indexes.object().sequence().storage().is_disk());
    check_indexes(&bt, indexes);
}

#[test]
fn test_spool_directory_is_cleaned_up() {
    let scratch = dirs::scratch_dir().unwrap();
    let triples = generate(&TripleSetParams::default());
    let options = ObjectIndexOptions {
        spool: small_spool(Some(scratch.path().to_path_buf()), ChunkCodec::Lz4),
        ..Default::default()
    };
    let bt = load(&triples, options);
    bt.generate_object_index().unwrap();
    assert_eq!(dirs::count_files(scratch.path()).unwrap(), 0);
}

#[test]
fn test_object_gap_fails_for_both_strategies() {
    let triples: Vec<Spo> = vec![[1, 1, 1], [1, 2, 2], [2, 1, 4]];
    for strategy in [ObjectIndexStrategy::MemoryEfficient, ObjectIndexStrategy::DiskSort] {
        let bt = load(
            &triples,
            ObjectIndexOptions {
                strategy,
                ..Default::default()
            },
        );
        let err = bt.generate_object_index().unwrap_err();
        assert_eq!(
            err.format_violation(),
            Some(&FormatViolation::NonContiguousObject {
                previous: 2,
                found: 4
            }),
            "{strategy:?}"
        );
        assert!(bt.indexes().is_none());
    }
}

#[test]
fn test_sparse_object_id_fails_for_both_strategies() {
    let triples: Vec<Spo> = vec![[1, 1, 1], [1, 1, 1 << 33]];
    for strategy in [ObjectIndexStrategy::MemoryEfficient, ObjectIndexStrategy::DiskSort] {
        let bt = load(
            &triples,
            ObjectIndexOptions {
                strategy,
                ..Default::default()
            },
        );
        let err = bt.generate_object_index().unwrap_err();
        assert_eq!(
            err.format_violation(),
            Some(&FormatViolation::NonContiguousObject {
                previous: 1,
                found: 1 << 33
            }),
            "{strategy:?}"
        );
    }
}

#[test]
fn test_without_predicate_index() {
    let triples = generate(&TripleSetParams::default());
    let bt = load(
        &triples,
        ObjectIndexOptions {
            build_predicate_index: false,
            ..Default::default()
        },
    );
    let indexes = bt.generate_object_index().unwrap();
    assert!(indexes.predicate().is_none());
    assert!(indexes.predicate_count(1).unwrap() > 0);
}

#[test]
fn test_concurrent_generation_builds_once() {
    let triples = generate(&TripleSetParams::default());
    let bt = load(&triples, ObjectIndexOptions::default());
    let pointers: Vec<usize> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                scope.spawn(|| bt.generate_object_index().unwrap() as *const IndexSet as usize)
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    assert!(pointers.windows(2).all(|w| w[0] == w[1]));
}

#[test]
fn test_empty_triples() {
    let bt = load(&[], ObjectIndexOptions::default());
    let indexes = bt.generate_object_index().unwrap();
    assert_eq!(indexes.object().number_of_objects(), 0);
    assert_eq!(indexes.predicate_count(1).unwrap(), 0);
}
