use isomedia::{FileSink, Interleaver, MemorySink, Sample, SampleSink, SampleStore, StoreError};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn sample(data: Vec<u8>, duration: u64, fragment_number: u32) -> Sample {
    Sample::builder()
        .data(data)
        .duration(duration)
        .fragment_number(fragment_number)
        .is_sync(true)
        .build()
}

/// Five samples across two tracks, added in a fixed interleaved call order:
/// T1 (10), T2 (5), T1 (20), T2 (15), T1 (30), all in fragment 1.
fn fill_two_track_store<S: SampleSink>(store: &mut SampleStore<S>) -> Vec<u8> {
    let calls: [(u32, u8, usize); 5] = [
        (1, 0x10, 10),
        (2, 0x20, 5),
        (1, 0x11, 20),
        (2, 0x21, 15),
        (1, 0x12, 30),
    ];

    let mut expected = Vec::new();
    for (track_id, fill, size) in calls {
        let data = vec![fill; size];
        expected.extend_from_slice(&data);
        store
            .add_sample(sample(data, 100, 1), track_id, 1000)
            .unwrap();
    }
    expected
}

#[test]
fn test_end_to_end_pass_through_drain() {
    init_logging();
    let mut store = SampleStore::new(MemorySink::new(), Interleaver::pass_through());
    let expected = fill_two_track_store(&mut store);
    assert_eq!(expected.len(), 80);

    let buffer = store
        .stored_samples(0, 1)
        .unwrap()
        .expect("fragment 1 holds samples");
    assert_eq!(buffer.len(), 80);
    assert_eq!(buffer, expected);

    assert!(store.stored_samples(0, 1).unwrap().is_none());
}

#[test]
fn test_end_to_end_with_file_sink() {
    init_logging();
    let file = tempfile::tempfile().unwrap();
    let mut store = SampleStore::new(FileSink::from_file(file), Interleaver::pass_through());
    let expected = fill_two_track_store(&mut store);

    let buffer = store.stored_samples(0, 1).unwrap().unwrap();
    assert_eq!(buffer, expected);
    assert_eq!(store.unread_bytes(), 0);
}

#[test]
fn test_time_alignment_expected_sequence() {
    init_logging();
    // Track B (0.5 s samples) added before track A (1 s samples): each 1 s of
    // media interleaves as B, B, A.
    let mut store = SampleStore::new(MemorySink::new(), Interleaver::time_aligned(1));
    for index in 0..4u8 {
        store
            .add_sample(sample(vec![0xb0 + index; 2], 500, 0), 2, 1000)
            .unwrap();
    }
    for index in 0..2u8 {
        store
            .add_sample(sample(vec![0xa0 + index; 4], 1000, 0), 1, 1000)
            .unwrap();
    }

    let order: Vec<(u32, u64)> = store
        .sample_metadata()
        .unwrap()
        .iter()
        .map(|record| (record.track_id, record.size))
        .collect();
    assert_eq!(
        order,
        vec![(2, 2), (2, 2), (1, 4), (2, 2), (2, 2), (1, 4)]
    );

    // and the drained payload matches that order byte for byte
    let buffer = store.stored_samples(0, 0).unwrap().unwrap();
    assert_eq!(
        buffer,
        vec![
            0xb0, 0xb0, 0xb1, 0xb1, 0xa0, 0xa0, 0xa0, 0xa0, // chunk 1
            0xb2, 0xb2, 0xb3, 0xb3, 0xa1, 0xa1, 0xa1, 0xa1, // chunk 2
        ]
    );
}

#[test]
fn test_chunked_drain_conserves_bytes() {
    init_logging();
    let mut store = SampleStore::new(MemorySink::new(), Interleaver::pass_through());
    let expected = fill_two_track_store(&mut store);

    let mut drained = Vec::new();
    let mut calls = 0;
    while let Some(buffer) = store.stored_samples(32, 1).unwrap() {
        assert!(buffer.len() <= 32);
        drained.extend(buffer);
        calls += 1;
    }

    assert!(calls > 1, "a 32 byte cap must split an 80 byte fragment");
    assert_eq!(drained, expected);
}

#[test]
fn test_fragment_monotonicity() {
    init_logging();
    let mut store = SampleStore::new(MemorySink::new(), Interleaver::pass_through());
    store
        .add_sample(sample(vec![1; 4], 100, 1), 1, 1000)
        .unwrap();
    store
        .add_sample(sample(vec![2; 4], 100, 2), 1, 1000)
        .unwrap();

    assert!(store.stored_samples(0, 2).unwrap().is_some());
    assert!(matches!(
        store.stored_samples(0, 1),
        Err(StoreError::FragmentOrder {
            requested: 1,
            served: 2,
        })
    ));
}

#[test]
fn test_interleaving_streams_per_fragment() {
    init_logging();
    // Two tracks alternating across two fragments; each fragment drains its
    // own samples only, in arrival order.
    let mut store = SampleStore::new(MemorySink::new(), Interleaver::pass_through());
    store
        .add_sample(sample(b"1a".to_vec(), 100, 1), 1, 1000)
        .unwrap();
    store
        .add_sample(sample(b"1b".to_vec(), 100, 1), 2, 1000)
        .unwrap();
    store
        .add_sample(sample(b"2a".to_vec(), 100, 2), 1, 1000)
        .unwrap();
    store
        .add_sample(sample(b"2b".to_vec(), 100, 2), 2, 1000)
        .unwrap();

    assert_eq!(store.stored_samples(0, 1).unwrap().unwrap(), b"1a1b");
    assert_eq!(store.stored_samples(0, 2).unwrap().unwrap(), b"2a2b");
    assert!(store.stored_samples(0, 2).unwrap().is_none());
}
