use futures_util::io::Cursor;
use isomedia::{
    boxes::stsd::SampleEntry, BoxData, FourCC, FragmentWriter, Interleaver, MediaKind,
    MemorySink, MovieWriter, Mp4Box, Parser, Sample, SampleStore, TrackConfig,
};

fn audio_config(track_id: u32, timescale: u32) -> TrackConfig {
    TrackConfig::builder()
        .track_id(track_id)
        .timescale(timescale)
        .kind(MediaKind::Audio)
        .sample_entry(SampleEntry::new(FourCC::new(b"mp4a"), vec![0u8; 28]))
        .build()
}

fn video_config(track_id: u32, timescale: u32) -> TrackConfig {
    TrackConfig::builder()
        .track_id(track_id)
        .timescale(timescale)
        .kind(MediaKind::Video)
        .sample_entry(SampleEntry::new(FourCC::new(b"avc1"), vec![0u8; 70]))
        .width(640.0)
        .height(480.0)
        .build()
}

fn sample(data: &[u8], duration: u64, fragment_number: u32, is_sync: bool) -> Sample {
    Sample::builder()
        .data(data.to_vec())
        .duration(duration)
        .fragment_number(fragment_number)
        .is_sync(is_sync)
        .build()
}

fn unwrap_leaf<'a, T>(
    parent: &'a Mp4Box,
    box_type: &[u8; 4],
    extract: impl Fn(&'a BoxData) -> Option<&'a T>,
) -> &'a T {
    let found = parent
        .find_descendant(box_type)
        .unwrap_or_else(|| panic!("missing {} box", FourCC::new(box_type)));
    extract(found.data.as_ref().expect("leaf box should carry data"))
        .expect("unexpected box data variant")
}

#[tokio::test]
async fn test_flat_file_roundtrip() {
    let mut store = SampleStore::new(MemorySink::new(), Interleaver::pass_through());
    // interleaved arrival: A a B b C
    store
        .add_sample(sample(b"AAAA", 1024, 0, true), 1, 48_000)
        .unwrap();
    store
        .add_sample(sample(b"aaaaaa", 3000, 0, true), 2, 90_000)
        .unwrap();
    store
        .add_sample(sample(b"BBBB", 1024, 0, true), 1, 48_000)
        .unwrap();
    store
        .add_sample(sample(b"bbbbbb", 3000, 0, false), 2, 90_000)
        .unwrap();
    store
        .add_sample(sample(b"CCCC", 1024, 0, true), 1, 48_000)
        .unwrap();

    let configs = vec![audio_config(1, 48_000), video_config(2, 90_000)];
    let writer = MovieWriter::builder(Cursor::new(Vec::new())).build();
    let bytes = writer
        .write_flat(&mut store, &configs)
        .await
        .unwrap()
        .into_inner();

    let mut parser = Parser::new(bytes.as_slice());
    let boxes = parser.read_boxes().await.unwrap();

    assert_eq!(boxes.len(), 3);
    assert_eq!(boxes[0].box_type(), b"ftyp");
    assert_eq!(boxes[1].box_type(), b"moov");
    assert_eq!(boxes[2].box_type(), b"mdat");

    let moov = &boxes[1];
    let mvhd = unwrap_leaf(moov, b"mvhd", |data| match data {
        BoxData::MovieHeader(mvhd) => Some(mvhd),
        _ => None,
    });
    assert_eq!(mvhd.timescale, 1000);
    assert_eq!(mvhd.next_track_id, 3);

    let traks: Vec<&Mp4Box> = moov
        .children
        .iter()
        .filter(|child| child.box_type() == b"trak")
        .collect();
    assert_eq!(traks.len(), 2);

    // audio track tables
    let stsz = unwrap_leaf(traks[0], b"stsz", |data| match data {
        BoxData::SampleSize(stsz) => Some(stsz),
        _ => None,
    });
    assert_eq!(stsz.entry_sizes.inner(), &[4, 4, 4]);

    let mdhd = unwrap_leaf(traks[0], b"mdhd", |data| match data {
        BoxData::MediaHeader(mdhd) => Some(mdhd),
        _ => None,
    });
    assert_eq!(mdhd.timescale, 48_000);
    assert_eq!(mdhd.duration, 3 * 1024);

    // video track marks its one non-sync sample
    let stss = unwrap_leaf(traks[1], b"stss", |data| match data {
        BoxData::SyncSample(stss) => Some(stss),
        _ => None,
    });
    assert_eq!(stss.sample_numbers.inner(), &[1]);

    // every chunk offset must point at the right payload bytes
    let expected_chunks: [&[u8]; 5] = [b"AAAA", b"BBBB", b"CCCC", b"aaaaaa", b"bbbbbb"];
    let audio_stco = unwrap_leaf(traks[0], b"stco", |data| match data {
        BoxData::ChunkOffset(stco) => Some(stco),
        _ => None,
    });
    let video_stco = unwrap_leaf(traks[1], b"stco", |data| match data {
        BoxData::ChunkOffset(stco) => Some(stco),
        _ => None,
    });
    let all_offsets: Vec<u64> = audio_stco
        .chunk_offsets
        .inner()
        .iter()
        .chain(video_stco.chunk_offsets.inner())
        .copied()
        .collect();
    for (offset, payload) in all_offsets.iter().zip(expected_chunks.iter()) {
        let start = *offset as usize;
        assert_eq!(&bytes[start..start + payload.len()], *payload);
    }

    // the payload region sits inside the mdat box
    let mdat = &boxes[2];
    assert_eq!(mdat.header.size, 8 + 24);
    assert!(all_offsets
        .iter()
        .all(|&offset| offset >= mdat.header.offset + 8
            && offset < mdat.header.offset + mdat.header.size));
}

#[tokio::test]
async fn test_fragmented_roundtrip() {
    let mut store = SampleStore::new(MemorySink::new(), Interleaver::pass_through());
    store
        .add_sample(sample(b"AAAA", 100, 1, true), 1, 1000)
        .unwrap();
    store
        .add_sample(sample(b"BBBB", 100, 1, false), 1, 1000)
        .unwrap();
    store
        .add_sample(sample(b"CCCC", 100, 2, true), 1, 1000)
        .unwrap();

    let mut writer = FragmentWriter::builder(Cursor::new(Vec::new()))
        .tracks(vec![audio_config(1, 1000)])
        .build();
    writer.write_init_segment().await.unwrap();
    assert!(writer.write_fragment(&mut store, 1).await.unwrap());
    assert!(writer.write_fragment(&mut store, 2).await.unwrap());
    assert!(!writer.write_fragment(&mut store, 3).await.unwrap());
    writer.flush().await.unwrap();
    let bytes = writer.into_inner().into_inner();

    let mut parser = Parser::new(bytes.as_slice());
    let boxes = parser.read_boxes().await.unwrap();

    let kinds: Vec<FourCC> = boxes.iter().map(|b| b.box_type()).collect();
    assert_eq!(kinds.len(), 6);
    assert_eq!(kinds[0], b"ftyp");
    assert_eq!(kinds[1], b"moov");
    assert_eq!(kinds[2], b"moof");
    assert_eq!(kinds[3], b"mdat");
    assert_eq!(kinds[4], b"moof");
    assert_eq!(kinds[5], b"mdat");

    // the init segment declares fragment defaults
    let trex = unwrap_leaf(&boxes[1], b"trex", |data| match data {
        BoxData::TrackExtends(trex) => Some(trex),
        _ => None,
    });
    assert_eq!(trex.track_id, 1);

    // first fragment: sequence 1, two samples, decode time 0
    let moof1 = &boxes[2];
    let mfhd = unwrap_leaf(moof1, b"mfhd", |data| match data {
        BoxData::MovieFragmentHeader(mfhd) => Some(mfhd),
        _ => None,
    });
    assert_eq!(mfhd.sequence_number, 1);

    let tfdt1 = unwrap_leaf(moof1, b"tfdt", |data| match data {
        BoxData::TrackFragmentDecodeTime(tfdt) => Some(tfdt),
        _ => None,
    });
    assert_eq!(tfdt1.base_media_decode_time, 0);

    let trun1 = unwrap_leaf(moof1, b"trun", |data| match data {
        BoxData::TrackRun(trun) => Some(trun),
        _ => None,
    });
    assert_eq!(trun1.sample_count(), 2);
    assert_eq!(trun1.total_sample_size(), 8);
    let sizes: Vec<u32> = trun1
        .entries
        .iter()
        .map(|entry| entry.size.unwrap())
        .collect();
    assert_eq!(sizes, vec![4, 4]);

    // the data offset points at the first payload byte, relative to moof
    let data_offset = trun1.data_offset.unwrap() as u64;
    assert_eq!(moof1.header.offset + data_offset, boxes[3].header.offset + 8);
    let payload_start = (moof1.header.offset + data_offset) as usize;
    assert_eq!(&bytes[payload_start..payload_start + 8], b"AAAABBBB");

    // second fragment: decode time advanced by the first fragment
    let tfdt2 = unwrap_leaf(&boxes[4], b"tfdt", |data| match data {
        BoxData::TrackFragmentDecodeTime(tfdt) => Some(tfdt),
        _ => None,
    });
    assert_eq!(tfdt2.base_media_decode_time, 200);
}
