/*!
 * Builds sample-table boxes from the store's interleaved metadata table.
 *
 * Consecutive same-track runs in the interleaved order become chunks for
 * flat files and separate track runs for fragments.
 */

use crate::{
    boxes::{
        ctts::{CompositionOffsetBox, CompositionOffsetEntry},
        sbgp::{SampleToGroupBox, SampleToGroupEntry},
        sgpd::{SampleGroupDescriptionBox, SampleGroupDescriptionEntry},
        stsc::{SampleToChunkBox, SampleToChunkEntry},
        stss::SyncSampleBox,
        stsz::SampleSizeBox,
        stts::{TimeToSampleBox, TimeToSampleEntry},
        ChunkOffsetBox,
    },
    mux::{SampleGroupKind, SampleMetadata},
};

/// The sample-table boxes describing one track's samples in a flat file.
#[derive(Debug)]
pub struct TrackSampleTables {
    pub stts: TimeToSampleBox,
    /// Present only when any composition offset is non-zero
    pub ctts: Option<CompositionOffsetBox>,
    /// Present only when not every sample is a sync sample
    pub stss: Option<SyncSampleBox>,
    pub stsz: SampleSizeBox,
    pub stsc: SampleToChunkBox,
    pub stco: ChunkOffsetBox,
    /// One sgpd/sbgp pair per grouping type used by the track
    pub sample_groups: Vec<(SampleGroupDescriptionBox, SampleToGroupBox)>,
    /// Sum of sample durations, in the track's timescale
    pub total_duration: u64,
}

/// A contiguous same-track run within one fragment's interleaved records.
#[derive(Debug)]
pub struct FragmentRun {
    pub track_id: u32,
    /// Offset of the run's first payload byte within the fragment payload
    pub payload_offset: u64,
    /// Indices into the fragment's record list
    pub record_range: std::ops::Range<usize>,
}

/// Splits one fragment's interleaved records into contiguous same-track runs
/// and computes each run's position within the fragment payload.
pub fn fragment_runs(records: &[SampleMetadata]) -> Vec<FragmentRun> {
    let mut runs: Vec<FragmentRun> = Vec::new();
    let mut payload_offset = 0u64;

    for (index, record) in records.iter().enumerate() {
        match runs.last_mut() {
            Some(run) if run.track_id == record.track_id => {
                run.record_range.end = index + 1;
            }
            _ => runs.push(FragmentRun {
                track_id: record.track_id,
                payload_offset,
                record_range: index..index + 1,
            }),
        }
        payload_offset += record.size;
    }

    runs
}

/// Builds per-track sample tables from a full interleaved metadata table
/// (as returned by `SampleStore::sample_metadata`).
pub struct SampleTableBuilder<'a> {
    records: &'a [SampleMetadata],
}

impl<'a> SampleTableBuilder<'a> {
    pub fn new(records: &'a [SampleMetadata]) -> Self {
        Self { records }
    }

    /// Track ids in first-seen order.
    pub fn track_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = Vec::new();
        for record in self.records {
            if !ids.contains(&record.track_id) {
                ids.push(record.track_id);
            }
        }
        ids
    }

    /// Builds the tables for one track. `base_offset` is the file position
    /// of the payload region's first byte and shifts every chunk offset.
    pub fn build_track(&self, track_id: u32, base_offset: u64) -> TrackSampleTables {
        let track_records: Vec<&SampleMetadata> = self
            .records
            .iter()
            .filter(|record| record.track_id == track_id)
            .collect();

        let stsz = SampleSizeBox::from_sizes(
            track_records
                .iter()
                .map(|record| u32::try_from(record.size).expect("sample size must fit in u32"))
                .collect(),
        );

        let stts = build_stts(&track_records);
        let total_duration = stts.total_duration();
        let ctts = build_ctts(&track_records);
        let stss = build_stss(&track_records);
        let (stsc, stco) = self.build_chunks(track_id, base_offset);
        let sample_groups = build_sample_groups(&track_records);

        TrackSampleTables {
            stts,
            ctts,
            stss,
            stsz,
            stsc,
            stco,
            sample_groups,
            total_duration,
        }
    }

    /// Maps this track's consecutive runs in the interleaved order to chunks.
    fn build_chunks(&self, track_id: u32, base_offset: u64) -> (SampleToChunkBox, ChunkOffsetBox) {
        let mut chunk_offsets: Vec<u64> = Vec::new();
        let mut chunk_sample_counts: Vec<u32> = Vec::new();

        let mut previous_track = None;
        for record in self.records {
            if record.track_id == track_id {
                if previous_track == Some(track_id) {
                    *chunk_sample_counts.last_mut().expect("run already open") += 1;
                } else {
                    chunk_offsets.push(base_offset + record.offset);
                    chunk_sample_counts.push(1);
                }
            }
            previous_track = Some(record.track_id);
        }

        let mut entries: Vec<SampleToChunkEntry> = Vec::new();
        for (index, &samples_per_chunk) in chunk_sample_counts.iter().enumerate() {
            match entries.last() {
                Some(last) if last.samples_per_chunk == samples_per_chunk => {}
                _ => entries.push(SampleToChunkEntry {
                    first_chunk: index as u32 + 1,
                    samples_per_chunk,
                    sample_description_index: 1,
                }),
            }
        }

        (
            SampleToChunkBox::from(entries),
            ChunkOffsetBox::from_offsets(chunk_offsets),
        )
    }
}

fn build_stts(track_records: &[&SampleMetadata]) -> TimeToSampleBox {
    let mut entries: Vec<TimeToSampleEntry> = Vec::new();
    for record in track_records {
        let duration =
            u32::try_from(record.duration).expect("sample duration must fit in u32");
        match entries.last_mut() {
            Some(entry) if entry.sample_duration == duration => entry.sample_count += 1,
            _ => entries.push(TimeToSampleEntry {
                sample_count: 1,
                sample_duration: duration,
            }),
        }
    }
    TimeToSampleBox::from(entries)
}

fn build_ctts(track_records: &[&SampleMetadata]) -> Option<CompositionOffsetBox> {
    if track_records.iter().all(|record| record.cts_offset == 0) {
        return None;
    }

    let mut entries: Vec<CompositionOffsetEntry> = Vec::new();
    for record in track_records {
        match entries.last_mut() {
            Some(entry) if entry.sample_offset == record.cts_offset => entry.sample_count += 1,
            _ => entries.push(CompositionOffsetEntry {
                sample_count: 1,
                sample_offset: record.cts_offset,
            }),
        }
    }
    Some(CompositionOffsetBox::from_entries(entries))
}

fn build_stss(track_records: &[&SampleMetadata]) -> Option<SyncSampleBox> {
    if track_records.iter().all(|record| record.is_sync) {
        return None;
    }

    Some(SyncSampleBox::new(
        track_records
            .iter()
            .enumerate()
            .filter(|(_, record)| record.is_sync)
            .map(|(index, _)| index as u32 + 1)
            .collect(),
    ))
}

fn group_description_data(kind: SampleGroupKind, value: i16) -> Vec<u8> {
    match kind {
        // roll distance, signed 16 bit
        SampleGroupKind::Roll | SampleGroupKind::Prol => value.to_be_bytes().to_vec(),
        // dependent flag + SAP type byte
        SampleGroupKind::Sap => vec![value as u8],
    }
}

fn build_sample_groups(
    track_records: &[&SampleMetadata],
) -> Vec<(SampleGroupDescriptionBox, SampleToGroupBox)> {
    let mut kinds: Vec<SampleGroupKind> = Vec::new();
    for record in track_records {
        if let Some(group) = record.sample_group {
            if !kinds.contains(&group.kind) {
                kinds.push(group.kind);
            }
        }
    }

    kinds
        .into_iter()
        .map(|kind| {
            // one description per distinct value, in order of first use
            let mut values: Vec<i16> = Vec::new();
            for record in track_records {
                if let Some(group) = record.sample_group {
                    if group.kind == kind && !values.contains(&group.value) {
                        values.push(group.value);
                    }
                }
            }

            let sgpd = SampleGroupDescriptionBox::with_fixed_length(
                kind.grouping_type(),
                values
                    .iter()
                    .map(|&value| SampleGroupDescriptionEntry {
                        description_data: group_description_data(kind, value),
                    })
                    .collect(),
            );

            let mut entries: Vec<SampleToGroupEntry> = Vec::new();
            for record in track_records {
                let index = match record.sample_group {
                    Some(group) if group.kind == kind => {
                        values.iter().position(|&v| v == group.value).unwrap_or(0) as u32 + 1
                    }
                    _ => 0,
                };
                match entries.last_mut() {
                    Some(entry) if entry.group_description_index == index => {
                        entry.sample_count += 1
                    }
                    _ => entries.push(SampleToGroupEntry {
                        sample_count: 1,
                        group_description_index: index,
                    }),
                }
            }

            let sbgp = SampleToGroupBox::new(kind.grouping_type(), entries);
            (sgpd, sbgp)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mux::SampleGroup;

    fn record(
        track_id: u32,
        offset: u64,
        size: u64,
        duration: u64,
        is_sync: bool,
    ) -> SampleMetadata {
        SampleMetadata {
            offset,
            size,
            duration,
            cts_offset: 0,
            extra: 0,
            fragment_number: 0,
            is_sync,
            track_id,
            timescale: 1000,
            sample_group: None,
        }
    }

    /// Interleaved table: t1 run of 2, t2 run of 1, t1 run of 1, offsets
    /// packed back-to-back.
    fn interleaved_table() -> Vec<SampleMetadata> {
        vec![
            record(1, 0, 10, 100, true),
            record(1, 10, 20, 100, false),
            record(2, 30, 5, 200, true),
            record(1, 35, 30, 50, false),
        ]
    }

    #[test]
    fn test_track_ids_first_seen_order() {
        let table = interleaved_table();
        let builder = SampleTableBuilder::new(&table);
        assert_eq!(builder.track_ids(), vec![1, 2]);
    }

    #[test]
    fn test_chunks_follow_interleaved_runs() {
        let table = interleaved_table();
        let builder = SampleTableBuilder::new(&table);
        let tables = builder.build_track(1, 1000);

        // two chunks: samples 1-2 at offset 1000, sample 3 at offset 1035
        assert_eq!(tables.stco.chunk_offsets.inner(), &[1000, 1035]);
        assert_eq!(tables.stsc.entries.len(), 2);
        assert_eq!(tables.stsc.entries[0].first_chunk, 1);
        assert_eq!(tables.stsc.entries[0].samples_per_chunk, 2);
        assert_eq!(tables.stsc.entries[1].first_chunk, 2);
        assert_eq!(tables.stsc.entries[1].samples_per_chunk, 1);
    }

    #[test]
    fn test_duration_and_size_tables() {
        let table = interleaved_table();
        let builder = SampleTableBuilder::new(&table);
        let tables = builder.build_track(1, 0);

        assert_eq!(tables.stsz.entry_sizes.inner(), &[10, 20, 30]);
        assert_eq!(tables.stts.entries.len(), 2);
        assert_eq!(tables.stts.entries[0].sample_count, 2);
        assert_eq!(tables.stts.entries[0].sample_duration, 100);
        assert_eq!(tables.total_duration, 250);
    }

    #[test]
    fn test_stss_only_when_needed() {
        let table = interleaved_table();
        let builder = SampleTableBuilder::new(&table);

        let track1 = builder.build_track(1, 0);
        let stss = track1.stss.expect("track 1 has non-sync samples");
        assert_eq!(stss.sample_numbers.inner(), &[1]);

        let track2 = builder.build_track(2, 0);
        assert!(track2.stss.is_none());
    }

    #[test]
    fn test_ctts_only_when_needed() {
        let mut table = interleaved_table();
        assert!(SampleTableBuilder::new(&table)
            .build_track(1, 0)
            .ctts
            .is_none());

        table[0].cts_offset = 100;
        table[1].cts_offset = 100;
        let tables = SampleTableBuilder::new(&table).build_track(1, 0);
        let ctts = tables.ctts.expect("non-zero offsets present");
        assert_eq!(ctts.entries.len(), 2);
        assert_eq!(ctts.entries[0].sample_count, 2);
        assert_eq!(ctts.entries[0].sample_offset, 100);
        assert_eq!(ctts.entries[1].sample_count, 1);
        assert_eq!(ctts.entries[1].sample_offset, 0);
    }

    #[test]
    fn test_sample_groups() {
        let mut table = interleaved_table();
        table[0].sample_group = Some(SampleGroup::new(SampleGroupKind::Roll, -1));
        table[1].sample_group = Some(SampleGroup::new(SampleGroupKind::Roll, -1));

        let tables = SampleTableBuilder::new(&table).build_track(1, 0);
        assert_eq!(tables.sample_groups.len(), 1);

        let (sgpd, sbgp) = &tables.sample_groups[0];
        assert_eq!(sgpd.grouping_type, b"roll");
        assert_eq!(sgpd.entries.len(), 1);
        assert_eq!(sgpd.entries[0].description_data, (-1i16).to_be_bytes());

        // samples 1-2 in group 1, sample 3 ungrouped
        assert_eq!(sbgp.entries.len(), 2);
        assert_eq!(sbgp.entries[0].sample_count, 2);
        assert_eq!(sbgp.entries[0].group_description_index, 1);
        assert_eq!(sbgp.entries[1].sample_count, 1);
        assert_eq!(sbgp.entries[1].group_description_index, 0);
    }

    #[test]
    fn test_fragment_runs() {
        let records = vec![
            record(1, 0, 10, 100, true),
            record(1, 10, 20, 100, true),
            record(2, 30, 5, 200, true),
            record(1, 35, 30, 50, true),
        ];
        let runs = fragment_runs(&records);

        assert_eq!(runs.len(), 3);
        assert_eq!(runs[0].track_id, 1);
        assert_eq!(runs[0].payload_offset, 0);
        assert_eq!(runs[0].record_range, 0..2);
        assert_eq!(runs[1].track_id, 2);
        assert_eq!(runs[1].payload_offset, 30);
        assert_eq!(runs[1].record_range, 2..3);
        assert_eq!(runs[2].track_id, 1);
        assert_eq!(runs[2].payload_offset, 35);
        assert_eq!(runs[2].record_range, 3..4);
    }
}
