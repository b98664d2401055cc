use std::collections::VecDeque;

use crate::mux::{sample::SampleMetadata, store::StoreError};

/// Strategy deciding the logical order samples are served back in.
///
/// The closed set of strategies is dispatched as an enum; the physical layout
/// in the sink is always arrival order and is never touched by alignment.
#[derive(Debug, Clone)]
pub enum Interleaver {
    /// Identity: logical order equals arrival order. The right choice for
    /// single-track output or when fragment boundaries already enforce the
    /// desired order.
    PassThrough,
    /// Round-robin by cumulative decode time, bucketed into fixed-duration
    /// chunks of `chunk_ms` milliseconds.
    TimeAligned { chunk_ms: u64 },
}

impl Interleaver {
    pub fn pass_through() -> Self {
        Interleaver::PassThrough
    }

    pub fn time_aligned(chunk_ms: u64) -> Self {
        Interleaver::TimeAligned { chunk_ms }
    }

    /// Reorders `records` into logical order. With `update_offsets` the
    /// returned records are packed back-to-back in the new order, modelling a
    /// physical re-layout; otherwise they keep their physical offsets.
    pub(crate) fn align(
        &self,
        records: &[SampleMetadata],
        update_offsets: bool,
    ) -> Result<Vec<SampleMetadata>, StoreError> {
        let mut aligned = match self {
            Interleaver::PassThrough => records.to_vec(),
            Interleaver::TimeAligned { chunk_ms } => align_by_time(records, *chunk_ms)?,
        };

        if update_offsets {
            let mut offset = 0u64;
            for record in aligned.iter_mut() {
                record.offset = offset;
                offset += record.size;
            }
        }

        Ok(aligned)
    }
}

/// A record belongs to the first chunk `k` whose end time (`k * chunk_ms`)
/// its track-cumulative decode time does not exceed. Chunks are emitted in
/// increasing `k`; within a chunk, tracks contribute in first-seen order,
/// each preserving its own arrival order.
fn align_by_time(
    records: &[SampleMetadata],
    chunk_ms: u64,
) -> Result<Vec<SampleMetadata>, StoreError> {
    if chunk_ms == 0 {
        return Err(StoreError::ZeroChunkDuration);
    }

    // Per-track queues in first-seen order. Each queued record carries its
    // cumulative decode time (including its own duration) in milliseconds.
    let mut tracks: Vec<(u32, f64, VecDeque<(f64, SampleMetadata)>)> = Vec::new();
    for record in records {
        if record.timescale == 0 {
            return Err(StoreError::ZeroTimescale {
                track_id: record.track_id,
            });
        }
        let index = match tracks.iter().position(|(id, _, _)| *id == record.track_id) {
            Some(index) => index,
            None => {
                tracks.push((record.track_id, 0.0, VecDeque::new()));
                tracks.len() - 1
            }
        };
        let (_, summed_seconds, queue) = &mut tracks[index];
        *summed_seconds += record.duration as f64 / record.timescale as f64;
        queue.push_back((*summed_seconds * 1_000.0, record.clone()));
    }

    let mut aligned = Vec::with_capacity(records.len());
    let mut chunk_index = 0u64;
    while aligned.len() < records.len() {
        let chunk_end_ms = chunk_index as f64 * chunk_ms as f64;
        for (_, _, queue) in tracks.iter_mut() {
            while queue
                .front()
                .is_some_and(|(end_ms, _)| *end_ms <= chunk_end_ms)
            {
                let (_, record) = queue.pop_front().expect("front was just checked");
                aligned.push(record);
            }
        }

        if aligned.len() == records.len() {
            break;
        }

        // Jump straight to the first chunk the earliest pending record can
        // land in, so every iteration places at least one record and the
        // loop is bounded by the record count.
        let next_end_ms = tracks
            .iter()
            .filter_map(|(_, _, queue)| queue.front().map(|(end_ms, _)| *end_ms))
            .fold(f64::INFINITY, f64::min);
        let next_chunk = (next_end_ms / chunk_ms as f64).ceil() as u64;
        chunk_index = next_chunk.max(chunk_index + 1);
    }

    Ok(aligned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mux::SampleGroup;

    fn record(track_id: u32, timescale: u32, duration: u64, offset: u64, size: u64) -> SampleMetadata {
        SampleMetadata {
            offset,
            size,
            duration,
            cts_offset: 0,
            extra: 0,
            fragment_number: 0,
            is_sync: true,
            track_id,
            timescale,
            sample_group: None,
        }
    }

    /// Builds records the way a store would: offsets cumulative in arrival
    /// order.
    fn records_from(specs: &[(u32, u32, u64, u64)]) -> Vec<SampleMetadata> {
        let mut offset = 0;
        specs
            .iter()
            .map(|&(track_id, timescale, duration, size)| {
                let r = record(track_id, timescale, duration, offset, size);
                offset += size;
                r
            })
            .collect()
    }

    #[test]
    fn test_pass_through_is_identity() {
        let records = records_from(&[(1, 1000, 100, 10), (2, 1000, 100, 20), (1, 1000, 100, 30)]);
        let aligned = Interleaver::pass_through().align(&records, false).unwrap();
        assert_eq!(aligned, records);
    }

    #[test]
    fn test_pass_through_update_offsets_keeps_packing() {
        let records = records_from(&[(1, 1000, 100, 10), (1, 1000, 100, 20)]);
        let aligned = Interleaver::pass_through().align(&records, true).unwrap();
        assert_eq!(aligned[0].offset, 0);
        assert_eq!(aligned[1].offset, 10);
    }

    #[test]
    fn test_time_aligned_interleaves_by_decode_time() {
        // Track 2 samples are half as long as track 1 samples, so each chunk
        // holds two of track 2 for every one of track 1. Track 2 is seen
        // first, so it leads within each chunk.
        let records = records_from(&[
            (2, 1000, 500, 5),
            (2, 1000, 500, 6),
            (2, 1000, 500, 7),
            (2, 1000, 500, 8),
            (1, 1000, 1000, 100),
            (1, 1000, 1000, 200),
        ]);
        let aligned = Interleaver::time_aligned(1).align(&records, false).unwrap();
        let order: Vec<(u32, u64)> = aligned.iter().map(|r| (r.track_id, r.size)).collect();
        assert_eq!(
            order,
            vec![(2, 5), (2, 6), (1, 100), (2, 7), (2, 8), (1, 200)]
        );
    }

    #[test]
    fn test_time_aligned_is_deterministic() {
        let records = records_from(&[
            (1, 90_000, 3_000, 10),
            (2, 48_000, 1_024, 20),
            (1, 90_000, 3_000, 30),
            (2, 48_000, 1_024, 40),
            (2, 48_000, 1_024, 50),
        ]);
        let interleaver = Interleaver::time_aligned(20);
        let first = interleaver.align(&records, false).unwrap();
        let second = interleaver.align(&records, false).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_time_aligned_update_offsets_packs_new_order() {
        let records = records_from(&[
            (2, 1000, 500, 5),
            (2, 1000, 500, 6),
            (1, 1000, 1000, 100),
        ]);
        let aligned = Interleaver::time_aligned(1).align(&records, true).unwrap();
        // new order: t2 (5), t2 (6), t1 (100)
        assert_eq!(aligned[0].offset, 0);
        assert_eq!(aligned[1].offset, 5);
        assert_eq!(aligned[2].offset, 11);
        // sizes are untouched
        assert_eq!(aligned[2].size, 100);
    }

    #[test]
    fn test_time_aligned_rejects_zero_chunk() {
        let records = records_from(&[(1, 1000, 100, 10)]);
        assert!(matches!(
            Interleaver::time_aligned(0).align(&records, false),
            Err(StoreError::ZeroChunkDuration)
        ));
    }

    #[test]
    fn test_time_aligned_rejects_zero_timescale() {
        let records = vec![record(7, 0, 100, 0, 10)];
        assert!(matches!(
            Interleaver::time_aligned(10).align(&records, false),
            Err(StoreError::ZeroTimescale { track_id: 7 })
        ));
    }

    #[test]
    fn test_group_info_survives_alignment() {
        let mut records = records_from(&[(1, 1000, 100, 10), (2, 1000, 100, 20)]);
        records[1].sample_group = Some(SampleGroup::new(crate::mux::SampleGroupKind::Roll, -1));
        let aligned = Interleaver::time_aligned(100).align(&records, false).unwrap();
        let track2 = aligned.iter().find(|r| r.track_id == 2).unwrap();
        assert_eq!(
            track2.sample_group,
            Some(SampleGroup::new(crate::mux::SampleGroupKind::Roll, -1))
        );
    }
}
