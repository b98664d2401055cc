use log::{debug, trace};
use thiserror::Error;

use crate::mux::{
    interleave::Interleaver,
    sample::{Sample, SampleMetadata},
    sink::{SampleSink, SinkError},
};

/// Errors raised by [`SampleStore`] operations. Configuration errors signal
/// caller misuse and carry the offending values; sink errors are propagated
/// unchanged.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no samples have been stored")]
    Empty,
    #[error("fragment {requested} requested after fragment {served} was already served")]
    FragmentOrder { requested: u32, served: u32 },
    #[error(
        "buffer limit of {max_buffer_size} bytes cannot hold the next sample ({sample_size} bytes)"
    )]
    BufferTooSmall {
        max_buffer_size: u64,
        sample_size: u64,
    },
    #[error("track {track_id} has a zero timescale")]
    ZeroTimescale { track_id: u32 },
    #[error("interleaver chunk duration must be non-zero")]
    ZeroChunkDuration,
    #[error(transparent)]
    Sink(#[from] SinkError),
}

/// Buffers samples from any number of tracks and serves them back in
/// interleaved logical order.
///
/// Payload bytes go into the sink immediately in arrival order; the
/// interleaved order is computed lazily and cached until new samples arrive.
/// A store is consumed either through [`SampleStore::sample_metadata`] (flat
/// files: one offset-rewritten table after all samples were added) or through
/// repeated [`SampleStore::stored_samples`] calls (fragmented output), not
/// both at once.
pub struct SampleStore<S> {
    sink: S,
    interleaver: Interleaver,
    records: Vec<SampleMetadata>,
    /// Total bytes not yet served through `stored_samples`
    unread_bytes: u64,
    /// Read position within the cached interleaved order
    cursor: usize,
    /// Highest fragment number served so far
    last_fragment: u32,
    /// Cached interleaved order, valid while it covers `aligned_count`
    /// records
    aligned: Vec<SampleMetadata>,
    aligned_count: usize,
}

impl<S: SampleSink> SampleStore<S> {
    pub fn new(sink: S, interleaver: Interleaver) -> Self {
        Self {
            sink,
            interleaver,
            records: Vec::new(),
            unread_bytes: 0,
            cursor: 0,
            last_fragment: 0,
            aligned: Vec::new(),
            aligned_count: 0,
        }
    }

    /// Appends a sample's payload to the sink and records its metadata.
    ///
    /// Samples may arrive from any track in any interleaving, but a track
    /// must advance through fragment numbers monotonically for fragment
    /// grouping to work out.
    pub fn add_sample(
        &mut self,
        sample: Sample,
        track_id: u32,
        timescale: u32,
    ) -> Result<(), StoreError> {
        if timescale == 0 {
            return Err(StoreError::ZeroTimescale { track_id });
        }

        let offset = self.sink.bytes_written();
        self.sink.write(&sample.data)?;

        let size = sample.data.len() as u64;
        trace!(
            "stored sample: track {track_id} fragment {} offset {offset} size {size}",
            sample.fragment_number
        );

        self.records.push(SampleMetadata {
            offset,
            size,
            duration: sample.duration,
            cts_offset: sample.cts_offset,
            extra: 0,
            fragment_number: sample.fragment_number,
            is_sync: sample.is_sync,
            track_id,
            timescale,
            sample_group: sample.sample_group,
        });
        self.unread_bytes += size;

        Ok(())
    }

    /// Number of samples added so far.
    pub fn sample_count(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Total bytes not yet drained through [`SampleStore::stored_samples`].
    pub fn unread_bytes(&self) -> u64 {
        self.unread_bytes
    }

    /// Highest fragment number served so far.
    pub fn last_fragment(&self) -> u32 {
        self.last_fragment
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// The full metadata table in interleaved order with offsets rewritten to
    /// pack the payload back-to-back in that order.
    ///
    /// For flat files this is the final sample table: whoever writes the
    /// payload region must emit the bytes in exactly this order. Only valid
    /// once all samples have been added; calling it twice without intervening
    /// `add_sample` calls returns identical results.
    pub fn sample_metadata(&self) -> Result<Vec<SampleMetadata>, StoreError> {
        self.interleaver.align(&self.records, true)
    }

    /// The interleaved metadata records belonging to one fragment, in serve
    /// order, with their physical offsets. This is the index the fragment's
    /// header boxes are built from.
    pub fn fragment_metadata(
        &mut self,
        fragment_number: u32,
    ) -> Result<Vec<SampleMetadata>, StoreError> {
        self.refresh_aligned()?;
        Ok(self
            .aligned
            .iter()
            .filter(|record| record.fragment_number == fragment_number)
            .cloned()
            .collect())
    }

    /// Drains up to `max_buffer_size` bytes (0 = unbounded) of the requested
    /// fragment's payload, in interleaved logical order.
    ///
    /// Fragments must be requested in non-decreasing order. A partially
    /// drained fragment resumes on the next call. `Ok(None)` signals that
    /// nothing (more) is stored for this fragment — the normal termination of
    /// a drain loop, not an error.
    pub fn stored_samples(
        &mut self,
        max_buffer_size: u64,
        fragment_number: u32,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        if self.records.is_empty() {
            return Err(StoreError::Empty);
        }
        if fragment_number < self.last_fragment {
            return Err(StoreError::FragmentOrder {
                requested: fragment_number,
                served: self.last_fragment,
            });
        }

        self.refresh_aligned()?;

        if self.cursor >= self.aligned.len() {
            // everything served already, for this and any later fragment
            return Ok(None);
        }

        // Walk forward from the cursor, batching this fragment's records
        // into minimal contiguous read ranges.
        let mut ranges: Vec<(u64, u64)> = Vec::new();
        let mut total: u64 = 0;
        let mut taken = 0usize;
        let mut index = self.cursor;
        let mut capped = false;
        while index < self.aligned.len() {
            let record = &self.aligned[index];
            if record.fragment_number > fragment_number {
                // not yet; the caller must ask for that fragment later
                break;
            }
            if record.fragment_number < fragment_number {
                // logically consumed by an earlier fragment; tolerated
                index += 1;
                continue;
            }
            if max_buffer_size != 0 && total + record.size > max_buffer_size {
                capped = true;
                break;
            }
            if record.size > 0 {
                match ranges.last_mut() {
                    Some((last_offset, last_size)) if *last_offset + *last_size == record.offset => {
                        *last_size += record.size
                    }
                    _ => ranges.push((record.offset, record.size)),
                }
                total += record.size;
            }
            taken += 1;
            index += 1;
        }

        if taken == 0 {
            if capped {
                // the limit cannot even hold one sample; a configuration
                // error, not a transient condition
                return Err(StoreError::BufferTooSmall {
                    max_buffer_size,
                    sample_size: self.aligned[index].size,
                });
            }
            // nothing stored for this fragment
            self.cursor = index;
            return Ok(None);
        }

        let mut buffer = Vec::with_capacity(total as usize);
        for (offset, size) in &ranges {
            buffer.extend(self.sink.read(*offset, *size)?);
        }

        debug!(
            "drained fragment {fragment_number}: {taken} samples, {total} bytes in {} reads",
            ranges.len()
        );

        self.unread_bytes -= total;
        self.cursor = index;
        self.last_fragment = fragment_number;

        Ok(Some(buffer))
    }

    /// Recomputes the cached interleaved order only when samples were added
    /// since it was last built.
    fn refresh_aligned(&mut self) -> Result<(), StoreError> {
        if self.aligned_count < self.records.len() {
            self.aligned = self.interleaver.align(&self.records, false)?;
            self.aligned_count = self.records.len();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mux::MemorySink;

    fn sample(data: &[u8], duration: u64, fragment_number: u32) -> Sample {
        Sample::builder()
            .data(data.to_vec())
            .duration(duration)
            .fragment_number(fragment_number)
            .is_sync(true)
            .build()
    }

    fn pass_through_store() -> SampleStore<MemorySink> {
        SampleStore::new(MemorySink::new(), Interleaver::pass_through())
    }

    #[test]
    fn test_conservation() {
        let mut store = pass_through_store();
        let payloads: [&[u8]; 3] = [b"aaaa", b"bb", b"cccccc"];
        for payload in payloads {
            store.add_sample(sample(payload, 100, 1), 1, 1000).unwrap();
        }

        let total_metadata: u64 = store
            .fragment_metadata(1)
            .unwrap()
            .iter()
            .map(|r| r.size)
            .sum();
        assert_eq!(total_metadata, 12);
        assert_eq!(store.sink().bytes_written(), 12);
        assert_eq!(store.unread_bytes(), 12);

        let mut drained = 0;
        while let Some(buffer) = store.stored_samples(0, 1).unwrap() {
            drained += buffer.len() as u64;
        }
        assert_eq!(drained, 12);
        assert_eq!(store.unread_bytes(), 0);
    }

    #[test]
    fn test_pass_through_preserves_order() {
        let mut store = pass_through_store();
        store.add_sample(sample(b"11", 100, 1), 1, 1000).unwrap();
        store.add_sample(sample(b"22", 100, 1), 2, 1000).unwrap();
        store.add_sample(sample(b"33", 100, 1), 1, 1000).unwrap();

        let buffer = store.stored_samples(0, 1).unwrap().unwrap();
        assert_eq!(buffer, b"112233");
        assert!(store.stored_samples(0, 1).unwrap().is_none());
    }

    #[test]
    fn test_empty_store_is_an_error() {
        let mut store = pass_through_store();
        assert!(matches!(
            store.stored_samples(0, 1),
            Err(StoreError::Empty)
        ));
    }

    #[test]
    fn test_fragment_monotonicity_is_enforced() {
        let mut store = pass_through_store();
        store.add_sample(sample(b"a", 10, 1), 1, 1000).unwrap();
        store.add_sample(sample(b"b", 10, 2), 1, 1000).unwrap();

        store.stored_samples(0, 2).unwrap().unwrap();
        assert!(matches!(
            store.stored_samples(0, 1),
            Err(StoreError::FragmentOrder {
                requested: 1,
                served: 2
            })
        ));
    }

    #[test]
    fn test_zero_timescale_is_rejected() {
        let mut store = pass_through_store();
        assert!(matches!(
            store.add_sample(sample(b"a", 10, 1), 1, 0),
            Err(StoreError::ZeroTimescale { track_id: 1 })
        ));
    }

    #[test]
    fn test_max_buffer_size_chunks_a_fragment() {
        let mut store = pass_through_store();
        store.add_sample(sample(&[1u8; 10], 100, 1), 1, 1000).unwrap();
        store.add_sample(sample(&[2u8; 10], 100, 1), 1, 1000).unwrap();
        store.add_sample(sample(&[3u8; 10], 100, 1), 1, 1000).unwrap();

        // two samples fit per call
        let first = store.stored_samples(25, 1).unwrap().unwrap();
        assert_eq!(first.len(), 20);
        let second = store.stored_samples(25, 1).unwrap().unwrap();
        assert_eq!(second.len(), 10);
        assert!(store.stored_samples(25, 1).unwrap().is_none());

        let mut all = first;
        all.extend(second);
        assert_eq!(all.len(), 30);
        assert_eq!(&all[..10], &[1u8; 10]);
        assert_eq!(&all[20..], &[3u8; 10]);
    }

    #[test]
    fn test_max_buffer_size_too_small_is_an_error() {
        let mut store = pass_through_store();
        store.add_sample(sample(&[1u8; 10], 100, 1), 1, 1000).unwrap();

        assert!(matches!(
            store.stored_samples(5, 1),
            Err(StoreError::BufferTooSmall {
                max_buffer_size: 5,
                sample_size: 10
            })
        ));
    }

    #[test]
    fn test_fragments_drain_in_sequence() {
        let mut store = pass_through_store();
        store.add_sample(sample(b"f1a", 100, 1), 1, 1000).unwrap();
        store.add_sample(sample(b"f1b", 100, 1), 2, 1000).unwrap();
        store.add_sample(sample(b"f2a", 100, 2), 1, 1000).unwrap();
        store.add_sample(sample(b"f3a", 100, 3), 1, 1000).unwrap();

        assert_eq!(store.stored_samples(0, 1).unwrap().unwrap(), b"f1af1b");
        assert_eq!(store.stored_samples(0, 2).unwrap().unwrap(), b"f2a");
        assert_eq!(store.stored_samples(0, 3).unwrap().unwrap(), b"f3a");
        assert!(store.stored_samples(0, 3).unwrap().is_none());
    }

    #[test]
    fn test_requesting_a_fragment_with_no_samples_returns_none() {
        let mut store = pass_through_store();
        store.add_sample(sample(b"f2", 100, 2), 1, 1000).unwrap();

        // fragment 1 holds nothing; fragment 2 is still available afterwards
        assert!(store.stored_samples(0, 1).unwrap().is_none());
        assert_eq!(store.stored_samples(0, 2).unwrap().unwrap(), b"f2");
    }

    #[test]
    fn test_samples_added_after_a_drain_are_picked_up() {
        let mut store = pass_through_store();
        store.add_sample(sample(b"one", 100, 1), 1, 1000).unwrap();
        assert_eq!(store.stored_samples(0, 1).unwrap().unwrap(), b"one");

        store.add_sample(sample(b"two", 100, 2), 1, 1000).unwrap();
        assert_eq!(store.stored_samples(0, 2).unwrap().unwrap(), b"two");
    }

    #[test]
    fn test_coalescing_reconstructs_interleaved_order() {
        // Two tracks, time-aligned: logical order differs from physical
        // order, so the store must stitch non-adjacent ranges together.
        let mut store = SampleStore::new(MemorySink::new(), Interleaver::time_aligned(1));
        // track 1: 1 s per sample; track 2: 0.5 s per sample
        store.add_sample(sample(b"AAAA", 1000, 1), 1, 1000).unwrap();
        store.add_sample(sample(b"BBBB", 1000, 1), 1, 1000).unwrap();
        store.add_sample(sample(b"aa", 500, 1), 2, 1000).unwrap();
        store.add_sample(sample(b"bb", 500, 1), 2, 1000).unwrap();
        store.add_sample(sample(b"cc", 500, 1), 2, 1000).unwrap();
        store.add_sample(sample(b"dd", 500, 1), 2, 1000).unwrap();

        // logical order: aa (0.5s), then AAAA and bb (both complete at 1s,
        // track 1 first seen), then cc, then BBBB and dd (2s)
        let buffer = store.stored_samples(0, 1).unwrap().unwrap();
        assert_eq!(buffer, b"aaAAAAbbccBBBBdd");
    }

    #[test]
    fn test_metadata_query_is_idempotent() {
        let mut store = SampleStore::new(MemorySink::new(), Interleaver::time_aligned(10));
        store.add_sample(sample(b"xxxx", 100, 0), 1, 1000).unwrap();
        store.add_sample(sample(b"yy", 50, 0), 2, 1000).unwrap();

        let first = store.sample_metadata().unwrap();
        let second = store.sample_metadata().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_sample_metadata_rewrites_offsets() {
        let mut store = SampleStore::new(MemorySink::new(), Interleaver::time_aligned(1));
        // arrival: t1 (4 bytes), then two t2 samples (2 bytes each) that both
        // sort ahead of it
        store.add_sample(sample(b"AAAA", 1000, 0), 1, 1000).unwrap();
        store.add_sample(sample(b"aa", 500, 0), 2, 1000).unwrap();
        store.add_sample(sample(b"bb", 500, 0), 2, 1000).unwrap();

        // logical order: aa (0.5s), AAAA (1s, track 1 first seen), bb (1s)
        let table = store.sample_metadata().unwrap();
        let order: Vec<(u32, u64)> = table.iter().map(|r| (r.track_id, r.offset)).collect();
        assert_eq!(order, vec![(2, 0), (1, 2), (2, 6)]);
    }
}
