/*!
 * Fragmented / segmented output.
 *
 * A [`FragmentWriter`] emits an init segment (`ftyp` + `moov` with empty
 * sample tables and an `mvex`) followed by one `moof`+`mdat` pair per
 * fragment. Fragment payloads are drained from a [`SampleStore`] in
 * interleaved order; each contiguous same-track run inside the payload gets
 * its own `trun` with a payload-relative data offset.
 */

use bon::bon;
use futures_io::AsyncWrite;
use log::debug;

use crate::{
    boxes::{
        ftyp::FileTypeBox,
        mfhd::MovieFragmentHeaderBox,
        mvhd::MVHD,
        tfdt::TrackFragmentDecodeTimeBox,
        tfhd::TrackFragmentHeaderBox,
        trun::{
            TrackRunBox, TrackRunEntry, SAMPLE_FLAGS_NON_SYNC, SAMPLE_FLAGS_SYNC,
        },
        FourCC, MovieHeaderBox, Mp4Box, TrackExtendsBox, MDAT, MFHD, MOOF, MOOV, MVEX, TFDT,
        TFHD, TRAF, TREX, TRUN,
    },
    movie::{build_trak, MovieWriteError, TrackConfig},
    mux::{SampleMetadata, SampleSink, SampleStore},
    table::{fragment_runs, FragmentRun},
    writer::{BoxWriter, SerializeBox},
};

/// Writes an fMP4 stream: init segment, then fragments.
pub struct FragmentWriter<W> {
    writer: BoxWriter<W>,
    movie_timescale: u32,
    file_type: FileTypeBox,
    tracks: Vec<TrackConfig>,
    /// Accumulated decode time per track in track timescale ticks, carried
    /// into each fragment's tfdt
    decode_times: Vec<(u32, u64)>,
    next_sequence_number: u32,
}

#[bon]
impl<W: AsyncWrite + Unpin> FragmentWriter<W> {
    #[builder]
    pub fn new(
        #[builder(start_fn)] writer: W,
        tracks: Vec<TrackConfig>,
        #[builder(default = 1000)] movie_timescale: u32,
        #[builder(default = FileTypeBox::default())] file_type: FileTypeBox,
    ) -> Self {
        let decode_times = tracks.iter().map(|config| (config.track_id, 0)).collect();
        Self {
            writer: BoxWriter::new(writer),
            movie_timescale,
            file_type,
            tracks,
            decode_times,
            next_sequence_number: 1,
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }

    pub async fn flush(&mut self) -> Result<(), MovieWriteError> {
        Ok(self.writer.flush().await?)
    }

    /// Writes `ftyp` + `moov`: empty sample tables plus one trex per track.
    pub async fn write_init_segment(&mut self) -> Result<(), MovieWriteError> {
        let ftyp = self.file_type.clone();
        self.writer
            .write_box(Mp4Box::leaf(&ftyp.box_type().into_bytes(), ftyp))
            .await?;

        let next_track_id = self
            .tracks
            .iter()
            .map(|config| config.track_id)
            .max()
            .unwrap_or(0)
            + 1;
        let mvhd = MovieHeaderBox::builder()
            .timescale(self.movie_timescale)
            .next_track_id(next_track_id)
            .build();

        let mut children = vec![Mp4Box::leaf(MVHD, mvhd)];
        for config in &self.tracks {
            children.push(build_trak(config, None, 0));
        }

        let trexes = self
            .tracks
            .iter()
            .map(|config| {
                Mp4Box::leaf(
                    TREX,
                    TrackExtendsBox::builder().track_id(config.track_id).build(),
                )
            })
            .collect();
        children.push(Mp4Box::container(MVEX, trexes));

        self.writer.write_box(Mp4Box::container(MOOV, children)).await?;
        Ok(())
    }

    /// Writes an `styp` box, marking the start of a self-contained segment.
    pub async fn write_segment_type(&mut self) -> Result<(), MovieWriteError> {
        let mut styp = self.file_type.clone();
        styp.is_segment = true;
        self.writer
            .write_box(Mp4Box::leaf(&styp.box_type().into_bytes(), styp))
            .await?;
        Ok(())
    }

    /// Writes one fragment as a `moof`+`mdat` pair, draining its payload
    /// from the store. Returns `false` without writing anything when the
    /// store holds no samples for the fragment.
    pub async fn write_fragment<S: SampleSink>(
        &mut self,
        store: &mut SampleStore<S>,
        fragment_number: u32,
    ) -> Result<bool, MovieWriteError> {
        let records = store.fragment_metadata(fragment_number)?;
        if records.is_empty() {
            return Ok(false);
        }
        for record in &records {
            if !self
                .tracks
                .iter()
                .any(|config| config.track_id == record.track_id)
            {
                return Err(MovieWriteError::UnknownTrack {
                    track_id: record.track_id,
                });
            }
        }

        let runs = fragment_runs(&records);
        let sequence_number = self.next_sequence_number;

        // The trun data offsets are relative to the start of the moof, which
        // requires the moof's own size: build it once with zero offsets to
        // measure, then again with the real offsets.
        let moof_size = self
            .build_moof(sequence_number, &records, &runs, 0)
            .into_bytes()
            .len() as u64;
        let payload_base = moof_size + 8;
        let moof = self.build_moof(sequence_number, &records, &runs, payload_base);

        let payload = store
            .stored_samples(0, fragment_number)?
            .unwrap_or_default();
        debug_assert_eq!(
            payload.len() as u64,
            records.iter().map(|record| record.size).sum::<u64>(),
            "fragment payload must cover exactly its records"
        );

        debug!(
            "fragment {fragment_number}: sequence {sequence_number}, {} samples, {} runs, {} bytes",
            records.len(),
            runs.len(),
            payload.len()
        );

        self.writer.write_box(moof).await?;
        self.writer
            .write_box_header(FourCC(*MDAT), payload.len())
            .await?;
        self.writer.write_raw(&payload).await?;

        // advance per-track decode times for the next fragment's tfdt
        for record in &records {
            if let Some((_, decode_time)) = self
                .decode_times
                .iter_mut()
                .find(|(track_id, _)| *track_id == record.track_id)
            {
                *decode_time += record.duration;
            }
        }
        self.next_sequence_number += 1;

        Ok(true)
    }

    fn build_moof(
        &self,
        sequence_number: u32,
        records: &[SampleMetadata],
        runs: &[FragmentRun],
        payload_base: u64,
    ) -> Mp4Box {
        let mut children = vec![Mp4Box::leaf(
            MFHD,
            MovieFragmentHeaderBox::new(sequence_number),
        )];

        // one traf per track, in first-seen order within the fragment
        let mut track_ids: Vec<u32> = Vec::new();
        for record in records {
            if !track_ids.contains(&record.track_id) {
                track_ids.push(record.track_id);
            }
        }

        for track_id in track_ids {
            let tfhd = TrackFragmentHeaderBox::builder().track_id(track_id).build();
            let decode_time = self
                .decode_times
                .iter()
                .find(|(id, _)| *id == track_id)
                .map(|(_, decode_time)| *decode_time)
                .unwrap_or(0);
            let tfdt = TrackFragmentDecodeTimeBox::new(decode_time);

            let mut traf_children = vec![
                Mp4Box::leaf(TFHD, tfhd),
                Mp4Box::leaf(TFDT, tfdt),
            ];
            for run in runs.iter().filter(|run| run.track_id == track_id) {
                let run_records = &records[run.record_range.clone()];
                traf_children.push(Mp4Box::leaf(
                    TRUN,
                    build_trun(run_records, payload_base + run.payload_offset),
                ));
            }

            children.push(Mp4Box::container(TRAF, traf_children));
        }

        Mp4Box::container(MOOF, children)
    }
}

fn build_trun(run_records: &[SampleMetadata], data_offset: u64) -> TrackRunBox {
    let with_cts = run_records.iter().any(|record| record.cts_offset != 0);
    let version = if run_records.iter().any(|record| record.cts_offset < 0) {
        1
    } else {
        0
    };

    let entries: Vec<TrackRunEntry> = run_records
        .iter()
        .map(|record| TrackRunEntry {
            duration: Some(
                u32::try_from(record.duration).expect("sample duration must fit in u32"),
            ),
            size: Some(u32::try_from(record.size).expect("sample size must fit in u32")),
            flags: Some(if record.is_sync {
                SAMPLE_FLAGS_SYNC
            } else {
                SAMPLE_FLAGS_NON_SYNC
            }),
            cts_offset: with_cts.then_some(record.cts_offset),
        })
        .collect();

    TrackRunBox {
        version,
        data_offset: Some(
            i32::try_from(data_offset).expect("trun data offset must fit in i32"),
        ),
        first_sample_flags: None,
        entries: entries.into(),
    }
}
