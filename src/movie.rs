/*!
 * Flat (non-fragmented) file assembly.
 *
 * A [`MovieWriter`] takes a drained-once [`SampleStore`], builds the moov
 * tree from the store's offset-rewritten metadata table, and writes
 * `ftyp` + `moov` + `mdat` with the payload bytes re-read from the sink in
 * the interleaved order that table dictates.
 */

use bon::{bon, Builder};
use futures_io::AsyncWrite;
use log::debug;
use thiserror::Error;

use crate::{
    boxes::{
        ctts::CTTS,
        dref::DREF,
        ftyp::FileTypeBox,
        hdlr::HDLR,
        mdhd::{pack_language, MDHD},
        mvhd::MVHD,
        sbgp::SBGP,
        sgpd::SGPD,
        smhd::SMHD,
        stsc::STSC,
        stsd::{SampleEntry, STSD},
        stss::STSS,
        stsz::STSZ,
        stts::STTS,
        tkhd::TKHD,
        vmhd::VMHD,
        ChunkOffsetBox, DataReferenceBox, FourCC, HandlerBox, MediaHeaderBox, MovieHeaderBox,
        Mp4Box, SampleDescriptionBox, SampleSizeBox, SampleToChunkBox, SoundMediaHeaderBox,
        TimeToSampleBox, TrackHeaderBox, VideoMediaHeaderBox, DINF, MDAT, MDIA, MINF, MOOV, STBL,
        TRAK,
    },
    mux::{SampleSink, SampleStore, StoreError},
    table::{SampleTableBuilder, TrackSampleTables},
    writer::{BoxWriter, SerializeBox, WriteError},
};

/// Errors raised while assembling an output file.
#[derive(Debug, Error)]
pub enum MovieWriteError {
    #[error(transparent)]
    Write(#[from] WriteError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("no track configuration for track id {track_id}")]
    UnknownTrack { track_id: u32 },
}

/// What kind of media a track carries; decides the handler and media header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Audio,
    Video,
}

/// Static description of one output track.
#[derive(Debug, Clone, Builder)]
pub struct TrackConfig {
    /// Unique, non-zero track identifier; matches the track id samples are
    /// added under
    pub track_id: u32,
    /// Media timescale; matches the timescale samples are added under
    pub timescale: u32,
    pub kind: MediaKind,
    /// The stsd entry describing the coded format (opaque body)
    pub sample_entry: SampleEntry,
    #[builder(default = pack_language("und"))]
    pub language: u16,
    /// Visual width in pixels, video tracks only
    #[builder(default = 0.0)]
    pub width: f32,
    /// Visual height in pixels, video tracks only
    #[builder(default = 0.0)]
    pub height: f32,
}

/// Writes a complete flat MP4 file from a sample store.
pub struct MovieWriter<W> {
    writer: BoxWriter<W>,
    movie_timescale: u32,
    file_type: FileTypeBox,
}

#[bon]
impl<W: AsyncWrite + Unpin> MovieWriter<W> {
    #[builder]
    pub fn new(
        #[builder(start_fn)] writer: W,
        #[builder(default = 1000)] movie_timescale: u32,
        #[builder(default = FileTypeBox::default())] file_type: FileTypeBox,
    ) -> Self {
        Self {
            writer: BoxWriter::new(writer),
            movie_timescale,
            file_type,
        }
    }

    /// Writes `ftyp` + `moov` + `mdat`. All samples must have been added
    /// (with fragment number 0) before this call; the store's sink is
    /// re-read in interleaved order to lay the payload out to match the
    /// sample tables.
    pub async fn write_flat<S: SampleSink>(
        mut self,
        store: &mut SampleStore<S>,
        tracks: &[TrackConfig],
    ) -> Result<W, MovieWriteError> {
        for config in tracks {
            if config.timescale == 0 {
                return Err(StoreError::ZeroTimescale {
                    track_id: config.track_id,
                }
                .into());
            }
        }

        let table = store.sample_metadata()?;
        let builder = SampleTableBuilder::new(&table);
        for track_id in builder.track_ids() {
            if !tracks.iter().any(|config| config.track_id == track_id) {
                return Err(MovieWriteError::UnknownTrack { track_id });
            }
        }

        let payload_size: u64 = table.iter().map(|record| record.size).sum();
        let ftyp_bytes = Mp4Box::leaf(
            &self.file_type.box_type().into_bytes(),
            self.file_type.clone(),
        )
        .into_bytes();
        let mdat_header_size = if payload_size + 8 > u32::MAX as u64 {
            16u64
        } else {
            8u64
        };

        // stco offsets depend on the moov size, which depends on the stco
        // encoding (stco vs co64). Iterate until the layout is stable.
        let mut base_offset = ftyp_bytes.len() as u64 + mdat_header_size;
        let moov = loop {
            let moov = build_moov(&builder, tracks, self.movie_timescale, base_offset)?;
            let moov_size = moov.clone().into_bytes().len() as u64;
            let next_base = ftyp_bytes.len() as u64 + moov_size + mdat_header_size;
            if next_base == base_offset {
                break moov;
            }
            base_offset = next_base;
        };

        debug!(
            "flat layout: {} tracks, payload {payload_size} bytes at offset {base_offset}",
            tracks.len()
        );

        self.writer.write_raw(&ftyp_bytes).await?;
        self.writer.write_box(moov).await?;
        self.writer
            .write_box_header(FourCC(*MDAT), payload_size as usize)
            .await?;

        if !store.is_empty() {
            while let Some(buffer) = store.stored_samples(0, 0)? {
                self.writer.write_raw(&buffer).await?;
            }
        }
        self.writer.flush().await?;

        Ok(self.writer.into_inner())
    }
}

/// Builds the moov tree for a flat file.
fn build_moov(
    builder: &SampleTableBuilder<'_>,
    tracks: &[TrackConfig],
    movie_timescale: u32,
    base_offset: u64,
) -> Result<Mp4Box, MovieWriteError> {
    let mut movie_duration = 0u64;
    let mut traks = Vec::with_capacity(tracks.len());
    for config in tracks {
        let tables = builder.build_track(config.track_id, base_offset);
        let track_duration =
            convert_timescale(tables.total_duration, config.timescale, movie_timescale);
        movie_duration = movie_duration.max(track_duration);
        traks.push(build_trak(config, Some(&tables), track_duration));
    }

    let next_track_id = tracks
        .iter()
        .map(|config| config.track_id)
        .max()
        .unwrap_or(0)
        + 1;
    let mvhd = MovieHeaderBox::builder()
        .timescale(movie_timescale)
        .duration(movie_duration)
        .next_track_id(next_track_id)
        .build();

    let mut children = vec![Mp4Box::leaf(MVHD, mvhd)];
    children.extend(traks);
    Ok(Mp4Box::container(MOOV, children))
}

/// Converts a duration between timescales, rounding down.
pub(crate) fn convert_timescale(duration: u64, from: u32, to: u32) -> u64 {
    (duration as u128 * to as u128 / from as u128) as u64
}

/// Builds one trak tree. `tables` is `None` for fragmented init segments,
/// which carry empty sample tables.
pub(crate) fn build_trak(
    config: &TrackConfig,
    tables: Option<&TrackSampleTables>,
    track_duration: u64,
) -> Mp4Box {
    let tkhd = TrackHeaderBox::builder()
        .track_id(config.track_id)
        .duration(track_duration)
        .volume(match config.kind {
            MediaKind::Audio => 1.0,
            MediaKind::Video => 0.0,
        })
        .width(config.width)
        .height(config.height)
        .build();

    let media_duration = tables.map(|tables| tables.total_duration).unwrap_or(0);
    let mdhd = MediaHeaderBox::builder()
        .timescale(config.timescale)
        .duration(media_duration)
        .language(config.language)
        .build();

    let hdlr = match config.kind {
        MediaKind::Audio => HandlerBox::audio(),
        MediaKind::Video => HandlerBox::video(),
    };

    let media_header = match config.kind {
        MediaKind::Audio => Mp4Box::leaf(SMHD, SoundMediaHeaderBox::default()),
        MediaKind::Video => Mp4Box::leaf(VMHD, VideoMediaHeaderBox::default()),
    };

    let dinf = Mp4Box::container(
        DINF,
        vec![Mp4Box::leaf(DREF, DataReferenceBox::self_contained())],
    );

    let stsd = SampleDescriptionBox::from(vec![config.sample_entry.clone()]);
    let mut stbl_children = vec![
        Mp4Box::leaf(STSD, stsd),
        Mp4Box::leaf(
            STTS,
            tables
                .map(|tables| tables.stts.clone())
                .unwrap_or_else(TimeToSampleBox::default),
        ),
    ];
    if let Some(ctts) = tables.and_then(|tables| tables.ctts.clone()) {
        stbl_children.push(Mp4Box::leaf(CTTS, ctts));
    }
    if let Some(stss) = tables.and_then(|tables| tables.stss.clone()) {
        stbl_children.push(Mp4Box::leaf(STSS, stss));
    }
    stbl_children.push(Mp4Box::leaf(
        STSC,
        tables
            .map(|tables| tables.stsc.clone())
            .unwrap_or_else(SampleToChunkBox::default),
    ));
    stbl_children.push(Mp4Box::leaf(
        STSZ,
        tables
            .map(|tables| tables.stsz.clone())
            .unwrap_or_else(SampleSizeBox::default),
    ));
    let stco = tables
        .map(|tables| tables.stco.clone())
        .unwrap_or_else(ChunkOffsetBox::default);
    let stco_type = stco.box_type().into_bytes();
    stbl_children.push(Mp4Box::leaf(&stco_type, stco));
    if let Some(tables) = tables {
        for (sgpd, sbgp) in &tables.sample_groups {
            stbl_children.push(Mp4Box::leaf(SGPD, sgpd.clone()));
            stbl_children.push(Mp4Box::leaf(SBGP, sbgp.clone()));
        }
    }

    let stbl = Mp4Box::container(STBL, stbl_children);
    let minf = Mp4Box::container(MINF, vec![media_header, dinf, stbl]);
    let mdia = Mp4Box::container(
        MDIA,
        vec![
            Mp4Box::leaf(MDHD, mdhd),
            Mp4Box::leaf(HDLR, hdlr),
            minf,
        ],
    );

    Mp4Box::container(TRAK, vec![Mp4Box::leaf(TKHD, tkhd), mdia])
}
