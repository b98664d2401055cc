pub mod ctts;
pub mod dref;
pub mod free;
pub mod ftyp;
pub mod hdlr;
pub mod mdhd;
pub mod mfhd;
pub mod mvhd;
pub mod sbgp;
pub mod sgpd;
pub mod smhd;
pub mod stco_co64;
pub mod stsc;
pub mod stsd;
pub mod stss;
pub mod stsz;
pub mod stts;
pub mod tfdt;
pub mod tfhd;
pub mod tkhd;
pub mod trex;
pub mod trun;
mod util;
pub mod vmhd;

pub use self::{
    ctts::CompositionOffsetBox, dref::DataReferenceBox, free::FreeBox, ftyp::FileTypeBox,
    hdlr::HandlerBox, mdhd::MediaHeaderBox, mfhd::MovieFragmentHeaderBox, mvhd::MovieHeaderBox,
    sbgp::SampleToGroupBox, sgpd::SampleGroupDescriptionBox, smhd::SoundMediaHeaderBox,
    stco_co64::ChunkOffsetBox, stsc::SampleToChunkBox, stsd::SampleDescriptionBox,
    stss::SyncSampleBox, stsz::SampleSizeBox, stts::TimeToSampleBox,
    tfdt::TrackFragmentDecodeTimeBox, tfhd::TrackFragmentHeaderBox, tkhd::TrackHeaderBox,
    trex::TrackExtendsBox, trun::TrackRunBox, util::FourCC, vmhd::VideoMediaHeaderBox,
};
pub use self::{
    mfhd::MFHD, tfdt::TFDT, tfhd::TFHD, trex::TREX, trun::TRUN,
};

use crate::writer::{serialize_box_header, SerializeBox};

pub const MOOV: &[u8; 4] = b"moov";
pub const TRAK: &[u8; 4] = b"trak";
pub const EDTS: &[u8; 4] = b"edts";
pub const MDIA: &[u8; 4] = b"mdia";
pub const MINF: &[u8; 4] = b"minf";
pub const DINF: &[u8; 4] = b"dinf";
pub const STBL: &[u8; 4] = b"stbl";
pub const MVEX: &[u8; 4] = b"mvex";
pub const MOOF: &[u8; 4] = b"moof";
pub const TRAF: &[u8; 4] = b"traf";
pub const MFRA: &[u8; 4] = b"mfra";
pub const UDTA: &[u8; 4] = b"udta";
pub const MDAT: &[u8; 4] = b"mdat";

/// Determines whether a given box type contains child boxes rather than a payload.
pub fn is_container_box(box_type: FourCC) -> bool {
    matches!(
        &box_type.into_bytes(),
        MOOV | TRAK | EDTS | MDIA | MINF | DINF | STBL | MVEX | MOOF | TRAF | MFRA | UDTA
    )
}

#[derive(Clone, PartialEq, Eq)]
pub struct RawData(pub Vec<u8>);

impl std::fmt::Debug for RawData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[u8; {}]", self.0.len())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoxHeader {
    pub box_type: FourCC,
    /// Total size of the box including its header, as read from the input.
    /// Zero for boxes assembled in memory before serialization.
    pub size: u64,
    /// Byte offset of the box within the input stream.
    pub offset: u64,
}

impl BoxHeader {
    pub fn new(box_type: [u8; 4]) -> Self {
        Self {
            box_type: FourCC(box_type),
            size: 0,
            offset: 0,
        }
    }
}

/// A node in a box tree: a header plus either child boxes, a typed payload,
/// or both (never both in any box this crate writes).
#[derive(Debug, Clone)]
pub struct Mp4Box {
    pub header: BoxHeader,
    pub children: Vec<Mp4Box>,
    pub data: Option<BoxData>,
}

impl Mp4Box {
    pub fn container(box_type: &[u8; 4], children: Vec<Mp4Box>) -> Self {
        Self {
            header: BoxHeader::new(*box_type),
            children,
            data: None,
        }
    }

    pub fn leaf(box_type: &[u8; 4], data: impl Into<BoxData>) -> Self {
        Self {
            header: BoxHeader::new(*box_type),
            children: Vec::new(),
            data: Some(data.into()),
        }
    }

    pub fn raw(box_type: &[u8; 4], bytes: Vec<u8>) -> Self {
        Self::leaf(box_type, RawData(bytes))
    }

    pub fn box_type(&self) -> FourCC {
        self.header.box_type
    }

    pub fn find_child(&self, box_type: &[u8; 4]) -> Option<&Mp4Box> {
        self.children
            .iter()
            .find(|child| child.header.box_type == box_type)
    }

    /// Finds the first descendant with the given type, depth first.
    pub fn find_descendant(&self, box_type: &[u8; 4]) -> Option<&Mp4Box> {
        for child in &self.children {
            if child.header.box_type == box_type {
                return Some(child);
            }
            if let Some(found) = child.find_descendant(box_type) {
                return Some(found);
            }
        }
        None
    }

    /// Serializes the whole tree, sizing each header from its serialized body.
    pub fn into_bytes(self) -> Vec<u8> {
        let box_type = self.header.box_type;
        let mut body = match self.data {
            Some(data) => data.into_body_bytes(),
            None => Vec::new(),
        };
        for child in self.children {
            body.extend(child.into_bytes());
        }
        let mut out = serialize_box_header(box_type, body.len() as u64);
        out.extend(body);
        out
    }
}

#[derive(Debug, Clone)]
pub enum BoxData {
    FileType(FileTypeBox),
    MovieHeader(MovieHeaderBox),
    TrackHeader(TrackHeaderBox),
    MediaHeader(MediaHeaderBox),
    Handler(HandlerBox),
    SoundMediaHeader(SoundMediaHeaderBox),
    VideoMediaHeader(VideoMediaHeaderBox),
    DataReference(DataReferenceBox),
    SampleDescription(SampleDescriptionBox),
    TimeToSample(TimeToSampleBox),
    CompositionOffset(CompositionOffsetBox),
    SyncSample(SyncSampleBox),
    SampleSize(SampleSizeBox),
    SampleToChunk(SampleToChunkBox),
    ChunkOffset(ChunkOffsetBox),
    SampleGroupDescription(SampleGroupDescriptionBox),
    SampleToGroup(SampleToGroupBox),
    TrackExtends(TrackExtendsBox),
    MovieFragmentHeader(MovieFragmentHeaderBox),
    TrackFragmentHeader(TrackFragmentHeaderBox),
    TrackFragmentDecodeTime(TrackFragmentDecodeTimeBox),
    TrackRun(TrackRunBox),
    Free(FreeBox),
    Raw(RawData),
}

impl BoxData {
    pub fn into_body_bytes(self) -> Vec<u8> {
        match self {
            BoxData::FileType(data) => data.into_body_bytes(),
            BoxData::MovieHeader(data) => data.into_body_bytes(),
            BoxData::TrackHeader(data) => data.into_body_bytes(),
            BoxData::MediaHeader(data) => data.into_body_bytes(),
            BoxData::Handler(data) => data.into_body_bytes(),
            BoxData::SoundMediaHeader(data) => data.into_body_bytes(),
            BoxData::VideoMediaHeader(data) => data.into_body_bytes(),
            BoxData::DataReference(data) => data.into_body_bytes(),
            BoxData::SampleDescription(data) => data.into_body_bytes(),
            BoxData::TimeToSample(data) => data.into_body_bytes(),
            BoxData::CompositionOffset(data) => data.into_body_bytes(),
            BoxData::SyncSample(data) => data.into_body_bytes(),
            BoxData::SampleSize(data) => data.into_body_bytes(),
            BoxData::SampleToChunk(data) => data.into_body_bytes(),
            BoxData::ChunkOffset(data) => data.into_body_bytes(),
            BoxData::SampleGroupDescription(data) => data.into_body_bytes(),
            BoxData::SampleToGroup(data) => data.into_body_bytes(),
            BoxData::TrackExtends(data) => data.into_body_bytes(),
            BoxData::MovieFragmentHeader(data) => data.into_body_bytes(),
            BoxData::TrackFragmentHeader(data) => data.into_body_bytes(),
            BoxData::TrackFragmentDecodeTime(data) => data.into_body_bytes(),
            BoxData::TrackRun(data) => data.into_body_bytes(),
            BoxData::Free(data) => data.into_body_bytes(),
            BoxData::Raw(data) => data.0,
        }
    }
}

impl From<FileTypeBox> for BoxData {
    fn from(data: FileTypeBox) -> Self {
        BoxData::FileType(data)
    }
}

impl From<MovieHeaderBox> for BoxData {
    fn from(data: MovieHeaderBox) -> Self {
        BoxData::MovieHeader(data)
    }
}

impl From<TrackHeaderBox> for BoxData {
    fn from(data: TrackHeaderBox) -> Self {
        BoxData::TrackHeader(data)
    }
}

impl From<MediaHeaderBox> for BoxData {
    fn from(data: MediaHeaderBox) -> Self {
        BoxData::MediaHeader(data)
    }
}

impl From<HandlerBox> for BoxData {
    fn from(data: HandlerBox) -> Self {
        BoxData::Handler(data)
    }
}

impl From<SoundMediaHeaderBox> for BoxData {
    fn from(data: SoundMediaHeaderBox) -> Self {
        BoxData::SoundMediaHeader(data)
    }
}

impl From<VideoMediaHeaderBox> for BoxData {
    fn from(data: VideoMediaHeaderBox) -> Self {
        BoxData::VideoMediaHeader(data)
    }
}

impl From<DataReferenceBox> for BoxData {
    fn from(data: DataReferenceBox) -> Self {
        BoxData::DataReference(data)
    }
}

impl From<SampleDescriptionBox> for BoxData {
    fn from(data: SampleDescriptionBox) -> Self {
        BoxData::SampleDescription(data)
    }
}

impl From<TimeToSampleBox> for BoxData {
    fn from(data: TimeToSampleBox) -> Self {
        BoxData::TimeToSample(data)
    }
}

impl From<CompositionOffsetBox> for BoxData {
    fn from(data: CompositionOffsetBox) -> Self {
        BoxData::CompositionOffset(data)
    }
}

impl From<SyncSampleBox> for BoxData {
    fn from(data: SyncSampleBox) -> Self {
        BoxData::SyncSample(data)
    }
}

impl From<SampleSizeBox> for BoxData {
    fn from(data: SampleSizeBox) -> Self {
        BoxData::SampleSize(data)
    }
}

impl From<SampleToChunkBox> for BoxData {
    fn from(data: SampleToChunkBox) -> Self {
        BoxData::SampleToChunk(data)
    }
}

impl From<ChunkOffsetBox> for BoxData {
    fn from(data: ChunkOffsetBox) -> Self {
        BoxData::ChunkOffset(data)
    }
}

impl From<SampleGroupDescriptionBox> for BoxData {
    fn from(data: SampleGroupDescriptionBox) -> Self {
        BoxData::SampleGroupDescription(data)
    }
}

impl From<SampleToGroupBox> for BoxData {
    fn from(data: SampleToGroupBox) -> Self {
        BoxData::SampleToGroup(data)
    }
}

impl From<TrackExtendsBox> for BoxData {
    fn from(data: TrackExtendsBox) -> Self {
        BoxData::TrackExtends(data)
    }
}

impl From<MovieFragmentHeaderBox> for BoxData {
    fn from(data: MovieFragmentHeaderBox) -> Self {
        BoxData::MovieFragmentHeader(data)
    }
}

impl From<TrackFragmentHeaderBox> for BoxData {
    fn from(data: TrackFragmentHeaderBox) -> Self {
        BoxData::TrackFragmentHeader(data)
    }
}

impl From<TrackFragmentDecodeTimeBox> for BoxData {
    fn from(data: TrackFragmentDecodeTimeBox) -> Self {
        BoxData::TrackFragmentDecodeTime(data)
    }
}

impl From<TrackRunBox> for BoxData {
    fn from(data: TrackRunBox) -> Self {
        BoxData::TrackRun(data)
    }
}

impl From<FreeBox> for BoxData {
    fn from(data: FreeBox) -> Self {
        BoxData::Free(data)
    }
}

impl From<RawData> for BoxData {
    fn from(data: RawData) -> Self {
        BoxData::Raw(data)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_container_box() {
        assert!(is_container_box(FourCC(*MOOV)));
        assert!(is_container_box(FourCC(*TRAF)));
        assert!(!is_container_box(FourCC(*MDAT)));
        assert!(!is_container_box(FourCC(*b"stsz")));
    }

    #[test]
    fn test_tree_serialization() {
        let tree = Mp4Box::container(
            MOOV,
            vec![Mp4Box::raw(b"chd1", b"12345678".to_vec())],
        );

        let bytes = tree.into_bytes();
        assert_eq!(bytes.len(), 8 + 8 + 8);
        assert_eq!(&bytes[0..4], &24u32.to_be_bytes());
        assert_eq!(&bytes[4..8], MOOV);
        assert_eq!(&bytes[8..12], &16u32.to_be_bytes());
        assert_eq!(&bytes[12..16], b"chd1");
        assert_eq!(&bytes[16..24], b"12345678");
    }
}
