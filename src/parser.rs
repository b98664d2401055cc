use derive_more::Display;
use futures_io::AsyncRead;
use futures_util::io::{AsyncReadExt, Cursor};
use futures_util::stream::{Stream, StreamExt};
use std::future::Future;
use std::ops::Deref;
use thiserror::Error;

use crate::{
    boxes::{
        ctts::{CompositionOffsetBox, CTTS},
        dref::{DataReferenceBox, DREF},
        free::{FreeBox, FREE, SKIP},
        ftyp::{FileTypeBox, FTYP, STYP},
        hdlr::{HandlerBox, HDLR},
        is_container_box,
        mdhd::{MediaHeaderBox, MDHD},
        mfhd::{MovieFragmentHeaderBox, MFHD},
        mvhd::{MovieHeaderBox, MVHD},
        sbgp::{SampleToGroupBox, SBGP},
        sgpd::{SampleGroupDescriptionBox, SGPD},
        smhd::{SoundMediaHeaderBox, SMHD},
        stco_co64::{ChunkOffsetBox, CO64, STCO},
        stsc::{SampleToChunkBox, STSC},
        stsd::{SampleDescriptionBox, STSD},
        stss::{SyncSampleBox, STSS},
        stsz::{SampleSizeBox, STSZ},
        stts::{TimeToSampleBox, STTS},
        tfdt::{TrackFragmentDecodeTimeBox, TFDT},
        tfhd::{TrackFragmentHeaderBox, TFHD},
        tkhd::{TrackHeaderBox, TKHD},
        trex::{TrackExtendsBox, TREX},
        trun::{TrackRunBox, TRUN},
        vmhd::{VideoMediaHeaderBox, VMHD},
        BoxHeader, FourCC, RawData, MDAT,
    },
    BoxData, Mp4Box,
};

/// Async trait for parsing a box body from an AsyncRead stream
pub trait ParseBox: Sized {
    fn parse<R: AsyncRead + Unpin + Send>(
        box_type: FourCC,
        reader: R,
    ) -> impl Future<Output = Result<Self, ParseError>> + Send;
}

#[derive(Debug, Error)]
#[error(
    "{kind}{}",
    self.location.map(|(offset, length)|
        format!(" at offset {offset} with length {length}")).unwrap_or_default()
)]
pub struct ParseError {
    /// The kind of error that occurred during parsing.
    kind: ParseErrorKind,
    /// location is the (offset, length) of the input data related to the error
    location: Option<(usize, usize)>,
    /// The source error that caused this error.
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ParseError {
    pub(crate) fn new_io(e: std::io::Error) -> Self {
        Self {
            kind: ParseErrorKind::Io,
            location: None,
            source: Some(Box::new(e)),
        }
    }

    pub(crate) fn new_unexpected_box(got: FourCC, want: &[u8; 4]) -> Self {
        Self {
            kind: ParseErrorKind::UnexpectedBox,
            location: None,
            source: Some(format!("expected {}, got {}", FourCC(*want), got).into()),
        }
    }

    pub(crate) fn from_winnow<I>(err: winnow::error::ParseError<I, winnow::error::ContextError>) -> Self {
        Self {
            kind: ParseErrorKind::BoxParsing,
            location: Some((err.offset(), 0)),
            source: Some(err.inner().to_string().into()),
        }
    }

    pub fn kind(&self) -> &ParseErrorKind {
        &self.kind
    }
}

#[derive(Debug, Display)]
pub enum ParseErrorKind {
    #[display("I/O error")]
    Io,
    #[display("EOF error")]
    Eof,
    #[display("Invalid box header")]
    InvalidHeader,
    #[display("Invalid box size")]
    InvalidSize,
    #[display("Unexpected box type")]
    UnexpectedBox,
    #[display("Box parsing failed")]
    BoxParsing,
}

#[derive(Debug)]
pub enum ParseEvent {
    EnterContainer(Mp4Box),
    Leaf(Mp4Box),
    /// An mdat payload was encountered and skipped; only its position is
    /// reported.
    MediaData {
        offset: u64,
        size: u64,
    },
    ExitContainer,
}

pub struct Parser<R> {
    reader: R,
    current_offset: usize,
    peek_buffer: Vec<u8>,
}

struct ParsedHeader {
    box_type: FourCC,
    size: u64,
    offset: u64,
    content_size: usize,
}

impl<R: AsyncRead + Unpin + Send> Parser<R> {
    pub fn new(reader: R) -> Self {
        Parser {
            reader,
            current_offset: 0,
            peek_buffer: Vec::new(),
        }
    }

    /// Streams parse events for the whole input, recursing into containers
    /// and skipping mdat payloads.
    pub fn stream_boxes<'a>(&'a mut self) -> impl Stream<Item = Result<ParseEvent, ParseError>> + 'a {
        self.parse_box_stream(None)
    }

    /// Convenience wrapper around [`Parser::stream_boxes`] that assembles the
    /// events back into a list of top-level box trees. Skipped mdat payloads
    /// appear as data-less boxes with their header size/offset filled in.
    pub async fn read_boxes(&mut self) -> Result<Vec<Mp4Box>, ParseError> {
        let mut roots: Vec<Mp4Box> = Vec::new();
        let mut stack: Vec<Mp4Box> = Vec::new();

        let stream = self.stream_boxes();
        futures_util::pin_mut!(stream);
        while let Some(event) = stream.next().await {
            match event? {
                ParseEvent::EnterContainer(container) => stack.push(container),
                ParseEvent::ExitContainer => {
                    let done = stack.pop().expect("unbalanced container events");
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(done),
                        None => roots.push(done),
                    }
                }
                ParseEvent::Leaf(leaf) => match stack.last_mut() {
                    Some(parent) => parent.children.push(leaf),
                    None => roots.push(leaf),
                },
                ParseEvent::MediaData { offset, size } => {
                    let mdat = Mp4Box {
                        header: BoxHeader {
                            box_type: FourCC(*MDAT),
                            size,
                            offset,
                        },
                        children: Vec::new(),
                        data: None,
                    };
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(mdat),
                        None => roots.push(mdat),
                    }
                }
            }
        }

        Ok(roots)
    }

    async fn peek_exact(&mut self, buf: &mut [u8]) -> Result<(), ParseError> {
        let size = buf.len();
        if self.peek_buffer.len() < size {
            let mut temp_buf = vec![0u8; size - self.peek_buffer.len()];
            self.reader.read_exact(&mut temp_buf).await.map_err(|e| {
                if e.kind() == std::io::ErrorKind::UnexpectedEof {
                    return ParseError {
                        kind: ParseErrorKind::Eof,
                        location: Some((self.current_offset, size)),
                        source: Some(Box::new(e)),
                    };
                }
                ParseError {
                    kind: ParseErrorKind::Io,
                    location: Some((self.current_offset, size)),
                    source: Some(Box::new(e)),
                }
            })?;
            self.peek_buffer.extend_from_slice(&temp_buf[..]);
        }
        buf.copy_from_slice(&self.peek_buffer[..size]);
        Ok(())
    }

    async fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), ParseError> {
        self.peek_exact(buf).await?;
        self.peek_buffer.drain(..buf.len());
        self.current_offset += buf.len();
        Ok(())
    }

    async fn read_data(&mut self, size: usize) -> Result<Vec<u8>, ParseError> {
        let mut data = vec![0u8; size];
        self.read_exact(&mut data).await?;
        Ok(data)
    }

    /// Discards `size` bytes without buffering them all at once.
    async fn skip_data(&mut self, size: usize) -> Result<(), ParseError> {
        const SKIP_CHUNK: usize = 64 * 1024;

        let buffered = self.peek_buffer.len().min(size);
        self.peek_buffer.drain(..buffered);
        self.current_offset += buffered;

        let mut remaining = size - buffered;
        let mut chunk = vec![0u8; SKIP_CHUNK.min(remaining)];
        while remaining > 0 {
            let step = SKIP_CHUNK.min(remaining);
            self.reader
                .read_exact(&mut chunk[..step])
                .await
                .map_err(|e| ParseError {
                    kind: if e.kind() == std::io::ErrorKind::UnexpectedEof {
                        ParseErrorKind::Eof
                    } else {
                        ParseErrorKind::Io
                    },
                    location: Some((self.current_offset, step)),
                    source: Some(Box::new(e)),
                })?;
            self.current_offset += step;
            remaining -= step;
        }
        Ok(())
    }

    async fn parse_next_header(&mut self) -> Result<ParsedHeader, ParseError> {
        let box_offset = self.current_offset as u64;

        let mut header = [0u8; 8];
        self.read_exact(&mut header).await?;

        let size = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as u64;
        let box_type: [u8; 4] = header[4..8].try_into().unwrap();

        // Handle extended size (64-bit) if needed
        let (header_size, data_size) = if size == 1 {
            let mut extended_size = [0u8; 8];
            self.read_exact(&mut extended_size).await?;
            let full_size = u64::from_be_bytes(extended_size);
            if full_size < 16 {
                return Err(ParseError {
                    kind: ParseErrorKind::InvalidSize,
                    location: Some((box_offset as usize, 16)),
                    source: None,
                });
            }
            (16u64, full_size - 16)
        } else if size == 0 {
            // Size extends to end of file - not supported in this context
            return Err(ParseError {
                kind: ParseErrorKind::InvalidSize,
                location: Some((box_offset as usize, 8)),
                source: None,
            });
        } else {
            if size < 8 {
                return Err(ParseError {
                    kind: ParseErrorKind::InvalidSize,
                    location: Some((box_offset as usize, 8)),
                    source: None,
                });
            }
            (8u64, size - 8)
        };

        let box_type = FourCC(box_type);
        let total_size = header_size + data_size;

        Ok(ParsedHeader {
            box_type,
            size: total_size,
            offset: box_offset,
            content_size: data_size as usize,
        })
    }

    async fn parse_box_data(&mut self, parsed: ParsedHeader) -> Result<BoxData, ParseError> {
        let content_data = self.read_data(parsed.content_size).await?;
        let cursor = Cursor::new(content_data);
        let box_type = parsed.box_type;
        let box_data = match box_type.deref() {
            FTYP | STYP => FileTypeBox::parse(box_type, cursor)
                .await
                .map(BoxData::from),
            MVHD => MovieHeaderBox::parse(box_type, cursor)
                .await
                .map(BoxData::from),
            TKHD => TrackHeaderBox::parse(box_type, cursor)
                .await
                .map(BoxData::from),
            MDHD => MediaHeaderBox::parse(box_type, cursor)
                .await
                .map(BoxData::from),
            HDLR => HandlerBox::parse(box_type, cursor).await.map(BoxData::from),
            SMHD => SoundMediaHeaderBox::parse(box_type, cursor)
                .await
                .map(BoxData::from),
            VMHD => VideoMediaHeaderBox::parse(box_type, cursor)
                .await
                .map(BoxData::from),
            DREF => DataReferenceBox::parse(box_type, cursor)
                .await
                .map(BoxData::from),
            STSD => SampleDescriptionBox::parse(box_type, cursor)
                .await
                .map(BoxData::from),
            STTS => TimeToSampleBox::parse(box_type, cursor)
                .await
                .map(BoxData::from),
            CTTS => CompositionOffsetBox::parse(box_type, cursor)
                .await
                .map(BoxData::from),
            STSS => SyncSampleBox::parse(box_type, cursor)
                .await
                .map(BoxData::from),
            STSZ => SampleSizeBox::parse(box_type, cursor)
                .await
                .map(BoxData::from),
            STSC => SampleToChunkBox::parse(box_type, cursor)
                .await
                .map(BoxData::from),
            STCO | CO64 => ChunkOffsetBox::parse(box_type, cursor)
                .await
                .map(BoxData::from),
            SGPD => SampleGroupDescriptionBox::parse(box_type, cursor)
                .await
                .map(BoxData::from),
            SBGP => SampleToGroupBox::parse(box_type, cursor)
                .await
                .map(BoxData::from),
            TREX => TrackExtendsBox::parse(box_type, cursor)
                .await
                .map(BoxData::from),
            MFHD => MovieFragmentHeaderBox::parse(box_type, cursor)
                .await
                .map(BoxData::from),
            TFHD => TrackFragmentHeaderBox::parse(box_type, cursor)
                .await
                .map(BoxData::from),
            TFDT => TrackFragmentDecodeTimeBox::parse(box_type, cursor)
                .await
                .map(BoxData::from),
            TRUN => TrackRunBox::parse(box_type, cursor)
                .await
                .map(BoxData::from),
            FREE | SKIP => FreeBox::parse(box_type, cursor).await.map(BoxData::from),
            _ => Ok(RawData(cursor.into_inner()).into()),
        }
        .map_err(|e| ParseError {
            kind: ParseErrorKind::BoxParsing,
            location: Some((parsed.offset as usize, parsed.size as usize)),
            source: Some(format!("{}: {e}", box_type).into()),
        })?;

        Ok(box_data)
    }

    fn parse_box_stream<'a>(
        &'a mut self,
        length_limit: Option<usize>,
    ) -> impl Stream<Item = Result<ParseEvent, ParseError>> + 'a {
        async_stream::stream! {
            let start_offset = self.current_offset;

            loop {
                // respect container bounds when recursing
                if length_limit.is_some_and(|limit| self.current_offset - start_offset >= limit) {
                   break;
                }

                // a clean EOF at a box boundary ends the stream
                let mut probe = [0u8; 1];
                match self.peek_exact(&mut probe).await {
                    Ok(()) => {}
                    Err(err) => {
                        if length_limit.is_none() && matches!(err.kind, ParseErrorKind::Eof) {
                            break;
                        }
                        yield Err(err);
                        return;
                    }
                }

                let parsed = match self.parse_next_header().await {
                    Ok(parsed) => parsed,
                    Err(err) => {
                        yield Err(err);
                        return;
                    }
                };

                if parsed.box_type == MDAT {
                    // media payloads can be arbitrarily large; report and skip
                    let offset = parsed.offset;
                    let size = parsed.size;
                    if let Err(err) = self.skip_data(parsed.content_size).await {
                        yield Err(err);
                        return;
                    }
                    yield Ok(ParseEvent::MediaData { offset, size });
                } else if is_container_box(parsed.box_type) {
                    let container = Mp4Box {
                        header: BoxHeader {
                            box_type: parsed.box_type,
                            size: parsed.size,
                            offset: parsed.offset,
                        },
                        children: Vec::new(),
                        data: None,
                    };
                    yield Ok(ParseEvent::EnterContainer(container));

                    let size = parsed.content_size;

                    // Recursively parse children and emit their events
                    let mut child_stream = Box::pin(self.parse_box_stream(Some(size)));

                    while let Some(child_event) = child_stream.as_mut().next().await {
                        match child_event {
                            Ok(event) => yield Ok(event),
                            Err(e) => {
                                yield Err(e);
                                return;
                            }
                        }
                    }

                    yield Ok(ParseEvent::ExitContainer);
                } else {
                    let box_type = parsed.box_type;
                    let offset = parsed.offset;
                    let size = parsed.size;
                    let box_data = match self.parse_box_data(parsed).await {
                        Ok(box_data) => box_data,
                        Err(err) => {
                            yield Err(err);
                            return;
                        }
                    };
                    let leaf = Mp4Box {
                        header: BoxHeader {
                            box_type,
                            size,
                            offset,
                        },
                        children: Vec::new(),
                        data: Some(box_data),
                    };
                    yield Ok(ParseEvent::Leaf(leaf));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use futures_util::pin_mut;
    use futures_util::stream::StreamExt;
    use std::ops::Deref;

    use super::*;

    #[tokio::test]
    async fn test_32bit_size_parsing() {
        // A simple FTYP box with 32-bit size
        let mut data = Vec::new();
        data.extend_from_slice(&20u32.to_be_bytes());
        data.extend_from_slice(b"ftyp");
        data.extend_from_slice(b"mp41"); // major brand
        data.extend_from_slice(&0u32.to_be_bytes()); // minor version
        data.extend_from_slice(b"mp41"); // compatible brand

        let mut parser = Parser::new(data.as_slice());
        let boxes = parser.read_boxes().await.unwrap();

        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0].header.box_type.deref(), b"ftyp");
        assert_eq!(boxes[0].header.size, 20);
        assert_eq!(boxes[0].header.offset, 0);
        assert!(matches!(boxes[0].data, Some(BoxData::FileType(_))));
    }

    #[tokio::test]
    async fn test_64bit_extended_size_parsing() {
        // A box with extended 64-bit size
        let mut data = Vec::new();
        data.extend_from_slice(&1u32.to_be_bytes()); // size=1 marks extended size
        data.extend_from_slice(b"tst0");
        data.extend_from_slice(&24u64.to_be_bytes()); // extended size
        data.extend_from_slice(b"hello!ab"); // 8 bytes of content

        let mut parser = Parser::new(data.as_slice());
        let boxes = parser.read_boxes().await.unwrap();

        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0].header.box_type.deref(), b"tst0");
        assert_eq!(boxes[0].header.size, 24);
        assert!(matches!(boxes[0].data, Some(BoxData::Raw(_))));
    }

    #[tokio::test]
    async fn test_container_box_parsing() {
        // A moov container with one unknown child
        let mut data = Vec::new();
        data.extend_from_slice(&24u32.to_be_bytes());
        data.extend_from_slice(b"moov");
        data.extend_from_slice(&16u32.to_be_bytes());
        data.extend_from_slice(b"chld");
        data.extend_from_slice(b"content!");

        let mut parser = Parser::new(data.as_slice());
        let stream = parser.stream_boxes();
        pin_mut!(stream);

        let mut events = Vec::new();
        while let Some(result) = stream.next().await {
            events.push(result.unwrap());
        }

        assert_eq!(events.len(), 3);
        assert!(matches!(
            &events[0],
            ParseEvent::EnterContainer(b) if b.header.box_type == b"moov"
        ));
        assert!(matches!(
            &events[1],
            ParseEvent::Leaf(b) if b.header.box_type == b"chld"
        ));
        assert!(matches!(&events[2], ParseEvent::ExitContainer));
    }

    #[tokio::test]
    async fn test_mdat_skipping() {
        // ftyp, then an mdat payload, then a trailing free box
        let mut data = Vec::new();
        data.extend_from_slice(&16u32.to_be_bytes());
        data.extend_from_slice(b"ftyp");
        data.extend_from_slice(b"mp41");
        data.extend_from_slice(&0u32.to_be_bytes());

        data.extend_from_slice(&(8 + 100_000u32).to_be_bytes());
        data.extend_from_slice(b"mdat");
        data.extend_from_slice(&vec![0xabu8; 100_000]);

        data.extend_from_slice(&12u32.to_be_bytes());
        data.extend_from_slice(b"free");
        data.extend_from_slice(&[0u8; 4]);

        let mut parser = Parser::new(data.as_slice());
        let boxes = parser.read_boxes().await.unwrap();

        assert_eq!(boxes.len(), 3);
        assert_eq!(boxes[1].header.box_type.deref(), b"mdat");
        assert_eq!(boxes[1].header.offset, 16);
        assert_eq!(boxes[1].header.size, 8 + 100_000);
        assert_eq!(boxes[2].header.box_type.deref(), b"free");
    }

    #[tokio::test]
    async fn test_invalid_size_error() {
        // A box claiming a size smaller than its own header
        let mut data = Vec::new();
        data.extend_from_slice(&4u32.to_be_bytes());
        data.extend_from_slice(b"tst1");

        let mut parser = Parser::new(data.as_slice());
        let stream = parser.stream_boxes();
        pin_mut!(stream);

        let result = stream.next().await.expect("expected an error result");
        let error = result.expect_err("expected an error for invalid box size");
        assert!(matches!(error.kind, ParseErrorKind::InvalidSize));
    }

    #[tokio::test]
    async fn test_truncated_input_is_clean_eof_at_boundary() {
        // Zero-length input produces no events and no error
        let data: Vec<u8> = Vec::new();
        let mut parser = Parser::new(data.as_slice());
        let boxes = parser.read_boxes().await.unwrap();
        assert!(boxes.is_empty());
    }

    #[tokio::test]
    async fn test_truncated_box_body_errors() {
        // A header promising more content than the input holds
        let mut data = Vec::new();
        data.extend_from_slice(&32u32.to_be_bytes());
        data.extend_from_slice(b"tst2");
        data.extend_from_slice(b"shrt");

        let mut parser = Parser::new(data.as_slice());
        let result = parser.read_boxes().await;
        assert!(result.is_err());
    }
}
