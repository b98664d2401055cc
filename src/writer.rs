use derive_more::Display;
use futures_io::AsyncWrite;
use futures_util::AsyncWriteExt;
use thiserror::Error;

use crate::{boxes::FourCC, BoxData, Mp4Box};

#[derive(Debug, Error)]
#[error("{kind}{}", self.source.as_ref().map(|e| format!(" ({e})")).unwrap_or_default())]
pub struct WriteError {
    /// The kind of error that occurred during writing.
    kind: WriteErrorKind,
    /// The source error that caused this error.
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl WriteError {
    pub(crate) fn new_io(e: std::io::Error) -> Self {
        Self {
            kind: WriteErrorKind::Io,
            source: Some(Box::new(e)),
        }
    }

    pub fn kind(&self) -> &WriteErrorKind {
        &self.kind
    }
}

#[derive(Debug, Display)]
pub enum WriteErrorKind {
    #[display("I/O error")]
    Io,
}

pub trait SerializeBox: Sized {
    /// [FourCC] representing the box type
    fn box_type(&self) -> FourCC;

    /// Serialize the box body
    fn into_body_bytes(self) -> Vec<u8>;

    /// Serialize the box into bytes, header included
    fn into_bytes(self) -> Vec<u8> {
        let box_type = self.box_type();
        let mut body = self.into_body_bytes();
        let mut header = serialize_box_header(box_type, body.len() as u64);
        header.append(&mut body);
        header
    }
}

pub struct BoxWriter<W> {
    writer: W,
    offset: usize,
}

impl<W: AsyncWrite + Unpin> BoxWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, offset: 0 }
    }

    pub fn current_offset(&self) -> usize {
        self.offset
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    pub async fn flush(&mut self) -> Result<(), WriteError> {
        self.writer.flush().await.map_err(WriteError::new_io)
    }

    pub async fn write_box_header(
        &mut self,
        box_type: FourCC,
        data_size: usize,
    ) -> Result<(), WriteError> {
        let header_bytes = serialize_box_header(box_type, data_size as u64);
        self.writer
            .write_all(&header_bytes)
            .await
            .map_err(WriteError::new_io)?;
        self.offset += header_bytes.len();
        Ok(())
    }

    pub async fn write_leaf_box(
        &mut self,
        box_type: FourCC,
        data: BoxData,
    ) -> Result<(), WriteError> {
        let data_bytes: Vec<u8> = data.into_body_bytes();
        self.write_box_header(box_type, data_bytes.len()).await?;
        self.writer
            .write_all(&data_bytes)
            .await
            .map_err(WriteError::new_io)?;
        self.offset += data_bytes.len();
        Ok(())
    }

    /// Serializes and writes an entire box tree.
    pub async fn write_box(&mut self, mp4_box: Mp4Box) -> Result<(), WriteError> {
        let bytes = mp4_box.into_bytes();

        self.writer
            .write_all(&bytes)
            .await
            .map_err(WriteError::new_io)?;

        self.offset += bytes.len();

        Ok(())
    }

    pub async fn write_raw(&mut self, data: &[u8]) -> Result<(), WriteError> {
        self.writer
            .write_all(data)
            .await
            .map_err(WriteError::new_io)?;

        self.offset += data.len();
        Ok(())
    }
}

pub(crate) fn serialize_box_header(box_type: FourCC, data_size: u64) -> Vec<u8> {
    let mut result = Vec::new();

    let total_size_with_32bit_header = 8u64 + data_size;
    let use_64bit = total_size_with_32bit_header > u32::MAX as u64;

    if use_64bit {
        // size=1 marks the extended format: type follows, then a 64-bit size
        let total_size = 16u64 + data_size;

        result.extend_from_slice(&1u32.to_be_bytes());
        result.extend_from_slice(&box_type.0);
        result.extend_from_slice(&total_size.to_be_bytes());
    } else {
        let total_size = total_size_with_32bit_header as u32;

        result.extend_from_slice(&total_size.to_be_bytes());
        result.extend_from_slice(&box_type.0);
    }

    result
}
