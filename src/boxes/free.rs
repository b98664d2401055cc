use futures_io::AsyncRead;
use std::ops::Deref;

use crate::{
    boxes::{util::read_to_end, FourCC},
    parser::ParseBox,
    writer::SerializeBox,
    ParseError,
};

pub const FREE: &[u8; 4] = b"free";
pub const SKIP: &[u8; 4] = b"skip";

/// Free Space Box (free / skip) - ISO/IEC 14496-12
/// Contents are irrelevant and may be ignored or overwritten.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FreeBox {
    pub size: usize,
}

impl FreeBox {
    pub fn new(size: usize) -> Self {
        Self { size }
    }
}

impl ParseBox for FreeBox {
    async fn parse<R: AsyncRead + Unpin + Send>(
        box_type: FourCC,
        reader: R,
    ) -> Result<Self, ParseError> {
        if !matches!(box_type.deref(), FREE | SKIP) {
            return Err(ParseError::new_unexpected_box(box_type, FREE));
        }
        let data = read_to_end(reader).await?;
        Ok(FreeBox { size: data.len() })
    }
}

impl SerializeBox for FreeBox {
    fn box_type(&self) -> FourCC {
        FourCC(*FREE)
    }

    fn into_body_bytes(self) -> Vec<u8> {
        vec![0u8; self.size]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boxes::test_utils::roundtrip_body;

    #[test]
    fn test_free_roundtrip() {
        let free = FreeBox::new(32);
        assert_eq!(roundtrip_body(free.clone()), free);
    }
}
