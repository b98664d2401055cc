mod debug;
mod fourcc;
pub(crate) mod parser;
pub(crate) mod serializer;

pub use debug::*;
pub use fourcc::*;

use futures_io::AsyncRead;
use futures_util::AsyncReadExt;

use crate::ParseError;

/// Reads the remainder of a box body into memory for declarative parsing.
pub(crate) async fn read_to_end<R: AsyncRead + Unpin>(mut reader: R) -> Result<Vec<u8>, ParseError> {
    let mut data = Vec::new();
    reader
        .read_to_end(&mut data)
        .await
        .map_err(ParseError::new_io)?;
    Ok(data)
}
