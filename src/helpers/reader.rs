use std::io::Cursor;
use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;
use std::sync::Arc;

/// Seekable reader over an uploaded byte buffer.
///
/// The buffer is shared, so engines can reopen the same upload without
/// copying it.
#[derive(Clone, Debug)]
pub(crate) struct UploadReader {
    cursor: Cursor<Arc<[u8]>>,
}

impl UploadReader {
    pub(crate) fn new(bytes: Arc<[u8]>) -> UploadReader {
        UploadReader {
            cursor: Cursor::new(bytes),
        }
    }
}

impl Read for UploadReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.cursor.read(buf)
    }
}

impl Seek for UploadReader {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.cursor.seek(pos)
    }
}
