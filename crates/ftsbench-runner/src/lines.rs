//! Line splitting shared by both pipelines.

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use ftsbench_core::Result;

/// One line of a source, stripped of its `\n` / `\r\n` terminator.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Line {
    Text(String),
    /// Bytes that are not UTF-8; the caller skips them like any malformed line.
    NotUtf8,
}

/// Reads lines as raw bytes so a bad encoding costs one line, not the run.
pub(crate) struct LineReader<R> {
    source: R,
    buf: Vec<u8>,
    line_no: usize,
}

impl<R: AsyncBufRead + Unpin> LineReader<R> {
    pub(crate) fn new(source: R) -> Self {
        Self { source, buf: Vec::new(), line_no: 0 }
    }

    /// 1-based number of the line last returned.
    pub(crate) fn line_no(&self) -> usize {
        self.line_no
    }

    /// `None` at end of input. I/O errors still abort.
    pub(crate) async fn next_line(&mut self) -> Result<Option<Line>> {
        self.buf.clear();
        if self.source.read_until(b'\n', &mut self.buf).await? == 0 {
            return Ok(None);
        }
        self.line_no += 1;
        if self.buf.last() == Some(&b'\n') {
            self.buf.pop();
        }
        if self.buf.last() == Some(&b'\r') {
            self.buf.pop();
        }
        Ok(Some(match String::from_utf8(std::mem::take(&mut self.buf)) {
            Ok(text) => Line::Text(text),
            Err(_) => Line::NotUtf8,
        }))
    }
}
