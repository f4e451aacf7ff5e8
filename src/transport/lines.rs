// ABOUTME: Splits a byte stream into lines for LineSink delivery.
// ABOUTME: Shared by the SSH channel reader and local processes; decodes lossily.

use super::sink::{LineSink, OutputStream};

/// Longest line delivered in one piece; longer runs are split.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Buffers partial lines between chunks of one stream.
#[derive(Debug)]
pub struct LineSplitter {
    stream: OutputStream,
    pending: Vec<u8>,
}

impl LineSplitter {
    pub fn new(stream: OutputStream) -> Self {
        Self {
            stream,
            pending: Vec::new(),
        }
    }

    /// Feed a chunk, emitting every complete line it finishes.
    pub fn push(&mut self, chunk: &[u8], sink: &mut dyn LineSink) {
        for &byte in chunk {
            if byte == b'\n' {
                self.emit(sink);
            } else {
                self.pending.push(byte);
                if self.pending.len() >= MAX_LINE_BYTES {
                    self.emit(sink);
                }
            }
        }
    }

    /// Emit any trailing partial line at end of stream.
    pub fn finish(&mut self, sink: &mut dyn LineSink) {
        if !self.pending.is_empty() {
            self.emit(sink);
        }
    }

    fn emit(&mut self, sink: &mut dyn LineSink) {
        if self.pending.last() == Some(&b'\r') {
            self.pending.pop();
        }
        let line = String::from_utf8_lossy(&self.pending);
        sink.line(self.stream, &line);
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Collect;

    #[test]
    fn lines_split_across_chunks_are_joined() {
        let mut collect = Collect::default();
        let mut splitter = LineSplitter::new(OutputStream::Stdout);
        splitter.push(b"hel", &mut collect);
        splitter.push(b"lo\nwor", &mut collect);
        assert_eq!(collect.stdout, "hello\n");
        splitter.push(b"ld\r\n", &mut collect);
        assert_eq!(collect.stdout, "hello\nworld\n");
    }

    #[test]
    fn trailing_partial_line_is_flushed() {
        let mut collect = Collect::default();
        let mut splitter = LineSplitter::new(OutputStream::Stderr);
        splitter.push(b"no newline", &mut collect);
        assert!(collect.stderr.is_empty());
        splitter.finish(&mut collect);
        assert_eq!(collect.stderr, "no newline\n");
    }

    #[test]
    fn overlong_lines_are_split() {
        let mut collect = Collect::default();
        let mut splitter = LineSplitter::new(OutputStream::Stdout);
        let long = vec![b'x'; MAX_LINE_BYTES + 10];
        splitter.push(&long, &mut collect);
        splitter.finish(&mut collect);
        assert_eq!(collect.stdout.lines().count(), 2);
    }
}
