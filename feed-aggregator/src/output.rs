use crate::types::{EntrySink, NewEntry};
use std::io::{self, Write};

/// Writes each entry as one JSON object per line.
pub struct JsonLinesSink<W: Write> {
    writer: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> EntrySink for JsonLinesSink<W> {
    fn deliver(&mut self, entries: &[NewEntry]) -> io::Result<()> {
        for entry in entries {
            serde_json::to_writer(&mut self.writer, entry)?;
            self.writer.write_all(b"\n")?;
        }
        self.writer.flush()
    }
}
