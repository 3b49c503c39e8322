// Token scrubbing at the log-writer seam
//
// Installed as the fmt layer's writer, so every log line from every module
// passes through the mask - not just gate-internal logging.

use std::io::{self, Write};

use tracing_subscriber::fmt::MakeWriter;

use super::token::scrub_secrets;

/// MakeWriter that masks token-shaped substrings before emitting.
#[derive(Clone, Default)]
pub struct ScrubMakeWriter;

impl<'a> MakeWriter<'a> for ScrubMakeWriter {
    type Writer = ScrubWriter<io::Stdout>;

    fn make_writer(&'a self) -> Self::Writer {
        ScrubWriter::new(io::stdout())
    }
}

pub struct ScrubWriter<W> {
    inner: W,
}

impl<W: Write> ScrubWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }
}

impl<W: Write> Write for ScrubWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match std::str::from_utf8(buf) {
            Ok(text) => {
                let scrubbed = scrub_secrets(text);
                self.inner.write_all(scrubbed.as_bytes())?;
                Ok(buf.len())
            }
            // A non-UTF-8 chunk cannot carry a token as text
            Err(_) => self.inner.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::token::generate_token;

    #[test]
    fn test_writer_masks_tokens() {
        let token = generate_token();
        let mut sink = Vec::new();
        {
            let mut writer = ScrubWriter::new(&mut sink);
            writeln!(writer, "rejected token {token}").unwrap();
        }

        let written = String::from_utf8(sink).unwrap();
        assert!(!written.contains(&token));
        assert!(written.contains("lt_****MASKED****"));
    }

    #[test]
    fn test_writer_passes_plain_lines_through() {
        let mut sink = Vec::new();
        {
            let mut writer = ScrubWriter::new(&mut sink);
            writeln!(writer, "engine started on 127.0.0.1:47200").unwrap();
        }

        let written = String::from_utf8(sink).unwrap();
        assert_eq!(written, "engine started on 127.0.0.1:47200\n");
    }
}
