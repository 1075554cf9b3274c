use std::io::{self, Write};

use prompter_core::{LogSurface, SurfaceError, UiSurface};

/// Log view that writes each line to a terminal stream.
pub struct TerminalLogSurface<W: Write> {
    out: W,
}

impl TerminalLogSurface<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> TerminalLogSurface<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> UiSurface for TerminalLogSurface<W> {
    fn is_mounted(&self) -> bool {
        true
    }
}

impl<W: Write> LogSurface for TerminalLogSurface<W> {
    fn append_line(&mut self, line: &str) -> Result<(), SurfaceError> {
        writeln!(self.out, "{line}").map_err(|error| SurfaceError::rejected(error.to_string()))
    }

    fn scroll_to_end(&mut self) {
        // Flush so the newest line is visible.
        if let Err(error) = self.out.flush() {
            tracing::debug!(
                target: "prompter::terminal",
                %error,
                "log surface flush failed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::{self, Write};

    use prompter_core::{LogSurface, SurfaceError};

    use super::TerminalLogSurface;

    struct ClosedPipe;

    impl Write for ClosedPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn lines_are_written_one_per_row() {
        let mut surface = TerminalLogSurface::new(Vec::new());
        surface.append_line("[2024-03-09 14:05:07] one").expect("write");
        surface.append_line("[2024-03-09 14:05:08] two").expect("write");
        surface.scroll_to_end();

        let written = String::from_utf8(surface.into_inner()).expect("utf8");
        assert_eq!(
            written,
            "[2024-03-09 14:05:07] one\n[2024-03-09 14:05:08] two\n"
        );
    }

    #[derive(Default)]
    struct StuckTerminal {
        written: Vec<u8>,
        flush_attempts: usize,
    }

    impl Write for StuckTerminal {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            self.flush_attempts += 1;
            Err(io::Error::new(io::ErrorKind::WouldBlock, "terminal busy"))
        }
    }

    #[test]
    fn flush_errors_leave_the_surface_usable() {
        let mut surface = TerminalLogSurface::new(StuckTerminal::default());
        surface.append_line("first").expect("write");
        surface.scroll_to_end();
        surface.append_line("second").expect("write");
        surface.scroll_to_end();

        let terminal = surface.into_inner();
        assert_eq!(terminal.flush_attempts, 2);
        assert_eq!(terminal.written, b"first\nsecond\n");
    }

    #[test]
    fn write_errors_surface_as_rejections() {
        let mut surface = TerminalLogSurface::new(ClosedPipe);
        let error = surface.append_line("lost").expect_err("closed pipe");
        assert!(matches!(error, SurfaceError::Rejected { .. }));
    }
}
