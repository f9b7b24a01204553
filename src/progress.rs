use crossterm::{
    cursor, queue,
    style::{Print, PrintStyledContent, Stylize},
    terminal::{Clear, ClearType},
};
use std::io::{self, Write};
use tracing::debug;

/// Observer of engine progress. Purely cosmetic: implementations must not
/// fail the run, so none of these return errors.
pub trait ProgressReporter {
    fn start(&mut self, total: usize);
    fn set_status(&mut self, label: &str);
    fn advance(&mut self);
    fn finish(&mut self);
}

/// Reports nothing.
#[derive(Debug, Default)]
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn start(&mut self, _total: usize) {}
    fn set_status(&mut self, _label: &str) {}
    fn advance(&mut self) {}
    fn finish(&mut self) {}
}

const STATUS_WIDTH: usize = 80;
const BAR_WIDTH: usize = 28;

/// Two-line terminal progress: a highlighted status line above a
/// `current/max [bar] percent` line, redrawn in place.
pub struct TerminalProgress<W: Write> {
    out: W,
    total: usize,
    current: usize,
    status: String,
    drawn: bool,
}

impl TerminalProgress<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> TerminalProgress<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            total: 0,
            current: 0,
            status: String::new(),
            drawn: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn percent(&self) -> usize {
        if self.total == 0 {
            100
        } else {
            self.current * 100 / self.total
        }
    }

    fn draw(&mut self) -> io::Result<()> {
        if self.drawn {
            queue!(self.out, cursor::MoveUp(1), cursor::MoveToColumn(0))?;
        }

        let status: String = self.status.chars().take(STATUS_WIDTH).collect();
        queue!(
            self.out,
            Clear(ClearType::CurrentLine),
            PrintStyledContent(format!(" {:<width$}", status, width = STATUS_WIDTH).white().on_magenta()),
            Print("\n"),
            Clear(ClearType::CurrentLine),
            Print(format!("{}/{} [", self.current, self.total)),
        )?;

        let filled = if self.total == 0 {
            BAR_WIDTH
        } else {
            self.current * BAR_WIDTH / self.total
        };
        for i in 0..BAR_WIDTH {
            if i < filled {
                queue!(self.out, PrintStyledContent("⚬".green()))?;
            } else if i == filled {
                queue!(self.out, PrintStyledContent("➤".green()))?;
            } else {
                queue!(self.out, PrintStyledContent("⚬".red()))?;
            }
        }
        let percent = self.percent();
        queue!(self.out, Print(format!("] {:>3}%", percent)))?;

        self.drawn = true;
        self.out.flush()
    }

    fn redraw(&mut self) {
        if let Err(e) = self.draw() {
            debug!(error = %e, "progress output failed");
        }
    }
}

impl<W: Write> ProgressReporter for TerminalProgress<W> {
    fn start(&mut self, total: usize) {
        self.total = total;
        self.current = 0;
        self.redraw();
    }

    fn set_status(&mut self, label: &str) {
        self.status = label.to_string();
        self.redraw();
    }

    fn advance(&mut self) {
        self.current = (self.current + 1).min(self.total);
        self.redraw();
    }

    fn finish(&mut self) {
        self.current = self.total;
        self.redraw();
        let done = queue!(self.out, Print("\n🏁\n"));
        if let Err(e) = done.and_then(|()| self.out.flush()) {
            debug!(error = %e, "progress output failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }
        fn flush(&mut self) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }
    }

    #[test]
    fn test_renders_counts_and_status() {
        let mut progress = TerminalProgress::new(Vec::new());
        progress.start(4);
        progress.set_status("Changing alice internal username as u-1");
        progress.advance();
        progress.advance();

        let text = String::from_utf8(progress.into_inner()).unwrap();
        assert!(text.contains("Changing alice internal username as u-1"));
        assert!(text.contains("2/4 ["));
        assert!(text.contains(" 50%"));
    }

    #[test]
    fn test_advance_never_overshoots() {
        let mut progress = TerminalProgress::new(Vec::new());
        progress.start(1);
        progress.advance();
        progress.advance();
        progress.finish();
        let text = String::from_utf8(progress.into_inner()).unwrap();
        assert!(text.contains("1/1 ["));
        assert!(!text.contains("2/1"));
        assert!(text.contains("100%"));
    }

    #[test]
    fn test_write_errors_are_swallowed() {
        let mut progress = TerminalProgress::new(BrokenPipe);
        progress.start(2);
        progress.set_status("x");
        progress.advance();
        progress.finish();
    }
}
