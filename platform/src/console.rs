// Line based terminal console

use log::debug;
use m65fdisk_core::{Console, FdiskError};
use std::io::{BufRead, Write};

/// Reads lines from `R`, writes lines to `W`. Keys are read a line at a
/// time; an empty line is the Enter key.
pub struct TerminalConsole<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> TerminalConsole<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    pub fn into_output(self) -> W {
        self.output
    }
}

impl<R: BufRead, W: Write> Console for TerminalConsole<R, W> {
    fn write_line(&mut self, line: &str) {
        if let Err(err) = writeln!(self.output, "{}", line).and_then(|_| self.output.flush()) {
            debug!("Console write failed: {}", err);
        }
    }

    fn read_line(&mut self) -> Result<Option<String>, FdiskError> {
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }

    fn read_key(&mut self) -> Result<Option<char>, FdiskError> {
        Ok(self.read_line()?.map(|line| line.chars().next().unwrap_or('\n')))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_lines_and_keys() {
        let input = Cursor::new(b"DELETE EVERYTHING\r\n1\n\nrest".to_vec());
        let mut console = TerminalConsole::new(input, Vec::new());

        console.write_line("Type DELETE EVERYTHING");
        assert_eq!(console.read_line().unwrap().as_deref(), Some("DELETE EVERYTHING"));
        assert_eq!(console.read_key().unwrap(), Some('1'));
        assert_eq!(console.read_key().unwrap(), Some('\n'));
        assert_eq!(console.read_line().unwrap().as_deref(), Some("rest"));
        assert_eq!(console.read_line().unwrap(), None);
        assert_eq!(console.read_key().unwrap(), None);

        assert_eq!(console.into_output(), b"Type DELETE EVERYTHING\n".to_vec());
    }

    struct ClosedTerminal;

    impl Write for ClosedTerminal {
        fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
            Err(std::io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Err(std::io::ErrorKind::BrokenPipe.into())
        }
    }

    #[test]
    fn test_write_to_closed_terminal_is_ignored() {
        let mut console = TerminalConsole::new(Cursor::new(b"FIX MBR\n".to_vec()), ClosedTerminal);

        console.write_line("Type DELETE EVERYTHING");
        assert_eq!(console.read_line().unwrap().as_deref(), Some("FIX MBR"));
    }
}
