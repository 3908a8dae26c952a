use crate::FdiskError;

/// Operator-facing line console.
pub trait Console {
    fn write_line(&mut self, line: &str);

    /// Reads one line without its terminator. `None` means input ended.
    fn read_line(&mut self) -> Result<Option<String>, FdiskError>;

    /// Waits for a single key press. `None` means input ended.
    fn read_key(&mut self) -> Result<Option<char>, FdiskError>;
}

impl<C: Console + ?Sized> Console for &mut C {
    fn write_line(&mut self, line: &str) {
        (**self).write_line(line)
    }

    fn read_line(&mut self) -> Result<Option<String>, FdiskError> {
        (**self).read_line()
    }

    fn read_key(&mut self) -> Result<Option<char>, FdiskError> {
        (**self).read_key()
    }
}
