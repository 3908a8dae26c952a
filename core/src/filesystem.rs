use crate::{FdiskError, Storage};
use log::warn;
use std::fmt;

/// Space-padded "EIGHT   THR" short name as stored in a FAT directory entry.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct DosName([u8; 11]);

impl DosName {
    pub const fn from_raw(raw: [u8; 11]) -> Self {
        DosName(raw)
    }

    /// Strict conversion used for host files: requires `name.ext`, at most
    /// 8 + 3 characters, and upper-cases ASCII letters.
    pub fn parse_strict(filename: &str) -> Result<Self, FdiskError> {
        let (name, extension) = match filename.split_once('.') {
            Some((name, extension)) if !name.is_empty() && !extension.is_empty() => (name, extension),
            _ => {
                return Err(FdiskError::InvalidInput(format!(
                    "Could not parse name and extension from file name {:?}",
                    filename
                )))
            }
        };

        if name.len() > 8 || extension.len() > 3 {
            return Err(FdiskError::NameTooLong(format!("'{}'.'{}'", name, extension)));
        }

        if !filename.is_ascii() {
            return Err(FdiskError::InvalidInput(format!(
                "File name {:?} is not plain ASCII",
                filename
            )));
        }

        let mut raw = [b' '; 11];
        for (slot, byte) in raw.iter_mut().zip(name.bytes()) {
            *slot = byte.to_ascii_uppercase();
        }
        for (slot, byte) in raw[8..].iter_mut().zip(extension.bytes()) {
            *slot = byte.to_ascii_uppercase();
        }

        Ok(DosName(raw))
    }

    /// Lossy conversion used for names embedded in firmware slots. Characters
    /// before the first '.' fill the 8 name slots, characters after it fill
    /// the 3 extension slots, and anything beyond is dropped. Case is kept.
    pub fn from_lossy(name: &[u8]) -> Self {
        let (base, extension) = match name.iter().position(|&b| b == b'.') {
            Some(dot) => (&name[..dot], &name[dot + 1..]),
            None => (name, &name[name.len()..]),
        };

        if base.len() > 8 || extension.len() > 3 {
            warn!(
                "Truncating embedded file name {:?} to 8.3",
                String::from_utf8_lossy(name)
            );
        }

        let mut raw = [b' '; 11];
        for (slot, &byte) in raw.iter_mut().zip(base.iter().take(8)) {
            *slot = byte;
        }
        for (slot, &byte) in raw[8..].iter_mut().zip(extension.iter().take(3)) {
            *slot = byte;
        }

        DosName(raw)
    }

    pub fn as_bytes(&self) -> &[u8; 11] {
        &self.0
    }
}

impl fmt::Display for DosName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let base = String::from_utf8_lossy(&self.0[..8]);
        let extension = String::from_utf8_lossy(&self.0[8..]);
        let base = base.trim_end();
        let extension = extension.trim_end();
        if extension.is_empty() {
            write!(f, "{}", base)
        } else {
            write!(f, "{}.{}", base, extension)
        }
    }
}

impl fmt::Debug for DosName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DosName({:?})", String::from_utf8_lossy(&self.0))
    }
}

/// Places a file as one unbroken run of clusters in a freshly created FAT32
/// volume and returns the first data sector, or `None` when the directory is
/// full or no contiguous run is free.
pub trait FileAllocator {
    fn create_contiguous_file(
        &mut self,
        storage: &mut dyn Storage,
        name: &DosName,
        length: u32,
        root_dir_lba: u32,
        fat1_lba: u32,
        fat2_lba: u32,
    ) -> Result<Option<u32>, FdiskError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_strict_pads_and_uppercases() {
        let name = DosName::parse_strict("readme.txt").unwrap();
        assert_eq!(name.as_bytes(), b"README  TXT");
        assert_eq!(name.to_string(), "README.TXT");
    }

    #[test]
    fn test_parse_strict_rejects_long_parts() {
        assert!(matches!(
            DosName::parse_strict("longfilename.txt"),
            Err(FdiskError::NameTooLong(_))
        ));
        assert!(matches!(
            DosName::parse_strict("file.jpeg"),
            Err(FdiskError::NameTooLong(_))
        ));
    }

    #[test]
    fn test_parse_strict_requires_extension() {
        assert!(matches!(
            DosName::parse_strict("README"),
            Err(FdiskError::InvalidInput(_))
        ));
        assert!(matches!(
            DosName::parse_strict(".hidden"),
            Err(FdiskError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_lossy_truncates_and_keeps_case() {
        assert_eq!(DosName::from_lossy(b"MEGA65.ROM").as_bytes(), b"MEGA65  ROM");
        assert_eq!(DosName::from_lossy(b"verylongname.jpeg").as_bytes(), b"verylongjpe");
        assert_eq!(DosName::from_lossy(b"NOEXT").as_bytes(), b"NOEXT      ");
    }
}
