//! Bytecode program representation and persistence.
//!
//! A [`Program`] is the flat byte buffer the assembler emits and the VM runs.
//! The on-disk form is the raw buffer itself: no magic, no version, no length
//! prefix. The file length is the program length.

use crate::virtual_machine::errors::VMError;
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Immutable, cheaply clonable bytecode buffer. Offset 0 is the entry point.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Program {
    code: Arc<[u8]>,
}

impl Program {
    /// Wraps raw bytecode. No validation happens here; the VM checks
    /// instruction boundaries when it loads the program.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        let bytes: Vec<u8> = bytes.into();
        Self {
            code: Arc::from(bytes),
        }
    }

    /// Copies the bytecode into a new `Vec<u8>`.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.code.to_vec()
    }

    /// Returns the bytecode as a slice.
    pub fn as_slice(&self) -> &[u8] {
        &self.code
    }

    /// Returns the bytecode length in bytes.
    pub fn len(&self) -> usize {
        self.code.len()
    }

    /// Returns true if the program has no instructions.
    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// Reads a bytecode file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, VMError> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|e| VMError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self::from_bytes(bytes))
    }

    /// Writes the bytecode to `path`, replacing any existing file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), VMError> {
        let path = path.as_ref();
        fs::write(path, &self.code).map_err(|e| VMError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }
}

impl From<Vec<u8>> for Program {
    fn from(bytes: Vec<u8>) -> Self {
        Self::from_bytes(bytes)
    }
}

impl AsRef<[u8]> for Program {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::test_utils::utils::write_file;

    #[test]
    fn raw_bytes_round_trip() {
        let program = Program::from_bytes(vec![0x01, 0x05, 0x00, 0x00, 0x00, 0x00]);
        assert_eq!(program.len(), 6);
        assert!(!program.is_empty());
        assert_eq!(program.to_bytes(), vec![0x01, 0x05, 0x00, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn clones_share_the_buffer() {
        let program = Program::from_bytes(vec![0x00]);
        let copy = program.clone();
        assert!(std::ptr::eq(program.as_slice(), copy.as_slice()));
    }

    #[test]
    fn save_and_load_preserve_exact_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prog.bin");
        let program = Program::from_bytes(vec![0x01, 0xFF, 0xFF, 0xFF, 0x7F, 0x10, 0x00]);

        program.save(&path).unwrap();
        assert_eq!(fs::read(&path).unwrap(), program.to_bytes());
        assert_eq!(Program::load(&path).unwrap(), program);
    }

    #[test]
    fn load_accepts_arbitrary_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "junk.bin", [0xEEu8, 0x01]);
        assert_eq!(Program::load(&path).unwrap().as_slice(), &[0xEE, 0x01]);
    }

    #[test]
    fn load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Program::load(dir.path().join("missing.bin")).unwrap_err();
        assert!(matches!(err, VMError::Io { .. }));
    }
}
