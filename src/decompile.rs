use thiserror::Error;

/// First four bytes of every compiled class.
pub const CLASS_MAGIC: [u8; 4] = [0xCA, 0xFE, 0xBA, 0xBE];

#[derive(Error, Debug)]
pub enum DecompileError {
    #[error("class file is empty")]
    Empty,

    #[error("not a compiled class (bad magic header)")]
    InvalidClassFile,

    #[error("decompiler produced no output")]
    NoOutput,

    #[error("decompiler failed: {0}")]
    Engine(String),

    #[error("decompiler I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Turns one compiled-class byte stream into source text.
///
/// Implementations are shared across conversion workers.
pub trait Decompiler: Send + Sync {
    fn decompile(&self, class_bytes: &[u8]) -> Result<String, DecompileError>;
}

impl<D: Decompiler + ?Sized> Decompiler for &D {
    fn decompile(&self, class_bytes: &[u8]) -> Result<String, DecompileError> {
        (**self).decompile(class_bytes)
    }
}

impl<D: Decompiler + ?Sized> Decompiler for std::sync::Arc<D> {
    fn decompile(&self, class_bytes: &[u8]) -> Result<String, DecompileError> {
        (**self).decompile(class_bytes)
    }
}

/// Rejects input no decompiler could make sense of.
pub fn validate_class_bytes(class_bytes: &[u8]) -> Result<(), DecompileError> {
    if class_bytes.is_empty() {
        return Err(DecompileError::Empty);
    }
    if !class_bytes.starts_with(&CLASS_MAGIC) {
        return Err(DecompileError::InvalidClassFile);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_class_bytes_checks_magic() {
        assert!(matches!(validate_class_bytes(b""), Err(DecompileError::Empty)));
        assert!(matches!(
            validate_class_bytes(b"PK\x03\x04"),
            Err(DecompileError::InvalidClassFile)
        ));
        assert!(validate_class_bytes(&[0xCA, 0xFE, 0xBA, 0xBE, 0, 0, 0, 52]).is_ok());
    }
}
