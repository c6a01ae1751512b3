//! Input validation: make sure a user-supplied path is a readable PDF.
//!
//! pdfium crashes or reports opaque errors on non-PDF input, so the magic
//! bytes (`%PDF`) are checked up front and mapped to a meaningful error.

use crate::error::AgentFlowError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Validate a local file path: it must exist, be readable and start with `%PDF`.
pub fn resolve_input(path: impl AsRef<Path>) -> Result<PathBuf, AgentFlowError> {
    let path = path.as_ref().to_path_buf();

    if !path.exists() {
        return Err(AgentFlowError::FileNotFound { path });
    }

    match std::fs::File::open(&path) {
        Ok(mut f) => {
            let mut magic = [0u8; 4];
            match f.read_exact(&mut magic) {
                Ok(()) if &magic == b"%PDF" => {}
                Ok(()) => return Err(AgentFlowError::NotAPdf { path, magic }),
                // Shorter than four bytes: cannot be a PDF either.
                Err(_) => return Err(AgentFlowError::NotAPdf { path, magic }),
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(AgentFlowError::PermissionDenied { path });
        }
        Err(_) => {
            return Err(AgentFlowError::FileNotFound { path });
        }
    }

    debug!("Resolved local PDF: {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file() {
        let err = resolve_input("/definitely/not/here.pdf").unwrap_err();
        assert!(matches!(err, AgentFlowError::FileNotFound { .. }));
    }

    #[test]
    fn rejects_non_pdf() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"PK\x03\x04zipdata").unwrap();
        let err = resolve_input(f.path()).unwrap_err();
        match err {
            AgentFlowError::NotAPdf { magic, .. } => assert_eq!(&magic, b"PK\x03\x04"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn rejects_tiny_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"%P").unwrap();
        assert!(matches!(
            resolve_input(f.path()),
            Err(AgentFlowError::NotAPdf { .. })
        ));
    }

    #[test]
    fn accepts_pdf_magic() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"%PDF-1.7\n%\xe2\xe3\xcf\xd3\n").unwrap();
        assert_eq!(resolve_input(f.path()).unwrap(), f.path());
    }
}
