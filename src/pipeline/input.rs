//! Input resolution: validate a user-supplied document path.
//!
//! pdfium reports a missing file and a non-PDF file with the same opaque
//! error, so the path is checked here first: existence, read permission,
//! and the `%PDF` magic bytes.

use crate::error::Pdf2McqError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Check that `path` names a readable PDF and return it unchanged.
pub fn resolve_document(path: &Path) -> Result<PathBuf, Pdf2McqError> {
    let path = path.to_path_buf();

    if !path.exists() {
        return Err(Pdf2McqError::FileNotFound { path });
    }

    match std::fs::File::open(&path) {
        Ok(mut f) => {
            let mut magic = [0u8; 4];
            if f.read_exact(&mut magic).is_ok() && &magic != b"%PDF" {
                return Err(Pdf2McqError::NotAPdf { path, magic });
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(Pdf2McqError::PermissionDenied { path });
        }
        Err(_) => {
            return Err(Pdf2McqError::FileNotFound { path });
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
        let err = resolve_document(Path::new("/no/such/notes.pdf")).unwrap_err();
        assert!(matches!(err, Pdf2McqError::FileNotFound { .. }));
    }

    #[test]
    fn rejects_non_pdf_magic() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"PK\x03\x04zipdata").unwrap();
        match resolve_document(f.path()) {
            Err(Pdf2McqError::NotAPdf { magic, .. }) => assert_eq!(&magic, b"PK\x03\x04"),
            other => panic!("expected NotAPdf, got {other:?}"),
        }
    }

    #[test]
    fn accepts_pdf_header() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"%PDF-1.7\n").unwrap();
        assert_eq!(resolve_document(f.path()).unwrap(), f.path());
    }
}
