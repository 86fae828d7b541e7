//! Remote-name validation.
//!
//! Remote entries are addressed by bare file name. A transport (or a
//! malicious listing) must never be able to smuggle directory components
//! into a name, because downloaded names are later joined onto local
//! temporary directories and presented to the ingest backend verbatim.

use crate::error::{ErrorKind, Result};

/// Validates a remote file name.
///
/// Accepts plain file names only: no path separators, no traversal
/// components, no null bytes, not empty.
///
/// # Examples
///
/// ```
/// use docsink_source::validate_name;
/// assert!(validate_name("report.pdf").is_ok());
/// assert!(validate_name("Quarterly Report (final).docx").is_ok());
/// assert!(validate_name("../etc/passwd").is_err());
/// assert!(validate_name("dir/report.pdf").is_err());
/// assert!(validate_name("").is_err());
/// ```
pub fn validate(name: &str) -> Result<&str> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0')
    {
        exn::bail!(ErrorKind::InvalidName(name.to_string()));
    }
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_names() {
        assert!(validate("report.pdf").is_ok());
        assert!(validate("UPPER.DOCX").is_ok());
        assert!(validate("spaces are fine.doc").is_ok());
        assert!(validate(".hidden.pdf").is_ok());
    }

    #[test]
    fn test_separators_rejected() {
        assert!(validate("a/b.pdf").is_err());
        assert!(validate("a\\b.pdf").is_err());
        assert!(validate("/absolute.pdf").is_err());
    }

    #[test]
    fn test_traversal_rejected() {
        assert!(validate("..").is_err());
        assert!(validate(".").is_err());
        assert!(validate("../up.pdf").is_err());
    }

    #[test]
    fn test_empty_and_null() {
        assert!(validate("").is_err());
        assert!(validate("a\0b.pdf").is_err());
    }
}
