use crate::error::Result;
use crate::Preprocessor;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// The default preprocessor: returns its input untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityPreprocessor;

#[async_trait]
impl Preprocessor for IdentityPreprocessor {
    fn name(&self) -> &str {
        "identity"
    }

    async fn process(&self, input: &Path, _original_name: &str) -> Result<PathBuf> {
        Ok(input.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_identity_returns_input() {
        let out = IdentityPreprocessor
            .process(Path::new("/tmp/input.pdf"), "input.pdf")
            .await
            .unwrap();
        assert_eq!(out, PathBuf::from("/tmp/input.pdf"));
    }
}
