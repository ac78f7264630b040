//! Message payload generation
//!
//! A payload is a pure function of the publish index within one worker. File
//! payloads are read once when the generator is built and shared between
//! workers afterwards.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::ConfigError;

/// Marker that turns a payload source into a file path
pub const FILE_MARKER: char = '@';

/// Produces the body of the i-th publish of a worker
#[derive(Clone, PartialEq, Eq, Default)]
pub enum PayloadGenerator {
    /// `this is msg #<i>!`
    #[default]
    Default,
    /// The same user-supplied bytes for every publish
    Constant(Arc<[u8]>),
    /// Contents of a file, loaded once
    File {
        /// Where the content was read from
        path: PathBuf,
        /// File content
        content: Arc<[u8]>,
    },
}

impl PayloadGenerator {
    /// Build a generator from a payload source
    ///
    /// `None` or an empty string selects the default text, a leading `@`
    /// selects a file, anything else is sent verbatim.
    pub fn from_source(source: Option<&str>) -> Result<Self, ConfigError> {
        match source {
            None | Some("") => Ok(Self::Default),
            Some(source) => match source.strip_prefix(FILE_MARKER) {
                Some(path) => Self::from_file(Path::new(path)),
                None => Ok(Self::constant(source)),
            },
        }
    }

    /// A constant payload
    pub fn constant(payload: impl AsRef<[u8]>) -> Self {
        Self::Constant(Arc::from(payload.as_ref()))
    }

    /// Read a payload file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read(path).map_err(|source| ConfigError::PayloadFile {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::File {
            path: path.to_path_buf(),
            content: Arc::from(content),
        })
    }

    /// Body of the publish at `index`
    pub fn generate(&self, index: usize) -> Vec<u8> {
        match self {
            Self::Default => format!("this is msg #{index}!").into_bytes(),
            Self::Constant(payload) => payload.to_vec(),
            Self::File { content, .. } => content.to_vec(),
        }
    }

    /// Short label for logs and reports
    pub fn describe(&self) -> String {
        match self {
            Self::Default => "default".to_string(),
            Self::Constant(payload) => format!("constant ({} bytes)", payload.len()),
            Self::File { path, content } => {
                format!("file {} ({} bytes)", path.display(), content.len())
            }
        }
    }
}

impl std::fmt::Debug for PayloadGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PayloadGenerator")
            .field(&self.describe())
            .finish()
    }
}
