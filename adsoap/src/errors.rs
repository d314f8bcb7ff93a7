use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AdSoapError {
    #[error("{0}")]
    InvalidArgument(String),
    #[error("Could not create directory \"{}\": {source}", .path.display())]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("The path \"{}\" is not a directory", .0.display())]
    NotADirectory(PathBuf),
    #[error("The directory \"{}\" is not writable", .0.display())]
    NotWritable(PathBuf),
    #[error("Could not write file \"{}\": {source}", .path.display())]
    WriteFile {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Cannot decode \"{value}\" as {expected}")]
    Format {
        value: String,
        expected: &'static str,
    },
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),
}

impl AdSoapError {
    pub fn invalid_argument(message: &str) -> Self {
        AdSoapError::InvalidArgument(message.to_string())
    }

    pub fn format(value: &str, expected: &'static str) -> Self {
        AdSoapError::Format {
            value: value.to_string(),
            expected,
        }
    }

    /// Directory or file could not be created or written
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            AdSoapError::CreateDirectory { .. }
                | AdSoapError::NotADirectory(_)
                | AdSoapError::NotWritable(_)
                | AdSoapError::WriteFile { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, AdSoapError>;
