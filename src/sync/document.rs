use std::fs;
use std::io;
use std::path::PathBuf;

use serde_json::Value;

use crate::errors::EngineError;

/// Where a table's document lives.
///
/// The synchronizer only ever asks for these four things; anything that can
/// produce and accept a JSON value can back a table. `read` distinguishes an
/// absent document (`None`) from an unreadable one, which is what makes the
/// allow-missing behavior possible.
pub trait DocumentIo {
    fn read(&self) -> Result<Option<Value>, EngineError>;

    fn write(&self, document: &Value) -> Result<(), EngineError>;

    /// Write a side-channel artifact next to the document, named by suffix.
    /// Returns the location written, for reporting.
    fn write_aside(&self, suffix: &str, document: &Value) -> Result<String, EngineError>;

    /// A human-readable name for the document, used in errors and logs.
    fn location(&self) -> String;
}

/// A JSON document in a file.
pub struct FileDocument {
    path: PathBuf,
}

impl FileDocument {
    pub fn new(path: impl Into<PathBuf>) -> FileDocument {
        FileDocument { path: path.into() }
    }
}

impl DocumentIo for FileDocument {
    fn read(&self) -> Result<Option<Value>, EngineError> {
        match fs::read_to_string(&self.path) {
            Ok(text) => Ok(Some(serde_json::from_str(&text)?)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn write(&self, document: &Value) -> Result<(), EngineError> {
        let text = serde_json::to_string_pretty(document)?;
        fs::write(&self.path, text)?;
        Ok(())
    }

    fn write_aside(&self, suffix: &str, document: &Value) -> Result<String, EngineError> {
        let mut name = self.path.clone().into_os_string();
        name.push(format!(".{}", suffix));
        let path = PathBuf::from(name);
        let text = serde_json::to_string_pretty(document)?;
        fs::write(&path, text)?;
        Ok(path.display().to_string())
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}
