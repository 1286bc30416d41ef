//! Writes result documents to the output folder.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;

use super::picker::FolderPicker;
use crate::constants::RESULT_FILE_EXTENSION;

/// Errors that can occur when exporting results.
#[derive(Debug, thiserror::Error)]
pub enum ResultError {
    /// Bad argument or missing configuration, raised before anything is written
    #[error("Invalid input: {0}")]
    InputValidation(String),

    /// Output folder or file could not be created or written
    #[error("Cannot write {path:?}: {source}")]
    FileSystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A result could not be rendered as JSON
    #[error("Failed to serialize result: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// What `output_results` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputOutcome {
    /// The user cancelled folder selection; nothing was written
    Cancelled,
    /// One file per result, in key order
    Written(Vec<PathBuf>),
}

/// Outputs result documents as text files, one per image.
pub struct ResultHandler {
    output_path: Option<PathBuf>,
    prompt_for_folder: bool,
    picker: Arc<dyn FolderPicker>,
}

impl ResultHandler {
    pub fn new(
        output_path: Option<PathBuf>,
        prompt_for_folder: bool,
        picker: Arc<dyn FolderPicker>,
    ) -> Self {
        Self {
            output_path,
            prompt_for_folder,
            picker,
        }
    }

    pub fn output_path(&self) -> Option<&Path> {
        self.output_path.as_deref()
    }

    pub fn prompt_for_folder(&self) -> bool {
        self.prompt_for_folder
    }

    pub fn set_prompt_for_folder(&mut self, prompt: bool) {
        self.prompt_for_folder = prompt;
    }

    /// Set the folder results are written to. Empty paths are rejected.
    pub fn set_output_path(&mut self, path: impl AsRef<Path>) -> Result<(), ResultError> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(ResultError::InputValidation(
                "Output path must not be empty".to_string(),
            ));
        }
        self.output_path = Some(path.to_path_buf());
        Ok(())
    }

    /// Forget the output folder. Exporting then needs a prompt or a new path.
    pub fn clear_output_path(&mut self) {
        self.output_path = None;
    }

    /// Set the output folder from an untyped value, e.g. a field of a
    /// hand-edited document. Only strings are accepted.
    pub fn set_output_path_value(&mut self, value: &Value) -> Result<(), ResultError> {
        match value {
            Value::String(path) => self.set_output_path(path),
            other => Err(ResultError::InputValidation(format!(
                "Output path must be a string, got {}",
                json_kind(other)
            ))),
        }
    }

    /// Write each result to `<output>/<name>.txt`.
    ///
    /// With prompting enabled the picker chooses the folder first; a
    /// cancelled pick writes nothing and is not an error. Without an output
    /// folder this fails before any file is touched.
    pub fn output_results(
        &mut self,
        results: &BTreeMap<String, Value>,
    ) -> Result<OutputOutcome, ResultError> {
        if self.prompt_for_folder {
            match self
                .picker
                .pick_folder("Select output folder", self.output_path.as_deref())
            {
                Some(folder) => self.output_path = Some(folder),
                None => return Ok(OutputOutcome::Cancelled),
            }
        }

        let Some(output_dir) = self.output_path.clone() else {
            return Err(ResultError::InputValidation(
                "Output path is not set. Set the output path before outputting results".to_string(),
            ));
        };

        fs::create_dir_all(&output_dir).map_err(|source| ResultError::FileSystem {
            path: output_dir.clone(),
            source,
        })?;

        let mut written = Vec::with_capacity(results.len());
        for (name, result) in results {
            let file_path = output_dir.join(format!("{}.{}", name, RESULT_FILE_EXTENSION));
            let text = serde_json::to_string_pretty(result)?;
            fs::write(&file_path, text).map_err(|source| ResultError::FileSystem {
                path: file_path.clone(),
                source,
            })?;
            log::debug!("Wrote result {:?}", file_path);
            written.push(file_path);
        }

        log::info!("Wrote {} result files to {:?}", written.len(), output_dir);
        Ok(OutputOutcome::Written(written))
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::NoPicker;
    use serde_json::json;
    use std::cell::Cell;
    use tempfile::tempdir;

    /// Picker that returns a fixed folder and counts how often it was asked.
    struct FixedPicker {
        folder: PathBuf,
        asked: Cell<usize>,
    }

    impl FolderPicker for FixedPicker {
        fn pick_folder(&self, _title: &str, _start: Option<&Path>) -> Option<PathBuf> {
            self.asked.set(self.asked.get() + 1);
            Some(self.folder.clone())
        }
    }

    fn dummy_results() -> BTreeMap<String, Value> {
        BTreeMap::from([
            ("test".to_string(), json!({ "value": 123 })),
            ("another".to_string(), json!({ "value": "abc" })),
        ])
    }

    #[test]
    fn test_output_results_creates_files() {
        let dir = tempdir().unwrap();
        let mut handler =
            ResultHandler::new(Some(dir.path().to_path_buf()), false, Arc::new(NoPicker));

        let outcome = handler.output_results(&dummy_results()).unwrap();

        let test_file = dir.path().join("test.txt");
        let another_file = dir.path().join("another.txt");
        assert_eq!(
            outcome,
            OutputOutcome::Written(vec![another_file.clone(), test_file.clone()])
        );
        assert!(fs::read_to_string(test_file).unwrap().contains("123"));
        assert!(fs::read_to_string(another_file).unwrap().contains("abc"));
    }

    #[test]
    fn test_set_output_path_invalid() {
        let mut handler = ResultHandler::new(None, false, Arc::new(NoPicker));

        for value in [json!(123), Value::Null, json!(["a", "b"]), json!({ "p": 1 })] {
            let err = handler.set_output_path_value(&value).unwrap_err();
            assert!(matches!(err, ResultError::InputValidation(_)));
        }
        assert!(matches!(
            handler.set_output_path(""),
            Err(ResultError::InputValidation(_))
        ));
        assert_eq!(handler.output_path(), None);

        handler.set_output_path_value(&json!("/tmp/out")).unwrap();
        assert_eq!(handler.output_path(), Some(Path::new("/tmp/out")));

        handler.clear_output_path();
        assert_eq!(handler.output_path(), None);
    }

    #[test]
    fn test_output_results_no_output_path() {
        let mut handler = ResultHandler::new(None, false, Arc::new(NoPicker));

        let err = handler.output_results(&dummy_results()).unwrap_err();

        assert!(matches!(err, ResultError::InputValidation(_)));
    }

    #[test]
    fn test_cancelled_prompt_writes_nothing() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("out");
        let mut handler = ResultHandler::new(Some(out.clone()), true, Arc::new(NoPicker));

        let outcome = handler.output_results(&dummy_results()).unwrap();

        assert_eq!(outcome, OutputOutcome::Cancelled);
        assert!(!out.exists());
    }

    #[test]
    fn test_prompt_chooses_folder() {
        let dir = tempdir().unwrap();
        let picked = dir.path().join("picked");
        let picker = Arc::new(FixedPicker {
            folder: picked.clone(),
            asked: Cell::new(0),
        });
        let mut handler = ResultHandler::new(None, true, picker.clone());

        handler.output_results(&dummy_results()).unwrap();

        assert_eq!(picker.asked.get(), 1);
        assert_eq!(handler.output_path(), Some(picked.as_path()));
        assert!(picked.join("test.txt").exists());
    }
}
