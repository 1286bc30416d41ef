//! Application composition.
//!
//! A [`Session`] wires the settings store, the loader registry, the
//! segmentation dispatcher and the result handler to one viewer host. All of
//! them are handed in or derived from the settings at construction; nothing
//! is looked up globally.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::Settings;
use crate::data::{LoaderRegistry, load_folder};
use crate::error::{Error, Result};
use crate::results::{FolderPicker, OutputOutcome, ResultHandler, summarize};
use crate::segmentation::{Dispatcher, RunSummary, SegmentationModel};
use crate::settings_store::SettingsStore;
use crate::viewer::ViewerHost;

/// One running instance of the application.
pub struct Session<H: ViewerHost> {
    store: SettingsStore,
    registry: LoaderRegistry,
    dispatcher: Dispatcher,
    results: ResultHandler,
    picker: Arc<dyn FolderPicker>,
    host: H,
}

impl<H: ViewerHost> Session<H> {
    pub fn new(
        store: SettingsStore,
        host: H,
        model: Arc<dyn SegmentationModel>,
        picker: Arc<dyn FolderPicker>,
    ) -> Self {
        let settings = store.current();
        let view = settings.file_view();
        let dispatcher = Dispatcher::new(model, settings.model.max_workers);
        let results = ResultHandler::new(
            view.output_folder,
            view.prompt_for_output_folder,
            picker.clone(),
        );
        log::debug!(
            "Session using model '{}' with settings {:?}",
            dispatcher.model_name(),
            store.file_path()
        );

        Self {
            store,
            registry: LoaderRegistry::new(),
            dispatcher,
            results,
            picker,
            host,
        }
    }

    pub fn settings(&self) -> &Settings {
        self.store.current()
    }

    pub fn store(&self) -> &SettingsStore {
        &self.store
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn registry_mut(&mut self) -> &mut LoaderRegistry {
        &mut self.registry
    }

    pub fn results_mut(&mut self) -> &mut ResultHandler {
        &mut self.results
    }

    /// Override the worker bound for this session only.
    pub fn set_max_workers(&mut self, max_workers: usize) {
        self.dispatcher.set_max_workers(max_workers);
    }

    pub fn into_host(self) -> H {
        self.host
    }

    /// Load every supported image in a folder into the host.
    ///
    /// An explicit `folder` wins. Otherwise the folder is picked
    /// interactively when prompting is enabled, or taken from the settings.
    /// Returns `None` when the user cancels the pick. The folder used is
    /// remembered in the settings file.
    pub fn load_folder(&mut self, folder: Option<PathBuf>) -> Result<Option<usize>> {
        let view = self.store.current().file_view();
        let folder = match folder {
            Some(folder) => folder,
            None if view.prompt_for_input_folder => {
                match self
                    .picker
                    .pick_folder("Select input folder", view.input_folder.as_deref())
                {
                    Some(folder) => folder,
                    None => {
                        log::info!("Input folder selection cancelled");
                        return Ok(None);
                    }
                }
            }
            None => view.input_folder.ok_or_else(|| {
                Error::InputValidation("No input folder configured".to_string())
            })?,
        };

        let layers = load_folder(&self.registry, &folder)?;
        let count = layers.len();
        if count == 0 {
            self.host
                .notify(&format!("No supported images found in {:?}", folder));
        }
        for layer in layers {
            self.host.add_image(layer);
        }

        let remembered = folder.to_string_lossy().into_owned();
        if self.store.current().files.input_folder != remembered {
            self.store.current_mut().files.input_folder = remembered;
            self.store.persist()?;
        }

        Ok(Some(count))
    }

    /// Segment every loaded image with the current model settings.
    pub fn run_segmentation(&mut self) -> Result<RunSummary> {
        let config = self.store.current().model_config();
        let layers = self.host.image_layers().to_vec();
        let summary = self
            .dispatcher
            .run_layers(&layers, &config, &mut self.host)?;
        for (name, error) in &summary.failed {
            log::error!("Segmentation of '{}' failed: {}", name, error);
        }
        Ok(summary)
    }

    /// Write one summary file per label layer.
    pub fn export_results(&mut self) -> Result<OutputOutcome> {
        let mut documents = BTreeMap::new();
        for result in self.host.label_layers() {
            documents.insert(result.name.clone(), serde_json::to_value(summarize(result))?);
        }

        if documents.is_empty() {
            self.host.notify("No segmentation results to export");
            return Ok(OutputOutcome::Written(Vec::new()));
        }

        let outcome = self.results.output_results(&documents)?;
        if let (OutputOutcome::Written(_), Some(path)) = (&outcome, self.results.output_path()) {
            let remembered = path.to_string_lossy().into_owned();
            if self.store.current().files.output_folder != remembered {
                self.store.current_mut().files.output_folder = remembered;
                self.store.persist()?;
            }
        }
        Ok(outcome)
    }

    /// Re-read the settings file and apply it to the running components.
    pub fn refresh_settings(&mut self) -> Result<&Settings> {
        let settings = self.store.refreshed()?.clone();
        let view = settings.file_view();

        self.dispatcher.set_max_workers(settings.model.max_workers);
        self.results
            .set_prompt_for_folder(view.prompt_for_output_folder);
        match view.output_folder {
            Some(output) => self.results.set_output_path(output)?,
            None => self.results.clear_output_path(),
        }

        log::debug!("Applied refreshed settings from {:?}", self.store.file_path());
        Ok(self.store.current())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::NoPicker;
    use crate::segmentation::ThresholdSegmenter;
    use crate::viewer::LayerStack;
    use std::path::Path;
    use tempfile::{TempDir, tempdir};

    /// Picker that always returns the same folder.
    struct FixedPicker(PathBuf);

    impl FolderPicker for FixedPicker {
        fn pick_folder(&self, _title: &str, _start: Option<&Path>) -> Option<PathBuf> {
            Some(self.0.clone())
        }
    }

    /// Dark 24x24 image with two bright squares.
    fn write_two_blob_png(path: &Path) {
        let img = image::GrayImage::from_fn(24, 24, |x, y| {
            let in_a = (2..7).contains(&x) && (2..7).contains(&y);
            let in_b = (14..20).contains(&x) && (12..18).contains(&y);
            image::Luma([if in_a || in_b { 230 } else { 10 }])
        });
        img.save(path).unwrap();
    }

    fn input_folder(count: usize) -> TempDir {
        let dir = tempdir().unwrap();
        for i in 0..count {
            write_two_blob_png(&dir.path().join(format!("well-{}.png", i)));
        }
        std::fs::write(dir.path().join("notes.md"), "not an image").unwrap();
        dir
    }

    fn session(settings_dir: &Path, picker: Arc<dyn FolderPicker>) -> Session<LayerStack> {
        let mut store = SettingsStore::open(Some(settings_dir)).unwrap();
        store.current_mut().automation.prompt_for_input_folder = false;
        store.current_mut().automation.prompt_for_output_folder = false;
        store.persist().unwrap();
        Session::new(store, LayerStack::new(), Arc::new(ThresholdSegmenter), picker)
    }

    #[test]
    fn test_load_segment_export() {
        let settings_dir = tempdir().unwrap();
        let input = input_folder(3);
        let output = tempdir().unwrap();
        let mut session = session(settings_dir.path(), Arc::new(NoPicker));
        session.results_mut().set_output_path(output.path()).unwrap();

        let loaded = session
            .load_folder(Some(input.path().to_path_buf()))
            .unwrap();
        assert_eq!(loaded, Some(3));

        let summary = session.run_segmentation().unwrap();
        assert_eq!(summary.delivered.len(), 3);
        assert!(summary.failed.is_empty());
        assert_eq!(session.host().labels_for("well-1").unwrap().region_count(), 2);

        let outcome = session.export_results().unwrap();
        let OutputOutcome::Written(paths) = outcome else {
            panic!("expected files to be written");
        };
        assert_eq!(paths.len(), 3);
        let text = std::fs::read_to_string(output.path().join("well-0.txt")).unwrap();
        let doc: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(doc["region_count"], 2);
    }

    #[test]
    fn test_input_folder_is_remembered() {
        let settings_dir = tempdir().unwrap();
        let input = input_folder(1);
        let mut session = session(settings_dir.path(), Arc::new(NoPicker));

        session
            .load_folder(Some(input.path().to_path_buf()))
            .unwrap();

        let reopened = SettingsStore::open(Some(settings_dir.path())).unwrap();
        assert_eq!(
            reopened.current().file_view().input_folder.as_deref(),
            Some(input.path())
        );

        // Without an explicit folder the remembered one is used
        let mut session = Session::new(
            reopened,
            LayerStack::new(),
            Arc::new(ThresholdSegmenter),
            Arc::new(NoPicker),
        );
        assert_eq!(session.load_folder(None).unwrap(), Some(1));
    }

    #[test]
    fn test_missing_input_folder_is_rejected() {
        let settings_dir = tempdir().unwrap();
        let mut session = session(settings_dir.path(), Arc::new(NoPicker));

        let err = session.load_folder(None).unwrap_err();

        assert!(matches!(err, Error::InputValidation(_)));
    }

    #[test]
    fn test_cancelled_input_pick() {
        let settings_dir = tempdir().unwrap();
        let mut session = session(settings_dir.path(), Arc::new(NoPicker));
        session.store.current_mut().automation.prompt_for_input_folder = true;

        assert_eq!(session.load_folder(None).unwrap(), None);
        assert!(session.host().image_layers().is_empty());
    }

    #[test]
    fn test_picked_input_folder() {
        let settings_dir = tempdir().unwrap();
        let input = input_folder(2);
        let mut session = session(
            settings_dir.path(),
            Arc::new(FixedPicker(input.path().to_path_buf())),
        );
        session.store.current_mut().automation.prompt_for_input_folder = true;

        assert_eq!(session.load_folder(None).unwrap(), Some(2));
    }

    #[test]
    fn test_run_without_images_is_a_notice() {
        let settings_dir = tempdir().unwrap();
        let mut session = session(settings_dir.path(), Arc::new(NoPicker));

        let summary = session.run_segmentation().unwrap();

        assert_eq!(summary, RunSummary::default());
        assert_eq!(session.host().notices().len(), 1);
    }

    #[test]
    fn test_refresh_applies_external_edits() {
        let settings_dir = tempdir().unwrap();
        let output = tempdir().unwrap();
        let mut session = session(settings_dir.path(), Arc::new(NoPicker));

        let mut edited = session.settings().clone();
        edited.files.output_folder = output.path().to_string_lossy().into_owned();
        edited.automation.prompt_for_output_folder = true;
        std::fs::write(session.store().file_path(), edited.to_yaml().unwrap()).unwrap();

        let refreshed = session.refresh_settings().unwrap();
        assert!(refreshed.automation.prompt_for_output_folder);
        assert!(session.results_mut().prompt_for_folder());
        assert_eq!(session.results_mut().output_path(), Some(output.path()));
    }

    #[test]
    fn test_refresh_clears_removed_output_folder() {
        let settings_dir = tempdir().unwrap();
        let mut session = session(settings_dir.path(), Arc::new(NoPicker));
        assert!(session.results_mut().output_path().is_some());

        let mut edited = session.settings().clone();
        edited.files.output_folder = String::new();
        std::fs::write(session.store().file_path(), edited.to_yaml().unwrap()).unwrap();
        session.refresh_settings().unwrap();

        assert_eq!(session.results_mut().output_path(), None);
        let mut documents = BTreeMap::new();
        documents.insert("x".to_string(), serde_json::json!({}));
        assert!(matches!(
            session.results_mut().output_results(&documents),
            Err(crate::results::ResultError::InputValidation(_))
        ));
    }

    #[test]
    fn test_shared_stems_load_as_separate_layers() {
        let settings_dir = tempdir().unwrap();
        let input = tempdir().unwrap();
        write_two_blob_png(&input.path().join("well.png"));
        image::GrayImage::from_fn(24, 24, |x, _| image::Luma([if x < 12 { 10 } else { 230 }]))
            .save(input.path().join("well.tif"))
            .unwrap();
        let mut session = session(settings_dir.path(), Arc::new(NoPicker));

        let loaded = session
            .load_folder(Some(input.path().to_path_buf()))
            .unwrap();
        let summary = session.run_segmentation().unwrap();

        assert_eq!(loaded, Some(2));
        assert_eq!(session.host().image_layers().len(), 2);
        assert_eq!(summary.delivered.len(), 2);
        assert!(session.host().labels_for("well").is_some());
        assert!(session.host().labels_for("well.tif").is_some());
    }
}
