//! Folder selection.

use std::path::{Path, PathBuf};

/// Asks the user for a folder. `None` means the user cancelled.
pub trait FolderPicker {
    fn pick_folder(&self, title: &str, start: Option<&Path>) -> Option<PathBuf>;
}

/// Native folder dialog.
#[derive(Debug, Clone, Copy, Default)]
pub struct DialogPicker;

impl FolderPicker for DialogPicker {
    fn pick_folder(&self, title: &str, start: Option<&Path>) -> Option<PathBuf> {
        let mut dialog = rfd::FileDialog::new().set_title(title);
        if let Some(dir) = start.filter(|d| d.is_dir()) {
            dialog = dialog.set_directory(dir);
        }
        let picked = dialog.pick_folder();
        match &picked {
            Some(folder) => log::debug!("Picked folder {:?}", folder),
            None => log::debug!("Folder selection cancelled"),
        }
        picked
    }
}

/// Picker for headless use: always behaves as if the user cancelled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPicker;

impl FolderPicker for NoPicker {
    fn pick_folder(&self, title: &str, _start: Option<&Path>) -> Option<PathBuf> {
        log::debug!("No folder picker available for '{}'", title);
        None
    }
}
