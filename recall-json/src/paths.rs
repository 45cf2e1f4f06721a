use directories::ProjectDirs;
use std::path::{Path, PathBuf};

pub fn data_root() -> PathBuf {
    if let Some(pd) = ProjectDirs::from("com", "recall", "Recall") {
        pd.data_dir().to_path_buf()
    } else {
        // Fallback: current dir
        std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
    }
}

/// Store file and backups directory under `root`.
pub fn store_files(root: &Path) -> (PathBuf, PathBuf) {
    (root.join("recall.json"), root.join("backups"))
}

pub fn default_store_file() -> (PathBuf, PathBuf) {
    store_files(&data_root())
}
