//! Dataset directory scaffolding for YOLO training.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const SPLITS: [&str; 3] = ["train", "val", "test"];
pub const DATASET_YAML: &str = "dataset.yaml";
pub const DEFAULT_CLASSES: [&str; 3] = ["disease", "healthy", "insect"];
/// Dataset root shared by `setup-dataset` and `train`
pub const DEFAULT_BASE_DIR: &str = "data";

/// `dataset.yaml` under the default dataset root
pub fn default_dataset_yaml() -> PathBuf {
    Path::new(DEFAULT_BASE_DIR).join(DATASET_YAML)
}

/// Ultralytics dataset description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetYaml {
    pub path: PathBuf,
    pub train: String,
    pub val: String,
    pub test: String,
    pub names: BTreeMap<u32, String>,
}

impl DatasetYaml {
    pub fn new(base_dir: &Path, class_names: &[String]) -> Self {
        Self {
            path: base_dir.to_path_buf(),
            train: "images/train".to_string(),
            val: "images/val".to_string(),
            test: "images/test".to_string(),
            names: class_names
                .iter()
                .enumerate()
                .map(|(i, name)| (i as u32, name.clone()))
                .collect(),
        }
    }
}

/// What [`setup_dataset`] produced
#[derive(Debug, Clone)]
pub struct DatasetLayout {
    pub base_dir: PathBuf,
    pub directories: Vec<PathBuf>,
    pub dataset_yaml: PathBuf,
    /// False when an existing `dataset.yaml` was left in place
    pub yaml_created: bool,
}

/// Create `images/{train,val,test}` and `labels/{train,val,test}` under
/// `base_dir`, plus a `dataset.yaml` unless one already exists. Idempotent.
pub fn setup_dataset(base_dir: &Path, class_names: &[String]) -> Result<DatasetLayout> {
    info!("Setting up dataset structure in {}", base_dir.display());

    let mut directories = Vec::new();
    for kind in ["images", "labels"] {
        for split in SPLITS {
            let dir = base_dir.join(kind).join(split);
            fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
            debug!("Created {}", dir.display());
            directories.push(dir);
        }
    }

    let dataset_yaml = base_dir.join(DATASET_YAML);
    let yaml_created = !dataset_yaml.exists();
    if yaml_created {
        let absolute = fs::canonicalize(base_dir).unwrap_or_else(|_| base_dir.to_path_buf());
        let contents = serde_yaml::to_string(&DatasetYaml::new(&absolute, class_names))
            .context("Failed to serialize dataset.yaml")?;
        fs::write(&dataset_yaml, contents)
            .with_context(|| format!("Failed to write {}", dataset_yaml.display()))?;
        info!("Wrote {}", dataset_yaml.display());
    } else {
        info!("Keeping existing {}", dataset_yaml.display());
    }

    Ok(DatasetLayout {
        base_dir: base_dir.to_path_buf(),
        directories,
        dataset_yaml,
        yaml_created,
    })
}

/// Read an existing dataset description
pub fn load_dataset_yaml(path: &Path) -> Result<DatasetYaml> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_yaml::from_str(&contents).with_context(|| format!("Invalid dataset file {}", path.display()))
}

/// Human-readable summary for the `setup-dataset` command
pub fn render_summary(layout: &DatasetLayout) -> String {
    let base = layout.base_dir.display();
    let mut out = String::new();
    out.push_str("Directory structure created successfully!\n\n");
    for dir in &layout.directories {
        out.push_str(&format!("  created {}\n", dir.display()));
    }
    if layout.yaml_created {
        out.push_str(&format!("  wrote   {}\n", layout.dataset_yaml.display()));
    }
    out.push_str("\nNext steps:\n");
    out.push_str(&format!("1. Place your training images in: {}/images/train/\n", base));
    out.push_str(&format!("2. Place your training labels in: {}/labels/train/\n", base));
    out.push_str(&format!("3. Place your validation images in: {}/images/val/\n", base));
    out.push_str(&format!("4. Place your validation labels in: {}/labels/val/\n", base));
    out.push_str(&format!(
        "5. Check the class names in {}\n",
        layout.dataset_yaml.display()
    ));
    if layout.dataset_yaml == default_dataset_yaml() {
        out.push_str("6. Run: cane-detect train\n");
    } else {
        out.push_str(&format!(
            "6. Run: cane-detect train --data {}\n",
            layout.dataset_yaml.display()
        ));
    }
    out
}
