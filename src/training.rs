//! Training configuration handed to the external Ultralytics trainer.
//!
//! Gradient-based training is not done in-process: [`TrainConfig`] renders
//! to `key=value` arguments for the `yolo` CLI, which is run as a child
//! process.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    /// Pretrained checkpoint (`yolov8n-seg.pt` ... `yolov8x-seg.pt`)
    pub model: String,
    pub data: PathBuf,
    pub epochs: u32,
    pub imgsz: u32,
    /// -1 lets the trainer pick a batch size from GPU memory
    pub batch: i32,
    pub project: String,
    pub name: String,
    pub patience: u32,
    pub save: bool,
    pub save_period: i32,
    pub cache: bool,
    /// `0`, `0,1` or `cpu`
    pub device: String,
    pub workers: u32,
    pub pretrained: bool,
    pub optimizer: String,
    pub verbose: bool,
    pub seed: u64,
    pub deterministic: bool,
    pub single_cls: bool,
    pub rect: bool,
    pub cos_lr: bool,
    pub close_mosaic: u32,
    pub resume: bool,
    pub amp: bool,
    pub fraction: f32,
    pub profile: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub freeze: Option<u32>,
    // augmentation
    pub hsv_h: f32,
    pub hsv_s: f32,
    pub hsv_v: f32,
    pub degrees: f32,
    pub translate: f32,
    pub scale: f32,
    pub shear: f32,
    pub perspective: f32,
    pub flipud: f32,
    pub fliplr: f32,
    pub mosaic: f32,
    pub mixup: f32,
    pub copy_paste: f32,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            model: "yolov8n-seg.pt".to_string(),
            data: crate::dataset::default_dataset_yaml(),
            epochs: 100,
            imgsz: 640,
            batch: 16,
            project: "sugarcane_seg_training".to_string(),
            name: "yolov8_seg_v1".to_string(),
            patience: 50,
            save: true,
            save_period: 10,
            cache: false,
            device: "0".to_string(),
            workers: 8,
            pretrained: true,
            optimizer: "auto".to_string(),
            verbose: true,
            seed: 42,
            deterministic: true,
            single_cls: false,
            rect: false,
            cos_lr: false,
            close_mosaic: 10,
            resume: false,
            amp: true,
            fraction: 1.0,
            profile: false,
            freeze: None,
            hsv_h: 0.015,
            hsv_s: 0.7,
            hsv_v: 0.4,
            degrees: 0.0,
            translate: 0.1,
            scale: 0.5,
            shear: 0.0,
            perspective: 0.0,
            flipud: 0.0,
            fliplr: 0.5,
            mosaic: 1.0,
            mixup: 0.0,
            copy_paste: 0.0,
        }
    }
}

impl TrainConfig {
    /// Load overrides from a YAML file; absent keys keep their defaults
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read training config {}", path.display()))?;
        let config: TrainConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("Invalid training config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            bail!("epochs must be at least 1");
        }
        if self.imgsz == 0 || self.imgsz % 32 != 0 {
            bail!("imgsz must be a positive multiple of 32, got {}", self.imgsz);
        }
        if self.batch == 0 || self.batch < -1 {
            bail!("batch must be positive or -1 (auto), got {}", self.batch);
        }
        let unit = [
            ("fraction", self.fraction),
            ("flipud", self.flipud),
            ("fliplr", self.fliplr),
            ("mosaic", self.mosaic),
            ("mixup", self.mixup),
            ("copy_paste", self.copy_paste),
        ];
        for (name, value) in unit {
            crate::config::check_unit_interval(name, value)?;
        }
        Ok(())
    }

    /// `segment` for `-seg` checkpoints, `detect` otherwise
    pub fn task(&self) -> &'static str {
        if self.model.contains("-seg") {
            "segment"
        } else {
            "detect"
        }
    }

    /// Arguments for `yolo <task> train`
    pub fn to_args(&self) -> Result<Vec<String>> {
        let value = serde_json::to_value(self).context("Failed to serialize training config")?;
        let map = value
            .as_object()
            .context("Training config did not serialize to a map")?;
        Ok(map
            .iter()
            .map(|(key, value)| match value {
                serde_json::Value::String(s) => format!("{}={}", key, s),
                other => format!("{}={}", key, other),
            })
            .collect())
    }

    pub fn run_dir(&self) -> PathBuf {
        PathBuf::from(&self.project).join(&self.name)
    }

    pub fn best_weights(&self) -> PathBuf {
        self.run_dir().join("weights").join("best.pt")
    }

    pub fn last_weights(&self) -> PathBuf {
        self.run_dir().join("weights").join("last.pt")
    }

    /// Arguments for validating the best checkpoint after training
    pub fn val_args(&self) -> Vec<String> {
        vec![
            format!("model={}", self.best_weights().display()),
            format!("data={}", self.data.display()),
            format!("imgsz={}", self.imgsz),
            format!("device={}", self.device),
        ]
    }
}

/// Runs the Ultralytics CLI
pub struct Trainer {
    yolo_bin: String,
    dry_run: bool,
}

impl Trainer {
    pub fn new(yolo_bin: impl Into<String>, dry_run: bool) -> Self {
        Self {
            yolo_bin: yolo_bin.into(),
            dry_run,
        }
    }

    /// Full command line for one `yolo` invocation
    pub fn command_line(&self, task: &str, mode: &str, args: &[String]) -> Vec<String> {
        let mut line = vec![self.yolo_bin.clone(), task.to_string(), mode.to_string()];
        line.extend(args.iter().cloned());
        line
    }

    /// Train, then validate the best checkpoint unless `skip_val`
    pub async fn train(&self, config: &TrainConfig, skip_val: bool) -> Result<()> {
        config.validate()?;
        if !self.dry_run && !config.data.exists() {
            bail!(
                "Dataset config {} not found; run `cane-detect setup-dataset` first",
                config.data.display()
            );
        }

        info!(
            "Training {} on {} for {} epochs (imgsz {}, batch {})",
            config.model,
            config.data.display(),
            config.epochs,
            config.imgsz,
            config.batch
        );
        self.invoke(&self.command_line(config.task(), "train", &config.to_args()?))
            .await?;

        info!("Results saved to {}", config.run_dir().display());
        info!("Best model: {}", config.best_weights().display());
        info!("Last model: {}", config.last_weights().display());

        if !skip_val {
            info!("Running validation...");
            self.invoke(&self.command_line(config.task(), "val", &config.val_args()))
                .await?;
        }
        Ok(())
    }

    async fn invoke(&self, line: &[String]) -> Result<()> {
        let printable = line.join(" ");
        if self.dry_run {
            println!("{}", printable);
            return Ok(());
        }

        debug!("Running: {}", printable);
        let (program, args) = line.split_first().context("Empty command line")?;
        let status = Command::new(program)
            .args(args)
            .status()
            .await
            .with_context(|| format!("Failed to start {} (is ultralytics installed?)", program))?;

        if !status.success() {
            bail!("`{}` exited with {}", printable, status);
        }
        Ok(())
    }
}
