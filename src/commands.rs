//! Subcommand implementations.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::analysis::{analyze, AnalysisResult};
use crate::cli::{OutputFormat, PredictArgs, ServeArgs, SetupDatasetArgs, TrainArgs};
use crate::config::{check_unit_interval, AppConfig};
use crate::dataset::{render_summary, setup_dataset};
use crate::models::Renderer;
use crate::pipeline::{DetectionPipeline, InferenceBackend};
use crate::training::{TrainConfig, Trainer};
use crate::types::ModelKind;

pub async fn serve(mut config: AppConfig, args: &ServeArgs) -> Result<()> {
    args.apply(&mut config);
    config.validate()?;

    let pipeline = tokio::task::spawn_blocking({
        let config = config.clone();
        move || DetectionPipeline::from_config(&config)
    })
    .await??;

    crate::server::serve(&config, Arc::new(pipeline)).await
}

/// Result of a `predict` run
#[derive(Debug)]
pub struct Prediction {
    pub image: PathBuf,
    pub saved_to: PathBuf,
    pub analysis: AnalysisResult,
}

pub fn predict(config: &AppConfig, args: &PredictArgs) -> Result<Prediction> {
    let confidence = args.conf.unwrap_or(config.inference.default_confidence);
    check_unit_interval("conf", confidence)?;

    let model_path = args
        .model_path(config)
        .with_context(|| format!("No {} model configured", args.model_type))?;
    let renderer = Renderer::new(config.render.font_path.as_deref(), config.render.box_thickness)?;
    let (detection, segmentation) = match args.model_type {
        ModelKind::Detection => (Some(model_path.as_path()), None),
        ModelKind::Segmentation => (None, Some(model_path.as_path())),
    };
    let pipeline =
        DetectionPipeline::new(detection, segmentation, &config.model_options(), renderer)?;

    let image = image::open(&args.image)
        .with_context(|| format!("Failed to open image {}", args.image.display()))?;
    info!("Processing: {}", args.image.display());

    let output = pipeline.run_inference(&image, args.model_type, confidence)?;
    let analysis = analyze(&output.detections, &output.class_names, output.model_type);

    let output_dir = args.output_dir();
    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;
    let file_name = args
        .image
        .file_name()
        .context("Image path has no file name")?;
    let saved_to = output_dir.join(file_name);
    output
        .rendered
        .save(&saved_to)
        .with_context(|| format!("Failed to save {}", saved_to.display()))?;
    info!("Annotated image saved to {}", saved_to.display());

    Ok(Prediction {
        image: args.image.clone(),
        saved_to,
        analysis,
    })
}

pub fn render_prediction(prediction: &Prediction, format: OutputFormat) -> Result<String> {
    let analysis = &prediction.analysis;
    match format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "image": prediction.image,
                "saved_to": prediction.saved_to,
                "analysis": analysis,
            });
            Ok(serde_json::to_string_pretty(&json)?)
        }
        OutputFormat::Text => {
            let mut out = String::new();
            out.push_str(&format!("Image: {}\n", prediction.image.display()));
            out.push_str(&format!("Model: {}\n", analysis.model_type));
            out.push_str(&format!("Status: {}\n", analysis.status));
            out.push_str(&format!("{}\n", analysis.message));
            for (i, group) in analysis.detections.iter().enumerate() {
                out.push_str(&format!(
                    "  {}. {} {} x{} ({:.1}%, {:?} severity)\n",
                    i + 1,
                    group.icon,
                    group.class_name,
                    group.count,
                    group.confidence,
                    group.severity
                ));
                out.push_str(&format!("     {}\n", group.description));
            }
            out.push_str("Recommendations:\n");
            for rec in &analysis.recommendations {
                out.push_str(&format!("  - {}\n", rec));
            }
            out.push_str(&format!("Saved: {}\n", prediction.saved_to.display()));
            Ok(out)
        }
    }
}

pub fn setup(args: &SetupDatasetArgs) -> Result<()> {
    let layout = setup_dataset(&args.base_dir, &args.classes)?;
    print!("{}", render_summary(&layout));
    Ok(())
}

pub async fn train(args: &TrainArgs) -> Result<()> {
    let mut config = match &args.hyperparameters {
        Some(path) => TrainConfig::load(path)?,
        None => TrainConfig::default(),
    };
    args.apply(&mut config);

    Trainer::new(&args.yolo_bin, args.dry_run)
        .train(&config, args.skip_val)
        .await?;

    if !args.dry_run {
        println!("Training completed!");
        println!("Best model: {}", config.best_weights().display());
        println!("Last model: {}", config.last_weights().display());
        println!(
            "Export it for inference with: yolo export model={} format=onnx",
            config.best_weights().display()
        );
    }
    Ok(())
}
