//! Response packaging for the web layer.

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use image::{DynamicImage, ImageFormat};
use serde::Serialize;
use std::io::Cursor;

use crate::analysis::AnalysisResult;

/// Successful analysis: annotated image plus structured report
#[derive(Debug, Clone, Serialize)]
pub struct AnalyzeResponse {
    pub success: bool,
    /// `data:image/png;base64,...`
    pub image: String,
    pub analysis: AnalysisResult,
}

/// Failure body shared by every endpoint
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
        }
    }
}

/// Encode an image as a PNG data URI
pub fn to_data_uri(image: &DynamicImage) -> Result<String> {
    let mut png = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .context("Failed to encode annotated image as PNG")?;
    Ok(format!("data:image/png;base64,{}", B64.encode(&png)))
}

/// Pair the rendered image with its analysis
pub fn encode(rendered: &DynamicImage, analysis: AnalysisResult) -> Result<AnalyzeResponse> {
    Ok(AnalyzeResponse {
        success: true,
        image: to_data_uri(rendered)?,
        analysis,
    })
}
