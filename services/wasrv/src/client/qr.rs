//! QR rendering

use base64::Engine;
use qrcode::{render::svg, QrCode};

use crate::error::{Result, WaSrvError};

/// Turns a raw pairing string into something a browser can display
pub trait QrRenderer: Send + Sync {
    fn render(&self, raw: &str) -> Result<String>;
}

/// Renders `data:image/svg+xml;base64,...` URLs
#[derive(Debug, Clone)]
pub struct SvgDataUrlRenderer {
    pub min_size: u32,
}

impl Default for SvgDataUrlRenderer {
    fn default() -> Self {
        Self { min_size: 256 }
    }
}

impl QrRenderer for SvgDataUrlRenderer {
    fn render(&self, raw: &str) -> Result<String> {
        if raw.is_empty() {
            return Err(WaSrvError::internal("empty QR payload"));
        }
        let code = QrCode::new(raw.as_bytes())
            .map_err(|e| WaSrvError::internal(format!("QR encode: {}", e)))?;
        let image = code
            .render::<svg::Color<'_>>()
            .min_dimensions(self.min_size, self.min_size)
            .dark_color(svg::Color("#000000"))
            .light_color(svg::Color("#ffffff"))
            .build();
        let encoded = base64::engine::general_purpose::STANDARD.encode(image.as_bytes());
        Ok(format!("data:image/svg+xml;base64,{}", encoded))
    }
}
