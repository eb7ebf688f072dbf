//! Generation options: framing, resolution tier and style.

use serde::{Deserialize, Serialize};

/// Output aspect ratio, serialized with the service's spelling.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AspectRatio {
    #[default]
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "3:4")]
    Portrait,
    #[serde(rename = "4:3")]
    Landscape,
    #[serde(rename = "9:16")]
    Tall,
    #[serde(rename = "16:9")]
    Wide,
}

impl AspectRatio {
    pub fn as_str(&self) -> &'static str {
        match self {
            AspectRatio::Square => "1:1",
            AspectRatio::Portrait => "3:4",
            AspectRatio::Landscape => "4:3",
            AspectRatio::Tall => "9:16",
            AspectRatio::Wide => "16:9",
        }
    }
}

impl std::fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AspectRatio {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "1:1" => Ok(AspectRatio::Square),
            "3:4" => Ok(AspectRatio::Portrait),
            "4:3" => Ok(AspectRatio::Landscape),
            "9:16" => Ok(AspectRatio::Tall),
            "16:9" => Ok(AspectRatio::Wide),
            other => Err(format!(
                "unsupported aspect ratio '{other}' (expected 1:1, 3:4, 4:3, 9:16 or 16:9)"
            )),
        }
    }
}

/// Resolution tier.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ImageSize {
    #[default]
    #[serde(rename = "1K")]
    OneK,
    #[serde(rename = "2K")]
    TwoK,
    #[serde(rename = "4K")]
    FourK,
}

impl ImageSize {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageSize::OneK => "1K",
            ImageSize::TwoK => "2K",
            ImageSize::FourK => "4K",
        }
    }
}

impl std::fmt::Display for ImageSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ImageSize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "1K" => Ok(ImageSize::OneK),
            "2K" => Ok(ImageSize::TwoK),
            "4K" => Ok(ImageSize::FourK),
            other => Err(format!("unsupported image size '{other}' (expected 1K, 2K or 4K)")),
        }
    }
}

/// Photographic style of the synthesized image.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StyleMode {
    /// Candid analog look: film grain, natural light, visible texture.
    #[default]
    Raw,
    /// Clean photorealistic lifestyle photography.
    Polished,
}

/// Per-run generation settings.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GenerationOptions {
    pub aspect_ratio: AspectRatio,
    pub image_size: ImageSize,
    pub style: StyleMode,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aspect_ratio_wire_spelling() {
        let json = serde_json::to_string(&AspectRatio::Tall).unwrap();
        assert_eq!(json, "\"9:16\"");
        assert_eq!("16:9".parse::<AspectRatio>().unwrap(), AspectRatio::Wide);
        assert!("2:1".parse::<AspectRatio>().is_err());
    }

    #[test]
    fn test_image_size_parse_is_case_insensitive() {
        assert_eq!("2k".parse::<ImageSize>().unwrap(), ImageSize::TwoK);
        assert_eq!(ImageSize::FourK.to_string(), "4K");
    }

    #[test]
    fn test_defaults_match_factory_settings() {
        let opts = GenerationOptions::default();
        assert_eq!(opts.aspect_ratio, AspectRatio::Square);
        assert_eq!(opts.image_size, ImageSize::OneK);
        assert_eq!(opts.style, StyleMode::Raw);
    }
}
