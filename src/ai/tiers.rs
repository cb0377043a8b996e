//! Backend model tiers per request kind.
//!
//! Each request kind owns its own closed enum, so a cascade can only ever
//! walk the tier list of the kind that started it.

/// Common view over the per-kind tier enums.
pub trait ModelTier: Copy + std::fmt::Debug + Send + Sync {
    fn model_id(self) -> &'static str;
}

/// Chat/text tiers, best first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextModel {
    Flash,
    FlashLite,
}

impl TextModel {
    pub const CASCADE: [TextModel; 2] = [TextModel::Flash, TextModel::FlashLite];

    /// Only the standard tier is sent with search grounding.
    pub fn grounded(self) -> bool {
        matches!(self, TextModel::Flash)
    }
}

impl ModelTier for TextModel {
    fn model_id(self) -> &'static str {
        match self {
            TextModel::Flash => "gemini-3-flash-preview",
            TextModel::FlashLite => "gemini-flash-lite-latest",
        }
    }
}

/// Complex/structured task tiers, best first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComplexModel {
    Pro,
    Flash,
    FlashLite,
}

impl ComplexModel {
    pub const CASCADE: [ComplexModel; 3] =
        [ComplexModel::Pro, ComplexModel::Flash, ComplexModel::FlashLite];

    pub fn thinking_budget(self) -> Option<u32> {
        match self {
            ComplexModel::Pro => Some(4000),
            ComplexModel::Flash | ComplexModel::FlashLite => None,
        }
    }
}

impl ModelTier for ComplexModel {
    fn model_id(self) -> &'static str {
        match self {
            ComplexModel::Pro => "gemini-3-pro-preview",
            ComplexModel::Flash => "gemini-3-flash-preview",
            ComplexModel::FlashLite => "gemini-flash-lite-latest",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageModel {
    FlashImage,
}

impl ModelTier for ImageModel {
    fn model_id(self) -> &'static str {
        "gemini-2.5-flash-image"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoModel {
    VeoFast,
}

impl VideoModel {
    pub const RESOLUTION: &'static str = "720p";
    pub const ASPECT_RATIO: &'static str = "16:9";
}

impl ModelTier for VideoModel {
    fn model_id(self) -> &'static str {
        "veo-3.1-fast-generate-preview"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechModel {
    FlashTts,
}

impl SpeechModel {
    pub const DEFAULT_VOICE: &'static str = "Kore";
}

impl ModelTier for SpeechModel {
    fn model_id(self) -> &'static str {
        "gemini-2.5-flash-preview-tts"
    }
}
