use serde::{Deserialize, Serialize};

/// The five editing operations the studio offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationKind {
    Enhance,
    Expand,
    RemoveBackground,
    Mockup,
    Merge,
}

impl OperationKind {
    pub fn from_key(key: &str) -> Option<Self> {
        match key.trim().to_ascii_lowercase().as_str() {
            "enhance" => Some(Self::Enhance),
            "expand" => Some(Self::Expand),
            "remove-background" | "remove-bg" => Some(Self::RemoveBackground),
            "mockup" => Some(Self::Mockup),
            "merge" => Some(Self::Merge),
            _ => None,
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            Self::Enhance => "enhance",
            Self::Expand => "expand",
            Self::RemoveBackground => "remove-background",
            Self::Mockup => "mockup",
            Self::Merge => "merge",
        }
    }

    pub const ALL: [Self; 5] = [
        Self::Enhance,
        Self::Expand,
        Self::RemoveBackground,
        Self::Mockup,
        Self::Merge,
    ];
}

/// Enhancement style. Unknown keys resolve to `Auto`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnhanceStyle {
    #[default]
    Auto,
    Upscale,
    Lighting,
    Sharpen,
    Artistic,
    Restore,
    Colorize,
}

impl EnhanceStyle {
    pub fn from_key(key: &str) -> Self {
        match key.trim().to_ascii_lowercase().as_str() {
            "upscale" => Self::Upscale,
            "lighting" => Self::Lighting,
            "sharpen" => Self::Sharpen,
            "artistic" => Self::Artistic,
            "restore" => Self::Restore,
            "colorize" => Self::Colorize,
            _ => Self::Auto,
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Upscale => "upscale",
            Self::Lighting => "lighting",
            Self::Sharpen => "sharpen",
            Self::Artistic => "artistic",
            Self::Restore => "restore",
            Self::Colorize => "colorize",
        }
    }
}

/// Output resolution tier for enhancement. Unknown keys resolve to `Hd`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnhanceQuality {
    #[default]
    Hd,
    #[serde(rename = "4k")]
    FourK,
    #[serde(rename = "8k")]
    EightK,
}

impl EnhanceQuality {
    pub fn from_key(key: &str) -> Self {
        match key.trim().to_ascii_lowercase().as_str() {
            "4k" => Self::FourK,
            "8k" => Self::EightK,
            _ => Self::Hd,
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            Self::Hd => "hd",
            Self::FourK => "4k",
            Self::EightK => "8k",
        }
    }
}

/// Resolution tier for expansion. `Same` keeps the original quality and is
/// also where unknown keys land.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpandQuality {
    #[default]
    Same,
    Hd,
    #[serde(rename = "4k")]
    FourK,
    #[serde(rename = "8k")]
    EightK,
}

impl ExpandQuality {
    pub fn from_key(key: &str) -> Self {
        match key.trim().to_ascii_lowercase().as_str() {
            "hd" => Self::Hd,
            "4k" => Self::FourK,
            "8k" => Self::EightK,
            _ => Self::Same,
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            Self::Same => "same",
            Self::Hd => "hd",
            Self::FourK => "4k",
            Self::EightK => "8k",
        }
    }
}

/// Target canvas shape for expansion. Anything that is not `original` is
/// carried through verbatim as a named ratio such as `16:9`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AspectRatio {
    Original,
    Named(String),
}

impl AspectRatio {
    pub fn from_key(key: &str) -> Self {
        let trimmed = key.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("original") {
            Self::Original
        } else {
            Self::Named(trimmed.to_string())
        }
    }

    pub fn key(&self) -> &str {
        match self {
            Self::Original => "original",
            Self::Named(name) => name.as_str(),
        }
    }
}

impl Default for AspectRatio {
    fn default() -> Self {
        Self::Original
    }
}

impl From<String> for AspectRatio {
    fn from(value: String) -> Self {
        Self::from_key(&value)
    }
}

impl From<AspectRatio> for String {
    fn from(value: AspectRatio) -> Self {
        value.key().to_string()
    }
}

/// What background removal keeps. Unknown keys resolve to `Strict`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalMode {
    #[default]
    Strict,
    Standard,
    Custom,
}

impl RemovalMode {
    pub fn from_key(key: &str) -> Self {
        match key.trim().to_ascii_lowercase().as_str() {
            "standard" => Self::Standard,
            "custom" => Self::Custom,
            _ => Self::Strict,
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::Standard => "standard",
            Self::Custom => "custom",
        }
    }
}

/// Scene theme for mockup composition. Unknown keys resolve to `ModernStudio`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MockupTheme {
    #[default]
    ModernStudio,
    Podium,
    Luxury,
    Nature,
    LifestyleHome,
    Cyberpunk,
    Water,
}

impl MockupTheme {
    pub fn from_key(key: &str) -> Self {
        match key.trim().to_ascii_lowercase().as_str() {
            "podium" => Self::Podium,
            "luxury" => Self::Luxury,
            "nature" => Self::Nature,
            "lifestyle_home" => Self::LifestyleHome,
            "cyberpunk" => Self::Cyberpunk,
            "water" => Self::Water,
            _ => Self::ModernStudio,
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            Self::ModernStudio => "modern_studio",
            Self::Podium => "podium",
            Self::Luxury => "luxury",
            Self::Nature => "nature",
            Self::LifestyleHome => "lifestyle_home",
            Self::Cyberpunk => "cyberpunk",
            Self::Water => "water",
        }
    }
}

/// Whether a merge swaps the reference's subject out or composes into free
/// space. Unknown keys resolve to `Replace`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeMode {
    #[default]
    Replace,
    Place,
}

impl MergeMode {
    pub fn from_key(key: &str) -> Self {
        match key.trim().to_ascii_lowercase().as_str() {
            "place" => Self::Place,
            _ => Self::Replace,
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            Self::Replace => "replace",
            Self::Place => "place",
        }
    }
}

/// A fully-specified edit submission: exactly one operation kind with the
/// parameters that kind understands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum OperationRequest {
    Enhance {
        style: EnhanceStyle,
        quality: EnhanceQuality,
    },
    Expand {
        prompt: String,
        ratio: AspectRatio,
        quality: ExpandQuality,
    },
    RemoveBackground {
        mode: RemovalMode,
        prompt: String,
        enhance_subject: bool,
    },
    Mockup {
        theme: MockupTheme,
        prompt: String,
    },
    Merge {
        mode: MergeMode,
        prompt: String,
    },
}

impl OperationRequest {
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::Enhance { .. } => OperationKind::Enhance,
            Self::Expand { .. } => OperationKind::Expand,
            Self::RemoveBackground { .. } => OperationKind::RemoveBackground,
            Self::Mockup { .. } => OperationKind::Mockup,
            Self::Merge { .. } => OperationKind::Merge,
        }
    }

    /// Merge is the only dual-image operation.
    pub fn needs_reference(&self) -> bool {
        matches!(self, Self::Merge { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_option_keys_resolve_to_documented_defaults() {
        assert_eq!(EnhanceStyle::from_key("vivid"), EnhanceStyle::Auto);
        assert_eq!(EnhanceQuality::from_key("16k"), EnhanceQuality::Hd);
        assert_eq!(ExpandQuality::from_key("ultra"), ExpandQuality::Same);
        assert_eq!(RemovalMode::from_key("loose"), RemovalMode::Strict);
        assert_eq!(MockupTheme::from_key("space"), MockupTheme::ModernStudio);
        assert_eq!(MergeMode::from_key("overlay"), MergeMode::Replace);
    }

    #[test]
    fn known_keys_round_trip() {
        for key in ["auto", "upscale", "lighting", "sharpen", "artistic", "restore", "colorize"] {
            assert_eq!(EnhanceStyle::from_key(key).key(), key);
        }
        for key in ["hd", "4k", "8k"] {
            assert_eq!(EnhanceQuality::from_key(key).key(), key);
        }
        for key in ["same", "hd", "4k", "8k"] {
            assert_eq!(ExpandQuality::from_key(key).key(), key);
        }
        for key in [
            "modern_studio",
            "podium",
            "luxury",
            "nature",
            "lifestyle_home",
            "cyberpunk",
            "water",
        ] {
            assert_eq!(MockupTheme::from_key(key).key(), key);
        }
    }

    #[test]
    fn aspect_ratio_keeps_named_ratios_verbatim() {
        assert_eq!(AspectRatio::from_key("original"), AspectRatio::Original);
        assert_eq!(AspectRatio::from_key(" Original "), AspectRatio::Original);
        assert_eq!(AspectRatio::from_key(""), AspectRatio::Original);
        assert_eq!(
            AspectRatio::from_key("16:9"),
            AspectRatio::Named("16:9".to_string())
        );
        assert_eq!(AspectRatio::from_key("21:9").key(), "21:9");
    }

    #[test]
    fn operation_kind_keys_parse_back() {
        for kind in OperationKind::ALL {
            assert_eq!(OperationKind::from_key(kind.key()), Some(kind));
        }
        assert_eq!(
            OperationKind::from_key("remove-bg"),
            Some(OperationKind::RemoveBackground)
        );
        assert_eq!(OperationKind::from_key("collage"), None);
    }

    #[test]
    fn only_merge_needs_a_reference() {
        let merge = OperationRequest::Merge {
            mode: MergeMode::Replace,
            prompt: String::new(),
        };
        let enhance = OperationRequest::Enhance {
            style: EnhanceStyle::Auto,
            quality: EnhanceQuality::Hd,
        };
        assert!(merge.needs_reference());
        assert!(!enhance.needs_reference());
        assert_eq!(merge.kind(), OperationKind::Merge);
        assert_eq!(enhance.kind().key(), "enhance");
    }

    #[test]
    fn request_serializes_with_kind_tag() {
        let request = OperationRequest::RemoveBackground {
            mode: RemovalMode::Custom,
            prompt: "the red sneaker".to_string(),
            enhance_subject: true,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["kind"], "remove-background");
        assert_eq!(value["mode"], "custom");
        assert_eq!(value["enhance_subject"], true);
    }
}
