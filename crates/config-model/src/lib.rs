use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Result, anyhow, ensure};
use palette::Srgb;
use serde::Deserialize;
use serde::de::{self, Deserializer};

pub use patch::{ConfigPatch, PaddingPatch, PlaybackPatch, RenderPatch};
pub use screen::{PlaceholderColorsConfig, ScreenMessageConfig};

/// Upper bound accepted for `padding.blur-amount`.
pub const BLUR_AMOUNT_MAX: f32 = 1000.0;

/// Upper bound accepted for `playback.slide-duration-s`, roughly 31 years.
pub const SLIDE_DURATION_MAX_S: f64 = 1e9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RenderMode {
    Cover,
    #[default]
    Contain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PaddingStyle {
    Solid,
    #[default]
    Blur,
    Average,
    Mirror,
    Stretch,
    #[serde(alias = "gradient_linear")]
    GradientLinear,
    #[serde(alias = "gradient_radial")]
    GradientRadial,
    Glass,
    Motion,
    Texture,
    Dim,
}

impl PaddingStyle {
    pub const ALL: [Self; 11] = [
        Self::Solid,
        Self::Blur,
        Self::Average,
        Self::Mirror,
        Self::Stretch,
        Self::GradientLinear,
        Self::GradientRadial,
        Self::Glass,
        Self::Motion,
        Self::Texture,
        Self::Dim,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Solid => "solid",
            Self::Blur => "blur",
            Self::Average => "average",
            Self::Mirror => "mirror",
            Self::Stretch => "stretch",
            Self::GradientLinear => "gradient-linear",
            Self::GradientRadial => "gradient-radial",
            Self::Glass => "glass",
            Self::Motion => "motion",
            Self::Texture => "texture",
            Self::Dim => "dim",
        }
    }
}

impl fmt::Display for PaddingStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An sRGB color written as `#abc` or `#aabbcc`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct HexColor(pub [u8; 3]);

impl HexColor {
    pub const BLACK: Self = Self([0, 0, 0]);
    pub const WHITE: Self = Self([255, 255, 255]);
}

impl FromStr for HexColor {
    type Err = anyhow::Error;

    fn from_str(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        let digits = trimmed.strip_prefix('#').unwrap_or(trimmed);
        ensure!(
            matches!(digits.len(), 3 | 6) && digits.chars().all(|c| c.is_ascii_hexdigit()),
            "color {input:?} must be a 3- or 6-digit hex string"
        );
        let rgb = Srgb::<u8>::from_str(trimmed).map_err(|err| anyhow!("color {input:?}: {err}"))?;
        Ok(Self([rgb.red, rgb.green, rgb.blue]))
    }
}

impl fmt::Display for HexColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [r, g, b] = self.0;
        write!(f, "#{r:02x}{g:02x}{b:02x}")
    }
}

impl<'de> Deserialize<'de> for HexColor {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct PaddingConfig {
    pub style: PaddingStyle,
    pub color: HexColor,
    #[serde(alias = "blur_amount")]
    pub blur_amount: f32,
}

impl Default for PaddingConfig {
    fn default() -> Self {
        Self {
            style: PaddingStyle::default(),
            color: HexColor::BLACK,
            blur_amount: Self::default_blur_amount(),
        }
    }
}

impl PaddingConfig {
    const fn default_blur_amount() -> f32 {
        28.0
    }

    /// Blur radius actually used by the composer, whatever made it past validation.
    pub fn effective_blur_radius(&self) -> f32 {
        if self.blur_amount.is_finite() {
            self.blur_amount.clamp(1.0, 100.0)
        } else {
            Self::default_blur_amount()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct RenderConfig {
    pub mode: RenderMode,
    pub padding: PaddingConfig,
}

impl RenderConfig {
    pub fn validate(&self, prefix: &str) -> Result<()> {
        validate_blur_amount(self.padding.blur_amount, prefix)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct PlaybackConfig {
    #[serde(alias = "slide_duration_s")]
    pub slide_duration_s: f64,
    pub shuffle: bool,
    #[serde(rename = "loop")]
    pub loop_playlist: bool,
    #[serde(alias = "crossfade_ms")]
    pub crossfade_ms: u64,
    #[serde(alias = "resume_on_start")]
    pub resume_on_start: bool,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            slide_duration_s: 12.0,
            shuffle: true,
            loop_playlist: true,
            crossfade_ms: 350,
            resume_on_start: true,
        }
    }
}

impl PlaybackConfig {
    /// Hold time per image; out-of-range values saturate to the accepted maximum.
    pub fn slide_duration(&self) -> Duration {
        Duration::try_from_secs_f64(self.slide_duration_s.min(SLIDE_DURATION_MAX_S))
            .unwrap_or(Duration::from_secs(SLIDE_DURATION_MAX_S as u64))
    }

    pub fn crossfade(&self) -> Duration {
        Duration::from_millis(self.crossfade_ms)
    }

    pub fn validate(&self, prefix: &str) -> Result<()> {
        validate_slide_duration(self.slide_duration_s, prefix)
    }
}

/// The render and playback settings the display thread reads on every tick.
///
/// Snapshots are immutable; an update produces a new value that replaces the old
/// one wholesale.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LiveSettings {
    pub render: RenderConfig,
    pub playback: PlaybackConfig,
}

impl LiveSettings {
    pub fn new(render: RenderConfig, playback: PlaybackConfig) -> Self {
        Self { render, playback }
    }

    /// Validate `patch` and return a copy of `self` with the present fields replaced.
    pub fn merged(&self, patch: &ConfigPatch) -> Result<Self> {
        patch.validate()?;
        let mut next = self.clone();
        if let Some(render) = &patch.render {
            render.apply(&mut next.render);
        }
        if let Some(playback) = &patch.playback {
            playback.apply(&mut next.playback);
        }
        Ok(next)
    }
}

fn validate_blur_amount(value: f32, prefix: &str) -> Result<()> {
    ensure!(
        value.is_finite() && (0.0..=BLUR_AMOUNT_MAX).contains(&value),
        "{}.padding.blur-amount must be within [0, {}]",
        prefix,
        BLUR_AMOUNT_MAX
    );
    Ok(())
}

fn validate_slide_duration(value: f64, prefix: &str) -> Result<()> {
    ensure!(
        value.is_finite() && value > 0.0 && value <= SLIDE_DURATION_MAX_S,
        "{}.slide-duration-s must be within (0, {}]",
        prefix,
        SLIDE_DURATION_MAX_S
    );
    Ok(())
}

mod patch {
    use super::*;

    #[derive(Debug, Clone, Default, PartialEq, Deserialize)]
    #[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
    pub struct PaddingPatch {
        pub style: Option<PaddingStyle>,
        pub color: Option<HexColor>,
        #[serde(alias = "blur_amount")]
        pub blur_amount: Option<f32>,
    }

    #[derive(Debug, Clone, Default, PartialEq, Deserialize)]
    #[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
    pub struct RenderPatch {
        pub mode: Option<RenderMode>,
        pub padding: Option<PaddingPatch>,
    }

    #[derive(Debug, Clone, Default, PartialEq, Deserialize)]
    #[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
    pub struct PlaybackPatch {
        #[serde(alias = "slide_duration_s")]
        pub slide_duration_s: Option<f64>,
        pub shuffle: Option<bool>,
        #[serde(rename = "loop")]
        pub loop_playlist: Option<bool>,
        #[serde(alias = "crossfade_ms")]
        pub crossfade_ms: Option<u64>,
        #[serde(alias = "resume_on_start")]
        pub resume_on_start: Option<bool>,
    }

    /// A partial `{render, playback}` update. Absent fields keep their current value.
    #[derive(Debug, Clone, Default, PartialEq, Deserialize)]
    #[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
    pub struct ConfigPatch {
        pub render: Option<RenderPatch>,
        pub playback: Option<PlaybackPatch>,
    }

    impl ConfigPatch {
        pub fn is_empty(&self) -> bool {
            self.render.is_none() && self.playback.is_none()
        }

        pub fn validate(&self) -> Result<()> {
            if let Some(blur) = self
                .render
                .as_ref()
                .and_then(|render| render.padding.as_ref())
                .and_then(|padding| padding.blur_amount)
            {
                validate_blur_amount(blur, "render")?;
            }
            if let Some(seconds) = self
                .playback
                .as_ref()
                .and_then(|playback| playback.slide_duration_s)
            {
                validate_slide_duration(seconds, "playback")?;
            }
            Ok(())
        }
    }

    impl RenderPatch {
        pub(crate) fn apply(&self, target: &mut RenderConfig) {
            if let Some(mode) = self.mode {
                target.mode = mode;
            }
            if let Some(padding) = &self.padding {
                if let Some(style) = padding.style {
                    target.padding.style = style;
                }
                if let Some(color) = padding.color {
                    target.padding.color = color;
                }
                if let Some(amount) = padding.blur_amount {
                    target.padding.blur_amount = amount;
                }
            }
        }
    }

    impl PlaybackPatch {
        pub(crate) fn apply(&self, target: &mut PlaybackConfig) {
            if let Some(seconds) = self.slide_duration_s {
                target.slide_duration_s = seconds;
            }
            if let Some(shuffle) = self.shuffle {
                target.shuffle = shuffle;
            }
            if let Some(loop_playlist) = self.loop_playlist {
                target.loop_playlist = loop_playlist;
            }
            if let Some(ms) = self.crossfade_ms {
                target.crossfade_ms = ms;
            }
            if let Some(resume) = self.resume_on_start {
                target.resume_on_start = resume;
            }
        }
    }
}

mod screen {
    use super::*;

    #[derive(Debug, Clone, Deserialize)]
    #[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
    pub struct PlaceholderColorsConfig {
        pub background: HexColor,
        pub font: HexColor,
    }

    impl Default for PlaceholderColorsConfig {
        fn default() -> Self {
            Self {
                background: HexColor::BLACK,
                font: HexColor([0xdd, 0xdd, 0xdd]),
            }
        }
    }

    /// Text shown while the library has nothing eligible to display.
    #[derive(Debug, Clone, Deserialize, Default)]
    #[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
    pub struct ScreenMessageConfig {
        pub message: Option<String>,
        pub font: Option<String>,
        pub font_size: Option<f32>,
        pub colors: PlaceholderColorsConfig,
    }

    impl ScreenMessageConfig {
        const DEFAULT_FONT_SIZE_PX: f32 = 36.0;

        pub fn message_or<'a>(&'a self, fallback: &'a str) -> Cow<'a, str> {
            match &self.message {
                Some(msg) if !msg.trim().is_empty() => Cow::Borrowed(msg.as_str()),
                _ => Cow::Borrowed(fallback),
            }
        }

        pub fn effective_font_size(&self) -> f32 {
            self.font_size
                .filter(|value| value.is_finite() && *value > 0.0)
                .unwrap_or(Self::DEFAULT_FONT_SIZE_PX)
        }

        pub fn validate(&self, prefix: &str) -> Result<()> {
            if let Some(size) = self.font_size {
                ensure!(
                    size.is_finite() && size > 0.0,
                    "{}.font-size must be positive",
                    prefix
                );
            }
            if let Some(font_name) = &self.font {
                ensure!(
                    !font_name.trim().is_empty(),
                    "{}.font must not be blank when provided",
                    prefix
                );
            }
            Ok(())
        }
    }
}
