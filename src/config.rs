//! Configuration types for the avatar engine.

use crate::scene::procedural::ProceduralStyle;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration for the avatar engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VisageConfig {
    /// Audio capture settings.
    pub audio: AudioConfig,
    /// Amplitude analysis and voice activity detection settings.
    pub analyzer: AnalyzerConfig,
    /// Facial expression timing and intensities.
    pub animation: AnimationConfig,
    /// Scene, camera and frame loop settings.
    pub scene: SceneConfig,
}

/// Audio capture configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Input device name (None = system default).
    pub input_device: Option<String>,
    /// Capacity of the block queue between the audio callback and the analyzer.
    pub queue_depth: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            input_device: None,
            queue_depth: 32,
        }
    }
}

/// Amplitude analyzer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// RMS threshold on a 0..1 scale above which a block counts as speech.
    ///
    /// Typical values for f32 samples in \[-1, 1\]:
    ///   - 0.01: sensitive (quiet rooms)
    ///   - 0.02: normal (default)
    ///   - 0.05: only loud/close speech
    pub threshold: f32,
    /// Smoothing factor applied when the level rises (0 = frozen, 1 = raw).
    pub attack: f32,
    /// Smoothing factor applied when the level falls.
    pub release: f32,
    /// FFT window for the spectral band split. Must be a power of two.
    pub fft_size: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            threshold: 0.02,
            attack: 0.6,
            release: 0.2,
            fft_size: 256,
        }
    }
}

/// Expression animation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimationConfig {
    /// Shortest pause between blinks in seconds.
    pub blink_min_interval: f64,
    /// Longest pause between blinks in seconds.
    pub blink_max_interval: f64,
    /// Duration of one blink in seconds.
    pub blink_duration: f64,
    /// Angular rate of the synthetic mouth oscillation.
    pub speech_rate: f64,
    /// Peak mouth opening of the synthetic oscillation.
    pub speech_intensity: f32,
    /// jawOpen as a fraction of mouthOpen.
    pub jaw_coupling: f32,
    /// Multiplier from analyzer level to mouthOpen.
    pub amplitude_gain: f32,
    /// mouthSmile held while listening.
    pub listening_smile: f32,
    /// eyeWide held while listening.
    pub listening_eye_wide: f32,
    /// Mid-band magnitude above which speech raises mouthSmile.
    pub band_smile_threshold: f32,
    /// Multiplier from mid-band magnitude to mouthSmile.
    pub band_smile_gain: f32,
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            blink_min_interval: 3.0,
            blink_max_interval: 5.0,
            blink_duration: 0.15,
            speech_rate: 10.0,
            speech_intensity: 0.7,
            jaw_coupling: 0.5,
            amplitude_gain: 2.0,
            listening_smile: 0.3,
            listening_eye_wide: 0.2,
            band_smile_threshold: 0.3,
            band_smile_gain: 0.3,
        }
    }
}

/// Scene and frame loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// Initial surface width in pixels.
    pub width: u32,
    /// Initial surface height in pixels. Zero falls back to 360.
    pub height: u32,
    /// Vertical field of view in degrees.
    pub fov_degrees: f32,
    /// Background colour as 0xRRGGBB.
    pub background: u32,
    /// Built-in avatar shown until a model is loaded.
    pub avatar: ProceduralStyle,
    /// Enables orbit controls and keyboard movement.
    pub enable_controls: bool,
    /// Keyboard movement per frame in world units.
    pub move_speed: f32,
    /// Target frames per second for the frame loop.
    pub frame_rate: u32,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 360,
            fov_degrees: 45.0,
            background: 0xffffff,
            avatar: ProceduralStyle::Default,
            enable_controls: false,
            move_speed: 0.05,
            frame_rate: 60,
        }
    }
}

impl VisageConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::error::VisageError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::VisageError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `~/.config/visage/config.toml`.
    pub fn default_config_path() -> PathBuf {
        if let Some(config) = std::env::var_os("XDG_CONFIG_HOME") {
            PathBuf::from(config).join("visage").join("config.toml")
        } else if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join("visage")
                .join("config.toml")
        } else {
            PathBuf::from("/tmp/visage-config/config.toml")
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = VisageConfig::default();
        assert!(config.analyzer.threshold > 0.0);
        assert!(config.analyzer.fft_size.is_power_of_two());
        assert!(config.animation.blink_min_interval <= config.animation.blink_max_interval);
        assert!(config.animation.blink_duration > 0.0);
        assert!(config.animation.jaw_coupling > 0.0 && config.animation.jaw_coupling <= 1.0);
        assert!(config.scene.frame_rate > 0);
        assert!(config.audio.queue_depth > 0);
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = VisageConfig::default();
        config.analyzer.threshold = 0.05;
        config.scene.avatar = ProceduralStyle::Robot;
        config.audio.input_device = Some("USB Mic".to_owned());

        config.save_to_file(&path).unwrap();
        assert!(path.exists());

        let loaded = VisageConfig::from_file(&path).unwrap();
        assert!((loaded.analyzer.threshold - 0.05).abs() < f32::EPSILON);
        assert_eq!(loaded.scene.avatar, ProceduralStyle::Robot);
        assert_eq!(loaded.audio.input_device.as_deref(), Some("USB Mic"));
    }

    #[test]
    fn from_file_nonexistent_returns_error() {
        let result = VisageConfig::from_file(std::path::Path::new("/nonexistent/path/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn from_file_invalid_toml_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "this is not valid toml {{{").unwrap();

        let result = VisageConfig::from_file(&path);
        assert!(matches!(result, Err(crate::error::VisageError::Config(_))));
    }

    #[test]
    fn partial_section_uses_defaults() {
        let toml_str = r#"
[animation]
blink_duration = 0.2
"#;
        let config: VisageConfig = toml::from_str(toml_str).unwrap();
        assert!((config.animation.blink_duration - 0.2).abs() < f64::EPSILON);
        assert!((config.animation.speech_intensity - 0.7).abs() < f32::EPSILON);
        assert!((config.analyzer.threshold - 0.02).abs() < f32::EPSILON);
    }

    #[test]
    fn avatar_style_deserializes_lowercase() {
        let config: VisageConfig = toml::from_str("[scene]\navatar = \"cat\"").unwrap();
        assert_eq!(config.scene.avatar, ProceduralStyle::Cat);
    }

    #[test]
    fn default_config_path_ends_with_config_toml() {
        let path = VisageConfig::default_config_path();
        let path_str = path.to_string_lossy();
        assert!(path_str.ends_with("config.toml"));
        assert!(path_str.contains("visage"));
    }
}
