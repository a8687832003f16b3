//! # Configuration Management
//!
//! Loads and manages application configuration from multiple sources:
//! - TOML configuration files (config.toml)
//! - Environment variables (with APP_ prefix)
//! - Default values built into the code
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Environment variables (APP_SERVER_HOST, APP_SERVER_PORT, etc.)
//! 2. Configuration file (config.toml)
//! 3. Defaults (the pipeline constants live here as defaults)

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

use crate::speech::recognizer::{SILENCE_END_FRAMES, VOICE_START_FRAMES, VOICE_THRESHOLD};
use crate::speech::{SynthesisConfig, VadConfig};

/// Main application configuration containing all settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub audio: AudioConfig,
    pub synthesis: SynthConfig,
    pub performance: PerformanceConfig,
}

/// Server bind settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Voice activity detection tuning.
///
/// ## Fields:
/// - `voice_threshold`: RMS level above which a frame counts as voiced
/// - `voice_start_frames`: consecutive voiced frames opening an utterance (~20 ms each)
/// - `silence_end_frames`: silent frames closing an open utterance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    pub voice_threshold: f32,
    pub voice_start_frames: u32,
    pub silence_end_frames: u32,
}

/// Synthesis pacing settings.
///
/// ## Fields:
/// - `min_reply_secs`: floor on synthesized reply length
/// - `words_per_sec`: speaking-rate divisor for reply duration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthConfig {
    pub min_reply_secs: u32,
    pub words_per_sec: u32,
}

/// Capacity tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    pub max_concurrent_sessions: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            audio: AudioConfig {
                voice_threshold: VOICE_THRESHOLD,
                voice_start_frames: VOICE_START_FRAMES,
                silence_end_frames: SILENCE_END_FRAMES,
            },
            synthesis: SynthConfig {
                min_reply_secs: 2,
                words_per_sec: 3,
            },
            performance: PerformanceConfig {
                max_concurrent_sessions: 16,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, then `config.toml`, then `APP_*`
    /// environment variables, with `HOST`/`PORT` handled specially for
    /// deployment platforms.
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("_"));

        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if !(0.0..1.0).contains(&self.audio.voice_threshold) || self.audio.voice_threshold == 0.0 {
            return Err(anyhow::anyhow!(
                "Voice threshold must be within (0, 1), got {}",
                self.audio.voice_threshold
            ));
        }

        if self.audio.voice_start_frames == 0 {
            return Err(anyhow::anyhow!("Voice start frames must be greater than 0"));
        }

        if self.audio.silence_end_frames == 0 {
            return Err(anyhow::anyhow!("Silence end frames must be greater than 0"));
        }

        if self.synthesis.words_per_sec == 0 {
            return Err(anyhow::anyhow!("Words per second must be greater than 0"));
        }

        if self.performance.max_concurrent_sessions == 0 {
            return Err(anyhow::anyhow!("Max concurrent sessions must be greater than 0"));
        }

        Ok(())
    }

    /// Update configuration from a JSON string (runtime config updates).
    ///
    /// Partial updates are allowed: only the provided fields change, and the
    /// result is re-validated before it is accepted.
    pub fn update_from_json(&mut self, json_str: &str) -> Result<()> {
        let partial_config: serde_json::Value = serde_json::from_str(json_str)?;

        if let Some(server) = partial_config.get("server") {
            if let Some(host) = server.get("host").and_then(|v| v.as_str()) {
                self.server.host = host.to_string();
            }
            if let Some(port) = server.get("port").and_then(|v| v.as_u64()) {
                self.server.port = port as u16;
            }
        }

        if let Some(audio) = partial_config.get("audio") {
            if let Some(threshold) = audio.get("voice_threshold").and_then(|v| v.as_f64()) {
                self.audio.voice_threshold = threshold as f32;
            }
            if let Some(frames) = audio.get("voice_start_frames").and_then(|v| v.as_u64()) {
                self.audio.voice_start_frames = frames as u32;
            }
            if let Some(frames) = audio.get("silence_end_frames").and_then(|v| v.as_u64()) {
                self.audio.silence_end_frames = frames as u32;
            }
        }

        if let Some(synthesis) = partial_config.get("synthesis") {
            if let Some(secs) = synthesis.get("min_reply_secs").and_then(|v| v.as_u64()) {
                self.synthesis.min_reply_secs = secs as u32;
            }
            if let Some(rate) = synthesis.get("words_per_sec").and_then(|v| v.as_u64()) {
                self.synthesis.words_per_sec = rate as u32;
            }
        }

        if let Some(performance) = partial_config.get("performance") {
            if let Some(sessions) = performance
                .get("max_concurrent_sessions")
                .and_then(|v| v.as_u64())
            {
                self.performance.max_concurrent_sessions = sessions as usize;
            }
        }

        self.validate()?;
        Ok(())
    }

    /// VAD thresholds in the shape the recognizer consumes.
    pub fn vad_config(&self) -> VadConfig {
        VadConfig {
            voice_threshold: self.audio.voice_threshold,
            voice_start_frames: self.audio.voice_start_frames,
            silence_end_frames: self.audio.silence_end_frames,
        }
    }

    /// Synthesis pacing in the shape the synthesizer consumes.
    pub fn synthesis_config(&self) -> SynthesisConfig {
        SynthesisConfig {
            min_reply_secs: self.synthesis.min_reply_secs,
            words_per_sec: self.synthesis.words_per_sec,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.audio.voice_start_frames, 25);
        assert_eq!(config.audio.silence_end_frames, 15);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.audio.voice_threshold = 1.5;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.synthesis.words_per_sec = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_update() {
        let mut config = AppConfig::default();
        let json = r#"{"server": {"port": 9090}, "audio": {"voice_threshold": 0.05}}"#;
        assert!(config.update_from_json(json).is_ok());
        assert_eq!(config.server.port, 9090);
        assert!((config.audio.voice_threshold - 0.05).abs() < f32::EPSILON);
        // Untouched fields keep their values.
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.performance.max_concurrent_sessions, 16);
    }

    #[test]
    fn test_invalid_update_is_rejected() {
        let mut config = AppConfig::default();
        let json = r#"{"performance": {"max_concurrent_sessions": 0}}"#;
        assert!(config.update_from_json(json).is_err());
    }

    #[test]
    fn test_vad_config_mirrors_audio_section() {
        let config = AppConfig::default();
        let vad = config.vad_config();
        assert_eq!(vad.voice_threshold, config.audio.voice_threshold);
        assert_eq!(vad.voice_start_frames, config.audio.voice_start_frames);
    }
}
