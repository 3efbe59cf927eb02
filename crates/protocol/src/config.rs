use serde::{Deserialize, Serialize};

/// Upper bound on frame width and height, applied to the configured
/// capture size and to decoded relay frames. Keeps pixel index arithmetic
/// and raster allocations well inside range.
pub const MAX_FRAME_DIMENSION: u32 = 16_384;

/// Top-level configuration, shared by the client and the relay endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TintConfig {
    #[serde(default)]
    pub signaling: SignalingConfig,
    #[serde(default)]
    pub ice: IceConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub overlay: OverlayConfig,
}

/// Control-channel endpoint for the P2P signaling exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalingConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_signaling_port")]
    pub port: u16,
    #[serde(default = "default_ws_path")]
    pub ws_path: String,
}

impl SignalingConfig {
    pub fn url(&self) -> String {
        format!("ws://{}:{}{}", self.host, self.port, self.ws_path)
    }
}

/// STUN servers for WebRTC NAT traversal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IceConfig {
    #[serde(default = "default_stun_urls")]
    pub stun_urls: Vec<String>,
}

/// Relay endpoint for the server-relayed path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_relay_port")]
    pub port: u16,
    #[serde(default = "default_relay_path")]
    pub path: String,
    /// Maximum inbound WebSocket message size in bytes.
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,
}

impl RelayConfig {
    pub fn url(&self) -> String {
        format!("ws://{}:{}{}", self.host, self.port, self.path)
    }
}

/// Capture cadence and synthetic source geometry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Tick period in milliseconds.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    /// JPEG quality (1-100) for relay-path frame encoding.
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

impl CaptureConfig {
    pub fn interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.interval_ms)
    }
}

/// Rectangle overlay painted by the relay endpoint, sized as a proportion
/// of the frame dimensions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverlayConfig {
    #[serde(default = "default_proportion")]
    pub width_proportion: f32,
    #[serde(default = "default_proportion")]
    pub height_proportion: f32,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_signaling_port(),
            ws_path: default_ws_path(),
        }
    }
}

impl Default for IceConfig {
    fn default() -> Self {
        Self {
            stun_urls: default_stun_urls(),
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_relay_port(),
            path: default_relay_path(),
            max_message_bytes: default_max_message_bytes(),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            width: default_width(),
            height: default_height(),
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            width_proportion: default_proportion(),
            height_proportion: default_proportion(),
        }
    }
}

impl TintConfig {
    /// Validate the configuration, returning a list of issues found.
    ///
    /// Issues are prefixed with "ERROR:" (fatal, the process should not
    /// start) or "WARNING:" (advisory).
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut issues = Vec::new();

        if self.signaling.port == 0 {
            issues.push("ERROR: signaling.port must be between 1 and 65535, got 0.".to_string());
        }
        if !self.signaling.ws_path.starts_with('/') {
            issues.push(format!(
                "ERROR: signaling.ws_path '{}' must start with '/'.",
                self.signaling.ws_path
            ));
        }

        if self.relay.port == 0 {
            issues.push("ERROR: relay.port must be between 1 and 65535, got 0.".to_string());
        }
        if !self.relay.path.starts_with('/') {
            issues.push(format!(
                "ERROR: relay.path '{}' must start with '/'.",
                self.relay.path
            ));
        }
        if self.relay.max_message_bytes < 1024 {
            issues.push(format!(
                "ERROR: relay.max_message_bytes must be at least 1024, got {}. \
                 A single JPEG frame will not fit in smaller messages.",
                self.relay.max_message_bytes
            ));
        }

        if self.capture.interval_ms == 0 {
            issues.push("ERROR: capture.interval_ms must be at least 1, got 0.".to_string());
        }
        if self.capture.interval_ms < 16 {
            issues.push(format!(
                "WARNING: capture.interval_ms is {} ms ({}+ fps) — encoding at this \
                 rate may saturate a CPU core. Typical values: 33-200 ms.",
                self.capture.interval_ms,
                1000 / self.capture.interval_ms.max(1)
            ));
        }
        if self.capture.width == 0 || self.capture.height == 0 {
            issues.push(format!(
                "ERROR: capture dimensions must be nonzero, got {}x{}.",
                self.capture.width, self.capture.height
            ));
        }
        if self.capture.width > MAX_FRAME_DIMENSION || self.capture.height > MAX_FRAME_DIMENSION {
            issues.push(format!(
                "ERROR: capture dimensions must be at most {MAX_FRAME_DIMENSION}x{MAX_FRAME_DIMENSION}, got {}x{}.",
                self.capture.width, self.capture.height
            ));
        }
        if self.capture.jpeg_quality == 0 || self.capture.jpeg_quality > 100 {
            issues.push(format!(
                "ERROR: capture.jpeg_quality must be between 1 and 100, got {}.",
                self.capture.jpeg_quality
            ));
        }

        for (name, value) in [
            ("overlay.width_proportion", self.overlay.width_proportion),
            ("overlay.height_proportion", self.overlay.height_proportion),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                issues.push(format!(
                    "ERROR: {} must be in (0.0, 1.0], got {}.",
                    name, value
                ));
            }
        }

        for url in &self.ice.stun_urls {
            if !url.starts_with("stun:") && !url.starts_with("stuns:") {
                issues.push(format!(
                    "ERROR: STUN URL '{}' must start with 'stun:' or 'stuns:'. \
                     Example: stun:stun.l.google.com:19302",
                    url
                ));
            }
        }

        if issues.is_empty() { Ok(()) } else { Err(issues) }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_signaling_port() -> u16 {
    8080
}
fn default_ws_path() -> String {
    "/ws".to_string()
}
fn default_relay_port() -> u16 {
    8000
}
fn default_relay_path() -> String {
    "/".to_string()
}
fn default_max_message_bytes() -> usize {
    10 * 1024 * 1024
}
fn default_interval_ms() -> u64 {
    100
}
fn default_width() -> u32 {
    640
}
fn default_height() -> u32 {
    480
}
fn default_jpeg_quality() -> u8 {
    80
}
fn default_proportion() -> f32 {
    0.3
}
fn default_stun_urls() -> Vec<String> {
    vec![
        "stun:stun.l.google.com:19302".to_string(),
        "stun:stun1.l.google.com:19302".to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_from_empty_string() {
        let config: TintConfig =
            toml::from_str("").expect("empty string should deserialize to default config");

        assert_eq!(config.signaling.host, "127.0.0.1");
        assert_eq!(config.signaling.port, 8080);
        assert_eq!(config.signaling.ws_path, "/ws");
        assert_eq!(config.ice.stun_urls.len(), 2);
        assert_eq!(config.relay.host, "127.0.0.1");
        assert_eq!(config.relay.port, 8000);
        assert_eq!(config.relay.path, "/");
        assert_eq!(config.relay.max_message_bytes, 10 * 1024 * 1024);
        assert_eq!(config.capture.interval_ms, 100);
        assert_eq!(config.capture.width, 640);
        assert_eq!(config.capture.height, 480);
        assert_eq!(config.capture.jpeg_quality, 80);
        assert_eq!(config.overlay.width_proportion, 0.3);
        assert_eq!(config.overlay.height_proportion, 0.3);
    }

    #[test]
    fn partial_config_only_capture_section() {
        let config: TintConfig = toml::from_str(
            r#"
[capture]
interval_ms = 33
width = 1280
"#,
        )
        .expect("partial config should deserialize");

        assert_eq!(config.capture.interval_ms, 33);
        assert_eq!(config.capture.width, 1280);
        // Remaining fields use defaults
        assert_eq!(config.capture.height, 480);
        assert_eq!(config.capture.jpeg_quality, 80);
        assert_eq!(config.signaling.port, 8080);
    }

    #[test]
    fn endpoint_urls() {
        let config = TintConfig::default();
        assert_eq!(config.signaling.url(), "ws://127.0.0.1:8080/ws");
        assert_eq!(config.relay.url(), "ws://127.0.0.1:8000/");
    }

    #[test]
    fn default_trait_matches_empty_toml() {
        let from_toml: TintConfig = toml::from_str("").unwrap();
        let from_default = TintConfig::default();
        assert_eq!(from_default.signaling.port, from_toml.signaling.port);
        assert_eq!(from_default.signaling.ws_path, from_toml.signaling.ws_path);
        assert_eq!(from_default.ice.stun_urls, from_toml.ice.stun_urls);
        assert_eq!(from_default.relay.port, from_toml.relay.port);
        assert_eq!(from_default.capture.interval_ms, from_toml.capture.interval_ms);
        assert_eq!(
            from_default.overlay.width_proportion,
            from_toml.overlay.width_proportion
        );
    }

    #[test]
    fn validate_default_config_passes() {
        assert!(TintConfig::default().validate().is_ok());
    }

    fn issues_of(config: &TintConfig) -> Vec<String> {
        match config.validate() {
            Ok(()) => vec![],
            Err(issues) => issues,
        }
    }

    fn has_error(issues: &[String], substring: &str) -> bool {
        issues
            .iter()
            .any(|i| i.starts_with("ERROR:") && i.contains(substring))
    }

    #[test]
    fn validate_zero_ports() {
        let mut config = TintConfig::default();
        config.signaling.port = 0;
        config.relay.port = 0;
        let issues = issues_of(&config);
        assert!(has_error(&issues, "signaling.port"));
        assert!(has_error(&issues, "relay.port"));
    }

    #[test]
    fn validate_paths_must_be_absolute() {
        let mut config = TintConfig::default();
        config.signaling.ws_path = "ws".to_string();
        config.relay.path = "relay".to_string();
        let issues = issues_of(&config);
        assert!(has_error(&issues, "signaling.ws_path"));
        assert!(has_error(&issues, "relay.path"));
    }

    #[test]
    fn validate_interval_zero_is_error() {
        let mut config = TintConfig::default();
        config.capture.interval_ms = 0;
        assert!(has_error(&issues_of(&config), "interval_ms"));
    }

    #[test]
    fn validate_fast_interval_is_warning_only() {
        let mut config = TintConfig::default();
        config.capture.interval_ms = 10;
        let issues = issues_of(&config);
        assert!(!issues.iter().any(|i| i.starts_with("ERROR:")));
        assert!(issues.iter().any(|i| i.starts_with("WARNING:")));
    }

    #[test]
    fn validate_oversized_capture_dimensions() {
        let mut config = TintConfig::default();
        config.capture.width = MAX_FRAME_DIMENSION + 1;
        assert!(has_error(&issues_of(&config), "at most"));
        config.capture.width = MAX_FRAME_DIMENSION;
        config.capture.height = MAX_FRAME_DIMENSION;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_jpeg_quality_bounds() {
        let mut config = TintConfig::default();
        config.capture.jpeg_quality = 0;
        assert!(has_error(&issues_of(&config), "jpeg_quality"));
        config.capture.jpeg_quality = 101;
        assert!(has_error(&issues_of(&config), "jpeg_quality"));
        config.capture.jpeg_quality = 100;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_overlay_proportions() {
        let mut config = TintConfig::default();
        config.overlay.width_proportion = 0.0;
        assert!(has_error(&issues_of(&config), "width_proportion"));
        config.overlay.width_proportion = 1.0;
        config.overlay.height_proportion = 1.5;
        let issues = issues_of(&config);
        assert!(!has_error(&issues, "width_proportion"));
        assert!(has_error(&issues, "height_proportion"));
    }

    #[test]
    fn validate_stun_url_prefix() {
        let mut config = TintConfig::default();
        config.ice.stun_urls = vec!["http://stun.example.com:3478".to_string()];
        assert!(has_error(&issues_of(&config), "STUN URL"));
        config.ice.stun_urls = vec!["stuns:stun.example.com:5349".to_string()];
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_max_message_bytes_floor() {
        let mut config = TintConfig::default();
        config.relay.max_message_bytes = 512;
        assert!(has_error(&issues_of(&config), "max_message_bytes"));
    }
}
