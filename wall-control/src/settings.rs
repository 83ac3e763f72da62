use crate::camera::Manufacturer;
use crate::camera_registry::RegistryDefaults;
use crate::command_watcher::DEFAULT_POLL_INTERVAL;
use crate::error::ConfigurationError;
use crate::onvif_stream_uri::{StreamType, TransportProtocol};
use crate::video_wall::{UriSource, WallOptions};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// JSON settings file. Every field is optional except the two file paths,
/// which may also come from the command line.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub camera_file: Option<PathBuf>,
    /// Defaults to the camera file with an `.xsd` extension.
    pub schema_file: Option<PathBuf>,
    pub default_manufacturer: String,
    pub default_stream: u32,
    pub default_username: String,
    pub default_password: String,
    pub command_file: Option<PathBuf>,
    pub poll_interval_ms: u64,
    pub opc_enable: bool,
    pub opc_endpoint: String,
    pub tag_path: String,
    pub publish_interval_ms: u64,
    pub onvif_port: u16,
    pub request_timeout_ms: u64,
    pub uri_source: UriSource,
    pub stream_transport: TransportProtocol,
    pub stream_type: StreamType,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            camera_file: None,
            schema_file: None,
            default_manufacturer: "Bosch".to_string(),
            default_stream: 1,
            default_username: String::new(),
            default_password: String::new(),
            command_file: None,
            poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
            opc_enable: false,
            opc_endpoint: "opc.tcp://localhost:4840".to_string(),
            tag_path: "VideoWall".to_string(),
            publish_interval_ms: 1000,
            onvif_port: 80,
            request_timeout_ms: 3000,
            uri_source: UriSource::Manufacturer,
            stream_transport: TransportProtocol::Rtsp,
            stream_type: StreamType::RtpUnicast,
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self, ConfigurationError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigurationError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text, path)
    }

    pub fn parse(json: &str, path: &Path) -> Result<Self, ConfigurationError> {
        serde_json::from_str(json).map_err(|source| ConfigurationError::Settings {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Rejects settings that ask for something this program cannot provide.
    /// The tag bridge needs a `TagBus` client for the configured endpoint,
    /// and none is linked into the binary.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.opc_enable {
            return Err(ConfigurationError::TagBusUnsupported(self.opc_endpoint.clone()));
        }
        Ok(())
    }

    pub fn camera_file(&self) -> Result<&Path, ConfigurationError> {
        self.camera_file
            .as_deref()
            .ok_or(ConfigurationError::MissingSetting("camera_file"))
    }

    pub fn schema_file(&self) -> Result<PathBuf, ConfigurationError> {
        match &self.schema_file {
            Some(path) => Ok(path.clone()),
            None => Ok(self.camera_file()?.with_extension("xsd")),
        }
    }

    pub fn command_file(&self) -> Result<&Path, ConfigurationError> {
        self.command_file
            .as_deref()
            .ok_or(ConfigurationError::MissingSetting("command_file"))
    }

    pub fn registry_defaults(&self) -> RegistryDefaults {
        RegistryDefaults {
            manufacturer: Manufacturer::parse(&self.default_manufacturer),
            stream_index: self.default_stream,
            username: self.default_username.clone(),
            password: self.default_password.clone(),
        }
    }

    pub fn wall_options(&self) -> WallOptions {
        WallOptions {
            uri_source: self.uri_source,
            onvif_port: self.onvif_port,
            protocol: self.stream_transport,
            stream_type: self.stream_type,
            ..WallOptions::default()
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn publish_interval(&self) -> Duration {
        Duration::from_millis(self.publish_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    mod success {
        use crate::camera::Manufacturer;
        use crate::onvif_stream_uri::{StreamType, TransportProtocol};
        use crate::settings::Settings;
        use crate::video_wall::UriSource;
        use std::path::Path;
        use std::time::Duration;

        #[test]
        fn empty_object_uses_defaults() {
            let settings = Settings::parse("{}", Path::new("settings.json")).unwrap();
            settings.validate().unwrap();
            assert_eq!(settings.poll_interval(), Duration::from_millis(100));
            assert_eq!(settings.onvif_port, 80);
            assert!(!settings.opc_enable);
            assert_eq!(settings.registry_defaults().manufacturer, Manufacturer::Bosch);
        }

        #[test]
        fn full_file() {
            let json = r#"{
                "camera_file": "/etc/wall/cameras.xml",
                "default_manufacturer": "pelco",
                "default_stream": 2,
                "default_username": "operator",
                "default_password": "pw",
                "command_file": "/srv/wall/callups.txt",
                "poll_interval_ms": 250,
                "opc_enable": true,
                "tag_path": "Plant/Wall",
                "uri_source": "device",
                "stream_transport": "tcp",
                "stream_type": "rtp_multicast"
            }"#;
            let settings = Settings::parse(json, Path::new("settings.json")).unwrap();
            assert_eq!(
                settings.schema_file().unwrap(),
                Path::new("/etc/wall/cameras.xsd")
            );
            let defaults = settings.registry_defaults();
            assert_eq!(defaults.manufacturer, Manufacturer::Pelco);
            assert_eq!(defaults.stream_index, 2);
            let options = settings.wall_options();
            assert_eq!(options.uri_source, UriSource::Device);
            assert_eq!(options.protocol, TransportProtocol::Tcp);
            assert_eq!(options.stream_type, StreamType::RtpMulticast);
            assert_eq!(settings.command_file().unwrap(), Path::new("/srv/wall/callups.txt"));
        }
    }

    mod failure {
        use crate::error::ConfigurationError;
        use crate::settings::Settings;
        use std::path::Path;

        #[test]
        fn missing_required_paths() {
            let settings = Settings::default();
            assert!(matches!(
                settings.camera_file(),
                Err(ConfigurationError::MissingSetting("camera_file"))
            ));
            assert!(settings.schema_file().is_err());
            assert!(settings.command_file().is_err());
        }

        #[test]
        fn opc_interface_is_rejected_at_startup() {
            let json = r#"{"opc_enable": true, "opc_endpoint": "opc.tcp://plc:4840"}"#;
            let settings = Settings::parse(json, Path::new("settings.json")).unwrap();
            match settings.validate() {
                Err(ConfigurationError::TagBusUnsupported(endpoint)) => {
                    assert_eq!(endpoint, "opc.tcp://plc:4840")
                }
                other => panic!("expected TagBusUnsupported, got {other:?}"),
            }
        }

        #[test]
        fn invalid_json_and_missing_file() {
            assert!(matches!(
                Settings::parse("{\"onvif_port\": \"eighty\"}", Path::new("s.json")),
                Err(ConfigurationError::Settings { .. })
            ));
            assert!(matches!(
                Settings::load(Path::new("/nonexistent/settings.json")),
                Err(ConfigurationError::Io { .. })
            ));
        }
    }
}
