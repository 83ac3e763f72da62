pub mod callup;
pub mod camera;
pub mod camera_registry;
pub mod camera_schema;
pub mod command_file;
pub mod command_watcher;
pub mod error;
pub mod http_client;
pub mod onvif_client;
pub mod onvif_profiles;
pub mod onvif_requests;
pub mod onvif_services;
pub mod onvif_stream_uri;
pub mod ptz_config;
pub mod ptz_presets;
pub mod ptz_session;
pub mod ptz_worker;
pub mod settings;
pub mod soap;
pub mod tag_bridge;
pub mod tag_bus;
pub mod tag_mirror;
pub mod time_sync;
pub mod video_wall;
pub mod wsse;

#[cfg(test)]
mod test_support;
