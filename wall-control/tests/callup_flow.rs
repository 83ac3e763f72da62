mod callup_flow {

    use anyhow::Result;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tempfile::TempDir;
    use wall_control::callup::CallupSink;
    use wall_control::camera_registry::CameraRegistry;
    use wall_control::command_watcher::CommandWatcher;
    use wall_control::error::ProtocolError;
    use wall_control::settings::Settings;
    use wall_control::soap::MockSoapTransport;
    use wall_control::tag_bridge::TagBridge;
    use wall_control::tag_bus::MemoryTagBus;
    use wall_control::tag_mirror::TagValue;
    use wall_control::video_wall::{VideoWall, WallDisplay};

    const CAMERAS: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<cameras>
  <camera>
    <number>1</number>
    <ip>10.0.0.5</ip>
    <stream>1</stream>
    <device>3</device>
    <manufacturer>Bosch</manufacturer>
    <username>u</username>
    <password>p</password>
  </camera>
  <camera>
    <number>5</number>
    <ip>10.0.0.6</ip>
    <stream>default</stream>
    <device>1</device>
    <manufacturer>Axis</manufacturer>
  </camera>
</cameras>
"#;

    const SCHEMA: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:element name="cameras">
    <xs:complexType>
      <xs:sequence>
        <xs:element name="camera" maxOccurs="unbounded">
          <xs:complexType>
            <xs:sequence>
              <xs:element name="number" type="xs:positiveInteger"/>
              <xs:element name="ip" type="xs:string"/>
              <xs:element name="stream" type="xs:string"/>
              <xs:element name="device" type="xs:nonNegativeInteger"/>
              <xs:element name="manufacturer" type="xs:string" minOccurs="0"/>
              <xs:element name="username" type="xs:string" minOccurs="0"/>
              <xs:element name="password" type="xs:string" minOccurs="0"/>
            </xs:sequence>
          </xs:complexType>
        </xs:element>
      </xs:sequence>
    </xs:complexType>
  </xs:element>
</xs:schema>
"#;

    #[derive(Default)]
    struct RecordingDisplay {
        events: Mutex<Vec<String>>,
    }

    impl RecordingDisplay {
        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }

        fn push(&self, event: String) {
            self.events.lock().unwrap().push(event);
        }
    }

    #[async_trait]
    impl WallDisplay for RecordingDisplay {
        async fn play(&self, slot: usize, uri: &str) {
            self.push(format!("play {slot} {uri}"));
        }

        async fn show_unavailable(&self, slot: usize, reason: &str) {
            self.push(format!("unavailable {slot} {reason}"));
        }

        async fn set_sequencing(&self, slot: usize, enabled: bool) {
            self.push(format!("sequencing {slot} {enabled}"));
        }

        async fn report_status(&self, slot: usize, message: &str) {
            self.push(format!("status {slot} {message}"));
        }
    }

    fn workspace() -> Result<TempDir> {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join("cameras.xml"), CAMERAS)?;
        std::fs::write(dir.path().join("cameras.xsd"), SCHEMA)?;
        std::fs::write(dir.path().join("callups.txt"), "")?;
        Ok(dir)
    }

    fn settings(dir: &Path) -> Result<Settings> {
        let json = serde_json::json!({
            "camera_file": dir.join("cameras.xml"),
            "command_file": dir.join("callups.txt"),
            "poll_interval_ms": 20,
            "tag_path": "Wall"
        });
        Ok(Settings::parse(&json.to_string(), &dir.join("settings.json"))?)
    }

    fn offline_transport() -> MockSoapTransport {
        let mut transport = MockSoapTransport::new();
        transport.expect_post().returning(|endpoint, _, _| {
            Err(ProtocolError::Unreachable {
                endpoint: endpoint.to_string(),
                reason: "no route to host".to_string(),
            })
        });
        transport
    }

    #[tokio::test]
    async fn command_file_and_tags_drive_the_wall() -> Result<()> {
        let dir = workspace()?;
        let settings = settings(dir.path())?;
        let registry = CameraRegistry::load(
            settings.camera_file()?,
            &settings.schema_file()?,
            &settings.registry_defaults(),
        )?;
        assert_eq!(registry.numbers(), vec![1, 5]);

        let display = Arc::new(RecordingDisplay::default());
        let wall = VideoWall::spawn(
            registry.into_shared(),
            display.clone(),
            Arc::new(offline_transport()),
            settings.wall_options(),
        );
        let sink: Arc<dyn CallupSink> = Arc::new(wall.clone());

        let mut watcher =
            CommandWatcher::new(settings.command_file()?, settings.poll_interval(), sink.clone())
                .await?;
        watcher.initialize().await?;
        let status_path = watcher.status_path().to_path_buf();
        let watch_task = watcher.spawn();

        let bus = Arc::new(MemoryTagBus::new());
        bus.publish("Wall/Cam03CameraURI", TagValue::Text("rtsp://x".into()));
        let bridge = TagBridge::new(bus.clone(), sink, settings.tag_path.clone());
        let bridge_task = bridge.start(settings.publish_interval()).await?;

        std::fs::write(settings.command_file()?, "M1 C1 P0;M2 C5 P0\r\n")?;
        tokio::time::sleep(Duration::from_millis(300)).await;
        std::fs::write(settings.command_file()?, "Sequencing:On:M2")?;
        bus.publish("Wall/Cam03Trigger", TagValue::Bool(true));
        tokio::time::sleep(Duration::from_millis(300)).await;

        let events = display.events();
        assert!(events.contains(&"play 0 rtsp://u:p@10.0.0.5:554/?h26x=4&line=3&inst=1".to_string()));
        assert!(events.contains(&"play 1 rtsp://10.0.0.6:554/onvif-media/media.amp".to_string()));
        assert!(events.contains(&"sequencing 1 true".to_string()));
        assert!(events.contains(&"play 2 rtsp://x".to_string()));
        assert_eq!(bus.value("Wall/Cam03Trigger"), Some(TagValue::Bool(false)));

        assert_eq!(wall.bound_camera(0), Some(1));
        assert!(!wall.has_ptz(0));
        let status = std::fs::read_to_string(status_path)?;
        assert!(status.contains("Processed Correctly"), "{status}");

        watch_task.abort();
        bridge_task.abort();
        Ok(())
    }

    #[tokio::test]
    async fn unknown_camera_is_shown_unavailable() -> Result<()> {
        let dir = workspace()?;
        let settings = settings(dir.path())?;
        let registry = CameraRegistry::load(
            settings.camera_file()?,
            &settings.schema_file()?,
            &settings.registry_defaults(),
        )?;
        let display = Arc::new(RecordingDisplay::default());
        let wall = VideoWall::spawn(
            registry.into_shared(),
            display.clone(),
            Arc::new(offline_transport()),
            settings.wall_options(),
        );

        wall.callup(3, 42, 1).await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(
            display.events(),
            vec!["unavailable 3 camera 42 is not in the database".to_string()]
        );
        assert!(wall.pan(3, 0.5).is_err());
        Ok(())
    }
}
