use photo_booth::config::{Configuration, Rect};
use std::path::PathBuf;
use std::time::Duration;

#[test]
fn empty_document_uses_defaults() {
    let cfg: Configuration = serde_yaml::from_str("{}").unwrap();
    assert_eq!(cfg.frame_rate, 30);
    assert_eq!(cfg.printing.max_copies, 4);
    assert_eq!(cfg.printing.default_copies, 1);
    assert_eq!(cfg.printing.dwell, Duration::from_secs(19));
    assert_eq!(cfg.flash.gpio_pin, 22);
    assert_eq!(cfg.timeouts.confirm, Duration::from_secs(15));
    assert!(cfg.rng_seed.is_none());
    cfg.validated().unwrap();
}

#[test]
fn parse_kebab_case_sections() {
    let yaml = r#"
frame-rate: 24
timeouts:
  prepare: 3s
  frame-preview: 1500ms
  confirm: 20s
  session: 10m
printing:
  max-copies: 6
  default-copies: 2
  dwell: 25s
  printer: Canon_SELPHY_CP1300
flash:
  gpio-pin: 17
  pre-flash-delay: 120ms
  active-low: false
simulation:
  disable-camera: true
  camera-latency: 250ms
rng-seed: 9
"#;
    let cfg: Configuration = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(cfg.frame_rate, 24);
    assert_eq!(cfg.timeouts.prepare, Duration::from_secs(3));
    assert_eq!(cfg.timeouts.frame_preview, Duration::from_millis(1500));
    assert_eq!(cfg.timeouts.session, Duration::from_secs(600));
    assert_eq!(cfg.printing.max_copies, 6);
    assert_eq!(cfg.printing.default_copies, 2);
    assert_eq!(cfg.printing.printer.as_deref(), Some("Canon_SELPHY_CP1300"));
    assert_eq!(cfg.flash.gpio_pin, 17);
    assert_eq!(cfg.flash.pre_flash_delay, Duration::from_millis(120));
    assert!(!cfg.flash.active_low);
    assert!(cfg.simulation.disable_camera);
    assert!(!cfg.simulation.disable_printer);
    assert_eq!(cfg.simulation.camera_latency, Duration::from_millis(250));
    assert_eq!(cfg.rng_seed, Some(9));
    cfg.validated().unwrap();
}

#[test]
fn parse_layout_rectangles_and_slots() {
    let yaml = r#"
display:
  width: 1280
  height: 720
layout:
  top-text: { x: 0, y: 0, width: 1280, height: 100 }
  bottom-text: { x: 0, y: 620, width: 1280, height: 100 }
  frame-preview: { x: 140, y: 100, width: 1000, height: 520 }
  confirm-preview: { x: 400, y: 0, width: 480, height: 600 }
  confirm-text: { x: 0, y: 600, width: 1280, height: 120 }
composite:
  strip-size: [600, 1800]
  slot-size: [560, 320]
  slots: [[20, 100], [20, 520], [20, 940]]
  print-size: [1200, 1800]
  print-offsets: [[0, 0], [600, 0]]
"#;
    let cfg: Configuration = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(cfg.layout.frame_preview, Rect::new(140, 100, 1000, 520));
    assert_eq!(cfg.composite.slots.len(), 3);
    cfg.validated().unwrap();
}

#[test]
fn unknown_keys_are_rejected() {
    let yaml = r#"
printing:
  max-copys: 3
"#;
    let err = serde_yaml::from_str::<Configuration>(yaml).unwrap_err();
    assert!(err.to_string().contains("max-copys"), "{err}");
}

#[test]
fn layout_must_fit_the_display() {
    let yaml = r#"
display:
  width: 800
  height: 480
"#;
    let cfg: Configuration = serde_yaml::from_str(yaml).unwrap();
    let err = cfg.validated().unwrap_err();
    assert!(format!("{err:#}").contains("layout"), "{err:#}");
}

#[test]
fn strip_needs_a_slot_for_every_photo() {
    let yaml = r#"
composite:
  slots: [[22, 103], [22, 533]]
"#;
    let cfg: Configuration = serde_yaml::from_str(yaml).unwrap();
    let err = cfg.validated().unwrap_err();
    assert!(format!("{err:#}").contains("exactly 3 slots"), "{err:#}");
}

#[test]
fn phrase_lists_need_enough_entries() {
    let yaml = r#"
texts:
  top-phrases: ["Nice!", "Great!"]
"#;
    let cfg: Configuration = serde_yaml::from_str(yaml).unwrap();
    let err = cfg.validated().unwrap_err();
    assert!(format!("{err:#}").contains("top-phrases"), "{err:#}");
}

#[test]
fn from_yaml_file_resolves_paths_against_config_dir() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("booth.yaml");
    std::fs::write(
        &path,
        r#"
assets:
  idle: media/idle.gif
  countdown: /opt/booth/countdown
storage:
  save-dir: sessions
"#,
    )
    .unwrap();
    let cfg = Configuration::from_yaml_file(&path).unwrap();
    assert_eq!(cfg.assets.idle, dir.path().join("media/idle.gif"));
    assert_eq!(cfg.assets.countdown, PathBuf::from("/opt/booth/countdown"));
    assert_eq!(cfg.storage.save_dir, dir.path().join("sessions"));
}

#[test]
fn missing_config_file_is_an_error() {
    let err = Configuration::from_yaml_file("/definitely/not/here.yaml").unwrap_err();
    assert!(err.to_string().contains("failed to read"));
}
