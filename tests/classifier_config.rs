use std::path::PathBuf;
use std::sync::Mutex;

use tempfile::NamedTempFile;

use skin_classifier::config::ClassifierConfig;
use skin_classifier::TensorLayout;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "SKIN_CONFIG",
        "SKIN_MODEL_PATH",
        "SKIN_BACKEND",
        "SKIN_CONFIDENCE_THRESHOLD",
        "SKIN_TENSOR_LAYOUT",
        "SKIN_CAMERA_URL",
        "SKIN_CAMERA_FPS",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_json_config_with_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "model": {
            "path": "models/derm_v2.onnx",
            "backend": "stub",
            "confidence_threshold": 0.65,
            "layout": "nchw",
            "stub_scores": [0.1, 0.2, 0.9, 0.0, 0.0]
        },
        "camera": {
            "url": "stub://front_camera",
            "target_fps": 15,
            "width": 320,
            "height": 240
        }
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("SKIN_CONFIG", file.path());
    std::env::set_var("SKIN_CONFIDENCE_THRESHOLD", "0.4");
    std::env::set_var("SKIN_CAMERA_URL", "stub://rear_camera");

    let cfg = ClassifierConfig::load().expect("load config");

    assert_eq!(cfg.model.path, PathBuf::from("models/derm_v2.onnx"));
    assert_eq!(cfg.model.backend, "stub");
    assert_eq!(cfg.model.confidence_threshold, 0.4);
    assert_eq!(cfg.model.layout, TensorLayout::Nchw);
    assert_eq!(cfg.model.stub_scores, Some([0.1, 0.2, 0.9, 0.0, 0.0]));
    assert_eq!(cfg.camera.url, "stub://rear_camera");
    assert_eq!(cfg.camera.target_fps, 15);
    assert_eq!(cfg.camera.width, 320);
    assert_eq!(cfg.camera.height, 240);

    clear_env();
}

#[test]
fn loads_toml_config_by_extension() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp config");
    std::fs::write(
        file.path(),
        r#"
[model]
backend = "stub"
confidence_threshold = 0.7

[camera]
url = "stub://exam_room"
target_fps = 5
"#,
    )
    .expect("write config");

    let cfg = ClassifierConfig::load_from(Some(file.path())).expect("load config");
    assert_eq!(cfg.model.confidence_threshold, 0.7);
    assert_eq!(cfg.model.layout, TensorLayout::Nhwc);
    assert_eq!(cfg.camera.url, "stub://exam_room");
    assert_eq!(cfg.camera.target_fps, 5);
    assert_eq!(cfg.camera.width, 640);
    assert_eq!(cfg.camera.height, 480);

    clear_env();
}

#[test]
fn rejects_out_of_range_threshold() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("SKIN_BACKEND", "stub");
    std::env::set_var("SKIN_CONFIDENCE_THRESHOLD", "1.5");
    let err = ClassifierConfig::load().unwrap_err();
    assert!(err.to_string().contains("confidence threshold"));

    std::env::set_var("SKIN_CONFIDENCE_THRESHOLD", "high");
    assert!(ClassifierConfig::load().is_err());

    clear_env();
}

#[test]
fn missing_config_file_is_an_error() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let dir = tempfile::tempdir().expect("temp dir");
    let err = ClassifierConfig::load_from(Some(&dir.path().join("absent.json"))).unwrap_err();
    assert!(err.to_string().contains("failed to read config file"));

    clear_env();
}
