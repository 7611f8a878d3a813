use lightbox::config::{Overrides, Settings, load_settings, load_table};
use lightbox_core::{ImageWidth, ImageWrap};

#[test]
fn missing_files_yield_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let settings = load_settings(&[dir.path().join("absent.toml")]).unwrap();
    assert_eq!(settings, Settings::default());

    let editor = settings.editor_config();
    assert_eq!(editor.max_undo, 200);
    assert_eq!(editor.max_normalize_iterations, 100);
}

#[test]
fn local_file_overrides_global_key_by_key() {
    let dir = tempfile::tempdir().unwrap();
    let global = dir.path().join("config.toml");
    let local = dir.path().join(".lightbox.toml");
    std::fs::write(
        &global,
        r#"
log_filter = "lightbox_core=debug"

[editor]
max_undo = 50

[images]
default_width = "50%"
default_wrap = "left"

[session]
user = "ana"
"#,
    )
    .unwrap();
    std::fs::write(&local, "[images]\ndefault_wrap = \"right\"\n").unwrap();

    let settings = load_settings(&[global, local]).unwrap();
    assert_eq!(settings.log_filter.as_deref(), Some("lightbox_core=debug"));
    assert_eq!(settings.editor_config().max_undo, 50);
    assert_eq!(settings.images.default_width, ImageWidth::Half);
    assert_eq!(settings.images.default_wrap, ImageWrap::Right);
    assert_eq!(settings.session.user.as_deref(), Some("ana"));
}

#[test]
fn cli_flags_override_file_settings() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        "[images]\ndefault_width = \"300px\"\n[session]\nuser = \"ana\"\n",
    )
    .unwrap();

    let overrides = Overrides {
        user: Some("ben".into()),
        wrap: Some(ImageWrap::Left),
        ..Overrides::default()
    };
    let settings = load_settings(&[path]).unwrap().apply(&overrides);

    assert_eq!(settings.session.user.as_deref(), Some("ben"));
    let layout = settings.image_layout();
    assert_eq!(layout.width, ImageWidth::Px300, "file value survives when no flag is given");
    assert_eq!(layout.wrap, ImageWrap::Left);
}

#[test]
fn malformed_file_reports_its_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.toml");
    std::fs::write(&path, "[editor\nmax_undo = ").unwrap();

    let err = load_table(&path).unwrap_err();
    assert!(format!("{err}").contains("broken.toml"));
}

#[test]
fn unknown_width_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[images]\ndefault_width = \"10%\"\n").unwrap();

    assert!(load_settings(&[path]).is_err());
}
