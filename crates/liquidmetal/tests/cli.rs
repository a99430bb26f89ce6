use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

fn liquidmetal(root: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_liquidmetal"))
        .env("LIQUIDMETAL_CONFIG_DIR", root.join("config"))
        .env("LIQUIDMETAL_CACHE_DIR", root.join("cache"))
        .env_remove("LIQUIDMETAL_CONFIG")
        .env("RUST_LOG", "warn")
        .args(args)
        .output()
        .expect("failed to run liquidmetal")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn param_line<'a>(text: &'a str, name: &str) -> &'a str {
    text.lines()
        .find(|line| line.split_whitespace().next() == Some(name))
        .unwrap_or_else(|| panic!("no line for {name} in:\n{text}"))
}

#[test]
fn presets_lists_bundled_logos() {
    let root = TempDir::new().unwrap();
    let output = liquidmetal(root.path(), &["presets"]);
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("preset:droplet"));
    assert!(text.contains("(default)"));
}

#[test]
fn params_reports_defaults_without_a_config() {
    let root = TempDir::new().unwrap();
    let output = liquidmetal(root.path(), &["params"]);
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("not found, using defaults"));
    assert!(param_line(&text, "pattern_scale").contains("2.000"));
    assert!(param_line(&text, "speed").contains("0.300"));
}

#[test]
fn params_merge_config_and_clamped_flags() {
    let root = TempDir::new().unwrap();
    let config_dir = root.path().join("config");
    fs::create_dir_all(&config_dir).unwrap();
    fs::write(
        config_dir.join("liquidmetal.toml"),
        "[params]\nedge = 0.9\nliquid = 0.2\n",
    )
    .unwrap();

    let output = liquidmetal(root.path(), &["params", "--speed", "7", "--liquid", "0.5"]);
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(param_line(&text, "edge").contains("0.900"));
    assert!(param_line(&text, "liquid").contains("0.500"));
    assert!(param_line(&text, "speed").contains("1.000"));
    assert!(String::from_utf8_lossy(&output.stderr).contains("clamped"));
}

#[test]
fn invalid_config_is_rejected() {
    let root = TempDir::new().unwrap();
    let config = root.path().join("broken.toml");
    fs::write(&config, "version = 7\n").unwrap();
    let output = liquidmetal(
        root.path(),
        &["params", "--config", config.to_str().unwrap()],
    );
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("version"));
}

#[test]
fn mask_writes_normalised_png() {
    let root = TempDir::new().unwrap();
    let out = root.path().join("masks").join("ring.png");
    let output = liquidmetal(
        root.path(),
        &["--offline", "mask", "preset:ring", "--out", out.to_str().unwrap()],
    );
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let (width, height) = image::image_dimensions(&out).unwrap();
    assert!(width.max(height) <= 1000);
    assert!(width.min(height) >= 500 || width.max(height) == 1000);
}

#[test]
fn mask_downscales_large_rasters() {
    let root = TempDir::new().unwrap();
    let source = root.path().join("wide.png");
    image::RgbaImage::from_pixel(2000, 500, image::Rgba([0, 0, 0, 255]))
        .save(&source)
        .unwrap();
    let out = root.path().join("wide-mask.png");

    let output = liquidmetal(
        root.path(),
        &[
            "mask",
            source.to_str().unwrap(),
            "--out",
            out.to_str().unwrap(),
            "--offline",
        ],
    );
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert!(stdout(&output).starts_with("1000x250"));
    assert_eq!(image::image_dimensions(&out).unwrap(), (1000, 250));
}

#[test]
fn unknown_preset_fails_cleanly() {
    let root = TempDir::new().unwrap();
    let out = root.path().join("nope.png");
    let output = liquidmetal(
        root.path(),
        &["mask", "preset:nope", "--out", out.to_str().unwrap()],
    );
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("unknown preset"));
    assert!(!out.exists());
}
