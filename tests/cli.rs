use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn packwright() -> Command {
    let mut cmd = Command::cargo_bin("packwright").unwrap();
    cmd.env_remove("PACKWRIGHT_CONFIG")
        .env_remove("RUST_LOG")
        .env("NO_COLOR", "1");
    cmd
}

#[test]
fn init_then_build_writes_hashed_bundles() {
    let dir = TempDir::new().unwrap();

    packwright()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success()
        .stderr(predicate::str::contains("packwright.toml"));

    packwright()
        .current_dir(dir.path())
        .arg("build")
        .assert()
        .success()
        .stderr(predicate::str::contains("Built 2 bundle(s)"));

    let names: Vec<String> = fs::read_dir(dir.path().join("dist"))
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();

    assert_eq!(names.len(), 3);
    assert!(names.iter().any(|n| n.starts_with("app.bundle.") && n.ends_with(".js")));
    assert!(names.iter().any(|n| n.starts_with("vendor.bundle.") && n.ends_with(".js")));
    assert!(names.iter().any(|n| n == "manifest.json"));
}

#[test]
fn check_reports_entries() {
    let dir = TempDir::new().unwrap();
    packwright().current_dir(dir.path()).arg("init").assert().success();

    packwright()
        .current_dir(dir.path())
        .arg("check")
        .assert()
        .success()
        .stderr(predicate::str::contains("./src/index.js"))
        .stderr(predicate::str::contains("Configuration is valid"));
}

#[test]
fn missing_config_fails() {
    let dir = TempDir::new().unwrap();

    packwright()
        .current_dir(dir.path())
        .arg("build")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read config file"));
}

#[test]
fn config_path_from_environment() {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("web/src")).unwrap();
    fs::write(dir.path().join("web/src/main.js"), "console.log('hi');").unwrap();
    fs::write(
        dir.path().join("web/bundle.toml"),
        "[entry]\nmain = \"./src/main\"\n\n[output]\nfilename = \"[name].js\"\nmanifest = false\n",
    )
    .unwrap();

    packwright()
        .current_dir(dir.path())
        .env("PACKWRIGHT_CONFIG", "web/bundle.toml")
        .arg("build")
        .assert()
        .success();

    assert!(dir.path().join("web/dist/main.js").exists());
    assert!(!dir.path().join("web/dist/manifest.json").exists());
}

#[test]
fn unknown_loader_rejected_before_output() {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("src")).unwrap();
    fs::write(dir.path().join("src/index.js"), "").unwrap();
    fs::write(
        dir.path().join("packwright.toml"),
        "[entry]\napp = \"./src/index\"\n\n[[module.rules]]\ntest = '\\.js$'\nloader = \"coffee\"\n",
    )
    .unwrap();

    packwright()
        .current_dir(dir.path())
        .arg("build")
        .assert()
        .failure()
        .stderr(predicate::str::contains("coffee"));

    assert!(!dir.path().join("dist").exists());
}
