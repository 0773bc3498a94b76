use assert_cmd::cargo::cargo_bin_cmd;
use serde_json::Value;
use std::{error::Error, fs, path::PathBuf};
use tempfile::tempdir;

fn workspace_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .and_then(|p| p.parent())
        .expect("workspace root")
        .to_path_buf()
}

fn fixture_dir() -> String {
    workspace_root()
        .join("test_data/holter")
        .to_str()
        .expect("utf8 path")
        .to_string()
}

#[test]
fn extract_writes_one_row_per_subject() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let features = temp.path().join("features.csv");
    let windows = temp.path().join("windows.csv");

    let output = cargo_bin_cmd!("holter")
        .args([
            "extract",
            "--input-dir",
            &fixture_dir(),
            "--out",
            features.to_str().expect("utf8 path"),
            "--windows-out",
            windows.to_str().expect("utf8 path"),
        ])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let summary: Value = serde_json::from_slice(&output)?;
    assert_eq!(summary["subjects"], 3);
    assert_eq!(summary["windows"], 30);
    assert_eq!(summary["windows_kept"], 6);
    let skipped = summary["skipped_files"].as_array().expect("array");
    assert_eq!(skipped.len(), 1);
    assert!(skipped[0]["path"].as_str().unwrap().ends_with("u1nn.txt"));

    let table = fs::read_to_string(&features)?;
    let lines: Vec<&str> = table.lines().collect();
    assert_eq!(lines.len(), 4);
    assert!(lines[0].starts_with("id,condition,status,hr_"));
    assert!(lines[1].starts_with("a1nn,af,healthy,"));
    assert!(lines[2].starts_with("c1nn,chf,chf,"));
    assert!(lines[3].starts_with("n1nn,normal,healthy,"));

    let windows = fs::read_to_string(&windows)?;
    let indices: Vec<&str> = windows
        .lines()
        .skip(1)
        .map(|line| line.split(',').nth(3).unwrap())
        .collect();
    assert_eq!(indices, vec!["1", "6", "1", "6", "1", "6"]);
    Ok(())
}

#[test]
fn window_length_and_downsampling_flags() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let features = temp.path().join("features.csv");
    let run = |extra: &[&str]| -> Result<Value, Box<dyn Error>> {
        let mut args = vec![
            "extract",
            "--input-dir",
            &fixture_dir(),
            "--out",
            features.to_str().expect("utf8 path"),
        ]
        .into_iter()
        .map(str::to_string)
        .collect::<Vec<_>>();
        args.extend(extra.iter().map(|s| s.to_string()));
        let output = cargo_bin_cmd!("holter")
            .args(&args)
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();
        Ok(serde_json::from_slice(&output)?)
    };

    let all = run(&["--no-downsample"])?;
    assert_eq!(all["windows_kept"], 30);

    let five = run(&["--window-seconds", "5min"])?;
    assert_eq!(five["windows"], 6);
    assert_eq!(five["windows_kept"], 3);

    let phase0 = run(&["--downsample-phase", "0"])?;
    assert_eq!(phase0["windows_kept"], 6);
    Ok(())
}

#[test]
fn invalid_phase_is_rejected() {
    let temp = tempdir().unwrap();
    cargo_bin_cmd!("holter")
        .args([
            "extract",
            "--input-dir",
            &fixture_dir(),
            "--out",
            temp.path().join("f.csv").to_str().unwrap(),
            "--downsample-phase",
            "5",
        ])
        .assert()
        .failure();
}

#[test]
fn empty_directory_is_fatal() {
    let temp = tempdir().unwrap();
    let assert = cargo_bin_cmd!("holter")
        .args([
            "extract",
            "--input-dir",
            temp.path().to_str().unwrap(),
            "--out",
            temp.path().join("f.csv").to_str().unwrap(),
        ])
        .assert()
        .failure();
    let stderr = String::from_utf8_lossy(&assert.get_output().stderr).to_string();
    assert!(stderr.contains("no files ending in"), "{stderr}");
}

#[test]
fn config_file_supplies_defaults() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let config = temp.path().join("holter.toml");
    fs::write(
        &config,
        format!(
            "input_dir = {:?}\nwindow_seconds = 300.0\ndownsample = {{ modulus = 1, phase = 0 }}\n",
            fixture_dir()
        ),
    )?;
    let output = cargo_bin_cmd!("holter")
        .args([
            "extract",
            "--config",
            config.to_str().unwrap(),
            "--out",
            temp.path().join("f.csv").to_str().unwrap(),
        ])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let summary: Value = serde_json::from_slice(&output)?;
    assert_eq!(summary["windows"], 6);
    assert_eq!(summary["windows_kept"], 6);
    Ok(())
}
