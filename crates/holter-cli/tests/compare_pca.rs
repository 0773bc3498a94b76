use assert_cmd::cargo::cargo_bin_cmd;
use serde_json::Value;
use std::{error::Error, fs, path::Path};
use tempfile::tempdir;

fn stdout_json(args: &[&str]) -> Result<Value, Box<dyn Error>> {
    let output = cargo_bin_cmd!("holter")
        .args(args)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    Ok(serde_json::from_slice(&output)?)
}

fn path_str(path: &Path) -> &str {
    path.to_str().expect("utf8 path")
}

/// Three synthetic subjects per condition, every window kept.
fn synthetic_features(dir: &Path) -> Result<std::path::PathBuf, Box<dyn Error>> {
    let recordings = dir.join("recordings");
    let features = dir.join("features.csv");
    let synth = stdout_json(&[
        "synth",
        "--out-dir",
        path_str(&recordings),
        "--minutes",
        "20",
        "--subjects",
        "3",
    ])?;
    assert_eq!(synth["files"].as_array().unwrap().len(), 9);

    let summary = stdout_json(&[
        "extract",
        "--input-dir",
        path_str(&recordings),
        "--no-downsample",
        "--out",
        path_str(&features),
    ])?;
    assert_eq!(summary["subjects"], 9);
    assert!(summary["skipped_files"].as_array().unwrap().is_empty());
    Ok(features)
}

#[test]
fn synth_is_deterministic_for_a_seed() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let a = temp.path().join("a");
    let b = temp.path().join("b");
    stdout_json(&["synth", "--out-dir", path_str(&a), "--seed", "3"])?;
    stdout_json(&["synth", "--out-dir", path_str(&b), "--seed", "3"])?;
    for name in ["n1nn.txt", "a1nn.txt", "c1nn.txt"] {
        assert_eq!(fs::read_to_string(a.join(name))?, fs::read_to_string(b.join(name))?);
    }
    let first = fs::read_to_string(a.join("n1nn.txt"))?;
    let columns: Vec<&str> = first.lines().next().unwrap().split_whitespace().collect();
    assert_eq!(columns.len(), 3);
    Ok(())
}

#[test]
fn compare_flags_rmssd_and_writes_results() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let features = synthetic_features(temp.path())?;
    let results = temp.path().join("comparisons.csv");

    let report = stdout_json(&[
        "compare",
        "--features",
        path_str(&features),
        "--out",
        path_str(&results),
    ])?;
    let metrics = report["metrics"].as_u64().unwrap();
    assert_eq!(metrics, 3 * (24 + 11));
    assert_eq!(report["tests"].as_u64().unwrap(), metrics * 4);
    // AF beats are far more irregular than sinus rhythm, CHF far less
    let promising: Vec<&str> = report["promising"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(Value::as_str)
        .collect();
    assert!(promising.contains(&"rmssd_mean"), "{promising:?}");

    let csv = fs::read_to_string(&results)?;
    let header = csv.lines().next().unwrap();
    assert_eq!(header, "metric,kind,statistic,p_value,df1,df2,effect,error");
    assert!(csv.contains("rmssd_mean,three-group-nonparametric,"));
    Ok(())
}

#[test]
fn pca_on_promising_metrics_renders_plot() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let features = synthetic_features(temp.path())?;
    let plot = temp.path().join("pca.png");

    let report = stdout_json(&[
        "pca",
        "--features",
        path_str(&features),
        "--plot",
        path_str(&plot),
    ])?;
    let ratios: Vec<f64> = report["explained_variance_ratio"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(Value::as_f64)
        .collect();
    assert!(!ratios.is_empty());
    assert!((ratios.iter().sum::<f64>() - 1.0).abs() < 1e-9);
    assert!(ratios.windows(2).all(|w| w[0] >= w[1]));
    assert!(report["columns"]
        .as_array()
        .unwrap()
        .iter()
        .any(|c| c == "rmssd_mean"));
    assert!(fs::metadata(&plot)?.len() > 0);
    Ok(())
}

#[test]
fn pca_without_any_promising_metric_fails() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let features = temp.path().join("features.csv");
    fs::write(
        &features,
        "id,condition,status,x\nn1,normal,healthy,1\nn2,normal,healthy,1\nc1,chf,chf,1\nc2,chf,chf,1\n",
    )?;
    cargo_bin_cmd!("holter")
        .args(["pca", "--features", path_str(&features)])
        .assert()
        .failure();
    Ok(())
}
