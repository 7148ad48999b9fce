// End-to-end tests for `frecon run` / `frecon validate` against the fixtures
// in tests/fixtures/janeiro.
// Run with: cargo test -p fiscal-cli --test cli_recon -- --nocapture

use std::path::PathBuf;
use std::process::{Command, Output};

fn frecon() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_frecon"));
    cmd.current_dir(env!("CARGO_MANIFEST_DIR"));
    cmd.env_remove("FRECON_LOG");
    cmd
}

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/janeiro").join(name)
}

fn run(args: &[&str]) -> Output {
    frecon().args(args).output().expect("failed to spawn frecon")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn run_json(config: &str) -> (Output, serde_json::Value) {
    let path = fixture(config);
    let output = run(&["run", path.to_str().unwrap(), "--json"]);
    let json: serde_json::Value = serde_json::from_slice(&output.stdout)
        .unwrap_or_else(|e| panic!("invalid JSON ({e}); stderr:\n{}", stderr(&output)));
    (output, json)
}

// -------------------------------------------------------------------------
// run
// -------------------------------------------------------------------------

#[test]
fn clean_month_exits_zero() {
    let (output, json) = run_json("clean.toml");
    assert_eq!(output.status.code(), Some(0), "stderr:\n{}", stderr(&output));

    assert_eq!(json["meta"]["config_name"], "Janeiro 2026");
    assert_eq!(json["meta"]["cancelled_rows"], 1);
    assert_eq!(json["metrics"]["total_records"], 2);
    assert_eq!(json["metrics"]["reconciled_count"], 2);
    assert_eq!(json["alerts"].as_array().unwrap().len(), 0);

    let err = stderr(&output);
    assert!(err.contains("2 reconciled"), "stderr:\n{err}");
    assert!(err.contains("1 cancelled document(s) excluded"), "stderr:\n{err}");
}

#[test]
fn alerts_exit_three_with_details() {
    let (output, json) = run_json("alerts.toml");
    assert_eq!(output.status.code(), Some(3), "stderr:\n{}", stderr(&output));

    let metrics = &json["metrics"];
    assert_eq!(metrics["total_records"], 2);
    assert_eq!(metrics["reconciled_count"], 0);
    assert_eq!(metrics["divergent_count"], 1);
    assert_eq!(metrics["absent_count"]["A"], 0);
    assert_eq!(metrics["absent_count"]["B"], 1);
    assert_eq!(metrics["absent_count"]["C"], 2);

    let reasons: Vec<(String, String)> = json["alerts"]
        .as_array()
        .unwrap()
        .iter()
        .map(|a| {
            (
                a["number"].as_str().unwrap().to_string(),
                a["reason"].as_str().unwrap().to_string(),
            )
        })
        .collect();
    let expected = [
        ("15286", "source C unavailable"),
        ("15286", "value divergence in source B"),
        ("15290", "not found in source B"),
        ("15290", "source C unavailable"),
    ];
    assert_eq!(
        reasons,
        expected
            .iter()
            .map(|(n, r)| (n.to_string(), r.to_string()))
            .collect::<Vec<_>>()
    );

    let divergent = &json["alerts"][1];
    assert_eq!(divergent["value"], 1234.56);
    assert_eq!(divergent["candidates"]["B"]["value"], 1234.0);
    assert_eq!(divergent["statuses"]["C"], "SOURCE_UNAVAILABLE");
    assert!(divergent["candidates"]["C"].is_null());

    assert!(stderr(&output).contains("error: 4 alert(s) on 2 record(s)"));
}

#[test]
fn human_listing_joins_reasons() {
    let path = fixture("alerts.toml");
    let output = run(&["run", path.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(3));

    let out = stdout(&output);
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(
        lines,
        vec![
            "1/15286\tsource C unavailable; value divergence in source B",
            "1/15290\tnot found in source B; source C unavailable",
        ]
    );
}

#[test]
fn output_file_written() {
    let dir = tempfile::tempdir().unwrap();
    let out_path = dir.path().join("result.json");
    let config = fixture("clean.toml");

    let output = run(&[
        "run",
        config.to_str().unwrap(),
        "--output",
        out_path.to_str().unwrap(),
    ]);
    assert_eq!(output.status.code(), Some(0), "stderr:\n{}", stderr(&output));

    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&out_path).unwrap()).unwrap();
    assert_eq!(written["metrics"]["total_records"], 2);
    assert!(stdout(&output).is_empty());
}

#[test]
fn verbose_logs_to_stderr() {
    let config = fixture("clean.toml");
    let output = run(&["run", config.to_str().unwrap(), "-v"]);
    assert_eq!(output.status.code(), Some(0));
    assert!(stderr(&output).contains("INFO canonical: 3 documents"));
}

#[test]
fn log_level_env_overrides_verbose() {
    let config = fixture("clean.toml");
    let output = frecon()
        .args(["run", config.to_str().unwrap(), "-v"])
        .env("FRECON_LOG", "error")
        .output()
        .expect("failed to spawn frecon");
    assert_eq!(output.status.code(), Some(0));
    assert!(!stderr(&output).contains("INFO"), "stderr:\n{}", stderr(&output));
}

#[test]
fn missing_source_file_is_runtime_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("recon.toml");
    std::fs::write(
        &config,
        r#"
name = "Sem arquivo"

[[sources]]
name = "A"
path = "nao-existe.csv"
"#,
    )
    .unwrap();

    let output = run(&["run", config.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(5));
    assert!(stderr(&output).contains("source A"));
}

#[test]
fn missing_column_hints_at_overrides() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("erp.csv"), "serie;documento;valor\n1;10;5,00\n").unwrap();
    let config = dir.path().join("recon.toml");
    std::fs::write(
        &config,
        r#"
name = "Cabecalho"

[[sources]]
name = "A"
path = "erp.csv"
"#,
    )
    .unwrap();

    let output = run(&["run", config.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(5));
    let err = stderr(&output);
    assert!(err.contains("'number'"), "stderr:\n{err}");
    assert!(err.contains("hint:  name the header explicitly"), "stderr:\n{err}");
}

// -------------------------------------------------------------------------
// validate
// -------------------------------------------------------------------------

#[test]
fn validate_ok() {
    let config = fixture("alerts.toml");
    let output = run(&["validate", config.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(0));
    assert!(stderr(&output).contains("with 3 source(s): A, B, C"));
}

#[test]
fn validate_rejects_duplicate_source() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("dup.toml");
    std::fs::write(
        &config,
        r#"
name = "Duplicada"

[[sources]]
name = "A"

[[sources]]
name = "A"
"#,
    )
    .unwrap();

    let output = run(&["validate", config.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(4));
    assert!(stderr(&output).contains("declared more than once"));
}

#[test]
fn missing_config_is_runtime_error() {
    let output = run(&["validate", "does-not-exist.toml"]);
    assert_eq!(output.status.code(), Some(5));
}

#[test]
fn unknown_subcommand_is_usage_error() {
    let output = run(&["frobnicate"]);
    assert_eq!(output.status.code(), Some(2));
}
