use std::path::Path;
use std::process::{Command, Output};

use tempfile::tempdir;

fn molvault(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_molvault"))
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .expect("run molvault binary")
}

fn path_str(path: &Path) -> &str {
    path.to_str().unwrap()
}

#[test]
fn test_cli_build_and_query() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("mols.tsv");
    std::fs::write(&input, "name\tsmiles\nbenzene\tc1ccccc1\ntoluene\tCc1ccccc1\n").unwrap();
    let store = dir.path().join("store");

    // 1. Build
    let out = molvault(&[
        "build",
        "--input",
        path_str(&input),
        "--store",
        path_str(&store),
        "--descriptors",
        "Basic2DSubset",
        "--has-header",
        "--separator",
        "tab",
        "--smiles-column",
        "1",
        "--name-column",
        "0",
        "--batch-size",
        "1",
    ]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    assert!(String::from_utf8_lossy(&out.stdout).contains("Rows: 2"));

    // 2. Lookup as JSON
    let out = molvault(&["lookup", "--store", path_str(&store), "--name", "benzene", "--json"]);
    assert!(out.status.success());
    let rows: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(rows[0]["ordinal"], 0);
    assert_eq!(rows[0]["name"], "benzene");
    let mass = rows[0]["descriptors"]["Basic2DSubset.ExactMolWt"].as_f64().unwrap();
    // JSON text round trip; the stored value is checked bit-exact in the library tests
    assert!((mass - 78.046950192).abs() < 1e-12, "{}", mass);

    // 3. Row, stats and verify
    let out = molvault(&["row", "--store", path_str(&store), "--ordinal", "1"]);
    assert!(out.status.success());
    let text = String::from_utf8_lossy(&out.stdout);
    assert!(text.contains("toluene"));
    assert!(text.contains("C7H8"));

    assert!(molvault(&["stats", "--store", path_str(&store)]).status.success());
    assert!(molvault(&["verify", "--store", path_str(&store)]).status.success());

    // 4. Errors exit non-zero
    let out = molvault(&["lookup", "--store", path_str(&store), "--name", "nobody"]);
    assert!(!out.status.success());
    let out = molvault(&["row", "--store", path_str(&store), "--ordinal", "2"]);
    assert!(!out.status.success());
}

#[test]
fn test_cli_generators_lists_registry() {
    let out = molvault(&["generators"]);
    assert!(out.status.success());
    let text = String::from_utf8_lossy(&out.stdout);
    for name in ["Basic2D (8)", "Basic2DSubset (5)", "Mass (1)", "Rings (3)"] {
        assert!(text.contains(name), "missing {name} in {text}");
    }
}
