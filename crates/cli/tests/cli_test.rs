use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

/// Command isolated from the caller's environment and config file.
fn stockroom(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("stockroom").unwrap();
    cmd.current_dir(dir)
        .env("STOCKROOM_CONFIG", dir.join("stockroom.toml"))
        .env("STOCKROOM_DATA_FILE", dir.join("data").join("log.json"))
        .env("STOCKROOM_REPORTS_DIR", dir.join("reports"))
        .env_remove("STOCKROOM_STORE")
        .env_remove("STOCKROOM_OPERATOR")
        .env_remove("STOCKROOM_LOG")
        .env_remove("RUST_LOG");
    cmd
}

fn run_json(dir: &Path, args: &[&str]) -> Value {
    let output = stockroom(dir).args(args).assert().success().get_output().stdout.clone();
    serde_json::from_slice(&output).unwrap()
}

fn setup() -> (TempDir, String) {
    let dir = tempfile::tempdir().unwrap();
    let store = run_json(dir.path(), &["store", "add", "--name", "Loja Centro"]);
    (dir, store["store_id"].as_str().unwrap().to_string())
}

fn add_product(dir: &Path, code: &str, quantity: &str, min: &str) -> String {
    let product = run_json(
        dir,
        &[
            "product", "add", "--code", code, "--name", code, "--cost", "10", "--price", "15.50", "--min", min,
            "--quantity", quantity,
        ],
    );
    product["product_id"].as_str().unwrap().to_string()
}

#[test]
fn test_help_lists_subcommands() {
    let dir = tempfile::tempdir().unwrap();
    stockroom(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("product"))
        .stdout(predicate::str::contains("stock"))
        .stdout(predicate::str::contains("report"));
}

#[test]
fn test_commands_need_a_store() {
    let dir = tempfile::tempdir().unwrap();
    stockroom(dir.path())
        .args(["product", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no store registered"));
}

#[test]
fn test_product_and_movements_persist_between_runs() {
    let (dir, _) = setup();
    let product = add_product(dir.path(), "P-1", "5", "0");

    let exit = run_json(
        dir.path(),
        &["stock", "exit", &product, "2", "--reason", "sale", "--document", "NF-1"],
    );
    assert_eq!(exit["on_hand_after"], 3);
    assert_eq!(exit["kind"], "exit");

    let shown = run_json(dir.path(), &["product", "show", &product]);
    assert_eq!(shown["quantity"], 3);
    assert_eq!(shown["sell_price"], 1550);

    let movements = run_json(dir.path(), &["stock", "movements", "--kind", "exit"]);
    assert_eq!(movements.as_array().unwrap().len(), 1);
    assert_eq!(movements[0]["document_number"], "NF-1");
    assert!(dir.path().join("data").join("log.json").exists());
}

#[test]
fn test_exit_beyond_stock_fails_without_recording() {
    let (dir, _) = setup();
    let product = add_product(dir.path(), "P-1", "1", "0");

    stockroom(dir.path())
        .args(["stock", "exit", &product, "2"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("insufficient stock"));

    let movements = run_json(dir.path(), &["stock", "movements"]);
    assert_eq!(movements.as_array().unwrap().len(), 1);
}

#[test]
fn test_duplicate_product_code_is_rejected() {
    let (dir, _) = setup();
    add_product(dir.path(), "P-1", "0", "0");
    stockroom(dir.path())
        .args(["product", "add", "--code", "p-1", "--name", "Other"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already used"));
}

#[test]
fn test_product_update_can_clear_optional_fields() {
    let (dir, _) = setup();
    let product = run_json(
        dir.path(),
        &["product", "add", "--code", "P-1", "--name", "Hinge", "--category", "Hardware", "--supplier", "Acme"],
    )["product_id"]
        .as_str()
        .unwrap()
        .to_string();

    let updated = run_json(dir.path(), &["product", "update", &product, "--category", ""]);
    assert!(updated.get("category").is_none());
    assert_eq!(updated["supplier"], "Acme");
    assert_eq!(updated["name"], "Hinge");
}

#[test]
fn test_order_delivery_replenishes_stock() {
    let (dir, _) = setup();
    let product = add_product(dir.path(), "P-1", "0", "0");
    let line = format!("{product}:6");

    let order = run_json(
        dir.path(),
        &["order", "place", "--supplier", "Acme", "--line", &line, "--line", &line],
    );
    assert_eq!(order["status"], "pending");
    assert_eq!(order["items"][0]["quantity"], 12);
    let order_id = order["order_id"].as_str().unwrap().to_string();

    run_json(dir.path(), &["order", "approve", &order_id]);
    let delivered = run_json(dir.path(), &["order", "deliver", &order_id]);
    assert_eq!(delivered["status"], "delivered");

    let shown = run_json(dir.path(), &["product", "show", &product]);
    assert_eq!(shown["quantity"], 12);
}

#[test]
fn test_alerts_and_report_file() {
    let (dir, _) = setup();
    add_product(dir.path(), "LOW", "1", "3");
    add_product(dir.path(), "OK", "9", "3");

    let alerts = run_json(dir.path(), &["alerts"]);
    assert_eq!(alerts.as_array().unwrap().len(), 1);
    assert_eq!(alerts[0]["code"], "LOW");
    assert_eq!(alerts[0]["level"], "low");

    let out = dir.path().join("out");
    let summary = run_json(dir.path(), &["report", "stock", "--out", out.to_str().unwrap()]);
    assert_eq!(summary["rows"], 2);
    let path = summary["path"].as_str().unwrap();
    assert!(path.contains("report_stock_"));

    let report: Value = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
    assert_eq!(report["store_name"], "Loja Centro");
    assert_eq!(report["rows"].as_array().unwrap().len(), 2);
}

#[test]
fn test_operator_flag_is_recorded_on_movements() {
    let (dir, _) = setup();
    let product = add_product(dir.path(), "P-1", "0", "0");
    let entry = run_json(dir.path(), &["--operator", "Rui", "stock", "entry", &product, "4"]);
    assert_eq!(entry["actor"]["name"], "Rui");
}

#[test]
fn test_store_flag_selects_among_several_stores() {
    let (dir, first) = setup();
    run_json(dir.path(), &["store", "add", "--name", "Loja Sul"]);

    stockroom(dir.path())
        .args(["product", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--store"));

    let products = run_json(dir.path(), &["--store", &first, "product", "list"]);
    assert!(products.as_array().unwrap().is_empty());
}

#[test]
fn test_corrupt_log_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("data")).unwrap();
    std::fs::write(dir.path().join("data").join("log.json"), "{ not json").unwrap();

    stockroom(dir.path())
        .args(["store", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to open"));
    // The damaged file is left for inspection.
    assert_eq!(
        std::fs::read_to_string(dir.path().join("data").join("log.json")).unwrap(),
        "{ not json"
    );
}
