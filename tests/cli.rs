mod common;

use assert_cmd::Command;
use common::{TestWorkspace, dashboard_sheets, read_sheet, write_dashboard_db};
use predicates::str::contains;
use sheet_recon::config::EngineConfig;

fn sheet_recon() -> Command {
    Command::cargo_bin("sheet-recon").expect("binary exists")
}

#[test]
fn init_config_writes_loadable_defaults() {
    let workspace = TestWorkspace::new();
    let path = workspace.join("engine.yml");
    sheet_recon()
        .args(["init-config", "-o", path.to_str().unwrap()])
        .assert()
        .success();
    let loaded = EngineConfig::load(&path).expect("load written config");
    assert_eq!(loaded, EngineConfig::default());

    sheet_recon()
        .args(["init-config", "-o", path.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(contains("--force"));
}

#[test]
fn analyze_prints_tags_for_each_sheet() {
    let workspace = TestWorkspace::new();
    let export = workspace.write_workbook("export.xlsx", &dashboard_sheets());
    sheet_recon()
        .args(["analyze", "-i", export.to_str().unwrap()])
        .assert()
        .success()
        .stdout(contains("Store Sales"))
        .stdout(contains("target_data"))
        .stdout(contains("generic_data"));
}

#[test]
fn probe_reports_working_and_missing_sources() {
    let workspace = TestWorkspace::new();
    let (db, queries) = write_dashboard_db(&workspace);
    sheet_recon()
        .args([
            "probe",
            "--db",
            db.to_str().unwrap(),
            "-q",
            queries.to_str().unwrap(),
            "--json",
        ])
        .assert()
        .success()
        .stdout(contains("\"output_shape\": \"monthly_trends\""))
        .stdout(contains("is not defined"));
}

#[test]
fn plan_lists_mapping_and_unmapped_sheets() {
    let workspace = TestWorkspace::new();
    let export = workspace.write_workbook("export.xlsx", &dashboard_sheets());
    let (db, queries) = write_dashboard_db(&workspace);
    sheet_recon()
        .args([
            "plan",
            "-i",
            export.to_str().unwrap(),
            "--db",
            db.to_str().unwrap(),
            "-q",
            queries.to_str().unwrap(),
        ])
        .assert()
        .success()
        .stdout(contains("SalesTrend"))
        .stdout(contains("direct_name"))
        .stdout(contains("No Mapping"));
}

#[test]
fn reconcile_writes_report_and_summary() {
    let workspace = TestWorkspace::new();
    let export = workspace.write_workbook("export.xlsx", &dashboard_sheets());
    let (db, queries) = write_dashboard_db(&workspace);
    let output = workspace.join("report.xlsx");
    let summary = workspace.join("summary.json");
    sheet_recon()
        .args([
            "reconcile",
            "-i",
            export.to_str().unwrap(),
            "-o",
            output.to_str().unwrap(),
            "--db",
            db.to_str().unwrap(),
            "-q",
            queries.to_str().unwrap(),
            "--drillthrough",
            "Love Library",
            "--summary-json",
            summary.to_str().unwrap(),
        ])
        .assert()
        .success()
        .stdout(contains("dynamic strategy"));

    let trends = read_sheet(&output, "Sales Trends");
    assert_eq!(trends[1], vec!["Jan", "1000", "1000", "Match"]);
    let stores = read_sheet(&output, "Store Sales");
    assert_eq!(stores[1][3], "Match");
    let json = std::fs::read_to_string(&summary).expect("read summary");
    assert!(json.contains("\"store\": \"717\""));
}

#[test]
fn reconcile_fails_for_missing_export() {
    let workspace = TestWorkspace::new();
    let (db, queries) = write_dashboard_db(&workspace);
    let output = workspace.join("report.xlsx");
    sheet_recon()
        .args([
            "reconcile",
            "-i",
            workspace.join("missing.xlsx").to_str().unwrap(),
            "-o",
            output.to_str().unwrap(),
            "--db",
            db.to_str().unwrap(),
            "-q",
            queries.to_str().unwrap(),
        ])
        .assert()
        .failure()
        .stderr(contains("error:"));
    assert!(!output.exists());
}
