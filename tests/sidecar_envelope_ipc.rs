mod test_support;

use serde_json::json;
use test_support::{hod, temp_dir, Sidecar};

#[test]
fn health_and_protocol_errors() {
    let mut sc = Sidecar::start();

    let health = sc.call("health", json!({}), None);
    assert_eq!(health["ok"], true);
    assert!(health["result"]["version"].is_string());
    assert!(health["result"]["workspacePath"].is_null());

    let garbage = sc.send_line("{not json");
    assert_eq!(garbage["ok"], false);
    assert_eq!(garbage["error"]["code"], "bad_json");

    let unknown = sc.call("classes.frobnicate", json!({}), Some(&hod("t1")));
    assert_eq!(unknown["error"]["code"], "not_implemented");

    // Tenant methods need an open workspace.
    assert_eq!(sc.fails("classes.list", json!({}), Some(&hod("t1"))), "no_workspace");
    assert_eq!(sc.fails("workspace.select", json!({}), None), "bad_params");
}

#[test]
fn configured_workspace_opens_at_startup() {
    let workspace = temp_dir("rosterd-configured-workspace");
    let ws = workspace.to_string_lossy().to_string();
    let mut sc = Sidecar::start_with_env(&[
        ("ROSTERD_WORKSPACE", ws.as_str()),
        ("ROSTERD_DEFAULT_UTC_OFFSET_MINUTES", "330"),
    ]);

    let health = sc.call("health", json!({}), None);
    assert_eq!(health["result"]["workspacePath"], json!(ws));

    let t = hod("t1");
    let class_id = sc.create_class(&t, "Physics", "A");
    let p1 = sc.create_professor(&t, "kumar");
    let s1 = sc.create_student(&t, "EN1", "Asha");
    sc.ok(
        "attendance.markBulk",
        json!({
            "classId": class_id,
            "slotNumber": 1,
            "date": "2024-03-01",
            "records": [{ "studentId": s1, "isPresent": true }]
        }),
        &test_support::professor("t1", &p1),
    );
    // The default offset applies to tenants without their own setting.
    let rows = sc.ok(
        "attendance.byClass",
        json!({ "classId": class_id }),
        &t,
    );
    assert_eq!(rows["records"][0]["date"], "2024-02-29T18:30:00.000Z");
    assert!(workspace.join("rosterd.sqlite3").exists());
}
