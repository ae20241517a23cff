#![allow(dead_code)]

use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

pub fn spawn_sidecar(vars: &[(&str, &str)]) -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_rosterd");
    let mut cmd = Command::new(exe);
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .env_remove("ROSTERD_WORKSPACE")
        .env_remove("ROSTERD_CONFIG")
        .env_remove("ROSTERD_DEFAULT_UTC_OFFSET_MINUTES")
        .env("ROSTERD_LOG_LEVEL", "warn");
    for (k, v) in vars {
        cmd.env(k, v);
    }
    let mut child = cmd.spawn().expect("spawn rosterd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

pub fn hod(tenant: &str) -> serde_json::Value {
    json!({ "tenantId": tenant, "callerId": format!("hod-{tenant}"), "role": "hod" })
}

pub fn professor(tenant: &str, professor_id: &str) -> serde_json::Value {
    json!({ "tenantId": tenant, "callerId": professor_id, "role": "professor" })
}

pub fn error_code(resp: &serde_json::Value) -> Option<&str> {
    resp.get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
}

pub fn str_field(v: &serde_json::Value, key: &str) -> String {
    v.get(key)
        .and_then(|x| x.as_str())
        .unwrap_or_else(|| panic!("missing {} in {}", key, v))
        .to_string()
}

/// One running sidecar plus a request-id counter.
pub struct Sidecar {
    _child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    next_id: u64,
}

impl Sidecar {
    pub fn start() -> Self {
        Self::start_with_env(&[])
    }

    pub fn start_with_env(vars: &[(&str, &str)]) -> Self {
        let (child, stdin, reader) = spawn_sidecar(vars);
        Self {
            _child: child,
            stdin,
            reader,
            next_id: 0,
        }
    }

    /// Starts a sidecar with a fresh workspace already selected.
    pub fn with_workspace(prefix: &str) -> Self {
        let mut sidecar = Self::start();
        let workspace = temp_dir(prefix);
        let resp = sidecar.call(
            "workspace.select",
            json!({ "path": workspace.to_string_lossy() }),
            None,
        );
        assert_eq!(resp["ok"], true, "workspace.select failed: {}", resp);
        sidecar
    }

    pub fn send_line(&mut self, line: &str) -> serde_json::Value {
        writeln!(self.stdin, "{}", line).expect("write request");
        self.stdin.flush().expect("flush request");

        let mut out = String::new();
        self.reader.read_line(&mut out).expect("read response line");
        assert!(!out.trim().is_empty(), "empty response for {}", line);
        serde_json::from_str(out.trim()).expect("parse response json")
    }

    /// Sends one request and returns the raw envelope.
    pub fn call(
        &mut self,
        method: &str,
        params: serde_json::Value,
        caller: Option<&serde_json::Value>,
    ) -> serde_json::Value {
        self.next_id += 1;
        let id = self.next_id.to_string();
        let mut payload = json!({
            "id": id,
            "method": method,
            "params": params,
        });
        if let Some(c) = caller {
            payload["caller"] = c.clone();
        }
        let value = self.send_line(&payload.to_string());
        assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id.as_str()));
        value
    }

    /// Sends one request that must succeed and returns its `result`.
    pub fn ok(
        &mut self,
        method: &str,
        params: serde_json::Value,
        caller: &serde_json::Value,
    ) -> serde_json::Value {
        let value = self.call(method, params, Some(caller));
        assert!(
            value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
            "{} failed: {}",
            method,
            value
        );
        value.get("result").cloned().unwrap_or_else(|| json!({}))
    }

    /// Sends one request that must fail and returns its error code.
    pub fn fails(
        &mut self,
        method: &str,
        params: serde_json::Value,
        caller: Option<&serde_json::Value>,
    ) -> String {
        let value = self.call(method, params, caller);
        assert_eq!(value["ok"], false, "{} unexpectedly succeeded: {}", method, value);
        error_code(&value).unwrap_or_default().to_string()
    }

    pub fn create_class(&mut self, caller: &serde_json::Value, name: &str, division: &str) -> String {
        let class = self.ok(
            "classes.create",
            json!({ "className": name, "division": division }),
            caller,
        );
        str_field(&class, "id")
    }

    pub fn create_student(&mut self, caller: &serde_json::Value, enrollment: &str, name: &str) -> String {
        let student = self.ok(
            "students.create",
            json!({ "enrollmentNumber": enrollment, "name": name, "semester": 3 }),
            caller,
        );
        str_field(&student, "id")
    }

    pub fn create_professor(&mut self, caller: &serde_json::Value, username: &str) -> String {
        let prof = self.ok(
            "professors.create",
            json!({ "name": format!("Prof {username}"), "username": username, "passwordHash": "hash" }),
            caller,
        );
        str_field(&prof, "id")
    }
}
