//! Integration tests running the worker as a separate `treeidx worker` process.

use std::fs;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use serde_json::{Value, json};
use tempfile::TempDir;
use treeidx::server::protocol::{read_message, write_message};
use treeidx::server::{IndexHost, IndexStatus};
use treeidx::utils::AppConfig;

fn treeidx_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_treeidx"))
}

fn fixture() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("apple.js"), "const fruit = 'apple';").unwrap();
    fs::write(dir.path().join("basket.md"), "apple and banana").unwrap();
    dir
}

fn wait_available(host: &IndexHost, root: &Path) {
    let deadline = Instant::now() + Duration::from_secs(30);
    while host.get_status(root) != IndexStatus::Available {
        assert!(Instant::now() < deadline, "index never became available");
        thread::sleep(Duration::from_millis(20));
    }
}

#[test]
fn raw_frames_follow_the_wire_format() {
    let dir = fixture();
    let mut child = Command::new(treeidx_binary())
        .args(["worker", "--root"])
        .arg(dir.path())
        .env("TREEIDX_LOG", "off")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .expect("Failed to start worker");

    let mut stdin = BufWriter::new(child.stdin.take().unwrap());
    let mut stdout = BufReader::new(child.stdout.take().unwrap());

    write_message(&mut stdin, &json!({"type": "init", "msgId": 1})).unwrap();
    let first: Value = read_message(&mut stdout).unwrap();
    assert_eq!(first, json!({"type": "init-response", "msgId": 1, "message": "indexing"}));
    let second: Value = read_message(&mut stdout).unwrap();
    assert_eq!(second, json!({"type": "init-response", "msgId": 1, "message": "ready"}));

    write_message(&mut stdin, &json!({"type": "search", "query": "banana", "msgId": 2})).unwrap();
    let reply: Value = read_message(&mut stdout).unwrap();
    assert_eq!(reply["type"], "search-response");
    assert_eq!(reply["msgId"], 2);
    assert_eq!(reply["message"][0]["ref"], "basket.md");
    assert!(reply["message"][0]["score"].as_f64().unwrap() > 0.0);

    write_message(&mut stdin, &json!({"type": "compact"})).unwrap();
    let reply: Value = read_message(&mut stdout).unwrap();
    assert_eq!(reply, json!({"type": "error", "message": "Unknown message type"}));

    write_message(&mut stdin, &json!({"type": "addFile"})).unwrap();
    let reply: Value = read_message(&mut stdout).unwrap();
    assert_eq!(reply["type"], "error");
    assert!(reply["message"].as_str().unwrap().starts_with("Malformed message:"));

    write_message(&mut stdin, &json!({"type": "stop"})).unwrap();
    let reply: Value = read_message(&mut stdout).unwrap();
    assert_eq!(reply, json!({"type": "stopped"}));

    assert!(child.wait().unwrap().success());
    assert!(dir.path().join(".treeidx.json").exists());
}

#[test]
fn host_drives_process_workers() {
    let dir = fixture();
    let host = IndexHost::new(AppConfig::default()).with_worker_program(treeidx_binary());

    let status = host.create_index(dir.path()).unwrap();
    assert_ne!(status, IndexStatus::Unavailable);
    wait_available(&host, dir.path());

    let hits = host.search(dir.path(), "apple").unwrap();
    assert_eq!(hits.len(), 2);
    // filename match ranks first
    assert_eq!(hits[0].reference, "apple.js");

    fs::write(dir.path().join("cart.js"), "let cherry = true;").unwrap();
    assert!(host.add_file(dir.path(), "cart.js").unwrap());
    let hits = host.search(dir.path(), "cherry").unwrap();
    assert_eq!(hits[0].reference, "cart.js");

    assert!(host.remove_index(dir.path()).unwrap());
    assert_eq!(host.get_status(dir.path()), IndexStatus::Unavailable);
    assert!(!dir.path().join(".treeidx.json").exists());
}
