use std::fs;

use tempdir::TempDir;
use tripmatch_core::logs;

#[test]
fn writes_rotating_log_file() {
    let temp_dir = TempDir::new("writes_rotating_log_file").unwrap();
    logs::init(temp_dir.path().to_str().unwrap()).unwrap();

    log::info!("trip c1 matched");
    log::debug!("not recorded");
    log::logger().flush();

    let content = fs::read_to_string(temp_dir.path().join("logs/main.log")).unwrap();
    assert!(content.contains("trip c1 matched"));
    assert!(!content.contains("not recorded"));

    // only one global logger per process
    assert!(logs::init(temp_dir.path().to_str().unwrap()).is_err());
}
