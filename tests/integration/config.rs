//! Configuration loading and the loop built from it

use std::fs;

use phaseloop::util::config::{load_effective_config, ConfigError, WORKERS_ENV};
use phaseloop::EventLoop;

#[test]
fn test_file_then_env_override() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("phaseloop.toml");
    fs::write(&path, "worker_pool_size = 3\nworker_name_prefix = \"blocking\"\n").unwrap();

    std::env::remove_var(WORKERS_ENV);
    let config = load_effective_config(Some(path.as_path())).unwrap();
    assert_eq!(config.worker_pool_size, 3);
    assert_eq!(config.worker_name_prefix, "blocking");

    std::env::set_var(WORKERS_ENV, "6");
    let config = load_effective_config(Some(path.as_path())).unwrap();
    assert_eq!(config.worker_pool_size, 6);

    std::env::set_var(WORKERS_ENV, "lots");
    assert!(matches!(
        load_effective_config(Some(path.as_path())),
        Err(ConfigError::Invalid(_))
    ));

    std::env::set_var(WORKERS_ENV, "0");
    assert!(load_effective_config(Some(path.as_path())).is_err());

    std::env::remove_var(WORKERS_ENV);
    let event_loop = EventLoop::with_config(load_effective_config(Some(path.as_path())).unwrap()).unwrap();
    assert_eq!(event_loop.worker_pool().size(), 3);
    assert_eq!(event_loop.worker_pool().config().name_prefix, "blocking");
}
