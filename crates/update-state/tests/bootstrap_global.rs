//! Startup through the process-wide registry
//!
//! The registry is global, so the whole lifecycle runs in a single test.

use bootstate_bootenv::{get_bootloader, registered_bootloaders};
use bootstate_update_state::prelude::*;
use tracing_test::traced_test;

#[test]
#[traced_test]
fn test_bootstrap_from_config_file() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let state_file = dir.path().join("bootenv.json");
    let config_path = dir.path().join("bootenv.yaml");
    std::fs::write(
        &config_path,
        format!(
            "bootloader: file\nstate_key: upgrade_state\nfile:\n  path: {}\nefivars:\n  root: {}\n",
            state_file.display(),
            dir.path().join("no-efivars").display()
        ),
    )?;
    let config = BootenvConfig::load(&config_path)?;

    let manager = bootstrap(&config)?;
    assert_eq!(get_bootloader().as_deref(), Some("file"));
    assert_eq!(manager.key(), "upgrade_state");
    assert!(logs_contain("Update state manager ready"));

    let listed = registered_bootloaders();
    assert!(listed.contains(&("file".to_string(), true)));
    assert!(listed.contains(&("efivars".to_string(), false)));

    assert_eq!(manager.get_state(), UpdateState::NotAvailable);
    manager.save_state("upgrade_state", UpdateState::Installed)?;
    assert_eq!(manager.get_state(), UpdateState::Installed);

    let document: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&state_file)?)?;
    assert_eq!(document["upgrade_state"], "1");

    // a second bootstrap keeps the registry and reselects
    let count = registered_bootloaders().len();
    let mut other = config.clone();
    other.bootloader = Some("none".to_string());
    let manager = bootstrap(&other)?;
    assert_eq!(registered_bootloaders().len(), count);
    assert_eq!(get_bootloader().as_deref(), Some("none"));
    assert_eq!(manager.get_state(), UpdateState::NotAvailable);

    other.bootloader = Some("lilo".to_string());
    assert!(matches!(
        bootstrap(&other),
        Err(StateError::Backend(EnvError::UnknownBackend(_)))
    ));
    assert_eq!(get_bootloader().as_deref(), Some("none"));
    Ok(())
}
