//! End-to-end update flows over a redundant U-Boot environment image

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bootstate_bootenv::prelude::*;
use bootstate_update_state::prelude::*;
use bootstate_uboot_format::{EnvDevice, FwEnvConfig};
use tracing_test::traced_test;

type TestResult = Result<(), Box<dyn std::error::Error>>;

const ENV_SIZE: usize = 0x2000;

struct Board {
    dir: tempfile::TempDir,
    image: PathBuf,
}

impl Board {
    /// Two erased environment copies in one image
    fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let image = dir.path().join("env.img");
        std::fs::write(&image, vec![0xff_u8; 2 * ENV_SIZE])?;
        Ok(Self { dir, image })
    }

    fn device(&self, offset: u64) -> EnvDevice {
        EnvDevice {
            path: self.image.clone(),
            offset,
            env_size: ENV_SIZE,
            sector_size: ENV_SIZE,
            sectors: 1,
        }
    }

    /// A fresh backend instance, as after a reboot
    fn uboot(&self) -> Result<UBootEnv, Box<dyn std::error::Error>> {
        let config = FwEnvConfig::new(vec![self.device(0), self.device(ENV_SIZE as u64)])?;
        Ok(UBootEnv::new(config).with_lock_file(Some(self.dir.path().join("env.lock"))))
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }
}

#[test]
fn test_fresh_device() -> TestResult {
    let board = Board::new()?;
    let mut registry = Registry::new();
    let uboot: Arc<dyn BootloaderBackend> = Arc::new(board.uboot()?);
    registry.register("uboot", Some(uboot))?;
    registry.select("uboot")?;

    let manager = StateManager::new(registry);
    assert_eq!(manager.get_state(), UpdateState::NotAvailable);
    Ok(())
}

#[test]
fn test_happy_update() -> TestResult {
    let board = Board::new()?;

    let agent = StateManager::new(board.uboot()?);
    agent.save_state("ustate", UpdateState::Installed)?;

    // reboot: the boot code moves to TESTING
    let boot_code = board.uboot()?;
    assert_eq!(boot_code.env_get("ustate")?.as_deref(), Some("1"));
    boot_code.env_set("ustate", "2")?;

    let agent = StateManager::new(board.uboot()?);
    assert_eq!(agent.get_state(), UpdateState::Testing);
    agent.save_state("ustate", UpdateState::Ok)?;
    assert_eq!(StateManager::new(board.uboot()?).get_state(), UpdateState::Ok);
    Ok(())
}

#[test]
fn test_failed_update_rolls_back() -> TestResult {
    let board = Board::new()?;
    let agent = StateManager::new(board.uboot()?);

    agent.save_state("ustate", UpdateState::Installed)?;
    agent.save_state("ustate", UpdateState::Testing)?;
    agent.save_state("ustate", UpdateState::Failed)?;
    assert_eq!(agent.get_state(), UpdateState::Failed);

    agent.save_state("ustate", UpdateState::Ok)?;
    agent.reset_state("ustate")?;
    assert_eq!(agent.get_state(), UpdateState::NotAvailable);
    Ok(())
}

#[test]
#[traced_test]
fn test_invalid_stored_byte() -> TestResult {
    let board = Board::new()?;
    let uboot = board.uboot()?;
    uboot.env_set("ustate", "X")?;

    let manager = StateManager::new(uboot);
    assert_eq!(manager.get_state(), UpdateState::Error);
    assert_eq!(manager.read_state("ustate")?, UpdateState::Error);
    assert!(logs_contain("Stored update state is invalid"));
    Ok(())
}

#[test]
#[traced_test]
fn test_empty_key_substitution() -> TestResult {
    let board = Board::new()?;
    let manager = StateManager::new(board.uboot()?);

    manager.save_state("", UpdateState::Ok)?;
    assert!(logs_contain("Empty state key"));
    assert_eq!(manager.read_state("ustate")?, UpdateState::Ok);
    assert_eq!(manager.backend().env_get("ustate")?.as_deref(), Some("0"));
    Ok(())
}

#[test]
#[traced_test]
fn test_empty_key_on_read_and_reset() -> TestResult {
    let board = Board::new()?;
    let manager = StateManager::new(board.uboot()?);
    manager.save_state("ustate", UpdateState::Installed)?;

    assert_eq!(manager.read_state("")?, UpdateState::Installed);
    manager.reset_state("")?;
    assert_eq!(manager.read_state("ustate")?, UpdateState::NotAvailable);
    assert!(logs_contain("Empty state key"));
    Ok(())
}

#[test]
fn test_state_survives_corrupt_copy() -> TestResult {
    let board = Board::new()?;
    let manager = StateManager::new(board.uboot()?);
    manager.save_state("ustate", UpdateState::Installed)?;
    manager.save_state("ustate", UpdateState::Testing)?;

    // the second write went to copy B; corrupt it
    let mut raw = std::fs::read(&board.image)?;
    let byte = raw.get_mut(ENV_SIZE + 8).ok_or("image too short")?;
    *byte ^= 0x80;
    std::fs::write(&board.image, &raw)?;

    assert_eq!(manager.get_state(), UpdateState::Installed);
    Ok(())
}

#[test]
fn test_batch_script_with_state() -> TestResult {
    let board = Board::new()?;
    let uboot = board.uboot()?;
    let script = board.path().join("update.script");
    std::fs::write(&script, "# switch slot\nboot_slot=b\nustate=1\nbootcount\n")?;

    uboot.env_set("bootcount", "3")?;
    uboot.apply_list(&script)?;

    let manager = StateManager::new(uboot);
    assert_eq!(manager.get_state(), UpdateState::Installed);
    assert_eq!(manager.backend().env_get("boot_slot")?.as_deref(), Some("b"));
    assert_eq!(manager.backend().env_get("bootcount")?, None);
    Ok(())
}

#[test]
fn test_not_configured_reads_as_error() {
    let manager = StateManager::new(Registry::new());
    assert_eq!(manager.get_state(), UpdateState::Error);
    assert!(matches!(
        manager.read_state("ustate"),
        Err(StateError::Backend(EnvError::NotConfigured))
    ));
}
