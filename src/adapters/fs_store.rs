//! Filesystem script store.
//!
//! Implements [`ScriptStore`] on top of `std::fs`.  On the device the
//! SPIFFS partition is mounted into the VFS at `base_path`, so the same
//! code serves both targets.

use std::fs;
use std::io::ErrorKind;

use log::debug;

use crate::app::ports::ScriptStore;
use crate::error::StoreError;

/// Reads scripts (and `config.json`) from a mounted filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsScriptStore;

impl FsScriptStore {
    pub fn new() -> Self {
        Self
    }
}

impl ScriptStore for FsScriptStore {
    fn read(&self, path: &str) -> Result<String, StoreError> {
        let bytes = fs::read(path).map_err(|e| {
            debug!("read {} failed: {}", path, e);
            match e.kind() {
                ErrorKind::NotFound => StoreError::NotFound,
                _ => StoreError::IoError,
            }
        })?;
        String::from_utf8(bytes).map_err(|_| StoreError::InvalidEncoding)
    }
}

/// Mount the SPIFFS data partition at `base_path`.
#[cfg(target_os = "espidf")]
pub fn mount_spiffs(base_path: &str) -> Result<(), StoreError> {
    use esp_idf_svc::sys::{ESP_OK, esp_vfs_spiffs_conf_t, esp_vfs_spiffs_register};

    let Ok(c_path) = std::ffi::CString::new(base_path) else {
        return Err(StoreError::InvalidEncoding);
    };
    let conf = esp_vfs_spiffs_conf_t {
        base_path: c_path.as_ptr(),
        partition_label: core::ptr::null(),
        max_files: 8,
        format_if_mount_failed: false,
    };
    // SAFETY: `conf` and the path it points to are valid for the call;
    // ESP-IDF copies the base path into its own VFS table.
    let ret = unsafe { esp_vfs_spiffs_register(&conf) };
    if ret != ESP_OK as i32 {
        log::error!("SPIFFS mount at {} failed (rc={})", base_path, ret);
        return Err(StoreError::IoError);
    }
    log::info!("SPIFFS mounted at {}", base_path);
    Ok(())
}
