use crate::cli::CaptureArgs;
use anyhow::{Context, Result, bail};
use cwlite_capture::{AcquireConfig, CaptureSettings};
use cwlite_usb::fpga::Bitstream;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs::{File, create_dir_all};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_KEY: &str = "2b7e151628aed2a6abf7158809cf4f3c";

pub fn default_config_location() -> Option<PathBuf> {
    ProjectDirs::from("", "", "cwlite").map(|dirs| dirs.config_dir().join("settings.json"))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Unset means the bundled (or installed) interface bitstream.
    pub bitstream: Option<PathBuf>,
    pub samples: u32,
    pub traces: usize,
    pub offset: u32,
    pub key: String,
    pub trigger_timeout_ms: u64,
    pub serial_timeout_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bitstream: None,
            samples: 1500,
            traces: 50,
            offset: 0,
            key: DEFAULT_KEY.to_string(),
            trigger_timeout_ms: 2000,
            serial_timeout_ms: 750,
        }
    }
}

impl Settings {
    pub fn read(path: &Path) -> Result<Settings> {
        match File::open(path) {
            Ok(reader) => serde_json::from_reader(reader).context(format!(
                "Could not parse settings file at {}",
                path.to_string_lossy()
            )),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(Settings::default()),
            Err(error) => Err(error).context(format!(
                "Could not open settings file for reading at {}",
                path.to_string_lossy()
            )),
        }
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            create_dir_all(parent).context(format!(
                "Could not create settings directory at {}",
                parent.to_string_lossy()
            ))?;
        }
        let writer = File::create(path).context(format!(
            "Could not open settings file for writing at {}",
            path.to_string_lossy()
        ))?;
        serde_json::to_writer_pretty(writer, self).context(format!(
            "Could not write to settings file at {}",
            path.to_string_lossy()
        ))?;
        Ok(())
    }

    /// Settings with anything given on the command line taking priority.
    pub fn merge(&self, args: &CaptureArgs) -> Settings {
        Settings {
            bitstream: args.bitstream.clone().or(self.bitstream.clone()),
            samples: args.samples.unwrap_or(self.samples),
            traces: args.traces.unwrap_or(self.traces),
            offset: args.offset.unwrap_or(self.offset),
            key: args.key.clone().unwrap_or(self.key.clone()),
            trigger_timeout_ms: args.trigger_timeout_ms.unwrap_or(self.trigger_timeout_ms),
            serial_timeout_ms: args.serial_timeout_ms.unwrap_or(self.serial_timeout_ms),
        }
    }

    pub fn key_bytes(&self) -> Result<Vec<u8>> {
        let key = hex::decode(&self.key).context(format!("Key {} is not valid hex", self.key))?;
        if key.is_empty() {
            bail!("Key must not be empty");
        }
        Ok(key)
    }

    pub fn bitstream(&self) -> Bitstream {
        match &self.bitstream {
            Some(path) => Bitstream::File(path.clone()),
            None => Bitstream::default(),
        }
    }

    pub fn acquire_config(&self) -> AcquireConfig {
        AcquireConfig {
            capture: CaptureSettings {
                samples: self.samples,
                traces: self.traces,
                offset: self.offset,
            },
            bitstream: self.bitstream(),
            trigger_timeout: Duration::from_millis(self.trigger_timeout_ms),
            serial_timeout: Duration::from_millis(self.serial_timeout_ms),
            ..AcquireConfig::default()
        }
    }
}
