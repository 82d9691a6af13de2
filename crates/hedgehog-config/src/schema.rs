// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::time::Duration;

use hedgehog_link::{Command, SessionConfig, DEFAULT_PORT};
use serde::{Deserialize, Serialize};

/// Serde default helper — returns `true`.
///
/// `#[serde(default)]` on a `bool` falls back to `false`, so fields that are
/// on unless disabled need a named function.
fn default_true() -> bool {
    true
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub drive: DriveConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Host name or IP address of the Hedgehog.  No default: the address
    /// must come from a config file or `--host`.
    pub host: Option<String>,
    /// TCP port of the device firmware
    #[serde(default = "default_port")]
    pub port: u16,
    /// Give up on a connection attempt after this many seconds.
    ///
    /// Unset (the default) waits until the operating system gives up on its
    /// own, which can take minutes for an address that silently drops
    /// packets.
    pub connect_timeout_secs: Option<u64>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: DEFAULT_PORT,
            connect_timeout_secs: None,
        }
    }
}

impl DeviceConfig {
    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_secs
            .filter(|s| *s > 0)
            .map(Duration::from_secs)
    }

    /// Session timings for this device.  Only the connect timeout is
    /// configurable; the send ceiling and poll interval are fixed.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig::default().with_connect_timeout(self.connect_timeout())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriveConfig {
    /// Send `stop` before every movement command, the way the keyboard
    /// controller does on each key press.
    #[serde(default = "default_true")]
    pub stop_before_move: bool,
    /// Command sent when an empty line is entered in `drive` mode
    #[serde(default)]
    pub default_command: Command,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            stop_before_move: true,
            default_command: Command::Stop,
        }
    }
}
