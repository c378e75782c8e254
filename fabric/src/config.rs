// Copyright 2024 Task Fabric Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Per-role configuration, loaded from an optional TOML file and overridable
//! by CLI flags — generalizes `utils.py`'s `read_config`/`argparse_worker`
//! pair to a typed, `clap`-derived surface per role.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;

use fabric_proto::Error;

fn read_toml_file<T: for<'de> Deserialize<'de> + Default>(path: &Option<PathBuf>) -> Result<T, Error> {
    match path {
        Some(path) => {
            let contents = std::fs::read_to_string(path)?;
            toml::from_str(&contents).map_err(|_| Error::ParseFailure)
        }
        None => Ok(T::default()),
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
struct DispatcherFile {
    bind_address: Option<String>,
    timeout_task_placement_secs: Option<u64>,
    repeater_unsuccessful_tasks_interval_secs: Option<u64>,
    activity_poll_secs: Option<u64>,
    inactivity_timeout_secs: Option<u64>,
    max_attempts: Option<u32>,
}

/// Flags/file for the dispatcher role (§4.2 defaults).
#[derive(Parser, Debug, Clone)]
#[command(name = "fabric-dispatcher")]
pub struct DispatcherConfig {
    /// TOML file with any of this role's fields; CLI flags always win.
    #[arg(long)]
    pub settings: Option<PathBuf>,

    #[arg(long)]
    bind_address: Option<String>,

    #[arg(long)]
    timeout_task_placement_secs: Option<u64>,

    #[arg(long)]
    repeater_unsuccessful_tasks_interval_secs: Option<u64>,

    #[arg(long)]
    activity_poll_secs: Option<u64>,

    #[arg(long)]
    inactivity_timeout_secs: Option<u64>,

    #[arg(long)]
    max_attempts: Option<u32>,
}

/// Resolved dispatcher settings, after merging file and CLI.
pub struct DispatcherSettings {
    pub bind_address: SocketAddr,
    pub timeout_task_placement: Duration,
    pub repeater_unsuccessful_tasks_interval: Duration,
    pub activity_poll: Duration,
    pub inactivity_timeout: Duration,
    pub max_attempts: u32,
}

impl DispatcherConfig {
    pub fn resolve(&self) -> Result<DispatcherSettings, Error> {
        let file: DispatcherFile = read_toml_file(&self.settings)?;
        let bind_address = self
            .bind_address
            .clone()
            .or(file.bind_address)
            .unwrap_or_else(|| "0.0.0.0:9000".to_string())
            .parse()
            .map_err(|_| Error::ParseFailure)?;
        Ok(DispatcherSettings {
            bind_address,
            timeout_task_placement: Duration::from_secs(
                self.timeout_task_placement_secs.or(file.timeout_task_placement_secs).unwrap_or(120),
            ),
            repeater_unsuccessful_tasks_interval: Duration::from_secs(
                self.repeater_unsuccessful_tasks_interval_secs
                    .or(file.repeater_unsuccessful_tasks_interval_secs)
                    .unwrap_or(1),
            ),
            activity_poll: Duration::from_secs(
                self.activity_poll_secs.or(file.activity_poll_secs).unwrap_or(10),
            ),
            inactivity_timeout: Duration::from_secs(
                self.inactivity_timeout_secs.or(file.inactivity_timeout_secs).unwrap_or(10),
            ),
            max_attempts: self.max_attempts.or(file.max_attempts).unwrap_or(3),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatcher_defaults_match_spec() {
        let config = DispatcherConfig {
            settings: None,
            bind_address: None,
            timeout_task_placement_secs: None,
            repeater_unsuccessful_tasks_interval_secs: None,
            activity_poll_secs: None,
            inactivity_timeout_secs: None,
            max_attempts: None,
        };
        let settings = config.resolve().unwrap();
        assert_eq!(settings.bind_address, "0.0.0.0:9000".parse::<SocketAddr>().unwrap());
        assert_eq!(settings.timeout_task_placement, Duration::from_secs(120));
        assert_eq!(settings.repeater_unsuccessful_tasks_interval, Duration::from_secs(1));
        assert_eq!(settings.activity_poll, Duration::from_secs(10));
        assert_eq!(settings.inactivity_timeout, Duration::from_secs(10));
        assert_eq!(settings.max_attempts, 3);
    }

    #[test]
    fn cli_flag_overrides_toml_file() {
        let mut file = tempfile_with(
            r#"
            bind_address = "127.0.0.1:1234"
            max_attempts = 9
            "#,
        );
        let config = DispatcherConfig {
            settings: Some(file.path_buf()),
            bind_address: Some("127.0.0.1:5555".to_string()),
            timeout_task_placement_secs: None,
            repeater_unsuccessful_tasks_interval_secs: None,
            activity_poll_secs: None,
            inactivity_timeout_secs: None,
            max_attempts: None,
        };
        let settings = config.resolve().unwrap();
        assert_eq!(settings.bind_address, "127.0.0.1:5555".parse::<SocketAddr>().unwrap());
        assert_eq!(settings.max_attempts, 9);
        file.cleanup();
    }

    /// Minimal scratch-file helper; avoids pulling in a tempfile crate for
    /// two tests.
    struct ScratchFile(PathBuf);

    impl ScratchFile {
        fn path_buf(&self) -> PathBuf {
            self.0.clone()
        }

        fn cleanup(&mut self) {
            let _ = std::fs::remove_file(&self.0);
        }
    }

    fn tempfile_with(contents: &str) -> ScratchFile {
        let path = std::env::temp_dir().join(format!("fabric-config-test-{}.toml", std::process::id()));
        std::fs::write(&path, contents).expect("failed to write scratch config file");
        ScratchFile(path)
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
struct WorkerFile {
    dispatcher_address: Option<String>,
    listen_port: Option<u16>,
    heartbeat_secs: Option<u64>,
    task_duration_min_secs: Option<f64>,
    task_duration_max_secs: Option<f64>,
    max_attempts: Option<u32>,
}

/// Flags/file for the worker (calculator) role (§4.3 defaults).
#[derive(Parser, Debug, Clone)]
#[command(name = "fabric-worker")]
pub struct WorkerConfig {
    #[arg(long)]
    pub settings: Option<PathBuf>,

    #[arg(long)]
    dispatcher_address: Option<String>,

    #[arg(long)]
    listen_port: Option<u16>,

    #[arg(long)]
    heartbeat_secs: Option<u64>,

    #[arg(long)]
    task_duration_min_secs: Option<f64>,

    #[arg(long)]
    task_duration_max_secs: Option<f64>,

    #[arg(long)]
    max_attempts: Option<u32>,
}

pub struct WorkerSettings {
    pub dispatcher_address: SocketAddr,
    pub listen_port: u16,
    pub heartbeat: Duration,
    pub task_duration: (f64, f64),
    pub max_attempts: u32,
}

impl WorkerConfig {
    pub fn resolve(&self) -> Result<WorkerSettings, Error> {
        let file: WorkerFile = read_toml_file(&self.settings)?;
        let dispatcher_address = self
            .dispatcher_address
            .clone()
            .or(file.dispatcher_address)
            .unwrap_or_else(|| "127.0.0.1:9000".to_string())
            .parse()
            .map_err(|_| Error::ParseFailure)?;
        Ok(WorkerSettings {
            dispatcher_address,
            listen_port: self.listen_port.or(file.listen_port).unwrap_or(0),
            heartbeat: Duration::from_secs(self.heartbeat_secs.or(file.heartbeat_secs).unwrap_or(5)),
            task_duration: (
                self.task_duration_min_secs.or(file.task_duration_min_secs).unwrap_or(0.2),
                self.task_duration_max_secs.or(file.task_duration_max_secs).unwrap_or(1.0),
            ),
            max_attempts: self.max_attempts.or(file.max_attempts).unwrap_or(3),
        })
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
struct ClientFile {
    dispatcher_address: Option<String>,
    client_port: Option<u16>,
    task_duration_min_secs: Option<f64>,
    task_duration_max_secs: Option<f64>,
    max_attempts: Option<u32>,
}

/// Flags/file for the client role (§4.4 defaults).
#[derive(Parser, Debug, Clone)]
#[command(name = "fabric-client")]
pub struct ClientConfig {
    #[arg(long)]
    pub settings: Option<PathBuf>,

    #[arg(long)]
    dispatcher_address: Option<String>,

    #[arg(long)]
    client_port: Option<u16>,

    #[arg(long)]
    task_duration_min_secs: Option<f64>,

    #[arg(long)]
    task_duration_max_secs: Option<f64>,

    #[arg(long)]
    max_attempts: Option<u32>,
}

pub struct ClientSettings {
    pub dispatcher_address: SocketAddr,
    pub client_port: u16,
    /// Interval range between a client generating successive tasks.
    pub task_generation_interval: (f64, f64),
    pub max_attempts: u32,
}

impl ClientConfig {
    pub fn resolve(&self) -> Result<ClientSettings, Error> {
        let file: ClientFile = read_toml_file(&self.settings)?;
        let dispatcher_address = self
            .dispatcher_address
            .clone()
            .or(file.dispatcher_address)
            .unwrap_or_else(|| "127.0.0.1:9000".to_string())
            .parse()
            .map_err(|_| Error::ParseFailure)?;
        Ok(ClientSettings {
            dispatcher_address,
            client_port: self.client_port.or(file.client_port).unwrap_or(0),
            task_generation_interval: (
                self.task_duration_min_secs.or(file.task_duration_min_secs).unwrap_or(1.0),
                self.task_duration_max_secs.or(file.task_duration_max_secs).unwrap_or(3.0),
            ),
            max_attempts: self.max_attempts.or(file.max_attempts).unwrap_or(3),
        })
    }
}
