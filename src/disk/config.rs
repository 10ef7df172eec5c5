use std::{env, fmt, path::PathBuf};

use crate::disk::{
    ide::DEFAULT_POLL_BUDGET,
    types::{LBA28_MAX, MAX_DRIVES},
};

// 默认只在槽位 0 挂一块 64 MiB 的镜像
pub const DEFAULT_IMAGE: &str = "elixir0.img";
pub const DEFAULT_SECTORS: u32 = 131_072;

pub const DISK_VAR_PREFIX: &str = "ELIXIR_DISK";
pub const POLL_BUDGET_VAR: &str = "ELIXIR_POLL_BUDGET";
pub const HARDWARE_VAR: &str = "ELIXIR_HARDWARE";

/// 一块镜像文件支撑的驱动器
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskSpec {
    pub path: PathBuf, // 镜像路径
    pub sectors: u32,  // 容量（扇区）
}

/// 机器配置：各槽位的镜像、轮询预算、是否直接访问硬件端口
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineConfig {
    pub disks: [Option<DiskSpec>; MAX_DRIVES],
    pub poll_budget: u32,
    pub hardware: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    // 镜像路径为空，携带变量名
    EmptyPath(String),
    // 扇区数无法解析或超出范围
    InvalidSectors {
        var: String,
        value: String,
    },
    // 轮询预算不是正整数，携带原始值
    InvalidPollBudget(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyPath(var) => write!(f, "{} has an empty image path", var),
            Self::InvalidSectors { var, value } => write!(
                f,
                "{}: invalid sector count '{}' (expected 1..={})",
                var, value, LBA28_MAX
            ),
            Self::InvalidPollBudget(value) => {
                write!(f, "{}: invalid poll budget '{}'", POLL_BUDGET_VAR, value)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            disks: [
                Some(DiskSpec {
                    path: PathBuf::from(DEFAULT_IMAGE),
                    sectors: DEFAULT_SECTORS,
                }),
                None,
                None,
                None,
            ],
            poll_budget: DEFAULT_POLL_BUDGET,
            hardware: false,
        }
    }
}

impl MachineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// 从任意变量来源读取配置；没有设置任何 `ELIXIR_DISKn` 时使用默认镜像
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        let mut disks: [Option<DiskSpec>; MAX_DRIVES] = Default::default();
        let mut any = false;
        for (slot, disk) in disks.iter_mut().enumerate() {
            let var = format!("{}{}", DISK_VAR_PREFIX, slot);
            if let Some(value) = lookup(&var) {
                *disk = Some(parse_disk_spec(&var, &value)?);
                any = true;
            }
        }
        if any {
            config.disks = disks;
        }

        if let Some(value) = lookup(POLL_BUDGET_VAR) {
            config.poll_budget = match value.trim().parse::<u32>() {
                Ok(n) if n > 0 => n,
                _ => return Err(ConfigError::InvalidPollBudget(value)),
            };
        }

        if let Some(value) = lookup(HARDWARE_VAR) {
            config.hardware = matches!(value.trim(), "1" | "true" | "yes");
        }

        Ok(config)
    }

    /// 已配置的 (槽位, 镜像)
    pub fn attached(&self) -> impl Iterator<Item = (usize, &DiskSpec)> {
        self.disks
            .iter()
            .enumerate()
            .filter_map(|(slot, disk)| disk.as_ref().map(|d| (slot, d)))
    }
}

/// 解析 `path[:sectors]`；冒号后面不是纯数字时整段都当作路径
pub fn parse_disk_spec(var: &str, value: &str) -> Result<DiskSpec, ConfigError> {
    let value = value.trim();
    let (path, sectors) = match value.rsplit_once(':') {
        Some((path, count)) if !count.is_empty() && count.bytes().all(|b| b.is_ascii_digit()) => {
            let sectors = match count.parse::<u32>() {
                Ok(n) if n > 0 && n <= LBA28_MAX => n,
                _ => {
                    return Err(ConfigError::InvalidSectors {
                        var: var.to_string(),
                        value: count.to_string(),
                    })
                }
            };
            (path, sectors)
        }
        _ => (value, DEFAULT_SECTORS),
    };

    if path.is_empty() {
        return Err(ConfigError::EmptyPath(var.to_string()));
    }

    Ok(DiskSpec {
        path: PathBuf::from(path),
        sectors,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_to_single_image_on_slot_zero() {
        let config = MachineConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, MachineConfig::default());
        let attached: Vec<_> = config.attached().collect();
        assert_eq!(attached.len(), 1);
        assert_eq!(attached[0].0, 0);
        assert_eq!(attached[0].1.sectors, DEFAULT_SECTORS);
    }

    #[test]
    fn explicit_disks_replace_the_default() {
        let config = MachineConfig::from_lookup(lookup(&[
            ("ELIXIR_DISK1", "data.img:4096"),
            ("ELIXIR_DISK3", "backup.img"),
            ("ELIXIR_POLL_BUDGET", "500"),
            ("ELIXIR_HARDWARE", "1"),
        ]))
        .unwrap();

        assert!(config.disks[0].is_none());
        assert_eq!(
            config.disks[1],
            Some(DiskSpec {
                path: PathBuf::from("data.img"),
                sectors: 4096
            })
        );
        assert_eq!(config.disks[3].as_ref().unwrap().sectors, DEFAULT_SECTORS);
        assert_eq!(config.poll_budget, 500);
        assert!(config.hardware);
    }

    #[test]
    fn colon_without_digits_stays_in_path() {
        let spec = parse_disk_spec("ELIXIR_DISK0", "C:\\images\\a.img").unwrap();
        assert_eq!(spec.path, PathBuf::from("C:\\images\\a.img"));
        assert_eq!(spec.sectors, DEFAULT_SECTORS);
    }

    #[test]
    fn bad_values_are_reported() {
        assert_eq!(
            parse_disk_spec("ELIXIR_DISK0", "a.img:0"),
            Err(ConfigError::InvalidSectors {
                var: "ELIXIR_DISK0".into(),
                value: "0".into()
            })
        );
        assert!(parse_disk_spec("ELIXIR_DISK0", "a.img:999999999999").is_err());
        assert_eq!(
            parse_disk_spec("ELIXIR_DISK2", ":64"),
            Err(ConfigError::EmptyPath("ELIXIR_DISK2".into()))
        );
        assert_eq!(
            MachineConfig::from_lookup(lookup(&[("ELIXIR_POLL_BUDGET", "lots")])),
            Err(ConfigError::InvalidPollBudget("lots".into()))
        );
    }
}
