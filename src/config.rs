//! 配置文件加载与管理

use crate::slime::{EncodeOptions, DEFAULT_COMPRESSION_LEVEL};
use crate::world::{IngestOptions, REGION_EXTENSION};
use anyhow::{Context, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// 当前目录下的配置文件名
pub const LOCAL_CONFIG: &str = "slimeconv.toml";

/// 主配置结构
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 读取配置
    pub ingest: IngestConfig,
    /// 输出配置
    pub output: OutputConfig,
}

/// 读取配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// 区域文件扩展名
    pub extension: String,
    /// 任一区域文件失败即中止转换
    pub strict: bool,
    /// 并行线程数，0 表示自动
    pub threads: usize,
}

/// 输出配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// zstd 压缩等级
    pub compression_level: i32,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            extension: REGION_EXTENSION.to_string(),
            strict: false,
            threads: 0,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            compression_level: DEFAULT_COMPRESSION_LEVEL,
        }
    }
}

impl IngestConfig {
    pub fn to_options(&self) -> IngestOptions {
        IngestOptions {
            extension: self.extension.trim_start_matches('.').to_string(),
            strict: self.strict,
            threads: (self.threads > 0).then_some(self.threads),
        }
    }
}

impl OutputConfig {
    pub fn to_options(&self) -> EncodeOptions {
        EncodeOptions {
            compression_level: self.compression_level,
        }
    }
}

impl Config {
    /// 从文件加载配置
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("无法读取配置 {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("无法解析配置 {}", path.display()))?;
        Ok(config)
    }

    /// 保存配置到文件
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, content)?;
        Ok(())
    }

    /// 用户配置目录下的配置文件路径
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("slimeconv").join("config.toml"))
    }

    /// 按优先级加载配置：
    /// 1. 当前目录的 slimeconv.toml
    /// 2. 用户配置目录的 config.toml
    /// 3. 默认配置
    pub fn load() -> Self {
        let candidates = std::iter::once(PathBuf::from(LOCAL_CONFIG)).chain(Self::default_config_path());
        for path in candidates {
            if !path.exists() {
                continue;
            }
            match Self::load_from_file(&path) {
                Ok(config) => {
                    debug!("已加载配置: {}", path.display());
                    return config;
                }
                Err(e) => warn!("忽略配置 {}: {:#}", path.display(), e),
            }
        }
        Self::default()
    }

    /// 生成默认配置文件内容
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}
