// 该文件是 Kanjian （看见） 项目的一部分。
// src/config.rs - 运行时配置解析
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

//! 配置在每次调用时重新读取，不做缓存；只有模型权重标识在首次加载时读取一次。

use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

use tracing::debug;

pub const MODEL_WEIGHTS_KEY: &str = "MODEL_WEIGHTS";
pub const ALLOWED_CLASSES_KEY: &str = "ALLOWED_CLASSES";
pub const CONF_THRESHOLD_KEY: &str = "CONF_THRESHOLD";
pub const INPUT_SIZE_KEY: &str = "IMGSZ";

pub const DEFAULT_MODEL_WEIGHTS: &str = "yolo11n.onnx";
pub const DEFAULT_ALLOWED_CLASSES: &str =
  "person,car,bicycle,motorcycle,airplane,boat,truck,bus,train";
pub const DEFAULT_CONF_THRESHOLD: f32 = 0.25;
pub const DEFAULT_INPUT_SIZE: u32 = 640;

/// 配置来源
pub trait ConfigProvider: Send + Sync {
  fn var(&self, key: &str) -> Option<String>;
}

impl<C: ConfigProvider + ?Sized> ConfigProvider for std::sync::Arc<C> {
  fn var(&self, key: &str) -> Option<String> {
    (**self).var(key)
  }
}

/// 从进程环境变量读取配置
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvConfig;

impl ConfigProvider for EnvConfig {
  fn var(&self, key: &str) -> Option<String> {
    std::env::var(key).ok()
  }
}

/// 内存中的配置，可在运行期间修改
#[derive(Debug, Default)]
pub struct StaticConfig {
  values: RwLock<HashMap<String, String>>,
}

impl StaticConfig {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with(self, key: &str, value: &str) -> Self {
    self.set(key, value);
    self
  }

  pub fn set(&self, key: &str, value: &str) {
    if let Ok(mut values) = self.values.write() {
      values.insert(key.to_string(), value.to_string());
    }
  }

  pub fn remove(&self, key: &str) {
    if let Ok(mut values) = self.values.write() {
      values.remove(key);
    }
  }
}

impl ConfigProvider for StaticConfig {
  fn var(&self, key: &str) -> Option<String> {
    self
      .values
      .read()
      .ok()
      .and_then(|values| values.get(key).cloned())
  }
}

/// 允许出现在结果中的原生类别名（小写）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowList {
  names: BTreeSet<String>,
}

impl AllowList {
  /// 解析逗号分隔列表：去空白、转小写、丢弃空项
  pub fn parse(raw: &str) -> Self {
    let names = raw
      .split(',')
      .map(str::trim)
      .filter(|s| !s.is_empty())
      .map(str::to_lowercase)
      .collect();
    Self { names }
  }

  pub fn contains(&self, native_name: &str) -> bool {
    self.names.contains(native_name)
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = &str> {
    self.names.iter().map(String::as_str)
  }
}

pub fn resolved_allowed_classes(provider: &dyn ConfigProvider) -> AllowList {
  let raw = provider
    .var(ALLOWED_CLASSES_KEY)
    .unwrap_or_else(|| DEFAULT_ALLOWED_CLASSES.to_string());
  AllowList::parse(&raw)
}

pub fn resolved_confidence_threshold(provider: &dyn ConfigProvider) -> f32 {
  match provider.var(CONF_THRESHOLD_KEY) {
    Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
      debug!("无法解析 {}={:?}，使用默认值", CONF_THRESHOLD_KEY, raw);
      DEFAULT_CONF_THRESHOLD
    }),
    None => DEFAULT_CONF_THRESHOLD,
  }
}

pub fn resolved_input_size(provider: &dyn ConfigProvider) -> u32 {
  match provider.var(INPUT_SIZE_KEY) {
    Some(raw) => match raw.trim().parse::<u32>() {
      Ok(size) if size > 0 => size,
      _ => {
        debug!("无法解析 {}={:?}，使用默认值", INPUT_SIZE_KEY, raw);
        DEFAULT_INPUT_SIZE
      }
    },
    None => DEFAULT_INPUT_SIZE,
  }
}

pub fn resolved_model_weights(provider: &dyn ConfigProvider) -> String {
  provider
    .var(MODEL_WEIGHTS_KEY)
    .unwrap_or_else(|| DEFAULT_MODEL_WEIGHTS.to_string())
}

/// 单次调用解析出的配置
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
  pub allowed_classes: AllowList,
  pub conf_threshold: f32,
  pub input_size: u32,
}

impl Settings {
  pub fn resolve(provider: &dyn ConfigProvider) -> Self {
    Self {
      allowed_classes: resolved_allowed_classes(provider),
      conf_threshold: resolved_confidence_threshold(provider),
      input_size: resolved_input_size(provider),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults() {
    let config = StaticConfig::new();
    let settings = Settings::resolve(&config);
    assert_eq!(settings.conf_threshold, 0.25);
    assert_eq!(settings.input_size, 640);
    assert_eq!(settings.allowed_classes.len(), 9);
    assert!(settings.allowed_classes.contains("motorcycle"));
    assert!(!settings.allowed_classes.contains("motorbikes"));
    assert_eq!(resolved_model_weights(&config), DEFAULT_MODEL_WEIGHTS);
  }

  #[test]
  fn test_allow_list_normalization() {
    let list = AllowList::parse(" Car , ,TRUCK,,person ");
    assert_eq!(list.iter().collect::<Vec<_>>(), vec!["car", "person", "truck"]);
  }

  #[test]
  fn test_empty_allow_list() {
    let config = StaticConfig::new().with(ALLOWED_CLASSES_KEY, " , ");
    assert!(resolved_allowed_classes(&config).is_empty());
  }

  #[test]
  fn test_threshold_fallback() {
    let config = StaticConfig::new().with(CONF_THRESHOLD_KEY, "high");
    assert_eq!(resolved_confidence_threshold(&config), 0.25);
    config.set(CONF_THRESHOLD_KEY, " 0.5 ");
    assert_eq!(resolved_confidence_threshold(&config), 0.5);
  }

  #[test]
  fn test_input_size_fallback() {
    let config = StaticConfig::new().with(INPUT_SIZE_KEY, "832");
    assert_eq!(resolved_input_size(&config), 832);
    for bad in ["abc", "-1", "0", "640.0", ""] {
      config.set(INPUT_SIZE_KEY, bad);
      assert_eq!(resolved_input_size(&config), 640, "输入 {:?}", bad);
    }
  }

  #[test]
  fn test_values_are_read_on_every_call() {
    let config = StaticConfig::new();
    assert_eq!(resolved_confidence_threshold(&config), 0.25);
    config.set(CONF_THRESHOLD_KEY, "0.6");
    assert_eq!(resolved_confidence_threshold(&config), 0.6);
    config.remove(CONF_THRESHOLD_KEY);
    assert_eq!(resolved_confidence_threshold(&config), 0.25);
  }
}
