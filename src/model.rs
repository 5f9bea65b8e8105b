// 该文件是 Kanjian （看见） 项目的一部分。
// src/model.rs - 模型
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

use std::collections::BTreeMap;

use image::RgbImage;

use crate::label::COCO_CLASSES;

/// 检测模型。
///
/// 实现必须可以被多个线程同时调用；底层推理原语不支持并发时，
/// 由实现自行在内部串行化（例如用互斥锁包住会话）。
pub trait Model: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn infer(&self, image: &RgbImage, params: &InferParams) -> Result<DetectResult, Self::Error>;
}

/// 构建模型，权重标识只在首次加载时读取
pub trait ModelBuilder: Send + Sync {
  type Model: Model;
  type Error: std::fmt::Display;

  fn build(&self, weights: &str) -> Result<Self::Model, Self::Error>;
}

/// 推理参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InferParams {
  pub conf_threshold: f32,
  pub input_size: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectItem {
  pub class_id: u32,
  pub score: f32,
  pub bbox: [f32; 4], // 原图像素坐标 [x_min, y_min, x_max, y_max]
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectResult {
  pub items: Box<[DetectItem]>,
  pub names: ClassNames,
}

impl DetectResult {
  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }
}

/// 本次推理的类别索引 → 类别名表
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClassNames {
  names: BTreeMap<u32, String>,
}

impl ClassNames {
  pub fn coco() -> Self {
    COCO_CLASSES
      .iter()
      .enumerate()
      .map(|(idx, name)| (idx as u32, name.to_string()))
      .collect()
  }

  /// 查不到的索引返回其十进制字符串
  pub fn name_of(&self, class_id: u32) -> String {
    self
      .names
      .get(&class_id)
      .cloned()
      .unwrap_or_else(|| class_id.to_string())
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }
}

impl FromIterator<(u32, String)> for ClassNames {
  fn from_iter<I: IntoIterator<Item = (u32, String)>>(iter: I) -> Self {
    Self {
      names: iter.into_iter().collect(),
    }
  }
}

mod handle;
pub use self::handle::{LoadedModel, ModelHandle, ModelInitError};

#[cfg(feature = "model_yolo_onnx")]
mod yolo_onnx;
#[cfg(feature = "model_yolo_onnx")]
pub use self::yolo_onnx::{YoloOnnx, YoloOnnxBuilder, YoloOnnxError};

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_coco_names() {
    let names = ClassNames::coco();
    assert_eq!(names.len(), 80);
    assert_eq!(names.name_of(2), "car");
    assert_eq!(names.name_of(79), "toothbrush");
  }

  #[test]
  fn test_empty_results() {
    assert!(ClassNames::default().is_empty());
    assert!(!ClassNames::coco().is_empty());
    let result = DetectResult {
      items: Box::new([]),
      names: ClassNames::coco(),
    };
    assert!(result.is_empty());
  }

  #[test]
  fn test_unknown_index_falls_back_to_number() {
    let names: ClassNames = [(0, "person".to_string())].into_iter().collect();
    assert_eq!(names.name_of(0), "person");
    assert_eq!(names.name_of(17), "17");
  }
}
