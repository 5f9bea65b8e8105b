// 该文件是 Kanjian （看见） 项目的一部分。
// src/response.rs - 推理结果结构
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

use serde::{Deserialize, Serialize};

pub use crate::bbox::BBox;

/// 边框格式标记，固定为 `"xywh"`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoxFormat {
  #[default]
  #[serde(rename = "xywh")]
  Xywh,
}

/// 单个检测对象
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
  /// 目标词表中的类别名
  #[serde(rename = "class")]
  pub class_name: String,
  /// 置信度，保留 4 位小数
  pub confidence: f64,
  pub bbox: BBox,
  #[serde(default)]
  pub box_format: BoxFormat,
}

/// 一次推理调用的结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictResponse {
  /// 当前加载模型的标识
  pub model: String,
  /// `[宽, 高]`
  pub image_size: [u32; 2],
  /// 按模型原始输出顺序排列
  pub detections: Vec<Detection>,
}

/// 将置信度四舍五入到 4 位小数
pub fn round_confidence(score: f32) -> f64 {
  (f64::from(score) * 10_000.0).round() / 10_000.0
}
