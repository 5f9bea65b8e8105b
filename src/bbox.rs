// 该文件是 Kanjian （看见） 项目的一部分。
// src/bbox.rs - 边框坐标归一化
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

/// 原点 + 宽高格式的整数像素边框
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BBox {
  pub x: u32,
  pub y: u32,
  pub w: u32,
  pub h: u32,
}

/// 将角点格式 `[x1, y1, x2, y2]` 转换为裁剪到图像范围内的 xywh 边框。
///
/// 先对角点取整（四舍六入五成双），再把原点夹到 `[0, 边长]`，
/// 最后根据夹取后的原点计算并裁剪宽高，保证 `x + w <= width`、`y + h <= height`。
pub fn to_xywh(x1: f32, y1: f32, x2: f32, y2: f32, width: u32, height: u32) -> BBox {
  let (x, w) = clip_span(x1, x2, width);
  let (y, h) = clip_span(y1, y2, height);
  BBox { x, y, w, h }
}

fn clip_span(lo: f32, hi: f32, limit: u32) -> (u32, u32) {
  let limit = i64::from(limit);
  let origin = round_px(lo).clamp(0, limit);
  let extent = round_px(hi).saturating_sub(origin).max(0).min(limit - origin);
  // 两者都已落在 [0, limit] 内
  (origin as u32, extent as u32)
}

fn round_px(v: f32) -> i64 {
  f64::from(v).round_ties_even() as i64
}
