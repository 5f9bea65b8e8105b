// 该文件是 Kanjian （看见） 项目的一部分。
// src/model/yolo_onnx.rs - ONNX 格式 YOLO 检测模型
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

use std::sync::Mutex;

use image::{RgbImage, imageops::FilterType};
use ndarray::{Array4, ArrayView2};
use ort::{
  inputs,
  session::{Session, builder::GraphOptimizationLevel},
  value::Tensor,
};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::model::{ClassNames, DetectItem, DetectResult, InferParams, Model, ModelBuilder};

const YOLO_INPUT_NAME: &str = "images";
const YOLO_NAMES_METADATA_KEY: &str = "names";
const YOLO_BOX_PARAMS: usize = 4;
const YOLO_IOU_THRESH: f32 = 0.7;
const YOLO_MAX_DETECTIONS: usize = 300;
const YOLO_PAD_VALUE: f32 = 114.0 / 255.0;

#[derive(Error, Debug)]
pub enum YoloOnnxError {
  #[error("模型文件不存在: {0}")]
  ModelNotFound(String),
  #[error("ONNX Runtime 错误: {0}")]
  OrtError(#[from] ort::Error),
  #[error("张量形状错误: {0}")]
  ShapeError(#[from] ndarray::ShapeError),
  #[error("模型输出形状不符合预期: {0:?}")]
  UnexpectedOutput(Vec<i64>),
  #[error("推理会话锁已损坏")]
  SessionPoisoned,
}

/// Ultralytics 导出的 YOLO 检测模型（输出 `[1, 4 + C, N]`）。
///
/// `ort` 的会话运行需要独占访问，这里用互斥锁串行化所有推理调用。
pub struct YoloOnnx {
  session: Mutex<Session>,
  names: ClassNames,
}

pub struct YoloOnnxBuilder {
  intra_threads: usize,
}

impl Default for YoloOnnxBuilder {
  fn default() -> Self {
    Self { intra_threads: 4 }
  }
}

impl YoloOnnxBuilder {
  pub fn intra_threads(mut self, threads: usize) -> Self {
    self.intra_threads = threads;
    self
  }
}

impl ModelBuilder for YoloOnnxBuilder {
  type Model = YoloOnnx;
  type Error = YoloOnnxError;

  fn build(&self, weights: &str) -> Result<YoloOnnx, YoloOnnxError> {
    if !std::path::Path::new(weights).is_file() {
      return Err(YoloOnnxError::ModelNotFound(weights.to_string()));
    }

    info!("创建 ONNX 推理会话: {}", weights);
    let session = load_session(weights, self.intra_threads)?;

    let names = match read_names(&session) {
      Some(names) => names,
      None => {
        warn!("模型元数据中没有类别表，使用 COCO 类别");
        ClassNames::coco()
      }
    };
    debug!("类别数量: {}", names.len());

    Ok(YoloOnnx {
      session: Mutex::new(session),
      names,
    })
  }
}

fn load_session(weights: &str, intra_threads: usize) -> Result<Session, ort::Error> {
  let session = Session::builder()?
    .with_optimization_level(GraphOptimizationLevel::Level3)?
    .with_intra_threads(intra_threads)?
    .commit_from_file(weights)?;
  Ok(session)
}

fn read_names(session: &Session) -> Option<ClassNames> {
  let metadata = session.metadata().ok()?;
  let raw = metadata.custom(YOLO_NAMES_METADATA_KEY).ok()??;
  parse_names_metadata(&raw)
}

/// 解析 `{0: 'person', 1: 'bicycle'}` 形式的类别表
fn parse_names_metadata(raw: &str) -> Option<ClassNames> {
  let body = raw.trim().strip_prefix('{')?.strip_suffix('}')?;
  let mut names = Vec::new();
  for entry in body.split(',').map(str::trim).filter(|s| !s.is_empty()) {
    let (idx, name) = entry.split_once(':')?;
    let idx = idx.trim().parse::<u32>().ok()?;
    let name = name.trim().trim_matches(|c| c == '\'' || c == '"');
    names.push((idx, name.to_string()));
  }
  let names: ClassNames = names.into_iter().collect();
  (!names.is_empty()).then_some(names)
}

/// 等比缩放并居中填充的几何信息
#[derive(Debug, Clone, Copy, PartialEq)]
struct Letterbox {
  scale: f32,
  pad_x: f32,
  pad_y: f32,
  width: u32,
  height: u32,
}

impl Letterbox {
  fn new(width: u32, height: u32, size: u32) -> (Self, u32, u32) {
    let scale = (size as f32 / width as f32).min(size as f32 / height as f32);
    let new_w = ((width as f32 * scale).round() as u32).clamp(1, size);
    let new_h = ((height as f32 * scale).round() as u32).clamp(1, size);
    let letterbox = Self {
      scale,
      pad_x: ((size - new_w) / 2) as f32,
      pad_y: ((size - new_h) / 2) as f32,
      width,
      height,
    };
    (letterbox, new_w, new_h)
  }

  /// 输入张量坐标 → 原图坐标，并裁剪到图像范围
  fn restore(&self, x: f32, y: f32) -> (f32, f32) {
    let x = ((x - self.pad_x) / self.scale).clamp(0.0, self.width as f32);
    let y = ((y - self.pad_y) / self.scale).clamp(0.0, self.height as f32);
    (x, y)
  }
}

fn preprocess(image: &RgbImage, size: u32) -> (Array4<f32>, Letterbox) {
  let (letterbox, new_w, new_h) = Letterbox::new(image.width(), image.height(), size);
  let resized = image::imageops::resize(image, new_w, new_h, FilterType::Triangle);

  let side = size as usize;
  let mut input = Array4::<f32>::from_elem((1, 3, side, side), YOLO_PAD_VALUE);
  let (off_x, off_y) = (letterbox.pad_x as usize, letterbox.pad_y as usize);
  for (x, y, pixel) in resized.enumerate_pixels() {
    for c in 0..3 {
      input[[0, c, y as usize + off_y, x as usize + off_x]] = pixel[c] as f32 / 255.0;
    }
  }
  (input, letterbox)
}

#[derive(Debug, Clone)]
struct Candidate {
  class_id: u32,
  score: f32,
  bbox: [f32; 4],
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
  let inter_w = (a[2].min(b[2]) - a[0].max(b[0])).max(0.0);
  let inter_h = (a[3].min(b[3]) - a[1].max(b[1])).max(0.0);
  let inter = inter_w * inter_h;
  let area_a = (a[2] - a[0]).max(0.0) * (a[3] - a[1]).max(0.0);
  let area_b = (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0);
  let union = area_a + area_b - inter;
  if union <= 0.0 { 0.0 } else { inter / union }
}

/// 按类别的非极大值抑制，结果按置信度降序
fn non_maximum_suppression(mut candidates: Vec<Candidate>) -> Vec<Candidate> {
  candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
  let mut kept: Vec<Candidate> = Vec::new();
  for candidate in candidates {
    if kept.len() >= YOLO_MAX_DETECTIONS {
      break;
    }
    let suppressed = kept.iter().any(|k| {
      k.class_id == candidate.class_id && iou(&k.bbox, &candidate.bbox) > YOLO_IOU_THRESH
    });
    if !suppressed {
      kept.push(candidate);
    }
  }
  kept
}

/// 解码 `[4 + C, N]` 的输出矩阵
fn decode_output(
  output: ArrayView2<'_, f32>,
  conf_threshold: f32,
  letterbox: &Letterbox,
) -> Vec<DetectItem> {
  let rows = output.nrows();
  let mut candidates = Vec::new();

  for anchor in 0..output.ncols() {
    let (class_id, score) = (YOLO_BOX_PARAMS..rows)
      .map(|r| (r - YOLO_BOX_PARAMS, output[[r, anchor]]))
      .fold((0usize, f32::MIN), |best, cur| if cur.1 > best.1 { cur } else { best });

    if score <= conf_threshold {
      continue;
    }

    let cx = output[[0, anchor]];
    let cy = output[[1, anchor]];
    let w = output[[2, anchor]];
    let h = output[[3, anchor]];
    candidates.push(Candidate {
      class_id: class_id as u32,
      score,
      bbox: [cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0],
    });
  }

  non_maximum_suppression(candidates)
    .into_iter()
    .map(|c| {
      let (x1, y1) = letterbox.restore(c.bbox[0], c.bbox[1]);
      let (x2, y2) = letterbox.restore(c.bbox[2], c.bbox[3]);
      DetectItem {
        class_id: c.class_id,
        score: c.score,
        bbox: [x1, y1, x2, y2],
      }
    })
    .collect()
}

impl Model for YoloOnnx {
  type Error = YoloOnnxError;

  fn infer(&self, image: &RgbImage, params: &InferParams) -> Result<DetectResult, Self::Error> {
    if image.width() == 0 || image.height() == 0 {
      return Ok(DetectResult {
        items: Box::new([]),
        names: self.names.clone(),
      });
    }

    debug!("预处理输入图像");
    let size = params.input_size;
    let (input, letterbox) = preprocess(image, size);
    let (data, _offset) = input.into_raw_vec_and_offset();
    let tensor = Tensor::from_array(([1usize, 3, size as usize, size as usize], data))?;

    debug!("执行模型推理");
    let (shape, data) = {
      let mut session = self
        .session
        .lock()
        .map_err(|_| YoloOnnxError::SessionPoisoned)?;
      let outputs = session.run(inputs![YOLO_INPUT_NAME => tensor])?;
      let (shape, data) = outputs[0].try_extract_tensor::<f32>()?;
      (shape.to_vec(), data.to_vec())
    };

    if shape.len() != 3 || shape[0] != 1 || shape[1] <= YOLO_BOX_PARAMS as i64 {
      return Err(YoloOnnxError::UnexpectedOutput(shape));
    }
    let view = ArrayView2::from_shape((shape[1] as usize, shape[2] as usize), &data)?;
    let items = decode_output(view, params.conf_threshold, &letterbox);
    debug!("检测到 {} 个物体", items.len());

    Ok(DetectResult {
      items: items.into_boxed_slice(),
      names: self.names.clone(),
    })
  }
}
