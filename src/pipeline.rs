// 该文件是 Kanjian （看见） 项目的一部分。
// src/pipeline.rs - 检测流水线
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

use std::sync::Arc;

use image::RgbImage;
use thiserror::Error;
use tracing::{debug, info};

use crate::{
  bbox::to_xywh,
  config::{ConfigProvider, Settings},
  fetch::{FetchError, Fetcher},
  label::map_label,
  model::{InferParams, Model, ModelBuilder, ModelHandle, ModelInitError},
  response::{BoxFormat, Detection, PredictResponse, round_confidence},
};

#[derive(Error, Debug)]
pub enum DetectError {
  #[error("图像数据无效: {0}")]
  InvalidImage(String),
  #[error("获取图像失败: {0}")]
  Fetch(#[from] FetchError),
  #[error(transparent)]
  ModelInit(#[from] ModelInitError),
  #[error("模型推理失败: {0}")]
  Inference(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// 解码 → 推理 → 过滤 → 映射标签 → 归一化边框
pub struct Pipeline<B: ModelBuilder, C: ConfigProvider> {
  handle: Arc<ModelHandle<B>>,
  config: C,
  fetcher: Fetcher,
}

impl<B: ModelBuilder, C: ConfigProvider> Pipeline<B, C> {
  pub fn new(handle: Arc<ModelHandle<B>>, config: C) -> Self {
    Self {
      handle,
      config,
      fetcher: Fetcher::default(),
    }
  }

  pub fn with_fetcher(mut self, fetcher: Fetcher) -> Self {
    self.fetcher = fetcher;
    self
  }

  pub fn config(&self) -> &C {
    &self.config
  }

  /// 预先加载模型，返回模型标识
  pub fn warm_up(&self) -> Result<&str, ModelInitError> {
    Ok(self.handle.ensure_loaded(&self.config)?.identity())
  }

  pub fn infer(&self, image_bytes: &[u8]) -> Result<PredictResponse, DetectError> {
    let image = decode_image(image_bytes)?;
    self.infer_image(&image)
  }

  pub fn infer_from_url(&self, url: &str) -> Result<PredictResponse, DetectError> {
    let bytes = self.fetcher.fetch(url)?;
    self.infer(&bytes)
  }

  pub fn infer_image(&self, image: &RgbImage) -> Result<PredictResponse, DetectError> {
    let loaded = self.handle.ensure_loaded(&self.config)?;
    let settings = Settings::resolve(&self.config);
    let params = InferParams {
      conf_threshold: settings.conf_threshold,
      input_size: settings.input_size,
    };

    let now = std::time::Instant::now();
    let result = loaded
      .model()
      .infer(image, &params)
      .map_err(|e| DetectError::Inference(Box::new(e)))?;
    debug!("推理完成，耗时: {:.2?}", now.elapsed());
    if result.is_empty() {
      debug!("模型未输出任何对象");
    }

    let (width, height) = image.dimensions();
    let mut detections = Vec::with_capacity(result.items.len());
    for item in result.items.iter() {
      let native = result.names.name_of(item.class_id).to_lowercase();
      if !settings.allowed_classes.contains(&native) {
        continue;
      }
      let [x1, y1, x2, y2] = item.bbox;
      detections.push(Detection {
        class_name: map_label(&native),
        confidence: round_confidence(item.score),
        bbox: to_xywh(x1, y1, x2, y2, width, height),
        box_format: BoxFormat::Xywh,
      });
    }
    info!(
      "检测到 {} 个对象，保留 {} 个",
      result.items.len(),
      detections.len()
    );

    Ok(PredictResponse {
      model: loaded.identity().to_string(),
      image_size: [width, height],
      detections,
    })
  }
}

/// 解码为 3 通道 RGB 图像
pub fn decode_image(bytes: &[u8]) -> Result<RgbImage, DetectError> {
  image::load_from_memory(bytes)
    .map(|image| image.to_rgb8())
    .map_err(|e| DetectError::InvalidImage(e.to_string()))
}
