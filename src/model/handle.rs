// 该文件是 Kanjian （看见） 项目的一部分。
// src/model/handle.rs - 进程级模型句柄
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

use once_cell::sync::OnceCell;
use thiserror::Error;
use tracing::{error, info};

use crate::config::{ConfigProvider, resolved_model_weights};
use crate::model::ModelBuilder;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("模型初始化失败 ({weights}): {reason}")]
pub struct ModelInitError {
  pub weights: String,
  pub reason: String,
}

/// 已加载的模型及其显示标识
#[derive(Debug)]
pub struct LoadedModel<M> {
  model: M,
  identity: String,
}

impl<M> LoadedModel<M> {
  pub fn model(&self) -> &M {
    &self.model
  }

  pub fn identity(&self) -> &str {
    &self.identity
  }
}

/// 模型句柄：首次调用时加载，之后一直复用。
///
/// 权重标识只在首次加载时读取，之后修改配置不会产生影响。
/// 首次加载失败的结果同样会被保存，后续调用直接返回该错误，不会重试，
/// 需要修正原因后重启进程。并发的首次调用只会构建一次模型。
pub struct ModelHandle<B: ModelBuilder> {
  builder: B,
  cell: OnceCell<Result<LoadedModel<B::Model>, ModelInitError>>,
}

impl<B: ModelBuilder> ModelHandle<B> {
  pub fn new(builder: B) -> Self {
    Self {
      builder,
      cell: OnceCell::new(),
    }
  }

  pub fn ensure_loaded(
    &self,
    config: &dyn ConfigProvider,
  ) -> Result<&LoadedModel<B::Model>, ModelInitError> {
    self
      .cell
      .get_or_init(|| {
        let weights = resolved_model_weights(config);
        info!("加载模型: {}", weights);
        match self.builder.build(&weights) {
          Ok(model) => {
            info!("模型加载完成");
            Ok(LoadedModel {
              model,
              identity: weights,
            })
          }
          Err(e) => {
            error!("模型加载失败: {}", e);
            Err(ModelInitError {
              weights,
              reason: e.to_string(),
            })
          }
        }
      })
      .as_ref()
      .map_err(Clone::clone)
  }

  pub fn is_initialized(&self) -> bool {
    self.cell.get().is_some()
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;
  use std::sync::atomic::{AtomicUsize, Ordering};

  use image::RgbImage;

  use super::*;
  use crate::config::{MODEL_WEIGHTS_KEY, StaticConfig};
  use crate::model::{ClassNames, DetectResult, InferParams, Model};

  #[derive(Debug)]
  struct Named(String);

  impl Model for Named {
    type Error = std::io::Error;

    fn infer(&self, _: &RgbImage, _: &InferParams) -> Result<DetectResult, Self::Error> {
      Ok(DetectResult {
        items: Box::new([]),
        names: ClassNames::default(),
      })
    }
  }

  #[derive(Default)]
  struct CountingBuilder {
    builds: AtomicUsize,
  }

  impl ModelBuilder for CountingBuilder {
    type Model = Named;
    type Error = String;

    fn build(&self, weights: &str) -> Result<Named, String> {
      self.builds.fetch_add(1, Ordering::SeqCst);
      if weights.ends_with(".missing") {
        return Err(format!("找不到 {}", weights));
      }
      std::thread::sleep(std::time::Duration::from_millis(20));
      Ok(Named(weights.to_string()))
    }
  }

  #[test]
  fn test_memoized_after_first_load() {
    let handle = ModelHandle::new(CountingBuilder::default());
    let config = StaticConfig::new().with(MODEL_WEIGHTS_KEY, "a.onnx");
    assert!(!handle.is_initialized());

    let first = handle.ensure_loaded(&config).unwrap() as *const LoadedModel<Named>;
    config.set(MODEL_WEIGHTS_KEY, "b.onnx");
    let second = handle.ensure_loaded(&config).unwrap();

    assert!(std::ptr::eq(first, second));
    assert_eq!(second.identity(), "a.onnx");
    assert_eq!(second.model().0, "a.onnx");
    assert_eq!(handle.builder.builds.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn test_default_weights() {
    let handle = ModelHandle::new(CountingBuilder::default());
    let loaded = handle.ensure_loaded(&StaticConfig::new()).unwrap();
    assert_eq!(loaded.identity(), "yolo11n.onnx");
  }

  #[test]
  fn test_failure_is_not_retried() {
    let handle = ModelHandle::new(CountingBuilder::default());
    let config = StaticConfig::new().with(MODEL_WEIGHTS_KEY, "w.missing");
    let err = handle.ensure_loaded(&config).unwrap_err();
    assert_eq!(err.weights, "w.missing");

    config.set(MODEL_WEIGHTS_KEY, "ok.onnx");
    assert_eq!(handle.ensure_loaded(&config).unwrap_err(), err);
    assert_eq!(handle.builder.builds.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn test_concurrent_first_calls_build_once() {
    let handle = Arc::new(ModelHandle::new(CountingBuilder::default()));
    let config = Arc::new(StaticConfig::new());
    let workers: Vec<_> = (0..8)
      .map(|_| {
        let handle = Arc::clone(&handle);
        let config = Arc::clone(&config);
        std::thread::spawn(move || {
          handle.ensure_loaded(&config).unwrap().identity().to_string()
        })
      })
      .collect();
    for worker in workers {
      assert_eq!(worker.join().unwrap(), "yolo11n.onnx");
    }
    assert_eq!(handle.builder.builds.load(Ordering::SeqCst), 1);
  }
}
