// 该文件是 Kanjian （看见） 项目的一部分。
// tests/detect.rs - 检测流水线与验证流程的端到端测试
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

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use image::RgbImage;

use kanjian::{
  BBox, BoxFormat, Detection, Pipeline,
  config::{
    ALLOWED_CLASSES_KEY, CONF_THRESHOLD_KEY, MODEL_WEIGHTS_KEY, StaticConfig,
    resolved_confidence_threshold,
  },
  model::{ClassNames, DetectItem, DetectResult, InferParams, Model, ModelBuilder, ModelHandle},
  validate::{Harness, HarnessOptions, Probe, ProbeError},
};

struct Fixed(Vec<DetectItem>);

impl Model for Fixed {
  type Error = std::io::Error;

  fn infer(&self, _: &RgbImage, _: &InferParams) -> Result<DetectResult, Self::Error> {
    Ok(DetectResult {
      items: self.0.clone().into_boxed_slice(),
      names: ClassNames::coco(),
    })
  }
}

struct FixedBuilder {
  items: Vec<DetectItem>,
  builds: AtomicUsize,
}

impl FixedBuilder {
  fn new(items: Vec<DetectItem>) -> Self {
    Self {
      items,
      builds: AtomicUsize::new(0),
    }
  }
}

impl ModelBuilder for FixedBuilder {
  type Model = Fixed;
  type Error = String;

  fn build(&self, weights: &str) -> Result<Fixed, String> {
    self.builds.fetch_add(1, Ordering::SeqCst);
    if weights.ends_with(".missing") {
      return Err(format!("找不到 {}", weights));
    }
    Ok(Fixed(self.items.clone()))
  }
}

fn png(width: u32, height: u32) -> Vec<u8> {
  let mut buf = Cursor::new(Vec::new());
  RgbImage::new(width, height)
    .write_to(&mut buf, image::ImageFormat::Png)
    .unwrap();
  buf.into_inner()
}

#[test]
fn car_is_reported_with_pixel_box() {
  let builder = FixedBuilder::new(vec![DetectItem {
    class_id: 2,
    score: 0.81,
    bbox: [10.0, 10.0, 110.0, 60.0],
  }]);
  let pipeline = Pipeline::new(Arc::new(ModelHandle::new(builder)), StaticConfig::new());

  let response = pipeline.infer(&png(200, 100)).unwrap();
  assert_eq!(response.image_size, [200, 100]);
  assert_eq!(
    response.detections,
    vec![Detection {
      class_name: "car".to_string(),
      confidence: 0.81,
      bbox: BBox { x: 10, y: 10, w: 100, h: 50 },
      box_format: BoxFormat::Xywh,
    }]
  );

  let json = serde_json::to_value(&response).unwrap();
  assert_eq!(json["detections"][0]["class"], "car");
  assert_eq!(json["detections"][0]["box_format"], "xywh");
}

#[test]
fn car_is_dropped_when_not_allowed() {
  let builder = FixedBuilder::new(vec![DetectItem {
    class_id: 2,
    score: 0.81,
    bbox: [10.0, 10.0, 110.0, 60.0],
  }]);
  let config = StaticConfig::new().with(ALLOWED_CLASSES_KEY, "person,truck,bus");
  let pipeline = Pipeline::new(Arc::new(ModelHandle::new(builder)), config);

  let response = pipeline.infer(&png(200, 100)).unwrap();
  assert!(response.detections.is_empty());
  assert_eq!(response.image_size, [200, 100]);
}

#[test]
fn classes_outside_allow_list_are_dropped() {
  let builder = FixedBuilder::new(vec![DetectItem {
    class_id: 16, // dog
    score: 0.95,
    bbox: [0.0, 0.0, 20.0, 20.0],
  }]);
  let pipeline = Pipeline::new(Arc::new(ModelHandle::new(builder)), StaticConfig::new());
  assert!(pipeline.infer(&png(32, 32)).unwrap().detections.is_empty());
}

#[test]
fn unparsable_threshold_falls_back() {
  let config = StaticConfig::new().with(CONF_THRESHOLD_KEY, "high");
  assert_eq!(resolved_confidence_threshold(&config), 0.25);
  config.set(CONF_THRESHOLD_KEY, " 0.4 ");
  assert_eq!(resolved_confidence_threshold(&config), 0.4);
}

#[test]
fn model_is_loaded_once() {
  let handle = Arc::new(ModelHandle::new(FixedBuilder::new(vec![])));
  let config = Arc::new(StaticConfig::new().with(MODEL_WEIGHTS_KEY, "first.onnx"));
  let pipeline = Pipeline::new(handle.clone(), config.clone());

  assert!(!handle.is_initialized());
  assert_eq!(pipeline.infer(&png(4, 4)).unwrap().model, "first.onnx");
  config.set(MODEL_WEIGHTS_KEY, "second.onnx");
  assert_eq!(pipeline.infer(&png(4, 4)).unwrap().model, "first.onnx");
  assert!(handle.is_initialized());
}

#[test]
fn failed_load_is_reported_on_every_call() {
  let config = StaticConfig::new().with(MODEL_WEIGHTS_KEY, "weights.missing");
  let pipeline = Pipeline::new(Arc::new(ModelHandle::new(FixedBuilder::new(vec![]))), config);
  assert!(pipeline.warm_up().is_err());
  let err = pipeline.infer(&png(4, 4)).unwrap_err();
  assert!(matches!(err, kanjian::DetectError::ModelInit(_)));
}

/// 把流水线当作检测服务，直接在进程内探测
struct InProcess<'a> {
  pipeline: &'a Pipeline<FixedBuilder, StaticConfig>,
}

impl Probe for InProcess<'_> {
  fn predict(&self, image: &Path) -> Result<Vec<Detection>, ProbeError> {
    let bytes = std::fs::read(image)?;
    self
      .pipeline
      .infer(&bytes)
      .map(|response| response.detections)
      .map_err(|e| ProbeError::Transport(e.to_string()))
  }
}

fn scratch_dir(tag: &str) -> PathBuf {
  let dir = std::env::temp_dir().join(format!("kanjian-it-{}-{}", tag, std::process::id()));
  let _ = std::fs::remove_dir_all(&dir);
  std::fs::create_dir_all(&dir).unwrap();
  dir
}

#[test]
fn harness_scores_pipeline_output() {
  let root = scratch_dir("harness");
  std::fs::create_dir_all(root.join("Cars")).unwrap();
  std::fs::create_dir_all(root.join("Helicopters")).unwrap();
  for i in 0..3 {
    std::fs::write(root.join(format!("Cars/{}.png", i)), png(50, 50)).unwrap();
  }
  std::fs::write(root.join("Cars/broken.png"), b"not a png").unwrap();
  std::fs::write(root.join("Helicopters/h.png"), png(10, 10)).unwrap();

  let builder = FixedBuilder::new(vec![DetectItem {
    class_id: 2,
    score: 0.6,
    bbox: [5.0, 5.0, 40.0, 40.0],
  }]);
  let pipeline = Pipeline::new(Arc::new(ModelHandle::new(builder)), StaticConfig::new());
  let options = HarnessOptions {
    per_class: 0,
    ..Default::default()
  };
  let report = Harness::new(InProcess { pipeline: &pipeline }, options)
    .run(&root)
    .unwrap();
  let _ = std::fs::remove_dir_all(&root);

  assert_eq!(report.summary.totals["Cars"], 3);
  assert_eq!(report.summary.hits["Cars"], 3);
  assert_eq!(report.summary.errors["Cars"], 1);
  assert_eq!(report.summary.skipped["Helicopters"], 1);
  assert_eq!(report.summary.all_hits, 3);
  assert!(report.summary.generated_at.is_some());
  assert_eq!(
    report.summary_lines().last().unwrap(),
    "TOTAL: 3/3  (100.0%)  | skipped total: 1  | errors total: 1"
  );
}
