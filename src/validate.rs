// 该文件是 Kanjian （看见） 项目的一部分。
// src/validate.rs - 数据集批量验证
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

use std::path::{Path, PathBuf};
use std::sync::mpsc::Receiver;

use rand::SeedableRng;
use rand::rngs::StdRng;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::label::is_producible;

pub mod corpus;
pub mod probe;
pub mod report;

pub use self::probe::{HttpProbe, Probe, ProbeError};
pub use self::report::{Report, Summary, ValidationRecord};

#[derive(Error, Debug)]
pub enum HarnessError {
  #[error("数据集目录不存在: {0}")]
  CorpusNotFound(PathBuf),
  #[error("I/O 错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("结果导出失败: {0}")]
  Dump(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct HarnessOptions {
  /// 每个类别最多使用的图像数，0 表示不限制
  pub per_class: usize,
  pub shuffle: bool,
  pub seed: Option<u64>,
}

impl Default for HarnessOptions {
  fn default() -> Self {
    Self {
      per_class: 10,
      shuffle: false,
      seed: None,
    }
  }
}

/// 逐类别探测数据集图像并统计命中率。
///
/// 单张图像的探测错误只记录日志并计入 `errors`，不计入总数和命中数。
pub struct Harness<P: Probe> {
  probe: P,
  options: HarnessOptions,
  interrupt: Option<Receiver<()>>,
}

impl<P: Probe> Harness<P> {
  pub fn new(probe: P, options: HarnessOptions) -> Self {
    Self {
      probe,
      options,
      interrupt: None,
    }
  }

  /// 收到信号后在当前图像处理完成时停止
  pub fn with_interrupt(mut self, interrupt: Receiver<()>) -> Self {
    self.interrupt = Some(interrupt);
    self
  }

  fn interrupted(&self) -> bool {
    self
      .interrupt
      .as_ref()
      .map(|rx| rx.try_recv().is_ok())
      .unwrap_or(false)
  }

  pub fn run(&self, corpus_dir: &Path) -> Result<Report, HarnessError> {
    let buckets = corpus::discover(corpus_dir)?;
    let mut rng = match self.options.seed {
      Some(seed) => StdRng::seed_from_u64(seed),
      None => StdRng::from_entropy(),
    };
    let mut report = Report::default();

    'folders: for (folder, images) in buckets {
      let Some(expected) = corpus::expected_label(&folder) else {
        warn!("未知目录 '{}'，跳过其中的图像", folder);
        continue;
      };

      let shuffle = self.options.shuffle.then_some(&mut rng);
      let selected = corpus::select(images, self.options.per_class, shuffle);

      if !is_producible(expected) {
        for image in &selected {
          info!("SKIP [{}] {}  (unsupported '{}')", folder, file_name(image), expected);
        }
        report.record_skipped(&folder, selected.len());
        continue;
      }

      for image in &selected {
        if self.interrupted() {
          warn!("中断信号接收，停止验证");
          break 'folders;
        }

        let detections = match self.probe.predict(image) {
          Ok(detections) => detections,
          Err(e) => {
            error!("ERR  [{}] {} → API error: {}", folder, file_name(image), e);
            report.record_error(&folder);
            continue;
          }
        };

        let record = ValidationRecord::score(&folder, image, expected, &detections);
        if record.found {
          info!(
            "OK   [{}] {} → found '{}'  | {}",
            folder,
            file_name(image),
            expected,
            record.preview()
          );
        } else {
          info!(
            "MISS [{}] {} → no '{}'  | {}",
            folder,
            file_name(image),
            expected,
            record.preview()
          );
        }
        report.record(record);
      }
    }

    report.finish();
    Ok(report)
  }
}

fn file_name(path: &Path) -> String {
  path
    .file_name()
    .map(|name| name.to_string_lossy().into_owned())
    .unwrap_or_default()
}
