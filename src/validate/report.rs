// 该文件是 Kanjian （看见） 项目的一部分。
// src/validate/report.rs - 验证统计与结果导出
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

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;

use crate::response::Detection;
use crate::validate::HarnessError;

/// 一次成功探测的记录
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationRecord {
  pub class_folder: String,
  pub image: String,
  pub expected: String,
  pub found: bool,
  pub top3: Vec<Detection>,
  pub raw_count: usize,
}

impl ValidationRecord {
  pub fn score(class_folder: &str, image: &Path, expected: &str, detections: &[Detection]) -> Self {
    Self {
      class_folder: class_folder.to_string(),
      image: image.to_string_lossy().replace('\\', "/"),
      expected: expected.to_string(),
      found: detections.iter().any(|d| d.class_name == expected),
      top3: top3(detections),
      raw_count: detections.len(),
    }
  }

  /// `class:conf` 预览，空时为 `—`
  pub fn preview(&self) -> String {
    if self.top3.is_empty() {
      return "—".to_string();
    }
    self
      .top3
      .iter()
      .map(|d| format!("{}:{:.2}", d.class_name, d.confidence))
      .collect::<Vec<_>>()
      .join(", ")
  }
}

/// 置信度最高的三个检测；稳定排序，相同置信度保持原始顺序
pub fn top3(detections: &[Detection]) -> Vec<Detection> {
  let mut sorted = detections.to_vec();
  sorted.sort_by(|a, b| {
    b.confidence
      .partial_cmp(&a.confidence)
      .unwrap_or(Ordering::Equal)
  });
  sorted.truncate(3);
  sorted
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Summary {
  pub totals: BTreeMap<String, u32>,
  pub hits: BTreeMap<String, u32>,
  pub skipped: BTreeMap<String, u32>,
  pub errors: BTreeMap<String, u32>,
  pub all_total: u32,
  pub all_hits: u32,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub generated_at: Option<String>,
}

pub fn hit_rate(hits: u32, totals: u32) -> f64 {
  if totals == 0 {
    0.0
  } else {
    f64::from(hits) / f64::from(totals) * 100.0
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Report {
  pub summary: Summary,
  pub results: Vec<ValidationRecord>,
}

impl Report {
  pub fn record(&mut self, record: ValidationRecord) {
    let folder = record.class_folder.clone();
    *self.summary.totals.entry(folder.clone()).or_default() += 1;
    let hits = self.summary.hits.entry(folder).or_default();
    if record.found {
      *hits += 1;
    }
    self.results.push(record);
  }

  pub fn record_skipped(&mut self, folder: &str, count: usize) {
    *self.summary.skipped.entry(folder.to_string()).or_default() += count as u32;
  }

  pub fn record_error(&mut self, folder: &str) {
    *self.summary.errors.entry(folder.to_string()).or_default() += 1;
  }

  /// 汇总全局计数并标记生成时间
  pub fn finish(&mut self) {
    self.summary.all_total = self.summary.totals.values().sum();
    self.summary.all_hits = self.summary.hits.values().sum();
    self.summary.generated_at = Some(chrono::Utc::now().to_rfc3339());
  }

  pub fn summary_lines(&self) -> Vec<String> {
    let s = &self.summary;
    let mut lines: Vec<String> = s
      .totals
      .iter()
      .map(|(class, &total)| {
        let hits = s.hits.get(class).copied().unwrap_or(0);
        format!(
          "{:<12}: {:>3}/{:>3}  ({:>5.1}%)  skipped:{}",
          class,
          hits,
          total,
          hit_rate(hits, total),
          s.skipped.get(class).copied().unwrap_or(0)
        )
      })
      .collect();
    lines.push(String::new());
    lines.push(format!(
      "TOTAL: {}/{}  ({:.1}%)  | skipped total: {}  | errors total: {}",
      s.all_hits,
      s.all_total,
      hit_rate(s.all_hits, s.all_total),
      s.skipped.values().sum::<u32>(),
      s.errors.values().sum::<u32>()
    ));
    lines
  }

  pub fn write_json(&self, path: &Path) -> Result<(), HarnessError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
      std::fs::create_dir_all(parent)?;
    }
    let text = serde_json::to_string_pretty(self)?;
    std::fs::write(path, text)?;
    Ok(())
  }
}
