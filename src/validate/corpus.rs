// 该文件是 Kanjian （看见） 项目的一部分。
// src/validate/corpus.rs - 标注数据集遍历
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
use std::path::{Path, PathBuf};

use rand::Rng;
use rand::seq::SliceRandom;

use crate::validate::HarnessError;

pub const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "webp", "bmp"];

/// 数据集目录名 → 期望的目标标签
pub const FOLDER_LABELS: [(&str, &str); 9] = [
  ("Airplanes", "airplanes"),
  ("Bikes", "motorbikes"),
  ("MotorBikes", "motorbikes"),
  ("Buses", "buses"),
  ("Cars", "car"),
  ("Helicopters", "helicopters"),
  ("Ships", "ships"),
  ("Trains", "trains"),
  ("Trucks", "trucks"),
];

pub fn expected_label(folder: &str) -> Option<&'static str> {
  FOLDER_LABELS
    .iter()
    .find(|(name, _)| *name == folder)
    .map(|(_, label)| *label)
}

pub fn is_image(path: &Path) -> bool {
  path
    .extension()
    .and_then(|ext| ext.to_str())
    .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
    .unwrap_or(false)
}

/// 列出每个类别目录下（递归）的图像，目录名保留原始大小写。
/// 没有图像的目录不会出现在结果中。
pub fn discover(corpus_dir: &Path) -> Result<BTreeMap<String, Vec<PathBuf>>, HarnessError> {
  if !corpus_dir.is_dir() {
    return Err(HarnessError::CorpusNotFound(corpus_dir.to_path_buf()));
  }

  let mut buckets = BTreeMap::new();
  for entry in std::fs::read_dir(corpus_dir)? {
    let entry = entry?;
    if !entry.path().is_dir() {
      continue;
    }
    let folder = entry.file_name().to_string_lossy().into_owned();
    let mut images = Vec::new();
    collect_images(&entry.path(), &mut images)?;
    if !images.is_empty() {
      images.sort();
      buckets.insert(folder, images);
    }
  }
  Ok(buckets)
}

fn collect_images(dir: &Path, images: &mut Vec<PathBuf>) -> Result<(), HarnessError> {
  for entry in std::fs::read_dir(dir)? {
    let entry = entry?;
    let path = entry.path();
    if entry.file_type()?.is_dir() {
      collect_images(&path, images)?;
    } else if path.is_file() && is_image(&path) {
      images.push(path);
    }
  }
  Ok(())
}

/// 可选打乱，然后按上限截断（0 表示不限制）
pub fn select<R: Rng>(
  mut images: Vec<PathBuf>,
  per_class: usize,
  shuffle: Option<&mut R>,
) -> Vec<PathBuf> {
  if let Some(rng) = shuffle {
    images.shuffle(rng);
  }
  if per_class > 0 {
    images.truncate(per_class);
  }
  images
}
