// 该文件是 Kanjian （看见） 项目的一部分。
// src/label.rs - 原生类别与目标类别的映射
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

/// COCO 数据集类别名称（模型原生词表）
pub const COCO_CLASSES: [&str; 80] = [
  "person",
  "bicycle",
  "car",
  "motorcycle",
  "airplane",
  "bus",
  "train",
  "truck",
  "boat",
  "traffic light",
  "fire hydrant",
  "stop sign",
  "parking meter",
  "bench",
  "bird",
  "cat",
  "dog",
  "horse",
  "sheep",
  "cow",
  "elephant",
  "bear",
  "zebra",
  "giraffe",
  "backpack",
  "umbrella",
  "handbag",
  "tie",
  "suitcase",
  "frisbee",
  "skis",
  "snowboard",
  "sports ball",
  "kite",
  "baseball bat",
  "baseball glove",
  "skateboard",
  "surfboard",
  "tennis racket",
  "bottle",
  "wine glass",
  "cup",
  "fork",
  "knife",
  "spoon",
  "bowl",
  "banana",
  "apple",
  "sandwich",
  "orange",
  "broccoli",
  "carrot",
  "hot dog",
  "pizza",
  "donut",
  "cake",
  "chair",
  "couch",
  "potted plant",
  "bed",
  "dining table",
  "toilet",
  "tv",
  "laptop",
  "mouse",
  "remote",
  "keyboard",
  "cell phone",
  "microwave",
  "oven",
  "toaster",
  "sink",
  "refrigerator",
  "book",
  "clock",
  "vase",
  "scissors",
  "teddy bear",
  "hair drier",
  "toothbrush",
];

/// 原生类别名 → 目标词表
const LABEL_OUT: [(&str, &str); 8] = [
  ("motorcycle", "motorbikes"),
  ("boat", "ships"),
  ("airplane", "airplanes"),
  ("bus", "buses"),
  ("truck", "trucks"),
  ("train", "trains"),
  ("car", "car"),
  ("person", "person"),
];

/// 将模型原生类别名翻译为目标词表中的名称。
///
/// 表中不存在的名称原样返回。过滤发生在映射之前，
/// 因此允许列表必须使用原生名称。
pub fn map_label(native_name: &str) -> String {
  LABEL_OUT
    .iter()
    .find(|(native, _)| *native == native_name)
    .map(|(_, target)| (*target).to_string())
    .unwrap_or_else(|| native_name.to_string())
}

/// 目标标签是否可能由模型产生（即存在某个原生类别映射到它）
pub fn is_producible(target_label: &str) -> bool {
  COCO_CLASSES
    .iter()
    .any(|native| map_label(native) == target_label)
}
