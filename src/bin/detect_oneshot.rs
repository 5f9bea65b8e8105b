// 该文件是 Kanjian （看见） 项目的一部分。
// src/bin/detect_oneshot.rs - 单张图像检测
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

use anyhow::Result;
use clap::Parser;
use tracing::info;

use kanjian::{
  Pipeline,
  config::EnvConfig,
  model::{ModelHandle, YoloOnnxBuilder},
};

/// 对单张图像运行检测并输出 JSON
///
/// 模型与过滤参数从环境变量读取：
/// MODEL_WEIGHTS、ALLOWED_CLASSES、CONF_THRESHOLD、IMGSZ
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 图像文件路径或 http(s) 地址
  #[arg(long, value_name = "SOURCE")]
  pub input: String,
  /// ONNX Runtime 线程数
  #[arg(long, default_value = "4", value_name = "N")]
  pub threads: usize,
  /// 格式化输出
  #[arg(long)]
  pub pretty: bool,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();
  info!("输入来源: {}", args.input);

  let builder = YoloOnnxBuilder::default().intra_threads(args.threads);
  let handle = Arc::new(ModelHandle::new(builder));
  let pipeline = Pipeline::new(handle, EnvConfig);

  let identity = pipeline.warm_up()?;
  info!("模型已加载: {}", identity);

  let now = std::time::Instant::now();
  let response = if args.input.starts_with("http://") || args.input.starts_with("https://") {
    pipeline.infer_from_url(&args.input)?
  } else {
    let bytes = std::fs::read(&args.input)?;
    pipeline.infer(&bytes)?
  };
  info!("检测完成，耗时: {:.2?}", now.elapsed());

  let text = if args.pretty {
    serde_json::to_string_pretty(&response)?
  } else {
    serde_json::to_string(&response)?
  };
  println!("{}", text);

  Ok(())
}
