// 该文件是 Kanjian （看见） 项目的一部分。
// src/bin/validate_dataset.rs - 数据集批量验证
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

use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};
use url::Url;

use kanjian::{
  FromUrl,
  validate::{Harness, HarnessOptions, HttpProbe},
};

/// 对标注数据集逐张调用检测服务，统计每类命中率
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 数据集根目录，图像位于 <ROOT>/Vehicles/<类别>/ 下
  #[arg(long, default_value = "data", value_name = "ROOT")]
  pub root: PathBuf,
  /// 检测服务地址
  #[arg(long, default_value = "http://localhost:8000", value_name = "URL")]
  pub api: Url,
  /// 每个类别最多验证的图像数（0 表示不限制）
  #[arg(long, default_value = "10", value_name = "COUNT")]
  pub per_class: usize,
  /// 截断前随机打乱
  #[arg(long)]
  pub shuffle: bool,
  /// 随机种子
  #[arg(long, value_name = "SEED")]
  pub seed: Option<u64>,
  /// 保存原始结果的 JSON 文件路径
  #[arg(long, value_name = "FILE")]
  pub save_json: Option<PathBuf>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();
  let corpus_dir = args.root.join("Vehicles");
  info!("数据集目录: {}", corpus_dir.display());
  info!("检测服务: {}", args.api);

  let (tx, rx) = std::sync::mpsc::channel();
  ctrlc::set_handler(move || {
    info!("收到中断信号，准备退出...");
    let _ = tx.send(());
    thread::spawn(|| {
      thread::sleep(Duration::from_secs(30));
      warn!("强制退出程序");
      std::process::exit(1);
    });
  })?;

  let probe = HttpProbe::from_url(&args.api)?;
  let options = HarnessOptions {
    per_class: args.per_class,
    shuffle: args.shuffle,
    seed: args.seed,
  };
  let report = Harness::new(probe, options)
    .with_interrupt(rx)
    .run(&corpus_dir)?;

  println!("\n=== SUMMARY ===");
  for line in report.summary_lines() {
    println!("{}", line);
  }

  if let Some(path) = args.save_json {
    report.write_json(&path)?;
    println!("\nSaved raw results to: {}", path.display());
  }

  Ok(())
}
