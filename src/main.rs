// 该文件是 Chewei （车位） 项目的一部分。
// src/main.rs - 项目主程序
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

mod args;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use chewei::{
  FromUrl,
  cascade::Cascade,
  frame::{CLASSIFIER_INPUT_H, CLASSIFIER_INPUT_W},
  input::ImageFileInput,
  model::{ClassifierWrapper, DetectorWrapper},
  output::{
    AnnotatedDirectoryOutput,
    record::{save_report_json, save_summary_csv},
  },
  task::{BatchTask, Task},
};

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = args::Args::parse();
  let config = args.config();
  config.validate()?;

  info!("检测模型: {}", args.detector);
  info!("分类模型: {}", args.classifier);
  info!("输入来源: {}", args.input);
  info!("输出目录: {}", args.output);
  info!(
    "阈值: 检测置信度 {}, NMS {}, 占用 {}",
    config.detector_confidence, config.overlap_threshold, config.occupancy_threshold
  );

  // 模型加载失败直接退出，此时尚未处理任何图像
  let detector = DetectorWrapper::from_url(&args.detector)
    .with_context(|| format!("无法加载检测模型 {}", args.detector))?;
  let classifier =
    ClassifierWrapper::<CLASSIFIER_INPUT_W, CLASSIFIER_INPUT_H>::from_url(&args.classifier)
      .with_context(|| format!("无法加载分类模型 {}", args.classifier))?;
  info!("模型加载完成");

  let input = ImageFileInput::from_url(&args.input_url()?)?;
  let output = AnnotatedDirectoryOutput::from_url(&args.output_url()?)?;
  let cascade: Cascade<_, _> = Cascade::new(detector, classifier);

  let report = BatchTask::new(config)
    .with_max_images(args.max_images)
    .with_slot_record(args.slots_csv.clone())
    .with_ctrlc()?
    .run_task(input, &cascade, output)?;

  save_summary_csv(&args.summary_csv, &report.images)?;
  if let Some(path) = &args.report {
    save_report_json(path, &report)?;
  }

  info!(
    "全部完成: 车位 {}, 占用 {}, 空闲 {}",
    report.images.total_slots(),
    report.images.occupied_count(),
    report.images.empty_count()
  );
  info!("{}", report.stats);

  Ok(())
}
