// 该文件是 Chewei （车位） 项目的一部分。
// src/args.rs - 命令行参数
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

use clap::Parser;
use url::Url;

use chewei::config::{
  CascadeConfig, DEFAULT_DETECTOR_CONFIDENCE, DEFAULT_OCCUPANCY_THRESHOLD,
  DEFAULT_OVERLAP_THRESHOLD,
};

/// Chewei 停车位占用检测
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 车位检测模型，例如 yolov8:///models/slots.rknn?size=640&classes=1
  #[arg(long, value_name = "MODEL")]
  pub detector: Url,

  /// 占用分类模型，例如 slotcls:///models/occupancy.rknn
  #[arg(long, value_name = "MODEL")]
  pub classifier: Url,

  /// 输入图像目录或单张图像（image:///path 或文件系统路径）
  #[arg(long, value_name = "SOURCE")]
  pub input: String,

  /// 标注图像输出目录（folder:///path 或文件系统路径）
  #[arg(long, value_name = "OUTPUT")]
  pub output: String,

  /// 检测置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value_t = DEFAULT_DETECTOR_CONFIDENCE, value_name = "THRESHOLD")]
  pub confidence: f32,

  /// NMS IOU 阈值 (0.0 - 1.0)
  #[arg(long, default_value_t = DEFAULT_OVERLAP_THRESHOLD, value_name = "THRESHOLD")]
  pub nms_threshold: f32,

  /// 占用判定阈值 (0.0 - 1.0)，概率严格大于该值判为占用
  #[arg(long, default_value_t = DEFAULT_OCCUPANCY_THRESHOLD, value_name = "THRESHOLD")]
  pub occupancy_threshold: f32,

  /// 汇总表输出路径
  #[arg(long, default_value = "parking_summary.csv", value_name = "FILE")]
  pub summary_csv: PathBuf,

  /// 逐车位明细表输出路径
  #[arg(long, value_name = "FILE")]
  pub slots_csv: Option<PathBuf>,

  /// JSON 运行报告输出路径
  #[arg(long, value_name = "FILE")]
  pub report: Option<PathBuf>,

  /// 最大处理图像数
  #[arg(long, value_name = "COUNT")]
  pub max_images: Option<usize>,
}

impl Args {
  pub fn config(&self) -> CascadeConfig {
    CascadeConfig::default()
      .with_detector_confidence(self.confidence)
      .with_overlap_threshold(self.nms_threshold)
      .with_occupancy_threshold(self.occupancy_threshold)
  }

  pub fn input_url(&self) -> Result<Url, url::ParseError> {
    location_url(&self.input, "image")
  }

  pub fn output_url(&self) -> Result<Url, url::ParseError> {
    location_url(&self.output, "folder")
  }
}

/// 已带方案的位置原样解析，否则视为文件系统路径并加上默认方案
fn location_url(location: &str, scheme: &str) -> Result<Url, url::ParseError> {
  if location.contains("://") {
    return Url::parse(location);
  }

  let path = std::path::absolute(location).unwrap_or_else(|_| PathBuf::from(location));
  let mut url = Url::parse(&format!("{}://", scheme))?;
  url.set_path(&path.to_string_lossy());
  Ok(url)
}
