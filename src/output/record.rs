// 该文件是 Chewei （车位） 项目的一部分。
// src/output/record.rs - 汇总表格与运行报告导出
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

use std::{fs::File, io::Write, path::Path};

use csv::WriterBuilder;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::{
  occupancy::{OccupancyStatus, SlotResult},
  summary::{CorpusSummary, RunReport},
};

pub const SUMMARY_HEADER: [&str; 4] = ["image_id", "total_slots", "occupied_count", "empty_count"];
pub const SLOT_HEADER: [&str; 8] = [
  "image_id",
  "x_min",
  "y_min",
  "x_max",
  "y_max",
  "detector_confidence",
  "occupancy_probability",
  "status",
];

#[derive(Error, Debug)]
pub enum RecordError {
  #[error("CSV 写入错误: {0}")]
  Csv(#[from] csv::Error),
  #[error("I/O 错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("JSON 序列化错误: {0}")]
  Json(#[from] serde_json::Error),
}

fn create_file(path: &Path) -> Result<File, RecordError> {
  if let Some(parent) = path.parent()
    && !parent.as_os_str().is_empty()
  {
    std::fs::create_dir_all(parent)?;
  }
  Ok(File::create(path)?)
}

/// 写出汇总表，表头总是存在（空批次也只输出表头）
pub fn write_summary_csv<W: Write>(writer: W, corpus: &CorpusSummary) -> Result<(), RecordError> {
  let mut writer = WriterBuilder::new().has_headers(false).from_writer(writer);
  writer.write_record(SUMMARY_HEADER)?;
  for summary in corpus {
    writer.serialize(summary)?;
  }
  writer.flush()?;
  Ok(())
}

pub fn save_summary_csv(path: impl AsRef<Path>, corpus: &CorpusSummary) -> Result<(), RecordError> {
  let path = path.as_ref();
  write_summary_csv(create_file(path)?, corpus)?;
  info!("汇总表已保存到: {} ({} 行)", path.display(), corpus.len());
  Ok(())
}

#[derive(Serialize)]
struct SlotRow<'a> {
  image_id: &'a str,
  x_min: i32,
  y_min: i32,
  x_max: i32,
  y_max: i32,
  detector_confidence: f32,
  occupancy_probability: f32,
  status: OccupancyStatus,
}

/// 逐图追加车位明细
pub struct SlotRecorder<W: Write = File> {
  writer: csv::Writer<W>,
  rows: usize,
}

impl SlotRecorder<File> {
  pub fn create(path: impl AsRef<Path>) -> Result<Self, RecordError> {
    Self::from_writer(create_file(path.as_ref())?)
  }
}

impl<W: Write> SlotRecorder<W> {
  pub fn from_writer(writer: W) -> Result<Self, RecordError> {
    let mut writer = WriterBuilder::new().has_headers(false).from_writer(writer);
    writer.write_record(SLOT_HEADER)?;
    Ok(Self { writer, rows: 0 })
  }

  pub fn record(&mut self, image_id: &str, slots: &[SlotResult]) -> Result<(), RecordError> {
    for slot in slots {
      self.writer.serialize(SlotRow {
        image_id,
        x_min: slot.bbox.x_min,
        y_min: slot.bbox.y_min,
        x_max: slot.bbox.x_max,
        y_max: slot.bbox.y_max,
        detector_confidence: slot.detector_confidence,
        occupancy_probability: slot.occupancy_probability,
        status: slot.status,
      })?;
      self.rows += 1;
    }
    Ok(())
  }

  pub fn rows(&self) -> usize {
    self.rows
  }

  /// 刷新并取回底层写入器
  pub fn finish(self) -> Result<W, RecordError> {
    self
      .writer
      .into_inner()
      .map_err(|e| RecordError::Io(e.into_error()))
  }
}

pub fn write_report_json<W: Write>(writer: W, report: &RunReport) -> Result<(), RecordError> {
  serde_json::to_writer_pretty(writer, report)?;
  Ok(())
}

pub fn save_report_json(path: impl AsRef<Path>, report: &RunReport) -> Result<(), RecordError> {
  let path = path.as_ref();
  let mut file = create_file(path)?;
  write_report_json(&mut file, report)?;
  file.write_all(b"\n")?;
  info!("运行报告已保存到: {}", path.display());
  Ok(())
}
