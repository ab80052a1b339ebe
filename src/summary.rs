// 该文件是 Chewei （车位） 项目的一部分。
// src/summary.rs - 单图与整批汇总记录
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

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{cascade::DropStats, config::CascadeConfig, occupancy::SlotResult};

/// 单张图像的汇总，字段顺序即导出列顺序
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageSummary {
  pub image_id: String,
  pub total_slots: usize,
  pub occupied_count: usize,
  pub empty_count: usize,
}

impl ImageSummary {
  pub fn new(image_id: impl Into<String>, occupied_count: usize, empty_count: usize) -> Self {
    Self {
      image_id: image_id.into(),
      total_slots: occupied_count + empty_count,
      occupied_count,
      empty_count,
    }
  }

  pub fn from_slots(image_id: impl Into<String>, slots: &[SlotResult]) -> Self {
    let occupied = slots.iter().filter(|slot| slot.is_occupied()).count();
    Self::new(image_id, occupied, slots.len() - occupied)
  }
}

/// 按处理顺序追加的整批汇总
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct CorpusSummary {
  images: Vec<ImageSummary>,
}

impl CorpusSummary {
  pub fn push(&mut self, summary: ImageSummary) {
    self.images.push(summary);
  }

  pub fn len(&self) -> usize {
    self.images.len()
  }

  pub fn is_empty(&self) -> bool {
    self.images.is_empty()
  }

  pub fn iter(&self) -> std::slice::Iter<'_, ImageSummary> {
    self.images.iter()
  }

  pub fn total_slots(&self) -> usize {
    self.images.iter().map(|s| s.total_slots).sum()
  }

  pub fn occupied_count(&self) -> usize {
    self.images.iter().map(|s| s.occupied_count).sum()
  }

  pub fn empty_count(&self) -> usize {
    self.images.iter().map(|s| s.empty_count).sum()
  }
}

impl<'a> IntoIterator for &'a CorpusSummary {
  type Item = &'a ImageSummary;
  type IntoIter = std::slice::Iter<'a, ImageSummary>;

  fn into_iter(self) -> Self::IntoIter {
    self.images.iter()
  }
}

/// 整批运行计数
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunStats {
  pub images_processed: usize,
  pub images_skipped: usize,
  pub detections: usize,
  pub degenerate_regions: usize,
  pub unclassifiable_regions: usize,
}

impl RunStats {
  /// 合并一张已完成图像的丢弃计数
  pub fn record_drops(&mut self, drops: &DropStats) {
    self.detections += drops.detections;
    self.degenerate_regions += drops.degenerate;
    self.unclassifiable_regions += drops.unclassifiable;
  }
}

impl std::fmt::Display for RunStats {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(
      f,
      "已处理图像 {}, 跳过图像 {}, 检测区域 {}, 丢弃区域: 裁剪为空 {}, 无法分类 {}",
      self.images_processed,
      self.images_skipped,
      self.detections,
      self.degenerate_regions,
      self.unclassifiable_regions
    )
  }
}

/// 一次批处理的完整报告
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
  pub started_at: DateTime<Utc>,
  pub finished_at: DateTime<Utc>,
  pub config: CascadeConfig,
  pub stats: RunStats,
  /// 收到中断信号而提前结束
  pub interrupted: bool,
  pub images: CorpusSummary,
}
