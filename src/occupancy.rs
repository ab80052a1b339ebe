// 该文件是 Chewei （车位） 项目的一部分。
// src/occupancy.rs - 占用判定策略与车位结果
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

use serde::Serialize;

use crate::model::PixelBox;

/// 车位占用状态，`Empty < Occupied`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OccupancyStatus {
  Empty,
  Occupied,
}

impl OccupancyStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      OccupancyStatus::Empty => "empty",
      OccupancyStatus::Occupied => "occupied",
    }
  }
}

impl std::fmt::Display for OccupancyStatus {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// 概率严格大于阈值时判为占用，等于阈值判为空闲
pub fn decide(probability: f32, threshold: f32) -> OccupancyStatus {
  if probability > threshold {
    OccupancyStatus::Occupied
  } else {
    OccupancyStatus::Empty
  }
}

/// 单个车位的分类结果
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SlotResult {
  /// 裁剪到图像范围内的边界框
  pub bbox: PixelBox,
  pub detector_confidence: f32,
  pub occupancy_probability: f32,
  pub status: OccupancyStatus,
}

impl SlotResult {
  pub fn is_occupied(&self) -> bool {
    self.status == OccupancyStatus::Occupied
  }
}
