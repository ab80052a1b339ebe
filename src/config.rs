// 该文件是 Chewei （车位） 项目的一部分。
// src/config.rs - 级联阈值配置
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
use thiserror::Error;

pub const DEFAULT_DETECTOR_CONFIDENCE: f32 = 0.3;
pub const DEFAULT_OVERLAP_THRESHOLD: f32 = 0.5;
pub const DEFAULT_OCCUPANCY_THRESHOLD: f32 = 0.7;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
  #[error("阈值 {name} 必须位于 [0, 1] 区间内, 实际为 {value}")]
  OutOfRange { name: &'static str, value: f32 },
}

/// 每次运行可独立调整的三个阈值
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CascadeConfig {
  /// 检测置信度阈值，低于该值的区域被丢弃
  pub detector_confidence: f32,
  /// 重叠抑制（NMS）阈值
  pub overlap_threshold: f32,
  /// 占用判定阈值
  pub occupancy_threshold: f32,
}

impl Default for CascadeConfig {
  fn default() -> Self {
    Self {
      detector_confidence: DEFAULT_DETECTOR_CONFIDENCE,
      overlap_threshold: DEFAULT_OVERLAP_THRESHOLD,
      occupancy_threshold: DEFAULT_OCCUPANCY_THRESHOLD,
    }
  }
}

impl CascadeConfig {
  pub fn with_detector_confidence(mut self, value: f32) -> Self {
    self.detector_confidence = value;
    self
  }

  pub fn with_overlap_threshold(mut self, value: f32) -> Self {
    self.overlap_threshold = value;
    self
  }

  pub fn with_occupancy_threshold(mut self, value: f32) -> Self {
    self.occupancy_threshold = value;
    self
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    for (name, value) in [
      ("detector_confidence", self.detector_confidence),
      ("overlap_threshold", self.overlap_threshold),
      ("occupancy_threshold", self.occupancy_threshold),
    ] {
      if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::OutOfRange { name, value });
      }
    }
    Ok(())
  }
}
