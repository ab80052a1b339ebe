// 该文件是 Chewei （车位） 项目的一部分。
// src/model.rs - 模型能力接口与检测结果定义
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

use image::RgbImage;
use serde::Serialize;
use thiserror::Error;
use url::Url;

#[cfg(feature = "rknpu")]
use crate::FromUrlWithScheme;
use crate::{FromUrl, frame::SlotCrop};

pub mod yolo;

#[cfg(feature = "rknpu")]
mod rknn;
#[cfg(feature = "rknpu")]
pub use self::rknn::{RknnError, RknnSlotClassifier, RknnSlotClassifierBuilder, RknnYolov8, RknnYolov8Builder};

/// 像素坐标系下的轴对齐边界框，原点位于左上角，右/下边界不含
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct PixelBox {
  pub x_min: i32,
  pub y_min: i32,
  pub x_max: i32,
  pub y_max: i32,
}

impl PixelBox {
  pub const fn new(x_min: i32, y_min: i32, x_max: i32, y_max: i32) -> Self {
    Self {
      x_min,
      y_min,
      x_max,
      y_max,
    }
  }

  /// 由浮点 [x_min, y_min, x_max, y_max] 转换，向零截断
  pub fn from_xyxy(bbox: [f32; 4]) -> Self {
    Self::new(bbox[0] as i32, bbox[1] as i32, bbox[2] as i32, bbox[3] as i32)
  }

  pub fn width(&self) -> i32 {
    self.x_max.saturating_sub(self.x_min)
  }

  pub fn height(&self) -> i32 {
    self.y_max.saturating_sub(self.y_min)
  }

  /// 面积为零或为负
  pub fn is_degenerate(&self) -> bool {
    self.width() <= 0 || self.height() <= 0
  }

  pub fn center(&self) -> (i32, i32) {
    (
      ((self.x_min as i64 + self.x_max as i64) / 2) as i32,
      ((self.y_min as i64 + self.y_max as i64) / 2) as i32,
    )
  }

  /// 裁剪到 `[0, width) x [0, height)`，裁剪后为空则返回 `None`
  pub fn clip(&self, width: u32, height: u32) -> Option<PixelBox> {
    let w = i32::try_from(width).unwrap_or(i32::MAX);
    let h = i32::try_from(height).unwrap_or(i32::MAX);

    let clipped = PixelBox::new(
      self.x_min.max(0),
      self.y_min.max(0),
      self.x_max.min(w),
      self.y_max.min(h),
    );

    if clipped.is_degenerate() {
      None
    } else {
      Some(clipped)
    }
  }
}

impl std::fmt::Display for PixelBox {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(
      f,
      "({}, {}, {}, {})",
      self.x_min, self.y_min, self.x_max, self.y_max
    )
  }
}

/// 一个候选车位区域
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectItem {
  pub score: f32,
  pub bbox: PixelBox,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectResult {
  pub items: Box<[DetectItem]>,
}

impl DetectResult {
  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn iter(&self) -> std::slice::Iter<'_, DetectItem> {
    self.items.iter()
  }
}

impl From<Vec<DetectItem>> for DetectResult {
  fn from(items: Vec<DetectItem>) -> Self {
    Self {
      items: items.into_boxed_slice(),
    }
  }
}

/// 第一阶段：车位区域检测
///
/// 返回顺序即检测器自身的输出顺序，调用方不会重新排序。
/// 没有任何区域超过阈值时返回空结果，这不是错误。
pub trait RegionDetector {
  type Error: std::error::Error + Send + Sync + 'static;

  fn detect(
    &self,
    image: &RgbImage,
    confidence_threshold: f32,
    overlap_threshold: f32,
  ) -> Result<DetectResult, Self::Error>;
}

/// 第二阶段：车位占用分类
///
/// 输入已经缩放并归一化，实现不应再做预处理。相同输入必须得到相同输出。
pub trait OccupancyClassifier<const W: u32, const H: u32> {
  type Error: std::error::Error + Send + Sync + 'static;

  fn classify(&self, crop: &SlotCrop<W, H>) -> Result<f32, Self::Error>;
}

#[derive(Error, Debug)]
pub enum ModelLoadError {
  #[error("模型加载错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("模型无效: {0}")]
  Invalid(String),
  #[error("模型参数错误: {0}")]
  BadParameter(String),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

#[derive(Error, Debug, PartialEq)]
pub enum InferenceError {
  #[error("分类器输出非有限值: {0}")]
  NonFinite(f32),
  #[error("分类器输出超出 [0, 1] 范围: {0}")]
  OutOfRange(f32),
  #[error("推理后端错误: {0}")]
  Backend(String),
}

/// 检查分类器输出是否为合法概率
pub fn check_probability(probability: f32) -> Result<f32, InferenceError> {
  if !probability.is_finite() {
    return Err(InferenceError::NonFinite(probability));
  }
  if !(0.0..=1.0).contains(&probability) {
    return Err(InferenceError::OutOfRange(probability));
  }
  Ok(probability)
}

/// 按 URL 方案选择的检测模型
pub enum DetectorWrapper {
  #[cfg(feature = "rknpu")]
  Yolov8(RknnYolov8),
}

impl FromUrl for DetectorWrapper {
  type Error = ModelLoadError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      #[cfg(feature = "rknpu")]
      RknnYolov8Builder::SCHEME => {
        let model = RknnYolov8Builder::from_url(url)?.build()?;
        Ok(DetectorWrapper::Yolov8(model))
      }
      other => Err(ModelLoadError::SchemeMismatch(format!(
        "不支持的检测模型方案 '{}'",
        other
      ))),
    }
  }
}

impl RegionDetector for DetectorWrapper {
  type Error = InferenceError;

  #[allow(unused_variables)]
  fn detect(
    &self,
    image: &RgbImage,
    confidence_threshold: f32,
    overlap_threshold: f32,
  ) -> Result<DetectResult, Self::Error> {
    match *self {
      #[cfg(feature = "rknpu")]
      DetectorWrapper::Yolov8(ref model) => model
        .detect(image, confidence_threshold, overlap_threshold)
        .map_err(|e| InferenceError::Backend(e.to_string())),
    }
  }
}

/// 按 URL 方案选择的占用分类模型
pub enum ClassifierWrapper<const W: u32, const H: u32> {
  #[cfg(feature = "rknpu")]
  Rknn(RknnSlotClassifier<W, H>),
}

impl<const W: u32, const H: u32> FromUrl for ClassifierWrapper<W, H> {
  type Error = ModelLoadError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      #[cfg(feature = "rknpu")]
      RknnSlotClassifierBuilder::SCHEME => {
        let model = RknnSlotClassifierBuilder::from_url(url)?.build()?;
        Ok(ClassifierWrapper::Rknn(model))
      }
      other => Err(ModelLoadError::SchemeMismatch(format!(
        "不支持的分类模型方案 '{}'",
        other
      ))),
    }
  }
}

impl<const W: u32, const H: u32> OccupancyClassifier<W, H> for ClassifierWrapper<W, H> {
  type Error = InferenceError;

  #[allow(unused_variables)]
  fn classify(&self, crop: &SlotCrop<W, H>) -> Result<f32, Self::Error> {
    match *self {
      #[cfg(feature = "rknpu")]
      ClassifierWrapper::Rknn(ref model) => model
        .classify(crop)
        .map_err(|e| InferenceError::Backend(e.to_string())),
    }
  }
}
