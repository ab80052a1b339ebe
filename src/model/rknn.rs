// 该文件是 Chewei （车位） 项目的一部分。
// src/model/rknn.rs - RKNN 推理后端（车位检测与占用分类）
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

use image::{RgbImage, imageops::FilterType};
use rknpu::{Context, InitFlags, TensorFormat, TensorType};
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::SlotCrop,
  model::{DetectResult, ModelLoadError, OccupancyClassifier, RegionDetector, yolo},
  url_path, url_query,
};

const YOLOV8_DEFAULT_INPUT_SIZE: u32 = 640;
const YOLOV8_DEFAULT_CLASS_NUM: usize = 1;

#[derive(Error, Debug)]
pub enum RknnError {
  #[error("RKNN 错误: {0}")]
  Rknn(rknpu::Error),
  #[error("模型输出为空")]
  EmptyOutput,
}

impl From<rknpu::Error> for RknnError {
  fn from(err: rknpu::Error) -> Self {
    RknnError::Rknn(err)
  }
}

impl From<rknpu::Error> for ModelLoadError {
  fn from(err: rknpu::Error) -> Self {
    ModelLoadError::Invalid(format!("RKNN 错误: {}", err))
  }
}

/// 读取模型文件并创建推理上下文，检查输入输出数量
fn load_context(
  model_path: &str,
  flags: InitFlags,
  num_outputs_expected: u32,
) -> Result<Context, ModelLoadError> {
  info!("加载模型文件: {}", model_path);
  let model_data = std::fs::read(model_path)?;
  debug!(
    "模型文件大小: {:.2} MB",
    model_data.len() as f64 / (1024.0 * 1024.0)
  );

  info!("创建 RKNN 推理上下文");
  let context = Context::new(&model_data, flags)?;

  let num_inputs = context.num_inputs()?;
  let num_outputs = context.num_outputs()?;
  debug!("模型输入数量: {}", num_inputs);
  debug!("模型输出数量: {}", num_outputs);

  if num_inputs != 1 {
    error!("预期模型输入数量为 1, 实际为 {}", num_inputs);
    return Err(ModelLoadError::Invalid(format!(
      "预期模型输入数量为 1, 实际为 {}",
      num_inputs
    )));
  }

  if num_outputs < num_outputs_expected {
    error!(
      "预期模型输出数量至少为 {}, 实际为 {}",
      num_outputs_expected, num_outputs
    );
    return Err(ModelLoadError::Invalid(format!(
      "预期模型输出数量至少为 {}, 实际为 {}",
      num_outputs_expected, num_outputs
    )));
  }

  info!("模型加载完成");
  Ok(context)
}

fn parse_query<T: std::str::FromStr>(url: &Url, key: &str, default: T) -> Result<T, ModelLoadError> {
  match url_query(url, key) {
    Some(value) => value
      .parse()
      .map_err(|_| ModelLoadError::BadParameter(format!("{}={}", key, value))),
    None => Ok(default),
  }
}

/// YOLOv8 车位检测模型
pub struct RknnYolov8 {
  context: Context,
  input_size: u32,
  num_classes: usize,
}

pub struct RknnYolov8Builder {
  model_path: String,
  flags: InitFlags,
  input_size: u32,
  num_classes: usize,
}

impl FromUrlWithScheme for RknnYolov8Builder {
  const SCHEME: &'static str = "yolov8";
}

impl FromUrl for RknnYolov8Builder {
  type Error = ModelLoadError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ModelLoadError::SchemeMismatch(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    Ok(RknnYolov8Builder {
      model_path: url_path(url),
      flags: InitFlags::default(),
      input_size: parse_query(url, "size", YOLOV8_DEFAULT_INPUT_SIZE)?,
      num_classes: parse_query(url, "classes", YOLOV8_DEFAULT_CLASS_NUM)?,
    })
  }
}

impl RknnYolov8Builder {
  pub fn flags(mut self, flags: InitFlags) -> Self {
    self.flags = flags;
    self
  }

  pub fn build(self) -> Result<RknnYolov8, ModelLoadError> {
    if self.input_size == 0 || self.num_classes == 0 {
      return Err(ModelLoadError::BadParameter(format!(
        "输入尺寸 {} 与类别数 {} 必须为正",
        self.input_size, self.num_classes
      )));
    }

    let context = load_context(&self.model_path, self.flags, 1)?;
    Ok(RknnYolov8 {
      context,
      input_size: self.input_size,
      num_classes: self.num_classes,
    })
  }
}

impl RegionDetector for RknnYolov8 {
  type Error = RknnError;

  fn detect(
    &self,
    image: &RgbImage,
    confidence_threshold: f32,
    overlap_threshold: f32,
  ) -> Result<DetectResult, Self::Error> {
    let resized = image::imageops::resize(
      image,
      self.input_size,
      self.input_size,
      FilterType::Triangle,
    );

    debug!("设置检测模型输入");
    self
      .context
      .set_input(0, resized.as_raw(), TensorFormat::NHWC, TensorType::UInt8)?;

    debug!("执行检测模型推理");
    self.context.run()?;

    let outputs = self.context.get_outputs()?;
    let head = outputs.get_f32(0)?;
    let head: &[f32] = &head;
    if head.is_empty() {
      return Err(RknnError::EmptyOutput);
    }

    let scale = (
      image.width() as f32 / self.input_size as f32,
      image.height() as f32 / self.input_size as f32,
    );
    Ok(yolo::postprocess(
      head,
      self.num_classes,
      confidence_threshold,
      overlap_threshold,
      scale,
    ))
  }
}

/// 车位占用二分类模型，输入为 NHWC f32，输出第一个元素为占用概率
pub struct RknnSlotClassifier<const W: u32, const H: u32> {
  context: Context,
}

pub struct RknnSlotClassifierBuilder {
  model_path: String,
  flags: InitFlags,
}

impl FromUrlWithScheme for RknnSlotClassifierBuilder {
  const SCHEME: &'static str = "slotcls";
}

impl FromUrl for RknnSlotClassifierBuilder {
  type Error = ModelLoadError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ModelLoadError::SchemeMismatch(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    Ok(RknnSlotClassifierBuilder {
      model_path: url_path(url),
      flags: InitFlags::default(),
    })
  }
}

impl RknnSlotClassifierBuilder {
  pub fn flags(mut self, flags: InitFlags) -> Self {
    self.flags = flags;
    self
  }

  pub fn build<const W: u32, const H: u32>(self) -> Result<RknnSlotClassifier<W, H>, ModelLoadError> {
    let context = load_context(&self.model_path, self.flags, 1)?;
    Ok(RknnSlotClassifier { context })
  }
}

impl<const W: u32, const H: u32> OccupancyClassifier<W, H> for RknnSlotClassifier<W, H> {
  type Error = RknnError;

  fn classify(&self, crop: &SlotCrop<W, H>) -> Result<f32, Self::Error> {
    let bytes: Vec<u8> = crop
      .as_nhwc()
      .iter()
      .flat_map(|value| value.to_ne_bytes())
      .collect();

    self
      .context
      .set_input(0, &bytes, TensorFormat::NHWC, TensorType::Float32)?;
    self.context.run()?;

    let outputs = self.context.get_outputs()?;
    let scores = outputs.get_f32(0)?;
    let scores: &[f32] = &scores;
    scores.first().copied().ok_or(RknnError::EmptyOutput)
  }
}
