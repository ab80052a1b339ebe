// 该文件是 Chewei （车位） 项目的一部分。
// src/frame.rs - 源图像帧与分类器输入张量定义
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

use image::RgbImage;
use thiserror::Error;

const RGB_CHANNELS: usize = 3;

/// 分类器默认输入宽度
pub const CLASSIFIER_INPUT_W: u32 = 96;
/// 分类器默认输入高度
pub const CLASSIFIER_INPUT_H: u32 = 96;

/// 一张待处理的源图像，加载后不再修改
#[derive(Debug, Clone)]
pub struct ImageFrame {
  /// 图像标识（源文件名）
  pub image_id: String,
  /// 源文件路径
  pub path: PathBuf,
  pub image: RgbImage,
}

impl ImageFrame {
  pub fn new(image_id: impl Into<String>, path: impl Into<PathBuf>, image: RgbImage) -> Self {
    Self {
      image_id: image_id.into(),
      path: path.into(),
      image,
    }
  }

  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FrameShapeError {
  #[error("数据长度不匹配: 期望长度 {expected}, 实际长度 {actual}")]
  LengthMismatch { expected: usize, actual: usize },
  #[error("图像尺寸不匹配: 期望 {expected:?}, 实际 {actual:?}")]
  SizeMismatch {
    expected: (u32, u32),
    actual: (u32, u32),
  },
}

/// 车位裁剪张量：NHWC 排列，尺寸固定为 W x H，各通道取值位于 [0, 1]
#[derive(Debug, Clone, PartialEq)]
pub struct SlotCrop<const W: u32, const H: u32> {
  data: Box<[f32]>,
}

impl<const W: u32, const H: u32> SlotCrop<W, H> {
  pub const LEN: usize = RGB_CHANNELS * (W as usize) * (H as usize);

  pub fn height(&self) -> usize {
    H as usize
  }

  pub fn width(&self) -> usize {
    W as usize
  }

  pub fn as_nhwc(&self) -> &[f32] {
    &self.data
  }

  pub fn pixel(&self, x: u32, y: u32) -> Option<[f32; 3]> {
    if x >= W || y >= H {
      return None;
    }
    let idx = ((y as usize) * (W as usize) + (x as usize)) * RGB_CHANNELS;
    Some([self.data[idx], self.data[idx + 1], self.data[idx + 2]])
  }

  /// 将已缩放到 W x H 的图像按通道归一化到 [0, 1]
  pub fn normalize(image: &RgbImage) -> Result<Self, FrameShapeError> {
    if image.dimensions() != (W, H) {
      return Err(FrameShapeError::SizeMismatch {
        expected: (W, H),
        actual: image.dimensions(),
      });
    }

    let data: Vec<f32> = image
      .as_raw()
      .iter()
      .map(|&value| f32::from(value) / 255.0)
      .collect();
    Self::try_from(data)
  }
}

impl<const W: u32, const H: u32> TryFrom<Vec<f32>> for SlotCrop<W, H> {
  type Error = FrameShapeError;

  fn try_from(data: Vec<f32>) -> Result<Self, Self::Error> {
    if data.len() != Self::LEN {
      return Err(FrameShapeError::LengthMismatch {
        expected: Self::LEN,
        actual: data.len(),
      });
    }

    Ok(Self {
      data: data.into_boxed_slice(),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Rgb;

  #[test]
  fn normalize_scales_channels_into_unit_range() {
    let image = RgbImage::from_fn(4, 2, |x, _| if x == 0 { Rgb([0, 128, 255]) } else { Rgb([255, 255, 255]) });
    let crop = SlotCrop::<4, 2>::normalize(&image).unwrap();

    assert_eq!(crop.as_nhwc().len(), SlotCrop::<4, 2>::LEN);
    let first = crop.pixel(0, 0).unwrap();
    assert_eq!(first[0], 0.0);
    assert!((first[1] - 128.0 / 255.0).abs() < 1e-6);
    assert_eq!(first[2], 1.0);
    assert!(crop.as_nhwc().iter().all(|v| (0.0..=1.0).contains(v)));
    assert_eq!(crop.pixel(4, 0), None);
  }

  #[test]
  fn normalize_rejects_wrong_size() {
    let image = RgbImage::new(3, 3);
    let err = SlotCrop::<4, 4>::normalize(&image).unwrap_err();
    assert_eq!(
      err,
      FrameShapeError::SizeMismatch {
        expected: (4, 4),
        actual: (3, 3)
      }
    );
  }

  #[test]
  fn try_from_checks_length() {
    assert!(SlotCrop::<2, 2>::try_from(vec![0.5; 12]).is_ok());
    assert_eq!(
      SlotCrop::<2, 2>::try_from(vec![0.5; 11]).unwrap_err(),
      FrameShapeError::LengthMismatch {
        expected: 12,
        actual: 11
      }
    );
  }
}
