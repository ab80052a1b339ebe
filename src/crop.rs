// 该文件是 Chewei （车位） 项目的一部分。
// src/crop.rs - 车位区域裁剪
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

use crate::{frame::SlotCrop, model::PixelBox};

/// 从源图像中裁出车位区域，缩放到分类器输入尺寸并归一化
///
/// 边界框先裁剪到图像范围内，返回裁剪后的边界框与张量；
/// 裁剪后面积为零（完全在图像外或上下颠倒）时返回 `None`。该函数不会失败。
pub fn extract<const W: u32, const H: u32>(
  image: &RgbImage,
  bbox: &PixelBox,
) -> Option<(PixelBox, SlotCrop<W, H>)> {
  let clipped = bbox.clip(image.width(), image.height())?;

  let region = image::imageops::crop_imm(
    image,
    clipped.x_min as u32,
    clipped.y_min as u32,
    clipped.width() as u32,
    clipped.height() as u32,
  )
  .to_image();

  let resized = image::imageops::resize(&region, W, H, FilterType::Triangle);
  let crop = SlotCrop::normalize(&resized).ok()?;
  Some((clipped, crop))
}
