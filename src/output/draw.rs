// 该文件是 Chewei （车位） 项目的一部分。
// src/output/draw.rs - 车位占用结果可视化
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

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{
  draw_filled_circle_mut, draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size,
};
use imageproc::rect::Rect;
use tracing::warn;

use crate::occupancy::{OccupancyStatus, SlotResult};

// 文本渲染常量
const BANNER_FONT_SIZE: f32 = 20.0;
const BANNER_TEXT_X: i32 = 10;
const BANNER_TEXT_Y: i32 = 10;
const BANNER_PADDING: i32 = 5;
const BANNER_TEXT_COLOR: [u8; 3] = [255, 255, 255];
const BANNER_BACKGROUND: [u8; 3] = [0, 0, 0];

// 车位标记
const MARKER_RADIUS: i32 = 8;
const BOX_THICKNESS: u32 = 1;
const OCCUPIED_MARKER: [u8; 3] = [255, 0, 0]; // 红色
const OCCUPIED_BOX: [u8; 3] = [150, 50, 50];
const EMPTY_MARKER: [u8; 3] = [0, 255, 0]; // 绿色
const EMPTY_BOX: [u8; 3] = [50, 150, 50];

/// 汇总横幅文本
pub fn banner_text(total: usize, occupied: usize, empty: usize) -> String {
  format!(
    "Detected: {} | Occupied: {} | Empty: {}",
    total, occupied, empty
  )
}

/// 可视化工具：在源图像副本上绘制车位框、中心标记和左上角汇总横幅
#[derive(Clone)]
pub struct Draw {
  font: Option<FontArc>,
  font_size: f32,
  marker_radius: i32,
  box_thickness: u32,
}

impl Default for Draw {
  fn default() -> Self {
    let font_data: &'static [u8] = include_bytes!("../../assets/DejaVuSans.ttf");
    let font = match FontArc::try_from_slice(font_data) {
      Ok(font) => Some(font),
      Err(e) => {
        warn!("无法加载嵌入的字体文件, 将不绘制汇总横幅: {}", e);
        None
      }
    };

    Self {
      font,
      font_size: BANNER_FONT_SIZE,
      marker_radius: MARKER_RADIUS,
      box_thickness: BOX_THICKNESS,
    }
  }
}

impl Draw {
  /// 不带字体的绘制器，只画框和标记
  pub fn without_font() -> Self {
    Self {
      font: None,
      ..Self::default()
    }
  }

  pub fn has_font(&self) -> bool {
    self.font.is_some()
  }

  fn colors(status: OccupancyStatus) -> (Rgb<u8>, Rgb<u8>) {
    match status {
      OccupancyStatus::Occupied => (Rgb(OCCUPIED_BOX), Rgb(OCCUPIED_MARKER)),
      OccupancyStatus::Empty => (Rgb(EMPTY_BOX), Rgb(EMPTY_MARKER)),
    }
  }

  /// 在新副本上绘制全部结果，源图像保持不变
  pub fn render(&self, image: &RgbImage, slots: &[SlotResult]) -> RgbImage {
    let mut canvas = image.clone();
    if canvas.width() == 0 || canvas.height() == 0 {
      return canvas;
    }

    for slot in slots {
      self.draw_slot(&mut canvas, slot);
    }

    let occupied = slots.iter().filter(|slot| slot.is_occupied()).count();
    let empty = slots.len() - occupied;
    self.draw_banner(&mut canvas, &banner_text(slots.len(), occupied, empty));
    canvas
  }

  fn draw_slot(&self, image: &mut RgbImage, slot: &SlotResult) {
    let Some(bbox) = slot.bbox.clip(image.width(), image.height()) else {
      return;
    };
    let (box_color, marker_color) = Self::colors(slot.status);

    // 向内加粗
    for thickness in 0..self.box_thickness as i32 {
      let width = bbox.width() - 2 * thickness;
      let height = bbox.height() - 2 * thickness;
      if width <= 0 || height <= 0 {
        break;
      }
      let rect = Rect::at(bbox.x_min + thickness, bbox.y_min + thickness)
        .of_size(width as u32, height as u32);
      draw_hollow_rect_mut(image, rect, box_color);
    }

    if self.marker_radius > 0 {
      draw_filled_circle_mut(image, bbox.center(), self.marker_radius, marker_color);
    }
  }

  /// 横幅背景在画布上的范围（已裁剪），没有字体时为 `None`
  pub fn banner_rect(&self, text: &str, width: u32, height: u32) -> Option<Rect> {
    let font = self.font.as_ref()?;
    let (text_width, text_height) = text_size(PxScale::from(self.font_size), font, text);

    let rect = Rect::at(BANNER_TEXT_X - BANNER_PADDING, BANNER_TEXT_Y - BANNER_PADDING).of_size(
      text_width + 2 * BANNER_PADDING as u32,
      text_height + 2 * BANNER_PADDING as u32,
    );
    if width == 0 || height == 0 {
      return None;
    }
    Rect::at(0, 0).of_size(width, height).intersect(rect)
  }

  fn draw_banner(&self, image: &mut RgbImage, text: &str) {
    let Some(font) = self.font.as_ref() else {
      return;
    };
    let Some(rect) = self.banner_rect(text, image.width(), image.height()) else {
      return;
    };

    draw_filled_rect_mut(image, rect, Rgb(BANNER_BACKGROUND));
    draw_text_mut(
      image,
      Rgb(BANNER_TEXT_COLOR),
      BANNER_TEXT_X,
      BANNER_TEXT_Y,
      PxScale::from(self.font_size),
      font,
      text,
    );
  }
}
