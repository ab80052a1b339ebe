// 该文件是 Chewei （车位） 项目的一部分。
// src/cascade.rs - 检测-分类两阶段级联
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
use tracing::{debug, warn};

use crate::{
  config::CascadeConfig,
  crop,
  frame::{CLASSIFIER_INPUT_H, CLASSIFIER_INPUT_W},
  model::{InferenceError, OccupancyClassifier, RegionDetector, check_probability},
  occupancy::{OccupancyStatus, SlotResult, decide},
  output::draw::Draw,
  summary::ImageSummary,
};

/// 单张图像处理中被丢弃的检测计数
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DropStats {
  /// 检测器输出的区域总数
  pub detections: usize,
  /// 裁剪后面积为零的区域
  pub degenerate: usize,
  /// 分类器输出无效的区域
  pub unclassifiable: usize,
}

impl DropStats {
  pub fn dropped(&self) -> usize {
    self.degenerate + self.unclassifiable
  }
}

/// 单张图像的级联结果
#[derive(Debug, Clone)]
pub struct CascadeOutcome {
  pub annotated: RgbImage,
  /// 按检测器输出顺序排列
  pub slots: Vec<SlotResult>,
  pub occupied: usize,
  pub empty: usize,
}

impl CascadeOutcome {
  pub fn total(&self) -> usize {
    self.occupied + self.empty
  }

  pub fn summary(&self, image_id: &str) -> ImageSummary {
    ImageSummary::new(image_id, self.occupied, self.empty)
  }
}

/// 两阶段级联：每张图像调用一次检测器，每个区域调用一次分类器
///
/// 两个模型只读共享，所有推理调用串行执行。
pub struct Cascade<D, C, const W: u32 = CLASSIFIER_INPUT_W, const H: u32 = CLASSIFIER_INPUT_H> {
  detector: D,
  classifier: C,
  draw: Draw,
}

impl<D, C, const W: u32, const H: u32> Cascade<D, C, W, H>
where
  D: RegionDetector,
  C: OccupancyClassifier<W, H>,
{
  pub fn new(detector: D, classifier: C) -> Self {
    Self {
      detector,
      classifier,
      draw: Draw::default(),
    }
  }

  pub fn with_draw(mut self, draw: Draw) -> Self {
    self.draw = draw;
    self
  }

  pub fn detector(&self) -> &D {
    &self.detector
  }

  pub fn classifier(&self) -> &C {
    &self.classifier
  }

  /// 处理一张图像
  ///
  /// 检测器失败时返回错误；单个区域的裁剪或分类失败只丢弃该区域，并记入 `drops`。
  pub fn process(
    &self,
    image: &RgbImage,
    config: &CascadeConfig,
    drops: &mut DropStats,
  ) -> Result<CascadeOutcome, D::Error> {
    let detections = self.detector.detect(
      image,
      config.detector_confidence,
      config.overlap_threshold,
    )?;
    drops.detections += detections.len();

    if detections.is_empty() {
      debug!("未检测到车位");
    }

    let mut slots = Vec::with_capacity(detections.len());
    let mut occupied = 0usize;
    let mut empty = 0usize;

    for (index, item) in detections.iter().enumerate() {
      let Some((bbox, crop)) = crop::extract::<W, H>(image, &item.bbox) else {
        debug!("区域 {} {} 裁剪后为空, 已丢弃", index, item.bbox);
        drops.degenerate += 1;
        continue;
      };

      let probability = match self
        .classifier
        .classify(&crop)
        .map_err(|e| InferenceError::Backend(e.to_string()))
        .and_then(check_probability)
      {
        Ok(probability) => probability,
        Err(e) => {
          warn!("区域 {} {} 无法分类, 已排除: {}", index, bbox, e);
          drops.unclassifiable += 1;
          continue;
        }
      };

      let status = decide(probability, config.occupancy_threshold);
      match status {
        OccupancyStatus::Occupied => occupied += 1,
        OccupancyStatus::Empty => empty += 1,
      }

      debug!(
        "区域 {} {}: 检测置信度 {:.2}, 占用概率 {:.3} -> {}",
        index, bbox, item.score, probability, status
      );

      slots.push(SlotResult {
        bbox,
        detector_confidence: item.score,
        occupancy_probability: probability,
        status,
      });
    }

    let annotated = self.draw.render(image, &slots);

    Ok(CascadeOutcome {
      annotated,
      slots,
      occupied,
      empty,
    })
  }
}

#[cfg(test)]
mod tests {
  use std::cell::Cell;
  use std::convert::Infallible;

  use image::Rgb;

  use super::*;
  use crate::{
    frame::SlotCrop,
    model::{DetectItem, DetectResult, PixelBox},
  };

  struct FixedDetector {
    items: Vec<DetectItem>,
    calls: Cell<usize>,
  }

  impl FixedDetector {
    fn new(boxes: &[(PixelBox, f32)]) -> Self {
      Self {
        items: boxes
          .iter()
          .map(|&(bbox, score)| DetectItem { score, bbox })
          .collect(),
        calls: Cell::new(0),
      }
    }
  }

  impl RegionDetector for FixedDetector {
    type Error = Infallible;

    fn detect(
      &self,
      _image: &RgbImage,
      confidence_threshold: f32,
      _overlap_threshold: f32,
    ) -> Result<DetectResult, Self::Error> {
      self.calls.set(self.calls.get() + 1);
      Ok(
        self
          .items
          .iter()
          .filter(|item| item.score >= confidence_threshold)
          .copied()
          .collect::<Vec<_>>()
          .into(),
      )
    }
  }

  #[derive(Debug, thiserror::Error)]
  #[error("检测器故障")]
  struct BrokenDetectorError;

  struct BrokenDetector;

  impl RegionDetector for BrokenDetector {
    type Error = BrokenDetectorError;

    fn detect(&self, _: &RgbImage, _: f32, _: f32) -> Result<DetectResult, Self::Error> {
      Err(BrokenDetectorError)
    }
  }

  /// 以裁剪的平均亮度作为占用概率
  struct BrightnessClassifier {
    calls: Cell<usize>,
  }

  impl BrightnessClassifier {
    fn new() -> Self {
      Self {
        calls: Cell::new(0),
      }
    }
  }

  impl<const W: u32, const H: u32> OccupancyClassifier<W, H> for BrightnessClassifier {
    type Error = Infallible;

    fn classify(&self, crop: &SlotCrop<W, H>) -> Result<f32, Self::Error> {
      self.calls.set(self.calls.get() + 1);
      let data = crop.as_nhwc();
      Ok(data.iter().sum::<f32>() / data.len() as f32)
    }
  }

  struct ConstantClassifier(f32);

  impl<const W: u32, const H: u32> OccupancyClassifier<W, H> for ConstantClassifier {
    type Error = Infallible;

    fn classify(&self, _crop: &SlotCrop<W, H>) -> Result<f32, Self::Error> {
      Ok(self.0)
    }
  }

  fn lot_image() -> RgbImage {
    // 左半部分亮（有车），右半部分暗（空位）
    RgbImage::from_fn(640, 480, |x, _| {
      if x < 320 {
        Rgb([240, 240, 240])
      } else {
        Rgb([20, 20, 20])
      }
    })
  }

  #[test]
  fn single_occupied_slot() {
    let image = RgbImage::from_pixel(640, 480, Rgb([128, 128, 128]));
    let cascade: Cascade<_, _> = Cascade::new(
      FixedDetector::new(&[(PixelBox::new(100, 100, 200, 300), 0.9)]),
      ConstantClassifier(0.95),
    );
    let config = CascadeConfig::default().with_occupancy_threshold(0.7);
    let mut drops = DropStats::default();

    let outcome = cascade.process(&image, &config, &mut drops).unwrap();
    assert_eq!(outcome.slots.len(), 1);
    assert_eq!(outcome.slots[0].status, OccupancyStatus::Occupied);
    assert_eq!(outcome.slots[0].bbox, PixelBox::new(100, 100, 200, 300));
    assert_eq!(outcome.slots[0].detector_confidence, 0.9);
    assert_eq!(outcome.summary("lot.png"), ImageSummary::new("lot.png", 1, 0));
    assert_eq!(drops.dropped(), 0);
  }

  #[test]
  fn zero_detections_is_valid() {
    let image = RgbImage::from_pixel(640, 480, Rgb([128, 128, 128]));
    let cascade: Cascade<_, _> = Cascade::new(FixedDetector::new(&[]), ConstantClassifier(0.95));
    let mut drops = DropStats::default();

    let outcome = cascade
      .process(&image, &CascadeConfig::default(), &mut drops)
      .unwrap();
    assert!(outcome.slots.is_empty());
    assert_eq!(outcome.summary("empty.png"), ImageSummary::new("empty.png", 0, 0));
    assert_eq!(outcome.annotated, Draw::default().render(&image, &[]));
    assert_eq!(drops, DropStats::default());
  }

  #[test]
  fn partially_outside_box_is_classified() {
    let image = RgbImage::from_pixel(640, 480, Rgb([128, 128, 128]));
    let cascade: Cascade<_, _> = Cascade::new(
      FixedDetector::new(&[(PixelBox::new(500, 10, 700, 50), 0.8)]),
      ConstantClassifier(0.2),
    );
    let mut drops = DropStats::default();

    let outcome = cascade
      .process(&image, &CascadeConfig::default(), &mut drops)
      .unwrap();
    assert_eq!(outcome.slots.len(), 1);
    assert_eq!(outcome.slots[0].bbox, PixelBox::new(500, 10, 640, 50));
    assert_eq!(outcome.slots[0].status, OccupancyStatus::Empty);
    assert_eq!(outcome.empty, 1);
  }

  #[test]
  fn degenerate_boxes_are_dropped_without_classification() {
    let image = lot_image();
    let classifier = BrightnessClassifier::new();
    let cascade: Cascade<_, _> = Cascade::new(
      FixedDetector::new(&[
        (PixelBox::new(700, 10, 800, 50), 0.9),
        (PixelBox::new(50, 50, 150, 150), 0.9),
        (PixelBox::new(300, 300, 200, 200), 0.9),
      ]),
      classifier,
    );
    let mut drops = DropStats::default();

    let outcome = cascade
      .process(&image, &CascadeConfig::default(), &mut drops)
      .unwrap();
    assert_eq!(outcome.slots.len(), 1);
    assert_eq!(outcome.total(), 1);
    assert_eq!(cascade.classifier().calls.get(), 1);
    assert_eq!(
      drops,
      DropStats {
        detections: 3,
        degenerate: 2,
        unclassifiable: 0
      }
    );
  }

  #[test]
  fn invalid_probabilities_are_excluded_from_counts() {
    let image = lot_image();
    let config = CascadeConfig::default();

    for bad in [f32::NAN, f32::INFINITY, 1.5, -0.2] {
      let cascade: Cascade<_, _> = Cascade::new(
        FixedDetector::new(&[(PixelBox::new(50, 50, 150, 150), 0.9)]),
        ConstantClassifier(bad),
      );
      let mut drops = DropStats::default();
      let outcome = cascade.process(&image, &config, &mut drops).unwrap();

      assert!(outcome.slots.is_empty());
      assert_eq!((outcome.occupied, outcome.empty), (0, 0));
      assert_eq!(drops.unclassifiable, 1);
    }
  }

  #[test]
  fn detector_order_is_preserved() {
    let image = lot_image();
    let boxes = [
      (PixelBox::new(400, 50, 500, 150), 0.5),
      (PixelBox::new(50, 50, 150, 150), 0.95),
      (PixelBox::new(400, 250, 500, 350), 0.7),
    ];
    let cascade: Cascade<_, _> =
      Cascade::new(FixedDetector::new(&boxes), BrightnessClassifier::new());
    let mut drops = DropStats::default();

    let outcome = cascade
      .process(&image, &CascadeConfig::default(), &mut drops)
      .unwrap();
    let got: Vec<PixelBox> = outcome.slots.iter().map(|s| s.bbox).collect();
    let expected: Vec<PixelBox> = boxes.iter().map(|b| b.0).collect();
    assert_eq!(got, expected);

    let statuses: Vec<OccupancyStatus> = outcome.slots.iter().map(|s| s.status).collect();
    assert_eq!(
      statuses,
      vec![
        OccupancyStatus::Empty,
        OccupancyStatus::Occupied,
        OccupancyStatus::Empty
      ]
    );
    assert_eq!((outcome.occupied, outcome.empty), (1, 2));
  }

  #[test]
  fn thresholds_are_passed_per_invocation() {
    let image = lot_image();
    let cascade: Cascade<_, _> = Cascade::new(
      FixedDetector::new(&[
        (PixelBox::new(50, 50, 150, 150), 0.9),
        (PixelBox::new(400, 50, 500, 150), 0.25),
      ]),
      ConstantClassifier(0.8),
    );
    let mut drops = DropStats::default();

    let strict = CascadeConfig::default()
      .with_detector_confidence(0.5)
      .with_occupancy_threshold(0.9);
    let outcome = cascade.process(&image, &strict, &mut drops).unwrap();
    assert_eq!((outcome.occupied, outcome.empty), (0, 1));

    let loose = CascadeConfig::default()
      .with_detector_confidence(0.2)
      .with_occupancy_threshold(0.7);
    let outcome = cascade.process(&image, &loose, &mut drops).unwrap();
    assert_eq!((outcome.occupied, outcome.empty), (2, 0));
    assert_eq!(cascade.detector().calls.get(), 2);
  }

  #[test]
  fn processing_is_idempotent() {
    let image = lot_image();
    let cascade: Cascade<_, _> = Cascade::new(
      FixedDetector::new(&[
        (PixelBox::new(50, 50, 150, 150), 0.9),
        (PixelBox::new(400, 50, 500, 150), 0.8),
        (PixelBox::new(600, 400, 700, 500), 0.6),
      ]),
      BrightnessClassifier::new(),
    );
    let config = CascadeConfig::default();

    let first = cascade
      .process(&image, &config, &mut DropStats::default())
      .unwrap();
    let second = cascade
      .process(&image, &config, &mut DropStats::default())
      .unwrap();
    assert_eq!(first.slots, second.slots);
    assert_eq!(first.annotated, second.annotated);
  }

  #[test]
  fn summary_counts_are_consistent() {
    let image = lot_image();
    let cascade: Cascade<_, _> = Cascade::new(
      FixedDetector::new(&[
        (PixelBox::new(50, 50, 150, 150), 0.9),
        (PixelBox::new(400, 50, 500, 150), 0.8),
        (PixelBox::new(900, 900, 1000, 1000), 0.8),
      ]),
      BrightnessClassifier::new(),
    );
    let outcome = cascade
      .process(&image, &CascadeConfig::default(), &mut DropStats::default())
      .unwrap();

    let summary = outcome.summary("lot.png");
    assert_eq!(summary.total_slots, summary.occupied_count + summary.empty_count);
    assert_eq!(summary.total_slots, outcome.slots.len());
  }

  #[test]
  fn detector_failure_propagates() {
    let image = lot_image();
    let cascade: Cascade<_, _> = Cascade::new(BrokenDetector, ConstantClassifier(0.5));
    let mut drops = DropStats::default();
    assert!(
      cascade
        .process(&image, &CascadeConfig::default(), &mut drops)
        .is_err()
    );
    assert_eq!(drops, DropStats::default());
  }
}
