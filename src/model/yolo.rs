// 该文件是 Chewei （车位） 项目的一部分。
// src/model/yolo.rs - YOLOv8 检测头解码与非极大值抑制
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

use tracing::{debug, error};

use crate::model::{DetectItem, DetectResult, PixelBox};

/// 模型输入尺寸下的候选框
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
  pub score: f32,
  pub class_id: usize,
  /// [x_min, y_min, x_max, y_max]
  pub bbox: [f32; 4],
}

/// 解码 YOLOv8 检测头输出
///
/// 输出布局为 `[1, 4 + num_classes, anchors]`：前四行是以模型输入像素为单位的
/// `cx, cy, w, h`，其后每行是一个类别的分数。`scale` 把模型输入坐标映射回原图。
pub fn decode_head(
  output: &[f32],
  num_classes: usize,
  confidence_threshold: f32,
  scale: (f32, f32),
) -> Vec<Candidate> {
  let rows = 4 + num_classes;
  if num_classes == 0 || output.len() % rows != 0 {
    error!(
      "检测头输出大小不匹配: 长度 {}, 期望为 {} 的整数倍",
      output.len(),
      rows
    );
    return Vec::new();
  }

  let anchors = output.len() / rows;
  let (scale_x, scale_y) = scale;
  let mut candidates = Vec::new();

  for idx in 0..anchors {
    let (score, class_id) = {
      let mut max_score = f32::MIN;
      let mut cls_idx = 0usize;
      for c in 0..num_classes {
        let score = output[(4 + c) * anchors + idx];
        if score > max_score {
          max_score = score;
          cls_idx = c;
        }
      }
      (max_score, cls_idx)
    };

    if !score.is_finite() || score < confidence_threshold {
      continue;
    }

    let cx = output[idx];
    let cy = output[anchors + idx];
    let w = output[2 * anchors + idx];
    let h = output[3 * anchors + idx];

    candidates.push(Candidate {
      score,
      class_id,
      bbox: [
        (cx - w / 2.0) * scale_x,
        (cy - h / 2.0) * scale_y,
        (cx + w / 2.0) * scale_x,
        (cy + h / 2.0) * scale_y,
      ],
    });
  }

  debug!("解码得到 {} 个候选框（共 {} 个锚点）", candidates.len(), anchors);
  candidates
}

/// 非极大值抑制，结果按置信度降序排列
pub fn nms(mut candidates: Vec<Candidate>, overlap_threshold: f32) -> Vec<Candidate> {
  candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

  let mut result: Vec<Candidate> = Vec::with_capacity(candidates.len());
  for candidate in candidates {
    let suppressed = result.iter().any(|kept| {
      kept.class_id == candidate.class_id && iou(&kept.bbox, &candidate.bbox) >= overlap_threshold
    });
    if !suppressed {
      result.push(candidate);
    }
  }

  result
}

/// 计算两个边界框的 IoU
pub fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
  let x1 = a[0].max(b[0]);
  let y1 = a[1].max(b[1]);
  let x2 = a[2].min(b[2]);
  let y2 = a[3].min(b[3]);

  let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
  let area_a = (a[2] - a[0]).max(0.0) * (a[3] - a[1]).max(0.0);
  let area_b = (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0);
  let union = area_a + area_b - intersection;

  if union > 0.0 {
    intersection / union
  } else {
    0.0
  }
}

/// 解码 + 抑制 + 转为像素坐标
pub fn postprocess(
  output: &[f32],
  num_classes: usize,
  confidence_threshold: f32,
  overlap_threshold: f32,
  scale: (f32, f32),
) -> DetectResult {
  let candidates = decode_head(output, num_classes, confidence_threshold, scale);
  let kept = nms(candidates, overlap_threshold);
  debug!("非极大值抑制后保留 {} 个车位", kept.len());

  kept
    .into_iter()
    .map(|c| DetectItem {
      score: c.score,
      bbox: PixelBox::from_xyxy(c.bbox),
    })
    .collect::<Vec<_>>()
    .into()
}
