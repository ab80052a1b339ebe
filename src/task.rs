// 该文件是 Chewei （车位） 项目的一部分。
// src/task.rs - 批处理任务
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

use std::{
  path::PathBuf,
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
  },
  thread,
  time::{Duration, Instant},
};

use chrono::Utc;
use tracing::{error, info, warn};

use crate::{
  cascade::{Cascade, CascadeOutcome, DropStats},
  config::CascadeConfig,
  frame::ImageFrame,
  model::{OccupancyClassifier, RegionDetector},
  output::{Render, record::SlotRecorder},
  summary::{CorpusSummary, RunReport, RunStats},
};

pub trait Task<I, M, O>: Sized {
  type Output;
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<Self::Output, Self::Error>;
}

/// 批处理任务：逐张处理输入图像，一张图像完成后才开始下一张
#[derive(Debug, Default)]
pub struct BatchTask {
  config: CascadeConfig,
  max_images: Option<usize>,
  slot_record: Option<PathBuf>,
  stop: Arc<AtomicBool>,
}

impl BatchTask {
  pub fn new(config: CascadeConfig) -> Self {
    Self {
      config,
      ..Self::default()
    }
  }

  pub fn with_max_images(mut self, max_images: Option<usize>) -> Self {
    self.max_images = max_images;
    self
  }

  /// 同时导出逐车位明细表
  pub fn with_slot_record(mut self, path: Option<PathBuf>) -> Self {
    self.slot_record = path;
    self
  }

  pub fn config(&self) -> &CascadeConfig {
    &self.config
  }

  /// 置位后任务在下一张图像开始前停止
  pub fn stop_flag(&self) -> Arc<AtomicBool> {
    self.stop.clone()
  }

  /// 安装 Ctrl-C 处理：第一次中断请求停止，30 秒内未退出则强制退出
  pub fn with_ctrlc(self) -> Result<Self, ctrlc::Error> {
    let stop = self.stop.clone();
    ctrlc::set_handler(move || {
      if stop.swap(true, Ordering::SeqCst) {
        return;
      }
      info!("收到中断信号，当前图像处理完成后退出...");
      thread::spawn(|| {
        thread::sleep(Duration::from_secs(30));
        warn!("强制退出程序");
        std::process::exit(1);
      });
    })?;
    Ok(self)
  }

  fn stop_requested(&self) -> bool {
    self.stop.load(Ordering::SeqCst)
  }
}

impl<'a, I, E, D, C, O, RE, const W: u32, const H: u32> Task<I, &'a Cascade<D, C, W, H>, O>
  for BatchTask
where
  I: Iterator<Item = Result<ImageFrame, E>>,
  E: std::fmt::Display,
  D: RegionDetector,
  C: OccupancyClassifier<W, H>,
  O: Render<ImageFrame, CascadeOutcome, Error = RE>,
  RE: std::fmt::Display,
{
  type Output = RunReport;
  type Error = anyhow::Error;

  fn run_task(
    self,
    mut input: I,
    cascade: &'a Cascade<D, C, W, H>,
    output: O,
  ) -> Result<Self::Output, Self::Error> {
    info!("开始批处理任务...");
    let started_at = Utc::now();
    let mut slot_record = self.slot_record.as_ref().and_then(|path| {
      SlotRecorder::create(path)
        .inspect_err(|e| error!("无法创建车位明细表 {}, 不再记录明细: {}", path.display(), e))
        .ok()
    });

    let mut images = CorpusSummary::default();
    let mut stats = RunStats::default();
    let mut interrupted = false;
    let mut attempted = 0usize;

    loop {
      if self.stop_requested() {
        warn!("中断信号接收，退出任务循环");
        interrupted = true;
        break;
      }
      if self.max_images.is_some_and(|n| attempted >= n) {
        info!("达到指定图像数 {}, 退出任务循环", attempted);
        break;
      }
      let Some(frame) = input.next() else {
        break;
      };
      attempted += 1;

      let frame = match frame {
        Ok(frame) => frame,
        Err(e) => {
          warn!("无法读取图像, 已跳过: {}", e);
          stats.images_skipped += 1;
          continue;
        }
      };

      info!("处理第 {} 张图像: {}", attempted, frame.image_id);
      let now = Instant::now();
      let mut drops = DropStats::default();
      let outcome = match cascade.process(&frame.image, &self.config, &mut drops) {
        Ok(outcome) => outcome,
        Err(e) => {
          warn!("图像 {} 检测失败, 已跳过: {}", frame.image_id, e);
          stats.images_skipped += 1;
          continue;
        }
      };
      let elapsed = now.elapsed();

      if let Err(e) = output.render_result(&frame, &outcome) {
        error!("保存图像 {} 的标注结果失败: {}", frame.image_id, e);
      }
      if let Some(recorder) = slot_record.as_mut()
        && let Err(e) = recorder.record(&frame.image_id, &outcome.slots)
      {
        error!("写入车位明细失败, 不再记录明细: {}", e);
        slot_record = None;
      }

      let summary = outcome.summary(&frame.image_id);
      info!(
        "{}: 车位 {}, 占用 {}, 空闲 {}, 丢弃 {}, 耗时: {:.2?}",
        summary.image_id,
        summary.total_slots,
        summary.occupied_count,
        summary.empty_count,
        drops.dropped(),
        elapsed
      );
      stats.record_drops(&drops);
      stats.images_processed += 1;
      images.push(summary);
    }

    if let Some(recorder) = slot_record {
      let rows = recorder.rows();
      match recorder.finish() {
        Ok(_) => info!("车位明细共 {} 行", rows),
        Err(e) => error!("写入车位明细失败: {}", e),
      }
    }

    info!("任务完成: {}", stats);
    Ok(RunReport {
      started_at,
      finished_at: Utc::now(),
      config: self.config,
      stats,
      interrupted,
      images,
    })
  }
}
