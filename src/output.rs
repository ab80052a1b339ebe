// 该文件是 Chewei （车位） 项目的一部分。
// src/output.rs - 输出定义
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

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, error};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme, cascade::CascadeOutcome, frame::ImageFrame, url_path, url_query,
};

pub mod draw;
pub mod record;

pub trait Render<Frame, Output>: Sized {
  type Error;
  fn render_result(&self, frame: &Frame, result: &Output) -> Result<(), Self::Error>;
}

const DEFAULT_SUFFIX: &str = "occupancy";

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("I/O 错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  Image(#[from] image::ImageError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

/// 标注图像输出目录：每张输入图像保存为 `<stem>_<suffix>.<ext>`，格式与源图像一致
#[derive(Debug, Clone)]
pub struct AnnotatedDirectoryOutput {
  dir: PathBuf,
  suffix: String,
}

impl FromUrlWithScheme for AnnotatedDirectoryOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for AnnotatedDirectoryOutput {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(OutputError::SchemeMismatch(format!(
        "期望保存方式 '{}', 实际保存方式 '{}'",
        Self::SCHEME,
        url.scheme()
      )));
    }

    let output = Self::new(url_path(url));
    Ok(match url_query(url, "suffix") {
      Some(suffix) => output.with_suffix(suffix),
      None => output,
    })
  }
}

impl AnnotatedDirectoryOutput {
  pub fn new(dir: impl Into<PathBuf>) -> Self {
    Self {
      dir: dir.into(),
      suffix: DEFAULT_SUFFIX.to_string(),
    }
  }

  pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
    self.suffix = suffix.into();
    self
  }

  pub fn dir(&self) -> &Path {
    &self.dir
  }

  /// 标注图像的保存路径
  pub fn output_path(&self, frame: &ImageFrame) -> PathBuf {
    let source = Path::new(&frame.image_id);
    let stem = source
      .file_stem()
      .map(|stem| stem.to_string_lossy().into_owned())
      .unwrap_or_else(|| frame.image_id.clone());

    let name = match frame.path.extension().or_else(|| source.extension()) {
      Some(ext) => format!("{}_{}.{}", stem, self.suffix, ext.to_string_lossy()),
      None => format!("{}_{}.png", stem, self.suffix),
    };
    self.dir.join(name)
  }
}

impl Render<ImageFrame, CascadeOutcome> for AnnotatedDirectoryOutput {
  type Error = OutputError;

  fn render_result(&self, frame: &ImageFrame, result: &CascadeOutcome) -> Result<(), Self::Error> {
    std::fs::create_dir_all(&self.dir)?;
    let path = self.output_path(frame);
    result.annotated.save(&path)?;
    debug!("保存标注图像到文件: {}", path.display());
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::{Rgb, RgbImage};

  fn frame(name: &str) -> ImageFrame {
    ImageFrame::new(
      name,
      Path::new("/data/lot").join(name),
      RgbImage::from_pixel(16, 12, Rgb([1, 2, 3])),
    )
  }

  fn outcome(image: RgbImage) -> CascadeOutcome {
    CascadeOutcome {
      annotated: image,
      slots: Vec::new(),
      occupied: 0,
      empty: 0,
    }
  }

  #[test]
  fn output_names_keep_source_format() {
    let output = AnnotatedDirectoryOutput::new("/out");
    assert_eq!(
      output.output_path(&frame("lot_01.jpg")),
      Path::new("/out/lot_01_occupancy.jpg")
    );
    assert_eq!(
      output.output_path(&frame("a.b.PNG")),
      Path::new("/out/a.b_occupancy.PNG")
    );
  }

  #[test]
  fn from_url_reads_suffix() {
    let url = Url::parse("folder:///tmp/annotated%20out?suffix=marked").unwrap();
    let output = AnnotatedDirectoryOutput::from_url(&url).unwrap();
    assert_eq!(output.dir(), Path::new("/tmp/annotated out"));
    assert_eq!(
      output.output_path(&frame("x.png")),
      Path::new("/tmp/annotated out/x_marked.png")
    );

    let url = Url::parse("image:///tmp").unwrap();
    assert!(matches!(
      AnnotatedDirectoryOutput::from_url(&url),
      Err(OutputError::SchemeMismatch(_))
    ));
  }

  #[test]
  fn render_creates_directory_and_saves() {
    let dir = tempfile::tempdir().unwrap();
    let output = AnnotatedDirectoryOutput::new(dir.path().join("nested"));
    let frame = frame("spot.png");
    let annotated = RgbImage::from_pixel(16, 12, Rgb([200, 0, 0]));

    output.render_result(&frame, &outcome(annotated.clone())).unwrap();

    let saved = image::open(dir.path().join("nested/spot_occupancy.png"))
      .unwrap()
      .into_rgb8();
    assert_eq!(saved, annotated);
  }
}
