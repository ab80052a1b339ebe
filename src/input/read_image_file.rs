// 该文件是 Chewei （车位） 项目的一部分。
// src/input/read_image_file.rs - 图像文件与目录输入
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
  collections::VecDeque,
  path::{Path, PathBuf},
};

use image::ImageReader;
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, frame::ImageFrame, url_path};

const SUPPORTED_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

#[derive(Error, Debug)]
pub enum ImageReadError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("输入路径不存在: {0}")]
  NotFound(PathBuf),
  #[error("读取 {path} 时发生 I/O 错误: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("解码图像 {path} 失败: {source}")]
  Decode {
    path: PathBuf,
    #[source]
    source: image::ImageError,
  },
}

impl ImageReadError {
  /// 出错的文件路径
  pub fn path(&self) -> Option<&Path> {
    match self {
      ImageReadError::NotFound(path) => Some(path),
      ImageReadError::Io { path, .. } | ImageReadError::Decode { path, .. } => Some(path),
      ImageReadError::SchemeMismatch(_) => None,
    }
  }
}

/// 扩展名为 png/jpg/jpeg（不区分大小写）
pub fn is_supported_image(path: &Path) -> bool {
  path
    .extension()
    .and_then(|ext| ext.to_str())
    .map(|ext| {
      SUPPORTED_EXTENSIONS
        .iter()
        .any(|supported| ext.eq_ignore_ascii_case(supported))
    })
    .unwrap_or(false)
}

/// 图像文件输入：单个文件或目录，按文件名排序逐张读取
///
/// 迭代时每张图像单独解码，读取失败只影响该图像。
#[derive(Debug)]
pub struct ImageFileInput {
  paths: VecDeque<PathBuf>,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = ImageReadError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageReadError::SchemeMismatch(format!(
        "期望输入方式 '{}', 实际输入方式 '{}'",
        Self::SCHEME,
        url.scheme()
      )));
    }

    Self::open(url_path(url))
  }
}

impl ImageFileInput {
  pub fn open(path: impl AsRef<Path>) -> Result<Self, ImageReadError> {
    let path = path.as_ref();
    if !path.exists() {
      return Err(ImageReadError::NotFound(path.to_path_buf()));
    }

    let paths = if path.is_dir() {
      Self::list_directory(path)?
    } else {
      vec![path.to_path_buf()]
    };
    info!("输入 {} 共 {} 张图像", path.display(), paths.len());

    Ok(Self {
      paths: paths.into(),
    })
  }

  fn list_directory(dir: &Path) -> Result<Vec<PathBuf>, ImageReadError> {
    let io_error = |source| ImageReadError::Io {
      path: dir.to_path_buf(),
      source,
    };

    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(io_error)? {
      let path = entry.map_err(io_error)?.path();
      if !path.is_file() {
        continue;
      }
      if is_supported_image(&path) {
        paths.push(path);
      } else {
        debug!("跳过非图像文件: {}", path.display());
      }
    }
    paths.sort();
    Ok(paths)
  }

  /// 尚未读取的图像数量
  pub fn remaining(&self) -> usize {
    self.paths.len()
  }

  /// 读取并解码一张图像，统一转换为 RGB
  pub fn read_image(path: &Path) -> Result<ImageFrame, ImageReadError> {
    let io_error = |source| ImageReadError::Io {
      path: path.to_path_buf(),
      source,
    };

    let image = ImageReader::open(path)
      .map_err(io_error)?
      .with_guessed_format()
      .map_err(io_error)?
      .decode()
      .map_err(|source| ImageReadError::Decode {
        path: path.to_path_buf(),
        source,
      })?
      .into_rgb8();

    let image_id = path
      .file_name()
      .map(|name| name.to_string_lossy().into_owned())
      .unwrap_or_else(|| path.display().to_string());

    Ok(ImageFrame::new(image_id, path, image))
  }
}

impl Iterator for ImageFileInput {
  type Item = Result<ImageFrame, ImageReadError>;

  fn next(&mut self) -> Option<Self::Item> {
    let path = self.paths.pop_front()?;
    Some(Self::read_image(&path))
  }

  fn size_hint(&self) -> (usize, Option<usize>) {
    (self.paths.len(), Some(self.paths.len()))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::{Rgb, RgbImage};

  fn write_image(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    RgbImage::from_pixel(8, 6, Rgb([10, 20, 30]))
      .save(&path)
      .unwrap();
    path
  }

  #[test]
  fn extension_filter_is_case_insensitive() {
    assert!(is_supported_image(Path::new("a.png")));
    assert!(is_supported_image(Path::new("a.JPG")));
    assert!(is_supported_image(Path::new("/x/y/b.Jpeg")));
    assert!(!is_supported_image(Path::new("notes.txt")));
    assert!(!is_supported_image(Path::new("archive.png.bak")));
    assert!(!is_supported_image(Path::new("png")));
  }

  #[test]
  fn directory_is_listed_in_sorted_order() {
    let dir = tempfile::tempdir().unwrap();
    write_image(dir.path(), "c.png");
    write_image(dir.path(), "a.jpg");
    write_image(dir.path(), "b.png");
    std::fs::write(dir.path().join("readme.txt"), "not an image").unwrap();
    std::fs::create_dir(dir.path().join("nested.png")).unwrap();

    let input = ImageFileInput::open(dir.path()).unwrap();
    let ids: Vec<String> = input.map(|frame| frame.unwrap().image_id).collect();
    assert_eq!(ids, vec!["a.jpg", "b.png", "c.png"]);
  }

  #[test]
  fn single_file_input() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_image(dir.path(), "only.png");

    let mut input = ImageFileInput::open(&path).unwrap();
    assert_eq!(input.remaining(), 1);
    let frame = input.next().unwrap().unwrap();
    assert_eq!(frame.image_id, "only.png");
    assert_eq!((frame.width(), frame.height()), (8, 6));
    assert_eq!(*frame.image.get_pixel(0, 0), Rgb([10, 20, 30]));
    assert!(input.next().is_none());
  }

  #[test]
  fn corrupt_file_yields_decode_error_and_continues() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a_broken.jpg"), b"definitely not a jpeg").unwrap();
    write_image(dir.path(), "b_ok.png");

    let mut input = ImageFileInput::open(dir.path()).unwrap();
    let first = input.next().unwrap();
    assert!(matches!(first, Err(ImageReadError::Decode { .. })));
    assert!(first.unwrap_err().path().unwrap().ends_with("a_broken.jpg"));
    assert_eq!(input.next().unwrap().unwrap().image_id, "b_ok.png");
  }

  #[test]
  fn missing_path_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let err = ImageFileInput::open(dir.path().join("missing")).unwrap_err();
    assert!(matches!(err, ImageReadError::NotFound(_)));
  }

  #[test]
  fn from_url_checks_scheme() {
    let url = Url::parse("folder:///tmp").unwrap();
    assert!(matches!(
      ImageFileInput::from_url(&url),
      Err(ImageReadError::SchemeMismatch(_))
    ));

    let dir = tempfile::tempdir().unwrap();
    write_image(dir.path(), "lot.png");
    let url = Url::from_file_path(dir.path()).unwrap();
    let mut url_str = url.to_string();
    url_str.replace_range(..4, "image");
    let input = ImageFileInput::from_url(&Url::parse(&url_str).unwrap()).unwrap();
    assert_eq!(input.remaining(), 1);
  }
}
