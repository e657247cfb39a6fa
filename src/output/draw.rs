// 该文件是 Beifeng （北风） 项目的一部分。
// src/output/draw.rs - 检测框绘制
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

use std::path::Path;

use ab_glyph::{FontVec, PxScale};
use image::Rgb;
use imageproc::drawing::{draw_filled_rect_mut, draw_text_mut};
use thiserror::Error;

use crate::{frame::PixelBufferView, model::BoundingBox};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 20.0;
const LABEL_TEXT_HEIGHT: i32 = 24;
const LABEL_CHAR_WIDTH: f32 = 11.0; // 每字符平均宽度（粗略估计）
const LABEL_TEXT_VERTICAL_PADDING: i32 = 2;
const LABEL_TEXT_COLOR: [u8; 3] = [255, 255, 255];

#[derive(Error, Debug)]
pub enum CaptionError {
  #[error("字体文件读取错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("字体文件无效")]
  InvalidFont,
}

/// 像素坐标下的闭区间矩形
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
  pub left: u32,
  pub top: u32,
  pub right: u32,
  pub bottom: u32,
}

impl PixelRect {
  /// 将归一化坐标映射到 `width`x`height` 的像素网格
  ///
  /// 左上取下整，右下取上整后减一；坐标无效或区域为空时返回 `None`。
  pub fn from_normalized(bbox: &BoundingBox, width: u32, height: u32) -> Option<Self> {
    let coords = [bbox.y_min, bbox.x_min, bbox.y_max, bbox.x_max];
    if width == 0 || height == 0 || coords.iter().any(|c| !c.is_finite()) {
      return None;
    }

    let [y_min, x_min, y_max, x_max] = coords.map(|c| c.clamp(0.0, 1.0));
    if x_max <= x_min || y_max <= y_min {
      return None;
    }

    let low = |v: f32, size: u32| (v * size as f32).floor() as i64;
    let high = |v: f32, size: u32| (v * size as f32).ceil() as i64 - 1;

    let left = low(x_min, width).min(width as i64 - 1);
    let top = low(y_min, height).min(height as i64 - 1);
    let right = high(x_max, width);
    let bottom = high(y_max, height);

    if right < left || bottom < top {
      return None;
    }

    Some(Self {
      left: left as u32,
      top: top as u32,
      right: right as u32,
      bottom: bottom as u32,
    })
  }

  pub fn width(&self) -> u32 {
    self.right - self.left + 1
  }

  pub fn height(&self) -> u32 {
    self.bottom - self.top + 1
  }

  pub fn contains(&self, col: u32, row: u32) -> bool {
    (self.left..=self.right).contains(&col) && (self.top..=self.bottom).contains(&row)
  }
}

/// 在矩形内侧描边，线宽向内收缩，不会越出矩形
pub fn stroke_rect(view: &mut PixelBufferView<'_>, rect: PixelRect, color: [u8; 3], thickness: u32) {
  for t in 0..thickness {
    let (left, top) = (rect.left + t, rect.top + t);
    if rect.right < left + t || rect.bottom < top + t {
      break;
    }
    let (right, bottom) = (rect.right - t, rect.bottom - t);

    for col in left..=right {
      view.set_rgb(top as usize, col as usize, color);
      view.set_rgb(bottom as usize, col as usize, color);
    }
    for row in top..=bottom {
      view.set_rgb(row as usize, left as usize, color);
      view.set_rgb(row as usize, right as usize, color);
    }
  }
}

/// 检测框上方的 `标签 分数` 文本
pub struct Caption {
  font: FontVec,
  font_size: f32,
  label_text_height: i32,
  label_char_width: f32,
  label_text_vertical_padding: i32,
}

impl Caption {
  pub fn new(font: FontVec) -> Self {
    Self {
      font,
      font_size: LABEL_FONT_SIZE,
      label_text_height: LABEL_TEXT_HEIGHT,
      label_char_width: LABEL_CHAR_WIDTH,
      label_text_vertical_padding: LABEL_TEXT_VERTICAL_PADDING,
    }
  }

  pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CaptionError> {
    let data = std::fs::read(path)?;
    let font = FontVec::try_from_vec(data).map_err(|_| CaptionError::InvalidFont)?;
    Ok(Self::new(font))
  }

  pub fn draw(
    &self,
    view: &mut PixelBufferView<'_>,
    rect: PixelRect,
    text: &str,
    background: [u8; 3],
  ) {
    let image_width = view.width() as i32;

    // 估算文本大小（粗略估计）
    let text_width = (text.chars().count() as f32 * self.label_char_width) as i32;
    let label_x = rect.left as i32;
    let label_y = (rect.top as i32 - self.label_text_height).max(0);

    let label_width = text_width.min(image_width - label_x).max(0) as u32;
    let label_height = self.label_text_height as u32;
    if label_width == 0 {
      return;
    }

    let background_rect =
      imageproc::rect::Rect::at(label_x, label_y).of_size(label_width, label_height);
    draw_filled_rect_mut(view, background_rect, Rgb(background));
    draw_text_mut(
      view,
      Rgb(LABEL_TEXT_COLOR),
      label_x,
      label_y + self.label_text_vertical_padding,
      PxScale::from(self.font_size),
      &self.font,
      text,
    );
  }
}
