// 该文件是 Beifeng （北风） 项目的一部分。
// src/output.rs - 检测结果叠加
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

use tracing::debug;

use crate::{frame::PixelBufferView, model::Detection};

pub mod draw;
use self::draw::{Caption, PixelRect, stroke_rect};

/// 默认置信度阈值
pub const DEFAULT_THRESHOLD: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayStyle {
  /// 语义上的 (红, 绿, 蓝)，写入时按通道顺序落位
  pub color: [u8; 3],
  pub thickness: u32,
}

impl Default for OverlayStyle {
  fn default() -> Self {
    Self {
      color: [255, 0, 0],
      thickness: 4,
    }
  }
}

/// 按阈值过滤检测结果，并直接在缓冲区上绘制检测框
pub struct OverlayRenderer {
  threshold: f32,
  style: OverlayStyle,
  caption: Option<Caption>,
}

impl Default for OverlayRenderer {
  fn default() -> Self {
    Self::new(DEFAULT_THRESHOLD)
  }
}

impl OverlayRenderer {
  pub fn new(threshold: f32) -> Self {
    Self {
      threshold,
      style: OverlayStyle::default(),
      caption: None,
    }
  }

  pub fn with_style(mut self, style: OverlayStyle) -> Self {
    self.style = style;
    self
  }

  pub fn with_caption(mut self, caption: Caption) -> Self {
    self.caption = Some(caption);
    self
  }

  pub fn threshold(&self) -> f32 {
    self.threshold
  }

  pub fn style(&self) -> OverlayStyle {
    self.style
  }

  pub fn passes(&self, detection: &Detection) -> bool {
    detection.score >= self.threshold
  }

  /// 按检测顺序绘制，后绘制的覆盖先绘制的；返回实际绘制的检测框数量
  pub fn render(&self, view: &mut PixelBufferView<'_>, detections: &[Detection]) -> usize {
    let (width, height) = (view.width() as u32, view.height() as u32);
    let mut drawn = 0;

    for det in detections.iter().filter(|det| self.passes(det)) {
      let Some(rect) = PixelRect::from_normalized(&det.bbox, width, height) else {
        debug!("跳过空检测框: {} {:?}", det.label, det.bbox);
        continue;
      };

      debug!(
        "绘制 {} {:.2} at ({}, {})-({}, {})",
        det.label, det.score, rect.left, rect.top, rect.right, rect.bottom
      );
      stroke_rect(view, rect, self.style.color, self.style.thickness);
      if let Some(caption) = &self.caption {
        let text = format!("{} {:.2}", det.label, det.score);
        caption.draw(view, rect, &text, self.style.color);
      }
      drawn += 1;
    }

    drawn
  }
}
