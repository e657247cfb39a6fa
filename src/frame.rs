// 该文件是 Beifeng （北风） 项目的一部分。
// src/frame.rs - 像素缓冲区视图
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

use image::Rgb;
use imageproc::drawing::Canvas;
use ndarray::{ArrayView1, ArrayView3, ArrayViewMut1, ArrayViewMut3, s};
use thiserror::Error;

use crate::format::{ChannelTag, PixelFormat};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("缓冲区大小不匹配: 期望 {expected} 字节, 实际 {actual} 字节")]
pub struct ShapeError {
  pub expected: usize,
  pub actual: usize,
}

/// 调用方缓冲区上的 HWC 视图
///
/// 视图只借用缓冲区，不复制像素；通过视图写入的内容直接落在原缓冲区中。
/// 像素内各字节的含义由 [`PixelFormat::channel_order`] 决定。
pub struct PixelBufferView<'a> {
  pixels: ArrayViewMut3<'a, u8>,
  format: &'a PixelFormat,
}

impl<'a> PixelBufferView<'a> {
  pub fn new(buffer: &'a mut [u8], format: &'a PixelFormat) -> Result<Self, ShapeError> {
    let expected = format.frame_size();
    let actual = buffer.len();
    if actual != expected {
      return Err(ShapeError { expected, actual });
    }

    let shape = (
      format.height() as usize,
      format.width() as usize,
      format.bytes_per_pixel(),
    );
    let pixels =
      ArrayViewMut3::from_shape(shape, buffer).map_err(|_| ShapeError { expected, actual })?;

    Ok(Self { pixels, format })
  }

  pub fn format(&self) -> &PixelFormat {
    self.format
  }

  pub fn width(&self) -> usize {
    self.format.width() as usize
  }

  pub fn height(&self) -> usize {
    self.format.height() as usize
  }

  pub fn channels(&self) -> usize {
    self.format.channels()
  }

  /// 单个像素的各通道字节，顺序与 `channel_order` 一致
  pub fn pixel(&self, row: usize, col: usize) -> ArrayView1<'_, u8> {
    self.pixels.slice(s![row, col, ..])
  }

  pub fn pixel_mut(&mut self, row: usize, col: usize) -> ArrayViewMut1<'_, u8> {
    self.pixels.slice_mut(s![row, col, ..])
  }

  pub fn channel(&self, row: usize, col: usize, tag: ChannelTag) -> Option<u8> {
    self
      .format
      .position(tag)
      .map(|position| self.pixels[[row, col, position]])
  }

  /// 按语义顺序读取红、绿、蓝
  pub fn rgb(&self, row: usize, col: usize) -> [u8; 3] {
    self
      .format
      .rgb_positions()
      .map(|position| self.pixels[[row, col, position]])
  }

  /// 按语义顺序写入红、绿、蓝，alpha 与填充字节保持不变
  pub fn set_rgb(&mut self, row: usize, col: usize, rgb: [u8; 3]) {
    for (position, value) in self.format.rgb_positions().into_iter().zip(rgb) {
      self.pixels[[row, col, position]] = value;
    }
  }

  /// 整帧 (height, width, channels) 数组
  pub fn array(&self) -> ArrayView3<'_, u8> {
    self.pixels.view()
  }

  pub fn array_mut(&mut self) -> ArrayViewMut3<'_, u8> {
    self.pixels.view_mut()
  }
}

impl Canvas for PixelBufferView<'_> {
  type Pixel = Rgb<u8>;

  fn dimensions(&self) -> (u32, u32) {
    (self.format.width(), self.format.height())
  }

  fn get_pixel(&self, x: u32, y: u32) -> Self::Pixel {
    Rgb(self.rgb(y as usize, x as usize))
  }

  fn draw_pixel(&mut self, x: u32, y: u32, color: Self::Pixel) {
    self.set_rgb(y as usize, x as usize, color.0);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::format::ByteOrder;

  fn bgr_format(width: u32, height: u32) -> PixelFormat {
    use ChannelTag::*;
    PixelFormat::new(width, height, 24, 24, ByteOrder::Little, vec![Blue, Green, Red]).unwrap()
  }

  fn bgrx_format(width: u32, height: u32) -> PixelFormat {
    use ChannelTag::*;
    PixelFormat::new(width, height, 32, 24, ByteOrder::Big, vec![Blue, Green, Red, Unused])
      .unwrap()
  }

  #[test]
  fn length_mismatch_is_rejected_without_mutation() {
    let format = bgr_format(4, 4);
    for len in [0usize, 47, 49, 64] {
      let mut buffer: Vec<u8> = (0..len).map(|i| i as u8).collect();
      let before = buffer.clone();
      let err = PixelBufferView::new(&mut buffer, &format).err().unwrap();
      assert_eq!(err, ShapeError { expected: 48, actual: len });
      assert_eq!(buffer, before);
    }
  }

  #[test]
  fn read_then_write_unchanged_is_identity() {
    let format = bgrx_format(3, 2);
    let mut buffer: Vec<u8> = (0..format.frame_size()).map(|i| (i * 7) as u8).collect();
    let before = buffer.clone();

    {
      let mut view = PixelBufferView::new(&mut buffer, &format).unwrap();
      let snapshot = view.array().to_owned();
      view.array_mut().assign(&snapshot);
      for row in 0..view.height() {
        for col in 0..view.width() {
          let rgb = view.rgb(row, col);
          view.set_rgb(row, col, rgb);
        }
      }
    }

    assert_eq!(buffer, before);
  }

  #[test]
  fn pixel_access_follows_channel_order() {
    let format = bgr_format(2, 1);
    let mut buffer = vec![1, 2, 3, 4, 5, 6];
    let mut view = PixelBufferView::new(&mut buffer, &format).unwrap();

    assert_eq!(view.array().shape(), &[1, 2, 3]);
    assert_eq!(view.pixel(0, 1).to_vec(), vec![4, 5, 6]);
    assert_eq!(view.rgb(0, 0), [3, 2, 1]);
    assert_eq!(view.channel(0, 1, ChannelTag::Blue), Some(4));
    assert_eq!(view.channel(0, 1, ChannelTag::Alpha), None);

    view.set_rgb(0, 1, [10, 20, 30]);
    view.pixel_mut(0, 0).fill(0);
    drop(view);

    assert_eq!(buffer, vec![0, 0, 0, 30, 20, 10]);
  }

  #[test]
  fn canvas_writes_leave_padding_untouched() {
    let format = bgrx_format(1, 1);
    let mut buffer = vec![0, 0, 0, 0xaa];
    let mut view = PixelBufferView::new(&mut buffer, &format).unwrap();

    assert_eq!(view.dimensions(), (1, 1));
    view.draw_pixel(0, 0, Rgb([255, 128, 1]));
    assert_eq!(view.get_pixel(0, 0), Rgb([255, 128, 1]));
    drop(view);

    assert_eq!(buffer, vec![1, 128, 255, 0xaa]);
  }
}
