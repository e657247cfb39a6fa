// 该文件是 Beifeng （北风） 项目的一部分。
// tests/end_to_end.rs - 从 caps 到叠加的完整流程
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

use std::convert::Infallible;

use beifeng::{
  CapsStructure, InPlaceTransform, OverlayTransform, PixelFormat, TransformStatus,
  format::{ChannelTag, ParseError},
  model::{EngineOutputs, InferenceEngine},
};
use ndarray::ArrayView4;

/// 对任意输入都在左上角报告一个人
struct TopLeftPerson;

impl InferenceEngine for TopLeftPerson {
  type Error = Infallible;

  fn run(&self, _: &str, input: ArrayView4<'_, u8>) -> Result<EngineOutputs, Infallible> {
    assert_eq!(input.shape()[3], 3);
    Ok(
      EngineOutputs::from_flat(vec![0.0, 0.0, 0.5, 0.5], vec![0.0], vec![0.9], vec![1.0])
        .unwrap(),
    )
  }
}

fn caps() -> CapsStructure {
  "video/x-raw-rgb, width=(int)4, height=(int)4, bpp=(int)24, depth=(int)24, \
   endianness=(int)1234, red_mask=(int)0x0000ff, green_mask=(int)0x00ff00, \
   blue_mask=(int)0xff0000"
    .parse()
    .unwrap()
}

#[test]
fn little_endian_masks_give_rgb_order() {
  let format = PixelFormat::parse(&caps()).unwrap();
  assert_eq!(
    format.channel_order(),
    &[ChannelTag::Red, ChannelTag::Green, ChannelTag::Blue]
  );
  assert_eq!(format.frame_size(), 48);
}

#[test]
fn overlay_stays_inside_detected_region() {
  let caps = caps();
  let mut transform = OverlayTransform::builder().build(TopLeftPerson).unwrap();
  transform.set_caps(&caps).unwrap();

  let before: Vec<u8> = (0..48).map(|i| (i * 5) as u8).collect();
  let mut frame = before.clone();
  assert_eq!(transform.on_buffer(&mut frame, &caps), TransformStatus::Ok);

  for row in 0..4 {
    for col in 0..4 {
      let idx = (row * 4 + col) * 3;
      let pixel = &frame[idx..idx + 3];
      if row < 2 && col < 2 {
        assert_eq!(pixel, &[255, 0, 0], "({}, {})", row, col);
      } else {
        assert_eq!(pixel, &before[idx..idx + 3], "({}, {})", row, col);
      }
    }
  }
  assert_eq!(transform.stats().drawn, 1);
}

#[test]
fn yuv_frames_are_dropped_untouched() {
  let yuv: CapsStructure = "video/x-raw-yuv, width=(int)4, height=(int)4, format=(string)I420"
    .parse()
    .unwrap();
  assert!(matches!(
    PixelFormat::parse(&yuv),
    Err(ParseError::UnsupportedFormat(_))
  ));

  let mut transform = OverlayTransform::builder().build(TopLeftPerson).unwrap();
  let mut frame = vec![0x42u8; 24];
  assert_eq!(transform.on_buffer(&mut frame, &yuv), TransformStatus::Error);
  assert!(frame.iter().all(|b| *b == 0x42));
  assert_eq!(transform.stats().dropped, 1);
}
