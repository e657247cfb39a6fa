// 该文件是 Beifeng （北风） 项目的一部分。
// src/format.rs - 像素格式解析
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

//! # 像素格式
//!
//! 将协商得到的 caps 转换为强类型的 [`PixelFormat`]。
//!
//! 支持两种打包 RGB 描述：
//! - `video/x-raw-rgb`：通过 `bpp`、`depth`、`endianness` 与各通道掩码描述；
//! - `video/x-raw`：通过 `format` 名称描述（RGB、BGRx、ARGB 等）。
//!
//! 平面/YUV 布局会被识别并明确拒绝。

use std::fmt;

use thiserror::Error;

use crate::caps::{CapsStructure, CapsValue};

/// 唯一支持的色深
pub const SUPPORTED_COLOR_DEPTH: u8 = 24;

const LEGACY_RGB_MIMETYPE: &str = "video/x-raw-rgb";
const RAW_VIDEO_MIMETYPE: &str = "video/x-raw";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
  #[error("不支持的视频格式: {0}")]
  UnsupportedFormat(String),
  #[error("不支持的色深: {0}，仅支持 24 位")]
  UnsupportedDepth(i64),
  #[error("caps 缺少字段: {0}")]
  MissingField(&'static str),
  #[error("caps 字段 {field} 无效: {reason}")]
  InvalidField { field: &'static str, reason: String },
}

impl ParseError {
  fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
    ParseError::InvalidField {
      field,
      reason: reason.into(),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelTag {
  Red,
  Green,
  Blue,
  Alpha,
  Unused,
}

impl ChannelTag {
  pub const COLORS: [ChannelTag; 3] = [ChannelTag::Red, ChannelTag::Green, ChannelTag::Blue];

  pub fn is_color(self) -> bool {
    matches!(self, ChannelTag::Red | ChannelTag::Green | ChannelTag::Blue)
  }

  pub fn name(self) -> &'static str {
    match self {
      ChannelTag::Red => "red",
      ChannelTag::Green => "green",
      ChannelTag::Blue => "blue",
      ChannelTag::Alpha => "alpha",
      ChannelTag::Unused => "x",
    }
  }
}

impl fmt::Display for ChannelTag {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
  Big,
  Little,
}

impl ByteOrder {
  pub const BIG_ENDIAN_TAG: i64 = 4321;
  pub const LITTLE_ENDIAN_TAG: i64 = 1234;

  /// 除 4321 外一律视为小端
  pub fn from_endianness(tag: i64) -> Self {
    if tag == Self::BIG_ENDIAN_TAG {
      ByteOrder::Big
    } else {
      ByteOrder::Little
    }
  }

  /// 将 32 位掩码按字节序拆分，并截取像素实际占用的字节
  ///
  /// 小端取低 `bytes_per_pixel` 个字节，大端取高 `bytes_per_pixel` 个字节。
  pub fn significant_bytes(self, mask: u32, bytes_per_pixel: usize) -> Vec<u8> {
    let bytes_per_pixel = bytes_per_pixel.min(4);
    match self {
      ByteOrder::Big => mask.to_be_bytes()[4 - bytes_per_pixel..].to_vec(),
      ByteOrder::Little => mask.to_le_bytes()[..bytes_per_pixel].to_vec(),
    }
  }

  /// 通道在像素内的字节位置：截取后最大字节的下标
  ///
  /// 掩码在像素范围内全为零时返回 `None`。
  pub fn mask_position(self, mask: u32, bytes_per_pixel: usize) -> Option<usize> {
    let bytes = self.significant_bytes(mask, bytes_per_pixel);
    let (position, max) = bytes
      .iter()
      .enumerate()
      .fold((0, 0u8), |best, (idx, &byte)| {
        if byte > best.1 { (idx, byte) } else { best }
      });
    (max != 0).then_some(position)
  }
}

/// 打包 RGB 的两种描述方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackedDescription {
  Masks,
  Named(&'static [ChannelTag]),
}

/// caps 对应的原始布局
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawLayout {
  PackedRgb(PackedDescription),
  Unsupported(String),
}

use ChannelTag::{Alpha as A, Blue as B, Green as G, Red as R, Unused as X};

const NAMED_RGB_FORMATS: [(&str, &[ChannelTag]); 10] = [
  ("RGB", &[R, G, B]),
  ("BGR", &[B, G, R]),
  ("RGBx", &[R, G, B, X]),
  ("xRGB", &[X, R, G, B]),
  ("BGRx", &[B, G, R, X]),
  ("xBGR", &[X, B, G, R]),
  ("RGBA", &[R, G, B, A]),
  ("BGRA", &[B, G, R, A]),
  ("ARGB", &[A, R, G, B]),
  ("ABGR", &[A, B, G, R]),
];

impl RawLayout {
  pub fn classify(caps: &CapsStructure) -> Self {
    match caps.name() {
      LEGACY_RGB_MIMETYPE => RawLayout::PackedRgb(PackedDescription::Masks),
      RAW_VIDEO_MIMETYPE => match caps.get_str("format") {
        Some(format) => NAMED_RGB_FORMATS
          .iter()
          .find(|(name, _)| *name == format)
          .map(|(_, order)| RawLayout::PackedRgb(PackedDescription::Named(order)))
          .unwrap_or_else(|| RawLayout::Unsupported(format!("{} ({})", caps.name(), format))),
        None => RawLayout::Unsupported(format!("{} (未声明 format)", caps.name())),
      },
      other => RawLayout::Unsupported(other.to_string()),
    }
  }
}

/// 协商后的像素格式，协商完成后不可变
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelFormat {
  width: u32,
  height: u32,
  bits_per_pixel: u8,
  color_depth: u8,
  byte_order: ByteOrder,
  channel_order: Box<[ChannelTag]>,
  rgb_positions: [usize; 3],
}

impl PixelFormat {
  pub fn new(
    width: u32,
    height: u32,
    bits_per_pixel: u8,
    color_depth: u8,
    byte_order: ByteOrder,
    channel_order: Vec<ChannelTag>,
  ) -> Result<Self, ParseError> {
    if width == 0 {
      return Err(ParseError::invalid("width", "宽度必须大于 0"));
    }
    if height == 0 {
      return Err(ParseError::invalid("height", "高度必须大于 0"));
    }
    if color_depth > bits_per_pixel {
      return Err(ParseError::invalid(
        "depth",
        format!("色深 {} 大于每像素位数 {}", color_depth, bits_per_pixel),
      ));
    }
    if bits_per_pixel % 8 != 0 {
      return Err(ParseError::invalid(
        "bpp",
        format!("每像素位数 {} 不是 8 的整数倍", bits_per_pixel),
      ));
    }

    let channels = channel_order.len();
    if !(3..=4).contains(&channels) || channels != (bits_per_pixel / 8) as usize {
      return Err(ParseError::invalid(
        "bpp",
        format!("{} 位像素无法容纳 {} 个通道", bits_per_pixel, channels),
      ));
    }

    let mut rgb_positions = [0usize; 3];
    for (slot, color) in ChannelTag::COLORS.iter().enumerate() {
      let mut found = channel_order.iter().enumerate().filter(|(_, tag)| *tag == color);
      match (found.next(), found.next()) {
        (Some((position, _)), None) => rgb_positions[slot] = position,
        _ => {
          return Err(ParseError::invalid(
            "channel_order",
            format!("通道 {} 必须且只能出现一次", color),
          ));
        }
      }
    }

    let fillers = channel_order.iter().filter(|tag| !tag.is_color()).count();
    if fillers != channels - 3 {
      return Err(ParseError::invalid(
        "channel_order",
        "四通道格式必须有且只有一个 alpha 或填充通道",
      ));
    }

    Ok(Self {
      width,
      height,
      bits_per_pixel,
      color_depth,
      byte_order,
      channel_order: channel_order.into_boxed_slice(),
      rgb_positions,
    })
  }

  /// 从 caps 解析像素格式
  pub fn parse(caps: &CapsStructure) -> Result<Self, ParseError> {
    match RawLayout::classify(caps) {
      RawLayout::PackedRgb(PackedDescription::Masks) => parse_masked_rgb(caps),
      RawLayout::PackedRgb(PackedDescription::Named(order)) => parse_named_rgb(caps, order),
      RawLayout::Unsupported(what) => Err(ParseError::UnsupportedFormat(what)),
    }
  }

  pub fn width(&self) -> u32 {
    self.width
  }

  pub fn height(&self) -> u32 {
    self.height
  }

  pub fn bits_per_pixel(&self) -> u8 {
    self.bits_per_pixel
  }

  pub fn color_depth(&self) -> u8 {
    self.color_depth
  }

  pub fn byte_order(&self) -> ByteOrder {
    self.byte_order
  }

  pub fn channel_order(&self) -> &[ChannelTag] {
    &self.channel_order
  }

  pub fn bytes_per_pixel(&self) -> usize {
    (self.bits_per_pixel / 8) as usize
  }

  pub fn channels(&self) -> usize {
    self.channel_order.len()
  }

  /// 一帧应有的字节数
  pub fn frame_size(&self) -> usize {
    self.width as usize * self.height as usize * self.bytes_per_pixel()
  }

  pub fn position(&self, tag: ChannelTag) -> Option<usize> {
    self.channel_order.iter().position(|t| *t == tag)
  }

  /// 红、绿、蓝三个通道在像素内的字节位置
  pub fn rgb_positions(&self) -> [usize; 3] {
    self.rgb_positions
  }
}

impl fmt::Display for PixelFormat {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let order: Vec<&str> = self.channel_order.iter().map(|t| t.name()).collect();
    write!(
      f,
      "{}x{} bpp={} depth={} {:?} [{}]",
      self.width,
      self.height,
      self.bits_per_pixel,
      self.color_depth,
      self.byte_order,
      order.join(", ")
    )
  }
}

fn required_int(caps: &CapsStructure, field: &'static str) -> Result<i64, ParseError> {
  match caps.get(field) {
    Some(CapsValue::Int(value)) => Ok(*value),
    Some(CapsValue::Str(value)) => Err(ParseError::invalid(
      field,
      format!("期望整数，实际为字符串 {:?}", value),
    )),
    None => Err(ParseError::MissingField(field)),
  }
}

fn required_dimension(caps: &CapsStructure, field: &'static str) -> Result<u32, ParseError> {
  let value = required_int(caps, field)?;
  u32::try_from(value)
    .ok()
    .filter(|v| *v > 0)
    .ok_or_else(|| ParseError::invalid(field, format!("尺寸 {} 超出范围", value)))
}

// GStreamer 以有符号 int 传递掩码，负数保留其位模式
fn required_mask(caps: &CapsStructure, field: &'static str) -> Result<u32, ParseError> {
  let value = required_int(caps, field)?;
  if !(i32::MIN as i64..=u32::MAX as i64).contains(&value) {
    return Err(ParseError::invalid(field, format!("掩码 {:#x} 超出 32 位", value)));
  }
  Ok(value as u32)
}

fn parse_masked_rgb(caps: &CapsStructure) -> Result<PixelFormat, ParseError> {
  let width = required_dimension(caps, "width")?;
  let height = required_dimension(caps, "height")?;
  let bpp = required_int(caps, "bpp")?;
  let depth = required_int(caps, "depth")?;

  if depth != SUPPORTED_COLOR_DEPTH as i64 {
    return Err(ParseError::UnsupportedDepth(depth));
  }
  if bpp != 24 && bpp != 32 {
    return Err(ParseError::invalid(
      "bpp",
      format!("24 位色深只支持 24 或 32 位像素，实际为 {}", bpp),
    ));
  }

  let byte_order = ByteOrder::from_endianness(required_int(caps, "endianness")?);
  let bytes_per_pixel = (bpp / 8) as usize;

  let mut slots: Vec<Option<ChannelTag>> = vec![None; bytes_per_pixel];
  for (field, tag) in [
    ("red_mask", ChannelTag::Red),
    ("green_mask", ChannelTag::Green),
    ("blue_mask", ChannelTag::Blue),
  ] {
    let mask = required_mask(caps, field)?;
    let position = byte_order
      .mask_position(mask, bytes_per_pixel)
      .ok_or_else(|| ParseError::invalid(field, format!("掩码 {:#010x} 不落在像素内", mask)))?;
    if let Some(other) = slots[position] {
      return Err(ParseError::invalid(
        field,
        format!("与通道 {} 占用同一字节 {}", other, position),
      ));
    }
    slots[position] = Some(tag);
  }

  // 第四个通道：有 alpha 掩码时为 alpha，否则为填充
  if bpp as u8 > SUPPORTED_COLOR_DEPTH {
    let filler = if caps.has_field("alpha_mask") {
      ChannelTag::Alpha
    } else {
      ChannelTag::Unused
    };
    if let Some(slot) = slots.iter_mut().find(|slot| slot.is_none()) {
      *slot = Some(filler);
    }
  }

  PixelFormat::new(
    width,
    height,
    bpp as u8,
    depth as u8,
    byte_order,
    slots.into_iter().flatten().collect(),
  )
}

fn parse_named_rgb(
  caps: &CapsStructure,
  order: &'static [ChannelTag],
) -> Result<PixelFormat, ParseError> {
  let width = required_dimension(caps, "width")?;
  let height = required_dimension(caps, "height")?;
  let bpp = (order.len() * 8) as u8;

  // 具名格式按内存顺序描述，等价于大端
  PixelFormat::new(
    width,
    height,
    bpp,
    SUPPORTED_COLOR_DEPTH,
    ByteOrder::Big,
    order.to_vec(),
  )
}

#[cfg(test)]
mod tests {
  use super::*;

  fn legacy_caps(bpp: i64, endianness: i64, masks: [u32; 3]) -> CapsStructure {
    CapsStructure::new("video/x-raw-rgb")
      .with_int("width", 4)
      .with_int("height", 4)
      .with_int("bpp", bpp)
      .with_int("depth", 24)
      .with_int("endianness", endianness)
      .with_int("red_mask", masks[0] as i64)
      .with_int("green_mask", masks[1] as i64)
      .with_int("blue_mask", masks[2] as i64)
  }

  // 由字节位置反推掩码
  fn mask_for(position: usize, byte_order: ByteOrder, bytes_per_pixel: usize) -> u32 {
    match byte_order {
      ByteOrder::Little => 0xffu32 << (8 * position),
      ByteOrder::Big => 0xffu32 << (8 * (bytes_per_pixel - 1 - position)),
    }
  }

  fn permutations(n: usize) -> Vec<[usize; 3]> {
    let mut out = Vec::new();
    for r in 0..n {
      for g in 0..n {
        for b in 0..n {
          if r != g && g != b && r != b {
            out.push([r, g, b]);
          }
        }
      }
    }
    out
  }

  #[test]
  fn little_endian_rgb_masks() {
    let caps = legacy_caps(24, 1234, [0x0000ff, 0x00ff00, 0xff0000]);
    let format = PixelFormat::parse(&caps).unwrap();

    assert_eq!(
      format.channel_order(),
      &[ChannelTag::Red, ChannelTag::Green, ChannelTag::Blue]
    );
    assert_eq!(format.byte_order(), ByteOrder::Little);
    assert_eq!(format.bytes_per_pixel(), 3);
    assert_eq!(format.frame_size(), 4 * 4 * 3);
  }

  #[test]
  fn big_endian_rgb_masks() {
    let caps = legacy_caps(24, 4321, [0xff0000, 0x00ff00, 0x0000ff]);
    let format = PixelFormat::parse(&caps).unwrap();

    assert_eq!(
      format.channel_order(),
      &[ChannelTag::Red, ChannelTag::Green, ChannelTag::Blue]
    );
    assert_eq!(format.byte_order(), ByteOrder::Big);
  }

  #[test]
  fn derived_positions_reproduce_masks() {
    for byte_order in [ByteOrder::Little, ByteOrder::Big] {
      let tag = match byte_order {
        ByteOrder::Big => ByteOrder::BIG_ENDIAN_TAG,
        ByteOrder::Little => ByteOrder::LITTLE_ENDIAN_TAG,
      };
      for bpp in [24i64, 32] {
        let bytes_per_pixel = (bpp / 8) as usize;
        for positions in permutations(bytes_per_pixel) {
          let masks = positions.map(|p| mask_for(p, byte_order, bytes_per_pixel));
          let format = PixelFormat::parse(&legacy_caps(bpp, tag, masks)).unwrap();

          for (color, mask) in ChannelTag::COLORS.iter().zip(masks) {
            let position = format.position(*color).unwrap();
            assert_eq!(
              mask_for(position, byte_order, bytes_per_pixel),
              mask,
              "{:?} bpp={} {:?}",
              byte_order,
              bpp,
              positions
            );
          }
        }
      }
    }
  }

  #[test]
  fn fourth_channel_is_alpha_only_with_alpha_mask() {
    let masks = [0xff000000, 0x00ff0000, 0x0000ff00];

    let padded = PixelFormat::parse(&legacy_caps(32, 4321, masks)).unwrap();
    assert_eq!(
      padded.channel_order(),
      &[ChannelTag::Red, ChannelTag::Green, ChannelTag::Blue, ChannelTag::Unused]
    );

    let with_alpha = legacy_caps(32, 4321, masks).with_int("alpha_mask", 0x000000ff);
    let alpha = PixelFormat::parse(&with_alpha).unwrap();
    assert_eq!(alpha.channel_order()[3], ChannelTag::Alpha);
    assert_eq!(alpha.rgb_positions(), [0, 1, 2]);
  }

  #[test]
  fn only_24_bit_depth_is_supported() {
    let caps = legacy_caps(32, 1234, [0xff, 0xff00, 0xff0000]).with_int("depth", 32);
    assert_eq!(PixelFormat::parse(&caps), Err(ParseError::UnsupportedDepth(32)));
  }

  #[test]
  fn yuv_is_rejected() {
    let caps = CapsStructure::new("video/x-raw-yuv")
      .with_int("width", 4)
      .with_int("height", 4);
    assert!(matches!(
      PixelFormat::parse(&caps),
      Err(ParseError::UnsupportedFormat(_))
    ));

    let planar = CapsStructure::new("video/x-raw")
      .with_str("format", "I420")
      .with_int("width", 4)
      .with_int("height", 4);
    assert!(matches!(
      PixelFormat::parse(&planar),
      Err(ParseError::UnsupportedFormat(_))
    ));

    let audio = CapsStructure::new("audio/x-raw");
    assert!(matches!(
      PixelFormat::parse(&audio),
      Err(ParseError::UnsupportedFormat(_))
    ));
  }

  #[test]
  fn missing_and_conflicting_masks() {
    let caps = CapsStructure::new("video/x-raw-rgb")
      .with_int("width", 4)
      .with_int("height", 4)
      .with_int("bpp", 24)
      .with_int("depth", 24)
      .with_int("endianness", 1234)
      .with_int("red_mask", 0xff)
      .with_int("green_mask", 0xff00);
    assert_eq!(
      PixelFormat::parse(&caps),
      Err(ParseError::MissingField("blue_mask"))
    );

    let overlapping = legacy_caps(24, 1234, [0xff, 0xff, 0xff0000]);
    assert!(matches!(
      PixelFormat::parse(&overlapping),
      Err(ParseError::InvalidField { field: "green_mask", .. })
    ));

    // 大端 24 位像素不包含最高字节
    let outside = legacy_caps(24, 4321, [0xff000000, 0xff00, 0xff]);
    assert!(matches!(
      PixelFormat::parse(&outside),
      Err(ParseError::InvalidField { field: "red_mask", .. })
    ));

    let wide =
      legacy_caps(24, 1234, [0xff, 0xff00, 0xff0000]).with_int("red_mask", 0x1_0000_00ff);
    assert!(matches!(
      PixelFormat::parse(&wide),
      Err(ParseError::InvalidField { field: "red_mask", .. })
    ));

    // 有符号 int 形式的掩码照常接受
    let signed = legacy_caps(32, 4321, [0xff000000, 0xff0000, 0xff00])
      .with_int("red_mask", 0xff000000u32 as i32 as i64);
    let format = PixelFormat::parse(&signed).unwrap();
    assert_eq!(format.position(ChannelTag::Red), Some(0));
  }

  #[test]
  fn named_formats() {
    let caps = CapsStructure::new("video/x-raw")
      .with_str("format", "BGRx")
      .with_int("width", 8)
      .with_int("height", 2);
    let format = PixelFormat::parse(&caps).unwrap();
    assert_eq!(format.bytes_per_pixel(), 4);
    assert_eq!(format.rgb_positions(), [2, 1, 0]);
    assert_eq!(format.position(ChannelTag::Unused), Some(3));
    assert_eq!(format.frame_size(), 8 * 2 * 4);
  }

  #[test]
  fn constructor_enforces_invariants() {
    use ChannelTag::*;
    assert!(PixelFormat::new(4, 4, 24, 24, ByteOrder::Little, vec![Red, Green, Blue]).is_ok());
    assert!(PixelFormat::new(4, 4, 24, 32, ByteOrder::Little, vec![Red, Green, Blue]).is_err());
    assert!(PixelFormat::new(4, 4, 32, 24, ByteOrder::Little, vec![Red, Green, Blue]).is_err());
    assert!(
      PixelFormat::new(4, 4, 32, 24, ByteOrder::Little, vec![Red, Green, Alpha, Unused]).is_err()
    );
    assert!(PixelFormat::new(4, 4, 24, 24, ByteOrder::Little, vec![Red, Red, Blue]).is_err());
    assert!(PixelFormat::new(0, 4, 24, 24, ByteOrder::Little, vec![Red, Green, Blue]).is_err());
  }
}
