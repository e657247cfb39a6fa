// 该文件是 Beifeng （北风） 项目的一部分。
// src/gst.rs - GStreamer 对接
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

//! # GStreamer 对接
//!
//! 将 GStreamer 的 caps 与缓冲区转换为本库的类型，供宿主元素在
//! `transform_ip` 中调用。元素注册不在本模块范围内。
//!
//! ```no_run
//! # use beifeng::{InPlaceTransform, gst::transform_gst_buffer};
//! # fn transform_ip<T: InPlaceTransform>(
//! #   transform: &mut T,
//! #   buffer: &mut gstreamer::BufferRef,
//! #   caps: &gstreamer::CapsRef,
//! # ) -> Result<gstreamer::FlowSuccess, gstreamer::FlowError> {
//! transform_gst_buffer(transform, buffer, caps).into_result()
//! # }
//! ```

use gstreamer as gst;
use thiserror::Error;
use tracing::error;

use crate::{
  caps::{CapsStructure, CapsValue},
  task::{InPlaceTransform, TransformStatus},
};

#[derive(Error, Debug)]
pub enum GstAdapterError {
  #[error("caps 中没有结构体")]
  NoStructure,
  #[error("无法以可写方式映射缓冲区: {0}")]
  MapError(#[from] gst::glib::BoolError),
}

impl TryFrom<&gst::StructureRef> for CapsStructure {
  type Error = GstAdapterError;

  fn try_from(structure: &gst::StructureRef) -> Result<Self, Self::Error> {
    let mut caps = CapsStructure::new(structure.name().to_string());
    for (field, value) in structure.iter() {
      // 分数、范围、列表等与像素布局无关
      if let Ok(v) = value.get::<i32>() {
        caps.set(field.to_string(), CapsValue::Int(v as i64));
      } else if let Ok(v) = value.get::<u32>() {
        caps.set(field.to_string(), CapsValue::Int(v as i64));
      } else if let Ok(v) = value.get::<String>() {
        caps.set(field.to_string(), CapsValue::Str(v));
      }
    }
    Ok(caps)
  }
}

/// 取 caps 的第一个结构体
pub fn caps_from_gst(caps: &gst::CapsRef) -> Result<CapsStructure, GstAdapterError> {
  caps
    .structure(0)
    .ok_or(GstAdapterError::NoStructure)?
    .try_into()
}

/// 丢帧映射为 `CustomSuccess`，基类据此丢弃该帧而不中断管道
impl From<TransformStatus> for gst::FlowReturn {
  fn from(status: TransformStatus) -> Self {
    match status {
      TransformStatus::Ok => gst::FlowReturn::Ok,
      TransformStatus::Error => gst::FlowReturn::CustomSuccess,
    }
  }
}

pub fn transform_gst_buffer<T: InPlaceTransform>(
  transform: &mut T,
  buffer: &mut gst::BufferRef,
  caps: &gst::CapsRef,
) -> gst::FlowReturn {
  let caps = match caps_from_gst(caps) {
    Ok(caps) => caps,
    Err(e) => {
      error!("无法转换 caps: {}", e);
      return TransformStatus::Error.into();
    }
  };

  let mut map = match buffer.map_writable() {
    Ok(map) => map,
    Err(e) => {
      error!("{}", GstAdapterError::from(e));
      return TransformStatus::Error.into();
    }
  };

  transform.on_buffer(map.as_mut_slice(), &caps).into()
}
