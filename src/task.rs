// 该文件是 Beifeng （北风） 项目的一部分。
// src/task.rs - 逐帧原地变换
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

use std::path::PathBuf;
use std::time::Instant;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
  caps::CapsStructure,
  format::{ParseError, PixelFormat},
  frame::{PixelBufferView, ShapeError},
  model::{ClassNames, DEFAULT_INPUT_NAME, DetectionAdapter, InferenceEngine, InferenceError, LabelError},
  output::{
    DEFAULT_THRESHOLD, OverlayRenderer, OverlayStyle,
    draw::{Caption, CaptionError},
  },
};

/// 交给宿主管道的两值状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformStatus {
  Ok,
  Error,
}

/// 宿主管道调用的原地变换接口
pub trait InPlaceTransform {
  /// caps 协商事件
  fn set_caps(&mut self, caps: &CapsStructure) -> Result<(), ParseError>;

  /// 处理一帧；任何错误都只会让这一帧被丢弃
  fn on_buffer(&mut self, buffer: &mut [u8], caps: &CapsStructure) -> TransformStatus;
}

#[derive(Error, Debug)]
pub enum TransformError {
  #[error("caps 解析错误: {0}")]
  Parse(#[from] ParseError),
  #[error("缓冲区形状错误: {0}")]
  Shape(#[from] ShapeError),
  #[error("推理错误: {0}")]
  Inference(#[from] InferenceError),
}

#[derive(Error, Debug)]
pub enum BuildError {
  #[error("置信度阈值无效: {0}")]
  InvalidThreshold(f32),
  #[error("输入名称为空")]
  EmptyInputName,
  #[error("标签加载错误: {0}")]
  Labels(#[from] LabelError),
  #[error("字体加载错误: {0}")]
  Font(#[from] CaptionError),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TransformStats {
  pub processed: u64,
  pub dropped: u64,
  pub drawn: u64,
}

struct Negotiated {
  caps: CapsStructure,
  format: PixelFormat,
}

impl Negotiated {
  fn new(caps: &CapsStructure) -> Result<Self, ParseError> {
    let format = PixelFormat::parse(caps)?;
    info!("协商像素格式: {}", format);
    Ok(Self {
      caps: caps.clone(),
      format,
    })
  }
}

pub struct OverlayTransformBuilder {
  threshold: f32,
  input_name: String,
  style: OverlayStyle,
  labels: Option<ClassNames>,
  font: Option<PathBuf>,
}

impl Default for OverlayTransformBuilder {
  fn default() -> Self {
    Self {
      threshold: DEFAULT_THRESHOLD,
      input_name: DEFAULT_INPUT_NAME.to_string(),
      style: OverlayStyle::default(),
      labels: None,
      font: None,
    }
  }
}

impl OverlayTransformBuilder {
  pub fn threshold(mut self, threshold: f32) -> Self {
    self.threshold = threshold;
    self
  }

  pub fn input_name(mut self, input_name: impl Into<String>) -> Self {
    self.input_name = input_name.into();
    self
  }

  pub fn style(mut self, style: OverlayStyle) -> Self {
    self.style = style;
    self
  }

  /// 缺省使用内置 COCO 标签
  pub fn labels(mut self, labels: ClassNames) -> Self {
    self.labels = Some(labels);
    self
  }

  /// 设置字体后在检测框上方绘制标签与分数
  pub fn font(mut self, path: impl Into<PathBuf>) -> Self {
    self.font = Some(path.into());
    self
  }

  pub fn build<E: InferenceEngine>(self, engine: E) -> Result<OverlayTransform<E>, BuildError> {
    if !(0.0..=1.0).contains(&self.threshold) {
      return Err(BuildError::InvalidThreshold(self.threshold));
    }
    if self.input_name.is_empty() {
      return Err(BuildError::EmptyInputName);
    }

    let labels = match self.labels {
      Some(labels) => labels,
      None => ClassNames::coco()?,
    };

    let mut renderer = OverlayRenderer::new(self.threshold).with_style(self.style);
    if let Some(path) = self.font {
      info!("加载字体文件: {}", path.display());
      renderer = renderer.with_caption(Caption::from_file(path)?);
    }

    info!(
      "变换已创建: 阈值 {}, 输入 {}, 标签 {} 个",
      self.threshold,
      self.input_name,
      labels.len()
    );

    Ok(OverlayTransform {
      engine,
      input_name: self.input_name,
      labels,
      renderer,
      negotiated: None,
      stats: TransformStats::default(),
    })
  }
}

/// 解析 → 视图 → 推理 → 叠加
///
/// 每个实例独占自己的引擎与格式缓存，不跨实例共享状态。
pub struct OverlayTransform<E> {
  engine: E,
  input_name: String,
  labels: ClassNames,
  renderer: OverlayRenderer,
  negotiated: Option<Negotiated>,
  stats: TransformStats,
}

impl OverlayTransform<()> {
  pub fn builder() -> OverlayTransformBuilder {
    OverlayTransformBuilder::default()
  }
}

impl<E: InferenceEngine> OverlayTransform<E> {
  pub fn engine(&self) -> &E {
    &self.engine
  }

  pub fn stats(&self) -> TransformStats {
    self.stats
  }

  /// 当前缓存的像素格式
  pub fn format(&self) -> Option<&PixelFormat> {
    self.negotiated.as_ref().map(|n| &n.format)
  }

  /// 处理一帧并返回绘制的检测框数量
  pub fn transform(
    &mut self,
    buffer: &mut [u8],
    caps: &CapsStructure,
  ) -> Result<usize, TransformError> {
    // caps 变化或解析失败时缓存保持清空
    let negotiated = match self.negotiated.take() {
      Some(cached) if cached.caps == *caps => cached,
      _ => Negotiated::new(caps)?,
    };
    let result = self.process(buffer, &negotiated.format);
    self.negotiated = Some(negotiated);
    result
  }

  fn process(&self, buffer: &mut [u8], format: &PixelFormat) -> Result<usize, TransformError> {
    let mut view = PixelBufferView::new(buffer, format)?;

    let now = Instant::now();
    let detections =
      DetectionAdapter::new(&self.engine, &self.input_name).detect(&view, &self.labels)?;
    debug!("推理完成，耗时: {:.2?}", now.elapsed());

    Ok(self.renderer.render(&mut view, &detections))
  }
}

impl<E: InferenceEngine> InPlaceTransform for OverlayTransform<E> {
  fn set_caps(&mut self, caps: &CapsStructure) -> Result<(), ParseError> {
    if self.negotiated.as_ref().is_some_and(|n| n.caps == *caps) {
      return Ok(());
    }
    self.negotiated = None;
    self.negotiated = Some(Negotiated::new(caps)?);
    Ok(())
  }

  fn on_buffer(&mut self, buffer: &mut [u8], caps: &CapsStructure) -> TransformStatus {
    match self.transform(buffer, caps) {
      Ok(drawn) => {
        self.stats.processed += 1;
        self.stats.drawn += drawn as u64;
        TransformStatus::Ok
      }
      Err(e) => {
        self.stats.dropped += 1;
        warn!("丢弃一帧 (累计 {}): {}", self.stats.dropped, e);
        TransformStatus::Error
      }
    }
  }
}
