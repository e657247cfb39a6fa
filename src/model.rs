// 该文件是 Beifeng （北风） 项目的一部分。
// src/model.rs - 推理引擎与检测结果
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

use ndarray::{Array1, Array2, Array4, ArrayD, ArrayView4, Axis, Ix2, Ix3, IxDyn};
use thiserror::Error;
use tracing::debug;

use crate::frame::PixelBufferView;

/// 模型默认的输入名称
pub const DEFAULT_INPUT_NAME: &str = "image_tensor";
/// 模型输入通道数（RGB）
pub const MODEL_CHANNELS: usize = 3;

/// 推理引擎
///
/// 接收 `[1, H, W, 3]` 的 `u8` 张量，返回四个并列输出。
pub trait InferenceEngine {
  type Error: std::error::Error + Send + Sync + 'static;

  fn run(&self, input_name: &str, input: ArrayView4<'_, u8>) -> Result<EngineOutputs, Self::Error>;
}

/// 引擎原始输出
///
/// - `boxes`: `[1, N, 4]`，每行为 `(y_min, x_min, y_max, x_max)`
/// - `classes`: `[1, N]`
/// - `scores`: `[1, N]`
/// - `count`: `[1]`
#[derive(Debug, Clone)]
pub struct EngineOutputs {
  pub boxes: ArrayD<f32>,
  pub classes: ArrayD<f32>,
  pub scores: ArrayD<f32>,
  pub count: ArrayD<f32>,
}

impl EngineOutputs {
  /// 由单张图像的扁平输出构造，`boxes` 长度须为 4 的整数倍
  pub fn from_flat(
    boxes: Vec<f32>,
    classes: Vec<f32>,
    scores: Vec<f32>,
    count: Vec<f32>,
  ) -> Result<Self, InferenceError> {
    let shaped = |shape: &[usize], data: Vec<f32>, what: &str| {
      ArrayD::from_shape_vec(IxDyn(shape), data)
        .map_err(|e| InferenceError::MalformedOutput(format!("{}: {}", what, e)))
    };
    let slots = boxes.len() / 4;
    Ok(Self {
      boxes: shaped(&[1, slots, 4], boxes, "boxes")?,
      classes: shaped(&[1, classes.len()], classes, "classes")?,
      scores: shaped(&[1, scores.len()], scores, "scores")?,
      count: shaped(&[count.len()], count, "count")?,
    })
  }
}

#[derive(Error, Debug)]
pub enum InferenceError {
  #[error("推理引擎错误: {0}")]
  Engine(#[source] Box<dyn std::error::Error + Send + Sync>),
  #[error("模型输出格式错误: {0}")]
  MalformedOutput(String),
}

/// 归一化坐标的检测框
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
  pub y_min: f32,
  pub x_min: f32,
  pub y_max: f32,
  pub x_max: f32,
}

impl BoundingBox {
  pub fn new(y_min: f32, x_min: f32, y_max: f32, x_max: f32) -> Self {
    Self {
      y_min,
      x_min,
      y_max,
      x_max,
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
  pub class_id: i32,
  pub label: String,
  pub score: f32,
  pub bbox: BoundingBox,
}

/// 校验过形状的单张图像检测结果
#[derive(Debug, Clone)]
pub struct DetectionBatch {
  boxes: Array2<f32>,
  class_ids: Array1<f32>,
  scores: Array1<f32>,
  count: usize,
}

impl DetectionBatch {
  pub fn from_outputs(outputs: EngineOutputs) -> Result<Self, InferenceError> {
    let malformed = |what: &str, shape: &[usize]| {
      InferenceError::MalformedOutput(format!("{} 形状为 {:?}", what, shape))
    };

    let boxes_shape = outputs.boxes.shape().to_vec();
    let boxes = outputs
      .boxes
      .into_dimensionality::<Ix3>()
      .ok()
      .filter(|b| b.len_of(Axis(0)) == 1 && b.len_of(Axis(2)) == 4)
      .ok_or_else(|| malformed("boxes", &boxes_shape))?
      .index_axis_move(Axis(0), 0);
    let slots = boxes.nrows();

    let per_slot = |array: ArrayD<f32>, what: &str| {
      let shape = array.shape().to_vec();
      array
        .into_dimensionality::<Ix2>()
        .ok()
        .filter(|a| a.dim() == (1, slots))
        .map(|a| a.index_axis_move(Axis(0), 0))
        .ok_or_else(|| malformed(what, &shape))
    };
    let class_ids = per_slot(outputs.classes, "classes")?;
    let scores = per_slot(outputs.scores, "scores")?;

    let count = match outputs.count.iter().next() {
      Some(&count) if count.is_finite() && count >= 0.0 && (count as usize) <= slots => {
        count as usize
      }
      Some(&count) => {
        return Err(InferenceError::MalformedOutput(format!(
          "检测数量 {} 超出范围 0..={}",
          count, slots
        )));
      }
      None => return Err(malformed("count", outputs.count.shape())),
    };

    Ok(Self {
      boxes,
      class_ids,
      scores,
      count,
    })
  }

  pub fn len(&self) -> usize {
    self.count
  }

  pub fn is_empty(&self) -> bool {
    self.count == 0
  }

  /// 按引擎给出的顺序展开前 `count` 个检测结果，坐标保持归一化
  pub fn detections(&self, labels: &ClassNames) -> Vec<Detection> {
    (0..self.count)
      .map(|slot| {
        let class_id = self.class_ids[slot] as i32;
        let b = self.boxes.row(slot);
        Detection {
          class_id,
          label: labels.label(class_id).to_string(),
          score: self.scores[slot],
          bbox: BoundingBox::new(b[0], b[1], b[2], b[3]),
        }
      })
      .collect()
  }
}

/// 打包为 `[1, H, W, 3]`，通道按红、绿、蓝排列，alpha 与填充字节丢弃
pub fn pack_rgb_tensor(view: &PixelBufferView<'_>) -> Array4<u8> {
  let positions = view.format().rgb_positions();
  let pixels = view.array();
  Array4::from_shape_fn(
    (1, view.height(), view.width(), MODEL_CHANNELS),
    |(_, row, col, channel)| pixels[[row, col, positions[channel]]],
  )
}

/// 将像素视图送入推理引擎并解析结果
pub struct DetectionAdapter<'e, E> {
  engine: &'e E,
  input_name: &'e str,
}

impl<'e, E: InferenceEngine> DetectionAdapter<'e, E> {
  pub fn new(engine: &'e E, input_name: &'e str) -> Self {
    Self { engine, input_name }
  }

  pub fn infer(&self, view: &PixelBufferView<'_>) -> Result<DetectionBatch, InferenceError> {
    let tensor = pack_rgb_tensor(view);
    debug!("输入张量: {} {:?}", self.input_name, tensor.shape());

    let outputs = self
      .engine
      .run(self.input_name, tensor.view())
      .map_err(|e| InferenceError::Engine(Box::new(e)))?;

    let batch = DetectionBatch::from_outputs(outputs)?;
    debug!("检测到 {} 个物体", batch.len());
    Ok(batch)
  }

  pub fn detect(
    &self,
    view: &PixelBufferView<'_>,
    labels: &ClassNames,
  ) -> Result<Vec<Detection>, InferenceError> {
    let detections = self.infer(view)?.detections(labels);
    for det in &detections {
      debug!(
        "  {} {} {:.3} [{:.3}, {:.3}, {:.3}, {:.3}]",
        det.class_id,
        det.label,
        det.score,
        det.bbox.y_min,
        det.bbox.x_min,
        det.bbox.y_max,
        det.bbox.x_max
      );
    }
    Ok(detections)
  }
}

mod labels;
pub use self::labels::{ClassNames, LabelError};

mod provision;
pub use self::provision::{LocalModelStore, ModelProvider, ProvisionError};

#[cfg(feature = "rknpu")]
mod rknn;
#[cfg(feature = "rknpu")]
pub use self::rknn::{RknnEngine, RknnEngineBuilder, RknnEngineError};
