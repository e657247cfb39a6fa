// 该文件是 Beifeng （北风） 项目的一部分。
// src/model/rknn.rs - RKNN 推理引擎
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

use ndarray::ArrayView4;
use rknpu::{Context, InitFlags, TensorFormat, TensorType};
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::{EngineOutputs, InferenceEngine},
};

const RKNN_NUM_INPUTS: u32 = 1;
// boxes, classes, scores, count
const RKNN_NUM_OUTPUTS: u32 = 4;

#[derive(Error, Debug)]
pub enum RknnEngineError {
  #[error("模型加载错误: {0}")]
  ModelLoadError(std::io::Error),
  #[error("模型无效: {0}")]
  ModelInvalid(String),
  #[error("RKNN 错误: {0}")]
  RknnError(rknpu::Error),
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
  #[error("输出 {index} 读取失败: {reason}")]
  OutputError { index: u32, reason: String },
}

impl From<std::io::Error> for RknnEngineError {
  fn from(err: std::io::Error) -> Self {
    RknnEngineError::ModelLoadError(err)
  }
}

impl From<rknpu::Error> for RknnEngineError {
  fn from(err: rknpu::Error) -> Self {
    RknnEngineError::RknnError(err)
  }
}

pub struct RknnEngineBuilder {
  model_path: PathBuf,
  flags: InitFlags,
}

impl FromUrlWithScheme for RknnEngineBuilder {
  const SCHEME: &'static str = "rknn";
}

impl FromUrl for RknnEngineBuilder {
  type Error = RknnEngineError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(RknnEngineError::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    Ok(RknnEngineBuilder::new(url.path()))
  }
}

impl RknnEngineBuilder {
  pub fn new(model_path: impl Into<PathBuf>) -> Self {
    Self {
      model_path: model_path.into(),
      flags: InitFlags::default(),
    }
  }

  pub fn flags(mut self, flags: InitFlags) -> Self {
    self.flags = flags;
    self
  }

  pub fn build(self) -> Result<RknnEngine, RknnEngineError> {
    info!("加载模型文件: {}", self.model_path.display());
    let model_data = std::fs::read(&self.model_path)?;
    debug!(
      "模型文件大小: {:.2} MB",
      model_data.len() as f64 / (1024.0 * 1024.0)
    );

    info!("创建 RKNN 推理上下文");
    let context = Context::new(&model_data, self.flags)?;

    let num_inputs = context.num_inputs()?;
    let num_outputs = context.num_outputs()?;
    debug!("模型输入数量: {}", num_inputs);
    debug!("模型输出数量: {}", num_outputs);

    if num_inputs != RKNN_NUM_INPUTS || num_outputs != RKNN_NUM_OUTPUTS {
      let msg = format!(
        "预期模型输入/输出数量为 {}/{}, 实际为 {}/{}",
        RKNN_NUM_INPUTS, RKNN_NUM_OUTPUTS, num_inputs, num_outputs
      );
      error!("{}", msg);
      return Err(RknnEngineError::ModelInvalid(msg));
    }

    info!("模型加载完成");
    Ok(RknnEngine { context })
  }
}

/// 基于 RKNN NPU 的检测引擎，只有一个输入，输入名称仅用于日志
pub struct RknnEngine {
  context: Context,
}

impl InferenceEngine for RknnEngine {
  type Error = RknnEngineError;

  fn run(&self, input_name: &str, input: ArrayView4<'_, u8>) -> Result<EngineOutputs, Self::Error> {
    let data = input
      .as_slice()
      .ok_or_else(|| RknnEngineError::ModelInvalid("输入张量内存不连续".to_string()))?;

    debug!("设置模型输入 {}: {:?}", input_name, input.shape());
    self
      .context
      .set_input(0, data, TensorFormat::NHWC, TensorType::UInt8)?;

    debug!("执行模型推理");
    self.context.run()?;

    debug!("获取模型输出");
    let output = self.context.get_outputs()?;
    let mut tensors = Vec::with_capacity(RKNN_NUM_OUTPUTS as usize);
    for index in 0..RKNN_NUM_OUTPUTS {
      let tensor = output
        .get_f32(index as usize)
        .map_err(|e| RknnEngineError::OutputError {
          index,
          reason: e.to_string(),
        })?;
      tensors.push(tensor.to_vec());
    }

    let count = tensors.pop().unwrap_or_default();
    let scores = tensors.pop().unwrap_or_default();
    let classes = tensors.pop().unwrap_or_default();
    let boxes = tensors.pop().unwrap_or_default();

    EngineOutputs::from_flat(boxes, classes, scores, count)
      .map_err(|e| RknnEngineError::ModelInvalid(e.to_string()))
  }
}
