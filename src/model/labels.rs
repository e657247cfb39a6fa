// 该文件是 Beifeng （北风） 项目的一部分。
// src/model/labels.rs - 类别名称表
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

use thiserror::Error;
use tracing::{debug, info};

const COCO_LABELS: &str = include_str!("../../labels/coco.json");
const UNKNOWN_LABEL: &str = "N/A";

#[derive(Error, Debug)]
pub enum LabelError {
  #[error("标签文件读取错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("标签文件格式错误: {0}")]
  FormatError(#[from] serde_json::Error),
  #[error("标签表为空")]
  Empty,
}

/// 固定大小的类别名称表，下标即类别编号
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassNames {
  names: Box<[String]>,
}

impl ClassNames {
  /// 内置的 COCO 80 类标签
  pub fn coco() -> Result<Self, LabelError> {
    Self::from_json_str(COCO_LABELS)
  }

  /// 从 JSON 字符串数组构造
  pub fn from_json_str(json: &str) -> Result<Self, LabelError> {
    let names: Vec<String> = serde_json::from_str(json)?;
    if names.is_empty() {
      return Err(LabelError::Empty);
    }
    Ok(Self {
      names: names.into_boxed_slice(),
    })
  }

  pub fn from_file(path: impl AsRef<Path>) -> Result<Self, LabelError> {
    let path = path.as_ref();
    info!("加载标签文件: {}", path.display());
    let labels = Self::from_json_str(&std::fs::read_to_string(path)?)?;
    debug!("标签数量: {}", labels.len());
    Ok(labels)
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }

  /// 超出范围的编号返回 `N/A`
  pub fn label(&self, class_id: i32) -> &str {
    usize::try_from(class_id)
      .ok()
      .and_then(|idx| self.names.get(idx))
      .map(String::as_str)
      .unwrap_or(UNKNOWN_LABEL)
  }
}
