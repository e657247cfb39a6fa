// 该文件是 Beifeng （北风） 项目的一部分。
// src/model/provision.rs - 模型文件定位
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

use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme};

const DEFAULT_MODEL_FILE: &str = "model.rknn";

#[derive(Error, Debug)]
pub enum ProvisionError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("无效的模型标识: {0}")]
  InvalidModelId(String),
  #[error("找不到模型文件: {0}")]
  NotFound(PathBuf),
}

/// 将模型标识解析为本地模型文件路径，仅在构造时调用一次
pub trait ModelProvider {
  fn resolve(&self, model_id: &str) -> Result<PathBuf, ProvisionError>;
}

/// 本地模型仓库：`<root>/<model_id>/<model_file>`
///
/// 地址形如 `model:///var/lib/models?file=model.rknn`。
#[derive(Debug, Clone)]
pub struct LocalModelStore {
  root: PathBuf,
  model_file: String,
}

impl LocalModelStore {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self {
      root: root.into(),
      model_file: DEFAULT_MODEL_FILE.to_string(),
    }
  }

  pub fn model_file(mut self, file: impl Into<String>) -> Self {
    self.model_file = file.into();
    self
  }

  pub fn root(&self) -> &Path {
    &self.root
  }
}

impl FromUrlWithScheme for LocalModelStore {
  const SCHEME: &'static str = "model";
}

impl FromUrl for LocalModelStore {
  type Error = ProvisionError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ProvisionError::SchemeMismatch);
    }

    let mut store = LocalModelStore::new(url.path());
    if let Some((_, file)) = url.query_pairs().find(|(k, _)| k == "file") {
      store = store.model_file(file.into_owned());
    }
    Ok(store)
  }
}

impl ModelProvider for LocalModelStore {
  fn resolve(&self, model_id: &str) -> Result<PathBuf, ProvisionError> {
    let id = Path::new(model_id);
    let single_normal = {
      let mut components = id.components();
      matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
      )
    };
    if !single_normal {
      return Err(ProvisionError::InvalidModelId(model_id.to_string()));
    }

    let path = self.root.join(id).join(&self.model_file);
    if !path.is_file() {
      return Err(ProvisionError::NotFound(path));
    }

    info!("模型 {} 位于 {}", model_id, path.display());
    Ok(path)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn resolves_models_inside_root() {
    let root = tempfile::tempdir().unwrap();
    let model_dir = root.path().join("ssd_mobilenet_v2_coco");
    std::fs::create_dir(&model_dir).unwrap();
    std::fs::write(model_dir.join("model.rknn"), b"rknn").unwrap();

    let store = LocalModelStore::new(root.path());
    assert_eq!(
      store.resolve("ssd_mobilenet_v2_coco").unwrap(),
      model_dir.join("model.rknn")
    );
    assert!(matches!(
      store.resolve("missing"),
      Err(ProvisionError::NotFound(_))
    ));
  }

  #[test]
  fn rejects_ids_escaping_root() {
    let store = LocalModelStore::new("/models");
    for id in ["", "..", "a/b", "/etc"] {
      assert!(
        matches!(store.resolve(id), Err(ProvisionError::InvalidModelId(_))),
        "{}",
        id
      );
    }
  }

  #[test]
  fn builds_from_url() {
    let url = Url::parse("model:///opt/models?file=detect.rknn").unwrap();
    let store = LocalModelStore::from_url(&url).unwrap();
    assert_eq!(store.root(), Path::new("/opt/models"));
    assert_eq!(store.model_file, "detect.rknn");

    let wrong = Url::parse("rknn:///opt/models/detect.rknn").unwrap();
    assert!(matches!(
      LocalModelStore::from_url(&wrong),
      Err(ProvisionError::SchemeMismatch)
    ));
  }
}
