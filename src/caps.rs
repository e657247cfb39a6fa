// 该文件是 Beifeng （北风） 项目的一部分。
// src/caps.rs - 流能力（caps）描述
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

//! # Caps 描述
//!
//! 宿主管道在协商阶段给出的键值结构，例如：
//!
//! ```text
//! video/x-raw-rgb, width=(int)640, height=(int)480, bpp=(int)24, depth=(int)24,
//!   endianness=(int)4321, red_mask=(int)0xff0000, green_mask=(int)0x00ff00, blue_mask=(int)0x0000ff
//! ```
//!
//! 这里只保留整数与字符串两类字段，其余类型（分数、范围等）与像素布局无关。

use std::{collections::BTreeMap, fmt, str::FromStr};

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CapsError {
  #[error("caps 描述为空")]
  Empty,
  #[error("无效的 mimetype: {0}")]
  InvalidName(String),
  #[error("无效的字段描述: {0}")]
  InvalidField(String),
  #[error("字段 {field} 的值无效: {value}")]
  InvalidValue { field: String, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapsValue {
  Int(i64),
  Str(String),
}

impl fmt::Display for CapsValue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      CapsValue::Int(v) => write!(f, "(int){}", v),
      CapsValue::Str(v) if v.is_empty() || v.contains(|c: char| c == ',' || c.is_whitespace()) => {
        write!(f, "(string)\"{}\"", v)
      }
      CapsValue::Str(v) => write!(f, "(string){}", v),
    }
  }
}

/// 单个 caps 结构体：mimetype 加上按名称排序的字段
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapsStructure {
  name: String,
  fields: BTreeMap<String, CapsValue>,
}

impl CapsStructure {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      fields: BTreeMap::new(),
    }
  }

  pub fn with_int(mut self, field: impl Into<String>, value: i64) -> Self {
    self.set(field, CapsValue::Int(value));
    self
  }

  pub fn with_str(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
    self.set(field, CapsValue::Str(value.into()));
    self
  }

  pub fn set(&mut self, field: impl Into<String>, value: CapsValue) {
    self.fields.insert(field.into(), value);
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  /// 拆分 mimetype，例如 `video/x-raw-rgb` 得到 `("video", "x-raw-rgb")`
  pub fn media_type(&self) -> (&str, &str) {
    self.name.split_once('/').unwrap_or((self.name.as_str(), ""))
  }

  pub fn get(&self, field: &str) -> Option<&CapsValue> {
    self.fields.get(field)
  }

  pub fn get_int(&self, field: &str) -> Option<i64> {
    match self.fields.get(field) {
      Some(CapsValue::Int(v)) => Some(*v),
      _ => None,
    }
  }

  pub fn get_str(&self, field: &str) -> Option<&str> {
    match self.fields.get(field) {
      Some(CapsValue::Str(v)) => Some(v),
      _ => None,
    }
  }

  pub fn has_field(&self, field: &str) -> bool {
    self.fields.contains_key(field)
  }

  pub fn fields(&self) -> impl Iterator<Item = (&str, &CapsValue)> {
    self.fields.iter().map(|(k, v)| (k.as_str(), v))
  }
}

impl fmt::Display for CapsStructure {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.name)?;
    for (field, value) in &self.fields {
      write!(f, ", {}={}", field, value)?;
    }
    Ok(())
  }
}

impl FromStr for CapsStructure {
  type Err = CapsError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let mut parts = split_top_level(s).into_iter();
    let name = parts.next().map(str::trim).unwrap_or_default();
    if name.is_empty() {
      return Err(CapsError::Empty);
    }
    if !name.contains('/') || name.contains(char::is_whitespace) {
      return Err(CapsError::InvalidName(name.to_string()));
    }

    let mut caps = CapsStructure::new(name);
    for part in parts {
      let part = part.trim();
      if part.is_empty() {
        continue;
      }
      let (field, raw) = part
        .split_once('=')
        .ok_or_else(|| CapsError::InvalidField(part.to_string()))?;
      let field = field.trim();
      if field.is_empty() {
        return Err(CapsError::InvalidField(part.to_string()));
      }
      let value = parse_value(field, raw.trim())?;
      caps.set(field, value);
    }

    Ok(caps)
  }
}

// 按顶层逗号切分，引号内的逗号保留
fn split_top_level(s: &str) -> Vec<&str> {
  let mut parts = Vec::new();
  let mut start = 0;
  let mut quoted = false;
  for (idx, ch) in s.char_indices() {
    match ch {
      '"' => quoted = !quoted,
      ',' if !quoted => {
        parts.push(&s[start..idx]);
        start = idx + 1;
      }
      _ => {}
    }
  }
  parts.push(&s[start..]);
  parts
}

fn parse_value(field: &str, raw: &str) -> Result<CapsValue, CapsError> {
  let invalid = || CapsError::InvalidValue {
    field: field.to_string(),
    value: raw.to_string(),
  };

  let (kind, text) = match raw.strip_prefix('(') {
    Some(rest) => {
      let (kind, text) = rest.split_once(')').ok_or_else(invalid)?;
      (Some(kind.trim()), text.trim())
    }
    None => (None, raw),
  };

  match kind {
    Some("int" | "uint" | "i" | "gint") => parse_int(text).map(CapsValue::Int).ok_or_else(invalid),
    Some("string" | "str" | "s") => Ok(CapsValue::Str(unquote(text).to_string())),
    Some(_) => Err(invalid()),
    None => Ok(
      parse_int(text)
        .map(CapsValue::Int)
        .unwrap_or_else(|| CapsValue::Str(unquote(text).to_string())),
    ),
  }
}

fn parse_int(text: &str) -> Option<i64> {
  let (negative, digits) = match text.strip_prefix('-') {
    Some(rest) => (true, rest),
    None => (false, text),
  };
  let value = match digits
    .strip_prefix("0x")
    .or_else(|| digits.strip_prefix("0X"))
  {
    Some(hex) => i64::from_str_radix(hex, 16).ok()?,
    None => digits.parse::<i64>().ok()?,
  };
  Some(if negative { -value } else { value })
}

fn unquote(text: &str) -> &str {
  text
    .strip_prefix('"')
    .and_then(|t| t.strip_suffix('"'))
    .unwrap_or(text)
}
