// 该文件是 Beifeng （北风） 项目的一部分。
// src/bin/overlay_raw.rs - 对原始 RGB 帧流做检测框叠加
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::{
  fs::File,
  io::{self, BufReader, BufWriter, ErrorKind, Read, Write},
  path::{Path, PathBuf},
  sync::mpsc,
};

use anyhow::{Result, bail};
use clap::Parser;
use tracing::{info, warn};
use url::Url;

use beifeng::{
  CapsStructure, FromUrl, FromUrlWithScheme, InPlaceTransform, OverlayTransform, PixelFormat,
  TransformStatus,
  model::{ClassNames, LocalModelStore, ModelProvider, RknnEngineBuilder},
  output::DEFAULT_THRESHOLD,
};

/// Beifeng 原始帧叠加工具
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型位置，rknn:///path/to/model.rknn 或 model:///models/root
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 使用 model:// 时的模型名称
  #[arg(long, value_name = "MODEL_ID")]
  pub model_id: Option<String>,
  /// 帧格式，例如 video/x-raw-rgb,width=640,height=480,bpp=24,depth=24,...
  #[arg(long, value_name = "CAPS")]
  pub caps: CapsStructure,
  /// 输入文件，`-` 表示标准输入
  #[arg(long, value_name = "INPUT", default_value = "-")]
  pub input: PathBuf,
  /// 输出文件，`-` 表示标准输出
  #[arg(long, value_name = "OUTPUT", default_value = "-")]
  pub output: PathBuf,

  #[arg(long, default_value_t = DEFAULT_THRESHOLD)]
  pub threshold: f32,
  /// 类别名称 JSON 数组，缺省为 COCO
  #[arg(long, value_name = "LABELS")]
  pub labels: Option<PathBuf>,
  /// 设置后绘制标签文本
  #[arg(long, value_name = "FONT")]
  pub font: Option<PathBuf>,
  #[arg(long, value_name = "INPUT_NAME")]
  pub input_name: Option<String>,

  /// 最多处理的帧数，0 表示不限
  #[arg(long, value_name = "MAX_FRAMES", default_value_t = 0)]
  pub max_frames: usize,
}

fn open_input(path: &Path) -> Result<Box<dyn Read>> {
  if path == Path::new("-") {
    Ok(Box::new(io::stdin().lock()))
  } else {
    Ok(Box::new(BufReader::new(File::open(path)?)))
  }
}

fn open_output(path: &Path) -> Result<Box<dyn Write>> {
  if path == Path::new("-") {
    Ok(Box::new(io::stdout().lock()))
  } else {
    Ok(Box::new(BufWriter::new(File::create(path)?)))
  }
}

/// 读满一帧；返回实际读到的字节数，流结束时可能不足一帧
fn read_frame(input: &mut dyn Read, buffer: &mut [u8]) -> io::Result<usize> {
  let mut filled = 0;
  while filled < buffer.len() {
    match input.read(&mut buffer[filled..]) {
      Ok(0) => break,
      Ok(n) => filled += n,
      Err(e) if e.kind() == ErrorKind::Interrupted => continue,
      Err(e) => return Err(e),
    }
  }
  Ok(filled)
}

fn model_builder(args: &Args) -> Result<RknnEngineBuilder> {
  if args.model.scheme() == LocalModelStore::SCHEME {
    let Some(model_id) = &args.model_id else {
      bail!("使用 {} 时必须指定 --model-id", args.model);
    };
    let path = LocalModelStore::from_url(&args.model)?.resolve(model_id)?;
    info!("模型 {} 解析为 {}", model_id, path.display());
    Ok(RknnEngineBuilder::new(path))
  } else {
    Ok(RknnEngineBuilder::from_url(&args.model)?)
  }
}

fn main() -> Result<()> {
  // 标准输出可能承载帧数据
  tracing_subscriber::fmt().with_writer(io::stderr).init();

  let args = Args::parse();

  info!("模型位置: {}", args.model);
  info!("帧格式: {}", args.caps);
  info!("输入: {}", args.input.display());
  info!("输出: {}", args.output.display());

  // 先解析格式，格式不支持时不必加载模型
  let format = PixelFormat::parse(&args.caps)?;
  info!("像素格式: {}, 每帧 {} 字节", format, format.frame_size());

  let engine = model_builder(&args)?.build()?;

  let mut builder = OverlayTransform::builder().threshold(args.threshold);
  if let Some(path) = &args.labels {
    builder = builder.labels(ClassNames::from_file(path)?);
  }
  if let Some(path) = &args.font {
    builder = builder.font(path);
  }
  if let Some(name) = &args.input_name {
    builder = builder.input_name(name.as_str());
  }
  let mut transform = builder.build(engine)?;
  transform.set_caps(&args.caps)?;

  let (tx, rx) = mpsc::channel();
  ctrlc::set_handler(move || {
    info!("收到中断信号，准备退出...");
    let _ = tx.send(());
  })?;

  let mut input = open_input(&args.input)?;
  let mut output = open_output(&args.output)?;
  let mut buffer = vec![0u8; format.frame_size()];

  info!("开始处理帧流...");
  let mut index = 0;
  loop {
    if rx.try_recv().is_ok() {
      break;
    }
    if (args.max_frames > 0) && (index >= args.max_frames) {
      warn!("已达到指定帧数 {}, 停止处理", args.max_frames);
      break;
    }

    let read = read_frame(&mut input, &mut buffer)?;
    if read == 0 {
      info!("输入结束");
      break;
    }
    if read < buffer.len() {
      warn!("末尾不完整帧 ({} / {} 字节)，已忽略", read, buffer.len());
      break;
    }

    // 丢弃的帧原样写出，保持帧数不变
    if transform.on_buffer(&mut buffer, &args.caps) == TransformStatus::Error {
      warn!("第 {} 帧未叠加", index + 1);
    }
    output.write_all(&buffer)?;
    index += 1;
  }
  output.flush()?;

  let stats = transform.stats();
  info!(
    "处理完成: 共 {} 帧, 成功 {} 帧, 丢弃 {} 帧, 绘制 {} 个检测框",
    index, stats.processed, stats.dropped, stats.drawn
  );

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Cursor;

  /// 每次最多返回两个字节，首次读取被信号打断
  struct Trickle {
    inner: Cursor<Vec<u8>>,
    interrupted: bool,
  }

  impl Read for Trickle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
      if !self.interrupted {
        self.interrupted = true;
        return Err(ErrorKind::Interrupted.into());
      }
      let len = buf.len().min(2);
      self.inner.read(&mut buf[..len])
    }
  }

  #[test]
  fn frames_are_filled_across_short_reads() {
    let mut input = Trickle {
      inner: Cursor::new((0..7).collect()),
      interrupted: false,
    };
    let mut frame = [0u8; 3];

    assert_eq!(read_frame(&mut input, &mut frame).unwrap(), 3);
    assert_eq!(frame, [0, 1, 2]);
    assert_eq!(read_frame(&mut input, &mut frame).unwrap(), 3);
    assert_eq!(frame, [3, 4, 5]);
    // 末尾不完整帧
    assert_eq!(read_frame(&mut input, &mut frame).unwrap(), 1);
    assert_eq!(frame[0], 6);
    assert_eq!(read_frame(&mut input, &mut frame).unwrap(), 0);
  }

  #[test]
  fn empty_input_reads_nothing() {
    let mut input = Cursor::new(Vec::new());
    let mut frame = [9u8; 4];
    assert_eq!(read_frame(&mut input, &mut frame).unwrap(), 0);
    assert_eq!(frame, [9; 4]);
  }
}
