// 该文件是 Drillbench （练球对比） 项目的一部分。
// src/model/process.rs - 子进程推理服务
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

//! 子进程推理服务
//!
//! 模型在一个常驻子进程中运行，进程启动一次，按请求逐条应答。
//!
//! 每次请求先写一行 JSON 头 `{"frames":[{"width":W,"height":H},..]}`，
//! 随后依次写入每帧 `W*H*3` 字节的 RGB 数据；应答为一行 JSON，
//! 内容是推理结果，或 `{"error":"..."}`。
//!
//! URL 形如 `exec:///opt/models/movenet-server?arg=--threads&arg=2`，
//! 每个 `arg` 按顺序作为命令行参数传给子进程。

use std::io::{BufRead, BufReader, BufWriter, Write};
use std::marker::PhantomData;
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::Mutex;

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::VideoFrame,
  model::{ActionComparison, ActionModel, Model},
  url_path,
};

#[derive(Error, Debug)]
pub enum ProcessModelError {
  #[error("模型路径必须使用 {0} 方案")]
  SchemeMismatch(&'static str),
  #[error("无法启动模型进程 {path}: {source}")]
  SpawnError {
    path: PathBuf,
    source: std::io::Error,
  },
  #[error("模型进程 I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("模型应答格式错误: {0}")]
  ReplyError(#[from] serde_json::Error),
  #[error("模型返回错误: {0}")]
  Remote(String),
  #[error("模型进程已退出")]
  Closed,
  #[error("模型进程锁已失效")]
  Poisoned,
}

#[derive(Serialize)]
struct FrameHeader {
  width: u32,
  height: u32,
}

#[derive(Serialize)]
struct RequestHeader {
  frames: Vec<FrameHeader>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Reply<T> {
  Failed { error: String },
  Done(T),
}

struct ProcessIo {
  child: Child,
  stdin: BufWriter<ChildStdin>,
  stdout: BufReader<ChildStdout>,
  line: String,
}

impl ProcessIo {
  fn request(&mut self, frames: &[&VideoFrame]) -> Result<&str, ProcessModelError> {
    let header = RequestHeader {
      frames: frames
        .iter()
        .map(|f| FrameHeader {
          width: f.width(),
          height: f.height(),
        })
        .collect(),
    };
    serde_json::to_writer(&mut self.stdin, &header)?;
    self.stdin.write_all(b"\n")?;
    for frame in frames {
      self.stdin.write_all(frame.image.as_raw())?;
    }
    self.stdin.flush()?;

    self.line.clear();
    if self.stdout.read_line(&mut self.line)? == 0 {
      return Err(ProcessModelError::Closed);
    }
    Ok(self.line.trim_end())
  }
}

impl Drop for ProcessIo {
  fn drop(&mut self) {
    if let Err(e) = self.child.kill() {
      debug!("结束模型进程: {}", e);
    }
    if let Err(e) = self.child.wait() {
      warn!("等待模型进程退出失败: {}", e);
    }
  }
}

pub struct ProcessModelBuilder {
  program: PathBuf,
  args: Vec<String>,
}

impl FromUrlWithScheme for ProcessModelBuilder {
  const SCHEME: &'static str = "exec";
}

impl FromUrl for ProcessModelBuilder {
  type Error = ProcessModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ProcessModelError::SchemeMismatch(Self::SCHEME));
    }

    let args = url
      .query_pairs()
      .filter(|(k, _)| k == "arg")
      .map(|(_, v)| v.into_owned())
      .collect();

    Ok(ProcessModelBuilder {
      program: url_path(url),
      args,
    })
  }
}

impl ProcessModelBuilder {
  pub fn new(program: impl Into<PathBuf>) -> Self {
    ProcessModelBuilder {
      program: program.into(),
      args: Vec::new(),
    }
  }

  pub fn arg(mut self, arg: impl Into<String>) -> Self {
    self.args.push(arg.into());
    self
  }

  pub fn build<T>(self) -> Result<ProcessModel<T>, ProcessModelError> {
    info!("启动模型进程: {} {:?}", self.program.display(), self.args);
    let mut child = Command::new(&self.program)
      .args(&self.args)
      .stdin(Stdio::piped())
      .stdout(Stdio::piped())
      .stderr(Stdio::inherit())
      .spawn()
      .map_err(|source| ProcessModelError::SpawnError {
        path: self.program.clone(),
        source,
      })?;

    let stdin = child.stdin.take().ok_or(ProcessModelError::Closed)?;
    let stdout = child.stdout.take().ok_or(ProcessModelError::Closed)?;

    Ok(ProcessModel {
      io: Mutex::new(ProcessIo {
        child,
        stdin: BufWriter::new(stdin),
        stdout: BufReader::new(stdout),
        line: String::new(),
      }),
      _phantom: PhantomData,
    })
  }
}

/// 由子进程提供的黑盒推理能力，`T` 为应答反序列化后的类型
pub struct ProcessModel<T> {
  io: Mutex<ProcessIo>,
  _phantom: PhantomData<fn() -> T>,
}

impl<T> FromUrl for ProcessModel<T> {
  type Error = ProcessModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    ProcessModelBuilder::from_url(url)?.build()
  }
}

impl<T: DeserializeOwned> ProcessModel<T> {
  pub fn request(&self, frames: &[&VideoFrame]) -> Result<T, ProcessModelError> {
    let mut io = self.io.lock().map_err(|_| ProcessModelError::Poisoned)?;
    let line = io.request(frames)?;
    match serde_json::from_str::<Reply<T>>(line)? {
      Reply::Done(value) => Ok(value),
      Reply::Failed { error } => Err(ProcessModelError::Remote(error)),
    }
  }
}

impl<T: DeserializeOwned> Model for ProcessModel<T> {
  type Input = VideoFrame;
  type Output = T;
  type Error = ProcessModelError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    self.request(&[input])
  }
}

impl ActionModel for ProcessModel<ActionComparison> {
  type Error = ProcessModelError;

  fn compare_actions(
    &self,
    coach: &VideoFrame,
    student: &VideoFrame,
  ) -> Result<ActionComparison, Self::Error> {
    self.request(&[coach, student])
  }
}

#[cfg(all(test, unix))]
mod tests {
  use super::*;
  use crate::model::Pose;
  use image::RgbImage;

  fn script_model<T>(script: &str) -> ProcessModel<T> {
    ProcessModelBuilder::new("/bin/sh")
      .arg("-c")
      .arg(script)
      .build()
      .unwrap()
  }

  fn frame() -> VideoFrame {
    VideoFrame::new(RgbImage::new(2, 1), 0, 25.0)
  }

  #[test]
  fn reply_is_decoded() {
    // 读掉请求头与 6 字节像素后应答
    let model: ProcessModel<Pose> = script_model(
      r#"while read header; do head -c 6 >/dev/null; echo '[{"x":0.5,"y":0.25,"score":0.9}]'; done"#,
    );
    let pose = model.infer(&frame()).unwrap();
    assert_eq!(pose.keypoints.len(), 1);
    assert_eq!(pose.keypoints[0].y, 0.25);

    let again = model.infer(&frame()).unwrap();
    assert_eq!(again.keypoints[0].score, 0.9);
  }

  #[test]
  fn remote_error_is_reported() {
    let model: ProcessModel<Pose> = script_model(
      r#"while read header; do head -c 6 >/dev/null; echo '{"error":"no person"}'; done"#,
    );
    assert!(matches!(
      model.infer(&frame()),
      Err(ProcessModelError::Remote(msg)) if msg == "no person"
    ));
  }

  #[test]
  fn exited_process_is_closed() {
    let model: ProcessModel<Pose> = script_model("exit 0");
    assert!(model.infer(&frame()).is_err());
  }

  #[test]
  fn url_arguments_are_ordered() {
    let url = Url::parse("exec:///opt/pose-server?arg=--threads&arg=2&other=x").unwrap();
    let builder = ProcessModelBuilder::from_url(&url).unwrap();
    assert_eq!(builder.program, PathBuf::from("/opt/pose-server"));
    assert_eq!(builder.args, vec!["--threads", "2"]);
  }
}
