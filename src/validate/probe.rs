// 该文件是 Kanjian （看见） 项目的一部分。
// src/validate/probe.rs - 通过 HTTP 调用检测服务
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
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::{FromUrl, response::Detection};

pub const PROBE_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const PROBE_TOTAL_TIMEOUT: Duration = Duration::from_secs(60);

const PREDICT_PATH: &str = "/predict";
const FORM_FIELD: &str = "image";
const FORM_BOUNDARY: &str = "kanjian-form-boundary-3f9a7c1e";

#[derive(Error, Debug)]
pub enum ProbeError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("读取图像失败: {0}")]
  Io(#[from] std::io::Error),
  #[error("HTTP 状态码 {0}")]
  Status(u16),
  #[error("网络错误: {0}")]
  Transport(String),
  #[error("响应解析失败: {0}")]
  Decode(#[from] serde_json::Error),
}

/// 对单张图像调用检测服务，返回检测列表
pub trait Probe {
  fn predict(&self, image: &Path) -> Result<Vec<Detection>, ProbeError>;
}

#[derive(Deserialize)]
struct ServiceReply {
  #[serde(default)]
  detections: Vec<Detection>,
}

/// 以 multipart 表单上传图像到 `<api>/predict`
pub struct HttpProbe {
  endpoint: String,
  agent: ureq::Agent,
}

impl FromUrl for HttpProbe {
  type Error = ProbeError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if !matches!(url.scheme(), "http" | "https") {
      return Err(ProbeError::SchemeMismatch(url.scheme().to_string()));
    }
    let endpoint = format!("{}{}", url.as_str().trim_end_matches('/'), PREDICT_PATH);
    let agent = ureq::AgentBuilder::new()
      .timeout_connect(PROBE_CONNECT_TIMEOUT)
      .timeout(PROBE_TOTAL_TIMEOUT)
      .redirects(0)
      .build();
    Ok(Self { endpoint, agent })
  }
}

impl HttpProbe {
  pub fn endpoint(&self) -> &str {
    &self.endpoint
  }
}

impl Probe for HttpProbe {
  fn predict(&self, image: &Path) -> Result<Vec<Detection>, ProbeError> {
    let content = std::fs::read(image)?;
    let filename = image
      .file_name()
      .map(|name| name.to_string_lossy().into_owned())
      .unwrap_or_default();
    let body = multipart_body(&filename, &content);

    let response = self
      .agent
      .post(&self.endpoint)
      .set(
        "Content-Type",
        &format!("multipart/form-data; boundary={}", FORM_BOUNDARY),
      )
      .send_bytes(&body);
    let response = match response {
      Ok(response) => response,
      Err(ureq::Error::Status(code, _)) => return Err(ProbeError::Status(code)),
      Err(ureq::Error::Transport(e)) => return Err(ProbeError::Transport(e.to_string())),
    };
    let status = response.status();
    if !(200..300).contains(&status) {
      return Err(ProbeError::Status(status));
    }

    let reply: ServiceReply = serde_json::from_reader(response.into_reader())?;
    Ok(reply.detections)
  }
}

fn multipart_body(filename: &str, content: &[u8]) -> Vec<u8> {
  let filename = filename.replace('"', "%22");
  let mut body = Vec::with_capacity(content.len() + 256);
  body.extend_from_slice(format!("--{}\r\n", FORM_BOUNDARY).as_bytes());
  body.extend_from_slice(
    format!(
      "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
      FORM_FIELD, filename
    )
    .as_bytes(),
  );
  body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
  body.extend_from_slice(content);
  body.extend_from_slice(format!("\r\n--{}--\r\n", FORM_BOUNDARY).as_bytes());
  body
}
