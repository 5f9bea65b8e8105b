// 该文件是 Kanjian （看见） 项目的一部分。
// src/fetch.rs - 远程图像下载
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

use std::io::Read;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;
use url::Url;

pub const FETCH_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const FETCH_TOTAL_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Error, Debug)]
pub enum FetchError {
  #[error("URL 无效 {0:?}: {1}")]
  InvalidUrl(String, url::ParseError),
  #[error("不支持的 URL 方案: {0}")]
  UnsupportedScheme(String),
  #[error("HTTP 状态码 {0}")]
  Status(u16),
  #[error("网络错误: {0}")]
  Transport(String),
  #[error("读取响应失败: {0}")]
  Body(#[from] std::io::Error),
}

/// 检查 URL 为绝对的 http(s) 地址
pub fn parse_http_url(raw: &str) -> Result<Url, FetchError> {
  let url = Url::parse(raw).map_err(|e| FetchError::InvalidUrl(raw.to_string(), e))?;
  match url.scheme() {
    "http" | "https" => Ok(url),
    other => Err(FetchError::UnsupportedScheme(other.to_string())),
  }
}

/// 带超时的阻塞式下载器，不做重试，也不跟随重定向
#[derive(Debug, Clone)]
pub struct Fetcher {
  agent: ureq::Agent,
}

impl Default for Fetcher {
  fn default() -> Self {
    Self::with_timeouts(FETCH_CONNECT_TIMEOUT, FETCH_TOTAL_TIMEOUT)
  }
}

impl Fetcher {
  pub fn with_timeouts(connect: Duration, total: Duration) -> Self {
    let agent = ureq::AgentBuilder::new()
      .timeout_connect(connect)
      .timeout(total)
      .redirects(0)
      .build();
    Self { agent }
  }

  pub fn fetch(&self, raw_url: &str) -> Result<Vec<u8>, FetchError> {
    let url = parse_http_url(raw_url)?;
    debug!("下载图像: {}", url);
    let response = match self.agent.get(url.as_str()).call() {
      Ok(response) => response,
      Err(ureq::Error::Status(code, _)) => return Err(FetchError::Status(code)),
      Err(ureq::Error::Transport(e)) => return Err(FetchError::Transport(e.to_string())),
    };
    let status = response.status();
    if !(200..300).contains(&status) {
      return Err(FetchError::Status(status));
    }

    let mut body = Vec::new();
    response.into_reader().read_to_end(&mut body)?;
    debug!("下载完成: {} 字节", body.len());
    Ok(body)
  }
}
