use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Error;
use chrono::Utc;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, COOKIE};
use reqwest::{Client, Method, Request};
use serde_json::{json, Map};

use crate::core::collector::{
    Collector, ERROR_BODY_READ, ERROR_NETWORK, ERROR_REQUEST_CREATION, ERROR_VALIDATION,
};
use crate::core::template::TemplateEngine;
use crate::core::validator::Validator;
use crate::models::config::Config;

// 单请求执行管线: 渲染 -> 构建 -> 发送 -> 读取 -> 验证 -> 统计
// 错误在内部消化并按类型计入统计, worker不会因为单个请求失败而退出
pub(crate) struct RequestExecutor {
    client: Client,
    config: Arc<Config>,
    collector: Arc<Collector>,
    validator: Arc<Validator>,
    template: Arc<TemplateEngine>,
}

impl RequestExecutor {
    pub(crate) fn new(
        client: Client,
        config: Arc<Config>,
        collector: Arc<Collector>,
        validator: Arc<Validator>,
        template: Arc<TemplateEngine>,
    ) -> Self {
        RequestExecutor {
            client,
            config,
            collector,
            validator,
            template,
        }
    }

    pub(crate) async fn execute(&self, worker_id: usize) {
        let start = Instant::now();

        // 构建请求
        let (request, bytes_sent) = match self.build_request(worker_id) {
            Ok(built) => built,
            Err(e) => {
                eprintln!("构建请求失败: {:?}", e);
                self.collector.record_error(ERROR_REQUEST_CREATION);
                self.collector.record_request(start.elapsed(), 0, 0, false);
                return;
            }
        };

        // 发送请求
        let response = match self.client.execute(request).await {
            Ok(response) => response,
            Err(e) => {
                // 连接、TLS、超时、重置都归入网络错误
                let latency = start.elapsed();
                eprintln!("请求失败: {:?}", e);
                self.collector.record_error(ERROR_NETWORK);
                self.collector.record_request(latency, 0, bytes_sent, false);
                return;
            }
        };

        // 响应头到达即为延迟终点
        let latency = start.elapsed();
        let status = response.status();
        let headers = response.headers().clone();
        self.collector.record_status(status.as_u16());

        // 读完整个响应体
        let mut stream = response.bytes_stream();
        let mut body_bytes = Vec::new();
        while let Some(item) = stream.next().await {
            match item {
                Ok(chunk) => body_bytes.extend_from_slice(&chunk),
                Err(e) => {
                    if self.config.output.verbose {
                        eprintln!("读取响应流失败: {:?}", e);
                    }
                    self.collector.record_error(ERROR_BODY_READ);
                    self.collector.record_request(
                        latency,
                        body_bytes.len() as u64,
                        bytes_sent,
                        false,
                    );
                    return;
                }
            };
        }

        // 验证响应
        let verdict = match self.config.validation.response_time_max.is_zero() {
            true => self.validator.validate(status, &headers, &body_bytes),
            false => self
                .validator
                .validate_with_latency(status, &headers, &body_bytes, latency),
        };
        match verdict {
            Ok(()) => {
                self.collector
                    .record_request(latency, body_bytes.len() as u64, bytes_sent, true);
            }
            Err(e) => {
                if self.config.output.verbose {
                    eprintln!("验证失败: {}", e);
                }
                self.collector.record_error(ERROR_VALIDATION);
                self.collector
                    .record_request(latency, body_bytes.len() as u64, bytes_sent, false);
            }
        };
    }

    // 构建一次请求, 返回请求对象和发送的请求体字节数
    fn build_request(&self, worker_id: usize) -> anyhow::Result<(Request, u64)> {
        let mut url = self.config.target.url.clone();
        let mut body = self.config.target.body.clone();

        // 模板渲染, 每次请求注入worker_id和timestamp
        if self.config.request.template.enabled {
            let mut vars = Map::new();
            vars.insert("worker_id".to_string(), json!(worker_id));
            vars.insert("timestamp".to_string(), json!(Utc::now().timestamp()));
            url = self.template.render(&url, &vars)?;
            if self.config.request.dynamic_body {
                body = self.template.render(&self.config.request.body_template, &vars)?;
            }
        }

        // 构建请求方式
        let method = Method::from_str(&self.config.target.method.to_uppercase())
            .map_err(|_| Error::msg("构建请求方法失败"))?;
        let mut builder = self.client.request(method, url);

        // 构建请求头, 目标级在前、请求级在后, 后写入的覆盖前面的
        let mut headers = HeaderMap::new();
        for (key, value) in self
            .config
            .target
            .headers
            .iter()
            .chain(self.config.request.headers.iter())
        {
            let header_name = key
                .parse::<HeaderName>()
                .map_err(|e| Error::msg(format!("无效的header名称 {:?}: {:?}", key, e)))?;
            let header_value = value
                .parse::<HeaderValue>()
                .map_err(|e| Error::msg(format!("无效的header值 {:?}: {:?}", value, e)))?;
            headers.insert(header_name, header_value);
        }

        // 构建cookies
        if !self.config.request.cookies.is_empty() {
            let cookie_value = self
                .config
                .request
                .cookies
                .iter()
                .map(|cookie| format!("{}={}", cookie.name, cookie.value))
                .collect::<Vec<String>>()
                .join("; ");
            match HeaderValue::from_str(&cookie_value) {
                Ok(value) => {
                    headers.insert(COOKIE, value);
                }
                Err(e) => return Err(Error::msg(format!("设置cookie失败:{:?}", e))),
            }
        }
        builder = builder.headers(headers);

        let bytes_sent = body.len() as u64;
        if !body.is_empty() {
            builder = builder.body(body);
        }
        let request = builder
            .build()
            .map_err(|e| Error::msg(format!("构建请求失败: {:?}", e)))?;
        Ok((request, bytes_sent))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::config::CookieConfig;

    fn executor(config: Config) -> RequestExecutor {
        let config = Arc::new(config);
        let client = crate::core::client::build_http_client(&config).unwrap();
        let validator = Arc::new(Validator::new(&config.validation));
        let template = Arc::new(TemplateEngine::new(&config.request.template));
        RequestExecutor::new(client, config, Arc::new(Collector::new()), validator, template)
    }

    #[test]
    fn test_build_request_merges_headers() {
        let mut config = Config::default();
        config.target.url = "http://127.0.0.1:8080/ping".to_string();
        config
            .target
            .headers
            .insert("X-Token".to_string(), "target".to_string());
        config
            .target
            .headers
            .insert("X-Base".to_string(), "base".to_string());
        // 请求级覆盖目标级
        config
            .request
            .headers
            .insert("X-Token".to_string(), "request".to_string());
        config.request.cookies.push(CookieConfig {
            name: "session".to_string(),
            value: "abc".to_string(),
        });

        let executor = executor(config);
        let (request, bytes_sent) = executor.build_request(0).unwrap();
        assert_eq!(bytes_sent, 0);
        assert_eq!(request.headers().get("X-Token").unwrap(), "request");
        assert_eq!(request.headers().get("X-Base").unwrap(), "base");
        assert_eq!(request.headers().get(COOKIE).unwrap(), "session=abc");
    }

    #[test]
    fn test_build_request_renders_template() {
        let mut config = Config::default();
        config.target.url = "http://127.0.0.1:8080/users/{{worker_id}}".to_string();
        config.target.method = "post".to_string();
        config.request.template.enabled = true;
        config.request.dynamic_body = true;
        config.request.body_template = r#"{"id": {{worker_id}}}"#.to_string();

        let executor = executor(config);
        let (request, bytes_sent) = executor.build_request(3).unwrap();
        assert_eq!(request.method(), &Method::POST);
        assert_eq!(request.url().path(), "/users/3");
        assert_eq!(bytes_sent, r#"{"id": 3}"#.len() as u64);
    }

    #[test]
    fn test_build_request_rejects_bad_method() {
        let mut config = Config::default();
        config.target.url = "http://127.0.0.1:8080".to_string();
        config.target.method = "NOT A METHOD".to_string();
        let executor = executor(config);
        assert!(executor.build_request(0).is_err());
    }
}
