use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use regex::Regex;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;

use crate::models::config::ValidationConfig;

// 验证错误, kind对应第一条未通过的规则
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub kind: String,
    pub message: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

impl std::error::Error for ValidationError {}

fn validation_error(kind: &str, message: String) -> ValidationError {
    ValidationError {
        kind: kind.to_string(),
        message,
    }
}

// 响应验证器, 按固定顺序检查, 第一条失败即返回
pub struct Validator {
    config: ValidationConfig,
    status_codes: HashSet<u16>,
    content_patterns: Vec<Regex>,
}

impl Validator {
    pub fn new(config: &ValidationConfig) -> Self {
        // 正则只在构建时编译一次, 编译失败的模式丢弃并告警
        let mut content_patterns = Vec::with_capacity(config.content_patterns.len());
        for pattern in &config.content_patterns {
            match Regex::new(pattern) {
                Ok(re) => content_patterns.push(re),
                Err(e) => eprintln!("忽略无法编译的校验正则 {:?}: {:?}", pattern, e),
            }
        }
        let status_codes: HashSet<u16> = config.status_codes.iter().copied().collect();
        Validator {
            config: config.clone(),
            status_codes,
            content_patterns,
        }
    }

    // 验证状态码、响应头和响应体
    pub fn validate(
        &self,
        status: StatusCode,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Result<(), ValidationError> {
        self.validate_status_code(status)?;
        self.validate_headers(headers)?;
        self.validate_body(body)?;
        Ok(())
    }

    // 额外验证响应时间的变体
    pub fn validate_with_latency(
        &self,
        status: StatusCode,
        headers: &HeaderMap,
        body: &[u8],
        latency: Duration,
    ) -> Result<(), ValidationError> {
        self.validate(status, headers, body)?;
        if !self.config.response_time_max.is_zero() && latency > self.config.response_time_max {
            return Err(validation_error(
                "response_time",
                format!(
                    "响应时间 {:?} 超过阈值 {:?}",
                    latency, self.config.response_time_max
                ),
            ));
        }
        Ok(())
    }

    fn validate_status_code(&self, status: StatusCode) -> Result<(), ValidationError> {
        // 未配置状态码验证
        if self.status_codes.is_empty() {
            return Ok(());
        }
        if !self.status_codes.contains(&status.as_u16()) {
            return Err(validation_error(
                "status_code",
                format!(
                    "状态码 {} 不在允许列表中: {:?}",
                    status.as_u16(),
                    self.config.status_codes
                ),
            ));
        }
        Ok(())
    }

    fn validate_headers(&self, headers: &HeaderMap) -> Result<(), ValidationError> {
        for (name, expected) in &self.config.header_validation {
            // HeaderMap的查找本身就是大小写无关的
            let actual = headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default();
            if actual != expected {
                return Err(validation_error(
                    "header",
                    format!("响应头 {} 不匹配: 期望 {:?}, 实际 {:?}", name, expected, actual),
                ));
            }
        }
        Ok(())
    }

    fn validate_body(&self, body: &[u8]) -> Result<(), ValidationError> {
        let body_len = body.len();
        let rules = &self.config.body_validation;

        if rules.min_size > 0 && body_len < rules.min_size {
            return Err(validation_error(
                "body_size",
                format!("响应体大小 {} 小于最小值 {}", body_len, rules.min_size),
            ));
        }
        if rules.max_size > 0 && body_len > rules.max_size {
            return Err(validation_error(
                "body_size",
                format!("响应体大小 {} 大于最大值 {}", body_len, rules.max_size),
            ));
        }

        let text = String::from_utf8_lossy(body);
        for content in &rules.contains {
            if !text.contains(content.as_str()) {
                return Err(validation_error(
                    "body_content",
                    format!("响应体不包含必需内容: {}", content),
                ));
            }
        }
        for content in &rules.not_contains {
            if text.contains(content.as_str()) {
                return Err(validation_error(
                    "body_content",
                    format!("响应体包含禁止内容: {}", content),
                ));
            }
        }
        for pattern in &self.content_patterns {
            if !pattern.is_match(&text) {
                return Err(validation_error(
                    "content_pattern",
                    format!("响应体不匹配模式: {}", pattern.as_str()),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderValue, CONTENT_TYPE};

    fn config() -> ValidationConfig {
        ValidationConfig {
            status_codes: vec![200, 201],
            ..ValidationConfig::default()
        }
    }

    #[test]
    fn test_status_code_check() {
        let validator = Validator::new(&config());
        let headers = HeaderMap::new();
        assert!(validator.validate(StatusCode::OK, &headers, b"ok").is_ok());
        let err = validator
            .validate(StatusCode::INTERNAL_SERVER_ERROR, &headers, b"boom")
            .unwrap_err();
        assert_eq!(err.kind, "status_code");
    }

    #[test]
    fn test_header_check_case_insensitive() {
        let mut cfg = config();
        cfg.header_validation
            .insert("Content-Type".to_string(), "application/json".to_string());
        let validator = Validator::new(&cfg);
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        assert!(validator.validate(StatusCode::OK, &headers, b"{}").is_ok());

        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        let err = validator.validate(StatusCode::OK, &headers, b"{}").unwrap_err();
        assert_eq!(err.kind, "header");
    }

    #[test]
    fn test_body_rules_in_order() {
        let mut cfg = config();
        cfg.body_validation.min_size = 4;
        cfg.body_validation.contains = vec!["ok".to_string()];
        cfg.body_validation.not_contains = vec!["error".to_string()];
        cfg.content_patterns = vec![r#""code":\s*\d+"#.to_string()];
        let validator = Validator::new(&cfg);
        let headers = HeaderMap::new();

        // 大小不足先于内容检查失败
        let err = validator.validate(StatusCode::OK, &headers, b"ok").unwrap_err();
        assert_eq!(err.kind, "body_size");

        let err = validator
            .validate(StatusCode::OK, &headers, b"nothing here")
            .unwrap_err();
        assert_eq!(err.kind, "body_content");

        let err = validator
            .validate(StatusCode::OK, &headers, br#"ok but error"#)
            .unwrap_err();
        assert_eq!(err.kind, "body_content");

        let err = validator
            .validate(StatusCode::OK, &headers, br#"ok, no code field"#)
            .unwrap_err();
        assert_eq!(err.kind, "content_pattern");

        assert!(validator
            .validate(StatusCode::OK, &headers, br#"ok "code": 200"#)
            .is_ok());
    }

    #[test]
    fn test_latency_check() {
        let mut cfg = config();
        cfg.response_time_max = Duration::from_millis(100);
        let validator = Validator::new(&cfg);
        let headers = HeaderMap::new();
        assert!(validator
            .validate_with_latency(StatusCode::OK, &headers, b"ok", Duration::from_millis(50))
            .is_ok());
        let err = validator
            .validate_with_latency(StatusCode::OK, &headers, b"ok", Duration::from_millis(200))
            .unwrap_err();
        assert_eq!(err.kind, "response_time");
    }

    #[test]
    fn test_invalid_regex_discarded() {
        let mut cfg = config();
        cfg.content_patterns = vec!["(unclosed".to_string(), "ok".to_string()];
        let validator = Validator::new(&cfg);
        // 无法编译的模式被丢弃, 剩余模式仍然生效
        assert_eq!(validator.content_patterns.len(), 1);
        let headers = HeaderMap::new();
        assert!(validator.validate(StatusCode::OK, &headers, b"ok").is_ok());
    }
}
