use anyhow::Error;
use reqwest::header::{HeaderMap, USER_AGENT};
use reqwest::tls::Version;
use reqwest::{Certificate, Client, Identity};

use crate::models::config::Config;

fn parse_tls_version(version: &str) -> Option<Version> {
    match version {
        "TLS1.0" => Some(Version::TLS_1_0),
        "TLS1.1" => Some(Version::TLS_1_1),
        "TLS1.2" => Some(Version::TLS_1_2),
        "TLS1.3" => Some(Version::TLS_1_3),
        _ => None,
    }
}

// 创建http客户端, 所有worker共享同一个连接池
pub(crate) fn build_http_client(config: &Config) -> anyhow::Result<Client> {
    // user_agent
    let info = os_info::get();
    let app_name = env!("CARGO_PKG_NAME");
    let app_version = env!("CARGO_PKG_VERSION");
    let user_agent_value = format!(
        "{} {} ({}; {})",
        app_name,
        app_version,
        info.os_type(),
        info.version()
    );

    let mut builder = Client::builder().default_headers({
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            user_agent_value
                .parse()
                .map_err(|e| Error::msg(format!("构建user_agent失败: {:?}", e)))?,
        );
        headers
    });

    if !config.target.timeout.is_zero() {
        builder = builder.timeout(config.target.timeout);
    }

    // 连接池按最大并发定容, 关闭keep_alive时不复用连接
    match config.protocol.keep_alive {
        true => {
            builder = builder
                .pool_max_idle_per_host(config.max_workers())
                .pool_idle_timeout(config.protocol.idle_timeout);
        }
        false => {
            builder = builder.pool_max_idle_per_host(0);
        }
    }

    if config.tls.enabled {
        builder = builder.danger_accept_invalid_certs(config.tls.insecure_skip_verify);
        builder = builder
            .min_tls_version(parse_tls_version(&config.tls.min_version).unwrap_or(Version::TLS_1_2));
        if let Some(max_version) = parse_tls_version(&config.tls.max_version) {
            builder = builder.max_tls_version(max_version);
        }
        if !config.tls.ca_file.is_empty() {
            let pem = std::fs::read(&config.tls.ca_file)
                .map_err(|e| Error::msg(format!("读取CA证书失败: {:?}", e)))?;
            let certificate = Certificate::from_pem(&pem)
                .map_err(|e| Error::msg(format!("解析CA证书失败: {:?}", e)))?;
            builder = builder.add_root_certificate(certificate);
        }
        // 客户端证书(双向认证)
        if config.tls.mutual_tls
            && !config.tls.client_cert_file.is_empty()
            && !config.tls.client_key_file.is_empty()
        {
            let cert = std::fs::read(&config.tls.client_cert_file)
                .map_err(|e| Error::msg(format!("读取客户端证书失败: {:?}", e)))?;
            let key = std::fs::read(&config.tls.client_key_file)
                .map_err(|e| Error::msg(format!("读取客户端私钥失败: {:?}", e)))?;
            let identity = Identity::from_pkcs8_pem(&cert, &key)
                .map_err(|e| Error::msg(format!("加载客户端证书失败: {:?}", e)))?;
            builder = builder.identity(identity);
        }
    }

    if config.protocol.http3_enabled {
        #[cfg(feature = "http3")]
        {
            builder = builder.http3_prior_knowledge();
        }
        #[cfg(not(feature = "http3"))]
        {
            return Err(Error::msg("当前构建未启用http3特性, 无法使用HTTP/3 (QUIC)"));
        }
    } else if config.protocol.http2_enabled {
        builder = builder.http2_prior_knowledge();
    }

    builder
        .build()
        .map_err(|e| Error::msg(format!("构建http客户端失败: {:?}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_default_client() {
        let mut config = Config::default();
        config.target.url = "http://127.0.0.1:8080".to_string();
        assert!(build_http_client(&config).is_ok());
    }

    #[test]
    fn test_build_http2_client() {
        let mut config = Config::default();
        config.target.url = "https://127.0.0.1:8443".to_string();
        config.protocol.http2_enabled = true;
        config.tls.insecure_skip_verify = true;
        assert!(build_http_client(&config).is_ok());
    }

    #[cfg(not(feature = "http3"))]
    #[test]
    fn test_http3_requires_feature() {
        let mut config = Config::default();
        config.target.url = "https://127.0.0.1:8443".to_string();
        config.protocol.http3_enabled = true;
        assert!(build_http_client(&config).is_err());
    }

    #[test]
    fn test_parse_tls_version() {
        assert!(parse_tls_version("TLS1.2").is_some());
        assert!(parse_tls_version("TLS1.3").is_some());
        assert!(parse_tls_version("SSL3.0").is_none());
    }
}
