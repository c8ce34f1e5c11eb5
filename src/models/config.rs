use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use anyhow::Error;
use serde::{Deserialize, Serialize};

// 负载模式
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadPattern {
    // 恒定负载
    Constant,
    // 渐进式
    RampUp,
    // 突发式
    Burst,
}

#[derive(Clone, Serialize, Deserialize, Debug)]
#[serde(default)]
pub struct TargetConfig {
    pub url: String,
    pub method: String,
    pub headers: HashMap<String, String>,
    pub body: String,
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for TargetConfig {
    fn default() -> Self {
        TargetConfig {
            url: String::new(),
            method: "GET".to_string(),
            headers: HashMap::new(),
            body: String::new(),
            timeout: Duration::from_secs(30),
        }
    }
}

// 渐进式负载配置
#[derive(Clone, Serialize, Deserialize, Debug)]
#[serde(default)]
pub struct RampUpConfig {
    pub enabled: bool,
    pub start_concurrency: usize,
    pub end_concurrency: usize,
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    pub steps: usize,
}

impl Default for RampUpConfig {
    fn default() -> Self {
        RampUpConfig {
            enabled: false,
            start_concurrency: 1,
            end_concurrency: 10,
            duration: Duration::from_secs(30),
            steps: 10,
        }
    }
}

// 突发负载配置
#[derive(Clone, Serialize, Deserialize, Debug)]
#[serde(default)]
pub struct BurstConfig {
    pub enabled: bool,
    pub base_concurrency: usize,
    pub burst_concurrency: usize,
    #[serde(with = "humantime_serde")]
    pub burst_duration: Duration,
    #[serde(with = "humantime_serde")]
    pub burst_interval: Duration,
}

impl Default for BurstConfig {
    fn default() -> Self {
        BurstConfig {
            enabled: false,
            base_concurrency: 5,
            burst_concurrency: 20,
            burst_duration: Duration::from_secs(2),
            burst_interval: Duration::from_secs(5),
        }
    }
}

#[derive(Clone, Serialize, Deserialize, Debug)]
#[serde(default)]
pub struct LoadConfig {
    pub concurrency: usize,
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    // 总请求数, 0表示基于时间
    pub total_requests: u64,
    // 每秒请求数限制, 0表示无限制
    pub rate_limit: u32,
    pub load_pattern: LoadPattern,
    pub ramp_up: RampUpConfig,
    pub burst_mode: BurstConfig,
}

impl Default for LoadConfig {
    fn default() -> Self {
        LoadConfig {
            concurrency: 10,
            duration: Duration::from_secs(10),
            total_requests: 0,
            rate_limit: 0,
            load_pattern: LoadPattern::Constant,
            ramp_up: RampUpConfig::default(),
            burst_mode: BurstConfig::default(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize, Debug)]
#[serde(default)]
pub struct ProtocolConfig {
    pub http2_enabled: bool,
    pub http3_enabled: bool,
    pub keep_alive: bool,
    #[serde(with = "humantime_serde")]
    pub idle_timeout: Duration,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        ProtocolConfig {
            http2_enabled: false,
            http3_enabled: false,
            keep_alive: true,
            idle_timeout: Duration::from_secs(90),
        }
    }
}

#[derive(Clone, Serialize, Deserialize, Debug, Default)]
#[serde(default)]
pub struct CookieConfig {
    pub name: String,
    pub value: String,
}

#[derive(Clone, Serialize, Deserialize, Debug, Default)]
#[serde(default)]
pub struct TemplateConfig {
    pub enabled: bool,
    pub variables: HashMap<String, String>,
}

#[derive(Clone, Serialize, Deserialize, Debug, Default)]
#[serde(default)]
pub struct RequestConfig {
    pub headers: HashMap<String, String>,
    pub cookies: Vec<CookieConfig>,
    pub template: TemplateConfig,
    // 动态请求体, 开启后body_template每次请求渲染一次
    pub dynamic_body: bool,
    pub body_template: String,
}

#[derive(Clone, Serialize, Deserialize, Debug, Default)]
#[serde(default)]
pub struct BodyValidation {
    pub min_size: usize,
    pub max_size: usize,
    pub contains: Vec<String>,
    pub not_contains: Vec<String>,
}

#[derive(Clone, Serialize, Deserialize, Debug)]
#[serde(default)]
pub struct ValidationConfig {
    pub status_codes: Vec<u16>,
    pub content_patterns: Vec<String>,
    #[serde(with = "humantime_serde")]
    pub response_time_max: Duration,
    pub header_validation: HashMap<String, String>,
    pub body_validation: BodyValidation,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        ValidationConfig {
            status_codes: vec![200],
            content_patterns: Vec::new(),
            response_time_max: Duration::from_secs(5),
            header_validation: HashMap::new(),
            body_validation: BodyValidation::default(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize, Debug)]
#[serde(default)]
pub struct TlsConfig {
    pub enabled: bool,
    pub insecure_skip_verify: bool,
    pub min_version: String,
    pub max_version: String,
    pub ca_file: String,
    // 客户端证书(双向认证)
    pub client_cert_file: String,
    pub client_key_file: String,
    pub mutual_tls: bool,
}

impl Default for TlsConfig {
    fn default() -> Self {
        TlsConfig {
            enabled: true,
            insecure_skip_verify: false,
            min_version: "TLS1.2".to_string(),
            max_version: "TLS1.3".to_string(),
            ca_file: String::new(),
            client_cert_file: String::new(),
            client_key_file: String::new(),
            mutual_tls: false,
        }
    }
}

#[derive(Clone, Serialize, Deserialize, Debug)]
#[serde(default)]
pub struct OutputConfig {
    // 输出格式: console, json, csv, html
    pub format: String,
    pub report_file: String,
    pub realtime_monitor: bool,
    #[serde(with = "humantime_serde")]
    pub monitor_interval: Duration,
    pub verbose: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            format: "console".to_string(),
            report_file: String::new(),
            realtime_monitor: false,
            monitor_interval: Duration::from_secs(1),
            verbose: false,
        }
    }
}

// 主配置结构
#[derive(Clone, Serialize, Deserialize, Debug, Default)]
#[serde(default)]
pub struct Config {
    pub target: TargetConfig,
    pub load: LoadConfig,
    pub protocol: ProtocolConfig,
    pub request: RequestConfig,
    pub validation: ValidationConfig,
    pub tls: TlsConfig,
    pub output: OutputConfig,
}

impl Config {
    // 从yaml文件加载配置, 缺省字段使用默认值
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
        let data = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::msg(format!("读取配置文件失败: {:?}", e)))?;
        let cfg: Config = serde_yaml::from_str(&data)
            .map_err(|e| Error::msg(format!("解析配置文件失败: {:?}", e)))?;
        Ok(cfg)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let data = serde_yaml::to_string(self)
            .map_err(|e| Error::msg(format!("序列化配置失败: {:?}", e)))?;
        std::fs::write(path.as_ref(), data)
            .map_err(|e| Error::msg(format!("写入配置文件失败: {:?}", e)))?;
        Ok(())
    }

    // 校验配置, 失败直接终止运行
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.target.url.is_empty() {
            return Err(Error::msg("目标URL不能为空"));
        }
        if let Err(e) = url::Url::parse(&self.target.url) {
            return Err(Error::msg(format!("目标URL无效: {:?}", e)));
        }
        if self.load.concurrency == 0 {
            return Err(Error::msg("并发数必须大于0"));
        }
        if self.load.duration.is_zero() && self.load.total_requests == 0 {
            return Err(Error::msg("必须指定持续时间或总请求数"));
        }
        if self.protocol.http2_enabled && self.protocol.http3_enabled {
            return Err(Error::msg("不能同时启用HTTP/2和HTTP/3"));
        }
        if self.load.load_pattern == LoadPattern::RampUp && self.load.ramp_up.enabled {
            let ramp = &self.load.ramp_up;
            if ramp.end_concurrency == 0 || ramp.end_concurrency < ramp.start_concurrency {
                return Err(Error::msg("渐进式负载的结束并发必须不小于起始并发且大于0"));
            }
            if ramp.steps == 0 {
                return Err(Error::msg("渐进式负载的步数必须大于0"));
            }
        }
        if self.load.load_pattern == LoadPattern::Burst && self.load.burst_mode.enabled {
            let burst = &self.load.burst_mode;
            if burst.base_concurrency == 0 || burst.burst_concurrency <= burst.base_concurrency {
                return Err(Error::msg("突发并发必须大于基准并发且基准并发大于0"));
            }
            // 突发窗口不允许重叠
            if burst.burst_duration >= burst.burst_interval {
                return Err(Error::msg("突发持续时间必须小于突发间隔"));
            }
        }
        Ok(())
    }

    // 本次压测可能同时活跃的最大worker数量
    pub fn max_workers(&self) -> usize {
        match self.load.load_pattern {
            LoadPattern::Constant => self.load.concurrency,
            LoadPattern::RampUp => {
                if self.load.ramp_up.enabled {
                    self.load.ramp_up.end_concurrency
                } else {
                    self.load.concurrency
                }
            }
            LoadPattern::Burst => {
                if self.load.burst_mode.enabled {
                    self.load.burst_mode.burst_concurrency
                } else {
                    self.load.concurrency
                }
            }
        }
    }
}
