use chrono_tz::Tz;
use shared::models::Platform;

/// 未匹配商品策略 (外卖平台订单宽松校验)
///
/// - `Silent`: 只记录在订单 warnings
/// - `Warn`: 额外打 warn 日志
/// - `Alert`: 额外打 `operator_alert` 日志，通知运营处理漏单/错价
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnmatchedItemPolicy {
    Silent,
    #[default]
    Warn,
    Alert,
}

impl std::str::FromStr for UnmatchedItemPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "silent" => Ok(Self::Silent),
            "warn" => Ok(Self::Warn),
            "alert" => Ok(Self::Alert),
            other => Err(format!("Unknown unmatched item policy: {other}")),
        }
    }
}

/// 单个外卖平台的接入配置
#[derive(Debug, Clone)]
pub struct PlatformConfig {
    /// API base URL
    pub api_base_url: String,
    /// OAuth token endpoint
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
    /// Webhook 签名密钥 (为空则不校验)
    pub webhook_secret: Option<String>,
}

impl PlatformConfig {
    fn from_env(prefix: &str, default_base: &str, default_token: &str) -> Self {
        let var = |name: &str| std::env::var(format!("{prefix}_{name}")).ok();
        Self {
            api_base_url: var("API_BASE_URL").unwrap_or_else(|| default_base.into()),
            token_url: var("TOKEN_URL").unwrap_or_else(|| default_token.into()),
            client_id: var("CLIENT_ID").unwrap_or_default(),
            client_secret: var("CLIENT_SECRET").unwrap_or_default(),
            webhook_secret: var("WEBHOOK_SECRET").filter(|s| !s.is_empty()),
        }
    }
}

/// 服务器配置
///
/// # 环境变量
///
/// | 环境变量 | 默认值 | 说明 |
/// |----------|--------|------|
/// | DATABASE_PATH | ./data/orders.db | SQLite 数据库文件 |
/// | HTTP_PORT | 3000 | HTTP 服务端口 |
/// | ENVIRONMENT | development | 运行环境 |
/// | LOG_LEVEL | info | 日志级别 |
/// | LOG_DIR | (无) | 日志目录，设置后按天滚动写文件 |
/// | BUSINESS_TIMEZONE | Asia/Taipei | 营业日时区 (流水号、每日限量) |
/// | REQUEST_TIMEOUT_MS | 30000 | 请求超时(毫秒)，同时用于外部 API 调用 |
/// | TOKEN_REFRESH_MARGIN_SECS | 300 | token 到期前多久提前刷新 |
/// | PLATFORM_ACCEPT_DEADLINE_SECS | 690 | 平台接单期限 (从收单起算) |
/// | PLATFORM_ACCEPT_MAX_ATTEMPTS | 5 | 接单最大尝试次数 |
/// | UNMATCHED_ITEM_POLICY | warn | silent / warn / alert |
/// | CREDIT_EXPIRY_SWEEP_SECS | 3600 | 过期凭证清扫间隔，0 关闭 |
/// | UBER_EATS_* / FOODPANDA_* | | API_BASE_URL, TOKEN_URL, CLIENT_ID, CLIENT_SECRET, WEBHOOK_SECRET |
///
/// # 示例
///
/// ```ignore
/// DATABASE_PATH=/data/orders.db HTTP_PORT=8080 cargo run
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite 数据库路径
    pub database_path: String,
    /// HTTP API 服务端口
    pub http_port: u16,
    /// 运行环境: development | staging | production
    pub environment: String,
    pub log_level: String,
    pub log_dir: Option<String>,
    /// 营业日时区
    pub business_timezone: Tz,
    /// 请求超时时间 (毫秒)
    pub request_timeout_ms: u64,
    /// token 提前刷新余量 (秒)
    pub token_refresh_margin_secs: i64,
    /// 平台接单期限 (秒)
    pub platform_accept_deadline_secs: u64,
    /// 接单最大尝试次数
    pub platform_accept_max_attempts: u32,
    pub unmatched_item_policy: UnmatchedItemPolicy,
    /// 过期凭证清扫间隔 (秒)，0 = 不清扫
    pub credit_expiry_sweep_secs: u64,
    pub uber_eats: PlatformConfig,
    pub foodpanda: PlatformConfig,
}

impl Config {
    /// 从环境变量加载配置
    ///
    /// 如果环境变量未设置或无法解析，使用默认值
    pub fn from_env() -> Self {
        Self {
            database_path: std::env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "./data/orders.db".into()),
            http_port: std::env::var("HTTP_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into()),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            log_dir: std::env::var("LOG_DIR").ok().filter(|d| !d.is_empty()),
            business_timezone: std::env::var("BUSINESS_TIMEZONE")
                .ok()
                .and_then(|tz| tz.parse().ok())
                .unwrap_or(chrono_tz::Asia::Taipei),
            request_timeout_ms: std::env::var("REQUEST_TIMEOUT_MS")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(30000),
            token_refresh_margin_secs: std::env::var("TOKEN_REFRESH_MARGIN_SECS")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(300),
            platform_accept_deadline_secs: std::env::var("PLATFORM_ACCEPT_DEADLINE_SECS")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(690),
            platform_accept_max_attempts: std::env::var("PLATFORM_ACCEPT_MAX_ATTEMPTS")
                .ok()
                .and_then(|p| p.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(5),
            unmatched_item_policy: std::env::var("UNMATCHED_ITEM_POLICY")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or_default(),
            credit_expiry_sweep_secs: std::env::var("CREDIT_EXPIRY_SWEEP_SECS")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3600),
            uber_eats: PlatformConfig::from_env(
                "UBER_EATS",
                "https://api.uber.com",
                "https://login.uber.com/oauth/v2/token",
            ),
            foodpanda: PlatformConfig::from_env(
                "FOODPANDA",
                "https://integration-middleware.stg.restaurant-partners.com",
                "https://integration-middleware.stg.restaurant-partners.com/v2/login",
            ),
        }
    }

    /// 使用自定义值覆盖部分配置
    ///
    /// 常用于测试场景
    pub fn with_overrides(database_path: impl Into<String>, http_port: u16) -> Self {
        let mut config = Self::from_env();
        config.database_path = database_path.into();
        config.http_port = http_port;
        config
    }

    pub fn platform(&self, platform: Platform) -> &PlatformConfig {
        match platform {
            Platform::UberEats => &self.uber_eats,
            Platform::Foodpanda => &self.foodpanda,
        }
    }

    /// 是否生产环境
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}
