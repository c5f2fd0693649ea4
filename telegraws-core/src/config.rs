use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone};
use serde::Deserialize;
use telegraws_sdk::ReportWindow;

use crate::window::select_window;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("error parsing config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("config validation failed: {0}")]
    Invalid(String),

    #[error("dailyReportHour must be between 0 and 23, got {0}")]
    DailyReportHour(i64),

    #[error("defaultPeriod must be greater than 0, got {0}")]
    DefaultPeriod(i64),
}

fn invalid<S: Into<String>>(message: S) -> ConfigError {
    ConfigError::Invalid(message.into())
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub global: GlobalConfig,
    #[serde(default)]
    pub services: ServicesConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GlobalConfig {
    pub notifications: NotificationsConfig,
    #[serde(default)]
    pub deployment: DeploymentConfig,
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationsConfig {
    #[serde(default)]
    pub use_email: bool,
    #[serde(default)]
    pub email: EmailConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EmailConfig {
    pub host: String,
    pub port: i64,
    pub username: String,
    pub password: String,
    pub header_from: String,
    pub envelope_from: String,
    pub to_addr: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeploymentConfig {
    pub lambda_function_name: String,
    pub lambda_cron_expression: String,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct MonitoringConfig {
    /// Interval report length in hours.
    #[serde(rename = "defaultPeriod")]
    pub default_period: i64,
    /// UTC hour (0-23) at which the daily report runs.
    #[serde(rename = "dailyReportHour")]
    pub daily_report_hour: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServicesConfig {
    pub ec2: Ec2Config,
    pub s3: S3Config,
    pub alb: AlbConfig,
    pub cloudfront: CloudFrontConfig,
    #[serde(rename = "cloudwatchAgent")]
    pub cloudwatch_agent: CloudWatchAgentConfig,
    #[serde(rename = "cloudwatchLogs")]
    pub cloudwatch_logs: CloudWatchLogsConfig,
    pub waf: WafConfig,
    pub dynamodb: DynamoDbConfig,
    pub rds: RdsConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Ec2Config {
    pub enabled: bool,
    pub instance_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct S3Config {
    pub enabled: bool,
    pub bucket_name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AlbConfig {
    pub enabled: bool,
    pub alb_name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CloudFrontConfig {
    pub enabled: bool,
    pub distribution_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CloudWatchAgentConfig {
    pub enabled: bool,
    pub instance_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CloudWatchLogsConfig {
    pub enabled: bool,
    pub log_group_names: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WafConfig {
    pub enabled: bool,
    #[serde(rename = "webACLId")]
    pub web_acl_id: String,
    #[serde(rename = "webACLName")]
    pub web_acl_name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DynamoDbConfig {
    pub enabled: bool,
    pub table_names: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RdsConfig {
    pub enabled: bool,
    pub cluster_id: String,
    pub db_instance_identifier: String,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&raw)
    }

    /// Parses and validates a JSON config document.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.global.notifications.validate()?;

        if self.global.deployment.lambda_function_name.is_empty() {
            return Err(invalid("deployment lambdaFunctionName is required"));
        }
        self.global.monitoring.validate()?;
        self.services.validate()
    }

    /// Window for an invocation at `now`, using the configured monitoring values.
    pub fn report_window<Tz: TimeZone>(
        &self,
        now: &DateTime<Tz>,
    ) -> Result<ReportWindow, ConfigError> {
        select_window(
            now,
            self.global.monitoring.daily_report_hour,
            self.global.monitoring.default_period,
        )
    }
}

impl NotificationsConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.use_email {
            let email = &self.email;
            if email.host.is_empty() {
                return Err(invalid("email enabled but host is empty"));
            }
            if email.port <= 0 || email.port > i64::from(u16::MAX) {
                return Err(invalid("email enabled but port is invalid"));
            }
            if email.username.is_empty() || email.password.is_empty() {
                return Err(invalid("email enabled but username/password missing"));
            }
            if email.header_from.is_empty() {
                return Err(invalid("email enabled but headerFrom is empty"));
            }
            if email.envelope_from.is_empty() {
                return Err(invalid("email enabled but envelopeFrom is empty"));
            }
            if email.to_addr.is_empty() {
                return Err(invalid("email enabled but toAddr is empty"));
            }
        } else {
            if self.telegram.bot_token.is_empty() {
                return Err(invalid(
                    "telegram botToken is required when email is disabled",
                ));
            }
            if self.telegram.chat_id.is_empty() {
                return Err(invalid("telegram chatId is required when email is disabled"));
            }
        }
        Ok(())
    }
}

impl MonitoringConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0..=23).contains(&self.daily_report_hour) {
            return Err(ConfigError::DailyReportHour(self.daily_report_hour));
        }
        if self.default_period <= 0 {
            return Err(ConfigError::DefaultPeriod(self.default_period));
        }
        Ok(())
    }
}

impl ServicesConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.ec2.enabled && self.ec2.instance_id.is_empty() {
            return Err(invalid("EC2 is enabled but instanceId is empty"));
        }
        if self.s3.enabled && self.s3.bucket_name.is_empty() {
            return Err(invalid("S3 is enabled but bucketName is empty"));
        }
        if self.alb.enabled && self.alb.alb_name.is_empty() {
            return Err(invalid("ALB is enabled but albName is empty"));
        }
        if self.cloudfront.enabled && self.cloudfront.distribution_id.is_empty() {
            return Err(invalid("CloudFront is enabled but distributionId is empty"));
        }
        if self.cloudwatch_agent.enabled && self.cloudwatch_agent.instance_id.is_empty() {
            return Err(invalid("CloudWatch Agent is enabled but instanceId is empty"));
        }
        if self.cloudwatch_logs.enabled && self.cloudwatch_logs.log_group_names.is_empty() {
            return Err(invalid(
                "CloudWatch Logs is enabled but logGroupNames array is empty",
            ));
        }
        if self.waf.enabled {
            if self.waf.web_acl_id.is_empty() {
                return Err(invalid("WAF is enabled but webACLId is empty"));
            }
            if self.waf.web_acl_name.is_empty() {
                return Err(invalid("WAF is enabled but webACLName is empty"));
            }
        }
        if self.dynamodb.enabled && self.dynamodb.table_names.is_empty() {
            return Err(invalid("DynamoDB is enabled but tableNames array is empty"));
        }
        if self.rds.enabled
            && self.rds.cluster_id.is_empty()
            && self.rds.db_instance_identifier.is_empty()
        {
            return Err(invalid(
                "RDS is enabled but both clusterId and dbInstanceIdentifier are empty - at least one is required",
            ));
        }
        Ok(())
    }

    pub fn is_enabled(&self, kind: telegraws_sdk::ResourceKind) -> bool {
        use telegraws_sdk::ResourceKind;

        match kind {
            ResourceKind::Ec2 => self.ec2.enabled,
            ResourceKind::CloudwatchAgent => self.cloudwatch_agent.enabled,
            ResourceKind::S3 => self.s3.enabled,
            ResourceKind::Alb => self.alb.enabled,
            ResourceKind::Cloudfront => self.cloudfront.enabled,
            ResourceKind::Dynamodb => self.dynamodb.enabled,
            ResourceKind::Rds => self.rds.enabled,
            ResourceKind::Waf => self.waf.enabled,
            ResourceKind::CloudwatchLogs => self.cloudwatch_logs.enabled,
        }
    }
}
