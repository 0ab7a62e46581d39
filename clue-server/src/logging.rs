//! 日志初始化

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingSettings;

/// 日志过滤器：优先使用 `RUST_LOG`，否则使用配置的级别
pub fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// 初始化全局日志
pub fn setup_logging(settings: &LoggingSettings) -> Result<()> {
    let filter = build_filter(&settings.level);

    if settings.json_format {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(false))
            .try_init()
            .context("日志系统初始化失败")?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false))
            .try_init()
            .context("日志系统初始化失败")?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_only_once() {
        let settings = LoggingSettings::default();
        let first = setup_logging(&settings);
        // 全局日志只能初始化一次
        let second = setup_logging(&settings);
        assert!(first.is_err() || second.is_err());
    }
}
