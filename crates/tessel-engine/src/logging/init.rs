use std::sync::Once;

/// Filter used when neither the config nor `RUST_LOG` sets one. The wgpu
/// stack logs every resource at info, so it is held to warnings.
pub const DEFAULT_FILTER: &str = "info,wgpu_core=warn,wgpu_hal=warn,naga=warn";

/// Logger configuration.
///
/// `env_filter` uses the `env_logger` filter syntax, for example
/// "tessel_engine::render=trace" or "warn".
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub env_filter: Option<String>,
    pub write_style: env_logger::WriteStyle,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            env_filter: None,
            write_style: env_logger::WriteStyle::Auto,
        }
    }
}

static INIT: Once = Once::new();

/// Installs `env_logger` as the global logger. Later calls are ignored.
pub fn init_logging(config: LoggingConfig) {
    INIT.call_once(|| {
        let filter = filter_directives(config.env_filter, std::env::var("RUST_LOG").ok());

        env_logger::Builder::new()
            .parse_filters(&filter)
            .write_style(config.write_style)
            .init();

        log::debug!("logging initialized with filter {filter:?}");
    });
}

/// Explicit filter first, then `RUST_LOG`, then [`DEFAULT_FILTER`]. Blank
/// values count as unset.
fn filter_directives(explicit: Option<String>, env: Option<String>) -> String {
    explicit
        .into_iter()
        .chain(env)
        .map(|f| f.trim().to_string())
        .find(|f| !f.is_empty())
        .unwrap_or_else(|| DEFAULT_FILTER.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_filter_wins_over_environment() {
        let directives = filter_directives(Some("tessel_engine=trace".into()), Some("warn".into()));
        assert_eq!(directives, "tessel_engine=trace");
    }

    #[test]
    fn environment_used_when_no_explicit_filter() {
        assert_eq!(filter_directives(None, Some(" debug ".into())), "debug");
        assert_eq!(filter_directives(Some(String::new()), Some("warn".into())), "warn");
    }

    #[test]
    fn default_quiets_wgpu() {
        let directives = filter_directives(None, None);
        assert_eq!(directives, DEFAULT_FILTER);
        assert!(directives.contains("wgpu_core=warn"));
    }
}
