//! Server startup utilities.

use relay_config::AppConfig;
use tracing::info;

/// Prints the startup banner.
pub fn print_banner() {
    info!(
        r#"
 _    __      _              ____       __
| |  / /___  (_)_______     / __ \___  / /___ ___  __
| | / / __ \/ / ___/ _ \   / /_/ / _ \/ / __ `/ / / /
| |/ / /_/ / / /__/  __/  / _, _/  __/ / /_/ / /_/ /
|___/\____/_/\___/\___/  /_/ |_|\___/_/\__,_/\__, /
                                            /____/
    "#
    );
}

/// Logs the effective pipeline settings.
pub fn print_config_summary(config: &AppConfig) {
    info!("Environment: {}", config.app.environment);
    info!("Pipeline:    {} -> {}", config.pipeline.mode, config.pipeline.target_language);
    info!(
        "Queue:       {} ({} workers, depth {}, timeout {}s)",
        config.queue.name,
        config.queue.max_workers,
        config.queue.max_queue_depth,
        config.queue.task_timeout_secs
    );
}

/// Prints server endpoint information.
pub fn print_startup_info(port: u16) {
    let separator = "=".repeat(60);
    info!("{}", separator);
    info!("Webhook:   http://0.0.0.0:{}/webhook", port);
    info!("Health:    http://0.0.0.0:{}/health", port);
    info!("Jobs API:  http://0.0.0.0:{}/api/v1", port);
    info!("{}", separator);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_print_banner_does_not_panic() {
        let _ = tracing_subscriber::fmt::try_init();
        print_banner();
    }

    #[test]
    fn test_print_summary_does_not_panic() {
        let _ = tracing_subscriber::fmt::try_init();
        print_config_summary(&AppConfig::default());
        print_startup_info(8080);
    }
}
