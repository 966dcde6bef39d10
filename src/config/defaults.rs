//! Default values for configuration

/// Default user agent
pub fn default_probe_user_agent() -> String {
    format!("sifter/{} (URL Probe)", env!("CARGO_PKG_VERSION"))
}

/// Default per-request timeout in seconds
pub fn default_probe_timeout() -> u64 {
    30
}

/// Default deadline for a whole probe batch (10 minutes)
pub fn default_probe_batch_timeout() -> u64 {
    600
}

/// Default number of requests in flight per batch
pub fn default_probe_max_concurrency() -> usize {
    20
}

/// Default maximum redirect hops before giving up
pub fn default_probe_max_redirects() -> usize {
    10
}

/// Default number of times one operator may run back-to-back in a cycle
pub fn default_repeat_threshold() -> u32 {
    20
}

/// Default number of URLs an operator selects per run
pub fn default_task_batch_size() -> i64 {
    100
}

/// Default window before a URL is probed for 404 again
pub fn default_probe_404_window_days() -> i64 {
    30
}

/// Default: operator enabled
pub fn default_operator_enabled() -> bool {
    true
}

/// Default: scheduled registry enabled
pub fn default_schedule_enabled() -> bool {
    true
}

/// Default interval for the URL task cycle (hourly)
pub fn default_run_url_tasks_interval() -> u64 {
    60
}

/// Default interval for the backlog snapshot (daily)
pub fn default_backlog_snapshot_interval() -> u64 {
    24 * 60
}

/// Default data-sources API base URL
pub fn default_data_sources_url() -> Option<String> {
    std::env::var("SIFTER_DATA_SOURCES_URL").ok()
}

/// Default environment variable name for the data-sources API key
pub fn default_data_sources_api_key_env() -> String {
    "SIFTER_DATA_SOURCES_API_KEY".to_string()
}

/// Default rate limit for the data-sources API (requests per second)
pub fn default_data_sources_rate_limit() -> u32 {
    5
}

/// Default record type classifier URL
pub fn default_record_type_classifier_url() -> Option<String> {
    std::env::var("SIFTER_RECORD_TYPE_CLASSIFIER_URL").ok()
}

/// Default relevancy classifier URL
pub fn default_relevancy_classifier_url() -> Option<String> {
    std::env::var("SIFTER_RELEVANCY_CLASSIFIER_URL").ok()
}

/// Default agency identification URL
pub fn default_agency_identifier_url() -> Option<String> {
    std::env::var("SIFTER_AGENCY_IDENTIFIER_URL").ok()
}

/// Default alert webhook (Discord-compatible)
pub fn default_discord_webhook_url() -> Option<String> {
    std::env::var("SIFTER_DISCORD_WEBHOOK_URL").ok()
}
