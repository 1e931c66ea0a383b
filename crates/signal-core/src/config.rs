//! Process-wide runtime configuration.
//!
//! Every tunable has a compiled-in default and an environment override,
//! loaded once at boot (a `.env` file is honoured via dotenvy). Weights and
//! thresholds are plain fields so the engines never reach for the
//! environment themselves.

fn env_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_i64(key: &str, default: i64) -> i64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Freshness thresholds for one source, in hours. Beyond `warn_h` the
/// source counts as down.
#[derive(Debug, Clone, Copy)]
pub struct StalenessThresholds {
    pub fresh_h: i64,
    pub warn_h: i64,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub bind_addr: String,

    // Collector pacing & retry
    pub trends_api_key: String,
    pub collector_min_interval_sec: f64,
    pub collector_max_retries: u32,
    pub breaker_threshold: u32,
    pub breaker_cooldown_sec: u64,

    // Signal light thresholds
    pub signal_wow_growth_threshold: f64,
    pub signal_breakout_percentile: f64,
    pub signal_lead_time_weeks: i64,

    // Opportunity scoring weights
    pub opp_weight_demand: f64,
    pub opp_weight_diffusion: f64,
    pub opp_weight_fit: f64,
    pub opp_risk_weight_supply: f64,
    pub opp_risk_weight_gatekeeper: f64,
    pub opp_scaling_factor: f64,
    pub opp_timing_low: f64,
    pub opp_timing_high: f64,

    // BD allocation weights & thresholds
    pub bd_weight_timing: f64,
    pub bd_weight_demand: f64,
    pub bd_weight_market_gap: f64,
    pub bd_weight_feasibility: f64,
    pub bd_fit_gate_threshold: f64,
    pub bd_start_threshold: f64,
    pub bd_monitor_threshold: f64,
    pub bd_gatekeeper_urgency_factor: f64,

    // Launch timing
    pub launch_weight_demand: f64,
    pub launch_weight_event: f64,
    pub launch_weight_saturation: f64,
    pub launch_weight_ops_risk: f64,
    pub launch_event_peak_weeks_before: i64,
    pub launch_event_sigma_weeks: f64,
    pub launch_fallback_window_months: i64,
    pub launch_lead_design_start: i64,
    pub launch_lead_artwork: i64,
    pub launch_lead_sample_review: i64,
    pub launch_lead_production: i64,

    // Per-source staleness thresholds (hours)
    pub staleness_search_trends: StalenessThresholds,
    pub staleness_video: StalenessThresholds,
    pub staleness_news_rss: StalenessThresholds,
    pub staleness_shopee: StalenessThresholds,
    pub staleness_catalogue: StalenessThresholds,
    pub staleness_amazon_jp: StalenessThresholds,

    // Confidence weights & penalties
    pub confidence_indicator_weight: f64,
    pub confidence_source_weight: f64,
    pub confidence_key_source_down_penalty: f64,
    pub confidence_key_source_warn_penalty: f64,
    pub confidence_key_indicator_missing_penalty: f64,
    pub confidence_key_indicator_penalty_cap: f64,

    // Video source
    pub video_api_key: String,
    pub video_max_results: u32,
    pub video_recency_days: i64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: "sqlite:ip-radar.db".to_string(),
            bind_addr: "0.0.0.0:8000".to_string(),

            trends_api_key: String::new(),
            collector_min_interval_sec: 5.0,
            collector_max_retries: 3,
            breaker_threshold: 5,
            breaker_cooldown_sec: 1800,

            signal_wow_growth_threshold: 0.30,
            signal_breakout_percentile: 85.0,
            signal_lead_time_weeks: 12,

            opp_weight_demand: 0.30,
            opp_weight_diffusion: 0.20,
            opp_weight_fit: 0.15,
            opp_risk_weight_supply: 0.25,
            opp_risk_weight_gatekeeper: 0.10,
            opp_scaling_factor: 1.35,
            opp_timing_low: 0.8,
            opp_timing_high: 0.4,

            bd_weight_timing: 0.35,
            bd_weight_demand: 0.30,
            bd_weight_market_gap: 0.20,
            bd_weight_feasibility: 0.15,
            bd_fit_gate_threshold: 30.0,
            bd_start_threshold: 70.0,
            bd_monitor_threshold: 40.0,
            bd_gatekeeper_urgency_factor: 0.3,

            launch_weight_demand: 0.4,
            launch_weight_event: 0.3,
            launch_weight_saturation: 0.15,
            launch_weight_ops_risk: 0.15,
            launch_event_peak_weeks_before: 4,
            launch_event_sigma_weeks: 3.0,
            launch_fallback_window_months: 6,
            launch_lead_design_start: 14,
            launch_lead_artwork: 12,
            launch_lead_sample_review: 10,
            launch_lead_production: 8,

            staleness_search_trends: StalenessThresholds { fresh_h: 72, warn_h: 168 },
            staleness_video: StalenessThresholds { fresh_h: 72, warn_h: 168 },
            staleness_news_rss: StalenessThresholds { fresh_h: 24, warn_h: 72 },
            staleness_shopee: StalenessThresholds { fresh_h: 72, warn_h: 168 },
            staleness_catalogue: StalenessThresholds { fresh_h: 720, warn_h: 2160 },
            staleness_amazon_jp: StalenessThresholds { fresh_h: 72, warn_h: 168 },

            confidence_indicator_weight: 0.6,
            confidence_source_weight: 0.4,
            confidence_key_source_down_penalty: 20.0,
            confidence_key_source_warn_penalty: 10.0,
            confidence_key_indicator_missing_penalty: 10.0,
            confidence_key_indicator_penalty_cap: 30.0,

            video_api_key: String::new(),
            video_max_results: 10,
            video_recency_days: 90,
        }
    }
}

impl Settings {
    /// Build from the environment, falling back to defaults. Loads `.env`
    /// first so local overrides work without exporting.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        let d = Settings::default();

        Self {
            database_url: env_str("DATABASE_URL", &d.database_url),
            bind_addr: env_str("BIND_ADDR", &d.bind_addr),

            trends_api_key: env_str("TRENDS_API_KEY", &d.trends_api_key),
            collector_min_interval_sec: env_f64(
                "COLLECTOR_MIN_INTERVAL_SEC",
                d.collector_min_interval_sec,
            ),
            collector_max_retries: env_u32("COLLECTOR_MAX_RETRIES", d.collector_max_retries),
            breaker_threshold: env_u32("BREAKER_THRESHOLD", d.breaker_threshold),
            breaker_cooldown_sec: env_u32("BREAKER_COOLDOWN_SEC", d.breaker_cooldown_sec as u32)
                as u64,

            signal_wow_growth_threshold: env_f64(
                "SIGNAL_WOW_GROWTH_THRESHOLD",
                d.signal_wow_growth_threshold,
            ),
            signal_breakout_percentile: env_f64(
                "SIGNAL_BREAKOUT_PERCENTILE",
                d.signal_breakout_percentile,
            ),
            signal_lead_time_weeks: env_i64("SIGNAL_LEAD_TIME_WEEKS", d.signal_lead_time_weeks),

            opp_weight_demand: env_f64("OPP_WEIGHT_DEMAND", d.opp_weight_demand),
            opp_weight_diffusion: env_f64("OPP_WEIGHT_DIFFUSION", d.opp_weight_diffusion),
            opp_weight_fit: env_f64("OPP_WEIGHT_FIT", d.opp_weight_fit),
            opp_risk_weight_supply: env_f64("OPP_RISK_WEIGHT_SUPPLY", d.opp_risk_weight_supply),
            opp_risk_weight_gatekeeper: env_f64(
                "OPP_RISK_WEIGHT_GATEKEEPER",
                d.opp_risk_weight_gatekeeper,
            ),
            opp_scaling_factor: env_f64("OPP_SCALING_FACTOR", d.opp_scaling_factor),
            opp_timing_low: env_f64("OPP_TIMING_LOW", d.opp_timing_low),
            opp_timing_high: env_f64("OPP_TIMING_HIGH", d.opp_timing_high),

            bd_weight_timing: env_f64("BD_WEIGHT_TIMING", d.bd_weight_timing),
            bd_weight_demand: env_f64("BD_WEIGHT_DEMAND", d.bd_weight_demand),
            bd_weight_market_gap: env_f64("BD_WEIGHT_MARKET_GAP", d.bd_weight_market_gap),
            bd_weight_feasibility: env_f64("BD_WEIGHT_FEASIBILITY", d.bd_weight_feasibility),
            bd_fit_gate_threshold: env_f64("BD_FIT_GATE_THRESHOLD", d.bd_fit_gate_threshold),
            bd_start_threshold: env_f64("BD_START_THRESHOLD", d.bd_start_threshold),
            bd_monitor_threshold: env_f64("BD_MONITOR_THRESHOLD", d.bd_monitor_threshold),
            bd_gatekeeper_urgency_factor: env_f64(
                "BD_GATEKEEPER_URGENCY_FACTOR",
                d.bd_gatekeeper_urgency_factor,
            ),

            launch_weight_demand: env_f64("LAUNCH_WEIGHT_DEMAND", d.launch_weight_demand),
            launch_weight_event: env_f64("LAUNCH_WEIGHT_EVENT", d.launch_weight_event),
            launch_weight_saturation: env_f64(
                "LAUNCH_WEIGHT_SATURATION",
                d.launch_weight_saturation,
            ),
            launch_weight_ops_risk: env_f64("LAUNCH_WEIGHT_OPS_RISK", d.launch_weight_ops_risk),
            launch_event_peak_weeks_before: env_i64(
                "LAUNCH_EVENT_PEAK_WEEKS_BEFORE",
                d.launch_event_peak_weeks_before,
            ),
            launch_event_sigma_weeks: env_f64(
                "LAUNCH_EVENT_SIGMA_WEEKS",
                d.launch_event_sigma_weeks,
            ),
            launch_fallback_window_months: env_i64(
                "LAUNCH_FALLBACK_WINDOW_MONTHS",
                d.launch_fallback_window_months,
            ),
            launch_lead_design_start: env_i64(
                "LAUNCH_LEAD_DESIGN_START",
                d.launch_lead_design_start,
            ),
            launch_lead_artwork: env_i64("LAUNCH_LEAD_ARTWORK", d.launch_lead_artwork),
            launch_lead_sample_review: env_i64(
                "LAUNCH_LEAD_SAMPLE_REVIEW",
                d.launch_lead_sample_review,
            ),
            launch_lead_production: env_i64("LAUNCH_LEAD_PRODUCTION", d.launch_lead_production),

            staleness_search_trends: StalenessThresholds {
                fresh_h: env_i64("STALENESS_SEARCH_TRENDS_FRESH_H", d.staleness_search_trends.fresh_h),
                warn_h: env_i64("STALENESS_SEARCH_TRENDS_WARN_H", d.staleness_search_trends.warn_h),
            },
            staleness_video: StalenessThresholds {
                fresh_h: env_i64("STALENESS_VIDEO_FRESH_H", d.staleness_video.fresh_h),
                warn_h: env_i64("STALENESS_VIDEO_WARN_H", d.staleness_video.warn_h),
            },
            staleness_news_rss: StalenessThresholds {
                fresh_h: env_i64("STALENESS_NEWS_RSS_FRESH_H", d.staleness_news_rss.fresh_h),
                warn_h: env_i64("STALENESS_NEWS_RSS_WARN_H", d.staleness_news_rss.warn_h),
            },
            staleness_shopee: StalenessThresholds {
                fresh_h: env_i64("STALENESS_SHOPEE_FRESH_H", d.staleness_shopee.fresh_h),
                warn_h: env_i64("STALENESS_SHOPEE_WARN_H", d.staleness_shopee.warn_h),
            },
            staleness_catalogue: StalenessThresholds {
                fresh_h: env_i64("STALENESS_CATALOGUE_FRESH_H", d.staleness_catalogue.fresh_h),
                warn_h: env_i64("STALENESS_CATALOGUE_WARN_H", d.staleness_catalogue.warn_h),
            },
            staleness_amazon_jp: StalenessThresholds {
                fresh_h: env_i64("STALENESS_AMAZON_JP_FRESH_H", d.staleness_amazon_jp.fresh_h),
                warn_h: env_i64("STALENESS_AMAZON_JP_WARN_H", d.staleness_amazon_jp.warn_h),
            },

            confidence_indicator_weight: env_f64(
                "CONFIDENCE_INDICATOR_WEIGHT",
                d.confidence_indicator_weight,
            ),
            confidence_source_weight: env_f64(
                "CONFIDENCE_SOURCE_WEIGHT",
                d.confidence_source_weight,
            ),
            confidence_key_source_down_penalty: env_f64(
                "CONFIDENCE_KEY_SOURCE_DOWN_PENALTY",
                d.confidence_key_source_down_penalty,
            ),
            confidence_key_source_warn_penalty: env_f64(
                "CONFIDENCE_KEY_SOURCE_WARN_PENALTY",
                d.confidence_key_source_warn_penalty,
            ),
            confidence_key_indicator_missing_penalty: env_f64(
                "CONFIDENCE_KEY_INDICATOR_MISSING_PENALTY",
                d.confidence_key_indicator_missing_penalty,
            ),
            confidence_key_indicator_penalty_cap: env_f64(
                "CONFIDENCE_KEY_INDICATOR_PENALTY_CAP",
                d.confidence_key_indicator_penalty_cap,
            ),

            video_api_key: env_str("VIDEO_API_KEY", &d.video_api_key),
            video_max_results: env_u32("VIDEO_MAX_RESULTS", d.video_max_results),
            video_recency_days: env_i64("VIDEO_RECENCY_DAYS", d.video_recency_days),
        }
    }

    /// Freshness thresholds for a source key; unknown sources get the
    /// 72h/168h defaults.
    pub fn staleness_for(&self, source_key: &str) -> StalenessThresholds {
        match source_key {
            "search_trends" => self.staleness_search_trends,
            "video" => self.staleness_video,
            "news_rss" => self.staleness_news_rss,
            "shopee" => self.staleness_shopee,
            "catalogue" => self.staleness_catalogue,
            "amazon_jp" => self.staleness_amazon_jp,
            _ => StalenessThresholds { fresh_h: 72, warn_h: 168 },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_weights() {
        let s = Settings::default();
        assert_eq!(s.opp_weight_demand, 0.30);
        assert_eq!(s.bd_fit_gate_threshold, 30.0);
        assert_eq!(s.launch_event_peak_weeks_before, 4);
        assert_eq!(s.confidence_indicator_weight, 0.6);
    }

    #[test]
    fn unknown_source_gets_default_staleness() {
        let s = Settings::default();
        let t = s.staleness_for("nonexistent");
        assert_eq!(t.fresh_h, 72);
        assert_eq!(t.warn_h, 168);
    }
}
