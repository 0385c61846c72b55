use anyhow::Result;

/// Install the metrics exporter selected by cargo features.
///
/// Without an exporter feature the bucket's counters go to the no-op
/// recorder and this does nothing.
pub fn init_exporter() -> Result<()> {
    #[cfg(feature = "prometheus-exporter")]
    {
        use anyhow::Context;
        use metrics_exporter_prometheus::PrometheusBuilder;
        PrometheusBuilder::new()
            .install()
            .context("installing Prometheus exporter")?;
    }

    #[cfg(feature = "datadog-exporter")]
    {
        use anyhow::Context;
        use metrics_exporter_dogstatsd::DogStatsDBuilder;
        DogStatsDBuilder::default()
            .install()
            .context("installing DogStatsD exporter")?;
    }

    Ok(())
}
