//! Build providers from settings

use stratus_cloud::{ClassifierConfig, ErrorClassifier};
use stratus_cloud_cloudflare::{CloudflareDns, DnsConfig};
use stratus_cloud_sakura::SakuraCloudProvider;
use stratus_config::Settings;

pub const SAKURA: &str = "sakura-cloud";
pub const CLOUDFLARE: &str = "cloudflare";

/// Classifier vocabulary for `provider`, including the settings overrides
pub fn classifier(settings: &Settings, provider: Option<&str>) -> anyhow::Result<ErrorClassifier> {
    let (name, base) = match provider {
        Some(SAKURA) => (SAKURA, stratus_cloud_sakura::classifier_config()),
        Some(CLOUDFLARE) => (CLOUDFLARE, stratus_cloud_cloudflare::classifier_config()),
        Some(other) => anyhow::bail!(
            "Unknown provider '{}' (expected {} or {})",
            other,
            SAKURA,
            CLOUDFLARE
        ),
        None => return Ok(ErrorClassifier::new(ClassifierConfig::default())),
    };
    Ok(ErrorClassifier::new(settings.classifier_config(name, base)?))
}

pub fn sakura(settings: &Settings, zone: &str) -> anyhow::Result<SakuraCloudProvider> {
    let (initial, max) = settings.poll_interval();
    Ok(SakuraCloudProvider::new(zone)
        .with_classifier(classifier(settings, Some(SAKURA))?)
        .with_timeouts(settings.timeouts())
        .with_retry_policy(settings.retry_policy())
        .with_poll_interval(initial, max))
}

pub fn cloudflare(settings: &Settings) -> anyhow::Result<CloudflareDns> {
    let (initial, max) = settings.poll_interval();
    let dns = CloudflareDns::new(DnsConfig::from_env()?)?;
    Ok(dns
        .with_classifier(classifier(settings, Some(CLOUDFLARE))?)
        .with_timeouts(settings.timeouts())
        .with_retry_policy(settings.retry_policy())
        .with_poll_interval(initial, max))
}
