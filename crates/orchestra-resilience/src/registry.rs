use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use orchestra_config::BreakerSettings;
use tracing::info;

use crate::breaker::{BreakerConfig, BreakerSnapshot, CircuitBreaker};
use crate::error::ResilienceError;

/// Process-wide set of circuit breakers, one per collaborator name.
///
/// The set is fixed once built: looking up a collaborator that was never
/// registered is an error rather than a silent creation.
#[derive(Debug, Default, Clone)]
pub struct BreakerRegistry {
  breakers: HashMap<String, Arc<CircuitBreaker>>,
}

impl BreakerRegistry {
  pub fn builder() -> BreakerRegistryBuilder {
    BreakerRegistryBuilder::default()
  }

  /// Build a registry from the `breakers` section of the configuration.
  pub fn from_settings(
    settings: &BTreeMap<String, BreakerSettings>,
  ) -> Result<Self, ResilienceError> {
    let mut builder = Self::builder();
    for (name, settings) in settings {
      builder = builder.register(name, BreakerConfig::from_settings(name, settings)?)?;
    }
    Ok(builder.build())
  }

  pub fn get(&self, name: &str) -> Result<Arc<CircuitBreaker>, ResilienceError> {
    self
      .breakers
      .get(name)
      .cloned()
      .ok_or_else(|| ResilienceError::UnknownBreaker {
        name: name.to_string(),
      })
  }

  pub fn contains(&self, name: &str) -> bool {
    self.breakers.contains_key(name)
  }

  /// Current state of every breaker, sorted by name.
  pub fn snapshot(&self) -> Vec<BreakerSnapshot> {
    let mut snapshots: Vec<_> = self.breakers.values().map(|b| b.snapshot()).collect();
    snapshots.sort_by(|a, b| a.name.cmp(&b.name));
    snapshots
  }
}

#[derive(Debug, Default)]
pub struct BreakerRegistryBuilder {
  breakers: HashMap<String, Arc<CircuitBreaker>>,
}

impl BreakerRegistryBuilder {
  pub fn register(
    mut self,
    name: impl Into<String>,
    config: BreakerConfig,
  ) -> Result<Self, ResilienceError> {
    let name = name.into();
    if self.breakers.contains_key(&name) {
      return Err(ResilienceError::DuplicateBreaker { name });
    }
    info!(
      breaker = %name,
      failure_threshold = config.failure_threshold,
      retry_timeout_ms = config.retry_timeout.as_millis() as u64,
      call_timeout_ms = config.call_timeout.as_millis() as u64,
      "breaker_registered"
    );
    let breaker = Arc::new(CircuitBreaker::new(name.clone(), config));
    self.breakers.insert(name, breaker);
    Ok(self)
  }

  pub fn build(self) -> BreakerRegistry {
    BreakerRegistry {
      breakers: self.breakers,
    }
  }
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use super::*;

  fn config() -> BreakerConfig {
    BreakerConfig::new("test", 2, Duration::from_secs(1), Duration::from_secs(1)).unwrap()
  }

  #[test]
  fn test_unknown_breaker_is_an_error() {
    let registry = BreakerRegistry::builder()
      .register("platform", config())
      .unwrap()
      .build();

    assert!(registry.get("platform").is_ok());
    assert!(matches!(
      registry.get("crm"),
      Err(ResilienceError::UnknownBreaker { name }) if name == "crm"
    ));
  }

  #[test]
  fn test_duplicate_registration_is_rejected() {
    let result = BreakerRegistry::builder()
      .register("platform", config())
      .unwrap()
      .register("platform", config());

    assert!(matches!(
      result,
      Err(ResilienceError::DuplicateBreaker { .. })
    ));
  }

  #[test]
  fn test_lookups_share_one_instance() {
    let registry = BreakerRegistry::builder()
      .register("platform", config())
      .unwrap()
      .build();

    let a = registry.get("platform").unwrap();
    let b = registry.get("platform").unwrap();
    assert!(Arc::ptr_eq(&a, &b));
  }

  #[test]
  fn test_from_settings_validates_each_breaker() {
    let mut settings = BTreeMap::new();
    settings.insert("messaging".to_string(), BreakerSettings::default());
    settings.insert(
      "platform".to_string(),
      BreakerSettings {
        call_timeout_ms: 0,
        ..BreakerSettings::default()
      },
    );

    let err = BreakerRegistry::from_settings(&settings).unwrap_err();
    assert!(matches!(err, ResilienceError::InvalidConfig { name, .. } if name == "platform"));
  }

  #[test]
  fn test_snapshot_is_sorted_by_name() {
    let mut settings = BTreeMap::new();
    settings.insert("webhook".to_string(), BreakerSettings::default());
    settings.insert("messaging".to_string(), BreakerSettings::default());

    let registry = BreakerRegistry::from_settings(&settings).unwrap();
    let names: Vec<_> = registry.snapshot().into_iter().map(|s| s.name).collect();
    assert_eq!(names, vec!["messaging", "webhook"]);
  }
}
