use std::future::Future;
use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{RngCore, SeedableRng};
use tracing::info;

use freedns_bot_core::{BotError, CustomDomainTable, Zone};

/// Where a target zone came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ZoneChoice {
    /// Operator alias; the zone id still has to be looked up
    Custom(String),
    /// Random pick from the shared registry, id included
    Registry(Zone),
}

impl ZoneChoice {
    pub fn domain(&self) -> &str {
        match self {
            ZoneChoice::Custom(domain) => domain,
            ZoneChoice::Registry(zone) => &zone.domain,
        }
    }
}

pub struct DomainSelector {
    rng: Mutex<Box<dyn RngCore + Send>>,
}

impl DomainSelector {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    pub fn with_rng<R: RngCore + Send + 'static>(rng: R) -> Self {
        Self {
            rng: Mutex::new(Box::new(rng)),
        }
    }

    /// Resolve the alias through the custom table, falling back to a uniform
    /// random registry zone. `registry_fetch` runs only on the fallback path
    /// and its failure is not recovered.
    pub async fn resolve<F, Fut>(
        &self,
        alias: Option<&str>,
        table: &CustomDomainTable,
        registry_fetch: F,
    ) -> Result<ZoneChoice, BotError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<Zone>, BotError>>,
    {
        if let Some(zone) = alias.and_then(|a| table.get(a)) {
            info!("using custom domain {} for alias {:?}", zone, alias);
            return Ok(ZoneChoice::Custom(zone));
        }

        let zones = registry_fetch().await?;
        let picked = self.pick(&zones).ok_or_else(|| {
            BotError::RegistrarRejected("domain registry is empty".to_string())
        })?;

        info!("picked registry domain {} out of {}", picked.domain, zones.len());
        Ok(ZoneChoice::Registry(picked))
    }

    fn pick(&self, zones: &[Zone]) -> Option<Zone> {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        zones.choose(&mut *rng).cloned()
    }
}

impl Default for DomainSelector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::mock::StepRng;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn registry() -> Vec<Zone> {
        vec![
            Zone { id: 1, domain: "a.net".to_string() },
            Zone { id: 2, domain: "b.net".to_string() },
        ]
    }

    #[tokio::test]
    async fn test_custom_alias_skips_registry() {
        let table = CustomDomainTable::new();
        table.insert("work", "example.org");
        let fetched = AtomicBool::new(false);

        let choice = DomainSelector::new()
            .resolve(Some("Work"), &table, || async {
                fetched.store(true, Ordering::SeqCst);
                Ok(registry())
            })
            .await
            .unwrap();

        assert_eq!(choice, ZoneChoice::Custom("example.org".to_string()));
        assert!(!fetched.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_unknown_alias_falls_back_to_registry() {
        let table = CustomDomainTable::new();
        let selector = DomainSelector::with_rng(StepRng::new(0, 0));

        let choice = selector
            .resolve(Some("home"), &table, || async { Ok(registry()) })
            .await
            .unwrap();

        assert_eq!(choice, ZoneChoice::Registry(registry()[0].clone()));
        assert_eq!(choice.domain(), "a.net");
    }

    #[tokio::test]
    async fn test_random_pick_stays_in_registry() {
        let table = CustomDomainTable::new();
        let selector = DomainSelector::new();

        for _ in 0..20 {
            let choice = selector.resolve(None, &table, || async { Ok(registry()) }).await.unwrap();
            assert!(matches!(choice, ZoneChoice::Registry(ref z) if registry().contains(z)));
        }
    }

    #[tokio::test]
    async fn test_registry_failures_propagate() {
        let table = CustomDomainTable::new();
        let selector = DomainSelector::new();

        let err = selector
            .resolve(None, &table, || async { Err(BotError::Transport("reset".into())) })
            .await;
        assert!(matches!(err, Err(BotError::Transport(_))));

        let empty = selector.resolve(None, &table, || async { Ok(vec![]) }).await;
        assert!(matches!(empty, Err(BotError::RegistrarRejected(_))));
    }
}
