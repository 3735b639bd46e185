/* Process-wide backend registry (4.B). Backends register a name, a priority,
 * and an async factory; `create` tries factories in priority order (lower
 * value first) and returns the first one that constructs successfully,
 * mirroring the device-driver lookup table this daemon's teacher keeps for
 * its own drivers, but keyed by backend name rather than device id. */

use std::sync::RwLock;

use futures_util::future::BoxFuture;
use once_cell::sync::Lazy;
use tracing::{info, warn};

use super::{Backend, BackendError};
use crate::config::Config;
use crate::error::CoreError;

pub type BackendFactory =
    std::sync::Arc<dyn Fn(&Config) -> BoxFuture<'static, Result<Box<dyn Backend>, BackendError>> + Send + Sync>;

#[derive(Clone)]
pub struct BackendRegistration {
    pub name: String,
    pub factory: BackendFactory,
    /* Lower values are tried first during auto-select. */
    pub priority: i32,
}

static REGISTRY: Lazy<RwLock<Vec<BackendRegistration>>> = Lazy::new(|| RwLock::new(Vec::new()));

pub fn register(name: impl Into<String>, priority: i32, factory: BackendFactory) {
    let name = name.into();
    let mut registry = REGISTRY.write().expect("registry lock poisoned");
    if let Some(existing) = registry.iter_mut().find(|r| r.name == name) {
        warn!(backend = %name, "re-registering backend, replacing previous factory");
        existing.factory = factory;
        existing.priority = priority;
    } else {
        info!(backend = %name, priority, "registered backend");
        registry.push(BackendRegistration {
            name,
            factory,
            priority,
        });
    }
}

pub fn is_registered(name: &str) -> bool {
    REGISTRY
        .read()
        .expect("registry lock poisoned")
        .iter()
        .any(|r| r.name == name)
}

pub fn registered_names() -> Vec<String> {
    let mut registry = REGISTRY
        .read()
        .expect("registry lock poisoned")
        .iter()
        .map(|r| (r.name.clone(), r.priority))
        .collect::<Vec<_>>();
    registry.sort_by_key(|(_, p)| *p);
    registry.into_iter().map(|(n, _)| n).collect()
}

fn snapshot_sorted() -> Vec<BackendRegistration> {
    let mut all = REGISTRY.read().expect("registry lock poisoned").clone();
    all.sort_by_key(|r| r.priority);
    all
}

/* Construct the named backend, bypassing priority ordering. */
pub async fn create_by_name(name: &str, config: &Config) -> Result<Box<dyn Backend>, CoreError> {
    let factory = {
        let registry = REGISTRY.read().expect("registry lock poisoned");
        registry
            .iter()
            .find(|r| r.name == name)
            .map(|r| r.factory.clone())
            .ok_or_else(|| CoreError::UnknownBackend {
                name: name.to_string(),
                available: registered_names().join(", "),
            })?
    };
    (factory)(config).await.map_err(Into::into)
}

/* Construct the configured backend, or the highest-priority backend that
 * constructs successfully when none is configured (9). */
pub async fn create(config: &Config) -> Result<(Box<dyn Backend>, String), CoreError> {
    if !config.backend.is_empty() {
        let backend = create_by_name(&config.backend, config).await?;
        let name = backend.name().to_string();
        return Ok((backend, name));
    }
    create_excluding(config, &[]).await
}

/* Auto-select, skipping any backend named in `excluded` — used when a
 * previously-selected backend just failed and a replacement is needed (4.F). */
pub async fn create_excluding(
    config: &Config,
    excluded: &[String],
) -> Result<(Box<dyn Backend>, String), CoreError> {
    let candidates = snapshot_sorted();
    let mut last_err: Option<anyhow::Error> = None;

    for registration in candidates {
        if excluded.iter().any(|e| e == &registration.name) {
            continue;
        }
        match (registration.factory)(config).await {
            Ok(backend) => {
                let name = backend.name().to_string();
                info!(backend = %name, "selected backend");
                return Ok((backend, name));
            }
            Err(e) => {
                warn!(backend = %registration.name, error = %e, "backend construction failed");
                last_err = Some(anyhow::anyhow!(e));
            }
        }
    }

    Err(CoreError::BackendUnavailable(
        last_err.unwrap_or_else(|| anyhow::anyhow!("no backends registered")),
    ))
}

/* Explicit registration, called once from `main()` — not module-level
 * `ctor`/static-init side effects (9), so registration order is visible at
 * the call site instead of depending on link order. */
pub fn register_builtin_backends() {
    register(
        super::vendor::BACKEND_NAME,
        0,
        std::sync::Arc::new(|config: &Config| {
            let config = config.clone();
            Box::pin(async move { super::vendor::factory(&config) })
        }),
    );
    register(
        super::direct::BACKEND_NAME,
        10,
        std::sync::Arc::new(|config: &Config| {
            let config = config.clone();
            Box::pin(async move { super::direct::factory(&config).await })
        }),
    );
    register(
        super::preview::BACKEND_NAME,
        super::preview::PRIORITY,
        std::sync::Arc::new(|config: &Config| {
            let config = config.clone();
            Box::pin(async move { super::preview::factory(&config) })
        }),
    );
}

#[cfg(any(test, feature = "dev-hooks"))]
pub fn snapshot() -> Vec<BackendRegistration> {
    REGISTRY.read().expect("registry lock poisoned").clone()
}

#[cfg(any(test, feature = "dev-hooks"))]
pub fn restore(saved: Vec<BackendRegistration>) {
    *REGISTRY.write().expect("registry lock poisoned") = saved;
}
