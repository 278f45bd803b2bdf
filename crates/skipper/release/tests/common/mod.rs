//! Shared fixtures for release service integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use semver::Version;
use skipper_registry::{
    AppDeploymentRequest, Deployer, DeployerRegistry, InMemoryDeployer, InMemoryPackageSource,
};
use skipper_release::{HealthCheckConfig, ReleaseService, SkipperConfig};
use skipper_state::{
    AppDeployerDataRepository, InMemoryAppDeployerDataRepository, InMemoryReleaseRepository,
};
use skipper_types::*;
use std::sync::Arc;
use std::time::Duration;

pub const PLATFORM: &str = "default";

// ---------------------------------------------------------------------------
// Packages
// ---------------------------------------------------------------------------

const LOGGER_TEMPLATE: &str = r#"
apiVersion: skipper.spring.io/v1
kind: generic-app
metadata:
  name: logger-app
spec:
  resource: "docker:example/logger"
  resourceVersion: "{{ version }}"
  applicationProperties:
    log.level: "{{ log.level }}"
  deploymentProperties:
    memory: "{{ memory }}"
"#;

/// Single application package
pub fn logger_package() -> Package {
    Package::new(PackageMetadata::new("logger", Version::new(1, 0, 0)))
        .with_template(Template::new("logger.yml", LOGGER_TEMPLATE))
        .with_values(ConfigValues::new(
            "version: 1.0.0\nlog:\n  level: INFO\nmemory: 512m",
        ))
}

fn greeter(name: &str) -> Package {
    let template = format!(
        "kind: generic-app\nmetadata:\n  name: {name}-app\nspec:\n  resource: docker:example/{name}\n  applicationProperties:\n    greeting: \"{{{{ greeting }}}}\"\n"
    );
    Package::new(PackageMetadata::new(name, Version::new(1, 0, 0)))
        .with_template(Template::new(format!("{name}.yml"), template))
        .with_values(ConfigValues::new("greeting: hello"))
}

/// Two applications, `time-app` then `log-app`
pub fn ticktock_package() -> Package {
    Package::new(PackageMetadata::new("ticktock", Version::new(1, 0, 0)))
        .with_dependency(greeter("time"))
        .with_dependency(greeter("log"))
}

/// Version 2 of ticktock drops `log-app`
pub fn ticktock_without_log() -> Package {
    Package::new(PackageMetadata::new("ticktock", Version::new(2, 0, 0)))
        .with_dependency(greeter("time"))
}

pub fn level(level: &str) -> ConfigValues {
    ConfigValues::new(format!("log:\n  level: {level}"))
}

pub fn logger_ref() -> PackageRef {
    PackageRef::latest("logger")
}

pub fn ticktock_ref(major: u64) -> PackageRef {
    PackageRef::exact("ticktock", Version::new(major, 0, 0))
}

// ---------------------------------------------------------------------------
// Slow platform
// ---------------------------------------------------------------------------

/// Adds a fixed latency to deploy and status calls of an in-memory deployer
pub struct SlowDeployer {
    inner: Arc<InMemoryDeployer>,
    deploy_delay: Duration,
    status_delay: Duration,
}

#[async_trait]
impl Deployer for SlowDeployer {
    async fn deploy(&self, request: &AppDeploymentRequest) -> skipper_registry::Result<DeploymentId> {
        tokio::time::sleep(self.deploy_delay).await;
        self.inner.deploy(request).await
    }

    async fn undeploy(&self, id: &DeploymentId) -> skipper_registry::Result<()> {
        self.inner.undeploy(id).await
    }

    async fn status(&self, id: &DeploymentId) -> skipper_registry::Result<AppStatus> {
        tokio::time::sleep(self.status_delay).await;
        self.inner.status(id).await
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub service: ReleaseService,
    pub deployer: Arc<InMemoryDeployer>,
    pub deployers: Arc<DeployerRegistry>,
    pub deployer_data: Arc<InMemoryAppDeployerDataRepository>,
}

pub fn fast_health_check() -> HealthCheckConfig {
    HealthCheckConfig::new(Duration::from_millis(10), Duration::from_secs(5))
}

pub fn harness() -> Harness {
    harness_with(fast_health_check())
}

pub fn harness_with(health_check: HealthCheckConfig) -> Harness {
    let deployer = Arc::new(InMemoryDeployer::new(PLATFORM));
    build(health_check, deployer.clone(), deployer)
}

/// Harness whose default platform answers deploy and status calls slowly
pub fn harness_with_latency(deploy_delay: Duration, status_delay: Duration) -> Harness {
    let deployer = Arc::new(InMemoryDeployer::new(PLATFORM));
    let slow = Arc::new(SlowDeployer {
        inner: deployer.clone(),
        deploy_delay,
        status_delay,
    });
    build(fast_health_check(), slow, deployer)
}

fn build(
    health_check: HealthCheckConfig,
    platform: Arc<dyn Deployer>,
    deployer: Arc<InMemoryDeployer>,
) -> Harness {
    let deployers = Arc::new(DeployerRegistry::new());
    deployers.register(PLATFORM, platform);

    let packages = Arc::new(InMemoryPackageSource::new());
    packages.register(logger_package());
    packages.register(ticktock_package());
    packages.register(ticktock_without_log());

    let deployer_data = Arc::new(InMemoryAppDeployerDataRepository::new());
    let config = SkipperConfig {
        health_check,
        ..SkipperConfig::default()
    };

    let service = ReleaseService::new(
        packages,
        deployers.clone(),
        Arc::new(InMemoryReleaseRepository::new()),
        deployer_data.clone(),
        &config,
    );

    Harness {
        service,
        deployer,
        deployers,
        deployer_data,
    }
}

impl Harness {
    /// Register another in-memory platform
    pub fn add_platform(&self, name: &str) -> Arc<InMemoryDeployer> {
        let deployer = Arc::new(InMemoryDeployer::new(name));
        self.deployers.register(name, deployer.clone());
        deployer
    }

    /// Wait for the background operation on `name` to finish
    pub async fn settle(&self, name: &str) {
        tokio::time::timeout(Duration::from_secs(10), self.service.wait_until_settled(name))
            .await
            .expect("operation did not settle");
    }

    /// Install `logger` with the given level and wait for it
    pub async fn install_logger(&self, log_level: &str) -> Release {
        let release = self
            .service
            .install(&logger_ref(), "logger", PLATFORM, level(log_level))
            .await
            .unwrap();
        self.settle("logger").await;
        release
    }

    pub async fn release(&self, name: &str, version: u32) -> Info {
        self.service.status(name, Some(version)).await.unwrap()
    }

    pub async fn data(&self, name: &str, version: u32) -> AppDeployerData {
        self.deployer_data
            .find(name, version)
            .await
            .unwrap()
            .unwrap_or_else(|| AppDeployerData::new(name, version))
    }

    /// Wait until the state machine for `name` reaches `phase`
    pub async fn wait_for_phase(&self, name: &str, phase: UpgradePhase) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.service.phase(name) != Some(phase) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("phase not reached");
    }
}
