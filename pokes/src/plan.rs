use anyhow::Context as _;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use pokes_core::StagePolicy;

/// YAML load test plan: one target and an ordered list of stages.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct Plan {
    pub target: TargetYaml,

    pub stages: Vec<StageYaml>,

    #[serde(default)]
    pub settings: SettingsYaml,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct TargetYaml {
    #[serde(default = "default_method")]
    pub method: String,

    pub url: String,

    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    pub body: Option<String>,

    /// Read the body from a file, relative to the plan.
    pub body_file: Option<PathBuf>,

    pub timeout: Option<YamlDuration>,

    /// Replaced by a fresh UUID in the body of every request.
    pub uuid_placeholder: Option<String>,
}

fn default_method() -> String {
    "GET".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum StageYaml {
    Rate(RateStageYaml),
    Volume(VolumeStageYaml),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RateStageYaml {
    pub rate: u64,
    pub duration: YamlDuration,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct VolumeStageYaml {
    pub amount: u64,
    pub concurrency: usize,
}

impl StageYaml {
    pub fn policy(&self) -> pokes_core::Result<StagePolicy> {
        match self {
            Self::Rate(s) => StagePolicy::rate(s.rate, s.duration.into_inner()),
            Self::Volume(s) => StagePolicy::volume(s.amount, s.concurrency),
        }
    }
}

/// Engine overrides; CLI flags take precedence.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct SettingsYaml {
    pub headroom: Option<u32>,

    pub report_interval: Option<YamlDuration>,

    pub percentiles: Option<Vec<f64>>,

    pub max_failure_messages: Option<usize>,
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct YamlDuration(Duration);

impl YamlDuration {
    pub fn into_inner(self) -> Duration {
        self.0
    }
}

impl<'de> Deserialize<'de> for YamlDuration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct V;

        impl serde::de::Visitor<'_> for V {
            type Value = YamlDuration;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("duration as string (e.g. 10s, 5m) or integer seconds")
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(YamlDuration(Duration::from_secs(v)))
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                if v <= 0 {
                    return Err(E::custom("duration must be positive"));
                }
                Ok(YamlDuration(Duration::from_secs(v as u64)))
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                let d = humantime::parse_duration(v).map_err(E::custom)?;
                Ok(YamlDuration(d))
            }
        }

        deserializer.deserialize_any(V)
    }
}

impl Plan {
    pub fn parse(yaml: &str) -> anyhow::Result<Self> {
        let plan: Self = serde_yaml::from_str(yaml).context("invalid plan yaml")?;
        if plan.stages.is_empty() {
            anyhow::bail!("plan has no stages (add at least one rate or volume stage)");
        }
        if plan.target.body.is_some() && plan.target.body_file.is_some() {
            anyhow::bail!("target.body and target.body_file are mutually exclusive");
        }
        Ok(plan)
    }

    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        let yaml = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read plan: {}", path.display()))?;
        Self::parse(&yaml).with_context(|| format!("failed to load plan: {}", path.display()))
    }
}

impl TargetYaml {
    /// Request body, reading `body_file` relative to `base_dir`.
    pub async fn body(&self, base_dir: &Path) -> anyhow::Result<Vec<u8>> {
        match (&self.body, &self.body_file) {
            (Some(body), _) => Ok(body.clone().into_bytes()),
            (None, Some(file)) => {
                let path = base_dir.join(file);
                tokio::fs::read(&path)
                    .await
                    .with_context(|| format!("failed to read body file: {}", path.display()))
            }
            (None, None) => Ok(Vec::new()),
        }
    }
}
