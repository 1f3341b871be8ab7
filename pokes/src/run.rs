use anyhow::Context as _;
use std::path::Path;
use std::time::Duration;

use pokes_core::{EngineConfig, LoadTest, SharedWorkUnit};
use pokes_http::{HttpClient, HttpWorkUnit, RequestSupplier, uuid_placeholder};

use crate::cli::RunArgs;
use crate::exit_codes::ExitCode;
use crate::output;
use crate::plan::{Plan, TargetYaml};
use crate::run_error::RunError;

pub async fn run(args: RunArgs) -> Result<ExitCode, RunError> {
    let plan = Plan::load(&args.plan)
        .await
        .map_err(RunError::InvalidInput)?;
    let config = engine_config(&plan, &args);

    let base_dir = args.plan.parent().unwrap_or_else(|| Path::new("."));
    let unit = http_unit(&plan.target, args.url.as_deref(), base_dir)
        .await
        .map_err(RunError::InvalidInput)?;

    let out = output::formatter(args.output);

    let mut lt = LoadTest::with_config(config)
        .context("invalid engine settings")
        .map_err(RunError::InvalidInput)?;
    if let Some(progress) = out.progress() {
        lt = lt.with_progress(progress);
    }
    for (i, stage) in plan.stages.iter().enumerate() {
        let policy = stage
            .policy()
            .with_context(|| format!("invalid stage #{}", i + 1))
            .map_err(RunError::InvalidInput)?;
        lt.add_stage(policy, unit.clone())
            .with_context(|| format!("invalid stage #{}", i + 1))
            .map_err(RunError::InvalidInput)?;
    }

    out.print_header(&args.plan, lt.stages());

    let cancel = lt.cancel_token();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, stopping load test");
            cancel.cancel();
        }
    });

    let result = lt.start().await;
    interrupt.abort();

    let summary = result
        .context("load test failed")
        .map_err(RunError::RuntimeError)?;
    out.print_summary(&summary)
        .map_err(RunError::RuntimeError)?;

    if summary.cancelled {
        return Ok(ExitCode::Interrupted);
    }
    Ok(ExitCode::Success)
}

fn engine_config(plan: &Plan, args: &RunArgs) -> EngineConfig {
    let defaults = EngineConfig::default();
    let settings = &plan.settings;

    EngineConfig {
        headroom_factor: args
            .headroom
            .or(settings.headroom)
            .unwrap_or(defaults.headroom_factor),
        report_interval: args
            .report_interval
            .or(settings.report_interval.map(|d| d.into_inner()))
            .unwrap_or(defaults.report_interval),
        percentiles: args
            .percentiles
            .clone()
            .or_else(|| settings.percentiles.clone())
            .unwrap_or(defaults.percentiles),
        max_failure_messages: settings
            .max_failure_messages
            .unwrap_or(defaults.max_failure_messages),
    }
}

async fn http_unit(
    target: &TargetYaml,
    url_override: Option<&str>,
    base_dir: &Path,
) -> anyhow::Result<SharedWorkUnit> {
    let method = http::Method::from_bytes(target.method.to_ascii_uppercase().as_bytes())
        .with_context(|| format!("invalid http method: {}", target.method))?;
    let url = url_override.unwrap_or(&target.url);
    let parsed = url::Url::parse(url).with_context(|| format!("invalid target url: {url}"))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        anyhow::bail!("target url must be http:// or https://: {url}");
    }

    let mut supplier = RequestSupplier::new(method, url).with_body(target.body(base_dir).await?);
    for (name, value) in &target.headers {
        supplier = supplier.with_header(name, value);
    }
    if let Some(placeholder) = &target.uuid_placeholder {
        supplier = supplier.with_transform(uuid_placeholder(placeholder.clone()));
    }

    let timeout = target
        .timeout
        .map(|d| d.into_inner())
        .unwrap_or(pokes_http::DEFAULT_REQUEST_TIMEOUT);
    if timeout == Duration::ZERO {
        anyhow::bail!("target.timeout must be positive");
    }

    Ok(HttpWorkUnit::with_timeout(HttpClient::default(), supplier, timeout).shared())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Command};
    use clap::Parser as _;

    fn run_args(argv: &[&str]) -> RunArgs {
        match Cli::try_parse_from(argv) {
            Ok(Cli {
                command: Command::Run(args),
                ..
            }) => args,
            Err(err) => panic!("failed to parse args: {err}"),
        }
    }

    #[test]
    fn cli_overrides_plan_settings() {
        let plan = match Plan::parse(
            "target: {url: 'http://x/'}\nstages: [{amount: 1, concurrency: 1}]\nsettings: {headroom: 2, report_interval: 3s, percentiles: [75]}",
        ) {
            Ok(p) => p,
            Err(err) => panic!("parse: {err:#}"),
        };

        let from_plan = engine_config(&plan, &run_args(&["pokes", "run", "p.yaml"]));
        assert_eq!(from_plan.headroom_factor, 2);
        assert_eq!(from_plan.report_interval, Duration::from_secs(3));
        assert_eq!(from_plan.percentiles, vec![75.0]);

        let overridden = engine_config(
            &plan,
            &run_args(&[
                "pokes",
                "run",
                "p.yaml",
                "--headroom",
                "7",
                "--percentiles",
                "90,99",
            ]),
        );
        assert_eq!(overridden.headroom_factor, 7);
        assert_eq!(overridden.report_interval, Duration::from_secs(3));
        assert_eq!(overridden.percentiles, vec![90.0, 99.0]);
    }

    #[tokio::test]
    async fn http_unit_rejects_bad_targets() {
        let plan = |target: &str| match Plan::parse(&format!(
            "target: {target}\nstages: [{{amount: 1, concurrency: 1}}]"
        )) {
            Ok(p) => p,
            Err(err) => panic!("parse: {err:#}"),
        };

        let bad_scheme = plan("{url: 'ftp://x/'}");
        assert!(
            http_unit(&bad_scheme.target, None, Path::new("."))
                .await
                .is_err()
        );

        let bad_method = plan("{url: 'http://x/', method: 'NOT A METHOD'}");
        assert!(
            http_unit(&bad_method.target, None, Path::new("."))
                .await
                .is_err()
        );

        let missing_body = plan("{url: 'http://x/', body_file: 'definitely-missing.json'}");
        assert!(
            http_unit(&missing_body.target, None, Path::new("."))
                .await
                .is_err()
        );

        let overridden = plan("{url: 'ftp://x/'}");
        assert!(
            http_unit(&overridden.target, Some("http://127.0.0.1:1/"), Path::new("."))
                .await
                .is_ok()
        );
    }
}
