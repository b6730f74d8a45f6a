use std::env;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use worker_core::{ProtocolVersion, WorkerConfig};

const ENV_APP: &str = "COCAINE_WORKER_APP";
const ENV_UUID: &str = "COCAINE_WORKER_UUID";
const ENV_ENDPOINT: &str = "COCAINE_WORKER_ENDPOINT";
const ENV_PROTOCOL: &str = "COCAINE_WORKER_PROTOCOL";
const ENV_DISOWN_TIMEOUT: &str = "COCAINE_WORKER_DISOWN_TIMEOUT";
const ENV_HEARTBEAT_TIMEOUT: &str = "COCAINE_WORKER_HEARTBEAT_TIMEOUT";

/// Resolves the worker's configuration: flags first, then environment
/// (mirroring the platform's own `--app`/`--uuid`/`--endpoint` discovery),
/// then defaults. `WorkerConfig::new` does the actual validation
/// (heartbeat > disown).
pub fn load() -> Result<WorkerConfig> {
    let cli = Cli::parse(env::args().skip(1))?;

    let app = cli
        .app
        .or_else(|| env::var(ENV_APP).ok())
        .context(format!("missing app name (--app or {ENV_APP})"))?;
    let uuid = cli
        .uuid
        .or_else(|| env::var(ENV_UUID).ok())
        .context(format!("missing worker uuid (--uuid or {ENV_UUID})"))?;
    let endpoint = cli
        .endpoint
        .or_else(|| env::var(ENV_ENDPOINT).ok())
        .context(format!("missing socket endpoint (--endpoint or {ENV_ENDPOINT})"))?;

    let protocol = match cli.protocol.or_else(|| env::var(ENV_PROTOCOL).ok()) {
        Some(raw) => parse_protocol(&raw)?,
        None => ProtocolVersion::V1,
    };

    let disown_timeout = match cli.disown_timeout.or_else(|| env::var(ENV_DISOWN_TIMEOUT).ok()) {
        Some(raw) => parse_duration(&raw)?,
        None => WorkerConfig::default_disown_timeout(),
    };
    let heartbeat_timeout =
        match cli.heartbeat_timeout.or_else(|| env::var(ENV_HEARTBEAT_TIMEOUT).ok()) {
            Some(raw) => parse_duration(&raw)?,
            None => WorkerConfig::default_heartbeat_timeout(),
        };

    WorkerConfig::new(uuid, app, endpoint, protocol, disown_timeout, heartbeat_timeout)
        .map_err(anyhow::Error::from)
}

fn parse_protocol(raw: &str) -> Result<ProtocolVersion> {
    match raw {
        "0" | "v0" => Ok(ProtocolVersion::V0),
        "1" | "v1" => Ok(ProtocolVersion::V1),
        other => bail!("invalid protocol version: {other} (expected v0 or v1)"),
    }
}

fn parse_duration(raw: &str) -> Result<Duration> {
    if let Ok(secs) = raw.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(raw).context(format!("invalid duration: {raw}"))
}

#[derive(Debug, Default)]
struct Cli {
    app: Option<String>,
    uuid: Option<String>,
    endpoint: Option<String>,
    protocol: Option<String>,
    disown_timeout: Option<String>,
    heartbeat_timeout: Option<String>,
}

impl Cli {
    fn parse<I>(mut args: I) -> Result<Self>
    where
        I: Iterator<Item = String>,
    {
        let mut cli = Cli::default();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--app" => cli.app = Some(next_value(&mut args, "--app")?),
                "--uuid" => cli.uuid = Some(next_value(&mut args, "--uuid")?),
                "--endpoint" => cli.endpoint = Some(next_value(&mut args, "--endpoint")?),
                "--protocol" => cli.protocol = Some(next_value(&mut args, "--protocol")?),
                "--disown-timeout" => {
                    cli.disown_timeout = Some(next_value(&mut args, "--disown-timeout")?)
                }
                "--heartbeat-timeout" => {
                    cli.heartbeat_timeout = Some(next_value(&mut args, "--heartbeat-timeout")?)
                }
                "-h" | "--help" => bail!(
                    "usage: worker --app NAME --uuid UUID --endpoint PATH \
                     [--protocol v0|v1] [--disown-timeout SECS] [--heartbeat-timeout SECS]"
                ),
                other => bail!("unknown argument: {other}"),
            }
        }

        Ok(cli)
    }
}

fn next_value<I>(args: &mut I, flag: &str) -> Result<String>
where
    I: Iterator<Item = String>,
{
    args.next().context(format!("missing value for {flag}"))
}
