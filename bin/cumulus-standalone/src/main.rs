// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::PathBuf;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use cumulus::disk::StoredDisks;
use cumulus::job;
use cumulus::node::{InterfaceCache, NodeProfile, SysfsInterfaces, SystemClock};
use cumulus::reconcile::{self, Plan, Reconciled};
use cumulus::vpc::StoredVpcs;
use serde_json::json;
use slog::{info, o, warn, Drain, Level, Logger};
use uuid::Uuid;

mod fixture;

use fixture::Backends;

#[derive(Debug, Parser)]
#[clap(about, version)]
/// Drives the cumulus core against a JSON fixture on a single node.
struct Opt {
    /// Node configuration file. Without one, a node with a random id and
    /// default settings is assumed.
    #[clap(short, long, env = "CUMULUS_CONFIG", action)]
    config: Option<PathBuf>,

    /// Enable debugging
    #[clap(short, long, action)]
    debug: bool,

    #[clap(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Validate every instance in a fixture and report the result
    Validate {
        #[clap(action)]
        fixture: PathBuf,
    },

    /// Show the status of every instance in a fixture
    Status {
        #[clap(action)]
        fixture: PathBuf,
    },

    /// Compute what must change on the hypervisor for each active instance
    Plan {
        #[clap(action)]
        fixture: PathBuf,
    },

    /// List the host interfaces usable as uplinks
    Interfaces,
}

/// Create a top-level logger that outputs to stderr
fn create_logger(opt: &Opt) -> Logger {
    let decorator = slog_term::TermDecorator::new().stderr().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let level = if opt.debug { Level::Debug } else { Level::Info };
    let drain = slog::LevelFilter(drain, level).fuse();
    let drain = slog_async::Async::new(drain).build().fuse();

    Logger::root(drain, o!())
}

fn load_config(opt: &Opt) -> anyhow::Result<cumulus_config::Config> {
    match &opt.config {
        Some(path) => cumulus_config::parse(path)
            .with_context(|| format!("parsing config {}", path.display())),
        None => Ok(cumulus_config::Config::new(
            Uuid::new_v4(),
            false,
            "/var/lib/cumulus/disks",
        )),
    }
}

fn validate(log: &Logger, backends: &Backends) -> anyhow::Result<()> {
    let vpcs = StoredVpcs::new(&backends.vpcs);
    for mut inst in backends.stored_instances()? {
        let id = inst.id;
        let report = match inst.validate(&vpcs) {
            Ok(()) => json!({ "instance": id, "valid": true }),
            Err(e) => {
                let Some(failure) = e.validation().cloned() else {
                    return Err(e).with_context(|| {
                        format!("validating instance {:?}", id)
                    });
                };
                json!({ "instance": id, "valid": false, "error": failure })
            }
        };
        info!(log, "validated instance"; "instance" => ?id,
              "valid" => report["valid"].as_bool());
        println!("{report}");
    }
    Ok(())
}

fn status(backends: &Backends) -> anyhow::Result<()> {
    let now = Utc::now();
    for inst in backends.stored_instances()? {
        let view = inst.view(now);
        println!(
            "{}",
            json!({
                "instance": inst.id,
                "name": inst.name,
                "status": view.status.to_string(),
                "uptime": view.uptime,
                "public_mac": view.public_mac,
            })
        );
    }
    Ok(())
}

fn plan(
    log: &Logger,
    config: &cumulus_config::Config,
    backends: &Backends,
) -> anyhow::Result<()> {
    let node = NodeProfile::from(&config.node);
    let pass = Utc::now();
    let purged =
        job::purge_expired(log, &backends.jobs, pass, config.jobs.retention())?;
    if purged > 0 {
        info!(log, "purged expired jobs before planning"; "count" => purged);
    }

    let disks = StoredDisks::new(&backends.disks);
    for inst in backends.stored_instances()? {
        if !inst.is_active() {
            continue;
        }
        let res = reconcile::plan_instance(
            log,
            &backends.jobs,
            &disks,
            &node,
            &inst,
            backends.running_spec(&inst),
            pass,
        )
        .with_context(|| format!("planning instance {:?}", inst.id))?;

        let report = match res {
            Reconciled::Contended => {
                warn!(log, "instance reserved by another node";
                      "instance" => ?inst.id);
                continue;
            }
            Reconciled::Unbuildable(e) => json!({
                "instance": inst.id,
                "action": "fail",
                "error": e.to_string(),
            }),
            Reconciled::Planned(Plan::Create(spec)) => json!({
                "instance": inst.id,
                "action": "create",
                "spec": spec,
            }),
            Reconciled::Planned(Plan::Update { reconfigure, disks }) => json!({
                "instance": inst.id,
                "action": if reconfigure { "reconfigure" } else { "none" },
                "attach": disks.add,
                "detach": disks.remove,
            }),
        };
        println!("{report}");
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let opt = Opt::parse();
    let log = create_logger(&opt);
    let config = load_config(&opt)?;
    let log = log.new(o!("node" => config.node.id.to_string()));

    match &opt.cmd {
        Command::Validate { fixture } => {
            let backends = Backends::new(fixture::load(fixture)?)?;
            validate(&log, &backends)?;
        }
        Command::Status { fixture } => {
            let backends = Backends::new(fixture::load(fixture)?)?;
            status(&backends)?;
        }
        Command::Plan { fixture } => {
            let backends = Backends::new(fixture::load(fixture)?)?;
            plan(&log, &config, &backends)?;
        }
        Command::Interfaces => {
            let cache = InterfaceCache::new(
                &log,
                SysfsInterfaces::new(),
                SystemClock,
                &config.network,
            );
            for iface in cache.interfaces().context("listing interfaces")? {
                println!("{iface}");
            }
        }
    }

    Ok(())
}
