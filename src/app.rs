use std::sync::Arc;

use kube::{Client, CustomResourceExt};
use tokio::runtime::{self, Runtime};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::{
    api::{ClusterLogForwarder, LogFileMetricExporter},
    cli::{Opts, RootOpts, SubCommand},
    controller, generate,
    internal_events::{OperatorStarted, OperatorStopped},
    signal::{self, SignalTo},
    telemetry::Telemetry,
    trace,
};

pub struct Application {
    opts: RootOpts,
    sub_command: Option<SubCommand>,
    runtime: Runtime,
}

impl Application {
    pub fn prepare() -> Result<Self, exitcode::ExitCode> {
        let opts = Opts::get_matches().map_err(|error| {
            // Printing to stdout/err can't be avoided here.
            let _ = error.print();
            if error.use_stderr() {
                exitcode::USAGE
            } else {
                exitcode::OK
            }
        })?;
        Self::prepare_from_opts(opts)
    }

    pub fn prepare_from_opts(opts: Opts) -> Result<Self, exitcode::ExitCode> {
        let level = std::env::var("LOG").unwrap_or_else(|_| trace::directives(opts.log_level()));
        trace::init(opts.root.use_color(), opts.root.json(), &level);

        let runtime = runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("operator-worker")
            .build()
            .map_err(|error| {
                error!(message = "Failed to build async runtime.", %error);
                exitcode::OSERR
            })?;

        Ok(Self {
            opts: opts.root,
            sub_command: opts.sub_command,
            runtime,
        })
    }

    pub fn run(self) -> exitcode::ExitCode {
        match &self.sub_command {
            Some(SubCommand::Crd) => print_crds(),
            Some(SubCommand::Generate(generate)) => generate::cmd(generate),
            None => self.runtime.block_on(serve(self.opts)),
        }
    }
}

fn print_crds() -> exitcode::ExitCode {
    let crds = [ClusterLogForwarder::crd(), LogFileMetricExporter::crd()];
    let mut documents = Vec::with_capacity(crds.len());
    for crd in crds {
        match serde_yaml::to_string(&crd) {
            Ok(document) => documents.push(document),
            Err(error) => {
                error!(message = "Failed to serialize custom resource definition.", %error);
                return exitcode::SOFTWARE;
            }
        }
    }
    #[allow(clippy::print_stdout)]
    {
        print!("{}", documents.join("---\n"));
    }
    exitcode::OK
}

async fn serve(opts: RootOpts) -> exitcode::ExitCode {
    let config = opts.operator;
    let client = match Client::try_default().await {
        Ok(client) => client,
        Err(error) => {
            error!(message = "Could not connect to the cluster.", %error);
            return exitcode::UNAVAILABLE;
        }
    };

    emit!(OperatorStarted {
        namespace: config.watch_namespace.as_deref(),
        concurrency: config.concurrency,
    });
    let telemetry = Arc::new(Telemetry::init());
    let shutdown = CancellationToken::new();
    let controllers = controller::run(client, &config, Arc::clone(&telemetry), shutdown.clone());
    tokio::pin!(controllers);

    tokio::select! {
        _ = &mut controllers => info!(message = "Controllers exited."),
        to = signal::signal() => match to {
            SignalTo::Shutdown => {
                info!(message = "Shutting down, waiting for running reconciles to finish.");
                shutdown.cancel();
                tokio::select! {
                    _ = &mut controllers => (),
                    // A second signal skips the drain.
                    _ = signal::signal() => info!(message = "Skipping the drain."),
                }
            }
            SignalTo::Quit => shutdown.cancel(),
        },
    }

    telemetry.teardown();
    emit!(OperatorStopped);
    exitcode::OK
}
