use std::fs;
use std::net::IpAddr;
use std::path::PathBuf;

use hashbrown::HashMap;
use log::info;

use manet_core::app::Application;
use manet_core::error::{ExperimentError, ResourceError};
use manet_core::node::AppId;
use manet_core::scheduler::StepScheduler;
use manet_models::dist::SeedBank;
use manet_models::monitor::{FlowMonitor, ReconciledFlows};
use manet_models::net::aodv::{AodvInstaller, AodvRouter};
use manet_models::net::routing::{RoutingBinding, RoutingInstaller, RoutingProtocol};
use manet_models::traffic::endpoint::{DefaultEndpoints, Endpoint, FlowEndpointFactory};
use manet_output::capture::FrameCapture;
use manet_output::report::FlowReport;
use manet_output::result::Results;
use manet_runner::runner::run_simulation;

use crate::manet::bucket::{MediumBucket, MediumModels};
use crate::simulation::config::ExperimentConfig;
use crate::simulation::fabric::{install_fabric, LinkFabric};
use crate::simulation::topology::{build_topology, Topology};
use crate::simulation::traffic::install_traffic;

/// Phase markers. Each phase can be entered only from the one before it.
pub struct Configured;

pub struct Placed {
    topology: Topology,
}

pub struct Addressed {
    topology: Topology,
    fabric: LinkFabric,
}

pub struct Routed<P: RoutingProtocol> {
    topology: Topology,
    fabric: LinkFabric,
    routing: RoutingBinding<P>,
}

pub struct Ready<P: RoutingProtocol, A> {
    topology: Topology,
    fabric: LinkFabric,
    routing: RoutingBinding<P>,
    monitor: FlowMonitor,
    apps: HashMap<AppId, A>,
}

/// Final counters of a run together with where the report was written.
#[derive(Debug, Clone)]
pub struct ExperimentOutcome {
    pub flows: ReconciledFlows,
    pub addresses: Vec<IpAddr>,
    pub report_path: PathBuf,
}

/// An experiment moving through its phases:
/// `Configured -> Placed -> Addressed -> Routed -> Ready -> run`.
pub struct Experiment<S> {
    config: ExperimentConfig,
    seeds: SeedBank,
    state: S,
}

impl<S> Experiment<S> {
    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }
}

impl Experiment<Configured> {
    pub fn new(config: ExperimentConfig) -> Self {
        let seeds = SeedBank::new(config.seed());
        info!(
            "Experiment {} with seed {}",
            config.base().simulation_settings.scenario,
            seeds.seed()
        );
        Self {
            config,
            seeds,
            state: Configured,
        }
    }

    pub fn build_topology(self) -> Result<Experiment<Placed>, ExperimentError> {
        let topology = build_topology(&self.config, &self.seeds)?;
        Ok(Experiment {
            config: self.config,
            seeds: self.seeds,
            state: Placed { topology },
        })
    }
}

impl Experiment<Placed> {
    pub fn topology(&self) -> &Topology {
        &self.state.topology
    }

    pub fn install_fabric(self) -> Result<Experiment<Addressed>, ExperimentError> {
        let mut topology = self.state.topology;
        let link_settings = &self.config.base().link_settings;
        let fabric = install_fabric(
            &mut topology.nodes,
            self.config.prefix(),
            link_settings.channel,
            self.config.capture_prefix(),
            &self.seeds,
        )?;
        Ok(Experiment {
            config: self.config,
            seeds: self.seeds,
            state: Addressed { topology, fabric },
        })
    }
}

impl Experiment<Addressed> {
    pub fn topology(&self) -> &Topology {
        &self.state.topology
    }

    pub fn fabric(&self) -> &LinkFabric {
        &self.state.fabric
    }

    /// Installs the AODV reference router configured in `routing_settings`.
    pub fn install_routing(self) -> Result<Experiment<Routed<AodvRouter>>, ExperimentError> {
        let installer = AodvInstaller {
            settings: self.config.base().routing_settings.aodv,
        };
        self.install_routing_with(&installer)
    }

    pub fn install_routing_with<I: RoutingInstaller>(
        self,
        installer: &I,
    ) -> Result<Experiment<Routed<I::Protocol>>, ExperimentError> {
        let routing = RoutingBinding::bind(
            installer,
            self.config.base().routing_settings.protocol,
            &self.state.fabric.prefix,
            self.state.topology.node_count(),
            self.config.print_routes_at(),
        )?;
        Ok(Experiment {
            config: self.config,
            seeds: self.seeds,
            state: Routed {
                topology: self.state.topology,
                fabric: self.state.fabric,
                routing,
            },
        })
    }
}

impl<P: RoutingProtocol> Experiment<Routed<P>> {
    pub fn traffic_enabled(&self) -> bool {
        self.config.traffic_enabled()
    }

    pub fn routing(&self) -> &RoutingBinding<P> {
        &self.state.routing
    }

    /// Installs the default sinks and sources for every configured flow.
    pub fn install_traffic(self) -> Result<Experiment<Ready<P, Endpoint>>, ExperimentError> {
        self.install_traffic_with(&DefaultEndpoints)
    }

    pub fn install_traffic_with<F: FlowEndpointFactory>(
        self,
        factory: &F,
    ) -> Result<Experiment<Ready<P, F::Endpoint>>, ExperimentError> {
        let flows = self.config.flows();
        let monitor = FlowMonitor::attach(self.config.base().monitor_settings.clone(), flows)?;
        let apps = install_traffic(factory, flows, &self.state.topology.nodes, &self.seeds)?;
        Ok(self.into_ready(monitor, apps))
    }

    /// Runs without any flow. The report then lists no flow.
    pub fn skip_traffic(self) -> Result<Experiment<Ready<P, Endpoint>>, ExperimentError> {
        info!("Traffic is disabled, no flow is installed");
        let monitor = FlowMonitor::attach(self.config.base().monitor_settings.clone(), &[])?;
        Ok(self.into_ready(monitor, HashMap::new()))
    }

    fn into_ready<A>(self, monitor: FlowMonitor, apps: HashMap<AppId, A>) -> Experiment<Ready<P, A>> {
        Experiment {
            config: self.config,
            seeds: self.seeds,
            state: Ready {
                topology: self.state.topology,
                fabric: self.state.fabric,
                routing: self.state.routing,
                monitor,
                apps,
            },
        }
    }
}

impl<P, A> Experiment<Ready<P, A>>
where
    P: RoutingProtocol,
    A: Application<MediumBucket<P>>,
{
    pub fn app_count(&self) -> usize {
        self.state.apps.len()
    }

    fn build_bucket(
        config: &ExperimentConfig,
        state: Ready<P, A>,
    ) -> Result<(MediumBucket<P>, HashMap<AppId, A>, Vec<IpAddr>), ExperimentError> {
        let output_dir = config.output_dir();
        let output_settings = &config.base().output_settings;
        let needs_output_dir = !output_settings.outputs.is_empty()
            || state.fabric.capture_prefix.is_some()
            || config.routes_path().is_some();
        if needs_output_dir && !output_dir.exists() {
            fs::create_dir_all(&output_dir).map_err(|e| ResourceError::write(&output_dir, e))?;
        }

        let results = Results::new(&output_dir, output_settings)?;
        let capture = match &state.fabric.capture_prefix {
            Some(prefix) => Some(FrameCapture::new(prefix)?),
            None => None,
        };
        let addresses = state.fabric.addresses.clone();
        let models = MediumModels::builder()
            .trajectories(state.topology.trajectories())
            .addresses(addresses.clone())
            .channel(state.fabric.channel)
            .routing(state.routing)
            .monitor(state.monitor)
            .results(results)
            .output_interval(output_settings.output_interval)
            .capture(capture)
            .routes_file(config.routes_path())
            .build();
        let bucket = MediumBucket::builder()
            .models(models)
            .step_size(config.step_size())
            .build();
        Ok((bucket, state.apps, addresses))
    }

    /// Runs the engine to the end, reconciles the counters and writes the report.
    pub fn run(self) -> Result<ExperimentOutcome, ExperimentError> {
        let config = self.config;
        let (bucket, apps, addresses) = Self::build_bucket(&config, self.state)?;
        info!(
            "Running {} applications for {} ms",
            apps.len(),
            config.duration()
        );

        let scheduler = StepScheduler::builder()
            .bucket(bucket)
            .duration(config.duration())
            .step_size(config.step_size())
            .inactive_apps(apps)
            .build();
        let bucket = run_simulation(scheduler)?;
        let flows = bucket.into_monitor().reconcile();

        let report_path = config.report_path();
        FlowReport::builder()
            .flows(&flows)
            .addresses(&addresses)
            .family(config.prefix().family())
            .build()
            .write_to(&report_path)?;

        Ok(ExperimentOutcome {
            flows,
            addresses,
            report_path,
        })
    }
}
