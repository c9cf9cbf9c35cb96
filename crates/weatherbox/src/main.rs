use std::path::PathBuf;
use std::pin::pin;
use std::rc::Rc;

use bus_manager::{BusFactory, BusId};
use clap::Parser;
use embassy_futures::select::{select, Either};
use embedded_hal_async::i2c::I2c;
use tokio::task::LocalSet;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use weatherbox::sim::{SimFactory, SimulatedBus, SimulatedSps30};
use weatherbox::{
    Arbiter, Config, I2cLink, JsonLinesSink, ParticulateSensor, SensorKind, SensorRegistry,
    StoreSchedule,
};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Parser)]
#[command(name = "weatherbox", about = "Weather station sensor service")]
struct Args {
    /// JSON configuration file. Built-in defaults are used when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Talk to simulated sensors instead of /dev/i2c-* devices
    #[arg(long, default_value_t = false)]
    simulate: bool,

    /// Directory for stored measurements, overriding the configuration
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

fn main() -> Result<(), BoxError> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(dir) = args.data_dir {
        config.data_dir = dir;
    }

    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
    let local = LocalSet::new();

    if args.simulate {
        info!("using simulated sensors");
        return local.block_on(&runtime, run(&config, simulated_arbiter(&config)?));
    }

    #[cfg(target_os = "linux")]
    {
        local.block_on(&runtime, run(&config, linux_arbiter(&config)?))
    }
    #[cfg(not(target_os = "linux"))]
    {
        Err("I2C device nodes are only supported on Linux, use --simulate".into())
    }
}

#[cfg(target_os = "linux")]
fn linux_arbiter(
    config: &Config,
) -> Result<Arbiter<weatherbox::transport::LinuxBusFactory>, BoxError> {
    let mut arbiter = Arbiter::new();
    for bus in &config.buses {
        arbiter
            .register(BusId(bus.id), bus.device.clone())
            .map_err(|e| e.to_string())?;
    }
    Ok(arbiter)
}

/// One simulated bus per configured bus, with an SPS30 at every configured
/// sensor address.
fn simulated_arbiter(config: &Config) -> Result<Arbiter<SimFactory>, BoxError> {
    let mut arbiter = Arbiter::new();
    for bus in &config.buses {
        let sim = config
            .sensors
            .iter()
            .filter(|s| s.bus == bus.id)
            .fold(SimulatedBus::new(), |sim, s| {
                sim.with_device(SimulatedSps30::with_address(s.address))
            });
        arbiter
            .register(BusId(bus.id), sim)
            .map_err(|e| e.to_string())?;
    }
    Ok(arbiter)
}

async fn run<F>(config: &Config, arbiter: Arbiter<F>) -> Result<(), BoxError>
where
    F: BusFactory + 'static,
    F::Bus: I2c,
{
    let arbiter = Rc::new(arbiter);
    for id in arbiter.bus_ids() {
        match arbiter.open(id).await {
            Ok(()) => info!(bus = %id, "bus open"),
            Err(e) => error!(bus = %id, error = %e, "cannot open bus"),
        }
    }

    let sink = JsonLinesSink::new(&config.data_dir);
    let mut schedule = StoreSchedule::new();
    let mut sensors = Vec::with_capacity(config.sensors.len());
    for (index, sensor) in config.sensors.iter().enumerate() {
        let link = I2cLink::new(arbiter.clone(), BusId(sensor.bus), sensor.address);
        match sensor.kind {
            SensorKind::Sps30 => sensors.push(ParticulateSensor::new(
                sensor.name.as_str(),
                sensor.enabled,
                link,
                sensor.particulate_settings(),
                sink.clone(),
            )),
        }
        if sensor.enabled {
            schedule.add(index, sensor.store_interval());
        }
    }

    let mut registry = SensorRegistry::new(sensors);
    if !registry.initialize_all().await {
        warn!("not every sensor is ready");
    }
    info!(report = %serde_json::to_string(&registry.get_status())?, "sensor status");

    let mut shutdown = pin!(tokio::signal::ctrl_c());
    loop {
        match select(shutdown.as_mut(), schedule.next()).await {
            Either::First(result) => {
                result?;
                break;
            }
            Either::Second(Some(index)) => registry.read_and_store(index).await,
            Either::Second(None) => {
                info!("no sensors to store, waiting for shutdown");
                shutdown.as_mut().await?;
                break;
            }
        }
    }

    info!("shutting down");
    let failures = registry.shutdown().await;
    if !failures.is_empty() {
        warn!(count = failures.len(), "some sensors did not shut down cleanly");
    }
    if let Err(e) = arbiter.close_all().await {
        warn!(error = %e, "failed to close buses");
    }
    Ok(())
}
