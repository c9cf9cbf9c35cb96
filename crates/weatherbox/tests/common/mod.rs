#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use bus_manager::BusId;
use weatherbox::error::SinkError;
use weatherbox::sim::{SimFactory, SimulatedBus, SimulatedSps30};
use weatherbox::{
    Arbiter, History, I2cLink, ParticulateReading, ParticulateRecord, ParticulateSensor,
    ParticulateSettings, PersistenceSink,
};

pub const BUS0: BusId = BusId(0);
pub const BUS1: BusId = BusId(1);

pub type SimSensor = ParticulateSensor<SimFactory, MemorySink>;

/// Keeps stored records in memory; clones share the same list.
#[derive(Clone, Default)]
pub struct MemorySink {
    records: Rc<RefCell<Vec<(String, ParticulateRecord)>>>,
}

impl MemorySink {
    pub fn records(&self) -> Vec<(String, ParticulateRecord)> {
        self.records.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.records.borrow().len()
    }
}

impl PersistenceSink<ParticulateRecord> for MemorySink {
    fn store(&mut self, sensor: &str, record: &ParticulateRecord) -> Result<(), SinkError> {
        self.records.borrow_mut().push((sensor.to_owned(), record.clone()));
        Ok(())
    }
}

pub fn settings() -> ParticulateSettings {
    ParticulateSettings::default()
}

/// An arbiter over the given simulated buses, all opened.
pub async fn station(buses: Vec<(BusId, SimulatedBus)>) -> Rc<Arbiter<SimFactory>> {
    let mut arbiter = Arbiter::new();
    for (id, bus) in buses {
        arbiter.register(id, bus).unwrap();
    }
    arbiter.open_all().await.unwrap();
    Rc::new(arbiter)
}

/// One SPS30 alone on bus 0.
pub async fn single_device() -> (Rc<Arbiter<SimFactory>>, SimulatedSps30) {
    let device = SimulatedSps30::new();
    let arbiter = station(vec![(BUS0, SimulatedBus::new().with_device(device.clone()))]).await;
    (arbiter, device)
}

pub fn sensor(
    arbiter: &Rc<Arbiter<SimFactory>>,
    name: &str,
    bus: BusId,
    device: &SimulatedSps30,
    sink: &MemorySink,
) -> SimSensor {
    sensor_with(arbiter, name, bus, device, sink, true, settings())
}

pub fn sensor_with(
    arbiter: &Rc<Arbiter<SimFactory>>,
    name: &str,
    bus: BusId,
    device: &SimulatedSps30,
    sink: &MemorySink,
    enabled: bool,
    settings: ParticulateSettings,
) -> SimSensor {
    let link = I2cLink::new(arbiter.clone(), bus, device.address());
    ParticulateSensor::new(name, enabled, link, settings, sink.clone())
}

/// Wait, bounded, until the history satisfies `f`.
pub async fn wait_for_history(
    sensor: &SimSensor,
    f: impl FnMut(&History<ParticulateReading>) -> bool,
) {
    let mut rx = sensor.history().expect("sampler was started");
    tokio::time::timeout(Duration::from_secs(60), rx.wait_for(f))
        .await
        .expect("history condition not reached in time")
        .expect("sampler dropped its history");
}
