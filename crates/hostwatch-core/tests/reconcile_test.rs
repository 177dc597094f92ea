#![allow(clippy::unwrap_used)]
// Dynamic children projected onto the entity registry.

mod common;

use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio::time::sleep;

use hostwatch_core::{
    Capability, DeviceConfig, EntitySource, SensorCommand, SensorKind, SensorSpec, SensorValue,
};

use common::{ScriptedTransport, hub};

fn disk_config() -> DeviceConfig {
    let mut config = DeviceConfig::new("nas");
    config.sensor_commands = vec![
        SensorCommand::new(
            "df-usage",
            vec![
                SensorSpec::new("disk", SensorKind::number())
                    .dynamic()
                    .with_unit("%"),
                SensorSpec::new("hostname", SensorKind::text()),
            ],
        )
        .every(Duration::from_secs(10)),
    ];
    config
}

fn ids(registry: &hostwatch_core::MemoryRegistry) -> Vec<String> {
    registry.snapshot().into_iter().map(|e| e.id).collect()
}

#[tokio::test(start_paused = true)]
async fn test_children_follow_the_latest_successful_read() {
    let (hub, registry) = hub();
    let transport = ScriptedTransport::new("nas");
    transport.reply("df-usage", "sda1 40%\nsdb1 71%\n\nnas01", 0);
    let device = hub.add_device(disk_config(), transport.clone()).unwrap();
    device.setup(true).await.unwrap();
    hub.boundary().flush().await;

    assert_eq!(
        ids(&registry),
        vec![
            "nas.disk_sda1",
            "nas.disk_sdb1",
            "nas.hostname",
            "nas.network_availability",
            "nas.ssh_availability",
        ]
    );
    let child = registry.get("nas.disk_sdb1").unwrap();
    assert_eq!(child.parent.as_deref(), Some("disk"));
    assert_eq!(child.unit.as_deref(), Some("%"));
    assert_eq!(child.capability, Capability::Readable);
    assert_eq!(
        child.source,
        EntitySource::Sensor {
            key: "disk_sdb1".into()
        }
    );
    assert_eq!(
        device.sensors().value("disk_sdb1"),
        Some(SensorValue::Number(71.0))
    );
    assert_eq!(
        device.sensors().value("hostname"),
        Some(SensorValue::Text("nas01".into()))
    );

    // sdb1 disappears, sdc1 appears.
    transport.reply("df-usage", "sda1 41%\nsdc1 12%\n\nnas01", 0);
    sleep(Duration::from_secs(11)).await;
    hub.boundary().flush().await;

    assert_eq!(
        ids(&registry),
        vec![
            "nas.disk_sda1",
            "nas.disk_sdc1",
            "nas.hostname",
            "nas.network_availability",
            "nas.ssh_availability",
        ]
    );
    assert_eq!(device.sensors().get("disk_sdb1"), None);
    assert_eq!(
        device.sensors().pollable_keys(),
        vec![
            "disk_sda1".to_owned(),
            "disk_sdc1".to_owned(),
            "hostname".to_owned()
        ]
    );

    hub.shutdown_all().await;
}

#[tokio::test(start_paused = true)]
async fn test_failed_read_keeps_children() {
    let (hub, registry) = hub();
    let transport = ScriptedTransport::new("nas");
    transport.reply("df-usage", "sda1 40%\n\nnas01", 0);
    let device = hub.add_device(disk_config(), transport.clone()).unwrap();
    device.setup(true).await.unwrap();
    hub.boundary().flush().await;
    let before = ids(&registry);

    transport.reply("df-usage", "", 2);
    sleep(Duration::from_secs(21)).await;
    hub.boundary().flush().await;

    assert_eq!(ids(&registry), before);
    assert!(device.sensors().contains("disk_sda1"));

    hub.shutdown_all().await;
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_removes_children_with_the_device() {
    let (hub, registry) = hub();
    let transport = ScriptedTransport::new("nas");
    transport.reply("df-usage", "sda1 40%\nsdc1 12%\n\nnas01", 0);
    hub.add_device(disk_config(), transport).unwrap();
    hub.setup_all(true).await;
    hub.boundary().flush().await;
    assert_eq!(registry.len(), 5);

    hub.shutdown_all().await;
    assert!(registry.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_on_demand_read_finishing_after_shutdown_registers_nothing() {
    let (hub, registry) = hub();
    let transport = ScriptedTransport::new("nas");
    transport.reply("df-usage", "sda1 40%\n\nnas01", 0);
    let mut config = disk_config();
    config.sensor_commands[0].interval = None;
    let device = hub.add_device(config, transport.clone()).unwrap();
    device.setup(false).await.unwrap();
    hub.boundary().flush().await;
    assert!(registry.get("nas.disk_sda1").is_some());

    transport.reply("df-usage", "sda1 40%\nsdb1 9%\n\nnas01", 0);
    transport.set_latency(Duration::from_secs(5));
    let polling = device.clone();
    let poll = tokio::spawn(async move { polling.poll_sensors(&["disk".to_owned()]).await });
    sleep(Duration::from_secs(1)).await;

    device.shutdown().await;
    let _ = poll.await.unwrap();
    hub.boundary().flush().await;

    assert!(registry.is_empty(), "{:?}", ids(&registry));
    assert_eq!(device.sensors().value("disk_sdb1"), None);
}
