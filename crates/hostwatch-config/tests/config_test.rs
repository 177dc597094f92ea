#![allow(clippy::unwrap_used)]
// Loading config files through the full figment stack.

use std::path::Path;
use std::time::Duration;

use figment::Jail;
use pretty_assertions::assert_eq;

use hostwatch_api::{HostKeyPolicy, SshAuth};
use hostwatch_config::{ConfigError, load_config};
use hostwatch_core::{SensorKind, SensorValue};

const NAS: &str = r#"
[defaults]
update_interval = 60

[devices.nas]
name = "Storage"
host = "192.168.1.10"
username = "admin"
password = "from-file"
mac_address = "AA-BB-CC-DD-EE-FF"
allow_turn_off = true

[[devices.nas.actions]]
key = "restart_service"
command = "systemctl restart {{ service }}"
required_variables = ["service"]

[[devices.nas.sensor_commands]]
command = "cat /sys/class/thermal/thermal_zone0/temp"
interval = 15
[[devices.nas.sensor_commands.sensors]]
key = "cpu_temp"
kind = "number"
min = 0
max = 120
unit = "°C"

[[devices.nas.sensor_commands]]
command = "systemctl is-active nginx"
[[devices.nas.sensor_commands.sensors]]
key = "nginx"
kind = "binary"
payload_on = "active"
payload_off = "inactive"
set_command = "systemctl {{ 'start' if value == 'active' else 'stop' }} nginx"
"#;

#[test]
fn test_file_is_translated_to_device_settings() {
    Jail::expect_with(|jail| {
        jail.create_file("hostwatch.toml", NAS)?;
        let config = load_config(Some(Path::new("hostwatch.toml"))).unwrap();
        let resolved = config.resolve_all().unwrap();
        assert_eq!(resolved.len(), 1);

        let nas = &resolved[0];
        assert_eq!(nas.device.id, "nas");
        assert_eq!(nas.device.name, "Storage");
        assert_eq!(nas.device.update_interval, Duration::from_secs(60));
        assert_eq!(nas.device.fast_poll_interval, Duration::from_secs(2));
        assert!(nas.device.allow_turn_off);
        assert_eq!(
            nas.device.action("restart_service").unwrap().required_variables,
            vec!["service".to_owned()]
        );

        let temp = &nas.device.sensor_commands[0];
        assert_eq!(temp.interval, Some(Duration::from_secs(15)));
        assert_eq!(
            temp.sensors[0].kind,
            SensorKind::Number {
                min: Some(0.0),
                max: Some(120.0),
                float: false,
            }
        );
        let nginx = &nas.device.sensor_commands[1];
        assert_eq!(nginx.interval, None);
        assert_eq!(
            nginx.sensors[0].kind.parse("active"),
            Some(SensorValue::Bool(true))
        );

        assert_eq!(nas.ssh.port, 22);
        assert_eq!(nas.ssh.username, "admin");
        assert_eq!(
            nas.ssh.mac_address.unwrap().to_string(),
            "aa:bb:cc:dd:ee:ff"
        );
        assert!(matches!(nas.ssh.host_keys, HostKeyPolicy::AcceptAny));
        Ok(())
    });
}

#[test]
fn test_environment_overrides_file() {
    Jail::expect_with(|jail| {
        jail.create_file("hostwatch.toml", NAS)?;
        jail.set_env("HOSTWATCH_DEFAULTS__COMMAND_TIMEOUT", "5");
        jail.set_env("HOSTWATCH_DEVICES__NAS__PORT", "2222");
        jail.set_env("NAS_PASSWORD", "from-env");

        let mut config = load_config(Some(Path::new("hostwatch.toml"))).unwrap();
        config.devices.get_mut("nas").unwrap().password_env = Some("NAS_PASSWORD".into());
        let nas = &config.resolve_all().unwrap()[0];

        assert_eq!(nas.device.command_timeout, Duration::from_secs(5));
        assert_eq!(nas.ssh.port, 2222);
        match &nas.ssh.auth {
            SshAuth::Password(secret) => {
                use secrecy::ExposeSecret;
                assert_eq!(secret.expose_secret(), "from-env");
            }
            SshAuth::KeyFile { .. } => panic!("expected password auth"),
        }
        Ok(())
    });
}

#[test]
fn test_missing_file_yields_defaults() {
    Jail::expect_with(|_jail| {
        let config = load_config(Some(Path::new("absent.toml"))).unwrap();
        assert!(config.devices.is_empty());
        assert_eq!(config.defaults.output, "table");
        Ok(())
    });
}

#[test]
fn test_invalid_port_is_a_validation_error() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "hostwatch.toml",
            r#"
            [devices.pi]
            host = "pi.local"
            port = 0
            password = "x"
            "#,
        )?;
        let err = load_config(Some(Path::new("hostwatch.toml"))).unwrap_err();
        assert!(
            matches!(&err, ConfigError::Validation { field, .. } if field == "devices.pi.port"),
            "{err}"
        );
        Ok(())
    });
}

#[test]
fn test_bad_mac_address_fails_to_load() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "hostwatch.toml",
            r#"
            [devices.pi]
            host = "pi.local"
            password = "x"
            mac_address = "not-a-mac"
            "#,
        )?;
        let err = load_config(Some(Path::new("hostwatch.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Figment(_)));
        Ok(())
    });
}

#[test]
fn test_config_from_tempfile() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        "[devices.pi]\nhost = \"pi.local\"\nidentity_file = \"/keys/pi\"\npreset = \"linux\"\n",
    )
    .unwrap();

    let config = load_config(Some(&path)).unwrap();
    let pi = &config.resolve_all().unwrap()[0];
    assert!(matches!(&pi.ssh.auth, SshAuth::KeyFile { .. }));
    assert!(pi.device.action("turn_off").is_some());
    assert_eq!(pi.ssh.username, "root");
}
