// ── Command output to sensor readings ──
//
// Output is consumed line by line in sensor declaration order. A static
// sensor takes one line. A dynamic sensor takes every line up to the next
// empty line (or EOF), each split once into `child_id value`.

use crate::model::{SensorSpec, SensorValue};

/// Reading for one declared sensor.
#[derive(Debug, Clone, PartialEq)]
pub enum Reading {
    Static(Option<SensorValue>),
    /// `(raw child id, value)` in reported order.
    Dynamic(Vec<(String, Option<SensorValue>)>),
}

/// Split `stdout` into one [`Reading`] per sensor in `sensors`.
pub fn parse_output(sensors: &[SensorSpec], stdout: &str) -> Vec<Reading> {
    let mut lines = stdout.lines();

    sensors
        .iter()
        .map(|spec| {
            if spec.dynamic {
                let children = lines
                    .by_ref()
                    .take_while(|line| !line.trim().is_empty())
                    .filter_map(|line| split_child(line, spec.separator.as_deref()))
                    .map(|(id, raw)| (id.to_owned(), spec.kind.parse(raw)))
                    .collect();
                Reading::Dynamic(children)
            } else {
                Reading::Static(lines.next().and_then(|line| spec.kind.parse(line)))
            }
        })
        .collect()
}

fn split_child<'a>(line: &'a str, separator: Option<&str>) -> Option<(&'a str, &'a str)> {
    let line = line.trim();
    let (id, value) = match separator {
        Some(sep) if !sep.trim().is_empty() => line.split_once(sep)?,
        _ => line.split_once(char::is_whitespace)?,
    };
    let id = id.trim();
    (!id.is_empty()).then_some((id, value.trim()))
}

/// Entity key for a dynamic child: `{parent}_{slug(id)}`.
pub fn child_key(parent: &str, raw_id: &str) -> String {
    let mut slug = String::with_capacity(raw_id.len());
    for c in raw_id.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('_') {
            slug.push('_');
        }
    }
    let slug = slug.trim_matches('_');
    format!("{parent}_{slug}")
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::model::SensorKind;

    #[test]
    fn static_sensors_take_one_line_each() {
        let sensors = vec![
            SensorSpec::new("hostname", SensorKind::text()),
            SensorSpec::new("load", SensorKind::number()),
        ];
        let readings = parse_output(&sensors, "nas01\n0.42\n");
        assert_eq!(
            readings,
            vec![
                Reading::Static(Some(SensorValue::Text("nas01".into()))),
                Reading::Static(Some(SensorValue::Number(0.42))),
            ]
        );
    }

    #[test]
    fn missing_lines_read_as_none() {
        let sensors = vec![
            SensorSpec::new("a", SensorKind::text()),
            SensorSpec::new("b", SensorKind::text()),
        ];
        let readings = parse_output(&sensors, "only\n");
        assert_eq!(readings[1], Reading::Static(None));
    }

    #[test]
    fn dynamic_sensor_stops_at_blank_line() {
        let sensors = vec![
            SensorSpec::new("cpu", SensorKind::number()).dynamic(),
            SensorSpec::new("uptime", SensorKind::number()),
        ];
        let readings = parse_output(&sensors, "core0 41\ncore1 43\n\n1200\n");
        assert_eq!(
            readings,
            vec![
                Reading::Dynamic(vec![
                    ("core0".into(), Some(SensorValue::Number(41.0))),
                    ("core1".into(), Some(SensorValue::Number(43.0))),
                ]),
                Reading::Static(Some(SensorValue::Number(1200.0))),
            ]
        );
    }

    #[test]
    fn dynamic_sensor_honours_separator() {
        let mut spec = SensorSpec::new("shares", SensorKind::text()).dynamic();
        spec.separator = Some(",".into());
        let readings = parse_output(&[spec], "/mnt/media,ok\n/mnt/backup , degraded\n");
        assert_eq!(
            readings,
            vec![Reading::Dynamic(vec![
                ("/mnt/media".into(), Some(SensorValue::Text("ok".into()))),
                ("/mnt/backup".into(), Some(SensorValue::Text("degraded".into()))),
            ])]
        );
    }

    #[test]
    fn child_keys_are_slugged() {
        assert_eq!(child_key("shares", "/mnt/Media Disk"), "shares_mnt_media_disk");
        assert_eq!(child_key("cpu", "core0"), "cpu_core0");
    }
}
