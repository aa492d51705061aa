use serde_json::{json, Value};

pub const SERVER: &str = "tcp://broker.local:1883";

/// Instance document with broker settings and the given tables
pub fn instance(tables: Value) -> String {
    json!({
        "id": "drv-1",
        "name": "MQTT",
        "driverType": "mqtt",
        "config": {
            "settings": {"server": SERVER, "username": "user", "password": "secret"}
        },
        "tables": tables
    })
    .to_string()
}

pub fn table(id: &str, topic: &str, parse_script: &str, tags: Value, devices: Value) -> Value {
    json!({
        "id": id,
        "config": {
            "settings": {"topic": topic, "parseScript": parse_script},
            "tags": tags
        },
        "devices": devices
    })
}

/// Table T1 on `sensors/+` with device D1 mapping key k1 to tag t1
pub fn scenario_table(parse_script: &str) -> Value {
    table(
        "T1",
        "sensors/+",
        parse_script,
        json!([{"id": "t1", "name": "Temperature", "key": "k1"}]),
        json!([{"id": "D1"}]),
    )
}

/// Document laid out the way the platform sends it, with `device` for each config layer
pub const PLATFORM_LAYOUT: &str = r#"
{
    "id": "drv-9",
    "name": "Plant MQTT",
    "driverType": "mqtt",
    "device": {
        "settings": {"server": "mqtt://10.1.2.3", "username": "plant", "password": "pw"},
        "tags": [{"id": "status", "key": "st"}]
    },
    "tables": [
        {
            "id": "meters",
            "device": {
                "settings": {"topic": "plant/meters/#", "parseScript": "payload"},
                "tags": [{"id": "energy", "name": "Energy", "key": "e", "unit": "kWh"}]
            },
            "devices": [
                {"id": "M1", "device": {"settings": {"customDeviceId": "serial-001"}}},
                {"id": "M2", "device": null},
                {"id": "M3", "device": {"tags": [{"id": "power", "key": "p"}]}}
            ]
        },
        {
            "id": "empty",
            "device": {"settings": {"topic": "plant/empty"}},
            "devices": []
        },
        {
            "id": "no-script",
            "device": {"settings": {"topic": "plant/other"}},
            "devices": [{"id": "X1"}]
        }
    ]
}
"#;

pub const BAD_PAYLOAD: &str = r#"{"id": "drv", "tables": {"not": "a list"}}"#;
