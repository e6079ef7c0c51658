use super::*;
use serde_json::json;

#[test]
fn test_asset_type_round_trips_through_str() {
    for t in AssetType::ALL {
        assert_eq!(t.as_str().parse::<AssetType>().unwrap(), t);
    }
    assert!("TANK".parse::<AssetType>().is_err());
    // Wire names are upper case only
    assert!("drone".parse::<AssetType>().is_err());
}

#[test]
fn test_asset_status_parse_rejects_unknown() {
    assert_eq!("IDLE".parse::<AssetStatus>().unwrap(), AssetStatus::Idle);
    assert_eq!(
        "SLEEPING".parse::<AssetStatus>(),
        Err(UnknownVariant("SLEEPING".to_string()))
    );
}

#[test]
fn test_bounds_validity() {
    assert!(Bounds::default().is_valid());

    let flat = Bounds {
        min_lng: 35.0,
        max_lng: 35.0,
        min_lat: 47.0,
        max_lat: 48.0,
    };
    assert!(!flat.is_valid());

    let inverted = Bounds {
        min_lng: 35.0,
        max_lng: 36.0,
        min_lat: 48.0,
        max_lat: 47.0,
    };
    assert!(!inverted.is_valid());
}

#[test]
fn test_bounds_clamp() {
    let bounds = Bounds::default();
    let clamped = bounds.clamp(Position::new(40.0, 10.0));
    assert_eq!(clamped, Position::new(36.0, 47.4));
    assert!(bounds.contains(&clamped));
}

#[test]
fn test_asset_update_wire_format() {
    let asset = Asset {
        id: "asset-1".to_string(),
        callsign: "ALPHA-1".to_string(),
        asset_type: AssetType::Drone,
        status: AssetStatus::Active,
        position: Position::new(35.8, 47.5),
        speed: 42.0,
        heading: 90.0,
        target_position: Position::new(35.9, 47.5),
    };
    let ts = chrono::DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
        .unwrap()
        .with_timezone(&Utc);

    let value = serde_json::to_value(asset.snapshot(ts)).unwrap();
    assert_eq!(
        value,
        json!({
            "id": "asset-1",
            "callsign": "ALPHA-1",
            "type": "DRONE",
            "status": "ACTIVE",
            "position": [35.8, 47.5],
            "speed": 42.0,
            "heading": 90.0,
            "timestamp": "2024-01-01T00:00:00Z"
        })
    );
}

#[test]
fn test_status_change_uses_camel_case() {
    let change = StatusChange {
        id: "asset-3".to_string(),
        previous_status: AssetStatus::Active,
        new_status: AssetStatus::Idle,
        timestamp: Utc::now(),
    };
    let value = serde_json::to_value(&change).unwrap();
    assert_eq!(value["previousStatus"], "ACTIVE");
    assert_eq!(value["newStatus"], "IDLE");
}
