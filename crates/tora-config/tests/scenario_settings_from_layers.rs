use std::time::Duration;

use tora_config::{load_layered_yaml_from_strings, ArchivistSettings};

const BASE: &str = r#"
reddit:
  subreddit: "TranscribersOfReddit"
  debug_subreddit: "ModsOfToR"
  archive_subreddit: "ToR_Archive"
sync:
  service_accounts: ["tor_archivist", "blossom"]
  sweep_window_hours: 18
  sweep_page_size: 500
  sweep_pacing_ms: 1000
schedule:
  cycle_interval_secs: 1800
  archive_every_n_cycles: 1
features:
  full_sweep: true
"#;

const OVERLAY: &str = r#"
sync:
  service_accounts: ["tor_archivist", "blossom", "tor_devbot"]
  sweep_pacing_ms: 0
schedule:
  archive_every_n_cycles: 4
features:
  full_sweep: false
  clear_the_queue: true
"#;

#[test]
fn overlay_values_flow_into_typed_settings() {
    let loaded = load_layered_yaml_from_strings(&[BASE, OVERLAY]).unwrap();
    let s = ArchivistSettings::from_config_json(&loaded.config_json).unwrap();

    assert_eq!(
        s.sync.service_accounts,
        vec!["tor_archivist", "blossom", "tor_devbot"]
    );
    assert_eq!(s.sync.sweep_window, chrono::Duration::hours(18));
    assert_eq!(s.sync.sweep_page_size, 500);
    assert!(s.sync.sweep_pacing.is_zero());

    assert_eq!(s.schedule.cycle_interval, Duration::from_secs(1800));
    assert_eq!(s.schedule.archive_every_n_cycles, 4);

    assert!(!s.features.full_sweep);
    assert!(s.features.clear_the_queue);
    assert!(s.features.track_reports, "untouched toggles keep defaults");
}

#[test]
fn zero_archive_cadence_is_invalid() {
    let loaded =
        load_layered_yaml_from_strings(&[BASE, "schedule:\n  archive_every_n_cycles: 0\n"])
            .unwrap();
    let err = ArchivistSettings::from_config_json(&loaded.config_json)
        .unwrap_err()
        .to_string();
    assert!(err.contains("archive_every_n_cycles"), "{err}");
}

#[test]
fn negative_numbers_are_invalid() {
    let loaded =
        load_layered_yaml_from_strings(&["sync:\n  removal_log_limit: -5\n"]).unwrap();
    assert!(ArchivistSettings::from_config_json(&loaded.config_json).is_err());
}
