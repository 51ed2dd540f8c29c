mod common;

use iactpipe::io::{
    open_event_source, ArrayEvent, DataLevel, DataWriter, DataWriterConfig, EventSource,
    EventSourceConfig, SimulationEventSource,
};
use iactpipe::PipeError;

#[test]
fn test_open_simulation_file() {
    common::init_logger();
    let source = open_event_source(&common::gamma_sample(), EventSourceConfig::default()).unwrap();

    assert_eq!(source.backend_name(), "SimulationEventSource");
    assert!(source.is_simulation());
    assert_eq!(source.obs_ids(), vec![1, 2]);
    assert_eq!(source.subarray().name, "prod5_south_mini");
    assert_eq!(source.subarray().n_tels(), 4);
    assert!(source.datalevels().contains(&DataLevel::Dl2));
    assert_eq!(source.simulation_config().len(), 2);

    let distributions = source.simulated_shower_distributions();
    assert_eq!(distributions.len(), 2);
    assert!(distributions.values().all(|d| d.total() == 50_000));

    let events: Vec<ArrayEvent> = source.collect::<Result<_, _>>().unwrap();
    assert_eq!(events.len(), 5);
    assert_eq!(events[1].tels_with_trigger().as_slice(), &[2, 4]);
    assert_eq!(events[4].tels_with_trigger().len(), 4);
}

#[test]
fn test_written_output_is_a_source_again() {
    common::init_logger();
    let (_dir, output) = common::tmp_output("dl1");

    let mut source =
        SimulationEventSource::open(&common::gamma_sample(), EventSourceConfig::default()).unwrap();
    let mut writer = DataWriter::new(DataWriterConfig::new(output.clone())).unwrap();
    for event in &mut source {
        writer.write_event(&event.unwrap()).unwrap();
    }
    let summary = writer.finish(&source).unwrap();
    assert_eq!(summary.n_events, 5);
    assert_eq!(summary.n_shower_distributions, 2);

    let reopened = open_event_source(&output, EventSourceConfig::default()).unwrap();
    assert_eq!(reopened.backend_name(), "TableEventSource");
    assert!(reopened.is_simulation());
    assert_eq!(
        reopened.simulated_shower_distributions(),
        source.simulated_shower_distributions()
    );
    assert_eq!(reopened.simulation_config(), source.simulation_config());
    assert_eq!(reopened.count(), 5);
}

#[test]
fn test_unknown_input() {
    let (_dir, path) = common::tmp_output("notes.txt");
    std::fs::write(&path, "nothing to see here\n").unwrap();
    assert!(matches!(
        open_event_source(&path, EventSourceConfig::default()),
        Err(PipeError::NoCompatibleEventSource(_))
    ));

    let (_dir, missing) = common::tmp_output("missing.simtel.jsonl");
    assert!(matches!(
        open_event_source(&missing, EventSourceConfig::default()),
        Err(PipeError::IoError(_))
    ));
}
