mod common;

use iactpipe::io::{open_event_source, EventSourceConfig};
use iactpipe::optional_deps::{available_features, OptionalDependency};
use iactpipe::PipeError;

#[test]
fn test_available_features_match_build() {
    let available = available_features();
    assert_eq!(
        available.contains(&OptionalDependency::Parquet),
        cfg!(feature = "parquet")
    );
    assert_eq!(
        available.contains(&OptionalDependency::Visualization),
        cfg!(feature = "display")
    );
    assert_eq!(
        available.contains(&OptionalDependency::Progress),
        cfg!(feature = "progress")
    );
}

#[cfg(not(feature = "parquet"))]
#[test]
fn test_parquet_input_names_the_feature() {
    common::init_logger();
    let (_dir, path) = common::tmp_output("events.parquet");
    std::fs::write(&path, b"PAR1\x00\x00\x00\x00PAR1").unwrap();

    match open_event_source(&path, EventSourceConfig::default()) {
        Err(PipeError::OptionalDependency(err)) => {
            assert_eq!(err.dependency, OptionalDependency::Parquet);
            let message = err.to_string();
            assert!(message.contains("parquet"));
            assert!(message.contains("--features parquet"));
        }
        Err(other) => panic!("unexpected error {other:?}"),
        Ok(_) => panic!("parquet input opened without the parquet feature"),
    }
}

#[cfg(not(feature = "progress"))]
#[test]
fn test_progress_bar_requires_feature() {
    use iactpipe::processor::{Processor, ProcessorConfig};

    let (_dir, output) = common::tmp_output("dl2");
    let config = ProcessorConfig::builder(common::gamma_sample(), output)
        .progress(true)
        .build()
        .unwrap();
    let err = Processor::new(config).err().unwrap();
    assert!(matches!(
        err,
        PipeError::OptionalDependency(ref e) if e.dependency == OptionalDependency::Progress
    ));
}
