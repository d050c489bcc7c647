// SPDX-License-Identifier: MIT OR Apache-2.0
//! `OrdoPlay` playback simulator.
//!
//! Plays a sequence record headlessly: a tokio interval drives the project
//! ticker at a fixed frame rate, fired events and sub-sequence positions are
//! logged, and the process exits when playback completes.

mod options;

use options::{Options, OptionsError, USAGE};
use ordoplay_playback::{
    EngineSettings, EventValue, Marker, Observable, PlayConfig, PlaybackError, Project,
    SequenceEvent, SequenceRecord, SheetAddress, SheetId, SubSequence, Subscription,
};
use std::collections::BTreeSet;
use std::time::Duration;
use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Simulator errors
#[derive(Debug, Error)]
enum SimError {
    /// Bad command line
    #[error("Invalid arguments: {0}")]
    Options(#[from] OptionsError),

    /// Engine error
    #[error("Playback error: {0}")]
    Playback(#[from] PlaybackError),

    /// Runtime setup failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn main() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,ordoplay_playback=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting OrdoPlay playback simulator v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run() {
        tracing::error!("Simulation failed: {e}");
        if matches!(e, SimError::Options(_)) {
            eprintln!("{USAGE}");
        }
        std::process::exit(1);
    }
}

fn run() -> Result<(), SimError> {
    let options = Options::parse(std::env::args().skip(1))?;
    let settings = match &options.settings {
        Some(path) => EngineSettings::load(path)?,
        None => EngineSettings::default(),
    };
    let record = match &options.record {
        Some(path) => SequenceRecord::load(path)?,
        None => demo_record(),
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()?;
    runtime.block_on(simulate(options, settings, record))
}

async fn simulate(
    options: Options,
    settings: EngineSettings,
    record: SequenceRecord,
) -> Result<(), SimError> {
    let project = Project::with_settings("simulation", settings);
    let main = SheetAddress::default_instance(SheetId::new("main"));
    let sequence = project.sheet_sequence(main.clone(), Observable::new(record.clone()));

    let mut watchers: Vec<Subscription> = Vec::new();
    for sub in &record.sub_sequences {
        let address = SheetAddress::default_instance(sub.sheet_id.clone());
        let length = sub.duration.unwrap_or(record.length);
        let child_record = Observable::new(SequenceRecord::with_length(length));
        let child = project.sheet_sequence(address.clone(), child_record);
        watchers.push(child.position_view().subscribe(move |_, next| {
            tracing::debug!("{address} -> {next:.3}");
        }));
    }

    let names: BTreeSet<String> = record.events.iter().map(|e| e.name.clone()).collect();
    for name in names {
        sequence.listen(name, |event: &SequenceEvent| {
            tracing::info!(
                "Event {:?} at {} (value {:?})",
                event.name,
                event.position,
                event.value
            );
        });
    }

    let formatter = sequence.formatter();
    let length = sequence.length();
    let main_label = main.to_string();
    watchers.push(sequence.playing_view().subscribe(move |_, playing| {
        tracing::info!("{main_label} playing: {playing}");
    }));

    let base = if options.looping {
        PlayConfig::looping()
    } else {
        PlayConfig::default()
    };
    let config = base.with_rate(options.rate);
    let mut handle = match &options.marker {
        Some(marker) => sequence.go_to_and_play(marker, config)?,
        None => sequence.play(config)?,
    };

    let mut interval = tokio::time::interval(Duration::from_secs_f64(1.0 / options.fps));
    let start = tokio::time::Instant::now();
    let mut last_second = None;
    let completed = loop {
        tokio::select! {
            completed = &mut handle => break completed,
            _ = interval.tick() => {
                let time = start.elapsed().as_secs_f64();
                project.tick(time);

                let position = sequence.position();
                let second = position.floor() as u64;
                if last_second != Some(second) {
                    last_second = Some(second);
                    tracing::info!("{}", formatter.format_based_on_length(position, length));
                }
                if options.seconds.is_some_and(|limit| time >= limit) {
                    tracing::info!("Time limit reached, pausing");
                    sequence.pause();
                }
            }
        }
    };

    tracing::info!(
        "Playback {} at {}",
        if completed { "completed" } else { "interrupted" },
        formatter.format_for_playhead(sequence.position())
    );
    drop(watchers);
    Ok(())
}

/// A short sequence exercising events, markers and a sub-sequence
fn demo_record() -> SequenceRecord {
    let mut record = SequenceRecord::with_length(4.0);
    record.markers = vec![Marker::new("Middle", 2.0)];
    record.events = vec![
        SequenceEvent::new("cue", 1.0).with_value(EventValue::Text("lights".into())),
        SequenceEvent::new("cue", 2.5).with_value(EventValue::Number(2.5)),
    ];
    record.sub_sequences = vec![SubSequence::new(SheetId::new("overlay"), 1.0)
        .with_duration(2.0)
        .with_time_scale(2.0)
        .with_label("Overlay")];
    record
}
