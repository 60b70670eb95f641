// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

mod event;
mod logger;

use std::io::{self, BufRead};
use std::{env, process, sync::Arc, thread};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use logmetrics::{
    collector::Collector,
    config::{BatchingMode, Config, Settings},
    event_bus::EventBus,
    sink::StdoutSink,
    ticker::FlushTicker,
};

const LINE_QUEUE_CAPACITY: usize = 1024;

#[tokio::main]
pub async fn main() {
    let log_level = env::var("LOGMETRICS_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(log_level).expect("could not parse LOGMETRICS_LOG_LEVEL"),
        )
        .event_format(logger::Formatter)
        .with_writer(io::stderr)
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");

    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            error!("{e}");
            process::exit(1);
        }
    };
    info!(
        "Starting logmetrics agent in {} mode (interval {}s, max buffer {} entries)",
        settings.batching_mode, settings.interval, settings.max_buffer_size
    );

    let config = Arc::new(Config::from(settings));
    let bus = Arc::new(EventBus::new());
    let collector = Arc::new(Collector::new(
        Arc::clone(&config),
        bus,
        Arc::new(StdoutSink),
    ));
    let subscription = collector.attach();

    let cancel_token = CancellationToken::new();
    let ticker = match (config.batching_mode(), config.interval_duration()) {
        (BatchingMode::Interval, Some(interval)) => {
            let period = FlushTicker::period_for(interval);
            debug!("Starting flush ticker every {period:?}");
            let ticker = FlushTicker::new(Arc::clone(&collector), period, cancel_token.clone());
            Some(tokio::spawn(ticker.run()))
        }
        _ => None,
    };

    let mut lines = spawn_stdin_reader();
    let recorder = collector.recorder();
    loop {
        tokio::select! {
            line = lines.recv() => match line {
                Some(line) => {
                    if let Some(event) = event::parse_line(&line) {
                        event::publish(&recorder, event);
                    }
                }
                None => {
                    debug!("stdin closed");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl-C, shutting down");
                break;
            }
        }
    }

    cancel_token.cancel();
    if let Some(ticker) = ticker {
        if let Err(e) = ticker.await {
            error!("Flush ticker failed: {e}");
        }
    }
    collector.detach(subscription);
    collector.shutdown();
    info!("logmetrics agent stopped");
}

/// Stdin is read on a plain thread: a blocking read must not hold up runtime
/// shutdown after Ctrl-C.
fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(LINE_QUEUE_CAPACITY);
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if tx.blocking_send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    error!("Failed to read stdin: {e}");
                    break;
                }
            }
        }
    });
    rx
}
