// main.rs
//
// Copyright 2026 Stéphane Cerveau <scerveau@igalia.com>
//
// This file is part of StreamDag
//
// SPDX-License-Identifier: GPL-3.0-only

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use streamdag::pipeline::MAX_STREAM_NUM;
use streamdag::{
    create_message_channel, BroadcastObserver, Frame, Pipeline, Registry, StreamMsgType,
};

#[derive(Parser, Debug)]
#[command(name = "streamdag-run")]
#[command(author = "Stéphane Cerveau")]
#[command(version)]
#[command(about = "StreamDag - Run a pipeline configuration on synthetic streams")]
struct Args {
    /// Pipeline configuration file (JSON)
    config: PathBuf,

    /// Number of streams fed to every source module
    #[arg(short, long, default_value_t = 1)]
    streams: usize,

    /// Frames per stream
    #[arg(short = 'n', long, default_value_t = 100)]
    frames: u64,

    /// Pause between two frames of a stream, in milliseconds
    #[arg(short, long, default_value_t = 0)]
    interval_ms: u64,

    /// Give up after this many seconds, 0 waits forever
    #[arg(short, long, default_value_t = 0, env = "STREAMDAG_TIMEOUT")]
    timeout_secs: u64,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Print the pipeline profile as JSON once done (needs enable_profiling)
    #[arg(short = 'p', long)]
    print_profile: bool,
}

const EXIT_CODE_ERROR: i32 = 1;
const EXIT_CODE_TIMEOUT: i32 = 2;

fn stream_id(index: usize) -> String {
    format!("stream_{}", index)
}

#[derive(Debug, Clone, Copy)]
struct FeedPlan {
    streams: usize,
    frames: u64,
    interval: Duration,
}

/// Feed every source with `frames` frames per stream, then an EOS per stream.
fn feed_sources(pipeline: &Pipeline, heads: &[String], plan: FeedPlan, stop: &AtomicBool) {
    'frames: for ts in 0..plan.frames as i64 {
        for stream in 0..plan.streams {
            for head in heads {
                if stop.load(Ordering::Acquire) {
                    break 'frames;
                }
                let result = Frame::with_timestamp(stream_id(stream), ts)
                    .and_then(|frame| pipeline.provide_data(head, frame));
                if let Err(e) = result {
                    error!("Failed to feed '{}': {}", head, e);
                    break 'frames;
                }
            }
        }
        if !plan.interval.is_zero() {
            std::thread::sleep(plan.interval);
        }
    }
    for stream in 0..plan.streams {
        for head in heads {
            let result =
                Frame::eos(stream_id(stream)).and_then(|frame| pipeline.provide_data(head, frame));
            if let Err(e) = result {
                warn!("Failed to send EOS of '{}' to '{}': {}", stream_id(stream), head, e);
            }
        }
    }
    debug!("All sources fed");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(format!("streamdag={}", level).parse()?)
                .add_directive(format!("streamdag_run={}", level).parse()?),
        )
        .init();

    if args.streams == 0 || args.streams > MAX_STREAM_NUM {
        error!("--streams must be between 1 and {}", MAX_STREAM_NUM);
        std::process::exit(EXIT_CODE_ERROR);
    }

    let registry = Registry::with_builtins();
    let mut pipeline = Pipeline::new("streamdag");
    if let Err(e) = pipeline.build_from_json_file(&args.config, &registry) {
        error!("Failed to build pipeline from {}: {}", args.config.display(), e);
        std::process::exit(EXIT_CODE_ERROR);
    }
    let heads = pipeline.head_names();
    info!(
        "Pipeline built: {} modules, sources {:?}",
        pipeline.module_names().len(),
        heads
    );

    // Subscribe before start so no message is missed
    let (msg_tx, mut msg_rx) = create_message_channel();
    pipeline.set_stream_msg_observer(Some(Arc::new(BroadcastObserver::new(msg_tx.clone()))));

    if let Err(e) = pipeline.start() {
        error!("Failed to start pipeline: {}", e);
        std::process::exit(EXIT_CODE_ERROR);
    }
    let pipeline = Arc::new(pipeline);

    let (done_tx, done_rx) = tokio::sync::oneshot::channel::<i32>();
    let mut pending: HashSet<String> = (0..args.streams).map(stream_id).collect();
    let stream_count = pending.len();
    tokio::spawn(async move {
        let mut had_error = false;
        loop {
            match msg_rx.recv().await {
                Ok(msg) => match msg.kind {
                    StreamMsgType::Eos => {
                        if pending.remove(&msg.stream_id) {
                            info!(
                                "Stream '{}' reached EOS ({}/{} remaining)",
                                msg.stream_id,
                                pending.len(),
                                stream_count
                            );
                        }
                    }
                    StreamMsgType::StreamError => {
                        had_error = true;
                        warn!("Stream '{}' failed in '{}'", msg.stream_id, msg.module_name);
                    }
                    StreamMsgType::FrameError => {
                        warn!(
                            "Invalid frame {} on stream '{}' in '{}'",
                            msg.pts, msg.stream_id, msg.module_name
                        );
                    }
                    StreamMsgType::Error => {
                        error!("Pipeline error raised by '{}'", msg.module_name);
                        let _ = done_tx.send(EXIT_CODE_ERROR);
                        return;
                    }
                    StreamMsgType::User(n) => {
                        info!(
                            "User message {} from '{}' on stream '{}' (pts {})",
                            n, msg.module_name, msg.stream_id, msg.pts
                        );
                    }
                },
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Message tracker lagged by {} messages", n);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                    warn!("Message channel closed before all streams finished");
                    let _ = done_tx.send(EXIT_CODE_ERROR);
                    return;
                }
            }
            if pending.is_empty() {
                info!("All streams finished");
                let _ = done_tx.send(if had_error { EXIT_CODE_ERROR } else { 0 });
                return;
            }
        }
    });

    let stop_feeding = Arc::new(AtomicBool::new(false));
    let feeder = {
        let pipeline = Arc::clone(&pipeline);
        let stop = Arc::clone(&stop_feeding);
        let plan = FeedPlan {
            streams: args.streams,
            frames: args.frames,
            interval: Duration::from_millis(args.interval_ms),
        };
        tokio::task::spawn_blocking(move || feed_sources(&pipeline, &heads, plan, &stop))
    };

    info!("streamdag-run started. Press Ctrl+C to stop.");

    #[cfg(unix)]
    let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())?;
    #[cfg(unix)]
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    let shutdown_signal = async {
        #[cfg(unix)]
        {
            tokio::select! {
                _ = sigint.recv() => info!("Received SIGINT"),
                _ = sigterm.recv() => info!("Received SIGTERM"),
            }
        }
        #[cfg(not(unix))]
        {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
            info!("Received Ctrl+C");
        }
    };

    let timeout = async {
        match args.timeout_secs {
            0 => std::future::pending().await,
            secs => tokio::time::sleep(Duration::from_secs(secs)).await,
        }
    };

    let exit_code = tokio::select! {
        _ = shutdown_signal => 0,
        _ = timeout => {
            warn!("Timed out after {} seconds", args.timeout_secs);
            EXIT_CODE_TIMEOUT
        }
        result = done_rx => match result {
            Ok(code) => code,
            Err(_) => {
                error!("Message tracker dropped unexpectedly");
                EXIT_CODE_ERROR
            }
        },
    };

    info!("Shutting down...");
    stop_feeding.store(true, Ordering::Release);
    if let Err(e) = feeder.await {
        warn!("Feeder task failed: {}", e);
    }

    let stopper = Arc::clone(&pipeline);
    tokio::task::spawn_blocking(move || stopper.stop()).await?;

    if args.print_profile {
        match pipeline.profile() {
            Some(profile) => println!("{}", serde_json::to_string_pretty(&profile)?),
            None => warn!("Profiling is disabled, set enable_profiling in profiler_config"),
        }
    }
    drop(msg_tx);
    info!("Shutdown complete");

    if exit_code != 0 {
        std::process::exit(exit_code);
    }
    Ok(())
}
