use anyhow::Context;
use phonos_control::{ControlMessage, ControlServer, FACE_HIDE, FACE_SHOW, send_control_command};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use viseme_config::VisemeConfig;
use viseme_core::StopHandle;
use viseme_engine::{EngineSettings, VisemeEngine};

fn main() -> anyhow::Result<()> {
    let cfg = match std::env::args().nth(1) {
        Some(path) => {
            VisemeConfig::load(path.as_str()).with_context(|| format!("loading {path}"))?
        }
        None => VisemeConfig::default(),
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let stop = StopHandle::new();
    {
        let stop = stop.clone();
        ctrlc::set_handler(move || stop.stop()).context("installing signal handler")?;
    }

    let control = ControlServer::bind(&cfg.control_socket_path)
        .with_context(|| format!("binding {}", cfg.control_socket_path))?;
    let serving = {
        let stop = stop.clone();
        std::thread::Builder::new()
            .name("viseme-control".into())
            .spawn(move || control.serve(log_control_message, stop.flag()))
            .context("spawning control thread")?
    };

    let mut engine = VisemeEngine::with_parts(
        EngineSettings::from(&cfg),
        Default::default(),
        stop.clone(),
    );
    engine.subscribers().subscribe(|ev| {
        info!(
            phoneme_id = ev.phoneme_id,
            duration_ms = ev.duration_ms(),
            timestamp_us = ev.timestamp_us,
            "phoneme"
        );
    });

    let settings = engine.settings();
    info!(
        path = %settings.segment_path.display(),
        attach_retries = settings.attach_retries,
        poll_interval_us = settings.poll_interval.as_micros() as u64,
        "starting drain loop"
    );

    if cfg.send_face_commands {
        face_command(&cfg.tts_control_socket_path, FACE_SHOW);
    }

    let outcome = engine.run();

    if cfg.send_face_commands {
        face_command(&cfg.tts_control_socket_path, FACE_HIDE);
    }

    stop.stop();
    match serving.join() {
        Ok(Err(e)) => warn!(error = %e, "control server failed"),
        Err(_) => warn!("control thread panicked"),
        Ok(Ok(())) => {}
    }

    let summary = outcome.context("draining phoneme segment")?;
    info!(
        emitted = summary.emitted,
        skipped = summary.skipped,
        exit = ?summary.exit,
        "viseme stopped"
    );
    Ok(())
}

fn log_control_message(msg: ControlMessage) {
    if let Some(text) = &msg.message {
        info!(text = %text, "control message");
    }
    if let (Some(phoneme), Some(ms)) = (&msg.phoneme, msg.duration_ms) {
        info!(phoneme = %phoneme, duration_ms = ms, "control phoneme");
    }
    if let (Some(phonemes), Some(durations)) = (&msg.phonemes, &msg.phoneme_durations) {
        info!(phonemes = %phonemes, durations = ?durations, "control phoneme batch");
    }
    if !msg.extra.is_empty() {
        let fields: Vec<&String> = msg.extra.keys().collect();
        info!(fields = ?fields, "control message carries unrecognised fields");
    }
}

/// Face commands are best effort; the TTS service may not be running.
fn face_command(path: &str, command: &str) {
    match send_control_command(path, command) {
        Ok(()) => info!(command, "sent face command"),
        Err(e) => warn!(command, error = %e, "face command not delivered"),
    }
}
