//! Command execution: store and link assembly, then one function per subcommand.

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use eyre::WrapErr;
use facerig_config::{CalibrationStore, Config, ScriptLibrary};
use facerig_core::{
    ChannelRegistry, DebounceCfg, EditOutcome, Field, InteractiveControl, LinkCfg, MoveMode, Rig,
    RunSummary, Script, ScriptCfg, ScriptRunner, SendReport, StartOutcome, SharedRig, preset, shared,
};
use facerig_hardware::SimulatedLink;
use facerig_traits::{Clock, Link, MonotonicClock};
use serde_json::json;

use crate::cli::{Cli, Commands, LibraryCmd};

const DEFAULT_LIBRARY: &str = "servo_scripts.json";

pub fn dispatch(cli: &Cli, cfg: &Config) -> eyre::Result<()> {
    match &cli.cmd {
        Commands::Run { script, named } => run_script(cli, cfg, script.as_deref(), named.as_deref()),
        Commands::Check { script } => check_script(cli, cfg, script),
        Commands::Move { channel, angle } => move_once(cli, cfg, *channel, *angle),
        Commands::Live => live(cli, cfg),
        Commands::Calibrate { channel, field, value } => calibrate(cli, cfg, *channel, field, *value),
        Commands::ResetWindow { channel, all } => reset_window(cli, cfg, *channel, *all),
        Commands::Status => device_query(cli, cfg, "status"),
        Commands::HelpDevice => device_query(cli, cfg, "help"),
        Commands::Reset => reset(cli, cfg),
        Commands::SelfCheck => self_check(cli, cfg),
        Commands::Generate { out } => generate(cli, cfg, out.as_deref()),
        Commands::Library { cmd } => library(cli, cfg, cmd),
        Commands::Ports => ports(cli),
    }
}

// ── Output ───────────────────────────────────────────────────────────────────

fn emit(cli: &Cli, value: &serde_json::Value, text: &str) {
    if cli.json {
        println!("{value}");
    } else {
        println!("{text}");
    }
}

fn report_name(r: &SendReport) -> &'static str {
    match r {
        SendReport::Delivered(_) => "delivered",
        SendReport::Fallback { .. } => "fallback",
        SendReport::Partial { .. } => "partial",
    }
}

// ── Assembly ─────────────────────────────────────────────────────────────────

fn store_path(cli: &Cli, cfg: &Config) -> PathBuf {
    cli.store
        .clone()
        .unwrap_or_else(|| PathBuf::from(&cfg.calibration.path))
}

fn open_store(cli: &Cli, cfg: &Config) -> eyre::Result<CalibrationStore> {
    let path = store_path(cli, cfg);
    let store = CalibrationStore::load(&path)?;
    tracing::debug!(path = %path.display(), "calibration store loaded");
    Ok(store)
}

fn library_path(cfg: &Config) -> PathBuf {
    PathBuf::from(cfg.script.library.as_deref().unwrap_or(DEFAULT_LIBRARY))
}

/// Open the link named on the command line, in config, or saved from last time.
fn open_link(cli: &Cli, cfg: &Config, store: &mut CalibrationStore, reg: &ChannelRegistry) -> eyre::Result<Box<dyn Link + Send>> {
    if cli.sim {
        let sim = SimulatedLink::new();
        let mut mids = [90u8; 16];
        for (id, m) in (0u8..).zip(mids.iter_mut()) {
            *m = reg.neutral(id)?;
        }
        sim.set_mids(mids);
        return Ok(Box::new(sim));
    }
    let port = cli
        .port
        .clone()
        .or_else(|| cfg.link.port.clone())
        .or_else(|| store.saved_port().map(str::to_string))
        .ok_or_else(|| eyre::eyre!("no port given; pass --port, set link.port, or use --sim"))?;
    open_serial(&port, cfg.link.baud, store)
}

#[cfg(feature = "hardware")]
fn open_serial(port: &str, baud: u32, store: &mut CalibrationStore) -> eyre::Result<Box<dyn Link + Send>> {
    let link = facerig_hardware::SerialLink::open(port, baud)
        .map_err(|e| eyre::eyre!("open serial port {port} at {baud} baud: {e}"))?;
    store.set_saved_port(port);
    tracing::info!(port, baud, "serial port open");
    Ok(Box::new(link))
}

#[cfg(not(feature = "hardware"))]
fn open_serial(port: &str, _baud: u32, _store: &mut CalibrationStore) -> eyre::Result<Box<dyn Link + Send>> {
    eyre::bail!("serial support not compiled in (port {port}); rebuild with --features hardware")
}

/// Build the rig from the calibration store, import `--calibration` rows, and
/// connect when `with_link` is set.
fn assemble(cli: &Cli, cfg: &Config, mut store: CalibrationStore, with_link: bool) -> eyre::Result<SharedRig> {
    let registry = ChannelRegistry::from(&store);
    let link = if with_link {
        Some(open_link(cli, cfg, &mut store, &registry)?)
    } else {
        None
    };
    let replay = store.auto_send_angles();

    let mut link_cfg: LinkCfg = (&cfg.link).into();
    if cli.sim {
        link_cfg.settle_after_open = Duration::ZERO;
    }
    let mut rig = Rig::builder()
        .with_registry(registry)
        .with_link_cfg(link_cfg)
        .with_safety((&cfg.safety).into())
        .with_sink(store)
        .try_build()?;

    if let Some(csv) = cli.calibration.as_deref() {
        let rows = facerig_config::load_calibration_csv(csv)?;
        let tuples: Vec<(u8, i32, i32, i32)> = rows.iter().map(|r| (r.channel, r.min, r.max, r.mid)).collect();
        for (id, outcome) in rig.import_calibration(&tuples)? {
            if let EditOutcome::Repaired { min, max } = outcome {
                tracing::warn!(channel = id, min, max, "imported window was inverted and has been rebuilt");
            }
        }
        tracing::info!(rows = rows.len(), path = %csv.display(), "calibration imported");
    }

    if let Some(link) = link {
        let report = rig.connect(link, replay)?;
        tracing::info!(
            link = %report.link,
            responsive = report.responsive(),
            replayed = report.replayed,
            "connected"
        );
    }
    Ok(shared(rig))
}

fn with_rig<T>(rig: &SharedRig, f: impl FnOnce(&mut Rig) -> T) -> eyre::Result<T> {
    let mut guard = rig.lock().map_err(|_| eyre::eyre!("rig lock poisoned"))?;
    Ok(f(&mut guard))
}

fn save_on_exit(rig: &SharedRig) -> eyre::Result<()> {
    with_rig(rig, Rig::save_calibration)?
}

// ── Scripts ──────────────────────────────────────────────────────────────────

fn read_script(path: &Path) -> eyre::Result<String> {
    std::fs::read_to_string(path).wrap_err_with(|| format!("read script {}", path.display()))
}

fn run_script(cli: &Cli, cfg: &Config, file: Option<&Path>, named: Option<&str>) -> eyre::Result<()> {
    let mut store = open_store(cli, cfg)?;
    let text = match (file, named) {
        (Some(p), _) => read_script(p)?,
        (None, Some(name)) => {
            let lib = ScriptLibrary::load(library_path(cfg))?;
            let text = lib
                .get(name)
                .ok_or_else(|| eyre::eyre!("no script named '{name}' in the library"))?
                .to_string();
            store.set_last_script(name);
            text
        }
        (None, None) => eyre::bail!("give a script file or --named"),
    };

    let script_cfg: ScriptCfg = (&cfg.script).into();
    let script = Script::parse(&text, &script_cfg.markers);
    for (line, warning) in script.check() {
        tracing::warn!(line = line.number, text = %line.text, %warning, "will be skipped");
    }
    if script.is_empty() {
        eyre::bail!("script has no motion or delay lines");
    }

    let rig = assemble(cli, cfg, store, true)?;
    let clock: Arc<dyn Clock + Send + Sync> = Arc::new(MonotonicClock::new());
    let runner = Arc::new(ScriptRunner::new(rig.clone(), script_cfg, clock));
    {
        let r = Arc::clone(&runner);
        if let Err(e) = ctrlc::set_handler(move || {
            if r.stop() {
                eprintln!("stopping after the current step...");
            }
        }) {
            tracing::warn!(error = %e, "Ctrl-C handler not installed");
        }
    }

    if runner.start(script) == StartOutcome::AlreadyRunning {
        eyre::bail!("a script is already running");
    }
    let outcome = runner
        .join()
        .ok_or_else(|| eyre::eyre!("script worker panicked"))?;
    save_on_exit(&rig)?;
    let summary = outcome?;
    print_summary(cli, &summary);
    if let Some(e) = summary.halted {
        return Err(e.into());
    }
    Ok(())
}

fn print_summary(cli: &Cli, s: &RunSummary) {
    let verdict = if s.halted.is_some() {
        "halted"
    } else if s.cancelled {
        "cancelled"
    } else {
        "complete"
    };
    emit(
        cli,
        &json!({
            "script": verdict,
            "moves": s.moves,
            "delays": s.delays,
            "skipped": s.skipped,
            "failures": s.failures,
        }),
        &format!(
            "script {verdict}: {} moves, {} delays, {} skipped, {} failed",
            s.moves, s.delays, s.skipped, s.failures
        ),
    );
}

fn check_script(cli: &Cli, cfg: &Config, path: &Path) -> eyre::Result<()> {
    let script_cfg: ScriptCfg = (&cfg.script).into();
    let script = Script::parse(&read_script(path)?, &script_cfg.markers);
    let warnings = script.check();
    for (line, w) in &warnings {
        emit(
            cli,
            &json!({ "line": line.number, "text": line.text, "warning": w.to_string() }),
            &format!("line {}: {w}: {}", line.number, line.text),
        );
    }
    let motions = u32::try_from(script.motion_count()).unwrap_or(u32::MAX);
    let estimate = script_cfg.settle * motions
        + Duration::from_millis(script.total_delay_ms())
        + script_cfg.neutral_settle * 2;
    emit(
        cli,
        &json!({
            "motions": script.motion_count(),
            "delay_ms": script.total_delay_ms(),
            "estimated_ms": u64::try_from(estimate.as_millis()).unwrap_or(u64::MAX),
            "warnings": warnings.len(),
        }),
        &format!(
            "{} motion lines, {} ms of delays, about {:.1} s including settle",
            script.motion_count(),
            script.total_delay_ms(),
            estimate.as_secs_f64()
        ),
    );
    if !warnings.is_empty() {
        eyre::bail!("script check found {} warning(s)", warnings.len());
    }
    Ok(())
}

fn library(cli: &Cli, cfg: &Config, cmd: &LibraryCmd) -> eyre::Result<()> {
    let mut lib = ScriptLibrary::load(library_path(cfg))?;
    match cmd {
        LibraryCmd::List => {
            let names: Vec<&str> = lib.names().collect();
            emit(cli, &json!({ "scripts": names }), &names.join("\n"));
        }
        LibraryCmd::Save { name, file } => {
            let saved = lib.insert(name, &read_script(file)?)?;
            lib.save()?;
            let mut store = open_store(cli, cfg)?;
            store.set_last_script(&saved);
            store.save()?;
            emit(cli, &json!({ "saved": saved }), &format!("saved '{saved}'"));
        }
    }
    Ok(())
}

fn generate(cli: &Cli, cfg: &Config, out: Option<&Path>) -> eyre::Result<()> {
    let store = open_store(cli, cfg)?;
    let registry = ChannelRegistry::from(&store);
    let script_cfg: ScriptCfg = (&cfg.script).into();
    let text = preset::expression_script(&registry, &script_cfg.markers);
    match out {
        Some(path) => {
            std::fs::write(path, &text).wrap_err_with(|| format!("write {}", path.display()))?;
            emit(
                cli,
                &json!({ "written": path.display().to_string() }),
                &format!("wrote {}", path.display()),
            );
        }
        None => print!("{text}"),
    }
    Ok(())
}

// ── Motion ───────────────────────────────────────────────────────────────────

fn move_once(cli: &Cli, cfg: &Config, channel: u8, angle: i32) -> eyre::Result<()> {
    let rig = assemble(cli, cfg, open_store(cli, cfg)?, true)?;
    let out = with_rig(&rig, |r| r.move_channel(channel, angle, MoveMode::Scripted))??;
    save_on_exit(&rig)?;
    let targets: Vec<String> = out.targets.iter().map(|(c, a)| format!("{c}->{a}")).collect();
    emit(
        cli,
        &json!({
            "channel": channel,
            "targets": out.targets,
            "report": report_name(&out.report),
        }),
        &format!("moved {} ({})", targets.join(", "), report_name(&out.report)),
    );
    Ok(())
}

fn parse_live_line(line: &str) -> Option<(u8, i32)> {
    let mut parts = line.split_whitespace();
    let id = parts.next()?.parse().ok()?;
    let angle = parts.next()?.parse().ok()?;
    Some((id, angle))
}

fn live(cli: &Cli, cfg: &Config) -> eyre::Result<()> {
    let rig = assemble(cli, cfg, open_store(cli, cfg)?, true)?;
    let debounce: DebounceCfg = (&cfg.debounce).into();
    let flush = debounce.channel.max(debounce.jaw) * 3;
    let control = InteractiveControl::new(rig.clone(), debounce);

    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line.wrap_err("read stdin")?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if line == "q" || line == "quit" {
            break;
        }
        match parse_live_line(line) {
            Some((id, angle)) => {
                if let Err(e) = control.update(id, angle) {
                    tracing::warn!(input = line, error = %e, "ignored");
                }
            }
            None => tracing::warn!(input = line, "expected '<channel> <angle>'"),
        }
    }
    // Let pending debounced sends go out before the worker is dropped.
    std::thread::sleep(flush);
    drop(control);
    save_on_exit(&rig)?;
    let currents = with_rig(&rig, |r| r.registry().currents())?;
    emit(
        cli,
        &json!({ "currents": currents }),
        &format!("final angles: {currents:?}"),
    );
    Ok(())
}

fn reset(cli: &Cli, cfg: &Config) -> eyre::Result<()> {
    let rig = assemble(cli, cfg, open_store(cli, cfg)?, true)?;
    with_rig(&rig, Rig::reset_to_neutral)??;
    save_on_exit(&rig)?;
    emit(cli, &json!({ "reset": true }), "all channels sent to neutral");
    Ok(())
}

fn device_query(cli: &Cli, cfg: &Config, what: &str) -> eyre::Result<()> {
    let rig = assemble(cli, cfg, open_store(cli, cfg)?, true)?;
    let lines = with_rig(&rig, |r| if what == "status" { r.status() } else { r.help() })??;
    if lines.is_empty() {
        tracing::warn!(query = what, "no reply from board");
    }
    emit(cli, &json!({ what: lines }), &lines.join("\n"));
    Ok(())
}

// ── Calibration ──────────────────────────────────────────────────────────────

fn calibrate(cli: &Cli, cfg: &Config, channel: u8, field: &str, value: i32) -> eyre::Result<()> {
    let field: Field = field.parse().map_err(|e: String| eyre::eyre!(e))?;
    let rig = assemble(cli, cfg, open_store(cli, cfg)?, cli.sim || cli.port.is_some())?;
    let (outcome, cal) = with_rig(&rig, |r| -> eyre::Result<_> {
        let outcome = r.edit_calibration(channel, field, value)?;
        Ok((outcome, r.registry().get(channel)?))
    })??;
    let verdict = match outcome {
        EditOutcome::Applied => "applied",
        EditOutcome::Repaired { .. } => "repaired",
        EditOutcome::Ignored => "ignored",
    };
    emit(
        cli,
        &json!({
            "channel": channel,
            "outcome": verdict,
            "min": cal.min(),
            "max": cal.max(),
            "mid": cal.mid(),
        }),
        &format!(
            "channel {channel}: {verdict}; window {}..{} mid {}",
            cal.min(),
            cal.max(),
            cal.mid()
        ),
    );
    Ok(())
}

fn reset_window(cli: &Cli, cfg: &Config, channel: Option<u8>, all: bool) -> eyre::Result<()> {
    let rig = assemble(cli, cfg, open_store(cli, cfg)?, false)?;
    match (channel, all) {
        (_, true) => with_rig(&rig, Rig::reset_all_windows)??,
        (Some(id), false) => with_rig(&rig, |r| r.reset_window(id))??,
        (None, false) => eyre::bail!("give --channel or --all"),
    }
    emit(
        cli,
        &json!({ "reset_window": channel, "all": all }),
        "calibration window opened to 0..180",
    );
    Ok(())
}

// ── Diagnostics ──────────────────────────────────────────────────────────────

fn self_check(cli: &Cli, cfg: &Config) -> eyre::Result<()> {
    let with_link = cli.sim || cli.port.is_some();
    let rig = assemble(cli, cfg, open_store(cli, cfg)?, with_link)?;
    let (connected, link) = with_rig(&rig, |r| (r.is_connected(), r.link_name()))?;
    if with_link && !connected {
        eyre::bail!("link did not stay up during self-check");
    }
    emit(
        cli,
        &json!({ "ok": true, "link": link }),
        &format!("self-check ok{}", link.map(|l| format!(" (link: {l})")).unwrap_or_default()),
    );
    Ok(())
}

#[cfg(feature = "hardware")]
fn ports(cli: &Cli) -> eyre::Result<()> {
    let names = facerig_hardware::list_ports().map_err(|e| eyre::eyre!("list serial ports: {e}"))?;
    emit(cli, &json!({ "ports": names }), &names.join("\n"));
    Ok(())
}

#[cfg(not(feature = "hardware"))]
fn ports(cli: &Cli) -> eyre::Result<()> {
    emit(
        cli,
        &json!({ "ports": [], "note": "serial support not compiled in" }),
        "serial support not compiled in; rebuild with --features hardware",
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn live_lines_parse_channel_and_angle() {
        assert_eq!(parse_live_line("3 120"), Some((3, 120)));
        assert_eq!(parse_live_line("  0   -5 "), Some((0, -5)));
        assert_eq!(parse_live_line("3"), None);
        assert_eq!(parse_live_line("x 9"), None);
    }
}
