//! Application runner - entry point for the CLI binary.
//!
//! Loads (or demo-builds) a project, prints the cost estimate, runs the
//! graph against the stub backends and reports per-node outcomes. Real
//! hosts embed the library and supply their own adapters; this shell exists
//! to exercise the engine end to end.

use anyhow::bail;
use log::{debug, info};

use crate::cli::Args;
use crate::config;
use crate::core::credits::CreditLedger;
use crate::core::event_bus::TelemetryBus;
use crate::core::scheduler::{RunContext, Scheduler};
use crate::entities::{CompareSlot, NodeParams, NodeType, Project, RenderParams};
use crate::error::EngineError;
use crate::test_support::{StaticCapture, StubBackends};

/// Run the fabrika CLI with parsed arguments.
pub fn run_app(args: Args) -> anyhow::Result<()> {
    init_logging(args.verbosity);
    info!("fabrika starting...");
    debug!("Command-line args: {:?}", args);

    let mut project = match &args.project {
        Some(path) => Project::load(path)?,
        None => {
            info!("No project given, building the demo pipeline");
            demo_project()
        }
    };

    let estimate = CreditLedger::estimate(&project.graph);
    println!(
        "Pipeline: {} nodes, {} dirty, estimated cost {} credits",
        project.graph.node_count(),
        project.graph.dirty_nodes().len(),
        estimate
    );
    if args.estimate_only {
        return Ok(());
    }

    let mut ledger = CreditLedger::new(args.credits);
    let threads = args.threads.unwrap_or_else(config::default_worker_threads);
    let bus = TelemetryBus::new();
    let scheduler = Scheduler::new(threads, bus.sender());
    let backends = StubBackends::new();
    let ctx = RunContext::new(backends.adapter_set(), StaticCapture::with_image());

    let report = match project.run(&scheduler, &mut ledger, &ctx) {
        Ok(report) => report,
        Err(EngineError::InsufficientCredit { required, available }) => {
            bail!("not enough credits: run needs {required}, balance is {available}");
        }
        Err(e) => bail!("run refused: {e}"),
    };

    for event in bus.poll() {
        debug!("{:?}", event);
    }

    for node in project.graph.nodes() {
        let key = node
            .cache_key
            .as_ref()
            .map(|k| k.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:<4} {:<8} {:<10} key={} {}",
            node.id.to_string(),
            node.kind.to_string(),
            node.status.to_string(),
            key,
            node.last_error.as_deref().unwrap_or("")
        );
    }
    println!(
        "Run {}: {} done, {} cached, {} failed, {} blocked, {} cancelled",
        report.run_id,
        report.completed.len(),
        report.skipped.len(),
        report.failed.len(),
        report.blocked.len(),
        report.cancelled.len()
    );
    println!("Charged {} credits, balance {}", report.charged, ledger.balance());

    if let Some(path) = &args.save {
        project.save(path)?;
        println!("Saved project to {}", path.display());
    }
    Ok(())
}

fn init_logging(verbosity: u8) {
    let default_level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_millis()
        .init();
}

/// The demo pipeline: capture feeding a render/edit/upscale chain, a second
/// render branch, an A/B compare across the two, and a short animation off
/// the upscale.
fn demo_project() -> Project {
    let mut project = Project::new();

    let capture = project.add_node(NodeType::Source, (0.0, 120.0));
    let render = project.add_node(NodeType::Renderer, (220.0, 60.0));
    let modify = project.add_node(NodeType::Modifier, (440.0, 60.0));
    let upscale = project.add_node(NodeType::Upscale, (660.0, 60.0));
    let render_b = project.add_node(NodeType::Renderer, (220.0, 240.0));
    let compare = project.add_node(NodeType::Compare, (880.0, 150.0));
    let video = project.add_node(NodeType::Video, (880.0, 20.0));

    // Demo edits are infallible by construction.
    let _ = project.set_params(
        render,
        NodeParams::Render(RenderParams {
            prompt: "isometric voxel harbor at sunset".into(),
            ..RenderParams::default()
        }),
    );
    let _ = project.set_params(
        render_b,
        NodeParams::Render(RenderParams {
            prompt: "isometric voxel harbor at dawn".into(),
            seed: 7,
            ..RenderParams::default()
        }),
    );

    let _ = project.connect(capture, render);
    let _ = project.connect(render, modify);
    let _ = project.connect(modify, upscale);
    let _ = project.connect(upscale, video);
    let _ = project.set_compare_input(compare, CompareSlot::A, Some(upscale));
    let _ = project.set_compare_input(compare, CompareSlot::B, Some(render_b));

    project
}
