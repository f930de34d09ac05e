use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serialframe_frame::DelimiterPolicy;
use serialframe_session::{Session, SessionConfig, SessionState};
use serialframe_transport::SystemPorts;
use tracing::{debug, info};

use crate::cmd::{parse_duration, runtime, MonitorArgs};
use crate::exit::{session_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_message, OutputFormat};

pub fn run(args: MonitorArgs, format: OutputFormat) -> CliResult<i32> {
    let policy = args.policy()?;
    let poll = parse_duration(&args.poll)?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    runtime()?.block_on(monitor(args, policy, poll, format, running))
}

async fn monitor(
    args: MonitorArgs,
    policy: DelimiterPolicy,
    poll: Duration,
    format: OutputFormat,
    running: Arc<AtomicBool>,
) -> CliResult<i32> {
    let config = SessionConfig::new(&args.port)
        .with_line(args.line.settings())
        .with_policy(policy);
    let mut session = Session::new(SystemPorts, config);
    session
        .open()
        .map_err(|err| session_error("open failed", err))?;
    info!(port = %args.port, %policy, "monitoring, Ctrl-C to stop");

    let mut ticker = tokio::time::interval(poll);
    let mut printed = 0usize;

    let reason = 'poll: loop {
        ticker.tick().await;

        for msg in session.drain_received() {
            print_message(&msg, &args.port, format);
            printed = printed.saturating_add(1);
            if args.count.is_some_and(|count| printed >= count) {
                break 'poll "count reached";
            }
        }

        if !running.load(Ordering::SeqCst) {
            break "interrupted";
        }
        if matches!(session.state(), SessionState::Failed(_)) {
            break "engine failed";
        }
    };

    debug!(reason, printed, "monitor stopping");
    session
        .close()
        .await
        .map_err(|err| session_error("monitor failed", err))?;
    Ok(SUCCESS)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
