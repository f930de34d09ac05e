use serialframe_frame::encode_command;
use serialframe_session::{Session, SessionConfig};
use serialframe_transport::SystemPorts;

use crate::cmd::{delimiter_policy, parse_duration, runtime, SendArgs};
use crate::exit::{encode_error, session_error, CliError, CliResult, SUCCESS, TRANSPORT_ERROR};
use crate::output::{print_message, print_send_outcome, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    // Reject bad input before touching the port.
    if let Some(err) = encode_command(&args.text).error() {
        return Err(encode_error(err));
    }
    let wait = args.wait.as_deref().map(parse_duration).transpose()?;
    let policy = delimiter_policy(None, args.code)?;

    let config = SessionConfig::new(&args.port)
        .with_line(args.line.settings())
        .with_policy(policy);

    runtime()?.block_on(async {
        let mut session = Session::new(SystemPorts, config);
        session
            .open()
            .map_err(|err| session_error("open failed", err))?;

        let outcome = session.send_command(&args.text).await;
        print_send_outcome(&outcome, &args.port, format);

        if let Some(wait) = wait.filter(|_| outcome.is_ok()) {
            tokio::time::sleep(wait).await;
            for msg in session.drain_received() {
                print_message(&msg, &args.port, format);
            }
        }

        let closed = session.close().await;
        if let Some(err) = outcome.error {
            return Err(CliError::new(TRANSPORT_ERROR, format!("send failed: {err}")));
        }
        closed.map_err(|err| session_error("close failed", err))?;
        Ok(SUCCESS)
    })
}
