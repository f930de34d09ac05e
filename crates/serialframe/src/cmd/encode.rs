use serialframe_frame::encode_command;

use crate::cmd::EncodeArgs;
use crate::exit::{encode_error, CliResult, SUCCESS};
use crate::output::{print_encoded, OutputFormat};

pub fn run(args: EncodeArgs, format: OutputFormat) -> CliResult<i32> {
    let encoded = encode_command(&args.text);
    if let Some(err) = encoded.error() {
        tracing::debug!(valid_prefix = encoded.bytes().len(), "encoding stopped early");
        return Err(encode_error(err));
    }
    print_encoded(&args.text, encoded.bytes(), format);
    Ok(SUCCESS)
}
