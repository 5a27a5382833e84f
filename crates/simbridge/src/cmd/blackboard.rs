use simbridge_provider::{ShmDataPoint, ShmProvider};

use crate::cmd::BlackboardArgs;
use crate::exit::{provider_error, CliResult, SUCCESS};
use crate::output::{print_blackboard, BlackboardView, OutputFormat};

pub fn run(args: BlackboardArgs, format: OutputFormat) -> CliResult<i32> {
    let provider =
        ShmProvider::open(&args.name).map_err(|err| provider_error("open failed", err))?;
    let state = provider
        .snapshot()
        .map_err(|err| provider_error("snapshot failed", err))?;

    let view = if args.full {
        BlackboardView::Full(state)
    } else {
        BlackboardView::Sensors(ShmDataPoint::from(&state))
    };
    print_blackboard(provider.name(), &view, format);

    Ok(SUCCESS)
}
