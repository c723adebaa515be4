pub mod backup;
pub mod diff;
pub mod mount;
pub mod promote;

use crate::config::model::RuntimeConfig;
use crate::error::RotavaultError;
use crate::host::Host;
use crate::types::RunMode;
use crate::util::command::select_executor;

pub fn exit_for_error(err: &RotavaultError) -> ! {
    println!("{}", err);
    std::process::exit(err.exit_code());
}

pub(crate) fn host_for(config: &RuntimeConfig, run_mode: RunMode) -> Host {
    Host::new(select_executor(run_mode), config.base.tools.clone())
}
