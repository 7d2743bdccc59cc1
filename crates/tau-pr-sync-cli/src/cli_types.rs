use clap::ValueEnum;
use tau_pr_sync::DispatchMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CliDispatchMode {
    Rerun,
    Dispatch,
}

impl From<CliDispatchMode> for DispatchMode {
    fn from(value: CliDispatchMode) -> Self {
        match value {
            CliDispatchMode::Rerun => DispatchMode::Rerun,
            CliDispatchMode::Dispatch => DispatchMode::Dispatch,
        }
    }
}
