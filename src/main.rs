//! CLI entry point for the batch fetcher.

use std::process::ExitCode;

mod app;
mod cli;

/// How the process ended, mapped to its exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProcessExit {
    /// Nothing failed.
    Success,
    /// Some targets failed and some succeeded.
    Partial,
    /// Every target failed or the job was cancelled.
    Failure,
}

impl ProcessExit {
    pub(crate) fn code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::Failure => 1,
            Self::Partial => 2,
        }
    }
}

impl From<ProcessExit> for ExitCode {
    fn from(exit: ProcessExit) -> Self {
        ExitCode::from(exit.code())
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    match app::runtime::run().await {
        Ok(exit) => exit.into(),
        Err(error) => {
            eprintln!("Error: {error:#}");
            ProcessExit::Failure.into()
        }
    }
}
