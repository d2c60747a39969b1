//! Purpose: Classify how an invocation ended and turn that into a process exit code.
//! Exports: `ExitCode`, `Outcome`, `CommandResult`, `Invocation`, `Presenter`, `Silent`, `conclude`.
//! Role: The only place exit codes are chosen; `main` hands its invocation to `conclude`.
//! Invariants: Every outcome maps to exactly one exit code.
//! Invariants: Payloads and errors pass through untouched (no inspection, no wrapping).
//! Invariants: Nothing is printed unless a `Presenter` chooses to print it.
use std::error::Error as StdError;

use crate::core::artifacts::InvocationResult;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ExitCode {
    Success,
    ModelError,
    UnhandledError,
    UsageError,
}

impl ExitCode {
    pub fn code(self) -> i32 {
        match self {
            ExitCode::Success => 0,
            ExitCode::ModelError => 1,
            ExitCode::UnhandledError => 2,
            ExitCode::UsageError => 64,
        }
    }
}

pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Terminal state of an invocation that did not succeed.
#[derive(Debug)]
pub enum Outcome {
    /// Invalid invocation parameters; guidance was already shown.
    Usage,
    /// The command finished and produced a payload describing a failure.
    Result(InvocationResult),
    /// The command aborted without a structured result.
    Exception(BoxError),
}

impl Outcome {
    pub fn usage() -> Self {
        Outcome::Usage
    }

    pub fn result(payload: InvocationResult) -> Self {
        Outcome::Result(payload)
    }

    pub fn exception(err: impl Into<BoxError>) -> Self {
        Outcome::Exception(err.into())
    }

    pub fn exit_code(&self) -> ExitCode {
        match self {
            Outcome::Usage => ExitCode::UsageError,
            Outcome::Result(_) => ExitCode::ModelError,
            Outcome::Exception(_) => ExitCode::UnhandledError,
        }
    }

    pub fn payload(&self) -> Option<&InvocationResult> {
        match self {
            Outcome::Result(payload) => Some(payload),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        match self {
            Outcome::Exception(err) => Some(&**err),
            _ => None,
        }
    }

    pub fn into_payload(self) -> Option<InvocationResult> {
        match self {
            Outcome::Result(payload) => Some(payload),
            _ => None,
        }
    }

    pub fn into_error(self) -> Option<BoxError> {
        match self {
            Outcome::Exception(err) => Some(err),
            _ => None,
        }
    }
}

/// What a command hands back: its payload plus the command's own verdict.
#[derive(Clone, Debug, PartialEq)]
pub struct CommandResult {
    pub payload: InvocationResult,
    pub success: bool,
}

pub type Invocation = Result<InvocationResult, Outcome>;

impl CommandResult {
    pub fn new(payload: InvocationResult, success: bool) -> Self {
        Self { payload, success }
    }

    pub fn ok(payload: InvocationResult) -> Self {
        Self::new(payload, true)
    }

    pub fn into_invocation(self) -> Invocation {
        if self.success {
            Ok(self.payload)
        } else {
            Err(Outcome::result(self.payload))
        }
    }
}

/// Rendering hooks for the boundary. Every hook does nothing unless overridden.
pub trait Presenter {
    fn present_success(&mut self, _payload: &InvocationResult) {}

    fn present_result(&mut self, _payload: &InvocationResult) {}

    fn present_exception(&mut self, _err: &(dyn StdError + 'static)) {}
}

/// Presenter that prints nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct Silent;

impl Presenter for Silent {}

/// Consume an invocation, let the presenter render it, and return the exit code.
pub fn conclude<P>(invocation: Invocation, presenter: &mut P) -> i32
where
    P: Presenter + ?Sized,
{
    let code = match &invocation {
        Ok(payload) => {
            presenter.present_success(payload);
            ExitCode::Success
        }
        Err(outcome) => {
            match outcome {
                Outcome::Usage => {}
                Outcome::Result(payload) => presenter.present_result(payload),
                Outcome::Exception(err) => presenter.present_exception(&**err),
            }
            outcome.exit_code()
        }
    };
    tracing::debug!(exit_code = code.code(), "invocation concluded");
    code.code()
}
