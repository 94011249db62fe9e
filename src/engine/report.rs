use crate::definition::target::Target;
use crate::engine::assembler::{ArtifactState, BuildArtifact};
use crate::engine::error::ReleaseError;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

/// Terminal record of a single target in a batch.
#[derive(Debug)]
pub struct TargetOutcome {
    pub target: Target,
    pub state: ArtifactState,
    pub archive: Option<PathBuf>,
    pub error: Option<ReleaseError>,
}

impl TargetOutcome {
    pub fn packaged(artifact: BuildArtifact) -> Self {
        TargetOutcome {
            target: artifact.target,
            state: artifact.state,
            archive: artifact.archive,
            error: None,
        }
    }

    pub fn failed(target: &Target, error: ReleaseError) -> Self {
        TargetOutcome {
            target: target.clone(),
            state: ArtifactState::Failed,
            archive: None,
            error: Some(error),
        }
    }

    pub fn is_packaged(&self) -> bool {
        self.state == ArtifactState::Packaged
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Verdict {
    Success,
    PartialSuccess,
    Failure,
}

impl Verdict {
    pub fn name(&self) -> &'static str {
        match self {
            Verdict::Success => "success",
            Verdict::PartialSuccess => "partial success",
            Verdict::Failure => "failure",
        }
    }
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<TargetOutcome>,
    pub all_or_nothing: bool,
}

impl BatchReport {
    pub fn new(outcomes: Vec<TargetOutcome>, all_or_nothing: bool) -> Self {
        BatchReport {
            outcomes,
            all_or_nothing,
        }
    }

    pub fn packaged(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_packaged()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.packaged()
    }

    pub fn verdict(&self) -> Verdict {
        match (self.packaged(), self.failed()) {
            (_, 0) => Verdict::Success,
            (0, _) => Verdict::Failure,
            _ if self.all_or_nothing => Verdict::Failure,
            _ => Verdict::PartialSuccess,
        }
    }

    /// Non-zero whenever any target failed, whatever the verdict.
    pub fn exit_code(&self) -> i32 {
        if self.failed() == 0 {
            0
        } else {
            1
        }
    }
}

impl Display for BatchReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let width = self
            .outcomes
            .iter()
            .map(|o| o.target.name.len())
            .max()
            .unwrap_or(0);

        for outcome in &self.outcomes {
            write!(
                f,
                "  {:<width$}  {:<8}",
                outcome.target.name,
                outcome.state.name(),
                width = width
            )?;

            match (&outcome.archive, &outcome.error) {
                (_, Some(err)) => writeln!(f, "  {}: {}", err.kind(), err)?,
                (Some(archive), None) => writeln!(f, "  {}", archive.display())?,
                (None, None) => writeln!(f)?,
            }
        }

        write!(
            f,
            "{} ({} packaged, {} failed)",
            self.verdict().name(),
            self.packaged(),
            self.failed()
        )
    }
}
