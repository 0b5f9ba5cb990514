//! Step bookkeeping for the deploy workflow.
//!
//! Each completed step registers the action that would undo it. On abort the
//! pending compensations are reported in reverse order; none are executed yet.

use std::fmt;
use tracing::warn;

use crate::gateway::SlotRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    NotifyStarted,
    PrepareSlot,
    UploadArtifact,
    StopSlot,
    DeployTemplate,
    StartSlot,
    NotifyDeployed,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::NotifyStarted => "notify-started",
            Step::PrepareSlot => "prepare-slot",
            Step::UploadArtifact => "upload-artifact",
            Step::StopSlot => "stop-slot",
            Step::DeployTemplate => "deploy-template",
            Step::StartSlot => "start-slot",
            Step::NotifyDeployed => "notify-deployed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Compensation {
    Nothing,
    StartSlot(SlotRef),
    DeleteArtifact { url: String },
}

impl fmt::Display for Compensation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Compensation::Nothing => f.write_str("nothing"),
            Compensation::StartSlot(slot) => write!(
                f,
                "start slot {} of {}",
                slot.slot_name, slot.app.app_name
            ),
            Compensation::DeleteArtifact { url } => write!(f, "delete artifact {url}"),
        }
    }
}

#[derive(Debug)]
pub struct Saga {
    workflow: &'static str,
    log: Vec<(Step, Compensation)>,
}

impl Saga {
    pub fn new(workflow: &'static str) -> Self {
        Self {
            workflow,
            log: Vec::new(),
        }
    }

    pub fn record(&mut self, step: Step, compensation: Compensation) {
        self.log.push((step, compensation));
    }

    /// A later step undid the effect of `step`; drop its compensation.
    pub fn discharge(&mut self, step: Step) {
        for (logged, compensation) in self.log.iter_mut() {
            if *logged == step {
                *compensation = Compensation::Nothing;
            }
        }
    }

    pub fn completed(&self) -> Vec<Step> {
        self.log.iter().map(|(step, _)| *step).collect()
    }

    /// Compensations still owed, most recent first.
    pub fn pending(&self) -> Vec<&Compensation> {
        self.log
            .iter()
            .rev()
            .map(|(_, c)| c)
            .filter(|c| **c != Compensation::Nothing)
            .collect()
    }

    /// End the saga after a failure and report what was left in place.
    pub fn abort(self, reason: &dyn fmt::Display) -> Vec<Compensation> {
        let completed: Vec<String> = self.completed().iter().map(Step::to_string).collect();
        warn!(
            workflow = self.workflow,
            completed = %completed.join(","),
            %reason,
            "workflow aborted"
        );
        let pending: Vec<Compensation> = self.pending().into_iter().cloned().collect();
        for compensation in &pending {
            warn!(
                workflow = self.workflow,
                %compensation,
                %reason,
                "compensation not applied; resource left in place"
            );
        }
        pending
    }
}
