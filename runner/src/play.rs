//! Scripted replay of submissions against a lab.

use serde::Serialize;
use tracing::{info, warn};

use crate::io::config::PlayerConfig;
use crate::io::script::Script;
use crate::lab::LabDocument;
use crate::session::{Session, Snapshot, SubmitResult};

/// Outcome of one scripted submission.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplayEntry {
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<SubmitResult>,
    /// Navigation error (locked step, finished lab); the submission was skipped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Replay {
    pub entries: Vec<ReplayEntry>,
    pub snapshot: Snapshot,
}

impl Replay {
    pub fn finished(&self) -> bool {
        self.snapshot.finished
    }
}

/// Run every submission of `script` in order on a fresh session.
pub fn replay(doc: &LabDocument, script: &Script, config: PlayerConfig) -> Replay {
    let mut session = Session::new(doc, &script.seed, config);
    let mut entries = Vec::with_capacity(script.submissions.len());
    for (index, submission) in script.submissions.iter().enumerate() {
        if submission.tick > 0 {
            session.tick(submission.tick);
        }
        let outcome = match &submission.step {
            Some(step) => session.select(step).map(|_| ()),
            None => Ok(()),
        }
        .and_then(|()| session.submit(submission.payload.clone()));
        let entry = match outcome {
            Ok(result) => ReplayEntry {
                index,
                result: Some(result),
                error: None,
            },
            Err(err) => {
                warn!(index, error = %err, "submission skipped");
                ReplayEntry {
                    index,
                    result: None,
                    error: Some(err.to_string()),
                }
            }
        };
        entries.push(entry);
    }
    let snapshot = session.snapshot();
    info!(
        lab = %snapshot.lab_id,
        score = snapshot.score,
        finished = snapshot.finished,
        "replay complete"
    );
    Replay { entries, snapshot }
}
