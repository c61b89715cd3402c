//! Writes a decision back to the hosting service.
use log::*;

use crate::{
    decision::{Decision, apply_status_label},
    error::Result,
    forge::{manager::ForgeManager, types::IssueUpdate},
    requests::ChangeRequest,
};

/// Replaces everything after `delimiter` in `body` with `report`. The text
/// before the first delimiter belongs to the author and is kept verbatim.
pub fn rewrite_body(body: &str, delimiter: &str, report: &str) -> String {
    let authored = match body.split_once(delimiter) {
        Some((authored, _)) => authored,
        None => body,
    };
    format!("{authored}{delimiter}{report}")
}

pub struct ReportPublisher<'a> {
    forge: &'a ForgeManager,
    delimiter: String,
}

impl<'a> ReportPublisher<'a> {
    pub fn new(forge: &'a ForgeManager, delimiter: impl Into<String>) -> Self {
        Self {
            forge,
            delimiter: delimiter.into(),
        }
    }

    /// Sets the status label and report of a request in a single update,
    /// based on the issue as it is now.
    pub async fn publish(
        &self,
        request: &ChangeRequest,
        decision: &Decision,
    ) -> Result<()> {
        info!(
            "  updating pull request #{} with {}",
            request.number,
            decision.status.label()
        );

        let issue = self.forge.get_issue(&request.issue_url).await?;

        let update = IssueUpdate {
            labels: apply_status_label(&issue.label_names(), decision.status),
            body: rewrite_body(
                issue.body.as_deref().unwrap_or_default(),
                &self.delimiter,
                &decision.report,
            ),
        };

        self.forge.update_issue(&request.issue_url, update).await
    }
}
