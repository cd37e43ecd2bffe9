use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use drip_core::{CampaignId, WorkspaceId};

/// Campaign lifecycle status. Only `Running` campaigns are swept for due
/// leads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CampaignStatus {
    Draft,
    Running,
    Paused,
    Completed,
}

/// One step of a campaign's saved email sequence.
///
/// All fields are optional: the copy writer fills gaps with fallback copy, so
/// a half-edited sequence still produces a sendable draft.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceStep {
    pub subject: Option<String>,
    pub body: Option<String>,
    pub template: Option<String>,
}

/// An outbound campaign with its saved sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: CampaignId,
    pub workspace_id: WorkspaceId,
    pub name: String,
    pub status: CampaignStatus,
    /// Days between touches for a lead in this campaign.
    pub cadence_days: i64,
    /// Upper bound on touches per lead. Carried for the reply-classification
    /// follow-up; the sweep itself does not consult it.
    pub max_touches: u32,
    pub sequence: Vec<SequenceStep>,
    pub created_at: DateTime<Utc>,
}

impl Campaign {
    pub fn new(workspace_id: WorkspaceId, name: impl Into<String>) -> Self {
        Self {
            id: CampaignId::new(),
            workspace_id,
            name: name.into(),
            status: CampaignStatus::Draft,
            cadence_days: 3,
            max_touches: 4,
            sequence: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_status(mut self, status: CampaignStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_sequence(mut self, steps: Vec<SequenceStep>) -> Self {
        self.sequence = steps;
        self
    }

    pub fn is_running(&self) -> bool {
        self.status == CampaignStatus::Running
    }

    /// Sequence step for a lead that has already been touched `touch_count`
    /// times. Later touches replay the last step when the sequence is shorter
    /// than the touch count. `None` only when the sequence is empty.
    pub fn step_for_touch(&self, touch_count: u32) -> Option<(usize, &SequenceStep)> {
        if self.sequence.is_empty() {
            return None;
        }
        let index = (touch_count as usize).min(self.sequence.len() - 1);
        Some((index, &self.sequence[index]))
    }
}
