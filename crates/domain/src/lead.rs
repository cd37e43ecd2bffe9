use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use drip_core::{CampaignId, DomainError, DomainResult, LeadId};

/// Lead contact state machine.
///
/// ```text
/// NEW → WAITING_REPLY → FOLLOWUP → {STOPPED_POSITIVE | STOPPED_NEGATIVE | COMPLETED}
/// ```
///
/// `send_email` drives `NEW/FOLLOWUP → WAITING_REPLY`; reply classification
/// drives the rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LeadState {
    New,
    WaitingReply,
    Followup,
    StoppedPositive,
    StoppedNegative,
    Completed,
}

impl LeadState {
    /// Whether this lead may receive a touch right now.
    pub fn is_contactable(&self) -> bool {
        matches!(self, LeadState::New | LeadState::Followup)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LeadState::StoppedPositive | LeadState::StoppedNegative | LeadState::Completed
        )
    }
}

/// One lead inside a campaign.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    pub id: LeadId,
    pub campaign_id: CampaignId,
    pub full_name: String,
    pub email: String,
    pub company: Option<String>,
    pub state: LeadState,
    pub touch_count: u32,
    pub next_touch_at: DateTime<Utc>,
    /// Provider thread id once a conversation exists.
    pub conversation_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Lead {
    pub fn new(
        campaign_id: CampaignId,
        full_name: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: LeadId::new(),
            campaign_id,
            full_name: full_name.into(),
            email: email.into(),
            company: None,
            state: LeadState::New,
            touch_count: 0,
            next_touch_at: now,
            conversation_id: None,
            created_at: now,
        }
    }

    /// First name, for copy personalization. Empty if the name is empty.
    pub fn first_name(&self) -> &str {
        self.full_name.split_whitespace().next().unwrap_or("")
    }

    /// Whether this lead is due for a touch at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.state.is_contactable() && self.next_touch_at <= now
    }

    /// Record a sent touch: `NEW/FOLLOWUP → WAITING_REPLY`, bump the touch
    /// counter, pin the conversation thread, schedule the next touch.
    pub fn record_touch(
        &mut self,
        thread_id: impl Into<String>,
        cadence_days: i64,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        if !self.state.is_contactable() {
            return Err(DomainError::invariant(format!(
                "cannot touch lead in state {:?}",
                self.state
            )));
        }
        self.touch_count += 1;
        self.state = LeadState::WaitingReply;
        self.conversation_id = Some(thread_id.into());
        self.next_touch_at = now + Duration::days(cadence_days);
        Ok(())
    }

    /// No reply arrived in time: `WAITING_REPLY → FOLLOWUP`.
    pub fn schedule_followup(&mut self) -> DomainResult<()> {
        if self.state != LeadState::WaitingReply {
            return Err(DomainError::invariant(format!(
                "cannot follow up lead in state {:?}",
                self.state
            )));
        }
        self.state = LeadState::Followup;
        Ok(())
    }

    /// Terminal transition driven by reply classification.
    pub fn stop(&mut self, outcome: LeadState) -> DomainResult<()> {
        if !outcome.is_terminal() {
            return Err(DomainError::validation(format!(
                "{outcome:?} is not a terminal state"
            )));
        }
        if self.state.is_terminal() {
            return Err(DomainError::invariant(format!(
                "lead already stopped in state {:?}",
                self.state
            )));
        }
        self.state = outcome;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lead() -> Lead {
        Lead::new(CampaignId::new(), "Ada Lovelace", "ada@example.com")
    }

    #[test]
    fn touch_advances_new_lead_to_waiting_reply() {
        let mut lead = lead();
        let now = Utc::now();

        lead.record_touch("thread-1", 3, now).unwrap();

        assert_eq!(lead.state, LeadState::WaitingReply);
        assert_eq!(lead.touch_count, 1);
        assert_eq!(lead.conversation_id.as_deref(), Some("thread-1"));
        assert_eq!(lead.next_touch_at, now + Duration::days(3));
    }

    #[test]
    fn touch_is_rejected_while_waiting_for_a_reply() {
        let mut lead = lead();
        lead.record_touch("t", 3, Utc::now()).unwrap();

        assert!(lead.record_touch("t", 3, Utc::now()).is_err());
        assert_eq!(lead.touch_count, 1);
    }

    #[test]
    fn followup_then_touch_again() {
        let mut lead = lead();
        lead.record_touch("t", 1, Utc::now()).unwrap();
        lead.schedule_followup().unwrap();

        assert_eq!(lead.state, LeadState::Followup);
        assert!(lead.state.is_contactable());

        lead.record_touch("t", 1, Utc::now()).unwrap();
        assert_eq!(lead.touch_count, 2);
    }

    #[test]
    fn stopped_leads_stay_stopped() {
        let mut lead = lead();
        lead.stop(LeadState::StoppedNegative).unwrap();

        assert!(lead.stop(LeadState::Completed).is_err());
        assert!(lead.record_touch("t", 3, Utc::now()).is_err());
        assert_eq!(lead.state, LeadState::StoppedNegative);
    }

    #[test]
    fn first_name_takes_leading_word() {
        assert_eq!(lead().first_name(), "Ada");
        let mut anonymous = lead();
        anonymous.full_name = String::new();
        assert_eq!(anonymous.first_name(), "");
    }
}
