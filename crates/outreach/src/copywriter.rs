//! Email drafting.
//!
//! `generate_copy` asks a [`CopyWriter`] for the subject and body of one
//! touch. [`TemplateCopyWriter`] fills sequence gaps with deterministic
//! fallback copy; [`LlmCopyWriter`] delegates to a structured-output model
//! and falls back to the template writer when the model misbehaves.

use anyhow::Context;

use drip_domain::{Campaign, Lead, SequenceStep};

use crate::providers::StructuredGenerator;

/// A drafted email, ready to be queued in the outbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailDraft {
    pub subject: String,
    pub body: String,
}

/// Drafts one email for a (campaign, lead, step) touch.
pub trait CopyWriter: Send + Sync {
    fn draft(
        &self,
        campaign: &Campaign,
        lead: &Lead,
        step: &SequenceStep,
    ) -> anyhow::Result<EmailDraft>;
}

/// Deterministic writer: saved step copy when present, fallback copy when
/// not. Never fails, so a half-edited sequence still sends.
#[derive(Debug, Clone)]
pub struct TemplateCopyWriter {
    sender_name: String,
}

impl TemplateCopyWriter {
    pub fn new(sender_name: impl Into<String>) -> Self {
        Self {
            sender_name: sender_name.into(),
        }
    }

    fn fallback_subject(lead: &Lead) -> String {
        let first = lead.first_name();
        if first.is_empty() {
            "Quick question".to_owned()
        } else {
            format!("Quick question, {first}")
        }
    }

    fn fallback_body(&self, campaign: &Campaign, lead: &Lead) -> String {
        format!(
            "Hi {},\n\nWanted to reach out about {}.\n\n— {}",
            lead.full_name, campaign.name, self.sender_name
        )
    }
}

impl CopyWriter for TemplateCopyWriter {
    fn draft(
        &self,
        campaign: &Campaign,
        lead: &Lead,
        step: &SequenceStep,
    ) -> anyhow::Result<EmailDraft> {
        let subject = step
            .subject
            .clone()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| Self::fallback_subject(lead));
        let body = step
            .body
            .clone()
            .filter(|b| !b.trim().is_empty())
            .unwrap_or_else(|| self.fallback_body(campaign, lead));
        Ok(EmailDraft { subject, body })
    }
}

/// Writer backed by a structured-output model. The step's saved copy and
/// template become the prompt context; a malformed or failed generation
/// degrades to [`TemplateCopyWriter`] instead of burning the retry budget.
pub struct LlmCopyWriter<G> {
    generator: G,
    fallback: TemplateCopyWriter,
}

impl<G: StructuredGenerator> LlmCopyWriter<G> {
    pub fn new(generator: G, sender_name: impl Into<String>) -> Self {
        Self {
            generator,
            fallback: TemplateCopyWriter::new(sender_name),
        }
    }

    fn prompt(campaign: &Campaign, lead: &Lead, step: &SequenceStep) -> String {
        let mut prompt = String::from(
            "Write one short outbound email. \
             Respond with a JSON object {\"subject\": string, \"body\": string} and nothing else.\n",
        );
        prompt.push_str(&format!("Campaign: {}\n", campaign.name));
        prompt.push_str(&format!("Recipient: {} <{}>\n", lead.full_name, lead.email));
        if let Some(company) = &lead.company {
            prompt.push_str(&format!("Company: {company}\n"));
        }
        if let Some(template) = &step.template {
            prompt.push_str(&format!("Style guidance: {template}\n"));
        }
        if let Some(subject) = &step.subject {
            prompt.push_str(&format!("Suggested subject: {subject}\n"));
        }
        if let Some(body) = &step.body {
            prompt.push_str(&format!("Draft to improve:\n{body}\n"));
        }
        prompt
    }
}

impl<G: StructuredGenerator> CopyWriter for LlmCopyWriter<G> {
    fn draft(
        &self,
        campaign: &Campaign,
        lead: &Lead,
        step: &SequenceStep,
    ) -> anyhow::Result<EmailDraft> {
        let generated = match self.generator.generate_json(&Self::prompt(campaign, lead, step)) {
            Ok(value) => value,
            Err(_) => return self.fallback.draft(campaign, lead, step),
        };

        let subject = generated
            .get("subject")
            .and_then(|v| v.as_str())
            .filter(|s| !s.trim().is_empty());
        let body = generated
            .get("body")
            .and_then(|v| v.as_str())
            .filter(|b| !b.trim().is_empty());

        match (subject, body) {
            (Some(subject), Some(body)) => Ok(EmailDraft {
                subject: subject.to_owned(),
                body: body.to_owned(),
            }),
            _ => self
                .fallback
                .draft(campaign, lead, step)
                .context("fallback draft after incomplete model output"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::GeneratorError;
    use drip_core::WorkspaceId;
    use drip_domain::CampaignStatus;
    use serde_json::{Value, json};

    fn campaign() -> Campaign {
        Campaign::new(WorkspaceId::new(), "Q3 outbound").with_status(CampaignStatus::Running)
    }

    fn lead(campaign: &Campaign) -> Lead {
        Lead::new(campaign.id, "Ada Lovelace", "ada@example.com")
    }

    #[test]
    fn template_writer_prefers_saved_step_copy() {
        let campaign = campaign();
        let lead = lead(&campaign);
        let step = SequenceStep {
            subject: Some("Saved subject".into()),
            body: Some("Saved body".into()),
            template: None,
        };

        let draft = TemplateCopyWriter::new("Taylor")
            .draft(&campaign, &lead, &step)
            .unwrap();
        assert_eq!(draft.subject, "Saved subject");
        assert_eq!(draft.body, "Saved body");
    }

    #[test]
    fn template_writer_fills_gaps_with_fallback_copy() {
        let campaign = campaign();
        let lead = lead(&campaign);

        let draft = TemplateCopyWriter::new("Taylor")
            .draft(&campaign, &lead, &SequenceStep::default())
            .unwrap();
        assert_eq!(draft.subject, "Quick question, Ada");
        assert!(draft.body.contains("Hi Ada Lovelace,"));
        assert!(draft.body.contains("Q3 outbound"));
        assert!(draft.body.ends_with("— Taylor"));
    }

    struct CannedGenerator(Result<Value, GeneratorError>);

    impl StructuredGenerator for CannedGenerator {
        fn generate_json(&self, _prompt: &str) -> Result<Value, GeneratorError> {
            match &self.0 {
                Ok(v) => Ok(v.clone()),
                Err(GeneratorError::Failed(m)) => Err(GeneratorError::Failed(m.clone())),
                Err(GeneratorError::Malformed(m)) => Err(GeneratorError::Malformed(m.clone())),
            }
        }
    }

    #[test]
    fn llm_writer_uses_model_output_when_complete() {
        let campaign = campaign();
        let lead = lead(&campaign);
        let writer = LlmCopyWriter::new(
            CannedGenerator(Ok(json!({"subject": "Hello Ada", "body": "Generated body"}))),
            "Taylor",
        );

        let draft = writer
            .draft(&campaign, &lead, &SequenceStep::default())
            .unwrap();
        assert_eq!(draft.subject, "Hello Ada");
        assert_eq!(draft.body, "Generated body");
    }

    #[test]
    fn llm_writer_falls_back_on_failure_or_partial_output() {
        let campaign = campaign();
        let lead = lead(&campaign);

        for generator in [
            CannedGenerator(Err(GeneratorError::Failed("model offline".into()))),
            CannedGenerator(Ok(json!({"subject": "only a subject"}))),
            CannedGenerator(Ok(json!("not an object"))),
        ] {
            let writer = LlmCopyWriter::new(generator, "Taylor");
            let draft = writer
                .draft(&campaign, &lead, &SequenceStep::default())
                .unwrap();
            assert_eq!(draft.subject, "Quick question, Ada");
        }
    }
}
