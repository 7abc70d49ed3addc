//! Persona-specific invitation email rendering.

use inviteflow_core::{InvitationRecord, PersonaType};

use crate::provider::EmailMessage;

/// Deep link consumed by the external signup flow: single-use token,
/// time-bounded by the record's expiry.
pub fn signup_link(origin: &str, record: &InvitationRecord) -> String {
    format!(
        "{}/invited-signup?token={}",
        origin.trim_end_matches('/'),
        record.invitation_token
    )
}

fn persona_pitch(persona: PersonaType) -> &'static str {
    match persona {
        PersonaType::Developer => "build on the platform with early API access",
        PersonaType::Founder => "showcase your project to the network",
        PersonaType::Investor => "get curated deal flow from vetted teams",
        PersonaType::Community => "join discussions and shape the roadmap",
    }
}

/// Render the invitation email for one record.
pub fn render(origin: &str, record: &InvitationRecord) -> EmailMessage {
    let link = signup_link(origin, record);
    let display_name = match record.persona_data.get("First-Name") {
        Some(inviteflow_core::FieldValue::Text(name)) if !name.trim().is_empty() => name.trim(),
        _ => "there",
    };
    let subject = format!(
        "You're invited: {} access awaits",
        record.persona_type.as_str()
    );
    let html = format!(
        "<p>Hi {display_name},</p>\
         <p>You've been invited to {pitch}.</p>\
         <p><a href=\"{link}\">Accept your invitation</a></p>\
         <p>This link is single-use and expires on {expires}.</p>",
        pitch = persona_pitch(record.persona_type),
        expires = record.expires_at.format("%Y-%m-%d"),
    );
    EmailMessage {
        to: record.email.clone(),
        subject,
        html,
    }
}
