//! Outbound message composition.

use chrono::{DateTime, TimeZone};
use tracing::info;

use crate::error::TemplateError;
use crate::template::{Fields, Renderer};

/// Values merged into a message template.
#[derive(Debug, Clone, Default)]
pub struct MessageFields {
    pub date: String,
    pub to: String,
    pub from: String,
    pub note: String,
    pub link: String,
}

impl MessageFields {
    fn to_fields(&self) -> Fields {
        [
            ("Date", &self.date),
            ("To", &self.to),
            ("From", &self.from),
            ("Note", &self.note),
            ("Link", &self.link),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
    }
}

/// Format a timestamp as an RFC 822 date with a numeric zone,
/// e.g. `02 Jan 06 15:04 -0700`.
pub fn rfc822z<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    at.format("%d %b %y %H:%M %z").to_string()
}

/// Render the named template and convert it to CRLF line endings.
pub fn compose(
    renderer: &dyn Renderer,
    template: &str,
    fields: &MessageFields,
) -> Result<Vec<u8>, TemplateError> {
    let rendered = renderer.render(template, &fields.to_fields())?;
    let message = to_crlf(&rendered);

    info!(
        template = %template,
        to = %fields.to,
        message_length = message.len(),
        "message_composed"
    );

    Ok(message)
}

/// Normalize line endings to CRLF.
///
/// Every CR is dropped and every LF becomes CRLF, so existing CRLF pairs
/// survive unchanged and no CRCRLF is ever produced.
pub fn to_crlf(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len() + input.len() / 16);
    for &b in input {
        match b {
            b'\n' => out.extend_from_slice(b"\r\n"),
            b'\r' => {}
            _ => out.push(b),
        }
    }
    out
}
